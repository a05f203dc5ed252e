//! Output sinks the device hands its video frames and audio samples to.

use std::sync::{Arc, Mutex};

/// Receives a finished frame every time the PPU enters VBlank.
pub trait VideoSink {
    /// `framebuffer` is RGB888, row-major, 160x144.
    fn present(&mut self, framebuffer: &[u8]);
}

/// Receives stereo samples at the rate it asks for.
pub trait AudioSink {
    fn push_sample(&mut self, left: i16, right: i16);

    fn sample_rate(&self) -> u32 {
        44_100
    }
}

/// Discards frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullVideoSink;

impl VideoSink for NullVideoSink {
    fn present(&mut self, _framebuffer: &[u8]) {}
}

/// Discards samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn push_sample(&mut self, _left: i16, _right: i16) {}
}

/// Keeps the most recent frame and a count of presented frames. Clones share
/// the same storage, so one clone can be handed to the device and another
/// kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct CaptureVideoSink {
    inner: Arc<Mutex<CapturedFrames>>,
}

#[derive(Debug, Default)]
struct CapturedFrames {
    last: Vec<u8>,
    count: u64,
}

impl CaptureVideoSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> u64 {
        self.inner.lock().map(|f| f.count).unwrap_or_default()
    }

    pub fn last_frame(&self) -> Vec<u8> {
        self.inner.lock().map(|f| f.last.clone()).unwrap_or_default()
    }
}

impl VideoSink for CaptureVideoSink {
    fn present(&mut self, framebuffer: &[u8]) {
        if let Ok(mut frames) = self.inner.lock() {
            frames.last.clear();
            frames.last.extend_from_slice(framebuffer);
            frames.count += 1;
        }
    }
}

/// Records every sample pushed to it; clones share storage.
#[derive(Debug, Clone)]
pub struct CaptureAudioSink {
    samples: Arc<Mutex<Vec<(i16, i16)>>>,
    sample_rate: u32,
}

impl CaptureAudioSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Arc::default(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> Vec<(i16, i16)> {
        self.samples.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl AudioSink for CaptureAudioSink {
    fn push_sample(&mut self, left: i16, right: i16) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.push((left, right));
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
