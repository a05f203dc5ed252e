//! Game Boy APU (audio processing unit)
//!
//! Four channels mixed to stereo:
//!
//! 1. Square with sweep (NR10-NR14)
//! 2. Square (NR21-NR24)
//! 3. Wave, 32 4-bit samples in wave RAM (NR30-NR34, $FF30-$FF3F)
//! 4. Noise, 15- or 7-bit LFSR (NR41-NR44)
//!
//! NR50 sets the master volume per side, NR51 routes channels to sides and
//! NR52 powers the unit and reports which channels are playing.
//!
//! ## Frame sequencer
//!
//! Clocked every 8192 T-cycles (512 Hz):
//! - Steps 0, 2, 4, 6: length counters
//! - Steps 2, 6: sweep
//! - Step 7: envelopes
//!
//! Samples are produced at the sink's rate by a fractional accumulator
//! against the 4.194304 MHz CPU clock.

mod channels;

pub use channels::{Envelope, LengthCounter, NoiseChannel, SquareChannel, Sweep, WaveChannel};

use serde::{Deserialize, Serialize};

use crate::sinks::AudioSink;
use emu_core::logging::{log, LogCategory, LogLevel};

pub const CPU_HZ: u64 = 4_194_304;
const FRAME_SEQUENCER_PERIOD: u32 = 8192;

/// Bits that read back as 1 for $FF10-$FF26.
const READ_MASKS: [u8; 0x17] = [
    0x80, 0x3F, 0x00, 0xFF, 0xBF, // NR10-NR14
    0xFF, 0x3F, 0x00, 0xFF, 0xBF, // NR20-NR24
    0x7F, 0xFF, 0x9F, 0xFF, 0xBF, // NR30-NR34
    0xFF, 0xFF, 0x00, 0x00, 0xBF, // NR40-NR44
    0x00, 0x00, 0x70, // NR50-NR52
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apu {
    /// $FF10-$FF25 as last written
    regs: [u8; 0x16],
    powered: bool,

    pub square1: SquareChannel,
    pub square2: SquareChannel,
    pub wave: WaveChannel,
    pub noise: NoiseChannel,

    sequencer_cycles: u32,
    sequencer_step: u8,
    /// Scaled by the sample rate; one sample per `CPU_HZ`
    sample_clock: u64,
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl Apu {
    /// Powered off, as at reset before the boot ROM turns it on.
    pub fn new() -> Self {
        Self {
            regs: [0; 0x16],
            powered: false,
            square1: SquareChannel::new(true),
            square2: SquareChannel::new(false),
            wave: WaveChannel::default(),
            noise: NoiseChannel::default(),
            sequencer_cycles: 0,
            sequencer_step: 0,
            sample_clock: 0,
        }
    }

    /// Check buffer sizes and indices of a deserialized state.
    pub fn validate(&self) -> Result<(), String> {
        let consistent = self.square1.is_consistent()
            && self.square2.is_consistent()
            && self.wave.is_consistent()
            && self.noise.is_consistent();
        if consistent {
            Ok(())
        } else {
            Err("APU state has out-of-range channel state".to_string())
        }
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    fn status(&self) -> u8 {
        (self.powered as u8) << 7
            | (self.noise.enabled as u8) << 3
            | (self.wave.enabled as u8) << 2
            | (self.square2.enabled as u8) << 1
            | self.square1.enabled as u8
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF26 => READ_MASKS[0x16] | self.status(),
            0xFF10..=0xFF25 => {
                let i = (addr - 0xFF10) as usize;
                self.regs[i] | READ_MASKS[i]
            }
            0xFF30..=0xFF3F => self.wave.ram[(addr - 0xFF30) as usize],
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF26 => self.write_power(val & 0x80 != 0),
            // Wave RAM is reachable with the unit off
            0xFF30..=0xFF3F => self.wave.ram[(addr - 0xFF30) as usize] = val,
            _ if !self.powered => {
                log(LogCategory::APU, LogLevel::Trace, || {
                    format!("Write {:02X} to {:04X} ignored while powered off", val, addr)
                });
            }
            0xFF10..=0xFF25 => {
                self.regs[(addr - 0xFF10) as usize] = val;
                self.dispatch(addr, val);
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF10 => {
                if let Some(sweep) = self.square1.sweep.as_mut() {
                    sweep.write(val);
                }
            }
            0xFF11 => self.square1.write_length_duty(val),
            0xFF12 => self.square1.write_envelope(val),
            0xFF13 => self.square1.write_frequency_low(val),
            0xFF14 => self.square1.write_control(val),
            0xFF16 => self.square2.write_length_duty(val),
            0xFF17 => self.square2.write_envelope(val),
            0xFF18 => self.square2.write_frequency_low(val),
            0xFF19 => self.square2.write_control(val),
            0xFF1A => self.wave.write_dac(val),
            0xFF1B => self.wave.write_length(val),
            0xFF1C => self.wave.write_volume(val),
            0xFF1D => self.wave.write_frequency_low(val),
            0xFF1E => self.wave.write_control(val),
            0xFF20 => self.noise.write_length(val),
            0xFF21 => self.noise.write_envelope(val),
            0xFF22 => self.noise.write_polynomial(val),
            0xFF23 => self.noise.write_control(val),
            // NR50, NR51 and the unused slots are read back from `regs`
            _ => {}
        }
    }

    fn write_power(&mut self, on: bool) {
        if on == self.powered {
            return;
        }
        log(LogCategory::APU, LogLevel::Debug, || {
            format!("Power {}", if on { "on" } else { "off" })
        });
        if on {
            self.sequencer_step = 0;
            self.sequencer_cycles = 0;
        } else {
            self.regs = [0; 0x16];
            let wave_ram = std::mem::take(&mut self.wave.ram);
            self.square1 = SquareChannel::new(true);
            self.square2 = SquareChannel::new(false);
            self.wave = WaveChannel::default();
            self.wave.ram = wave_ram;
            self.noise = NoiseChannel::default();
        }
        self.powered = on;
    }

    fn clock_sequencer(&mut self) {
        match self.sequencer_step {
            0 | 4 => self.clock_lengths(),
            2 | 6 => {
                self.clock_lengths();
                self.square1.clock_sweep();
            }
            7 => {
                self.square1.envelope.clock();
                self.square2.envelope.clock();
                self.noise.envelope.clock();
            }
            _ => {}
        }
        self.sequencer_step = (self.sequencer_step + 1) & 7;
    }

    fn clock_lengths(&mut self) {
        self.square1.clock_length();
        self.square2.clock_length();
        self.wave.clock_length();
        self.noise.clock_length();
    }

    /// Amplitude of a channel's digital level through its DAC, -15..=15.
    fn dac(enabled: bool, level: u8) -> i32 {
        if enabled {
            level as i32 * 2 - 15
        } else {
            0
        }
    }

    /// Current stereo sample.
    pub fn mix(&self) -> (i16, i16) {
        if !self.powered {
            return (0, 0);
        }
        let outputs = [
            Self::dac(self.square1.enabled, self.square1.output()),
            Self::dac(self.square2.enabled, self.square2.output()),
            Self::dac(self.wave.enabled, self.wave.output()),
            Self::dac(self.noise.enabled, self.noise.output()),
        ];
        let nr50 = self.regs[0x14];
        let nr51 = self.regs[0x15];

        let side = |shift: u8, volume: u8| {
            let sum: i32 = outputs
                .iter()
                .enumerate()
                .filter(|(ch, _)| nr51 & (1 << (*ch as u8 + shift)) != 0)
                .map(|(_, out)| out)
                .sum();
            (sum * (volume as i32 + 1) * 64) as i16
        };
        (side(4, (nr50 >> 4) & 0x07), side(0, nr50 & 0x07))
    }

    pub fn step(&mut self, cycles: u32, sink: &mut dyn AudioSink) {
        if self.powered {
            self.sequencer_cycles += cycles;
            while self.sequencer_cycles >= FRAME_SEQUENCER_PERIOD {
                self.sequencer_cycles -= FRAME_SEQUENCER_PERIOD;
                self.clock_sequencer();
            }
            self.square1.tick(cycles);
            self.square2.tick(cycles);
            self.wave.tick(cycles);
            self.noise.tick(cycles);
        }

        self.sample_clock += cycles as u64 * sink.sample_rate() as u64;
        while self.sample_clock >= CPU_HZ {
            self.sample_clock -= CPU_HZ;
            let (left, right) = self.mix();
            sink.push_sample(left, right);
        }
    }
}
