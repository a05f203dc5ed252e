//! Sound channel building blocks: length counter, volume envelope, the two
//! square channels (the first with a frequency sweep), the wave channel and
//! the noise channel.
//!
//! Channels produce a 4-bit digital level; [`super::Apu`] turns it into an
//! analog amplitude and mixes.

use serde::{Deserialize, Serialize};

const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 1, 1, 1],
    [0, 1, 1, 1, 1, 1, 1, 0],
];

const NOISE_DIVISORS: [u32; 8] = [8, 16, 32, 48, 64, 80, 96, 112];

/// Runs a countdown timer for `cycles`, calling `on_expire` each time it
/// reaches zero and reloading it from `period`.
fn run_timer(timer: &mut u32, cycles: u32, period: u32, mut on_expire: impl FnMut()) {
    let mut left = cycles;
    while left >= *timer {
        left -= *timer;
        *timer = period.max(1);
        on_expire();
    }
    *timer -= left;
}

/// Silences its channel after a programmed number of 256 Hz ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LengthCounter {
    max: u16,
    counter: u16,
    pub enabled: bool,
}

impl LengthCounter {
    pub fn new(max: u16) -> Self {
        Self {
            max,
            counter: 0,
            enabled: false,
        }
    }

    /// Load from the NRx1 length field.
    pub fn load(&mut self, length: u16) {
        self.counter = self.max - length;
    }

    pub fn trigger(&mut self) {
        if self.counter == 0 {
            self.counter = self.max;
        }
    }

    /// Returns false when the count has just run out.
    pub fn clock(&mut self) -> bool {
        if self.enabled && self.counter > 0 {
            self.counter -= 1;
            return self.counter != 0;
        }
        true
    }
}

/// NRx2 volume envelope, clocked at 64 Hz.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    initial: u8,
    increase: bool,
    period: u8,
    volume: u8,
    timer: u8,
}

impl Envelope {
    pub fn write(&mut self, val: u8) {
        self.initial = val >> 4;
        self.increase = val & 0x08 != 0;
        self.period = val & 0x07;
    }

    /// The DAC is off when the upper five NRx2 bits are all clear.
    pub fn dac_enabled(&self) -> bool {
        self.initial != 0 || self.increase
    }

    pub fn trigger(&mut self) {
        self.volume = self.initial;
        self.timer = self.period;
    }

    pub fn clock(&mut self) {
        if self.period == 0 {
            return;
        }
        self.timer = self.timer.saturating_sub(1);
        if self.timer == 0 {
            self.timer = self.period;
            if self.increase && self.volume < 15 {
                self.volume += 1;
            } else if !self.increase && self.volume > 0 {
                self.volume -= 1;
            }
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }
}

/// NR10 frequency sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sweep {
    period: u8,
    negate: bool,
    shift: u8,
    timer: u8,
    shadow: u16,
    enabled: bool,
}

impl Sweep {
    pub fn write(&mut self, val: u8) {
        self.period = (val >> 4) & 0x07;
        self.negate = val & 0x08 != 0;
        self.shift = val & 0x07;
    }

    fn reload_timer(&mut self) {
        self.timer = if self.period == 0 { 8 } else { self.period };
    }

    fn next_frequency(&self) -> u16 {
        let delta = self.shadow >> self.shift;
        if self.negate {
            self.shadow.wrapping_sub(delta)
        } else {
            self.shadow + delta
        }
    }

    /// Returns false if the initial overflow check disables the channel.
    pub fn trigger(&mut self, frequency: u16) -> bool {
        self.shadow = frequency;
        self.reload_timer();
        self.enabled = self.period != 0 || self.shift != 0;
        self.shift == 0 || self.next_frequency() <= 2047
    }

    /// Clocked at 128 Hz. Returns the new frequency to apply (if any) and
    /// whether the channel survives the overflow check.
    pub fn clock(&mut self) -> (Option<u16>, bool) {
        self.timer = self.timer.saturating_sub(1);
        if self.timer > 0 {
            return (None, true);
        }
        self.reload_timer();
        if !self.enabled || self.period == 0 {
            return (None, true);
        }

        let next = self.next_frequency();
        if next > 2047 {
            return (None, false);
        }
        if self.shift == 0 {
            return (None, true);
        }
        self.shadow = next;
        (Some(next), self.next_frequency() <= 2047)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareChannel {
    pub enabled: bool,
    pub length: LengthCounter,
    pub envelope: Envelope,
    pub sweep: Option<Sweep>,
    duty: u8,
    duty_pos: u8,
    frequency: u16,
    timer: u32,
}

impl SquareChannel {
    pub fn new(with_sweep: bool) -> Self {
        Self {
            enabled: false,
            length: LengthCounter::new(64),
            envelope: Envelope::default(),
            sweep: with_sweep.then(Sweep::default),
            duty: 0,
            duty_pos: 0,
            frequency: 0,
            timer: 8192,
        }
    }

    fn period(&self) -> u32 {
        (2048 - self.frequency as u32) * 4
    }

    pub fn write_length_duty(&mut self, val: u8) {
        self.duty = val >> 6;
        self.length.load((val & 0x3F) as u16);
    }

    pub fn write_envelope(&mut self, val: u8) {
        self.envelope.write(val);
        if !self.envelope.dac_enabled() {
            self.enabled = false;
        }
    }

    pub fn write_frequency_low(&mut self, val: u8) {
        self.frequency = (self.frequency & 0x700) | val as u16;
    }

    /// NRx4: frequency high bits, length enable and trigger.
    pub fn write_control(&mut self, val: u8) {
        self.frequency = (self.frequency & 0xFF) | ((val as u16 & 0x07) << 8);
        self.length.enabled = val & 0x40 != 0;
        if val & 0x80 != 0 {
            self.trigger();
        }
    }

    fn trigger(&mut self) {
        self.enabled = self.envelope.dac_enabled();
        self.length.trigger();
        self.timer = self.period();
        self.envelope.trigger();
        if let Some(sweep) = self.sweep.as_mut() {
            if !sweep.trigger(self.frequency) {
                self.enabled = false;
            }
        }
    }

    pub fn clock_length(&mut self) {
        if !self.length.clock() {
            self.enabled = false;
        }
    }

    pub fn clock_sweep(&mut self) {
        if let Some(sweep) = self.sweep.as_mut() {
            let (frequency, alive) = sweep.clock();
            if let Some(f) = frequency {
                self.frequency = f;
            }
            if !alive {
                self.enabled = false;
            }
        }
    }

    pub fn tick(&mut self, cycles: u32) {
        let period = self.period();
        let duty_pos = &mut self.duty_pos;
        run_timer(&mut self.timer, cycles, period, || *duty_pos = (*duty_pos + 1) & 7);
    }

    pub fn dac_enabled(&self) -> bool {
        self.envelope.dac_enabled()
    }

    /// Digital output, 0-15.
    pub fn output(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        DUTY_TABLE[self.duty as usize][self.duty_pos as usize] * self.envelope.volume()
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.duty < 4 && self.duty_pos < 8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveChannel {
    pub enabled: bool,
    pub dac: bool,
    pub length: LengthCounter,
    pub ram: Vec<u8>,
    volume_code: u8,
    frequency: u16,
    position: u8,
    timer: u32,
}

impl Default for WaveChannel {
    fn default() -> Self {
        Self {
            enabled: false,
            dac: false,
            length: LengthCounter::new(256),
            ram: vec![0; 16],
            volume_code: 0,
            frequency: 0,
            position: 0,
            timer: 4096,
        }
    }
}

impl WaveChannel {
    fn period(&self) -> u32 {
        (2048 - self.frequency as u32) * 2
    }

    pub fn write_dac(&mut self, val: u8) {
        self.dac = val & 0x80 != 0;
        if !self.dac {
            self.enabled = false;
        }
    }

    pub fn write_length(&mut self, val: u8) {
        self.length.load(val as u16);
    }

    pub fn write_volume(&mut self, val: u8) {
        self.volume_code = (val >> 5) & 0x03;
    }

    pub fn write_frequency_low(&mut self, val: u8) {
        self.frequency = (self.frequency & 0x700) | val as u16;
    }

    pub fn write_control(&mut self, val: u8) {
        self.frequency = (self.frequency & 0xFF) | ((val as u16 & 0x07) << 8);
        self.length.enabled = val & 0x40 != 0;
        if val & 0x80 != 0 {
            self.enabled = self.dac;
            self.length.trigger();
            self.timer = self.period();
            self.position = 0;
        }
    }

    pub fn clock_length(&mut self) {
        if !self.length.clock() {
            self.enabled = false;
        }
    }

    pub fn tick(&mut self, cycles: u32) {
        let period = self.period();
        let position = &mut self.position;
        run_timer(&mut self.timer, cycles, period, || *position = (*position + 1) & 31);
    }

    pub fn output(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        let byte = self.ram[self.position as usize / 2];
        let sample = if self.position % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        match self.volume_code {
            0 => 0,
            1 => sample,
            2 => sample >> 1,
            _ => sample >> 2,
        }
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.ram.len() == 16 && self.position < 32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseChannel {
    pub enabled: bool,
    pub length: LengthCounter,
    pub envelope: Envelope,
    shift: u8,
    narrow: bool,
    divisor_code: u8,
    lfsr: u16,
    timer: u32,
}

impl Default for NoiseChannel {
    fn default() -> Self {
        Self {
            enabled: false,
            length: LengthCounter::new(64),
            envelope: Envelope::default(),
            shift: 0,
            narrow: false,
            divisor_code: 0,
            lfsr: 0x7FFF,
            timer: 8,
        }
    }
}

impl NoiseChannel {
    fn period(&self) -> u32 {
        NOISE_DIVISORS[self.divisor_code as usize] << self.shift
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.divisor_code < 8 && self.shift < 16
    }

    pub fn write_length(&mut self, val: u8) {
        self.length.load((val & 0x3F) as u16);
    }

    pub fn write_envelope(&mut self, val: u8) {
        self.envelope.write(val);
        if !self.envelope.dac_enabled() {
            self.enabled = false;
        }
    }

    pub fn write_polynomial(&mut self, val: u8) {
        self.shift = val >> 4;
        self.narrow = val & 0x08 != 0;
        self.divisor_code = val & 0x07;
    }

    pub fn write_control(&mut self, val: u8) {
        self.length.enabled = val & 0x40 != 0;
        if val & 0x80 != 0 {
            self.enabled = self.envelope.dac_enabled();
            self.length.trigger();
            self.timer = self.period();
            self.envelope.trigger();
            self.lfsr = 0x7FFF;
        }
    }

    pub fn clock_length(&mut self) {
        if !self.length.clock() {
            self.enabled = false;
        }
    }

    pub fn tick(&mut self, cycles: u32) {
        let period = self.period();
        let narrow = self.narrow;
        let lfsr = &mut self.lfsr;
        run_timer(&mut self.timer, cycles, period, || {
            let feedback = (*lfsr ^ (*lfsr >> 1)) & 1;
            *lfsr = (*lfsr >> 1) | (feedback << 14);
            if narrow {
                *lfsr = (*lfsr & !0x40) | (feedback << 6);
            }
        });
    }

    pub fn dac_enabled(&self) -> bool {
        self.envelope.dac_enabled()
    }

    pub fn output(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        (!self.lfsr & 1) as u8 * self.envelope.volume()
    }
}
