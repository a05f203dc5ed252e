//! Game Boy Timer implementation
//!
//! # Timer Registers
//!
//! - `$FF04 (DIV)`: High byte of the 16-bit system counter; any write resets it
//! - `$FF05 (TIMA)`: Timer counter, increments at the rate selected by TAC
//! - `$FF06 (TMA)`: Timer modulo, loaded into TIMA on overflow
//! - `$FF07 (TAC)`: Timer control
//!   - Bit 2: Timer enable (0=stop, 1=run)
//!   - Bits 1-0: Clock select
//!     - 00: CPU clock / 1024
//!     - 01: CPU clock / 16
//!     - 10: CPU clock / 64
//!     - 11: CPU clock / 256
//!
//! # Timing
//!
//! The system counter advances once per T-cycle, so DIV ticks every 256
//! cycles. TIMA runs off its own accumulator: elapsed cycles are added and
//! whole periods drained one increment at a time, so a large batch can
//! overflow TIMA more than once. Each overflow reloads TMA and requests the
//! Timer interrupt.

use serde::{Deserialize, Serialize};

use crate::interrupts::{Interrupt, InterruptController};
use emu_core::logging::{log, LogCategory, LogLevel};

/// TAC bits that exist; the rest read as 1.
const TAC_MASK: u8 = 0x07;

/// Game Boy Timer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timer {
    /// 16-bit system counter; DIV is the high byte
    system_counter: u16,
    /// Cycles not yet converted into TIMA increments
    accumulator: u32,
    tima: u8,
    tma: u8,
    tac: u8,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every register and set the system counter.
    pub fn reset(&mut self, system_counter: u16) {
        *self = Self {
            system_counter,
            ..Self::default()
        };
    }

    pub fn system_counter(&self) -> u16 {
        self.system_counter
    }

    /// TIMA period in T-cycles for the current clock select.
    fn period(&self) -> u32 {
        match self.tac & 0x03 {
            0 => 1024,
            1 => 16,
            2 => 64,
            _ => 256,
        }
    }

    fn enabled(&self) -> bool {
        self.tac & 0x04 != 0
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.system_counter >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | !TAC_MASK,
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => {
                self.system_counter = 0;
                self.accumulator = 0;
            }
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            0xFF07 => self.tac = val & TAC_MASK,
            _ => {}
        }
    }

    /// Advance by `cycles` T-cycles.
    pub fn step(&mut self, cycles: u32, interrupts: &mut InterruptController) {
        self.system_counter = self.system_counter.wrapping_add(cycles as u16);

        if !self.enabled() {
            return;
        }

        let period = self.period();
        self.accumulator += cycles;
        while self.accumulator >= period {
            self.accumulator -= period;
            let (next, overflow) = self.tima.overflowing_add(1);
            if overflow {
                self.tima = self.tma;
                interrupts.request(Interrupt::Timer);
                log(LogCategory::Timer, LogLevel::Trace, || {
                    format!("TIMA overflow, reloaded {:02X}", self.tma)
                });
            } else {
                self.tima = next;
            }
        }
    }
}
