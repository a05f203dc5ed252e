//! Interrupt controller (IE at $FFFF, IF at $FF0F)
//!
//! Collaborators raise interrupts by setting request bits; the CPU reads
//! `IE & IF` at the start of every step and acknowledges what it dispatches.

pub use emu_core::cpu_lr35902::Interrupt;
use emu_core::logging::{log, LogCategory, LogLevel};

/// The five interrupt source bits.
const SOURCE_MASK: u8 = 0x1F;

#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    /// IE: stored as written, all eight bits
    enable: u8,
    /// IF: only the five source bits exist
    request: u8,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a request bit.
    pub fn request(&mut self, interrupt: Interrupt) {
        if self.request & interrupt.mask() == 0 {
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                format!("Request {:?}", interrupt)
            });
        }
        self.request |= interrupt.mask();
    }

    pub fn acknowledge(&mut self, interrupt: Interrupt) {
        self.request &= !interrupt.mask();
    }

    /// Enabled and requested sources.
    pub fn pending(&self) -> u8 {
        self.enable & self.request & SOURCE_MASK
    }

    pub fn read_enable(&self) -> u8 {
        self.enable
    }

    pub fn write_enable(&mut self, val: u8) {
        self.enable = val;
    }

    /// IF reads with the three unused bits high.
    pub fn read_request(&self) -> u8 {
        self.request | !SOURCE_MASK
    }

    pub fn write_request(&mut self, val: u8) {
        self.request = val & SOURCE_MASK;
    }

    /// Raw request bits, without the unused high bits.
    pub fn requested(&self) -> u8 {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_pending() {
        let mut ic = InterruptController::new();
        ic.request(Interrupt::Timer);
        assert_eq!(ic.requested(), 0x04);
        assert_eq!(ic.pending(), 0);

        ic.write_enable(0xFF);
        assert_eq!(ic.pending(), 0x04);
        assert_eq!(ic.read_enable(), 0xFF);

        ic.acknowledge(Interrupt::Timer);
        assert_eq!(ic.pending(), 0);
    }

    #[test]
    fn test_if_register_masks() {
        let mut ic = InterruptController::new();
        ic.write_request(0xFF);
        assert_eq!(ic.requested(), 0x1F);
        assert_eq!(ic.read_request(), 0xFF);

        ic.write_request(0x00);
        assert_eq!(ic.read_request(), 0xE0);
    }

    #[test]
    fn test_vectors() {
        assert_eq!(Interrupt::VBlank.vector(), 0x40);
        assert_eq!(Interrupt::Stat.vector(), 0x48);
        assert_eq!(Interrupt::Timer.vector(), 0x50);
        assert_eq!(Interrupt::Serial.vector(), 0x58);
        assert_eq!(Interrupt::Joypad.vector(), 0x60);
    }
}
