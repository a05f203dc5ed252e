//! Serial port (SB $FF01, SC $FF02)
//!
//! No link partner is ever connected. An internally clocked transfer shifts
//! out SB over 8 bits at 8192 Hz, after which SB reads 0xFF, SC bit 7 clears
//! and the Serial interrupt is requested. Transmitted bytes are kept in an
//! output log holding at most the last `OUTPUT_LIMIT` bytes; test programs
//! commonly report their results this way.

use serde::{Deserialize, Serialize};

use crate::interrupts::{Interrupt, InterruptController};

/// T-cycles for a full 8-bit transfer on the internal clock.
const TRANSFER_CYCLES: u32 = 8 * 512;

/// Bytes the output log keeps.
pub const OUTPUT_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Serial {
    sb: u8,
    sc: u8,
    /// Cycles left in the transfer in progress
    remaining: Option<u32>,
    #[serde(skip)]
    output: Vec<u8>,
}

impl Serial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            _ => self.sc | 0x7E,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.sb = val,
            _ => {
                self.sc = val & 0x81;
                // Only an internally clocked transfer ever completes
                if val & 0x81 == 0x81 {
                    if self.output.len() == OUTPUT_LIMIT {
                        self.output.drain(..OUTPUT_LIMIT / 2);
                    }
                    self.output.push(self.sb);
                    self.remaining = Some(TRANSFER_CYCLES);
                } else {
                    self.remaining = None;
                }
            }
        }
    }

    pub fn step(&mut self, cycles: u32, interrupts: &mut InterruptController) {
        if let Some(left) = self.remaining {
            if left <= cycles {
                self.remaining = None;
                self.sb = 0xFF;
                self.sc &= !0x80;
                interrupts.request(Interrupt::Serial);
            } else {
                self.remaining = Some(left - cycles);
            }
        }
    }

    /// Bytes transmitted so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Drain the output log.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}
