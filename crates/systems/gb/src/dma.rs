//! DMA controllers
//!
//! - OAM DMA ($FF46): writing `XX` copies `XX00-XX9F` into OAM, one byte
//!   every 4 T-cycles.
//! - CGB VRAM DMA ($FF51-$FF55): copies 16-byte blocks into the selected VRAM
//!   bank, either all at once (general purpose) or one block per HBlank.
//!
//! The bus owns the copying; these types only track progress.

use serde::{Deserialize, Serialize};

use emu_core::logging::{log, LogCategory, LogLevel};

/// Bytes in OAM.
pub const OAM_DMA_LENGTH: u8 = 0xA0;
const CYCLES_PER_BYTE: u32 = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OamDma {
    /// Last value written to $FF46
    register: u8,
    /// Next byte to copy, while a transfer is running
    index: Option<u8>,
    credit: u32,
}

impl OamDma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> u8 {
        self.register
    }

    pub fn is_active(&self) -> bool {
        self.index.is_some()
    }

    /// Start (or restart) a transfer from `page << 8`.
    pub fn start(&mut self, page: u8) {
        log(LogCategory::DMA, LogLevel::Debug, || {
            format!("OAM DMA from {:02X}00", page)
        });
        self.register = page;
        self.index = Some(0);
        self.credit = 0;
    }

    /// Grant elapsed cycles to a running transfer.
    pub fn advance(&mut self, cycles: u32) {
        if self.is_active() {
            self.credit += cycles;
        }
    }

    /// Next (source address, OAM offset) pair that is due, if any.
    pub fn next_transfer(&mut self) -> Option<(u16, usize)> {
        let index = self.index?;
        if self.credit < CYCLES_PER_BYTE {
            return None;
        }
        self.credit -= CYCLES_PER_BYTE;

        let next = index + 1;
        if next == OAM_DMA_LENGTH {
            self.index = None;
            self.credit = 0;
            log(LogCategory::DMA, LogLevel::Debug, || {
                "OAM DMA complete".to_string()
            });
        } else {
            self.index = Some(next);
        }
        Some((u16::from_be_bytes([self.register, index]), index as usize))
    }
}

/// Bytes moved per VRAM DMA block.
pub const VRAM_DMA_BLOCK: u16 = 0x10;

/// CGB VRAM DMA (HDMA1-HDMA5)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VramDma {
    source: u16,
    /// Offset into VRAM, $0000-$1FF0
    dest: u16,
    /// Blocks left while a transfer runs
    blocks: Option<u8>,
    hblank: bool,
    /// Line whose HBlank already got its block
    served_line: Option<u8>,
    /// $FF55 while idle
    idle_status: u8,
}

impl Default for VramDma {
    fn default() -> Self {
        Self {
            source: 0,
            dest: 0,
            blocks: None,
            hblank: false,
            served_line: None,
            idle_status: 0xFF,
        }
    }
}

impl VramDma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.blocks.is_some()
    }

    /// HDMA1-4 are write-only; HDMA5 reports blocks left minus one, with bit
    /// 7 clear while a transfer runs.
    pub fn read(&self, addr: u16) -> u8 {
        match (addr, self.blocks) {
            (0xFF55, Some(blocks)) => (blocks - 1) & 0x7F,
            (0xFF55, None) => self.idle_status,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF51 => self.source = (self.source & 0x00FF) | (val as u16) << 8,
            0xFF52 => self.source = (self.source & 0xFF00) | (val & 0xF0) as u16,
            0xFF53 => self.dest = (self.dest & 0x00FF) | ((val & 0x1F) as u16) << 8,
            0xFF54 => self.dest = (self.dest & 0x1F00) | (val & 0xF0) as u16,
            0xFF55 => self.control(val),
            _ => {}
        }
    }

    fn control(&mut self, val: u8) {
        if let (Some(blocks), true, 0) = (self.blocks, self.hblank, val & 0x80) {
            log(LogCategory::DMA, LogLevel::Debug, || {
                format!("HBlank VRAM DMA cancelled with {} blocks left", blocks)
            });
            self.blocks = None;
            self.idle_status = 0x80 | (blocks - 1);
            return;
        }

        self.blocks = Some((val & 0x7F) + 1);
        self.hblank = val & 0x80 != 0;
        self.served_line = None;
        log(LogCategory::DMA, LogLevel::Debug, || {
            format!(
                "{} VRAM DMA {:04X} -> {:04X}, {} bytes",
                if self.hblank { "HBlank" } else { "General" },
                self.source,
                0x8000 | self.dest,
                ((val & 0x7F) as u16 + 1) * VRAM_DMA_BLOCK
            )
        });
    }

    /// Next (source, VRAM address) block that is due. General-purpose
    /// transfers are always due; HBlank transfers once per `hblank_line`.
    pub fn next_block(&mut self, hblank_line: Option<u8>) -> Option<(u16, u16)> {
        let blocks = self.blocks?;
        if self.hblank {
            let line = hblank_line?;
            if self.served_line == Some(line) {
                return None;
            }
            self.served_line = Some(line);
        }

        let block = (self.source, 0x8000 | self.dest);
        self.source = self.source.wrapping_add(VRAM_DMA_BLOCK);
        self.dest = (self.dest + VRAM_DMA_BLOCK) & 0x1FF0;
        if blocks == 1 {
            self.blocks = None;
            self.idle_status = 0xFF;
            log(LogCategory::DMA, LogLevel::Debug, || {
                "VRAM DMA complete".to_string()
            });
        } else {
            self.blocks = Some(blocks - 1);
        }
        Some(block)
    }
}
