//! Cartridge images
//!
//! The header at 0x0100-0x014F describes the cartridge:
//!
//! - `0x0134-0x0143`: Title (upper-case ASCII, zero padded)
//! - `0x0143`: CGB flag (0x80 = works on both, 0xC0 = CGB only)
//! - `0x0147`: Cartridge type (selects the bank controller)
//! - `0x0148`: ROM size code (32KB << n)
//! - `0x0149`: External RAM size code

mod mbc;

pub use mbc::Mbc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use emu_core::logging::{log, LogCategory, LogLevel};

const HEADER_END: usize = 0x150;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("Cartridge image is {0} bytes, shorter than its header")]
    HeaderTruncated(usize),
}

/// What the cartridge declares about Game Boy Color support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CgbSupport {
    /// Plain DMG cartridge
    Incompatible,
    /// Runs on both; uses CGB features when available
    Compatible,
    /// Refuses to run on a DMG
    Exclusive,
}

impl CgbSupport {
    pub fn from_flag(flag: u8) -> Self {
        match flag {
            0xC0 => CgbSupport::Exclusive,
            0x80 => CgbSupport::Compatible,
            _ => CgbSupport::Incompatible,
        }
    }
}

/// Parsed cartridge header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartridgeHeader {
    pub title: String,
    pub cgb_support: CgbSupport,
    pub cartridge_type: u8,
    pub rom_size: usize,
    pub ram_size: usize,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Result<Self, CartridgeError> {
        if rom.len() < HEADER_END {
            return Err(CartridgeError::HeaderTruncated(rom.len()));
        }

        let cgb_flag = rom[0x143];
        let cgb_support = CgbSupport::from_flag(cgb_flag);
        // CGB titles give up their last byte to the CGB flag
        let title_end = if cgb_flag & 0x80 != 0 { 0x143 } else { 0x144 };
        let title = rom[0x134..title_end]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect::<String>()
            .trim_end()
            .to_string();

        let rom_size = match rom[0x148] {
            code @ 0x00..=0x08 => 0x8000 << code,
            _ => rom.len(),
        };
        let ram_size = match rom[0x149] {
            0x02 => 8 * 1024,
            0x03 => 32 * 1024,
            0x04 => 128 * 1024,
            0x05 => 64 * 1024,
            _ => 0,
        };

        Ok(Self {
            title,
            cgb_support,
            cartridge_type: rom[0x147],
            rom_size,
            ram_size,
        })
    }
}

/// A cartridge: ROM, external RAM and the bank controller between them.
#[derive(Debug, Clone)]
pub struct Cartridge {
    header: CartridgeHeader,
    rom: Vec<u8>,
    ram: Vec<u8>,
    mbc: Mbc,
}

impl Cartridge {
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = CartridgeHeader::parse(&rom)?;
        let mbc = Mbc::for_cartridge_type(header.cartridge_type).unwrap_or_else(|| {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "Unsupported cartridge type {:02X}, mapping as ROM only",
                    header.cartridge_type
                )
            });
            Mbc::RomOnly
        });
        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!(
                "\"{}\" type {:02X} ({}), ROM {}KB, RAM {}KB, {:?}",
                header.title,
                header.cartridge_type,
                mbc.name(),
                rom.len() / 1024,
                header.ram_size / 1024,
                header.cgb_support
            )
        });

        Ok(Self {
            ram: vec![0; header.ram_size],
            header,
            rom,
            mbc,
        })
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    pub fn mbc(&self) -> &Mbc {
        &self.mbc
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        self.mbc.read_rom(&self.rom, addr)
    }

    pub fn write_rom(&mut self, addr: u16, val: u8) {
        self.mbc.write_rom(addr, val);
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        self.mbc.read_ram(&self.ram, addr)
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        self.mbc.write_ram(&mut self.ram, addr, val);
    }

    /// External RAM contents, for battery saves.
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Restore controller registers and external RAM from a save state.
    pub fn restore(&mut self, mbc: Mbc, ram: &[u8]) {
        self.mbc = mbc;
        let n = ram.len().min(self.ram.len());
        self.ram[..n].copy_from_slice(&ram[..n]);
    }

    /// Controller registers back to their power-on values.
    pub fn reset(&mut self) {
        if let Some(mbc) = Mbc::for_cartridge_type(self.header.cartridge_type) {
            self.mbc = mbc;
        }
    }
}
