//! Memory bank controllers
//!
//! Each variant holds only its register state; ROM and RAM live in the
//! [`Cartridge`](super::Cartridge) and are passed in on every access.
//!
//! | Range | MBC1 | MBC3 | MBC5 |
//! |---|---|---|---|
//! | 0000-1FFF | RAM enable | RAM/RTC enable | RAM enable |
//! | 2000-3FFF | ROM bank (5 bits) | ROM bank (7 bits) | ROM bank: 2000-2FFF low 8, 3000-3FFF bit 8 |
//! | 4000-5FFF | RAM bank / ROM bits 5-6 | RAM bank or RTC register | RAM bank (4 bits) |
//! | 6000-7FFF | banking mode | RTC latch | - |

use serde::{Deserialize, Serialize};

const ROM_BANK: usize = 0x4000;
const RAM_BANK: usize = 0x2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mbc {
    RomOnly,
    Mbc1 {
        ram_enabled: bool,
        rom_bank: u8,
        upper: u8,
        advanced_mode: bool,
    },
    Mbc3 {
        ram_enabled: bool,
        rom_bank: u8,
        /// 0-3 select a RAM bank, 08-0C an RTC register
        ram_select: u8,
    },
    Mbc5 {
        ram_enabled: bool,
        rom_bank: u16,
        ram_bank: u8,
    },
}

impl Mbc {
    /// Controller for a header cartridge-type byte; `None` if unsupported.
    pub fn for_cartridge_type(cartridge_type: u8) -> Option<Self> {
        match cartridge_type {
            0x00 | 0x08 | 0x09 => Some(Mbc::RomOnly),
            0x01..=0x03 => Some(Mbc::Mbc1 {
                ram_enabled: false,
                rom_bank: 1,
                upper: 0,
                advanced_mode: false,
            }),
            0x0F..=0x13 => Some(Mbc::Mbc3 {
                ram_enabled: false,
                rom_bank: 1,
                ram_select: 0,
            }),
            0x19..=0x1E => Some(Mbc::Mbc5 {
                ram_enabled: false,
                rom_bank: 1,
                ram_bank: 0,
            }),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mbc::RomOnly => "ROM only",
            Mbc::Mbc1 { .. } => "MBC1",
            Mbc::Mbc3 { .. } => "MBC3",
            Mbc::Mbc5 { .. } => "MBC5",
        }
    }

    /// ROM banks mapped at 0000-3FFF and 4000-7FFF.
    fn rom_banks(&self) -> (usize, usize) {
        match *self {
            Mbc::RomOnly => (0, 1),
            Mbc::Mbc1 {
                rom_bank,
                upper,
                advanced_mode,
                ..
            } => {
                let low = if advanced_mode { (upper as usize) << 5 } else { 0 };
                let bank = match rom_bank & 0x1F {
                    0 => 1,
                    b => b as usize,
                };
                (low, bank | ((upper as usize) << 5))
            }
            Mbc::Mbc3 { rom_bank, .. } => (0, (rom_bank as usize).max(1)),
            Mbc::Mbc5 { rom_bank, .. } => (0, rom_bank as usize),
        }
    }

    /// External RAM bank, or `None` when RAM is disabled or an RTC register
    /// is mapped instead.
    fn ram_bank(&self) -> Option<usize> {
        match *self {
            Mbc::RomOnly => Some(0),
            Mbc::Mbc1 {
                ram_enabled,
                upper,
                advanced_mode,
                ..
            } => ram_enabled.then_some(if advanced_mode { upper as usize } else { 0 }),
            Mbc::Mbc3 {
                ram_enabled,
                ram_select,
                ..
            } => (ram_enabled && ram_select <= 0x03).then_some(ram_select as usize),
            Mbc::Mbc5 {
                ram_enabled,
                ram_bank,
                ..
            } => ram_enabled.then_some(ram_bank as usize),
        }
    }

    fn rtc_selected(&self) -> bool {
        matches!(
            *self,
            Mbc::Mbc3 {
                ram_enabled: true,
                ram_select: 0x08..=0x0C,
                ..
            }
        )
    }

    pub fn read_rom(&self, rom: &[u8], addr: u16) -> u8 {
        if rom.is_empty() {
            return 0xFF;
        }
        let (low, high) = self.rom_banks();
        let bank = if addr < 0x4000 { low } else { high };
        let banks = rom.len().div_ceil(ROM_BANK);
        let offset = (bank % banks) * ROM_BANK + (addr as usize & (ROM_BANK - 1));
        rom.get(offset).copied().unwrap_or(0xFF)
    }

    /// Register writes into the ROM range.
    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match self {
            Mbc::RomOnly => {}
            Mbc::Mbc1 {
                ram_enabled,
                rom_bank,
                upper,
                advanced_mode,
            } => match addr {
                0x0000..=0x1FFF => *ram_enabled = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => *rom_bank = val & 0x1F,
                0x4000..=0x5FFF => *upper = val & 0x03,
                _ => *advanced_mode = val & 0x01 != 0,
            },
            Mbc::Mbc3 {
                ram_enabled,
                rom_bank,
                ram_select,
            } => match addr {
                0x0000..=0x1FFF => *ram_enabled = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => *rom_bank = val & 0x7F,
                0x4000..=0x5FFF => *ram_select = val,
                // RTC latch; the clock itself is not emulated
                _ => {}
            },
            Mbc::Mbc5 {
                ram_enabled,
                rom_bank,
                ram_bank,
            } => match addr {
                0x0000..=0x1FFF => *ram_enabled = val & 0x0F == 0x0A,
                0x2000..=0x2FFF => *rom_bank = (*rom_bank & 0x100) | val as u16,
                0x3000..=0x3FFF => *rom_bank = (*rom_bank & 0xFF) | ((val as u16 & 0x01) << 8),
                0x4000..=0x5FFF => *ram_bank = val & 0x0F,
                _ => {}
            },
        }
    }

    fn ram_offset(&self, ram: &[u8], addr: u16) -> Option<usize> {
        if ram.is_empty() {
            return None;
        }
        let bank = self.ram_bank()?;
        let banks = ram.len().div_ceil(RAM_BANK);
        let offset = (bank % banks) * RAM_BANK + (addr as usize - 0xA000);
        (offset < ram.len()).then_some(offset)
    }

    pub fn read_ram(&self, ram: &[u8], addr: u16) -> u8 {
        if self.rtc_selected() {
            return 0x00;
        }
        self.ram_offset(ram, addr).map_or(0xFF, |o| ram[o])
    }

    pub fn write_ram(&mut self, ram: &mut [u8], addr: u16, val: u8) {
        if let Some(o) = self.ram_offset(ram, addr) {
            ram[o] = val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ROM whose every bank starts with its own bank number.
    fn banked_rom(banks: usize) -> Vec<u8> {
        let mut rom = vec![0; banks * ROM_BANK];
        for bank in 0..banks {
            rom[bank * ROM_BANK] = bank as u8;
        }
        rom
    }

    #[test]
    fn test_cartridge_types() {
        assert_eq!(Mbc::for_cartridge_type(0x00).map(|m| m.name()), Some("ROM only"));
        assert_eq!(Mbc::for_cartridge_type(0x03).map(|m| m.name()), Some("MBC1"));
        assert_eq!(Mbc::for_cartridge_type(0x10).map(|m| m.name()), Some("MBC3"));
        assert_eq!(Mbc::for_cartridge_type(0x1B).map(|m| m.name()), Some("MBC5"));
        assert_eq!(Mbc::for_cartridge_type(0x05), None);
    }

    #[test]
    fn test_rom_only_maps_flat() {
        let rom = banked_rom(2);
        let mut mbc = Mbc::RomOnly;
        mbc.write_rom(0x2000, 5);
        assert_eq!(mbc.read_rom(&rom, 0x0000), 0);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 1);
    }

    #[test]
    fn test_mbc1_bank_switching() {
        let rom = banked_rom(128);
        let mut mbc = Mbc::for_cartridge_type(0x01).expect("mbc1");
        assert_eq!(mbc.read_rom(&rom, 0x4000), 1);

        mbc.write_rom(0x2000, 5);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 5);

        // Bank 0 aliases to 1
        mbc.write_rom(0x2000, 0);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 1);

        // Upper bits select banks 0x21.. and, in mode 1, the low window too
        mbc.write_rom(0x2000, 1);
        mbc.write_rom(0x4000, 1);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 0x21);
        assert_eq!(mbc.read_rom(&rom, 0x0000), 0);
        mbc.write_rom(0x6000, 1);
        assert_eq!(mbc.read_rom(&rom, 0x0000), 0x20);
    }

    #[test]
    fn test_bank_number_wraps_to_rom_size() {
        let rom = banked_rom(4);
        let mut mbc = Mbc::for_cartridge_type(0x01).expect("mbc1");
        mbc.write_rom(0x2000, 6);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 2);
    }

    #[test]
    fn test_ram_requires_enable() {
        let mut ram = vec![0; 0x8000];
        let mut mbc = Mbc::for_cartridge_type(0x03).expect("mbc1");
        mbc.write_ram(&mut ram, 0xA000, 0x42);
        assert_eq!(mbc.read_ram(&ram, 0xA000), 0xFF);

        mbc.write_rom(0x0000, 0x0A);
        mbc.write_ram(&mut ram, 0xA000, 0x42);
        assert_eq!(mbc.read_ram(&ram, 0xA000), 0x42);

        mbc.write_rom(0x0000, 0x00);
        assert_eq!(mbc.read_ram(&ram, 0xA000), 0xFF);
    }

    #[test]
    fn test_mbc3_rtc_select_reads_zero() {
        let mut ram = vec![0x55; 0x8000];
        let mut mbc = Mbc::for_cartridge_type(0x13).expect("mbc3");
        mbc.write_rom(0x0000, 0x0A);
        mbc.write_rom(0x4000, 0x02);
        mbc.write_ram(&mut ram, 0xA010, 0x99);
        assert_eq!(ram[2 * RAM_BANK + 0x10], 0x99);

        mbc.write_rom(0x4000, 0x08);
        assert_eq!(mbc.read_ram(&ram, 0xA000), 0x00);
    }

    #[test]
    fn test_mbc5_nine_bit_bank() {
        let mut rom = vec![0; 0x101 * ROM_BANK];
        rom[0x100 * ROM_BANK] = 0xAB;
        rom[0x0FF * ROM_BANK] = 0xCD;
        let mut mbc = Mbc::for_cartridge_type(0x19).expect("mbc5");

        mbc.write_rom(0x2000, 0xFF);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 0xCD);
        mbc.write_rom(0x3000, 0x01);
        mbc.write_rom(0x2000, 0x00);
        assert_eq!(mbc.read_rom(&rom, 0x4000), 0xAB);
    }
}
