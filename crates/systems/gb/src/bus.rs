//! Game Boy memory bus
//!
//! The bus owns every memory-mapped collaborator and routes each of the
//! 65536 addresses to exactly one of them.
//!
//! # Memory Map
//!
//! ```text
//! $0000-$00FF  Boot ROM while enabled (CGB boot ROMs also cover $0200-$08FF)
//! $0000-$7FFF  Cartridge ROM (banked by the cartridge)
//! $8000-$9FFF  Video RAM (reads $FF, writes dropped during pixel transfer)
//! $A000-$BFFF  External RAM (cartridge)
//! $C000-$CFFF  Work RAM bank 0
//! $D000-$DFFF  Work RAM bank 1 [CGB: 1-7 via SVBK $FF70]
//! $E000-$FDFF  Echo RAM (mirror of $C000-$DDFF)
//! $FE00-$FE9F  OAM (reads $FF, writes dropped during OAM scan, transfer, DMA)
//! $FEA0-$FEFF  Not usable (reads $00)
//! $FF00-$FF7F  I/O Registers
//! $FF80-$FFFE  High RAM
//! $FFFF        Interrupt Enable Register
//! ```
//!
//! # I/O Registers
//!
//! - `$FF00`: Joypad
//! - `$FF01-$FF02`: Serial
//! - `$FF04-$FF07`: Timer
//! - `$FF0F`: Interrupt flag
//! - `$FF10-$FF3F`: APU and wave RAM
//! - `$FF40-$FF4B`: PPU, with `$FF46` starting OAM DMA
//! - `$FF4F`, `$FF68-$FF6B`: CGB VRAM bank and palettes
//! - `$FF50`: Boot ROM disable (any non-zero write, permanent)
//! - `$FF51-$FF55`: CGB VRAM DMA
//! - `$FF70`: CGB work RAM bank
//!
//! Unmapped I/O reads $FF and ignores writes.

use crate::apu::Apu;
use crate::cartridge::Cartridge;
use crate::dma::{OamDma, VramDma, VRAM_DMA_BLOCK};
use crate::interrupts::{Interrupt, InterruptController};
use crate::joypad::Joypad;
use crate::ppu::{Ppu, PpuMode};
use crate::serial::Serial;
use crate::timer::Timer;
use emu_core::cpu_lr35902::{MemoryLr35902, ACCESS_CYCLES};
use emu_core::logging::{log, LogCategory, LogLevel};

const WRAM_BANK_SIZE: usize = 0x1000;
const WRAM_BANKS: usize = 8;
const HRAM_SIZE: usize = 0x7F;

/// Boot ROM sizes: DMG, CGB.
pub const DMG_BOOT_ROM_LEN: usize = 0x100;
pub const CGB_BOOT_ROM_LEN: usize = 0x900;

/// Game Boy memory bus
pub struct GbBus {
    cartridge: Option<Cartridge>,
    boot_rom: Option<Vec<u8>>,
    boot_rom_enabled: bool,
    cgb: bool,

    /// Eight 4KB banks; DMG only uses the first two
    wram: Vec<u8>,
    wram_bank: u8,
    hram: [u8; HRAM_SIZE],

    pub interrupts: InterruptController,
    pub timer: Timer,
    pub ppu: Ppu,
    pub apu: Apu,
    pub joypad: Joypad,
    pub serial: Serial,
    pub dma: OamDma,
    pub hdma: VramDma,
}

impl GbBus {
    pub fn new(cgb: bool) -> Self {
        Self {
            cartridge: None,
            boot_rom: None,
            boot_rom_enabled: false,
            cgb,
            wram: vec![0; WRAM_BANK_SIZE * WRAM_BANKS],
            wram_bank: 1,
            hram: [0; HRAM_SIZE],
            interrupts: InterruptController::new(),
            timer: Timer::new(),
            ppu: Ppu::new(cgb),
            apu: Apu::new(),
            joypad: Joypad::new(),
            serial: Serial::new(),
            dma: OamDma::new(),
            hdma: VramDma::new(),
        }
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Cartridge> {
        self.cartridge.as_mut()
    }

    pub fn set_cartridge(&mut self, cartridge: Option<Cartridge>) {
        self.cartridge = cartridge;
    }

    pub fn take_cartridge(&mut self) -> Option<Cartridge> {
        self.cartridge.take()
    }

    /// Map a boot ROM over the cartridge until $FF50 is written.
    pub fn set_boot_rom(&mut self, image: Vec<u8>) {
        self.boot_rom = Some(image);
        self.boot_rom_enabled = true;
    }

    pub fn boot_rom_enabled(&self) -> bool {
        self.boot_rom_enabled
    }

    pub fn disable_boot_rom(&mut self) {
        if self.boot_rom_enabled {
            log(LogCategory::Bus, LogLevel::Debug, || {
                "Boot ROM disabled".to_string()
            });
        }
        self.boot_rom_enabled = false;
    }

    pub fn wram(&self) -> &[u8] {
        &self.wram
    }

    pub fn hram(&self) -> &[u8] {
        &self.hram
    }

    pub fn wram_bank(&self) -> u8 {
        self.wram_bank
    }

    /// Restore RAM contents from a save state.
    pub fn restore_ram(&mut self, wram: &[u8], hram: &[u8], wram_bank: u8) {
        let n = wram.len().min(self.wram.len());
        self.wram[..n].copy_from_slice(&wram[..n]);
        let n = hram.len().min(HRAM_SIZE);
        self.hram[..n].copy_from_slice(&hram[..n]);
        self.wram_bank = wram_bank.clamp(1, 7);
    }

    fn boot_rom_byte(&self, addr: u16) -> Option<u8> {
        if !self.boot_rom_enabled {
            return None;
        }
        let boot = self.boot_rom.as_ref()?;
        let covered = addr < 0x0100
            || (boot.len() == CGB_BOOT_ROM_LEN && (0x0200..0x0900).contains(&addr));
        if covered {
            boot.get(addr as usize).copied()
        } else {
            None
        }
    }

    fn wram_offset(&self, addr: u16) -> usize {
        let addr = addr as usize & 0x1FFF;
        if addr < WRAM_BANK_SIZE {
            addr
        } else {
            self.wram_bank as usize * WRAM_BANK_SIZE + (addr - WRAM_BANK_SIZE)
        }
    }

    fn oam_locked(&self) -> bool {
        self.dma.is_active() || self.ppu.oam_contended()
    }

    /// Every address except the contended regions, which read as if
    /// uncontended. OAM DMA reads its source through this.
    fn read_mapped(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => match self.boot_rom_byte(addr) {
                Some(val) => val,
                None => self.cartridge.as_ref().map_or(0xFF, |c| c.read_rom(addr)),
            },
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xA000..=0xBFFF => self.cartridge.as_ref().map_or(0xFF, |c| c.read_ram(addr)),
            0xC000..=0xFDFF => self.wram[self.wram_offset(addr)],
            0xFE00..=0xFE9F => self.ppu.read_oam((addr - 0xFE00) as usize),
            0xFEA0..=0xFEFF => {
                log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("Read from unusable {:04X}", addr)
                });
                0x00
            }
            0xFF00..=0xFF7F => self.read_io(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.interrupts.read_enable(),
        }
    }

    fn read_io(&self, addr: u16) -> u8 {
        match addr {
            0xFF00 => self.joypad.read(),
            0xFF01..=0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read_register(addr),
            0xFF0F => self.interrupts.read_request(),
            0xFF10..=0xFF3F => self.apu.read_register(addr),
            0xFF46 => self.dma.register(),
            0xFF40..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6B => self.ppu.read_register(addr),
            0xFF51..=0xFF55 if self.cgb => self.hdma.read(addr),
            0xFF70 if self.cgb => 0xF8 | self.wram_bank,
            _ => 0xFF,
        }
    }

    fn write_io(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF00 => self.joypad.write(val),
            0xFF01..=0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write_register(addr, val),
            0xFF0F => self.interrupts.write_request(val),
            0xFF10..=0xFF3F => self.apu.write_register(addr, val),
            0xFF46 => self.dma.start(val),
            0xFF40..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6B => self.ppu.write_register(addr, val),
            0xFF50 => {
                if val != 0 {
                    self.disable_boot_rom();
                }
            }
            0xFF51..=0xFF55 if self.cgb => self.hdma.write(addr, val),
            0xFF70 if self.cgb => self.wram_bank = (val & 0x07).max(1),
            _ => {}
        }
    }

    /// DMA sources at $E000 and above read work RAM.
    fn read_dma_source(&self, addr: u16) -> u8 {
        if addr >= 0xE000 {
            self.wram[self.wram_offset(addr - 0x2000)]
        } else {
            self.read_mapped(addr)
        }
    }

    /// Copy whatever OAM DMA bytes `cycles` pay for, then any VRAM DMA
    /// blocks that are due.
    pub fn step_dma(&mut self, cycles: u32) {
        self.dma.advance(cycles);
        while let Some((src, offset)) = self.dma.next_transfer() {
            let val = self.read_dma_source(src);
            self.ppu.write_oam(offset, val);
        }

        let hblank_line = (self.ppu.lcd_enabled()
            && self.ppu.mode() == PpuMode::HBlank)
            .then(|| self.ppu.ly());
        while let Some((src, dest)) = self.hdma.next_block(hblank_line) {
            for i in 0..VRAM_DMA_BLOCK {
                let val = self.read_mapped(src.wrapping_add(i));
                self.ppu.write_vram(dest + i, val);
            }
        }
    }

    /// Record a key press; newly pressed keys request the Joypad interrupt.
    pub fn key_down(&mut self, key: crate::joypad::DeviceKey) {
        if self.joypad.key_down(key) {
            self.interrupts.request(Interrupt::Joypad);
        }
    }
}

impl MemoryLr35902 for GbBus {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x8000..=0x9FFF if self.ppu.vram_contended() => {
                log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("VRAM read {:04X} during pixel transfer", addr)
                });
                0xFF
            }
            0xFE00..=0xFE9F if self.oam_locked() => {
                log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("OAM read {:04X} while locked", addr)
                });
                0xFF
            }
            _ => self.read_mapped(addr),
        }
    }

    fn write(&mut self, addr: u16, val: u8) -> u32 {
        match addr {
            0x0000..=0x7FFF => {
                if let Some(cart) = self.cartridge.as_mut() {
                    cart.write_rom(addr, val);
                }
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_contended() {
                    log(LogCategory::Bus, LogLevel::Trace, || {
                        format!("VRAM write {:04X}={:02X} during pixel transfer dropped", addr, val)
                    });
                } else {
                    self.ppu.write_vram(addr, val);
                }
            }
            0xA000..=0xBFFF => {
                if let Some(cart) = self.cartridge.as_mut() {
                    cart.write_ram(addr, val);
                }
            }
            0xC000..=0xFDFF => {
                let offset = self.wram_offset(addr);
                self.wram[offset] = val;
            }
            0xFE00..=0xFE9F => {
                if self.oam_locked() {
                    log(LogCategory::Bus, LogLevel::Trace, || {
                        format!("OAM write {:04X}={:02X} while locked dropped", addr, val)
                    });
                } else {
                    self.ppu.write_oam((addr - 0xFE00) as usize, val);
                }
            }
            0xFEA0..=0xFEFF => {
                log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("Write {:02X} to unusable {:04X} ignored", val, addr)
                });
            }
            0xFF00..=0xFF7F => self.write_io(addr, val),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.interrupts.write_enable(val),
        }
        ACCESS_CYCLES
    }

    fn interrupt_enable(&self) -> u8 {
        self.interrupts.read_enable()
    }

    fn interrupt_request(&self) -> u8 {
        self.interrupts.requested()
    }

    fn pending_interrupts(&self) -> u8 {
        self.interrupts.pending()
    }

    fn acknowledge(&mut self, interrupt: Interrupt) {
        self.interrupts.acknowledge(interrupt);
    }
}
