//! Game Boy PPU (LCD controller)
//!
//! Each of the 154 lines takes 456 dots. Visible lines 0-143 pass through
//! OAM scan (mode 2, 80 dots), pixel transfer (mode 3, 172 dots) and HBlank
//! (mode 0); lines 144-153 are VBlank (mode 1). A line is rendered in one
//! go when its transfer ends, into an RGB888 framebuffer.
//!
//! # Registers
//!
//! - `$FF40 LCDC`: 7 LCD on, 6 window map, 5 window on, 4 BG/window tile data,
//!   3 BG map, 2 OBJ size, 1 OBJ on, 0 BG on (CGB: master priority)
//! - `$FF41 STAT`: 6 LYC source, 5 OAM source, 4 VBlank source, 3 HBlank
//!   source, 2 LY=LYC, 1-0 mode
//! - `$FF42-$FF45`: SCY, SCX, LY (read-only), LYC
//! - `$FF47-$FF49`: BGP, OBP0, OBP1
//! - `$FF4A-$FF4B`: WY, WX
//! - `$FF4F VBK`, `$FF68-$FF6B BCPS/BCPD/OCPS/OCPD`: CGB only

use serde::{Deserialize, Serialize};

use crate::interrupts::{Interrupt, InterruptController};
use emu_core::logging::{log, LogCategory, LogLevel};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;
/// RGB888 bytes in one frame.
pub const FRAMEBUFFER_LEN: usize = SCREEN_WIDTH * SCREEN_HEIGHT * 3;

const VRAM_BANK_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xA0;

const OAM_SCAN_END: u32 = 80;
const TRANSFER_END: u32 = 252;
const LINE_DOTS: u32 = 456;
const VBLANK_LINE: u8 = 144;
const LINES: u8 = 154;

const SPRITES_PER_LINE: usize = 10;

// LCDC bits
const LCDC_ENABLE: u8 = 0x80;
const LCDC_WIN_TILEMAP: u8 = 0x40;
const LCDC_WIN_ENABLE: u8 = 0x20;
const LCDC_BG_WIN_TILES: u8 = 0x10;
const LCDC_BG_TILEMAP: u8 = 0x08;
const LCDC_OBJ_SIZE: u8 = 0x04;
const LCDC_OBJ_ENABLE: u8 = 0x02;
const LCDC_BG_WIN_ENABLE: u8 = 0x01;

// STAT interrupt sources
const STAT_HBLANK: u8 = 0x08;
const STAT_VBLANK: u8 = 0x10;
const STAT_OAM: u8 = 0x20;
const STAT_LYC: u8 = 0x40;
const STAT_WRITABLE: u8 = 0x78;

/// DMG shades, lightest first.
const SHADES: [u8; 4] = [0xFF, 0xAA, 0x55, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PpuMode {
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Transfer = 3,
}

/// CGB palette RAM behind an index register (BCPS/OCPS) and a data port
/// (BCPD/OCPD). Eight palettes of four little-endian RGB555 colors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorPalette {
    data: Vec<u8>,
    index: u8,
    auto_increment: bool,
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self {
            data: vec![0xFF; 64],
            index: 0,
            auto_increment: false,
        }
    }
}

impl ColorPalette {
    pub fn read_spec(&self) -> u8 {
        0x40 | ((self.auto_increment as u8) << 7) | self.index
    }

    pub fn write_spec(&mut self, val: u8) {
        self.index = val & 0x3F;
        self.auto_increment = val & 0x80 != 0;
    }

    pub fn read_data(&self) -> u8 {
        self.data[self.index as usize]
    }

    pub fn write_data(&mut self, val: u8) {
        self.data[self.index as usize] = val;
        if self.auto_increment {
            self.index = (self.index + 1) & 0x3F;
        }
    }

    /// Color `color` (0-3) of palette `palette` (0-7) as RGB888.
    pub fn rgb(&self, palette: u8, color: u8) -> (u8, u8, u8) {
        let offset = (palette as usize & 7) * 8 + color as usize * 2;
        let raw = u16::from_le_bytes([self.data[offset], self.data[offset + 1]]);
        let expand = |c: u16| {
            let c = (c & 0x1F) as u8;
            (c << 3) | (c >> 2)
        };
        (expand(raw), expand(raw >> 5), expand(raw >> 10))
    }

    fn is_consistent(&self) -> bool {
        self.data.len() == 64 && self.index < 64
    }

    /// All 32 colors, palette by palette.
    pub fn colors(&self) -> Vec<(u8, u8, u8)> {
        (0..8)
            .flat_map(|p| (0..4).map(move |c| (p, c)))
            .map(|(p, c)| self.rgb(p, c))
            .collect()
    }
}

fn blank_framebuffer() -> Vec<u8> {
    vec![0xFF; FRAMEBUFFER_LEN]
}

/// A sprite selected for the current line.
#[derive(Debug, Clone, Copy)]
struct LineSprite {
    index: usize,
    x: i16,
    y: i16,
    tile: u8,
    attributes: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ppu {
    /// Two 8KB banks; bank 1 only reachable in CGB mode
    vram: Vec<u8>,
    vram_bank: u8,
    oam: Vec<u8>,

    lcdc: u8,
    /// Source-enable bits as written (3-6)
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    mode: PpuMode,
    /// Dot within the current line
    dot: u32,
    /// Lines of window drawn so far this frame
    window_line: u8,
    /// Combined STAT interrupt line; requests fire on its rising edge
    stat_line: bool,

    cgb: bool,
    bg_palette: ColorPalette,
    obj_palette: ColorPalette,

    #[serde(skip, default = "blank_framebuffer")]
    framebuffer: Vec<u8>,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Ppu {
    pub fn new(cgb: bool) -> Self {
        Self {
            vram: vec![0; VRAM_BANK_SIZE * 2],
            vram_bank: 0,
            oam: vec![0; OAM_SIZE],
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            mode: PpuMode::HBlank,
            dot: 0,
            window_line: 0,
            stat_line: false,
            cgb,
            bg_palette: ColorPalette::default(),
            obj_palette: ColorPalette::default(),
            framebuffer: blank_framebuffer(),
        }
    }

    /// Check buffer sizes and indices of a deserialized state.
    pub fn validate(&self) -> Result<(), String> {
        if self.vram.len() != VRAM_BANK_SIZE * 2 || self.vram_bank > 1 {
            return Err("PPU state has malformed VRAM".to_string());
        }
        if self.oam.len() != OAM_SIZE {
            return Err(format!("PPU state has {} bytes of OAM", self.oam.len()));
        }
        if !self.bg_palette.is_consistent() || !self.obj_palette.is_consistent() {
            return Err("PPU state has malformed palette RAM".to_string());
        }
        if self.ly >= LINES || self.dot >= self.mode_end() {
            return Err(format!("PPU state at line {} dot {}", self.ly, self.dot));
        }
        Ok(())
    }

    /// Dot at which the current mode ends.
    fn mode_end(&self) -> u32 {
        match self.mode {
            PpuMode::OamScan => OAM_SCAN_END,
            PpuMode::Transfer => TRANSFER_END,
            PpuMode::HBlank | PpuMode::VBlank => LINE_DOTS,
        }
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & LCDC_ENABLE != 0
    }

    pub fn mode(&self) -> PpuMode {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    /// VRAM is locked during pixel transfer.
    pub fn vram_contended(&self) -> bool {
        self.lcd_enabled() && self.mode == PpuMode::Transfer
    }

    /// OAM is locked during OAM scan and pixel transfer.
    pub fn oam_contended(&self) -> bool {
        self.lcd_enabled() && matches!(self.mode, PpuMode::OamScan | PpuMode::Transfer)
    }

    fn vram_offset(&self, addr: u16) -> usize {
        self.vram_bank as usize * VRAM_BANK_SIZE + (addr as usize & 0x1FFF)
    }

    /// Read from VRAM ($8000-$9FFF) in the selected bank
    pub fn read_vram(&self, addr: u16) -> u8 {
        self.vram[self.vram_offset(addr)]
    }

    /// Write to VRAM ($8000-$9FFF) in the selected bank
    pub fn write_vram(&mut self, addr: u16, val: u8) {
        let offset = self.vram_offset(addr);
        self.vram[offset] = val;
    }

    /// Read from OAM, `offset` 0-$9F
    pub fn read_oam(&self, offset: usize) -> u8 {
        self.oam[offset % OAM_SIZE]
    }

    /// Write to OAM, `offset` 0-$9F
    pub fn write_oam(&mut self, offset: usize, val: u8) {
        self.oam[offset % OAM_SIZE] = val;
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                let mode = if self.lcd_enabled() { self.mode as u8 } else { 0 };
                let coincidence = if self.ly == self.lyc { 0x04 } else { 0 };
                0x80 | self.stat | coincidence | mode
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            0xFF4F if self.cgb => 0xFE | self.vram_bank,
            0xFF68 if self.cgb => self.bg_palette.read_spec(),
            0xFF69 if self.cgb => self.bg_palette.read_data(),
            0xFF6A if self.cgb => self.obj_palette.read_spec(),
            0xFF6B if self.cgb => self.obj_palette.read_data(),
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => self.write_lcdc(val),
            0xFF41 => self.stat = val & STAT_WRITABLE,
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            // LY is read-only
            0xFF44 => {}
            0xFF45 => self.lyc = val,
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            0xFF4F if self.cgb => self.vram_bank = val & 0x01,
            0xFF68 if self.cgb => self.bg_palette.write_spec(val),
            0xFF69 if self.cgb => self.bg_palette.write_data(val),
            0xFF6A if self.cgb => self.obj_palette.write_spec(val),
            0xFF6B if self.cgb => self.obj_palette.write_data(val),
            _ => {}
        }
    }

    fn write_lcdc(&mut self, val: u8) {
        let was_on = self.lcd_enabled();
        self.lcdc = val;
        match (was_on, self.lcd_enabled()) {
            (true, false) => {
                log(LogCategory::PPU, LogLevel::Debug, || {
                    format!("LCD off at line {}", self.ly)
                });
                self.ly = 0;
                self.dot = 0;
                self.mode = PpuMode::HBlank;
                self.stat_line = false;
                self.framebuffer.fill(0xFF);
            }
            (false, true) => {
                log(LogCategory::PPU, LogLevel::Debug, || "LCD on".to_string());
                self.ly = 0;
                self.dot = 0;
                self.window_line = 0;
                self.mode = PpuMode::OamScan;
            }
            _ => {}
        }
    }

    /// Advance by `cycles` dots. Returns true if a frame was completed
    /// (line 144 was entered).
    pub fn step(&mut self, cycles: u32, interrupts: &mut InterruptController) -> bool {
        if !self.lcd_enabled() {
            return false;
        }

        let mut frame_done = false;
        let mut remaining = cycles;
        while remaining > 0 {
            let boundary = self.mode_end();
            let run = (boundary - self.dot).min(remaining);
            self.dot += run;
            remaining -= run;
            if self.dot == boundary {
                frame_done |= self.advance_mode(interrupts);
            }
        }
        self.update_stat_line(interrupts);
        frame_done
    }

    fn advance_mode(&mut self, interrupts: &mut InterruptController) -> bool {
        let mut frame_done = false;
        match self.mode {
            PpuMode::OamScan => self.mode = PpuMode::Transfer,
            PpuMode::Transfer => {
                self.render_scanline();
                self.mode = PpuMode::HBlank;
            }
            PpuMode::HBlank | PpuMode::VBlank => {
                self.dot = 0;
                self.ly += 1;
                if self.ly == LINES {
                    self.ly = 0;
                    self.window_line = 0;
                }
                if self.ly == VBLANK_LINE {
                    self.mode = PpuMode::VBlank;
                    interrupts.request(Interrupt::VBlank);
                    frame_done = true;
                } else if self.ly < VBLANK_LINE {
                    self.mode = PpuMode::OamScan;
                }
            }
        }
        self.update_stat_line(interrupts);
        frame_done
    }

    fn update_stat_line(&mut self, interrupts: &mut InterruptController) {
        let line = self.lcd_enabled()
            && ((self.stat & STAT_LYC != 0 && self.ly == self.lyc)
                || match self.mode {
                    PpuMode::HBlank => self.stat & STAT_HBLANK != 0,
                    PpuMode::VBlank => self.stat & STAT_VBLANK != 0,
                    PpuMode::OamScan => self.stat & STAT_OAM != 0,
                    PpuMode::Transfer => false,
                });
        if line && !self.stat_line {
            interrupts.request(Interrupt::Stat);
        }
        self.stat_line = line;
    }

    /// 2-bit color of pixel `x` in the row `row` of a tile at `tile_addr`.
    fn tile_pixel(&self, bank: usize, tile_addr: usize, row: usize, x: u8) -> u8 {
        let base = bank * VRAM_BANK_SIZE + tile_addr + row * 2;
        let lo = self.vram[base];
        let hi = self.vram[base + 1];
        let bit = 7 - x;
        (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1)
    }

    /// VRAM offset of tile data for a BG/window tile index.
    fn bg_tile_addr(&self, tile: u8) -> usize {
        if self.lcdc & LCDC_BG_WIN_TILES != 0 {
            tile as usize * 16
        } else {
            // Signed addressing around $9000
            (0x1000 + (tile as i8 as i32) * 16) as usize
        }
    }

    /// Color index, CGB palette and CGB priority bit of one BG/window pixel.
    fn map_pixel(&self, map_base: usize, x: u8, y: u8) -> (u8, u8, bool) {
        let map_addr = map_base + (y as usize / 8) * 32 + x as usize / 8;
        let tile = self.vram[map_addr];
        let attributes = if self.cgb {
            self.vram[VRAM_BANK_SIZE + map_addr]
        } else {
            0
        };
        let bank = ((attributes >> 3) & 1) as usize;
        let mut px = x % 8;
        let mut row = y % 8;
        if attributes & 0x20 != 0 {
            px = 7 - px;
        }
        if attributes & 0x40 != 0 {
            row = 7 - row;
        }
        let color = self.tile_pixel(bank, self.bg_tile_addr(tile), row as usize, px);
        (color, attributes & 0x07, attributes & 0x80 != 0)
    }

    fn put_pixel(&mut self, x: usize, rgb: (u8, u8, u8)) {
        let offset = (self.ly as usize * SCREEN_WIDTH + x) * 3;
        self.framebuffer[offset] = rgb.0;
        self.framebuffer[offset + 1] = rgb.1;
        self.framebuffer[offset + 2] = rgb.2;
    }

    fn dmg_shade(palette: u8, color: u8) -> (u8, u8, u8) {
        let shade = SHADES[((palette >> (color * 2)) & 0x03) as usize];
        (shade, shade, shade)
    }

    fn render_scanline(&mut self) {
        if self.ly as usize >= SCREEN_HEIGHT {
            return;
        }
        let ly = self.ly;

        let mut bg_color = [0u8; SCREEN_WIDTH];
        let mut bg_priority = [false; SCREEN_WIDTH];
        let mut bg_rgb = [(0xFF, 0xFF, 0xFF); SCREEN_WIDTH];

        // On DMG, LCDC bit 0 blanks BG and window; on CGB it only drops
        // their priority over sprites
        let bg_on = self.cgb || self.lcdc & LCDC_BG_WIN_ENABLE != 0;
        if bg_on {
            let map_base = if self.lcdc & LCDC_BG_TILEMAP != 0 { 0x1C00 } else { 0x1800 };
            let y = ly.wrapping_add(self.scy);
            for (screen_x, ((color, priority), rgb)) in bg_color
                .iter_mut()
                .zip(bg_priority.iter_mut())
                .zip(bg_rgb.iter_mut())
                .enumerate()
            {
                let x = (screen_x as u8).wrapping_add(self.scx);
                let (c, palette, p) = self.map_pixel(map_base, x, y);
                *color = c;
                *priority = p;
                *rgb = if self.cgb {
                    self.bg_palette.rgb(palette, c)
                } else {
                    Self::dmg_shade(self.bgp, c)
                };
            }

            let window_visible =
                self.lcdc & LCDC_WIN_ENABLE != 0 && self.wy <= ly && self.wx <= 166;
            if window_visible {
                let map_base = if self.lcdc & LCDC_WIN_TILEMAP != 0 { 0x1C00 } else { 0x1800 };
                let start = self.wx as i16 - 7;
                for screen_x in start.max(0) as usize..SCREEN_WIDTH {
                    let x = (screen_x as i16 - start) as u8;
                    let (c, palette, p) = self.map_pixel(map_base, x, self.window_line);
                    bg_color[screen_x] = c;
                    bg_priority[screen_x] = p;
                    bg_rgb[screen_x] = if self.cgb {
                        self.bg_palette.rgb(palette, c)
                    } else {
                        Self::dmg_shade(self.bgp, c)
                    };
                }
                self.window_line += 1;
            }
        }

        for (x, rgb) in bg_rgb.iter().enumerate() {
            self.put_pixel(x, *rgb);
        }

        if self.lcdc & LCDC_OBJ_ENABLE != 0 {
            self.render_sprites(&bg_color, &bg_priority);
        }
    }

    /// Up to ten sprites covering the current line, highest priority first.
    fn line_sprites(&self) -> Vec<LineSprite> {
        let height: i16 = if self.lcdc & LCDC_OBJ_SIZE != 0 { 16 } else { 8 };
        let ly = self.ly as i16;
        let mut sprites: Vec<LineSprite> = self
            .oam
            .chunks_exact(4)
            .enumerate()
            .map(|(index, entry)| LineSprite {
                index,
                y: entry[0] as i16 - 16,
                x: entry[1] as i16 - 8,
                tile: entry[2],
                attributes: entry[3],
            })
            .filter(|s| ly >= s.y && ly < s.y + height)
            .take(SPRITES_PER_LINE)
            .collect();

        // CGB priority is OAM order; DMG prefers the smaller X, then OAM order
        if !self.cgb {
            sprites.sort_by_key(|s| (s.x, s.index));
        }
        sprites
    }

    fn render_sprites(&mut self, bg_color: &[u8; SCREEN_WIDTH], bg_priority: &[bool; SCREEN_WIDTH]) {
        let tall = self.lcdc & LCDC_OBJ_SIZE != 0;
        let height: i16 = if tall { 16 } else { 8 };
        let master_priority = self.lcdc & LCDC_BG_WIN_ENABLE != 0;
        let mut claimed = [false; SCREEN_WIDTH];

        for sprite in self.line_sprites() {
            let mut row = self.ly as i16 - sprite.y;
            if sprite.attributes & 0x40 != 0 {
                row = height - 1 - row;
            }
            let tile = (if tall { sprite.tile & 0xFE } else { sprite.tile }) as usize;
            let bank = if self.cgb { ((sprite.attributes >> 3) & 1) as usize } else { 0 };
            let behind_bg = sprite.attributes & 0x80 != 0;

            for sx in 0..8u8 {
                let screen_x = sprite.x + sx as i16;
                if !(0..SCREEN_WIDTH as i16).contains(&screen_x) {
                    continue;
                }
                let screen_x = screen_x as usize;
                if claimed[screen_x] {
                    continue;
                }
                let px = if sprite.attributes & 0x20 != 0 { 7 - sx } else { sx };
                let color = self.tile_pixel(bank, tile * 16, row as usize, px);
                // Color 0 is transparent for sprites
                if color == 0 {
                    continue;
                }
                claimed[screen_x] = true;

                let bg_wins = bg_color[screen_x] != 0
                    && if self.cgb {
                        master_priority && (behind_bg || bg_priority[screen_x])
                    } else {
                        behind_bg
                    };
                if bg_wins {
                    continue;
                }

                let rgb = if self.cgb {
                    self.obj_palette.rgb(sprite.attributes & 0x07, color)
                } else {
                    let palette = if sprite.attributes & 0x10 != 0 { self.obp1 } else { self.obp0 };
                    Self::dmg_shade(palette, color)
                };
                self.put_pixel(screen_x, rgb);
            }
        }
    }

    /// RGB888, row-major, 160x144.
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    pub fn vram_bank_data(&self, bank: usize) -> &[u8] {
        let start = (bank & 1) * VRAM_BANK_SIZE;
        &self.vram[start..start + VRAM_BANK_SIZE]
    }

    pub fn oam(&self) -> &[u8] {
        &self.oam
    }

    pub fn bg_palette(&self) -> &ColorPalette {
        &self.bg_palette
    }

    pub fn obj_palette(&self) -> &ColorPalette {
        &self.obj_palette
    }
}
