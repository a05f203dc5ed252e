//! Game Boy (DMG) and Game Boy Color (CGB) system
//!
//! [`GbSystem`] owns the CPU, which owns the [`bus::GbBus`] and through it
//! every collaborator. One [`GbSystem::step`] runs a fixed sequence:
//!
//! 1. CPU: dispatch a pending interrupt or execute one instruction
//! 2. OAM DMA, then any due CGB VRAM DMA blocks
//! 3. PPU (a finished frame goes to the video sink)
//! 4. Timer
//! 5. APU (samples go to the audio sink)
//! 6. Serial port
//!
//! All of them advance by the cycles the CPU just consumed, so later stages
//! see the memory side effects of the instruction executed in the same step.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use emu_core::cpu_lr35902::{CpuLr35902, MemoryLr35902};
use emu_core::{types::Frame, MountPointInfo, System};
use emu_core::logging::{log, LogCategory, LogLevel};

pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod dma;
pub mod interrupts;
pub mod joypad;
pub mod ppu;
pub mod serial;
pub mod sinks;
pub mod timer;

use apu::Apu;
use bus::{GbBus, CGB_BOOT_ROM_LEN, DMG_BOOT_ROM_LEN};
use ppu::Ppu;
pub use cartridge::{Cartridge, CartridgeError, CartridgeHeader, CgbSupport};
pub use joypad::DeviceKey;
pub use sinks::{AudioSink, NullAudioSink, NullVideoSink, VideoSink};

/// T-cycles in one 59.7 Hz frame.
pub const CYCLES_PER_FRAME: u32 = 70224;

const CARTRIDGE_MOUNT: &str = "Cartridge";

/// Hardware generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceType {
    #[default]
    Dmg,
    Cgb,
}

impl DeviceType {
    /// The mode the hardware runs a cartridge in.
    pub fn effective_mode(self, support: CgbSupport) -> DeviceType {
        match (self, support) {
            (_, CgbSupport::Exclusive) => DeviceType::Cgb,
            (device, CgbSupport::Compatible) => device,
            (_, CgbSupport::Incompatible) => DeviceType::Dmg,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum GbError {
    #[error("No cartridge loaded")]
    NoCartridge,
    #[error("Invalid mount point: {0}")]
    InvalidMountPoint(String),
    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
    #[error("\"{title}\" requires a Game Boy Color")]
    IncompatibleCartridge { title: String },
    #[error("Boot ROM of {len} bytes does not match the device")]
    InvalidBootRom { len: usize },
}

/// Read-only copy of the video state, for diagnostics and tests.
#[derive(Debug, Clone, Serialize)]
pub struct LcdDebugSnapshot {
    pub vram0: Vec<u8>,
    pub vram1: Vec<u8>,
    pub oam: Vec<u8>,
    pub bg_palette: Vec<(u8, u8, u8)>,
    pub obj_palette: Vec<(u8, u8, u8)>,
    pub framebuffer: Vec<u8>,
}

/// I/O state right after the boot ROM hands over, in write order.
const POST_BOOT_IO: [(u16, u8); 31] = [
    (0xFF05, 0x00),
    (0xFF06, 0x00),
    (0xFF07, 0x00),
    (0xFF10, 0x80),
    (0xFF11, 0xBF),
    (0xFF12, 0xF3),
    (0xFF14, 0xBF),
    (0xFF16, 0x3F),
    (0xFF17, 0x00),
    (0xFF19, 0xBF),
    (0xFF1A, 0x7F),
    (0xFF1B, 0xFF),
    (0xFF1C, 0x9F),
    (0xFF1E, 0xFF),
    (0xFF20, 0xFF),
    (0xFF21, 0x00),
    (0xFF22, 0x00),
    (0xFF23, 0xBF),
    (0xFF24, 0x77),
    (0xFF25, 0xF3),
    (0xFF26, 0xF1),
    (0xFF40, 0x91),
    (0xFF42, 0x00),
    (0xFF43, 0x00),
    (0xFF45, 0x00),
    (0xFF47, 0xFC),
    (0xFF48, 0xFF),
    (0xFF49, 0xFF),
    (0xFF4A, 0x00),
    (0xFF4B, 0x00),
    (0xFF50, 0x01),
];

pub struct GbSystem {
    cpu: CpuLr35902<GbBus>,
    device_type: DeviceType,
    /// Mode the loaded cartridge runs in
    mode: DeviceType,
    boot_rom: Option<Vec<u8>>,
    video: Box<dyn VideoSink>,
    audio: Box<dyn AudioSink>,
    total_cycles: u64,
    frame_ready: bool,
}

impl Default for GbSystem {
    fn default() -> Self {
        Self::empty(DeviceType::Dmg)
    }
}

impl GbSystem {
    /// A device with `rom` inserted, in the post-boot state.
    pub fn new(
        rom: Vec<u8>,
        device_type: DeviceType,
        video: Box<dyn VideoSink>,
        audio: Box<dyn AudioSink>,
    ) -> Result<Self, GbError> {
        let mut system = Self::empty(device_type);
        system.video = video;
        system.audio = audio;
        system.insert(rom)?;
        Ok(system)
    }

    /// A device with nothing inserted and output discarded.
    pub fn empty(device_type: DeviceType) -> Self {
        Self {
            cpu: CpuLr35902::new(GbBus::new(false)),
            device_type,
            mode: DeviceType::Dmg,
            boot_rom: None,
            video: Box::new(NullVideoSink),
            audio: Box::new(NullAudioSink),
            total_cycles: 0,
            frame_ready: false,
        }
    }

    /// Run `image` from $0000 instead of starting in the post-boot state.
    /// DMG devices take a 256-byte image, CGB devices a 2304-byte one.
    pub fn with_boot_rom(mut self, image: Vec<u8>) -> Result<Self, GbError> {
        let expected = match self.device_type {
            DeviceType::Dmg => DMG_BOOT_ROM_LEN,
            DeviceType::Cgb => CGB_BOOT_ROM_LEN,
        };
        if image.len() != expected {
            return Err(GbError::InvalidBootRom { len: image.len() });
        }
        self.boot_rom = Some(image);
        self.power_on();
        Ok(self)
    }

    fn insert(&mut self, rom: Vec<u8>) -> Result<(), GbError> {
        let cartridge = Cartridge::new(rom)?;
        let header = cartridge.header();
        if self.device_type == DeviceType::Dmg && header.cgb_support == CgbSupport::Exclusive {
            return Err(GbError::IncompatibleCartridge {
                title: header.title.clone(),
            });
        }
        self.mode = self.device_type.effective_mode(header.cgb_support);
        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!("Running in {:?} mode on {:?}", self.mode, self.device_type)
        });
        self.cpu.memory.set_cartridge(Some(cartridge));
        self.power_on();
        Ok(())
    }

    /// Fresh hardware around the inserted cartridge, then either the boot
    /// ROM or the post-boot state.
    fn power_on(&mut self) {
        let cartridge = self.cpu.memory.take_cartridge().map(|mut c| {
            c.reset();
            c
        });
        let mut bus = GbBus::new(self.mode == DeviceType::Cgb);
        bus.set_cartridge(cartridge);
        self.cpu = CpuLr35902::new(bus);
        self.total_cycles = 0;
        self.frame_ready = false;

        match self.boot_rom.clone() {
            Some(image) => self.cpu.memory.set_boot_rom(image),
            None => self.skip_boot_rom(),
        }
    }

    /// Put registers, I/O and the system counter where the boot ROM leaves
    /// them, and unmap the boot ROM.
    pub fn skip_boot_rom(&mut self) {
        let (af, bc, de, hl, counter) = match (self.device_type, self.mode) {
            (DeviceType::Dmg, _) => (0x01B0, 0x0013, 0x00D8, 0x014D, 0xABCC),
            (DeviceType::Cgb, DeviceType::Dmg) => (0x1180, 0x0000, 0x0008, 0x007C, 0x267C),
            (DeviceType::Cgb, DeviceType::Cgb) => (0x1180, 0x0000, 0xFF56, 0x000D, 0x1EA0),
        };

        let regs = &mut self.cpu.regs;
        regs.set_af(af);
        regs.set_bc(bc);
        regs.set_de(de);
        regs.set_hl(hl);
        regs.sp = 0xFFFE;
        regs.pc = 0x0100;
        self.cpu.ime = false;
        self.cpu.ime_pending = false;
        self.cpu.halted = false;
        self.cpu.stopped = false;

        let bus = &mut self.cpu.memory;
        // Sound registers only take writes once NR52 is on
        bus.write(0xFF26, 0x80);
        for (addr, val) in POST_BOOT_IO {
            bus.write(addr, val);
        }
        bus.disable_boot_rom();
        bus.timer.reset(counter);
    }

    /// Run one step and return the T-cycles it took.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step();

        let bus = &mut self.cpu.memory;
        bus.step_dma(cycles);
        if bus.ppu.step(cycles, &mut bus.interrupts) {
            self.video.present(bus.ppu.framebuffer());
            self.frame_ready = true;
        }
        bus.timer.step(cycles, &mut bus.interrupts);
        bus.apu.step(cycles, self.audio.as_mut());
        bus.serial.step(cycles, &mut bus.interrupts);

        self.total_cycles += cycles as u64;
        cycles
    }

    /// Step until a frame completes or a frame's worth of cycles passes (the
    /// LCD may be off). Returns the cycles run.
    pub fn run_frame(&mut self) -> u32 {
        self.frame_ready = false;
        let mut cycles = 0;
        while !self.frame_ready && cycles < CYCLES_PER_FRAME {
            cycles += self.step();
        }
        cycles
    }

    /// Step until at least `cycles` more T-cycles have run.
    pub fn run_cycles(&mut self, cycles: u64) {
        let target = self.total_cycles + cycles;
        while self.total_cycles < target {
            self.step();
        }
    }

    pub fn key_down(&mut self, key: DeviceKey) {
        self.cpu.memory.key_down(key);
    }

    pub fn key_up(&mut self, key: DeviceKey) {
        self.cpu.memory.joypad.key_up(key);
    }

    pub fn cpu(&self) -> &CpuLr35902<GbBus> {
        &self.cpu
    }

    pub fn bus(&self) -> &GbBus {
        &self.cpu.memory
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn mode(&self) -> DeviceType {
        self.mode
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// RGB888, row-major, 160x144.
    pub fn framebuffer(&self) -> &[u8] {
        self.cpu.memory.ppu.framebuffer()
    }

    /// Bytes sent over the serial port so far.
    pub fn serial_output(&self) -> &[u8] {
        self.cpu.memory.serial.output()
    }

    /// Drain the serial output log.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.cpu.memory.serial.take_output()
    }

    pub fn lcd_debug_snapshot(&self) -> LcdDebugSnapshot {
        let ppu = &self.cpu.memory.ppu;
        LcdDebugSnapshot {
            vram0: ppu.vram_bank_data(0).to_vec(),
            vram1: ppu.vram_bank_data(1).to_vec(),
            oam: ppu.oam().to_vec(),
            bg_palette: ppu.bg_palette().colors(),
            obj_palette: ppu.obj_palette().colors(),
            framebuffer: ppu.framebuffer().to_vec(),
        }
    }
}

/// Deserialize `field` of a save state if present, rejecting values that
/// fail `check`.
fn checked_component<T: DeserializeOwned>(
    state: &Value,
    field: &str,
    check: impl Fn(&T) -> Result<(), String>,
) -> Result<Option<T>, serde_json::Error> {
    let Some(val) = state.get(field) else {
        return Ok(None);
    };
    let component: T = serde_json::from_value(val.clone())?;
    check(&component).map_err(<serde_json::Error as serde::de::Error>::custom)?;
    Ok(Some(component))
}

impl System for GbSystem {
    type Error = GbError;

    fn reset(&mut self) {
        self.power_on();
    }

    fn step_frame(&mut self) -> Result<Frame, Self::Error> {
        if self.cpu.memory.cartridge().is_none() {
            return Err(GbError::NoCartridge);
        }
        self.run_frame();
        Ok(Frame::from_rgb(
            ppu::SCREEN_WIDTH as u32,
            ppu::SCREEN_HEIGHT as u32,
            self.framebuffer(),
        ))
    }

    fn save_state(&self) -> Value {
        let cpu = &self.cpu;
        let bus = &cpu.memory;
        let to_value = |v: Result<Value, serde_json::Error>| v.unwrap_or(Value::Null);
        json!({
            "system": "gb",
            "version": 1,
            "device_type": self.device_type,
            "mode": self.mode,
            "total_cycles": self.total_cycles,
            "cpu": {
                "a": cpu.regs.a,
                "f": cpu.regs.f(),
                "b": cpu.regs.b,
                "c": cpu.regs.c,
                "d": cpu.regs.d,
                "e": cpu.regs.e,
                "h": cpu.regs.h,
                "l": cpu.regs.l,
                "sp": cpu.regs.sp,
                "pc": cpu.regs.pc,
                "ime": cpu.ime,
                "ime_pending": cpu.ime_pending,
                "halted": cpu.halted,
                "stopped": cpu.stopped,
                "locked": cpu.locked,
            },
            "interrupts": {
                "enable": bus.interrupts.read_enable(),
                "request": bus.interrupts.requested(),
            },
            "memory": {
                "wram": bus.wram(),
                "hram": bus.hram(),
                "wram_bank": bus.wram_bank(),
                "boot_rom_enabled": bus.boot_rom_enabled(),
            },
            "cartridge": bus.cartridge().map(|c| json!({
                "mbc": to_value(serde_json::to_value(c.mbc())),
                "ram": c.ram(),
            })),
            "timer": to_value(serde_json::to_value(&bus.timer)),
            "ppu": to_value(serde_json::to_value(&bus.ppu)),
            "apu": to_value(serde_json::to_value(&bus.apu)),
            "joypad": to_value(serde_json::to_value(&bus.joypad)),
            "serial": to_value(serde_json::to_value(&bus.serial)),
            "dma": to_value(serde_json::to_value(&bus.dma)),
            "hdma": to_value(serde_json::to_value(&bus.hdma)),
        })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error> {
        macro_rules! load_u8 {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field).and_then(|v| v.as_u64()) {
                    $target = val as u8;
                }
            };
        }

        macro_rules! load_u16 {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field).and_then(|v| v.as_u64()) {
                    $target = val as u16;
                }
            };
        }

        macro_rules! load_bool {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field).and_then(|v| v.as_bool()) {
                    $target = val;
                }
            };
        }

        macro_rules! load_component {
            ($state:expr, $field:literal, $target:expr) => {
                if let Some(val) = $state.get($field) {
                    $target = serde_json::from_value(val.clone())?;
                }
            };
        }

        // Rejected before anything is overwritten
        let ppu = checked_component(v, "ppu", Ppu::validate)?;
        let apu = checked_component(v, "apu", Apu::validate)?;

        let cpu = &mut self.cpu;
        if let Some(cpu_state) = v.get("cpu") {
            let mut f = cpu.regs.f();
            load_u8!(cpu_state, "a", cpu.regs.a);
            load_u8!(cpu_state, "f", f);
            load_u8!(cpu_state, "b", cpu.regs.b);
            load_u8!(cpu_state, "c", cpu.regs.c);
            load_u8!(cpu_state, "d", cpu.regs.d);
            load_u8!(cpu_state, "e", cpu.regs.e);
            load_u8!(cpu_state, "h", cpu.regs.h);
            load_u8!(cpu_state, "l", cpu.regs.l);
            load_u16!(cpu_state, "sp", cpu.regs.sp);
            load_u16!(cpu_state, "pc", cpu.regs.pc);
            load_bool!(cpu_state, "ime", cpu.ime);
            load_bool!(cpu_state, "ime_pending", cpu.ime_pending);
            load_bool!(cpu_state, "halted", cpu.halted);
            load_bool!(cpu_state, "stopped", cpu.stopped);
            load_bool!(cpu_state, "locked", cpu.locked);
            cpu.regs.set_f(f);
        }

        let bus = &mut cpu.memory;
        if let Some(state) = v.get("interrupts") {
            let mut enable = bus.interrupts.read_enable();
            let mut request = bus.interrupts.requested();
            load_u8!(state, "enable", enable);
            load_u8!(state, "request", request);
            bus.interrupts.write_enable(enable);
            bus.interrupts.write_request(request);
        }
        if let Some(state) = v.get("memory") {
            let wram: Vec<u8> = state
                .get("wram")
                .map(|w| serde_json::from_value(w.clone()))
                .transpose()?
                .unwrap_or_default();
            let hram: Vec<u8> = state
                .get("hram")
                .map(|h| serde_json::from_value(h.clone()))
                .transpose()?
                .unwrap_or_default();
            let mut wram_bank = bus.wram_bank();
            load_u8!(state, "wram_bank", wram_bank);
            bus.restore_ram(&wram, &hram, wram_bank);
            if state.get("boot_rom_enabled").and_then(|b| b.as_bool()) == Some(false) {
                bus.disable_boot_rom();
            }
        }
        if let (Some(state), Some(cart)) = (v.get("cartridge"), bus.cartridge_mut()) {
            if let (Some(mbc), Some(ram)) = (state.get("mbc"), state.get("ram")) {
                let mbc = serde_json::from_value(mbc.clone())?;
                let ram: Vec<u8> = serde_json::from_value(ram.clone())?;
                cart.restore(mbc, &ram);
            }
        }
        load_component!(v, "timer", bus.timer);
        if let Some(ppu) = ppu {
            bus.ppu = ppu;
        }
        if let Some(apu) = apu {
            bus.apu = apu;
        }
        load_component!(v, "joypad", bus.joypad);
        load_component!(v, "serial", bus.serial);
        load_component!(v, "dma", bus.dma);
        load_component!(v, "hdma", bus.hdma);
        if let Some(total) = v.get("total_cycles").and_then(|t| t.as_u64()) {
            self.total_cycles = total;
        }
        Ok(())
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![MountPointInfo {
            id: CARTRIDGE_MOUNT.to_string(),
            name: "Cartridge Slot".to_string(),
            extensions: vec!["gb".to_string(), "gbc".to_string()],
            required: true,
        }]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        if mount_point_id != CARTRIDGE_MOUNT {
            return Err(GbError::InvalidMountPoint(mount_point_id.to_string()));
        }
        self.insert(data.to_vec())
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        if mount_point_id != CARTRIDGE_MOUNT {
            return Err(GbError::InvalidMountPoint(mount_point_id.to_string()));
        }
        self.cpu.memory.set_cartridge(None);
        Ok(())
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        mount_point_id == CARTRIDGE_MOUNT && self.cpu.memory.cartridge().is_some()
    }
}
