//! Run configuration: command-line flags layered over an optional JSON file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;

use emu_gb::DeviceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Dmg,
    Cgb,
}

impl From<Mode> for DeviceType {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Dmg => DeviceType::Dmg,
            Mode::Cgb => DeviceType::Cgb,
        }
    }
}

/// Run a Game Boy ROM headless and dump what it produced
#[derive(Parser, Debug, Default)]
#[command(version)]
pub struct Args {
    /// ROM image (.gb / .gbc)
    pub rom: Option<PathBuf>,

    /// Hardware to emulate
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Boot ROM image to run before the cartridge
    #[arg(long)]
    pub boot_rom: Option<PathBuf>,

    /// Start in the post-boot state even if a boot ROM is given
    #[arg(long)]
    pub skip_boot_rom: bool,

    /// Number of steps to run
    #[arg(long, conflicts_with = "cycles")]
    pub steps: Option<u64>,

    /// Number of T-cycles to run
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Core log filter, e.g. `info,cpu=trace`
    #[arg(long)]
    pub log: Option<String>,

    /// Write core log output to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Write the final RGB888 framebuffer here
    #[arg(long)]
    pub framebuffer_out: Option<PathBuf>,

    /// Write an LCD debug snapshot (JSON) here
    #[arg(long)]
    pub debug_out: Option<PathBuf>,

    /// Write a save state (JSON) here
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Print bytes sent over the serial port
    #[arg(long)]
    pub serial: bool,

    /// JSON run configuration supplying defaults for the flags above
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Fields of a `--config` file. Every field is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub rom: Option<PathBuf>,
    pub mode: Option<Mode>,
    pub boot_rom: Option<PathBuf>,
    pub skip_boot_rom: bool,
    pub steps: Option<u64>,
    pub cycles: Option<u64>,
    pub log: Option<String>,
    pub log_file: Option<PathBuf>,
    pub framebuffer_out: Option<PathBuf>,
    pub debug_out: Option<PathBuf>,
    pub save: Option<PathBuf>,
    pub serial: bool,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// How long to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Steps(u64),
    Cycles(u64),
}

/// Everything one run needs, with flags applied over the config file.
#[derive(Debug, PartialEq)]
pub struct Settings {
    pub rom: PathBuf,
    pub device: DeviceType,
    pub boot_rom: Option<PathBuf>,
    pub budget: Budget,
    pub log: Option<String>,
    pub log_file: Option<PathBuf>,
    pub framebuffer_out: Option<PathBuf>,
    pub debug_out: Option<PathBuf>,
    pub save: Option<PathBuf>,
    pub serial: bool,
}

/// One second of emulated time.
const DEFAULT_CYCLES: u64 = 60 * emu_gb::CYCLES_PER_FRAME as u64;

impl Settings {
    pub fn resolve(args: Args, config: RunConfig) -> Result<Self> {
        let rom = args
            .rom
            .or(config.rom)
            .context("no ROM given on the command line or in the config")?;

        let skip_boot_rom = args.skip_boot_rom || config.skip_boot_rom;
        let boot_rom = if skip_boot_rom {
            None
        } else {
            args.boot_rom.or(config.boot_rom)
        };

        // An explicit budget flag wins over either budget in the file
        let budget = match (args.steps, args.cycles, config.steps, config.cycles) {
            (Some(steps), _, _, _) => Budget::Steps(steps),
            (None, Some(cycles), _, _) => Budget::Cycles(cycles),
            (None, None, Some(steps), _) => Budget::Steps(steps),
            (None, None, None, Some(cycles)) => Budget::Cycles(cycles),
            (None, None, None, None) => Budget::Cycles(DEFAULT_CYCLES),
        };

        Ok(Self {
            rom,
            device: args.mode.or(config.mode).unwrap_or(Mode::Dmg).into(),
            boot_rom,
            budget,
            log: args.log.or(config.log),
            log_file: args.log_file.or(config.log_file),
            framebuffer_out: args.framebuffer_out.or(config.framebuffer_out),
            debug_out: args.debug_out.or(config.debug_out),
            save: args.save.or(config.save),
            serial: args.serial || config.serial,
        })
    }
}
