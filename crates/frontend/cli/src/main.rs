use std::fs;
use std::io::Write;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;

use emu_core::logging::LogConfig;
use emu_core::System;
use emu_gb::{GbSystem, NullAudioSink, NullVideoSink};

mod config;

use config::{Args, Budget, RunConfig, Settings};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match args.config.as_deref() {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    let settings = Settings::resolve(args, config)?;

    // Core logs stay off unless a filter is given
    if let Some(filter) = settings.log.as_deref() {
        LogConfig::global()
            .apply_filter(filter)
            .map_err(|e| anyhow!("invalid --log filter: {}", e))?;
    }
    if let Some(path) = settings.log_file.as_ref() {
        LogConfig::global()
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }

    let rom = fs::read(&settings.rom)
        .with_context(|| format!("reading ROM {}", settings.rom.display()))?;
    let mut sys = GbSystem::new(
        rom,
        settings.device,
        Box::new(NullVideoSink),
        Box::new(NullAudioSink),
    )?;
    if let Some(path) = settings.boot_rom.as_ref() {
        let image =
            fs::read(path).with_context(|| format!("reading boot ROM {}", path.display()))?;
        sys = sys.with_boot_rom(image)?;
    }
    info!(
        "Running {} on {:?} in {:?} mode",
        settings.rom.display(),
        sys.device_type(),
        sys.mode()
    );

    match settings.budget {
        Budget::Steps(steps) => {
            for _ in 0..steps {
                sys.step();
            }
        }
        Budget::Cycles(cycles) => sys.run_cycles(cycles),
    }
    info!("Ran {} cycles, PC={:04X}", sys.total_cycles(), sys.cpu().regs.pc);

    if let Some(path) = settings.framebuffer_out.as_ref() {
        fs::write(path, sys.framebuffer())
            .with_context(|| format!("writing framebuffer {}", path.display()))?;
    }
    if let Some(path) = settings.debug_out.as_ref() {
        let snapshot = serde_json::to_string_pretty(&sys.lcd_debug_snapshot())?;
        fs::write(path, snapshot)
            .with_context(|| format!("writing debug snapshot {}", path.display()))?;
    }
    if let Some(path) = settings.save.as_ref() {
        let state = serde_json::to_string_pretty(&sys.save_state())?;
        fs::write(path, state).with_context(|| format!("writing save state {}", path.display()))?;
    }
    if settings.serial {
        let mut stdout = std::io::stdout();
        stdout.write_all(sys.serial_output())?;
        stdout.flush()?;
    }

    LogConfig::global().clear_log_file();
    Ok(())
}
