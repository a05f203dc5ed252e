//! Framebuffer regression against recorded ROM runs.
//!
//! Point `GB_TEST_ROMS` at a directory holding `<name>.gb` (or `.gbc`) files
//! next to `<name>.framebuffer` files with the expected RGB888 bytes. Each
//! ROM runs for a fixed cycle budget on the device type its extension names.
//! Without the variable the test passes without doing anything.

use std::fs;
use std::path::{Path, PathBuf};

use emu_gb::ppu::FRAMEBUFFER_LEN;
use emu_gb::{DeviceType, GbSystem, NullAudioSink, NullVideoSink};

/// About 10 seconds of emulated time.
const CYCLE_BUDGET: u64 = 600 * emu_gb::CYCLES_PER_FRAME as u64;

fn cases(dir: &Path) -> Vec<(PathBuf, PathBuf)> {
    let mut cases: Vec<_> = fs::read_dir(dir)
        .expect("readable GB_TEST_ROMS directory")
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("gb") | Some("gbc")
            )
        })
        .filter_map(|rom| {
            let expected = rom.with_extension("framebuffer");
            expected.exists().then_some((rom, expected))
        })
        .collect();
    cases.sort();
    cases
}

#[test]
fn recorded_framebuffers_match() {
    let Some(dir) = std::env::var_os("GB_TEST_ROMS") else {
        eprintln!("GB_TEST_ROMS not set, skipping");
        return;
    };

    let mut failures = Vec::new();
    for (rom_path, expected_path) in cases(Path::new(&dir)) {
        let device = match rom_path.extension().and_then(|e| e.to_str()) {
            Some("gbc") => DeviceType::Cgb,
            _ => DeviceType::Dmg,
        };
        let rom = fs::read(&rom_path).expect("readable ROM");
        let expected = fs::read(&expected_path).expect("readable framebuffer");
        assert_eq!(expected.len(), FRAMEBUFFER_LEN, "{}", expected_path.display());

        let mut sys = GbSystem::new(rom, device, Box::new(NullVideoSink), Box::new(NullAudioSink))
            .expect("loadable ROM");
        sys.run_cycles(CYCLE_BUDGET);

        if sys.framebuffer() != expected.as_slice() {
            failures.push(rom_path.display().to_string());
        }
    }

    assert!(failures.is_empty(), "framebuffer mismatch: {:?}", failures);
}
