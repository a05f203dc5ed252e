//! Centralized logging configuration for the emulator.
//!
//! Every component reports through [`log`], tagged with a [`LogCategory`] and a
//! [`LogLevel`]. Messages are built lazily: the closure passed to [`log`] only
//! runs when the category's effective level admits the message, so trace
//! points in the CPU loop cost one atomic load when disabled.
//!
//! # Levels
//!
//! Each category has its own level. A category left at `Off` inherits the
//! global level, so `info,cpu=trace` means "everything at Info, CPU at Trace".
//!
//! # Output
//!
//! Messages go to stderr unless [`LogConfig::set_log_file`] installs a log
//! file, in which case a background thread drains a channel into the file.
//!
//! ```rust
//! use emu_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::CPU, LogLevel::Debug, || {
//!     format!("HALT at PC={:04X}", 0x0150)
//! });
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, OnceLock};
use std::thread;

use thiserror::Error;

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

const CATEGORY_COUNT: usize = 8;

/// Log category for the emulated components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Instruction execution, lock-ups, HALT/STOP
    CPU,
    /// Memory router: contention, unusable region, unmapped I/O
    Bus,
    /// Video collaborator: LCD on/off, mode changes, frame completion
    PPU,
    /// Audio collaborator: power, channel triggers
    APU,
    /// Divider and TIMA
    Timer,
    /// Requests and dispatch
    Interrupts,
    /// OAM DMA transfers
    DMA,
    /// Header parsing and bank controller activity
    Cartridge,
}

impl LogCategory {
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::CPU,
        LogCategory::Bus,
        LogCategory::PPU,
        LogCategory::APU,
        LogCategory::Timer,
        LogCategory::Interrupts,
        LogCategory::DMA,
        LogCategory::Cartridge,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Parse a category name as used in log filters (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Some(LogCategory::CPU),
            "bus" | "mem" | "memory" => Some(LogCategory::Bus),
            "ppu" | "video" | "lcd" => Some(LogCategory::PPU),
            "apu" | "audio" | "sound" => Some(LogCategory::APU),
            "timer" => Some(LogCategory::Timer),
            "int" | "irq" | "interrupts" => Some(LogCategory::Interrupts),
            "dma" => Some(LogCategory::DMA),
            "cart" | "cartridge" | "mbc" => Some(LogCategory::Cartridge),
            _ => None,
        }
    }
}

/// Error returned when a log filter string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogFilterError {
    #[error("unknown log level '{0}'")]
    UnknownLevel(String),
    #[error("unknown log category '{0}'")]
    UnknownCategory(String),
}

/// Global logging configuration
pub struct LogConfig {
    global_level: AtomicU8,
    category_levels: [AtomicU8; CATEGORY_COUNT],
    /// Channel to the log-file writer thread, when one is running
    log_sender: Mutex<Option<Sender<String>>>,
}

impl LogConfig {
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: Default::default(),
            log_sender: Mutex::new(None),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// True when `level` passes the category's level, or the global level
    /// if the category has none of its own.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        match self.get_level(category) {
            LogLevel::Off => level <= self.get_global_level(),
            category_level => level <= category_level,
        }
    }

    /// Apply a filter of the form `info,cpu=trace,bus=debug`.
    ///
    /// A bare level sets the global level; `category=level` entries set
    /// per-category levels. Nothing is applied if any entry is invalid.
    pub fn apply_filter(&self, filter: &str) -> Result<(), LogFilterError> {
        let mut global = None;
        let mut overrides = Vec::new();
        for entry in filter.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                Some((category, level)) => {
                    let category = LogCategory::from_str(category)
                        .ok_or_else(|| LogFilterError::UnknownCategory(category.to_string()))?;
                    let level = LogLevel::from_str(level)
                        .ok_or_else(|| LogFilterError::UnknownLevel(level.to_string()))?;
                    overrides.push((category, level));
                }
                None => {
                    global = Some(
                        LogLevel::from_str(entry)
                            .ok_or_else(|| LogFilterError::UnknownLevel(entry.to_string()))?,
                    );
                }
            }
        }
        if let Some(level) = global {
            self.set_global_level(level);
        }
        for (category, level) in overrides {
            self.set_level(category, level);
        }
        Ok(())
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    /// Send log output to `path` (appending) through a background writer.
    ///
    /// Replaces any writer already running; the old thread exits once its
    /// sender is dropped.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    let _ = writeln!(file, "{}", message);
                }
                let _ = file.flush();
            })?;

        if let Ok(mut slot) = self.log_sender.lock() {
            *slot = Some(sender);
        }
        Ok(())
    }

    /// Stop writing to the log file and fall back to stderr.
    pub fn clear_log_file(&self) {
        if let Ok(mut slot) = self.log_sender.lock() {
            *slot = None;
        }
    }

    fn write_message(&self, message: String) {
        let undelivered = match self.log_sender.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(sender) => sender.send(message).err().map(|e| e.0),
                None => Some(message),
            },
            Err(_) => Some(message),
        };
        if let Some(message) = undelivered {
            eprintln!("{}", message);
        }
    }
}

/// Log a message with the specified category and level.
///
/// `message_fn` is only evaluated when the message would be emitted. The
/// output line is prefixed with the category tag.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if config.should_log(category, level) {
        config.write_message(format!("[{:?}] {}", category, message_fn()));
    }
}
