//! Joypad matrix (P1, $FF00)
//!
//! Bits 5 and 4 select the button and direction groups (0 = selected), bits
//! 3-0 report the selected keys active-low. Pressing a key requests the
//! Joypad interrupt.

use serde::{Deserialize, Serialize};

/// Physical keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKey {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl DeviceKey {
    /// Bit in the pressed mask: directions in the low nibble, buttons high.
    fn bit(self) -> u8 {
        match self {
            DeviceKey::Right => 0x01,
            DeviceKey::Left => 0x02,
            DeviceKey::Up => 0x04,
            DeviceKey::Down => 0x08,
            DeviceKey::A => 0x10,
            DeviceKey::B => 0x20,
            DeviceKey::Select => 0x40,
            DeviceKey::Start => 0x80,
        }
    }
}

const SELECT_DIRECTIONS: u8 = 0x10;
const SELECT_BUTTONS: u8 = 0x20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Joypad {
    /// Group select bits as last written (bits 5-4)
    select: u8,
    /// Pressed keys, 1 = held
    pressed: u8,
}

impl Default for Joypad {
    fn default() -> Self {
        Self {
            select: SELECT_DIRECTIONS | SELECT_BUTTONS,
            pressed: 0,
        }
    }
}

impl Joypad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> u8 {
        let mut held = 0;
        if self.select & SELECT_DIRECTIONS == 0 {
            held |= self.pressed & 0x0F;
        }
        if self.select & SELECT_BUTTONS == 0 {
            held |= self.pressed >> 4;
        }
        0xC0 | self.select | (!held & 0x0F)
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & (SELECT_DIRECTIONS | SELECT_BUTTONS);
    }

    /// Returns true if the key was not already held.
    pub fn key_down(&mut self, key: DeviceKey) -> bool {
        let newly = self.pressed & key.bit() == 0;
        self.pressed |= key.bit();
        newly
    }

    pub fn key_up(&mut self, key: DeviceKey) {
        self.pressed &= !key.bit();
    }

    pub fn is_pressed(&self, key: DeviceKey) -> bool {
        self.pressed & key.bit() != 0
    }
}
