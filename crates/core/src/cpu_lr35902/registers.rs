//! LR35902 register file.

use std::fmt;

/// Zero
pub const FLAG_Z: u8 = 0b1000_0000;
/// Subtract
pub const FLAG_N: u8 = 0b0100_0000;
/// Half carry (carry out of bit 3, or bit 11 for 16-bit adds)
pub const FLAG_H: u8 = 0b0010_0000;
/// Carry
pub const FLAG_C: u8 = 0b0001_0000;

/// Bits of F that actually exist in hardware.
const FLAG_MASK: u8 = 0xF0;

/// 8-bit operand slots in opcode encoding order.
///
/// `IndHl` is the memory operand `(HL)`; it is not a register and the
/// register file refuses to resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    B = 0,
    C = 1,
    D = 2,
    E = 3,
    H = 4,
    L = 5,
    IndHl = 6,
    A = 7,
}

impl Reg8 {
    /// Decode the three-bit register field of an opcode.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Reg8::B,
            1 => Reg8::C,
            2 => Reg8::D,
            3 => Reg8::E,
            4 => Reg8::H,
            5 => Reg8::L,
            6 => Reg8::IndHl,
            _ => Reg8::A,
        }
    }
}

impl fmt::Display for Reg8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
            Reg8::IndHl => "(HL)",
            Reg8::A => "A",
        };
        f.write_str(name)
    }
}

/// 16-bit register views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    AF = 0,
    BC = 1,
    DE = 2,
    HL = 3,
    SP = 4,
}

impl fmt::Display for Reg16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg16::AF => "AF",
            Reg16::BC => "BC",
            Reg16::DE => "DE",
            Reg16::HL => "HL",
            Reg16::SP => "SP",
        };
        f.write_str(name)
    }
}

type PairGetter = fn(&Registers) -> u16;
type PairSetter = fn(&mut Registers, u16);

/// Accessor pairs indexed by `Reg16` discriminant.
const PAIR_ACCESSORS: [(PairGetter, PairSetter); 5] = [
    (Registers::af, Registers::set_af),
    (Registers::bc, Registers::set_bc),
    (Registers::de, Registers::set_de),
    (Registers::hl, Registers::set_hl),
    (Registers::sp, Registers::set_sp),
];

/// The CPU register file.
///
/// F is private so its low nibble can never hold a set bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    pub fn f(&self) -> u8 {
        self.f
    }

    pub fn set_f(&mut self, val: u8) {
        self.f = val & FLAG_MASK;
    }

    /// True only if every bit in `mask` is set.
    pub fn flag(&self, mask: u8) -> bool {
        self.f & mask == mask
    }

    /// Set or clear every bit in `mask`.
    pub fn set_flag(&mut self, mask: u8, on: bool) {
        if on {
            self.set_f(self.f | mask);
        } else {
            self.set_f(self.f & !mask);
        }
    }

    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }

    pub fn set_af(&mut self, val: u16) {
        let [hi, lo] = val.to_be_bytes();
        self.a = hi;
        self.set_f(lo);
    }

    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    pub fn set_bc(&mut self, val: u16) {
        [self.b, self.c] = val.to_be_bytes();
    }

    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    pub fn set_de(&mut self, val: u16) {
        [self.d, self.e] = val.to_be_bytes();
    }

    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    pub fn set_hl(&mut self, val: u16) {
        [self.h, self.l] = val.to_be_bytes();
    }

    pub fn sp(&self) -> u16 {
        self.sp
    }

    pub fn set_sp(&mut self, val: u16) {
        self.sp = val;
    }

    pub fn get16(&self, reg: Reg16) -> u16 {
        (PAIR_ACCESSORS[reg as usize].0)(self)
    }

    pub fn set16(&mut self, reg: Reg16, val: u16) {
        (PAIR_ACCESSORS[reg as usize].1)(self, val)
    }

    pub fn get8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.a,
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
            Reg8::IndHl => unreachable!("(HL) is a memory operand"),
        }
    }

    pub fn set8(&mut self, reg: Reg8, val: u8) {
        match reg {
            Reg8::A => self.a = val,
            Reg8::B => self.b = val,
            Reg8::C => self.c = val,
            Reg8::D => self.d = val,
            Reg8::E => self.e = val,
            Reg8::H => self.h = val,
            Reg8::L => self.l = val,
            Reg8::IndHl => unreachable!("(HL) is a memory operand"),
        }
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AF={:04X} BC={:04X} DE={:04X} HL={:04X} SP={:04X} PC={:04X}",
            self.af(),
            self.bc(),
            self.de(),
            self.hl(),
            self.sp,
            self.pc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_are_big_endian_views() {
        let mut regs = Registers::default();
        regs.set_bc(0x1234);
        assert_eq!((regs.b, regs.c), (0x12, 0x34));

        regs.d = 0xAB;
        regs.e = 0xCD;
        assert_eq!(regs.get16(Reg16::DE), 0xABCD);

        regs.set16(Reg16::HL, 0xBEEF);
        assert_eq!((regs.h, regs.l), (0xBE, 0xEF));

        regs.set16(Reg16::SP, 0xFFFE);
        assert_eq!(regs.sp, 0xFFFE);
    }

    #[test]
    fn test_af_write_masks_low_nibble() {
        let mut regs = Registers::default();
        regs.set_af(0x12FF);
        assert_eq!(regs.a, 0x12);
        assert_eq!(regs.f(), 0xF0);
        assert_eq!(regs.af(), 0x12F0);

        regs.set_f(0x0F);
        assert_eq!(regs.f(), 0x00);
    }

    #[test]
    fn test_flag_queries_require_all_bits() {
        let mut regs = Registers::default();
        regs.set_flag(FLAG_Z | FLAG_C, true);
        assert!(regs.flag(FLAG_Z));
        assert!(regs.flag(FLAG_Z | FLAG_C));
        assert!(!regs.flag(FLAG_Z | FLAG_N));

        regs.set_flag(FLAG_Z, false);
        assert_eq!(regs.f(), FLAG_C);
    }

    #[test]
    #[should_panic]
    fn test_indirect_hl_is_not_a_register() {
        let regs = Registers::default();
        regs.get8(Reg8::IndHl);
    }
}
