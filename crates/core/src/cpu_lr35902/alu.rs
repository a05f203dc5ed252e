//! Arithmetic/logic primitives.
//!
//! Every function here is pure: it takes operand values (and the incoming
//! flags where an instruction preserves some of them) and returns the new
//! value together with the complete new F. The execution engine decides where
//! results are stored. ALU work never costs cycles of its own; on hardware it
//! overlaps the fetch of the next opcode.

use super::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

/// Outcome of an 8-bit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flags: u8,
}

/// CB-prefixed rotate/shift family, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

impl ShiftOp {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => ShiftOp::Rlc,
            1 => ShiftOp::Rrc,
            2 => ShiftOp::Rl,
            3 => ShiftOp::Rr,
            4 => ShiftOp::Sla,
            5 => ShiftOp::Sra,
            6 => ShiftOp::Swap,
            _ => ShiftOp::Srl,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            ShiftOp::Rlc => "RLC",
            ShiftOp::Rrc => "RRC",
            ShiftOp::Rl => "RL",
            ShiftOp::Rr => "RR",
            ShiftOp::Sla => "SLA",
            ShiftOp::Sra => "SRA",
            ShiftOp::Swap => "SWAP",
            ShiftOp::Srl => "SRL",
        }
    }
}

#[inline]
fn flags(z: bool, n: bool, h: bool, c: bool) -> u8 {
    (if z { FLAG_Z } else { 0 })
        | (if n { FLAG_N } else { 0 })
        | (if h { FLAG_H } else { 0 })
        | (if c { FLAG_C } else { 0 })
}

/// ADD / ADC
pub fn add8(a: u8, b: u8, carry_in: bool) -> AluResult {
    let c = carry_in as u16;
    let sum = a as u16 + b as u16 + c;
    let value = sum as u8;
    let half = (a & 0x0F) as u16 + (b & 0x0F) as u16 + c > 0x0F;
    AluResult {
        value,
        flags: flags(value == 0, false, half, sum > 0xFF),
    }
}

/// SUB / SBC
pub fn sub8(a: u8, b: u8, carry_in: bool) -> AluResult {
    let c = carry_in as u16;
    let value = a.wrapping_sub(b).wrapping_sub(c as u8);
    let half = ((a & 0x0F) as u16) < (b & 0x0F) as u16 + c;
    let borrow = (a as u16) < b as u16 + c;
    AluResult {
        value,
        flags: flags(value == 0, true, half, borrow),
    }
}

pub fn and8(a: u8, b: u8) -> AluResult {
    let value = a & b;
    AluResult {
        value,
        flags: flags(value == 0, false, true, false),
    }
}

pub fn or8(a: u8, b: u8) -> AluResult {
    let value = a | b;
    AluResult {
        value,
        flags: flags(value == 0, false, false, false),
    }
}

pub fn xor8(a: u8, b: u8) -> AluResult {
    let value = a ^ b;
    AluResult {
        value,
        flags: flags(value == 0, false, false, false),
    }
}

/// CP: subtraction flags with the accumulator left unchanged.
pub fn cp8(a: u8, b: u8) -> AluResult {
    AluResult {
        value: a,
        flags: sub8(a, b, false).flags,
    }
}

/// INC r: carry is preserved.
pub fn inc8(val: u8, f: u8) -> AluResult {
    let value = val.wrapping_add(1);
    AluResult {
        value,
        flags: flags(value == 0, false, val & 0x0F == 0x0F, f & FLAG_C != 0),
    }
}

/// DEC r: carry is preserved.
pub fn dec8(val: u8, f: u8) -> AluResult {
    let value = val.wrapping_sub(1);
    AluResult {
        value,
        flags: flags(value == 0, true, val & 0x0F == 0x00, f & FLAG_C != 0),
    }
}

/// Decimal adjust after a BCD add or subtract.
/// An incoming carry is never cleared.
pub fn daa(a: u8, f: u8) -> AluResult {
    let subtract = f & FLAG_N != 0;
    let mut carry = f & FLAG_C != 0;
    let half = f & FLAG_H != 0;
    let mut value = a;

    if !subtract {
        if carry || value > 0x99 {
            value = value.wrapping_add(0x60);
            carry = true;
        }
        if half || value & 0x0F > 0x09 {
            value = value.wrapping_add(0x06);
        }
    } else {
        if carry {
            value = value.wrapping_sub(0x60);
        }
        if half {
            value = value.wrapping_sub(0x06);
        }
    }

    AluResult {
        value,
        flags: flags(value == 0, subtract, false, carry),
    }
}

/// CPL: complement A, set N and H.
pub fn cpl(a: u8, f: u8) -> AluResult {
    AluResult {
        value: !a,
        flags: (f & (FLAG_Z | FLAG_C)) | FLAG_N | FLAG_H,
    }
}

/// SCF: set carry, clear N and H.
pub fn scf(f: u8) -> u8 {
    (f & FLAG_Z) | FLAG_C
}

/// CCF: invert carry, clear N and H.
pub fn ccf(f: u8) -> u8 {
    (f & FLAG_Z) | (!f & FLAG_C)
}

/// CB rotate/shift: Z reflects the result.
pub fn shift(op: ShiftOp, val: u8, f: u8) -> AluResult {
    let carry_in = f & FLAG_C != 0;
    let (value, carry) = match op {
        ShiftOp::Rlc => (val.rotate_left(1), val & 0x80 != 0),
        ShiftOp::Rrc => (val.rotate_right(1), val & 0x01 != 0),
        ShiftOp::Rl => ((val << 1) | carry_in as u8, val & 0x80 != 0),
        ShiftOp::Rr => ((val >> 1) | ((carry_in as u8) << 7), val & 0x01 != 0),
        ShiftOp::Sla => (val << 1, val & 0x80 != 0),
        ShiftOp::Sra => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
        ShiftOp::Swap => (val.rotate_left(4), false),
        ShiftOp::Srl => (val >> 1, val & 0x01 != 0),
    };
    AluResult {
        value,
        flags: flags(value == 0, false, false, carry),
    }
}

/// RLCA / RRCA / RLA / RRA: like the CB forms but Z is always cleared.
pub fn rotate_accumulator(op: ShiftOp, a: u8, f: u8) -> AluResult {
    let r = shift(op, a, f);
    AluResult {
        value: r.value,
        flags: r.flags & !FLAG_Z,
    }
}

/// BIT n: Z set when the bit is clear; carry preserved.
pub fn bit(n: u8, val: u8, f: u8) -> u8 {
    flags(val & (1 << n) == 0, false, true, f & FLAG_C != 0)
}

pub fn res(n: u8, val: u8) -> u8 {
    val & !(1 << n)
}

pub fn set(n: u8, val: u8) -> u8 {
    val | (1 << n)
}

/// ADD HL,rr: H from bit 11, C from bit 15, Z preserved.
pub fn add16(a: u16, b: u16, f: u8) -> (u16, u8) {
    let sum = a as u32 + b as u32;
    let half = (a & 0x0FFF) + (b & 0x0FFF) > 0x0FFF;
    (
        sum as u16,
        flags(f & FLAG_Z != 0, false, half, sum > 0xFFFF),
    )
}

/// SP + signed offset (ADD SP,e and LD HL,SP+e).
///
/// H and C come from the unsigned add of the low byte; Z and N are cleared.
pub fn add_sp_offset(sp: u16, offset: i8) -> (u16, u8) {
    let b = offset as i16 as u16;
    let half = (sp & 0x000F) + (b & 0x000F) > 0x000F;
    let carry = (sp & 0x00FF) + (b & 0x00FF) > 0x00FF;
    (sp.wrapping_add(b), flags(false, false, half, carry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add8_half_and_full_carry() {
        let r = add8(0x0F, 0x01, false);
        assert_eq!(r.value, 0x10);
        assert_eq!(r.flags, FLAG_H);

        let r = add8(0xFF, 0x01, false);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags, FLAG_Z | FLAG_H | FLAG_C);

        let r = add8(0x0E, 0x01, true);
        assert_eq!(r.value, 0x10);
        assert_eq!(r.flags, FLAG_H);
    }

    #[test]
    fn test_sub8_borrows() {
        let r = sub8(0x10, 0x01, false);
        assert_eq!(r.value, 0x0F);
        assert_eq!(r.flags, FLAG_N | FLAG_H);

        let r = sub8(0x00, 0x01, false);
        assert_eq!(r.value, 0xFF);
        assert_eq!(r.flags, FLAG_N | FLAG_H | FLAG_C);

        let r = sub8(0x01, 0x00, true);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags, FLAG_Z | FLAG_N);
    }

    #[test]
    fn test_cp_leaves_value() {
        let r = cp8(0x42, 0x42);
        assert_eq!(r.value, 0x42);
        assert_eq!(r.flags, FLAG_Z | FLAG_N);
    }

    #[test]
    fn test_logic_ops() {
        assert_eq!(and8(0xF0, 0x0F).flags, FLAG_Z | FLAG_H);
        assert_eq!(or8(0xF0, 0x0F).value, 0xFF);
        assert_eq!(or8(0xF0, 0x0F).flags, 0);
        assert_eq!(xor8(0xAA, 0xAA).flags, FLAG_Z);
    }

    #[test]
    fn test_inc_dec_preserve_carry() {
        let r = inc8(0xFF, FLAG_C);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags, FLAG_Z | FLAG_H | FLAG_C);

        let r = inc8(0x01, 0);
        assert_eq!(r.flags, 0);

        let r = dec8(0x10, FLAG_C);
        assert_eq!(r.value, 0x0F);
        assert_eq!(r.flags, FLAG_N | FLAG_H | FLAG_C);

        let r = dec8(0x01, 0);
        assert_eq!(r.flags, FLAG_Z | FLAG_N);
    }

    #[test]
    fn test_daa_after_add() {
        // 0x45 + 0x38 = 0x7D, adjusted to BCD 83
        let sum = add8(0x45, 0x38, false);
        let r = daa(sum.value, sum.flags);
        assert_eq!(r.value, 0x83);
        assert_eq!(r.flags & FLAG_C, 0);

        // 0x99 + 0x01 = 0x9A, adjusted to 00 with carry
        let sum = add8(0x99, 0x01, false);
        let r = daa(sum.value, sum.flags);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags, FLAG_Z | FLAG_C);
    }

    #[test]
    fn test_daa_after_subtract() {
        // 0x42 - 0x15 = 0x2D (half borrow), adjusted to 27
        let diff = sub8(0x42, 0x15, false);
        let r = daa(diff.value, diff.flags);
        assert_eq!(r.value, 0x27);
        assert_eq!(r.flags, FLAG_N);
    }

    #[test]
    fn test_daa_keeps_incoming_carry() {
        // 0x80 + 0x80 = 0x00 with carry, BCD 160
        let r = daa(0x00, FLAG_C);
        assert_eq!(r.value, 0x60);
        assert_eq!(r.flags, FLAG_C);

        // Borrow out of the high digit survives the adjust
        let r = daa(0x70, FLAG_N | FLAG_C);
        assert_eq!(r.value, 0x10);
        assert_eq!(r.flags, FLAG_N | FLAG_C);
    }

    #[test]
    fn test_daa_clears_half_and_keeps_subtract() {
        let r = daa(0x00, FLAG_N | FLAG_H);
        assert_eq!(r.value, 0xFA);
        assert_eq!(r.flags & (FLAG_H | FLAG_N), FLAG_N);
    }

    #[test]
    fn test_cpl_scf_ccf() {
        let r = cpl(0x35, FLAG_C);
        assert_eq!(r.value, 0xCA);
        assert_eq!(r.flags, FLAG_N | FLAG_H | FLAG_C);

        assert_eq!(scf(FLAG_Z | FLAG_N | FLAG_H), FLAG_Z | FLAG_C);
        assert_eq!(ccf(FLAG_C | FLAG_H), 0);
        assert_eq!(ccf(FLAG_Z), FLAG_Z | FLAG_C);
    }

    #[test]
    fn test_rotates_through_carry() {
        let r = shift(ShiftOp::Rl, 0x80, 0);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags, FLAG_Z | FLAG_C);

        let r = shift(ShiftOp::Rl, 0x00, FLAG_C);
        assert_eq!(r.value, 0x01);
        assert_eq!(r.flags, 0);

        let r = shift(ShiftOp::Rr, 0x01, FLAG_C);
        assert_eq!(r.value, 0x80);
        assert_eq!(r.flags, FLAG_C);
    }

    #[test]
    fn test_circular_rotates_use_bit_seven() {
        // 0x7F must not set carry on RLC
        let r = shift(ShiftOp::Rlc, 0x7F, 0);
        assert_eq!(r.value, 0xFE);
        assert_eq!(r.flags, 0);

        let r = shift(ShiftOp::Rlc, 0x85, 0);
        assert_eq!(r.value, 0x0B);
        assert_eq!(r.flags, FLAG_C);

        let r = shift(ShiftOp::Rrc, 0x01, 0);
        assert_eq!(r.value, 0x80);
        assert_eq!(r.flags, FLAG_C);
    }

    #[test]
    fn test_shifts() {
        assert_eq!(shift(ShiftOp::Sla, 0x81, 0).value, 0x02);
        assert_eq!(shift(ShiftOp::Sra, 0x81, 0).value, 0xC0);
        assert_eq!(shift(ShiftOp::Srl, 0x81, 0).value, 0x40);
        assert_eq!(shift(ShiftOp::Srl, 0x01, 0).flags, FLAG_Z | FLAG_C);
        let r = shift(ShiftOp::Swap, 0xF0, FLAG_C);
        assert_eq!(r.value, 0x0F);
        assert_eq!(r.flags, 0);
    }

    #[test]
    fn test_accumulator_rotates_clear_zero() {
        let r = rotate_accumulator(ShiftOp::Rl, 0x80, 0);
        assert_eq!(r.value, 0x00);
        assert_eq!(r.flags, FLAG_C);
    }

    #[test]
    fn test_bit_res_set() {
        assert_eq!(bit(7, 0x80, FLAG_C), FLAG_H | FLAG_C);
        assert_eq!(bit(0, 0x80, 0), FLAG_Z | FLAG_H);
        assert_eq!(res(7, 0xFF), 0x7F);
        assert_eq!(set(3, 0x00), 0x08);
    }

    #[test]
    fn test_add16_flags() {
        let (v, f) = add16(0x8A23, 0x0605, 0);
        assert_eq!(v, 0x9028);
        assert_eq!(f, FLAG_H);

        let (v, f) = add16(0x8A23, 0x8A23, 0);
        assert_eq!(v, 0x1446);
        assert_eq!(f, FLAG_H | FLAG_C);

        let (v, f) = add16(0xFFF8, 0x0002, FLAG_Z | FLAG_N);
        assert_eq!(v, 0xFFFA);
        assert_eq!(f, FLAG_Z);
    }

    #[test]
    fn test_add_sp_offset() {
        let (v, f) = add_sp_offset(0xFFF8, 0x08);
        assert_eq!(v, 0x0000);
        assert_eq!(f, FLAG_H | FLAG_C);

        let (v, f) = add_sp_offset(0x1000, -1);
        assert_eq!(v, 0x0FFF);
        assert_eq!(f, 0);

        let (v, f) = add_sp_offset(0x00FF, 1);
        assert_eq!(v, 0x0100);
        assert_eq!(f, FLAG_H | FLAG_C);
    }
}
