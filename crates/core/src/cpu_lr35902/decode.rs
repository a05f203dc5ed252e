//! Opcode decoding.
//!
//! The 256 primary opcodes and the 256 CB-prefixed opcodes are decoded once,
//! at compile time, into [`PRIMARY`] and [`CB_PREFIXED`]. The engine looks an
//! opcode up and matches on the resulting [`Instruction`].

use std::fmt;

use super::alu::ShiftOp;
use super::registers::{Reg16, Reg8};

/// Branch condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    NZ,
    Z,
    NC,
    C,
}

impl Cond {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Cond::NZ,
            1 => Cond::Z,
            2 => Cond::NC,
            _ => Cond::C,
        }
    }
}

/// Accumulator ALU operation, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => AluOp::Add,
            1 => AluOp::Adc,
            2 => AluOp::Sub,
            3 => AluOp::Sbc,
            4 => AluOp::And,
            5 => AluOp::Xor,
            6 => AluOp::Or,
            _ => AluOp::Cp,
        }
    }
}

/// Memory operand addressed through a register pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indirect {
    BC,
    DE,
    /// (HL+): post-increment
    HlInc,
    /// (HL-): post-decrement
    HlDec,
}

impl Indirect {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Indirect::BC,
            1 => Indirect::DE,
            2 => Indirect::HlInc,
            _ => Indirect::HlDec,
        }
    }
}

/// A decoded primary opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Stop,
    Halt,
    Di,
    Ei,
    /// Never-defined opcode; locks the CPU.
    Illegal(u8),
    /// CB prefix; the next byte selects from [`CB_PREFIXED`].
    Prefix,

    Ld(Reg8, Reg8),
    LdImm(Reg8),
    LdImm16(Reg16),
    StoreA(Indirect),
    LoadA(Indirect),
    /// LD (a16),SP
    StoreSp,
    /// LD (a16),A
    StoreAbsA,
    /// LD A,(a16)
    LoadAbsA,
    /// LDH (a8),A
    StoreHighA,
    /// LDH A,(a8)
    LoadHighA,
    /// LD (C),A
    StoreHighCA,
    /// LD A,(C)
    LoadHighCA,
    LdSpHl,
    LdHlSpOffset,

    Inc(Reg8),
    Dec(Reg8),
    Inc16(Reg16),
    Dec16(Reg16),
    AddHl(Reg16),
    AddSpOffset,
    Alu(AluOp, Reg8),
    AluImm(AluOp),

    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,

    Jr,
    JrCond(Cond),
    Jp,
    JpCond(Cond),
    JpHl,
    Call,
    CallCond(Cond),
    Ret,
    RetCond(Cond),
    Reti,
    Rst(u8),
    Push(Reg16),
    Pop(Reg16),
}

/// A decoded CB-prefixed opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbInstruction {
    Shift(ShiftOp, Reg8),
    Bit(u8, Reg8),
    Res(u8, Reg8),
    Set(u8, Reg8),
}

/// rr field for most 16-bit ops (SP in slot 3).
const fn pair_sp(bits: u8) -> Reg16 {
    match bits & 0x03 {
        0 => Reg16::BC,
        1 => Reg16::DE,
        2 => Reg16::HL,
        _ => Reg16::SP,
    }
}

/// rr field for PUSH/POP (AF in slot 3).
const fn pair_af(bits: u8) -> Reg16 {
    match bits & 0x03 {
        0 => Reg16::BC,
        1 => Reg16::DE,
        2 => Reg16::HL,
        _ => Reg16::AF,
    }
}

const fn decode(op: u8) -> Instruction {
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let p = y >> 1;

    match op {
        0x00 => Instruction::Nop,
        0x08 => Instruction::StoreSp,
        0x10 => Instruction::Stop,
        0x18 => Instruction::Jr,
        0x20 | 0x28 | 0x30 | 0x38 => Instruction::JrCond(Cond::from_bits(y)),
        0x07 => Instruction::Rlca,
        0x0F => Instruction::Rrca,
        0x17 => Instruction::Rla,
        0x1F => Instruction::Rra,
        0x27 => Instruction::Daa,
        0x2F => Instruction::Cpl,
        0x37 => Instruction::Scf,
        0x3F => Instruction::Ccf,
        0x76 => Instruction::Halt,
        0x00..=0x3F => match z {
            1 if y & 1 == 0 => Instruction::LdImm16(pair_sp(p)),
            1 => Instruction::AddHl(pair_sp(p)),
            2 if y & 1 == 0 => Instruction::StoreA(Indirect::from_bits(p)),
            2 => Instruction::LoadA(Indirect::from_bits(p)),
            3 if y & 1 == 0 => Instruction::Inc16(pair_sp(p)),
            3 => Instruction::Dec16(pair_sp(p)),
            4 => Instruction::Inc(Reg8::from_bits(y)),
            5 => Instruction::Dec(Reg8::from_bits(y)),
            _ => Instruction::LdImm(Reg8::from_bits(y)),
        },
        0x40..=0x7F => Instruction::Ld(Reg8::from_bits(y), Reg8::from_bits(z)),
        0x80..=0xBF => Instruction::Alu(AluOp::from_bits(y), Reg8::from_bits(z)),

        0xC0 | 0xC8 | 0xD0 | 0xD8 => Instruction::RetCond(Cond::from_bits(y)),
        0xC2 | 0xCA | 0xD2 | 0xDA => Instruction::JpCond(Cond::from_bits(y)),
        0xC4 | 0xCC | 0xD4 | 0xDC => Instruction::CallCond(Cond::from_bits(y)),
        0xC1 | 0xD1 | 0xE1 | 0xF1 => Instruction::Pop(pair_af(p)),
        0xC5 | 0xD5 | 0xE5 | 0xF5 => Instruction::Push(pair_af(p)),
        0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
            Instruction::AluImm(AluOp::from_bits(y))
        }
        0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => Instruction::Rst(y * 8),
        0xC3 => Instruction::Jp,
        0xC9 => Instruction::Ret,
        0xCB => Instruction::Prefix,
        0xCD => Instruction::Call,
        0xD9 => Instruction::Reti,
        0xE0 => Instruction::StoreHighA,
        0xE2 => Instruction::StoreHighCA,
        0xE8 => Instruction::AddSpOffset,
        0xE9 => Instruction::JpHl,
        0xEA => Instruction::StoreAbsA,
        0xF0 => Instruction::LoadHighA,
        0xF2 => Instruction::LoadHighCA,
        0xF3 => Instruction::Di,
        0xF8 => Instruction::LdHlSpOffset,
        0xF9 => Instruction::LdSpHl,
        0xFA => Instruction::LoadAbsA,
        0xFB => Instruction::Ei,
        // D3 DB DD E3 E4 EB EC ED F4 FC FD
        _ => Instruction::Illegal(op),
    }
}

const fn decode_cb(op: u8) -> CbInstruction {
    let y = (op >> 3) & 0x07;
    let reg = Reg8::from_bits(op);
    match op >> 6 {
        0 => CbInstruction::Shift(ShiftOp::from_bits(y), reg),
        1 => CbInstruction::Bit(y, reg),
        2 => CbInstruction::Res(y, reg),
        _ => CbInstruction::Set(y, reg),
    }
}

const fn build_primary() -> [Instruction; 256] {
    let mut table = [Instruction::Nop; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode(i as u8);
        i += 1;
    }
    table
}

const fn build_cb() -> [CbInstruction; 256] {
    let mut table = [CbInstruction::Bit(0, Reg8::B); 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode_cb(i as u8);
        i += 1;
    }
    table
}

/// Primary opcode table.
pub static PRIMARY: [Instruction; 256] = build_primary();

/// CB-prefixed opcode table.
pub static CB_PREFIXED: [CbInstruction; 256] = build_cb();

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cond::NZ => "NZ",
            Cond::Z => "Z",
            Cond::NC => "NC",
            Cond::C => "C",
        })
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AluOp::Add => "ADD A,",
            AluOp::Adc => "ADC A,",
            AluOp::Sub => "SUB ",
            AluOp::Sbc => "SBC A,",
            AluOp::And => "AND ",
            AluOp::Xor => "XOR ",
            AluOp::Or => "OR ",
            AluOp::Cp => "CP ",
        })
    }
}

impl fmt::Display for Indirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Indirect::BC => "(BC)",
            Indirect::DE => "(DE)",
            Indirect::HlInc => "(HL+)",
            Indirect::HlDec => "(HL-)",
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match self {
            Nop => write!(f, "NOP"),
            Stop => write!(f, "STOP"),
            Halt => write!(f, "HALT"),
            Di => write!(f, "DI"),
            Ei => write!(f, "EI"),
            Illegal(op) => write!(f, "ILLEGAL {:02X}", op),
            Prefix => write!(f, "PREFIX CB"),
            Ld(dst, src) => write!(f, "LD {},{}", dst, src),
            LdImm(r) => write!(f, "LD {},d8", r),
            LdImm16(rr) => write!(f, "LD {},d16", rr),
            StoreA(ind) => write!(f, "LD {},A", ind),
            LoadA(ind) => write!(f, "LD A,{}", ind),
            StoreSp => write!(f, "LD (a16),SP"),
            StoreAbsA => write!(f, "LD (a16),A"),
            LoadAbsA => write!(f, "LD A,(a16)"),
            StoreHighA => write!(f, "LDH (a8),A"),
            LoadHighA => write!(f, "LDH A,(a8)"),
            StoreHighCA => write!(f, "LD (C),A"),
            LoadHighCA => write!(f, "LD A,(C)"),
            LdSpHl => write!(f, "LD SP,HL"),
            LdHlSpOffset => write!(f, "LD HL,SP+r8"),
            Inc(r) => write!(f, "INC {}", r),
            Dec(r) => write!(f, "DEC {}", r),
            Inc16(rr) => write!(f, "INC {}", rr),
            Dec16(rr) => write!(f, "DEC {}", rr),
            AddHl(rr) => write!(f, "ADD HL,{}", rr),
            AddSpOffset => write!(f, "ADD SP,r8"),
            Alu(op, r) => write!(f, "{}{}", op, r),
            AluImm(op) => write!(f, "{}d8", op),
            Rlca => write!(f, "RLCA"),
            Rrca => write!(f, "RRCA"),
            Rla => write!(f, "RLA"),
            Rra => write!(f, "RRA"),
            Daa => write!(f, "DAA"),
            Cpl => write!(f, "CPL"),
            Scf => write!(f, "SCF"),
            Ccf => write!(f, "CCF"),
            Jr => write!(f, "JR r8"),
            JrCond(c) => write!(f, "JR {},r8", c),
            Jp => write!(f, "JP a16"),
            JpCond(c) => write!(f, "JP {},a16", c),
            JpHl => write!(f, "JP HL"),
            Call => write!(f, "CALL a16"),
            CallCond(c) => write!(f, "CALL {},a16", c),
            Ret => write!(f, "RET"),
            RetCond(c) => write!(f, "RET {}", c),
            Reti => write!(f, "RETI"),
            Rst(v) => write!(f, "RST {:02X}H", v),
            Push(rr) => write!(f, "PUSH {}", rr),
            Pop(rr) => write!(f, "POP {}", rr),
        }
    }
}

impl fmt::Display for CbInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CbInstruction::Shift(op, r) => write!(f, "{} {}", op.mnemonic(), r),
            CbInstruction::Bit(n, r) => write!(f, "BIT {},{}", n, r),
            CbInstruction::Res(n, r) => write!(f, "RES {},{}", n, r),
            CbInstruction::Set(n, r) => write!(f, "SET {},{}", n, r),
        }
    }
}
