//! Sharp LR35902 CPU core (Game Boy CPU)
//!
//! A Z80-like CPU with some instructions removed and others added. The core
//! is generic over [`MemoryLr35902`], so it runs against the Game Boy memory
//! router as well as against a flat test memory.
//!
//! # Cycle accounting
//!
//! Counts are in T-cycles (4.194304 MHz). Every byte access, including opcode
//! and operand fetches, costs [`ACCESS_CYCLES`]; internal delays cost the same
//! again. An instruction's cost is simply the sum of what it did, so a taken
//! `JR` (fetch, fetch, delay) is 12 and an untaken one is 8.
//!
//! # Interrupts
//!
//! At the start of every [`CpuLr35902::step`] the CPU checks `IE & IF`. A
//! pending interrupt wakes HALT even with IME clear; with IME set the lowest
//! pending bit is dispatched (20 cycles) and no opcode runs that step. `EI`
//! takes effect after the instruction that follows it.

pub mod alu;
pub mod decode;
pub mod registers;

use crate::logging::{log, LogCategory, LogLevel};

use alu::AluResult;
use decode::{AluOp, CbInstruction, Cond, Indirect, Instruction, CB_PREFIXED, PRIMARY};
pub use registers::{Reg16, Reg8, Registers, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

/// T-cycles charged for one byte access or one internal delay.
pub const ACCESS_CYCLES: u32 = 4;

/// Address of the interrupt enable register.
pub const IE_ADDR: u16 = 0xFFFF;
/// Address of the interrupt request register.
pub const IF_ADDR: u16 = 0xFF0F;

/// Interrupt sources, lowest bit first (which is also priority order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0,
    Stat = 1,
    Timer = 2,
    Serial = 3,
    Joypad = 4,
}

impl Interrupt {
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::Stat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    /// Bit in IE/IF.
    pub fn mask(self) -> u8 {
        1 << self as u8
    }

    /// Handler address.
    pub fn vector(self) -> u16 {
        0x0040 + 8 * self as u16
    }

    /// Highest-priority source in a pending mask.
    pub fn highest_priority(pending: u8) -> Option<Interrupt> {
        Self::ALL.into_iter().find(|i| pending & i.mask() != 0)
    }
}

/// Memory interface trait for the LR35902 CPU
pub trait MemoryLr35902 {
    /// Read a byte from memory
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory; returns the T-cycles the access cost.
    fn write(&mut self, addr: u16, val: u8) -> u32;

    /// Little-endian word read (low byte first).
    fn read_word(&self, addr: u16) -> u16 {
        let lo = self.read(addr);
        let hi = self.read(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Little-endian word write, low byte then high byte; returns summed cost.
    fn write_word(&mut self, addr: u16, val: u16) -> u32 {
        let [lo, hi] = val.to_le_bytes();
        self.write(addr, lo) + self.write(addr.wrapping_add(1), hi)
    }

    /// Current IE mask.
    fn interrupt_enable(&self) -> u8 {
        self.read(IE_ADDR)
    }

    /// Current IF mask (only the five source bits).
    fn interrupt_request(&self) -> u8 {
        self.read(IF_ADDR) & 0x1F
    }

    /// Sources both enabled and requested.
    fn pending_interrupts(&self) -> u8 {
        self.interrupt_enable() & self.interrupt_request()
    }

    /// Clear one request bit.
    fn acknowledge(&mut self, interrupt: Interrupt) {
        let pending = self.interrupt_request() & !interrupt.mask();
        self.write(IF_ADDR, pending);
    }
}

/// Sharp LR35902 CPU state
#[derive(Debug)]
pub struct CpuLr35902<M: MemoryLr35902> {
    pub regs: Registers,
    /// Interrupt Master Enable flag
    pub ime: bool,
    /// EI executed; IME turns on after the next instruction
    pub ime_pending: bool,
    /// Halted state
    pub halted: bool,
    /// Stopped state (for STOP instruction)
    pub stopped: bool,
    /// Hit an illegal opcode; only reset recovers
    pub locked: bool,
    /// Total cycles executed
    pub cycles: u64,
    /// Memory interface
    pub memory: M,
    /// Cycles accumulated by the step in progress
    tick: u32,
}

impl<M: MemoryLr35902> CpuLr35902<M> {
    /// Create a new LR35902 CPU in its power-on state (everything zero).
    pub fn new(memory: M) -> Self {
        Self {
            regs: Registers::default(),
            ime: false,
            ime_pending: false,
            halted: false,
            stopped: false,
            locked: false,
            cycles: 0,
            memory,
            tick: 0,
        }
    }

    /// Reset to the power-on state; execution resumes at 0x0000.
    pub fn reset(&mut self) {
        self.regs = Registers::default();
        self.ime = false;
        self.ime_pending = false;
        self.halted = false;
        self.stopped = false;
        self.locked = false;
        self.cycles = 0;
    }

    /// Run one step: service an interrupt, idle, or execute one instruction.
    /// Returns the T-cycles consumed.
    pub fn step(&mut self) -> u32 {
        self.tick = 0;

        if self.locked {
            self.tick = ACCESS_CYCLES;
        } else if !self.service_interrupts() {
            if self.halted || self.stopped {
                self.tick = ACCESS_CYCLES;
            } else {
                let enable_ime = self.ime_pending;
                let opcode = self.fetch8();
                let instruction = PRIMARY[opcode as usize];
                log(LogCategory::CPU, LogLevel::Trace, || {
                    format!(
                        "{:04X}: {:02X} {:<14} {}",
                        self.regs.pc.wrapping_sub(1),
                        opcode,
                        instruction.to_string(),
                        self.regs
                    )
                });
                self.execute(instruction);
                if enable_ime && self.ime_pending {
                    self.ime = true;
                    self.ime_pending = false;
                }
            }
        }

        self.cycles += self.tick as u64;
        self.tick
    }

    /// Returns true if an interrupt was dispatched this step.
    fn service_interrupts(&mut self) -> bool {
        let pending = self.memory.pending_interrupts();
        if pending == 0 {
            return false;
        }
        if self.halted || self.stopped {
            log(LogCategory::CPU, LogLevel::Debug, || {
                format!("Woken by pending interrupts {:02X}", pending)
            });
        }
        self.halted = false;
        self.stopped = false;

        if !self.ime {
            return false;
        }
        let Some(interrupt) = Interrupt::highest_priority(pending) else {
            return false;
        };

        self.ime = false;
        self.ime_pending = false;
        self.memory.acknowledge(interrupt);
        log(LogCategory::Interrupts, LogLevel::Debug, || {
            format!(
                "Dispatch {:?} from PC={:04X} to {:04X}",
                interrupt,
                self.regs.pc,
                interrupt.vector()
            )
        });

        self.idle();
        self.idle();
        self.push16(self.regs.pc);
        self.regs.pc = interrupt.vector();
        self.idle();
        true
    }

    fn read8(&mut self, addr: u16) -> u8 {
        self.tick += ACCESS_CYCLES;
        self.memory.read(addr)
    }

    fn write8(&mut self, addr: u16, val: u8) {
        self.tick += self.memory.write(addr, val);
    }

    fn read16(&mut self, addr: u16) -> u16 {
        self.tick += 2 * ACCESS_CYCLES;
        self.memory.read_word(addr)
    }

    fn write16(&mut self, addr: u16, val: u16) {
        self.tick += self.memory.write_word(addr, val);
    }

    /// Internal delay cycle.
    fn idle(&mut self) {
        self.tick += ACCESS_CYCLES;
    }

    fn fetch8(&mut self) -> u8 {
        let val = self.read8(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        val
    }

    fn fetch16(&mut self) -> u16 {
        let val = self.read16(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(2);
        val
    }

    /// Decrement SP by two, then store the word with its low byte lowest.
    fn push16(&mut self, val: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        self.write16(self.regs.sp, val);
    }

    fn pop16(&mut self) -> u16 {
        let val = self.read16(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        val
    }

    fn get8(&mut self, reg: Reg8) -> u8 {
        match reg {
            Reg8::IndHl => self.read8(self.regs.hl()),
            _ => self.regs.get8(reg),
        }
    }

    fn set8(&mut self, reg: Reg8, val: u8) {
        match reg {
            Reg8::IndHl => self.write8(self.regs.hl(), val),
            _ => self.regs.set8(reg, val),
        }
    }

    fn indirect_addr(&mut self, ind: Indirect) -> u16 {
        match ind {
            Indirect::BC => self.regs.bc(),
            Indirect::DE => self.regs.de(),
            Indirect::HlInc => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_add(1));
                hl
            }
            Indirect::HlDec => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_sub(1));
                hl
            }
        }
    }

    fn condition(&self, cond: Cond) -> bool {
        match cond {
            Cond::NZ => !self.regs.flag(FLAG_Z),
            Cond::Z => self.regs.flag(FLAG_Z),
            Cond::NC => !self.regs.flag(FLAG_C),
            Cond::C => self.regs.flag(FLAG_C),
        }
    }

    /// Store an ALU result in A.
    fn apply_a(&mut self, r: AluResult) {
        self.regs.a = r.value;
        self.regs.set_f(r.flags);
    }

    fn alu(&mut self, op: AluOp, val: u8) {
        let a = self.regs.a;
        let carry = self.regs.flag(FLAG_C);
        let r = match op {
            AluOp::Add => alu::add8(a, val, false),
            AluOp::Adc => alu::add8(a, val, carry),
            AluOp::Sub => alu::sub8(a, val, false),
            AluOp::Sbc => alu::sub8(a, val, carry),
            AluOp::And => alu::and8(a, val),
            AluOp::Xor => alu::xor8(a, val),
            AluOp::Or => alu::or8(a, val),
            AluOp::Cp => alu::cp8(a, val),
        };
        self.apply_a(r);
    }

    fn jump_relative(&mut self, offset: i8) {
        self.regs.pc = self.regs.pc.wrapping_add(offset as i16 as u16);
        self.idle();
    }

    fn execute(&mut self, instruction: Instruction) {
        use Instruction::*;

        match instruction {
            Nop => {}
            Stop => {
                // The operand byte is consumed and ignored.
                self.fetch8();
                self.stopped = true;
                log(LogCategory::CPU, LogLevel::Debug, || {
                    format!("STOP at PC={:04X}", self.regs.pc.wrapping_sub(2))
                });
            }
            Halt => self.halted = true,
            Di => {
                self.ime = false;
                self.ime_pending = false;
            }
            Ei => self.ime_pending = true,
            Illegal(op) => {
                self.locked = true;
                log(LogCategory::CPU, LogLevel::Error, || {
                    format!(
                        "Illegal opcode {:02X} at PC={:04X}; CPU locked",
                        op,
                        self.regs.pc.wrapping_sub(1)
                    )
                });
            }
            Prefix => {
                let op = self.fetch8();
                self.execute_cb(CB_PREFIXED[op as usize]);
            }

            Ld(dst, src) => {
                let val = self.get8(src);
                self.set8(dst, val);
            }
            LdImm(reg) => {
                let val = self.fetch8();
                self.set8(reg, val);
            }
            LdImm16(reg) => {
                let val = self.fetch16();
                self.regs.set16(reg, val);
            }
            StoreA(ind) => {
                let addr = self.indirect_addr(ind);
                self.write8(addr, self.regs.a);
            }
            LoadA(ind) => {
                let addr = self.indirect_addr(ind);
                self.regs.a = self.read8(addr);
            }
            StoreSp => {
                let addr = self.fetch16();
                self.write16(addr, self.regs.sp);
            }
            StoreAbsA => {
                let addr = self.fetch16();
                self.write8(addr, self.regs.a);
            }
            LoadAbsA => {
                let addr = self.fetch16();
                self.regs.a = self.read8(addr);
            }
            StoreHighA => {
                let addr = 0xFF00 | self.fetch8() as u16;
                self.write8(addr, self.regs.a);
            }
            LoadHighA => {
                let addr = 0xFF00 | self.fetch8() as u16;
                self.regs.a = self.read8(addr);
            }
            StoreHighCA => self.write8(0xFF00 | self.regs.c as u16, self.regs.a),
            LoadHighCA => self.regs.a = self.read8(0xFF00 | self.regs.c as u16),
            LdSpHl => {
                self.regs.sp = self.regs.hl();
                self.idle();
            }
            LdHlSpOffset => {
                let offset = self.fetch8() as i8;
                let (val, flags) = alu::add_sp_offset(self.regs.sp, offset);
                self.regs.set_hl(val);
                self.regs.set_f(flags);
                self.idle();
            }

            Inc(reg) => {
                let val = self.get8(reg);
                let r = alu::inc8(val, self.regs.f());
                self.set8(reg, r.value);
                self.regs.set_f(r.flags);
            }
            Dec(reg) => {
                let val = self.get8(reg);
                let r = alu::dec8(val, self.regs.f());
                self.set8(reg, r.value);
                self.regs.set_f(r.flags);
            }
            Inc16(reg) => {
                let val = self.regs.get16(reg).wrapping_add(1);
                self.regs.set16(reg, val);
                self.idle();
            }
            Dec16(reg) => {
                let val = self.regs.get16(reg).wrapping_sub(1);
                self.regs.set16(reg, val);
                self.idle();
            }
            AddHl(reg) => {
                let (val, flags) = alu::add16(self.regs.hl(), self.regs.get16(reg), self.regs.f());
                self.regs.set_hl(val);
                self.regs.set_f(flags);
                self.idle();
            }
            AddSpOffset => {
                let offset = self.fetch8() as i8;
                let (val, flags) = alu::add_sp_offset(self.regs.sp, offset);
                self.regs.sp = val;
                self.regs.set_f(flags);
                self.idle();
                self.idle();
            }
            Alu(op, reg) => {
                let val = self.get8(reg);
                self.alu(op, val);
            }
            AluImm(op) => {
                let val = self.fetch8();
                self.alu(op, val);
            }

            Rlca => self.apply_a(alu::rotate_accumulator(
                alu::ShiftOp::Rlc,
                self.regs.a,
                self.regs.f(),
            )),
            Rrca => self.apply_a(alu::rotate_accumulator(
                alu::ShiftOp::Rrc,
                self.regs.a,
                self.regs.f(),
            )),
            Rla => self.apply_a(alu::rotate_accumulator(
                alu::ShiftOp::Rl,
                self.regs.a,
                self.regs.f(),
            )),
            Rra => self.apply_a(alu::rotate_accumulator(
                alu::ShiftOp::Rr,
                self.regs.a,
                self.regs.f(),
            )),
            Daa => self.apply_a(alu::daa(self.regs.a, self.regs.f())),
            Cpl => self.apply_a(alu::cpl(self.regs.a, self.regs.f())),
            Scf => self.regs.set_f(alu::scf(self.regs.f())),
            Ccf => self.regs.set_f(alu::ccf(self.regs.f())),

            Jr => {
                let offset = self.fetch8() as i8;
                self.jump_relative(offset);
            }
            JrCond(cond) => {
                let offset = self.fetch8() as i8;
                if self.condition(cond) {
                    self.jump_relative(offset);
                }
            }
            Jp => {
                self.regs.pc = self.fetch16();
                self.idle();
            }
            JpCond(cond) => {
                let addr = self.fetch16();
                if self.condition(cond) {
                    self.regs.pc = addr;
                    self.idle();
                }
            }
            JpHl => self.regs.pc = self.regs.hl(),
            Call => {
                let addr = self.fetch16();
                self.idle();
                self.push16(self.regs.pc);
                self.regs.pc = addr;
            }
            CallCond(cond) => {
                let addr = self.fetch16();
                if self.condition(cond) {
                    self.idle();
                    self.push16(self.regs.pc);
                    self.regs.pc = addr;
                }
            }
            Ret => {
                self.regs.pc = self.pop16();
                self.idle();
            }
            RetCond(cond) => {
                self.idle();
                if self.condition(cond) {
                    self.regs.pc = self.pop16();
                    self.idle();
                }
            }
            Reti => {
                self.regs.pc = self.pop16();
                self.idle();
                self.ime = true;
                self.ime_pending = false;
            }
            Rst(vector) => {
                self.idle();
                self.push16(self.regs.pc);
                self.regs.pc = vector as u16;
            }
            Push(reg) => {
                self.idle();
                self.push16(self.regs.get16(reg));
            }
            Pop(reg) => {
                let val = self.pop16();
                self.regs.set16(reg, val);
            }
        }
    }

    fn execute_cb(&mut self, instruction: CbInstruction) {
        match instruction {
            CbInstruction::Shift(op, reg) => {
                let val = self.get8(reg);
                let r = alu::shift(op, val, self.regs.f());
                self.set8(reg, r.value);
                self.regs.set_f(r.flags);
            }
            CbInstruction::Bit(n, reg) => {
                let val = self.get8(reg);
                self.regs.set_f(alu::bit(n, val, self.regs.f()));
            }
            CbInstruction::Res(n, reg) => {
                let val = self.get8(reg);
                self.set8(reg, alu::res(n, val));
            }
            CbInstruction::Set(n, reg) => {
                let val = self.get8(reg);
                self.set8(reg, alu::set(n, val));
            }
        }
    }
}

impl<M: MemoryLr35902> crate::Cpu for CpuLr35902<M> {
    fn reset(&mut self) {
        self.reset();
    }

    fn step(&mut self) -> u32 {
        self.step()
    }
}

#[cfg(test)]
mod tests;
