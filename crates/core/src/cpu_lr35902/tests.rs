use super::*;

struct ArrayMemory([u8; 65536]);

impl MemoryLr35902 for ArrayMemory {
    fn read(&self, addr: u16) -> u8 {
        self.0[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) -> u32 {
        self.0[addr as usize] = val;
        ACCESS_CYCLES
    }
}

fn make_cpu() -> CpuLr35902<ArrayMemory> {
    CpuLr35902::new(ArrayMemory([0; 65536]))
}

/// CPU with `program` loaded at 0x0100 and PC pointing at it.
fn cpu_with(program: &[u8]) -> CpuLr35902<ArrayMemory> {
    let mut cpu = make_cpu();
    cpu.memory.0[0x100..0x100 + program.len()].copy_from_slice(program);
    cpu.regs.pc = 0x100;
    cpu.regs.sp = 0xFFFE;
    cpu
}

#[test]
fn test_nop() {
    let mut cpu = make_cpu();
    let cycles = cpu.step();
    assert_eq!(cycles, 4);
    assert_eq!(cpu.regs.pc, 1);
    assert_eq!(cpu.cycles, 4);
}

#[test]
fn test_ld_bc_d16() {
    let mut cpu = cpu_with(&[0x01, 0x34, 0x12]); // LD BC,0x1234
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.regs.bc(), 0x1234);
}

#[test]
fn test_inc_dec() {
    let mut cpu = cpu_with(&[0x04, 0x05]); // INC B; DEC B
    cpu.regs.b = 0xFF;
    cpu.regs.set_flag(FLAG_C, true);
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.regs.b, 0x00);
    assert!(cpu.regs.flag(FLAG_Z | FLAG_H | FLAG_C));

    cpu.step();
    assert_eq!(cpu.regs.b, 0xFF);
    assert!(cpu.regs.flag(FLAG_N | FLAG_H | FLAG_C));
    assert!(!cpu.regs.flag(FLAG_Z));
}

#[test]
fn test_inc_dec_indirect_hl() {
    let mut cpu = cpu_with(&[0x34, 0x35, 0x35]); // INC (HL); DEC (HL); DEC (HL)
    cpu.regs.set_hl(0xC000);
    cpu.memory.0[0xC000] = 0x0F;
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.memory.0[0xC000], 0x10);
    assert!(cpu.regs.flag(FLAG_H));
    cpu.step();
    cpu.step();
    assert_eq!(cpu.memory.0[0xC000], 0x0E);
}

#[test]
fn test_ld_register_and_memory() {
    // LD A,0x42; LD (HL),A; LD B,(HL)
    let mut cpu = cpu_with(&[0x3E, 0x42, 0x77, 0x46]);
    cpu.regs.set_hl(0xC123);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.memory.0[0xC123], 0x42);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.b, 0x42);
}

#[test]
fn test_hl_post_increment_and_decrement() {
    let mut cpu = cpu_with(&[0x22, 0x3A]); // LD (HL+),A; LD A,(HL-)
    cpu.regs.a = 0x99;
    cpu.regs.set_hl(0xC000);
    cpu.memory.0[0xC001] = 0x11;
    cpu.step();
    assert_eq!(cpu.memory.0[0xC000], 0x99);
    assert_eq!(cpu.regs.hl(), 0xC001);
    cpu.step();
    assert_eq!(cpu.regs.a, 0x11);
    assert_eq!(cpu.regs.hl(), 0xC000);
}

#[test]
fn test_add() {
    let mut cpu = cpu_with(&[0x80, 0x80]); // ADD A,B twice
    cpu.regs.a = 0x10;
    cpu.regs.b = 0x20;
    cpu.step();
    assert_eq!(cpu.regs.a, 0x30);
    assert!(!cpu.regs.flag(FLAG_C));

    cpu.regs.a = 0xFF;
    cpu.regs.b = 0x01;
    cpu.step();
    assert_eq!(cpu.regs.a, 0x00);
    assert!(cpu.regs.flag(FLAG_Z | FLAG_H | FLAG_C));
}

#[test]
fn test_adc_and_sbc_use_carry() {
    let mut cpu = cpu_with(&[0xCE, 0x01, 0xDE, 0x01]); // ADC A,1; SBC A,1
    cpu.regs.a = 0x10;
    cpu.regs.set_flag(FLAG_C, true);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.a, 0x12);
    assert!(!cpu.regs.flag(FLAG_C));

    cpu.regs.set_flag(FLAG_C, true);
    cpu.step();
    assert_eq!(cpu.regs.a, 0x10);
    assert!(cpu.regs.flag(FLAG_N));
}

#[test]
fn test_logic_and_compare() {
    // AND 0x0F; OR 0x80; XOR A; CP 0x00
    let mut cpu = cpu_with(&[0xE6, 0x0F, 0xF6, 0x80, 0xAF, 0xFE, 0x00]);
    cpu.regs.a = 0x3C;
    cpu.step();
    assert_eq!(cpu.regs.a, 0x0C);
    assert!(cpu.regs.flag(FLAG_H));
    cpu.step();
    assert_eq!(cpu.regs.a, 0x8C);
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.regs.a, 0x00);
    assert_eq!(cpu.regs.f(), FLAG_Z);
    cpu.step();
    assert_eq!(cpu.regs.f(), FLAG_Z | FLAG_N);
}

#[test]
fn test_jp() {
    let mut cpu = cpu_with(&[0xC3, 0x00, 0x20]); // JP 0x2000
    assert_eq!(cpu.step(), 16);
    assert_eq!(cpu.regs.pc, 0x2000);
}

#[test]
fn test_conditional_jp_cycles() {
    let mut cpu = cpu_with(&[0xCA, 0x00, 0x20]); // JP Z,0x2000
    cpu.regs.set_flag(FLAG_Z, false);
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.regs.pc, 0x103);

    cpu.regs.pc = 0x100;
    cpu.regs.set_flag(FLAG_Z, true);
    assert_eq!(cpu.step(), 16);
    assert_eq!(cpu.regs.pc, 0x2000);
}

#[test]
fn test_conditional_jr() {
    let mut cpu = cpu_with(&[0x20, 0x10]); // JR NZ,+0x10
    cpu.regs.set_flag(FLAG_Z, false);
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.regs.pc, 0x112);

    cpu.regs.set_flag(FLAG_Z, true);
    cpu.regs.pc = 0x100;
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.pc, 0x102);
}

#[test]
fn test_jr_backwards() {
    let mut cpu = cpu_with(&[0x18, 0xFE]); // JR -2 (tight loop)
    cpu.step();
    assert_eq!(cpu.regs.pc, 0x100);
}

#[test]
fn test_call_ret() {
    let mut cpu = cpu_with(&[0xCD, 0x00, 0x20]); // CALL 0x2000
    cpu.memory.0[0x2000] = 0xC9; // RET
    assert_eq!(cpu.step(), 24);
    assert_eq!(cpu.regs.pc, 0x2000);
    assert_eq!(cpu.regs.sp, 0xFFFC);
    assert_eq!(cpu.memory.0[0xFFFC], 0x03);
    assert_eq!(cpu.memory.0[0xFFFD], 0x01);

    assert_eq!(cpu.step(), 16);
    assert_eq!(cpu.regs.pc, 0x103);
    assert_eq!(cpu.regs.sp, 0xFFFE);
}

#[test]
fn test_conditional_call_and_ret_cycles() {
    let mut cpu = cpu_with(&[0xDC, 0x00, 0x20, 0xD8]); // CALL C,0x2000; RET C
    cpu.regs.set_flag(FLAG_C, false);
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.pc, 0x104);

    cpu.memory.0[0x2000] = 0xD8;
    cpu.regs.pc = 0x100;
    cpu.regs.set_flag(FLAG_C, true);
    assert_eq!(cpu.step(), 24);
    assert_eq!(cpu.step(), 20);
    assert_eq!(cpu.regs.pc, 0x103);
}

#[test]
fn test_push_pop() {
    let mut cpu = cpu_with(&[0xC5, 0xD1]); // PUSH BC; POP DE
    cpu.regs.set_bc(0x1234);
    assert_eq!(cpu.step(), 16);
    assert_eq!(cpu.regs.sp, 0xFFFC);
    assert_eq!(cpu.memory.0[0xFFFC], 0x34);
    assert_eq!(cpu.memory.0[0xFFFD], 0x12);
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.regs.de(), 0x1234);
    assert_eq!(cpu.regs.sp, 0xFFFE);
}

#[test]
fn test_pop_af_masks_flags() {
    let mut cpu = cpu_with(&[0xF1]); // POP AF
    cpu.regs.sp = 0xC000;
    cpu.memory.0[0xC000] = 0xFF;
    cpu.memory.0[0xC001] = 0x12;
    cpu.step();
    assert_eq!(cpu.regs.af(), 0x12F0);
}

#[test]
fn test_inc_dec_16bit() {
    let mut cpu = cpu_with(&[0x03, 0x0B, 0x03]); // INC BC; DEC BC; INC BC
    cpu.regs.set_bc(0xFFFF);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.bc(), 0x0000);
    assert_eq!(cpu.regs.f(), 0);

    cpu.regs.set_f(0xF0);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.bc(), 0xFFFF);
    assert_eq!(cpu.regs.f(), 0xF0);

    cpu.regs.set_f(FLAG_N);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.f(), FLAG_N);
}

#[test]
fn test_add_hl() {
    let mut cpu = cpu_with(&[0x09]); // ADD HL,BC
    cpu.regs.set_hl(0x8A23);
    cpu.regs.set_bc(0x0605);
    cpu.regs.set_flag(FLAG_Z | FLAG_N, true);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.hl(), 0x9028);
    assert_eq!(cpu.regs.f(), FLAG_Z | FLAG_H);
}

#[test]
fn test_daa_program() {
    // LD A,0x19; ADD A,0x28; DAA  (19 + 28 = 47 in BCD)
    let mut cpu = cpu_with(&[0x3E, 0x19, 0xC6, 0x28, 0x27]);
    cpu.step();
    cpu.step();
    assert_eq!(cpu.regs.a, 0x41);
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.regs.a, 0x47);
    assert!(!cpu.regs.flag(FLAG_H));
}

#[test]
fn test_accumulator_rotates() {
    let mut cpu = cpu_with(&[0x07, 0x17]); // RLCA; RLA
    cpu.regs.a = 0x80;
    cpu.step();
    assert_eq!(cpu.regs.a, 0x01);
    assert_eq!(cpu.regs.f(), FLAG_C);

    cpu.regs.a = 0x80;
    cpu.regs.set_f(0);
    cpu.step();
    assert_eq!(cpu.regs.a, 0x00);
    assert_eq!(cpu.regs.f(), FLAG_C);
}

#[test]
fn test_cb_bit() {
    let mut cpu = cpu_with(&[0xCB, 0x47, 0xCB, 0x47]); // BIT 0,A twice
    cpu.regs.a = 0b0000_0001;
    assert_eq!(cpu.step(), 8);
    assert!(!cpu.regs.flag(FLAG_Z));

    cpu.regs.a = 0;
    cpu.step();
    assert!(cpu.regs.flag(FLAG_Z | FLAG_H));
}

#[test]
fn test_cb_res_set_swap() {
    // RES 0,B; SET 7,C; SWAP D
    let mut cpu = cpu_with(&[0xCB, 0x80, 0xCB, 0xF9, 0xCB, 0x32]);
    cpu.regs.b = 0xFF;
    cpu.regs.d = 0x12;
    cpu.step();
    cpu.step();
    cpu.step();
    assert_eq!(cpu.regs.b, 0xFE);
    assert_eq!(cpu.regs.c, 0x80);
    assert_eq!(cpu.regs.d, 0x21);
}

#[test]
fn test_cb_indirect_cycles() {
    // BIT 7,(HL); SET 0,(HL); RLC (HL)
    let mut cpu = cpu_with(&[0xCB, 0x7E, 0xCB, 0xC6, 0xCB, 0x06]);
    cpu.regs.set_hl(0xC000);
    cpu.memory.0[0xC000] = 0x80;
    assert_eq!(cpu.step(), 12);
    assert!(!cpu.regs.flag(FLAG_Z));
    assert_eq!(cpu.step(), 16);
    assert_eq!(cpu.memory.0[0xC000], 0x81);
    assert_eq!(cpu.step(), 16);
    assert_eq!(cpu.memory.0[0xC000], 0x03);
    assert!(cpu.regs.flag(FLAG_C));
}

#[test]
fn test_ldh() {
    // LDH (0x80),A; LDH A,(0x80); LD (C),A
    let mut cpu = cpu_with(&[0xE0, 0x80, 0xF0, 0x80, 0xE2]);
    cpu.regs.a = 0x42;
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.memory.0[0xFF80], 0x42);

    cpu.regs.a = 0x00;
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.regs.a, 0x42);

    cpu.regs.c = 0x81;
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.memory.0[0xFF81], 0x42);
}

#[test]
fn test_ld_a16_sp() {
    let mut cpu = cpu_with(&[0x08, 0x00, 0xC0]); // LD (0xC000),SP
    cpu.regs.sp = 0xBEEF;
    assert_eq!(cpu.step(), 20);
    assert_eq!(cpu.memory.0[0xC000], 0xEF);
    assert_eq!(cpu.memory.0[0xC001], 0xBE);
}

#[test]
fn test_rst() {
    let mut cpu = cpu_with(&[0xDF]); // RST 0x18
    assert_eq!(cpu.step(), 16);
    assert_eq!(cpu.regs.pc, 0x18);
    assert_eq!(cpu.regs.sp, 0xFFFC);
    assert_eq!(cpu.memory.0[0xFFFC], 0x01);
    assert_eq!(cpu.memory.0[0xFFFD], 0x01);
}

#[test]
fn test_add_sp_r8() {
    let mut cpu = cpu_with(&[0xE8, 0x10]); // ADD SP,0x10
    cpu.regs.sp = 0x1000;
    assert_eq!(cpu.step(), 16);
    assert_eq!(cpu.regs.sp, 0x1010);
}

#[test]
fn test_ld_hl_sp_r8() {
    let mut cpu = cpu_with(&[0xF8, 0xFF, 0xF9]); // LD HL,SP-1; LD SP,HL
    cpu.regs.sp = 0x1000;
    assert_eq!(cpu.step(), 12);
    assert_eq!(cpu.regs.hl(), 0x0FFF);
    assert_eq!(cpu.step(), 8);
    assert_eq!(cpu.regs.sp, 0x0FFF);
}

#[test]
fn test_jp_hl() {
    let mut cpu = cpu_with(&[0xE9]);
    cpu.regs.set_hl(0x4000);
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.regs.pc, 0x4000);
}

#[test]
fn test_interrupt_priority_and_dispatch() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.ime = true;
    cpu.memory.0[IE_ADDR as usize] = 0x1F;
    cpu.memory.0[IF_ADDR as usize] = 0x14; // Timer + Joypad

    assert_eq!(cpu.step(), 20);
    assert_eq!(cpu.regs.pc, 0x0050);
    assert!(!cpu.ime);
    assert_eq!(cpu.memory.0[IF_ADDR as usize], 0x10);
    assert_eq!(cpu.regs.sp, 0xFFFC);
    assert_eq!(cpu.memory.0[0xFFFC], 0x00);
    assert_eq!(cpu.memory.0[0xFFFD], 0x01);
}

#[test]
fn test_vblank_outranks_everything() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.ime = true;
    cpu.memory.0[IE_ADDR as usize] = 0x1F;
    cpu.memory.0[IF_ADDR as usize] = 0x1F;
    cpu.step();
    assert_eq!(cpu.regs.pc, 0x0040);
}

#[test]
fn test_disabled_interrupt_is_ignored() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.ime = true;
    cpu.memory.0[IE_ADDR as usize] = 0x01;
    cpu.memory.0[IF_ADDR as usize] = 0x04;
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.regs.pc, 0x101);
}

#[test]
fn test_no_dispatch_without_ime() {
    let mut cpu = cpu_with(&[0x00]);
    cpu.memory.0[IE_ADDR as usize] = 0x01;
    cpu.memory.0[IF_ADDR as usize] = 0x01;
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.regs.pc, 0x101);
    assert_eq!(cpu.memory.0[IF_ADDR as usize], 0x01);
}

#[test]
fn test_ei_takes_effect_after_next_instruction() {
    let mut cpu = cpu_with(&[0xFB, 0x00, 0x00]); // EI; NOP; NOP
    cpu.memory.0[IE_ADDR as usize] = 0x01;
    cpu.memory.0[IF_ADDR as usize] = 0x01;

    cpu.step();
    assert!(!cpu.ime);
    cpu.step();
    assert!(cpu.ime);
    assert_eq!(cpu.regs.pc, 0x102);

    assert_eq!(cpu.step(), 20);
    assert_eq!(cpu.regs.pc, 0x0040);
}

#[test]
fn test_di_cancels_pending_ei() {
    let mut cpu = cpu_with(&[0xFB, 0xF3, 0x00]); // EI; DI; NOP
    cpu.step();
    cpu.step();
    cpu.step();
    assert!(!cpu.ime);
}

#[test]
fn test_reti_enables_immediately() {
    let mut cpu = cpu_with(&[0xD9]); // RETI
    cpu.regs.sp = 0xC000;
    cpu.memory.0[0xC000] = 0x34;
    cpu.memory.0[0xC001] = 0x12;
    assert_eq!(cpu.step(), 16);
    assert!(cpu.ime);
    assert_eq!(cpu.regs.pc, 0x1234);
}

#[test]
fn test_halt_idles_until_interrupt_pending() {
    let mut cpu = cpu_with(&[0x76, 0x3C]); // HALT; INC A
    cpu.memory.0[IE_ADDR as usize] = 0x04;
    cpu.step();
    assert!(cpu.halted);
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.regs.pc, 0x101);

    // IME clear: wake and continue with the next instruction
    cpu.memory.0[IF_ADDR as usize] = 0x04;
    cpu.step();
    assert!(!cpu.halted);
    assert_eq!(cpu.regs.a, 1);
}

#[test]
fn test_halt_wakes_into_handler_with_ime() {
    let mut cpu = cpu_with(&[0x76]);
    cpu.ime = true;
    cpu.memory.0[IE_ADDR as usize] = 0x01;
    cpu.step();
    cpu.memory.0[IF_ADDR as usize] = 0x01;
    assert_eq!(cpu.step(), 20);
    assert_eq!(cpu.regs.pc, 0x0040);
    // The return address is the instruction after HALT
    assert_eq!(cpu.memory.0[0xFFFC], 0x01);
    assert_eq!(cpu.memory.0[0xFFFD], 0x01);
}

#[test]
fn test_stop_consumes_operand() {
    let mut cpu = cpu_with(&[0x10, 0x00, 0x3C]);
    assert_eq!(cpu.step(), 8);
    assert!(cpu.stopped);
    assert_eq!(cpu.regs.pc, 0x102);
    assert_eq!(cpu.step(), 4);

    cpu.memory.0[IE_ADDR as usize] = 0x10;
    cpu.memory.0[IF_ADDR as usize] = 0x10;
    cpu.step();
    assert!(!cpu.stopped);
    assert_eq!(cpu.regs.a, 1);
}

#[test]
fn test_illegal_opcode_locks_cpu() {
    let mut cpu = cpu_with(&[0xD3, 0x3C]);
    cpu.ime = true;
    cpu.step();
    assert!(cpu.locked);
    cpu.memory.0[IE_ADDR as usize] = 0x01;
    cpu.memory.0[IF_ADDR as usize] = 0x01;
    assert_eq!(cpu.step(), 4);
    assert_eq!(cpu.regs.pc, 0x101);
    assert_eq!(cpu.regs.a, 0);

    cpu.reset();
    assert!(!cpu.locked);
    assert_eq!(cpu.regs.pc, 0);
}

#[test]
fn test_cycles_accumulate() {
    let mut cpu = cpu_with(&[0x00, 0x01, 0x00, 0x00, 0xC3, 0x00, 0x01]);
    cpu.step();
    cpu.step();
    cpu.step();
    assert_eq!(cpu.cycles, 4 + 12 + 16);
}

#[test]
fn test_word_helpers_compose_byte_accesses() {
    let mut mem = ArrayMemory([0; 65536]);
    assert_eq!(mem.write_word(0xC000, 0xABCD), 2 * ACCESS_CYCLES);
    assert_eq!(mem.0[0xC000], 0xCD);
    assert_eq!(mem.0[0xC001], 0xAB);
    assert_eq!(mem.read_word(0xC000), 0xABCD);
}
