use super::step;
use crate::machine::Machine;

fn mach(prog: &[u8]) -> Machine {
    let mut m = Machine::new();
    m.write_block(0x0100, prog);
    m.reg.pc = 0x0100;
    m.reg.sp = 0xF000;
    m
}

fn run(m: &mut Machine, steps: usize) {
    for _ in 0..steps {
        step(m);
    }
}

#[test]
fn load_add_store_round_trip() {
    // LD A,1; ADD A,2; LD (0x0200),A; LD A,(0x0200); CP 3
    let mut m = mach(&[
        0x3E, 0x01, 0xC6, 0x02, 0x32, 0x00, 0x02, 0x3A, 0x00, 0x02, 0xFE, 0x03,
    ]);
    run(&mut m, 5);
    assert_eq!(m.load(0x0200), 3);
    assert_eq!(m.reg.a, 3);
    assert!(m.reg.f.z, "CP 3 against 3 sets Z");
}

#[test]
fn halt_spins_in_place() {
    let mut m = mach(&[0x76]);
    run(&mut m, 3);
    assert_eq!(m.reg.pc, 0x0100);
}

#[test]
fn djnz_counts_down() {
    // LD B,5; loop: INC A; DJNZ loop
    let mut m = mach(&[0x06, 0x05, 0x3C, 0x10, 0xFD]);
    run(&mut m, 1 + 5 * 2);
    assert_eq!(m.reg.a, 5);
    assert_eq!(m.reg.b, 0);
    assert_eq!(m.reg.pc, 0x0105);
}

#[test]
fn relative_and_absolute_jumps() {
    // JR +2; (skipped: INC A; INC A); JP 0x0100
    let mut m = mach(&[0x18, 0x02, 0x3C, 0x3C, 0xC3, 0x00, 0x01]);
    step(&mut m);
    assert_eq!(m.reg.pc, 0x0104);
    step(&mut m);
    assert_eq!(m.reg.pc, 0x0100);
    assert_eq!(m.reg.a, 0);
}

#[test]
fn call_ret_uses_guest_stack() {
    // CALL 0x0200; NOP   /  at 0x0200: RET
    let mut m = mach(&[0xCD, 0x00, 0x02, 0x00]);
    m.store(0x0200, 0xC9);
    step(&mut m);
    assert_eq!(m.reg.pc, 0x0200);
    assert_eq!(m.reg.sp, 0xEFFE);
    assert_eq!(m.load16(0xEFFE), 0x0103);
    step(&mut m);
    assert_eq!(m.reg.pc, 0x0103);
    assert_eq!(m.reg.sp, 0xF000);
}

#[test]
fn rst_pushes_and_vectors() {
    let mut m = mach(&[0xEF]); // RST 28h
    step(&mut m);
    assert_eq!(m.reg.pc, 0x0028);
    assert_eq!(m.load16(0xEFFE), 0x0101);
}

#[test]
fn push_pop_af_round_trips_flag_byte() {
    // SCF; PUSH AF; POP BC
    let mut m = mach(&[0x37, 0xF5, 0xC1]);
    m.reg.a = 0x5A;
    run(&mut m, 3);
    assert_eq!(m.reg.b, 0x5A);
    assert_eq!(m.reg.c & 0x01, 0x01, "carry bit travels through memory");
}

#[test]
fn exchange_instructions() {
    // EX AF,AF'; EXX; EX DE,HL
    let mut m = mach(&[0x08, 0xD9, 0xEB]);
    m.reg.a = 1;
    m.reg.a_alt = 2;
    m.reg.set_bc(0x1111);
    m.reg.b_alt = 0x22;
    m.reg.c_alt = 0x22;
    m.reg.set_de(0x3333);
    m.reg.set_hl(0x4444);
    run(&mut m, 2);
    assert_eq!(m.reg.a, 2);
    assert_eq!(m.reg.a_alt, 1);
    assert_eq!(m.reg.bc(), 0x2222);
    step(&mut m);
    assert_eq!(m.reg.de(), 0x4444);
    assert_eq!(m.reg.hl(), 0x3333);
}

#[test]
fn prefixed_index_halves() {
    // LD IX,0x1234; ADD A,IXH; ADD A,IXL
    let mut m = mach(&[0xDD, 0x21, 0x34, 0x12, 0xDD, 0x84, 0xDD, 0x85]);
    run(&mut m, 3);
    assert_eq!(m.reg.ix, 0x1234);
    assert_eq!(m.reg.a, 0x46);
}

#[test]
fn indexed_memory_keeps_plain_hl_partner() {
    // LD IX,0x0200; LD H,(IX+1): H gets the byte, IXH is untouched.
    let mut m = mach(&[0xDD, 0x21, 0x00, 0x02, 0xDD, 0x66, 0x01]);
    m.store(0x0201, 0x77);
    run(&mut m, 2);
    assert_eq!(m.reg.h, 0x77);
    assert_eq!(m.reg.ix, 0x0200);
}

#[test]
fn indexed_store_with_negative_displacement() {
    // LD IY,0x0200; LD (IY-1),n
    let mut m = mach(&[0xFD, 0x21, 0x00, 0x02, 0xFD, 0x36, 0xFF, 0xAB]);
    run(&mut m, 2);
    assert_eq!(m.load(0x01FF), 0xAB);
}

#[test]
fn repeated_prefix_uses_last_one() {
    // DD FD 21 nn: loads IY, not IX.
    let mut m = mach(&[0xDD, 0xFD, 0x21, 0x55, 0xAA]);
    step(&mut m);
    assert_eq!(m.reg.iy, 0xAA55);
    assert_eq!(m.reg.ix, 0);
}

#[test]
fn bit_on_indexed_cell_takes_yx_from_address() {
    // LD IX,0x2800; BIT 0,(IX+8): EA = 0x2808 -> Y (bit 13) and X (bit 11).
    let mut m = mach(&[0xDD, 0x21, 0x00, 0x28, 0xDD, 0xCB, 0x08, 0x46]);
    run(&mut m, 2);
    assert!(m.reg.f.y, "bit 13 of 0x2808");
    assert!(m.reg.f.x, "bit 11 of 0x2808");
    assert!(m.reg.f.z, "memory is zero");
}

#[test]
fn ddcb_rotate_copies_into_register() {
    // LD IX,0x0200; RLC (IX+0),B
    let mut m = mach(&[0xDD, 0x21, 0x00, 0x02, 0xDD, 0xCB, 0x00, 0x00]);
    m.store(0x0200, 0x81);
    run(&mut m, 2);
    assert_eq!(m.load(0x0200), 0x03);
    assert_eq!(m.reg.b, 0x03);
    assert!(m.reg.f.c);
}

#[test]
fn cb_set_res_and_sll() {
    // SET 7,B; RES 7,B; SLL B
    let mut m = mach(&[0xCB, 0xF8, 0xCB, 0xB8, 0xCB, 0x30]);
    m.reg.b = 0x40;
    step(&mut m);
    assert_eq!(m.reg.b, 0xC0);
    step(&mut m);
    assert_eq!(m.reg.b, 0x40);
    step(&mut m);
    assert_eq!(m.reg.b, 0x81, "SLL shifts in a one");
}

#[test]
fn ldir_copies_and_rewinds() {
    // LD HL,0x0200; LD DE,0x0300; LD BC,3; LDIR
    let mut m = mach(&[
        0x21, 0x00, 0x02, 0x11, 0x00, 0x03, 0x01, 0x03, 0x00, 0xED, 0xB0,
    ]);
    m.write_block(0x0200, &[1, 2, 3]);
    run(&mut m, 3);
    // Each iteration is one step; the first two rewind PC onto the ED.
    step(&mut m);
    assert_eq!(m.reg.pc, 0x0109);
    assert!(m.reg.f.pv);
    run(&mut m, 2);
    assert_eq!(m.reg.pc, 0x010B);
    assert!(!m.reg.f.pv);
    assert_eq!(m.read_block(0x0300, 3), vec![1, 2, 3]);
    assert_eq!(m.reg.bc(), 0);
    assert_eq!(m.reg.hl(), 0x0203);
    assert_eq!(m.reg.de(), 0x0303);
}

#[test]
fn cpir_stops_on_match() {
    // LD HL,0x0200; LD BC,5; LD A,3; CPIR
    let mut m = mach(&[0x21, 0x00, 0x02, 0x01, 0x05, 0x00, 0x3E, 0x03, 0xED, 0xB1]);
    m.write_block(0x0200, &[1, 2, 3, 4, 5]);
    run(&mut m, 3);
    run(&mut m, 3); // three compare iterations
    assert!(m.reg.f.z, "found the byte");
    assert_eq!(m.reg.hl(), 0x0203);
    assert_eq!(m.reg.bc(), 2);
    assert_eq!(m.reg.pc, 0x010A);
}

#[test]
fn in_block_writes_port_zeros() {
    // LD HL,0x0200; LD B,2; INIR
    let mut m = mach(&[0x21, 0x00, 0x02, 0x06, 0x02, 0xED, 0xB2]);
    m.write_block(0x0200, &[0xFF, 0xFF]);
    run(&mut m, 4);
    assert_eq!(m.read_block(0x0200, 2), vec![0, 0]);
    assert_eq!(m.reg.b, 0);
    assert!(m.reg.f.z);
}

#[test]
fn in_from_port_reads_zero() {
    // LD A,0xFF; IN A,(0x10); LD C,0x10; IN B,(C)
    let mut m = mach(&[0x3E, 0xFF, 0xDB, 0x10, 0x0E, 0x10, 0xED, 0x40]);
    run(&mut m, 2);
    assert_eq!(m.reg.a, 0);
    run(&mut m, 2);
    assert_eq!(m.reg.b, 0);
    assert!(m.reg.f.z && m.reg.f.pv, "flags computed from zero");
}

#[test]
fn neg_and_sixteen_bit_sbc() {
    // LD A,1; NEG; LD HL,0x0001; LD BC,0x0002; OR A; SBC HL,BC
    let mut m = mach(&[
        0x3E, 0x01, 0xED, 0x44, 0x21, 0x01, 0x00, 0x01, 0x02, 0x00, 0xB7, 0xED, 0x42,
    ]);
    run(&mut m, 2);
    assert_eq!(m.reg.a, 0xFF);
    assert!(m.reg.f.c && m.reg.f.n);
    run(&mut m, 4);
    assert_eq!(m.reg.hl(), 0xFFFF);
    assert!(m.reg.f.c && m.reg.f.s);
}

#[test]
fn rld_rotates_nibbles_through_memory() {
    // LD HL,0x0200; RLD
    let mut m = mach(&[0x21, 0x00, 0x02, 0xED, 0x6F]);
    m.reg.a = 0x7A;
    m.store(0x0200, 0x31);
    run(&mut m, 2);
    assert_eq!(m.reg.a, 0x73);
    assert_eq!(m.load(0x0200), 0x1A);
}

#[test]
fn ld_a_r_reflects_interrupt_latch() {
    // EI; LD A,R
    let mut m = mach(&[0xFB, 0xED, 0x5F]);
    run(&mut m, 2);
    assert!(m.reg.f.pv, "P/V mirrors IFF");
}

#[test]
fn r_increments_per_m1_fetch() {
    let mut m = mach(&[0x00, 0xED, 0x44, 0xCB, 0x00, 0xDD, 0xCB, 0x00, 0x06]);
    step(&mut m); // NOP: one M1
    assert_eq!(m.reg.r, 1);
    step(&mut m); // ED NEG: two
    assert_eq!(m.reg.r, 3);
    step(&mut m); // CB RLC B: two
    assert_eq!(m.reg.r, 5);
    step(&mut m); // DD CB d op: two (displacement and opcode are not M1)
    assert_eq!(m.reg.r, 7);
}

#[test]
fn ex_sp_hl_and_jp_hl() {
    // LD HL,0x0234; PUSH HL; LD HL,0x0456; EX (SP),HL; JP (HL)
    let mut m = mach(&[
        0x21, 0x34, 0x02, 0xE5, 0x21, 0x56, 0x04, 0xE3, 0xE9,
    ]);
    run(&mut m, 4);
    assert_eq!(m.reg.hl(), 0x0234);
    assert_eq!(m.load16(m.reg.sp), 0x0456);
    step(&mut m);
    assert_eq!(m.reg.pc, 0x0234);
}

#[test]
fn conditional_calls_and_returns() {
    // XOR A; CALL NZ,0x0200 (skipped); CALL Z,0x0200; at 0x0200: RET Z
    let mut m = mach(&[0xAF, 0xC4, 0x00, 0x02, 0xCC, 0x00, 0x02]);
    m.store(0x0200, 0xC8);
    run(&mut m, 2);
    assert_eq!(m.reg.pc, 0x0104, "NZ call not taken");
    step(&mut m);
    assert_eq!(m.reg.pc, 0x0200);
    step(&mut m);
    assert_eq!(m.reg.pc, 0x0107);
}

#[test]
fn scf_ccf_yx_from_accumulator() {
    let mut m = mach(&[0x37, 0x3F]);
    m.reg.a = 0x28;
    step(&mut m);
    assert!(m.reg.f.c && m.reg.f.y && m.reg.f.x);
    step(&mut m);
    assert!(!m.reg.f.c && m.reg.f.h, "CCF moves old carry into H");
}
