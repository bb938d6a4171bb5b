//! ED-plane handlers: 16-bit carry arithmetic, I/R transfers, RLD/RRD,
//! the interrupt-mode and return stubs, and the block instructions.
//!
//! Undefined ED opcodes execute as NOPs. Port input always reads zero and
//! port output is discarded, so the block-I/O forms move zeros and the
//! flag heuristics run on what was (not) transferred.

use super::alu;
use crate::machine::Machine;

pub(crate) fn exec(m: &mut Machine, op: u8) {
    let y = (op >> 3) & 7;
    match op {
        // IN r,(C) / IN F,(C): ports read zero, flags from zero.
        0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
            let f = &mut m.reg.f;
            f.set_sz(0);
            f.set_yx(0);
            f.h = false;
            f.n = false;
            f.pv = alu::parity_even(0);
            if op != 0x70 {
                write_reg(m, y, 0);
            }
        }
        // OUT (C),r / OUT (C),0: discarded.
        0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {}
        0x42 | 0x52 | 0x62 | 0x72 => {
            let hl = m.reg.hl();
            let rr = pair(m, (op >> 4) & 3);
            let cin = m.reg.f.c;
            let r = alu::sbc16(&mut m.reg.f, hl, rr, cin);
            m.reg.set_hl(r);
        }
        0x4A | 0x5A | 0x6A | 0x7A => {
            let hl = m.reg.hl();
            let rr = pair(m, (op >> 4) & 3);
            let cin = m.reg.f.c;
            let r = alu::adc16(&mut m.reg.f, hl, rr, cin);
            m.reg.set_hl(r);
        }
        0x43 | 0x53 | 0x63 | 0x73 => {
            let addr = m.fetch16();
            let v = pair(m, (op >> 4) & 3);
            m.store16(addr, v);
        }
        0x4B | 0x5B | 0x6B | 0x7B => {
            let addr = m.fetch16();
            let v = m.load16(addr);
            set_pair(m, (op >> 4) & 3, v);
        }
        // NEG and its mirrors.
        0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
            let a = m.reg.a;
            m.reg.a = alu::sub8(&mut m.reg.f, 0, a, false);
        }
        // RETN / RETI: no interrupt sources exist, both are a plain return.
        0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
            m.reg.pc = m.pop();
        }
        // IM 0/1/2 and mirrors: the mode is irrelevant without interrupts.
        0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x76 | 0x7E => {}
        0x47 => m.reg.i = m.reg.a,
        0x4F => m.reg.r = m.reg.a,
        0x57 => {
            m.reg.a = m.reg.i;
            ir_flags(m);
        }
        0x5F => {
            m.reg.a = m.reg.r;
            ir_flags(m);
        }
        0x67 => {
            // RRD
            let hl = m.reg.hl();
            let t = m.load(hl);
            let a = m.reg.a;
            m.store(hl, (a << 4) | (t >> 4));
            m.reg.a = (a & 0xF0) | (t & 0x0F);
            rld_flags(m);
        }
        0x6F => {
            // RLD
            let hl = m.reg.hl();
            let t = m.load(hl);
            let a = m.reg.a;
            m.store(hl, (t << 4) | (a & 0x0F));
            m.reg.a = (a & 0xF0) | (t >> 4);
            rld_flags(m);
        }
        0xA0 => ld_block(m, 1, false),
        0xA8 => ld_block(m, -1, false),
        0xB0 => ld_block(m, 1, true),
        0xB8 => ld_block(m, -1, true),
        0xA1 => cp_block(m, 1, false),
        0xA9 => cp_block(m, -1, false),
        0xB1 => cp_block(m, 1, true),
        0xB9 => cp_block(m, -1, true),
        0xA2 => in_block(m, 1, false),
        0xAA => in_block(m, -1, false),
        0xB2 => in_block(m, 1, true),
        0xBA => in_block(m, -1, true),
        0xA3 => out_block(m, 1, false),
        0xAB => out_block(m, -1, false),
        0xB3 => out_block(m, 1, true),
        0xBB => out_block(m, -1, true),
        _ => {} // undefined ED opcodes are NOPs
    }
}

fn pair(m: &Machine, code: u8) -> u16 {
    match code {
        0 => m.reg.bc(),
        1 => m.reg.de(),
        2 => m.reg.hl(),
        3 => m.reg.sp,
        _ => unreachable!(),
    }
}

fn set_pair(m: &mut Machine, code: u8, v: u16) {
    match code {
        0 => m.reg.set_bc(v),
        1 => m.reg.set_de(v),
        2 => m.reg.set_hl(v),
        3 => m.reg.sp = v,
        _ => unreachable!(),
    }
}

fn write_reg(m: &mut Machine, code: u8, v: u8) {
    match code {
        0 => m.reg.b = v,
        1 => m.reg.c = v,
        2 => m.reg.d = v,
        3 => m.reg.e = v,
        4 => m.reg.h = v,
        5 => m.reg.l = v,
        7 => m.reg.a = v,
        _ => unreachable!(),
    }
}

/// LD A,I / LD A,R flag rule: P/V mirrors the interrupt enable.
fn ir_flags(m: &mut Machine) {
    let a = m.reg.a;
    let iff = m.reg.iff;
    let f = &mut m.reg.f;
    f.set_sz(a);
    f.set_yx(a);
    f.h = false;
    f.n = false;
    f.pv = iff;
}

fn rld_flags(m: &mut Machine) {
    let a = m.reg.a;
    let f = &mut m.reg.f;
    f.set_sz(a);
    f.set_yx(a);
    f.h = false;
    f.n = false;
    f.pv = alu::parity_even(a);
}

/// Rewind PC over the two opcode bytes so the repeating form re-dispatches.
fn repeat(m: &mut Machine) {
    m.reg.pc = m.reg.pc.wrapping_sub(2);
}

/// LDI/LDD/LDIR/LDDR. Y/X come from bits 1 and 3 of (transferred + A).
fn ld_block(m: &mut Machine, dir: i16, rep: bool) {
    let hl = m.reg.hl();
    let de = m.reg.de();
    let t = m.load(hl);
    m.store(de, t);
    m.reg.set_hl(hl.wrapping_add(dir as u16));
    m.reg.set_de(de.wrapping_add(dir as u16));
    let bc = m.reg.bc().wrapping_sub(1);
    m.reg.set_bc(bc);
    let n = t.wrapping_add(m.reg.a);
    let f = &mut m.reg.f;
    f.y = n & 0x02 != 0;
    f.x = n & 0x08 != 0;
    f.h = false;
    f.n = false;
    f.pv = bc != 0;
    if rep && bc != 0 {
        repeat(m);
    }
}

/// CPI/CPD/CPIR/CPDR. Y/X come from (A - operand - H) after the compare.
fn cp_block(m: &mut Machine, dir: i16, rep: bool) {
    let hl = m.reg.hl();
    let t = m.load(hl);
    m.reg.set_hl(hl.wrapping_add(dir as u16));
    let bc = m.reg.bc().wrapping_sub(1);
    m.reg.set_bc(bc);
    let a = m.reg.a;
    let carry = m.reg.f.c;
    let f = &mut m.reg.f;
    let r = alu::sub8(f, a, t, false);
    let n = r.wrapping_sub(f.h as u8);
    f.y = n & 0x02 != 0;
    f.x = n & 0x08 != 0;
    f.pv = bc != 0;
    f.c = carry; // compare leaves carry alone
    if rep && bc != 0 && !f.z {
        repeat(m);
    }
}

/// INI/IND/INIR/INDR. The port reads zero; the carry heuristic runs on
/// value + (C ± 1), and S/Z/Y/X track the decremented B.
fn in_block(m: &mut Machine, dir: i16, rep: bool) {
    let val = 0u8; // port input
    let hl = m.reg.hl();
    m.store(hl, val);
    m.reg.set_hl(hl.wrapping_add(dir as u16));
    let b = m.reg.b.wrapping_sub(1);
    m.reg.b = b;
    let c_adj = m.reg.c.wrapping_add(dir as u8);
    let k = val as u16 + c_adj as u16;
    let f = &mut m.reg.f;
    f.set_sz(b);
    f.set_yx(b);
    f.c = k > 0xFF;
    f.h = k > 0xFF;
    f.pv = alu::parity_even((k as u8 & 7) ^ b);
    f.n = val & 0x80 != 0;
    if rep && b != 0 {
        repeat(m);
    }
}

/// OUTI/OUTD/OTIR/OTDR. The byte is read and discarded; the heuristic uses
/// L after the pointer moves.
fn out_block(m: &mut Machine, dir: i16, rep: bool) {
    let hl = m.reg.hl();
    let val = m.load(hl);
    m.reg.set_hl(hl.wrapping_add(dir as u16));
    let b = m.reg.b.wrapping_sub(1);
    m.reg.b = b;
    let k = val as u16 + m.reg.l as u16;
    let f = &mut m.reg.f;
    f.set_sz(b);
    f.set_yx(b);
    f.c = k > 0xFF;
    f.h = k > 0xFF;
    f.pv = alu::parity_even((k as u8 & 7) ^ b);
    f.n = val & 0x80 != 0;
    if rep && b != 0 {
        repeat(m);
    }
}
