//! Base-plane instruction handlers.

use log::trace;

use super::alu;
use super::{condition, get, index16, put, resolve, set_index16, Prefix};
use crate::machine::Machine;

/// ADD/ADC/SUB/SBC/AND/XOR/OR/CP against the accumulator.
fn alu_acc(m: &mut Machine, code: u8, val: u8) {
    let a = m.reg.a;
    let f = &mut m.reg.f;
    match code {
        0 => m.reg.a = alu::add8(f, a, val, false),
        1 => {
            let cin = f.c;
            m.reg.a = alu::add8(f, a, val, cin);
        }
        2 => m.reg.a = alu::sub8(f, a, val, false),
        3 => {
            let cin = f.c;
            m.reg.a = alu::sub8(f, a, val, cin);
        }
        4 => m.reg.a = alu::and8(f, a, val),
        5 => m.reg.a = alu::xor8(f, a, val),
        6 => m.reg.a = alu::or8(f, a, val),
        7 => alu::cp8(f, a, val),
        _ => unreachable!("alu code out of range"),
    }
}

/// BC DE HL/IX SP selected by the usual two-bit field.
fn pair16(m: &Machine, p: Prefix, code: u8) -> u16 {
    match code {
        0 => m.reg.bc(),
        1 => m.reg.de(),
        2 => index16(m, p),
        3 => m.reg.sp,
        _ => unreachable!("pair code out of range"),
    }
}

fn set_pair16(m: &mut Machine, p: Prefix, code: u8, v: u16) {
    match code {
        0 => m.reg.set_bc(v),
        1 => m.reg.set_de(v),
        2 => set_index16(m, p, v),
        3 => m.reg.sp = v,
        _ => unreachable!("pair code out of range"),
    }
}

pub(crate) fn exec(m: &mut Machine, p: Prefix, op: u8) {
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;

    match x {
        1 => {
            if op == 0x76 {
                // HALT: no interrupt will ever end it, so it re-executes.
                trace!("HALT at {:04x}", m.reg.pc.wrapping_sub(1));
                m.reg.pc = m.reg.pc.wrapping_sub(1);
                return;
            }
            // LD r,r' - the H/L side stays plain when the partner is the
            // indexed memory cell.
            let dst = resolve(m, p, y, z == 6);
            let src = resolve(m, p, z, y == 6);
            let v = get(m, src);
            put(m, dst, v);
        }
        2 => {
            let src = resolve(m, p, z, false);
            let v = get(m, src);
            alu_acc(m, y, v);
        }
        0 => exec_x0(m, p, op, y, z),
        3 => exec_x3(m, p, op, y, z),
        _ => unreachable!(),
    }
}

fn exec_x0(m: &mut Machine, p: Prefix, op: u8, y: u8, z: u8) {
    match (z, y) {
        (0, 0) => {} // NOP
        (0, 1) => {
            // EX AF,AF'
            std::mem::swap(&mut m.reg.a, &mut m.reg.a_alt);
            std::mem::swap(&mut m.reg.f, &mut m.reg.f_alt);
        }
        (0, 2) => {
            // DJNZ d
            let d = m.fetch() as i8;
            m.reg.b = m.reg.b.wrapping_sub(1);
            if m.reg.b != 0 {
                m.reg.pc = m.reg.pc.wrapping_add(d as i16 as u16);
            }
        }
        (0, 3) => {
            let d = m.fetch() as i8;
            m.reg.pc = m.reg.pc.wrapping_add(d as i16 as u16);
        }
        (0, 4..=7) => {
            let d = m.fetch() as i8;
            if condition(m, y - 4) {
                m.reg.pc = m.reg.pc.wrapping_add(d as i16 as u16);
            }
        }
        (1, _) if y & 1 == 0 => {
            let v = m.fetch16();
            set_pair16(m, p, y >> 1, v);
        }
        (1, _) => {
            // ADD HL,rr
            let hl = index16(m, p);
            let rr = pair16(m, p, y >> 1);
            let r = alu::add16(&mut m.reg.f, hl, rr);
            set_index16(m, p, r);
        }
        (2, 0) => m.store(m.reg.bc(), m.reg.a),
        (2, 1) => m.reg.a = m.load(m.reg.bc()),
        (2, 2) => m.store(m.reg.de(), m.reg.a),
        (2, 3) => m.reg.a = m.load(m.reg.de()),
        (2, 4) => {
            let addr = m.fetch16();
            let v = index16(m, p);
            m.store16(addr, v);
        }
        (2, 5) => {
            let addr = m.fetch16();
            let v = m.load16(addr);
            set_index16(m, p, v);
        }
        (2, 6) => {
            let addr = m.fetch16();
            m.store(addr, m.reg.a);
        }
        (2, 7) => {
            let addr = m.fetch16();
            m.reg.a = m.load(addr);
        }
        (3, _) if y & 1 == 0 => {
            let v = pair16(m, p, y >> 1).wrapping_add(1);
            set_pair16(m, p, y >> 1, v);
        }
        (3, _) => {
            let v = pair16(m, p, y >> 1).wrapping_sub(1);
            set_pair16(m, p, y >> 1, v);
        }
        (4, _) => {
            let t = resolve(m, p, y, false);
            let v = get(m, t);
            let r = alu::inc8(&mut m.reg.f, v);
            put(m, t, r);
        }
        (5, _) => {
            let t = resolve(m, p, y, false);
            let v = get(m, t);
            let r = alu::dec8(&mut m.reg.f, v);
            put(m, t, r);
        }
        (6, _) => {
            // LD r,n - for (IX+d) the displacement precedes the immediate.
            let t = resolve(m, p, y, false);
            let n = m.fetch();
            put(m, t, n);
        }
        (7, 0) => {
            let a = m.reg.a;
            let f = &mut m.reg.f;
            f.c = a & 0x80 != 0;
            m.reg.a = a.rotate_left(1);
            f.h = false;
            f.n = false;
            f.set_yx(m.reg.a);
        }
        (7, 1) => {
            let a = m.reg.a;
            let f = &mut m.reg.f;
            f.c = a & 0x01 != 0;
            m.reg.a = a.rotate_right(1);
            f.h = false;
            f.n = false;
            f.set_yx(m.reg.a);
        }
        (7, 2) => {
            let a = m.reg.a;
            let f = &mut m.reg.f;
            let cin = f.c as u8;
            f.c = a & 0x80 != 0;
            m.reg.a = a << 1 | cin;
            f.h = false;
            f.n = false;
            f.set_yx(m.reg.a);
        }
        (7, 3) => {
            let a = m.reg.a;
            let f = &mut m.reg.f;
            let cin = (f.c as u8) << 7;
            f.c = a & 0x01 != 0;
            m.reg.a = a >> 1 | cin;
            f.h = false;
            f.n = false;
            f.set_yx(m.reg.a);
        }
        (7, 4) => m.reg.a = alu::daa(&mut m.reg.f, m.reg.a),
        (7, 5) => {
            m.reg.a = !m.reg.a;
            let a = m.reg.a;
            let f = &mut m.reg.f;
            f.h = true;
            f.n = true;
            f.set_yx(a);
        }
        (7, 6) => {
            let a = m.reg.a;
            let f = &mut m.reg.f;
            f.c = true;
            f.h = false;
            f.n = false;
            f.set_yx(a);
        }
        (7, 7) => {
            let a = m.reg.a;
            let f = &mut m.reg.f;
            f.h = f.c;
            f.c = !f.c;
            f.n = false;
            f.set_yx(a);
        }
        _ => unreachable!("exec_x0: op {:02x}", op),
    }
}

fn exec_x3(m: &mut Machine, p: Prefix, op: u8, y: u8, z: u8) {
    match (z, y) {
        (0, _) => {
            if condition(m, y) {
                m.reg.pc = m.pop();
            }
        }
        (1, _) if y & 1 == 0 => {
            // POP rr (AF in slot 3)
            let v = m.pop();
            match y >> 1 {
                0 => m.reg.set_bc(v),
                1 => m.reg.set_de(v),
                2 => set_index16(m, p, v),
                3 => m.reg.set_af(v),
                _ => unreachable!(),
            }
        }
        (1, 1) => m.reg.pc = m.pop(), // RET
        (1, 3) => {
            // EXX
            std::mem::swap(&mut m.reg.b, &mut m.reg.b_alt);
            std::mem::swap(&mut m.reg.c, &mut m.reg.c_alt);
            std::mem::swap(&mut m.reg.d, &mut m.reg.d_alt);
            std::mem::swap(&mut m.reg.e, &mut m.reg.e_alt);
            std::mem::swap(&mut m.reg.h, &mut m.reg.h_alt);
            std::mem::swap(&mut m.reg.l, &mut m.reg.l_alt);
        }
        (1, 5) => m.reg.pc = index16(m, p), // JP (HL)
        (1, 7) => m.reg.sp = index16(m, p), // LD SP,HL
        (2, _) => {
            let addr = m.fetch16();
            if condition(m, y) {
                m.reg.pc = addr;
            }
        }
        (3, 0) => {
            let addr = m.fetch16();
            m.reg.pc = addr;
        }
        (3, 2) => {
            // OUT (n),A - ports are write-ignored.
            let _ = m.fetch();
        }
        (3, 3) => {
            // IN A,(n) - ports read zero; this form leaves flags alone.
            let _ = m.fetch();
            m.reg.a = 0;
        }
        (3, 4) => {
            // EX (SP),HL
            let sp = m.reg.sp;
            let v = m.load16(sp);
            let hl = index16(m, p);
            m.store16(sp, hl);
            set_index16(m, p, v);
        }
        (3, 5) => {
            // EX DE,HL - unaffected by DD/FD.
            let de = m.reg.de();
            let hl = m.reg.hl();
            m.reg.set_de(hl);
            m.reg.set_hl(de);
        }
        (3, 6) => m.reg.iff = false,
        (3, 7) => m.reg.iff = true,
        (4, _) => {
            let addr = m.fetch16();
            if condition(m, y) {
                let pc = m.reg.pc;
                m.push(pc);
                m.reg.pc = addr;
            }
        }
        (5, _) if y & 1 == 0 => {
            let v = match y >> 1 {
                0 => m.reg.bc(),
                1 => m.reg.de(),
                2 => index16(m, p),
                3 => m.reg.af(),
                _ => unreachable!(),
            };
            m.push(v);
        }
        (5, 1) => {
            // CALL nn
            let addr = m.fetch16();
            let pc = m.reg.pc;
            m.push(pc);
            m.reg.pc = addr;
        }
        (6, _) => {
            let n = m.fetch();
            alu_acc(m, y, n);
        }
        (7, _) => {
            // RST y*8
            let pc = m.reg.pc;
            m.push(pc);
            m.reg.pc = y as u16 * 8;
        }
        _ => unreachable!("exec_x3: op {:02x}", op),
    }
}
