//! CB-plane handlers: rotates, shifts, BIT/RES/SET, and the DDCB/FDCB
//! indexed forms with their copy-to-register undocumented variants.

use super::alu;
use super::{get, indexed_addr, put, resolve, Operand, Prefix};
use crate::machine::Machine;

fn rotate(m: &mut Machine, kind: u8, v: u8) -> u8 {
    let f = &mut m.reg.f;
    match kind {
        0 => alu::rlc(f, v),
        1 => alu::rrc(f, v),
        2 => alu::rl(f, v),
        3 => alu::rr(f, v),
        4 => alu::sla(f, v),
        5 => alu::sra(f, v),
        6 => alu::sll(f, v),
        7 => alu::srl(f, v),
        _ => unreachable!("rotate kind out of range"),
    }
}

/// BIT n: Z/PV from the tested bit, S only meaningful for bit 7, Y/X from
/// `yx_source` (the operand byte, or the latched address's high byte for the
/// memory forms).
fn bit_test(m: &mut Machine, bit: u8, v: u8, yx_source: u8) {
    let set = v & (1 << bit) != 0;
    let f = &mut m.reg.f;
    f.z = !set;
    f.pv = !set;
    f.s = bit == 7 && set;
    f.h = true;
    f.n = false;
    f.set_yx(yx_source);
}

pub(crate) fn exec(m: &mut Machine, p: Prefix) {
    if p == Prefix::None {
        let op = m.fetch_m1();
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let t = resolve(m, p, z, false);
        let v = get(m, t);
        match x {
            0 => {
                let r = rotate(m, y, v);
                put(m, t, r);
            }
            1 => {
                let yx = match t {
                    // The memory form leaks the internal address latch.
                    Operand::Mem(_) => (m.internal_addr >> 8) as u8,
                    _ => v,
                };
                bit_test(m, y, v, yx);
            }
            2 => put(m, t, v & !(1 << y)),
            3 => put(m, t, v | 1 << y),
            _ => unreachable!(),
        }
        return;
    }

    // DDCB/FDCB: displacement first, then the opcode; neither is an M1
    // fetch. The operand is always the indexed cell, and rotate/RES/SET
    // additionally copy the result into the register named by the low bits.
    let addr = indexed_addr(m, p);
    let op = m.fetch();
    let x = op >> 6;
    let y = (op >> 3) & 7;
    let z = op & 7;
    let v = m.load(addr);
    match x {
        0 => {
            let r = rotate(m, y, v);
            m.store(addr, r);
            if z != 6 {
                copy_to_reg(m, z, r);
            }
        }
        1 => bit_test(m, y, v, (addr >> 8) as u8),
        2 => {
            let r = v & !(1 << y);
            m.store(addr, r);
            if z != 6 {
                copy_to_reg(m, z, r);
            }
        }
        3 => {
            let r = v | 1 << y;
            m.store(addr, r);
            if z != 6 {
                copy_to_reg(m, z, r);
            }
        }
        _ => unreachable!(),
    }
}

/// The DDCB result copy targets the plain register file, never the index
/// halves.
fn copy_to_reg(m: &mut Machine, code: u8, v: u8) {
    match code {
        0 => m.reg.b = v,
        1 => m.reg.c = v,
        2 => m.reg.d = v,
        3 => m.reg.e = v,
        4 => m.reg.h = v,
        5 => m.reg.l = v,
        7 => m.reg.a = v,
        _ => unreachable!("copy target out of range"),
    }
}
