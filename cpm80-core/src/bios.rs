//! Magic-page trap dispatcher: the BDOS entry, the seventeen CP/M 2.2 BIOS
//! entries in canonical order, and the non-standard millisecond delay hook.

use log::{debug, error};

use crate::bdos;
use crate::clock;
use crate::console::Console;
use crate::emulator::Emulator;
use crate::ExitReason;

/// Handle a fetch from magic offset `offset`. On return the caller applies
/// RET semantics; the register file is left per the calling convention:
/// A = L = low result byte, B = H = high byte.
pub(crate) fn dispatch<C: Console>(em: &mut Emulator<C>, offset: u8) {
    let result: u16 = match offset {
        0 => bdos::dispatch(em),
        1 => {
            // BOOT is the CCP's entry, never a program's.
            error!("program called BIOS BOOT");
            em.machine.request_stop(ExitReason::ErrBoot);
            0
        }
        2 => {
            debug!("BIOS WBOOT");
            em.machine.request_stop(ExitReason::OkTerm);
            0
        }
        3 => {
            // CONST
            if em.console.status() {
                0xFF
            } else {
                0x00
            }
        }
        4 => {
            // CONIN
            em.console.read_wait().unwrap_or(0x1A) as u16
        }
        5 => {
            // CONOUT
            let c = em.machine.reg.c;
            em.console.out_byte(c);
            0
        }
        6 => {
            let c = em.machine.reg.c;
            em.printer.put(c);
            0
        }
        7 => {
            let c = em.machine.reg.c;
            em.punch.put(c);
            0
        }
        8 => em.reader.get() as u16,
        9 => 0,  // HOME
        10 => 0, // SELDSK: no disk parameter header to offer
        11 | 12 | 13 => {
            // SETTRK / SETSEC / SETDMA: sector-level access is not a thing
            // here.
            debug!("BIOS sector call {offset} ignored");
            0
        }
        14 | 15 => {
            // READ / WRITE
            debug!("BIOS disk I/O refused");
            1
        }
        16 => 0xFF, // LISTST: always ready
        17 => em.machine.reg.bc(),
        18 => {
            let ms = em.machine.reg.bc() as u64;
            debug!("delay hook: {ms} ms");
            clock::sleep_ms(ms);
            0
        }
        _ => {
            error!("trap at unknown magic offset {offset}");
            0
        }
    };
    let m = &mut em.machine;
    m.reg.a = result as u8;
    m.reg.l = result as u8;
    m.reg.b = (result >> 8) as u8;
    m.reg.h = (result >> 8) as u8;
}
