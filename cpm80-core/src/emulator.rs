//! The emulator proper: owns the machine, the console, the devices and the
//! file registry, and runs the fetch/trap/execute loop.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;

use crate::bios;
use crate::config::{Config, CpuDelay, DumpEvents};
use crate::console::Console;
use crate::cpu;
use crate::devices::{InDevice, OutDevice};
use crate::error::CoreResult;
use crate::loader;
use crate::machine::{addr, Machine};
use crate::registry::FileRegistry;
use crate::signals;
use crate::ExitReason;

/// Console and signal polling cadence, in executed instructions. Chosen
/// empirically; high enough that polling cost vanishes, low enough that a
/// resize or ^C lands within a fraction of a second.
pub const POLL_INTERVAL: u64 = 128 * 1024;

/// Result of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct ExitInfo {
    pub reason: ExitReason,
    pub instructions: u64,
    pub pc: u16,
    /// BDOS 108 program return code; values >= 0xFF00 signal failure.
    pub program_rc: u16,
}

pub struct Emulator<C: Console> {
    pub machine: Machine,
    pub(crate) console: C,
    pub(crate) printer: OutDevice,
    pub(crate) punch: OutDevice,
    pub(crate) reader: InDevice,
    pub(crate) registry: FileRegistry,
    pub(crate) drives: [Option<PathBuf>; 16],
    pub(crate) read_only: [bool; 16],
    pub(crate) ro_default: [bool; 16],
    pub(crate) default_drive: u8,
    pub(crate) current_drive: u8,
    pub(crate) user: u8,
    pub(crate) dma: u16,
    pub(crate) search_list: VecDeque<[u8; 11]>,
    pub(crate) program_rc: u16,
    pub(crate) dont_close: bool,
    cpu_delay: Option<CpuDelay>,
    dump_events: DumpEvents,
    instructions: u64,
}

impl<C: Console> Emulator<C> {
    /// Build the machine for `cfg` and load the configured command image.
    pub fn new(cfg: &Config, console: C) -> CoreResult<Self> {
        let mut em = Self::without_program(cfg, console)?;
        let image = loader::read_command_image(cfg)?;
        loader::place_image(&mut em.machine, &image)?;
        Ok(em)
    }

    /// Build the machine for `cfg` and load a raw program image instead of
    /// resolving `cfg.command`.
    pub fn with_program(cfg: &Config, console: C, image: &[u8]) -> CoreResult<Self> {
        let mut em = Self::without_program(cfg, console)?;
        loader::place_image(&mut em.machine, image)?;
        Ok(em)
    }

    fn without_program(cfg: &Config, console: C) -> CoreResult<Self> {
        let mut machine = Machine::new();
        loader::setup(&mut machine, cfg);
        Ok(Emulator {
            machine,
            console,
            printer: OutDevice::open(cfg.printer.as_ref(), cfg.charset.clone())?,
            punch: OutDevice::open(cfg.punch.as_ref(), cfg.charset.clone())?,
            reader: InDevice::open(cfg.reader.as_ref(), cfg.charset.clone())?,
            registry: FileRegistry::new(),
            drives: cfg.drives.clone(),
            read_only: cfg.read_only,
            ro_default: cfg.read_only,
            default_drive: cfg.default_drive,
            current_drive: cfg.default_drive,
            user: 0,
            dma: addr::DEFAULT_DMA,
            search_list: VecDeque::new(),
            program_rc: 0,
            dont_close: cfg.dont_close,
            cpu_delay: cfg.cpu_delay,
            dump_events: cfg.dump_events,
            instructions: 0,
        })
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// Run until termination. Teardown (file registry, devices, console)
    /// happens before this returns, on every path.
    pub fn run(&mut self) -> ExitInfo {
        if self.dump_events.startup {
            self.dump_state("startup");
        }
        loop {
            if self.machine.terminated {
                break;
            }
            if signals::stop_requested() {
                self.machine.request_stop(ExitReason::ErrSignal);
                break;
            }
            if signals::take_dump_request() {
                self.dump_state("signal");
            }
            self.instructions += 1;
            if self.instructions % POLL_INTERVAL == 0 {
                self.console.poll();
            }
            if let Some(d) = self.cpu_delay {
                if d.every > 0 && self.instructions % d.every == 0 {
                    std::thread::sleep(Duration::from_nanos(d.nanos));
                }
            }

            let pc = self.machine.reg.pc;
            if pc >= addr::MAGIC {
                // Trap before decoding, then unwind like the RET the guest
                // expects to have executed.
                bios::dispatch(self, (pc - addr::MAGIC) as u8);
                let ret = self.machine.pop();
                self.machine.reg.pc = ret;
                continue;
            }
            cpu::step(&mut self.machine);
        }
        self.finish()
    }

    fn finish(&mut self) -> ExitInfo {
        let reason = self.machine.term_reason;
        let info = ExitInfo {
            reason,
            instructions: self.instructions,
            pc: self.machine.reg.pc,
            program_rc: self.program_rc,
        };
        if (self.dump_events.on_signal && reason == ExitReason::ErrSignal)
            || (self.dump_events.on_error && reason.is_error())
            || self.dump_events.exit
        {
            self.dump_state("exit");
        }
        // Shutdown in reverse order of setup.
        self.registry.close_all();
        self.punch.flush();
        self.printer.flush();
        self.console.shutdown();
        warn!(
            "terminated: {:?} after {} instructions at pc={:04x}",
            reason, info.instructions, info.pc
        );
        info
    }

    /// Write the register file and the next opcode bytes to the log.
    pub fn dump_state(&self, label: &str) {
        let r = &self.machine.reg;
        warn!(
            "[{label}] A={:02x} F={:02x} BC={:04x} DE={:04x} HL={:04x} \
             IX={:04x} IY={:04x} SP={:04x} PC={:04x} I={:02x} R={:02x} iff={}",
            r.a,
            r.f.to_byte(),
            r.bc(),
            r.de(),
            r.hl(),
            r.ix,
            r.iy,
            r.sp,
            r.pc,
            r.i,
            r.r,
            r.iff as u8,
        );
        warn!(
            "[{label}] A'={:02x} F'={:02x} B'C'={:02x}{:02x} D'E'={:02x}{:02x} H'L'={:02x}{:02x}",
            r.a_alt,
            r.f_alt.to_byte(),
            r.b_alt,
            r.c_alt,
            r.d_alt,
            r.e_alt,
            r.h_alt,
            r.l_alt,
        );
        let next = self.machine.read_block(r.pc, 4);
        warn!(
            "[{label}] next bytes {:02x} {:02x} {:02x} {:02x}, {} instructions executed",
            next[0], next[1], next[2], next[3], self.instructions
        );
    }

    /// Current DMA buffer address.
    pub fn dma(&self) -> u16 {
        self.dma
    }
}
