//! CP/M-80 2.2 user-mode emulator core.
//!
//! Runs an unmodified 8080/Z80 program image inside a simulated 64 KiB
//! address space and intercepts the operating-system calls the image issues,
//! translating them into operations on host files, host terminal I/O, and
//! wall-clock time.
//!
//! # Architecture
//!
//! - [`machine::Machine`]: memory, register file, flags, mode state
//! - [`cpu::step`]: one instruction of the Z80 interpreter
//! - [`emulator::Emulator`]: run loop, magic-page trap dispatch
//! - [`bdos`]: the BDOS surface (console, disk, extended calls)
//! - [`registry::FileRegistry`]: open host files keyed by FCB-embedded IDs
//! - [`console::Console`]: character I/O abstraction for both back-ends

pub mod bdos;
pub mod bios;
pub mod charset;
pub mod clock;
pub mod config;
pub mod console;
pub mod cpu;
pub mod devices;
pub mod emulator;
pub mod error;
pub mod loader;
pub mod machine;
pub mod memsave;
pub mod registry;
pub mod signals;

pub use charset::Charset;
pub use config::{Config, ConsoleMode, DeviceMode, DumpEvents, SaveFormat};
pub use console::{BufferPort, Console, LineConsole, TermPort};
pub use emulator::{Emulator, ExitInfo};
pub use error::{CoreError, CoreResult};
pub use machine::Machine;

/// Why the run ended (or never started).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Start-up aborted before any instruction executed.
    OkNotRun,
    /// Normal termination via BDOS 0 or BIOS WBOOT.
    OkTerm,
    /// The line editor saw ^C at the start of a line.
    OkCtrlC,
    /// The program called BIOS BOOT.
    ErrBoot,
    /// An argument pointer left the 64 KiB window or a `$`-string ran off
    /// the end of memory.
    ErrBdosArg,
    /// Access to an unconfigured drive.
    ErrSelect,
    /// Write to a read-only drive.
    ErrRoDisk,
    /// Write to a read-only file.
    ErrRoFile,
    /// An underlying host operation failed unexpectedly.
    ErrHost,
    /// The guest violated the FCB ID protocol.
    ErrLogic,
    /// A terminating signal was caught.
    ErrSignal,
}

impl ExitReason {
    /// True for the reasons that map to a nonzero process exit code.
    pub fn is_error(self) -> bool {
        !matches!(
            self,
            ExitReason::OkNotRun | ExitReason::OkTerm | ExitReason::OkCtrlC
        )
    }
}
