//! BDOS (Basic Disk Operating System) surface.
//!
//! Function code in C, argument in DE, result returned to the trap layer
//! (which spreads it over A/L and B/H). Disk functions live in [`fdos`].

pub mod fcb;
pub mod fdos;

use log::{debug, trace};

use crate::clock;
use crate::console::Console;
use crate::emulator::Emulator;
use crate::machine::addr;
use crate::ExitReason;

/// CP/M 2.2 BDOS function numbers, plus the handful of CP/M 3 extensions
/// this emulator serves.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum BdosFunction {
    /// 0: System reset / warm boot
    SystemReset = 0,
    /// 1: Console input (blocking, echo)
    ConsoleInput = 1,
    /// 2: Console output
    ConsoleOutput = 2,
    /// 3: Reader input
    ReaderInput = 3,
    /// 4: Punch output
    PunchOutput = 4,
    /// 5: List output
    ListOutput = 5,
    /// 6: Direct console I/O
    DirectConsoleIO = 6,
    /// 7: Get IOBYTE
    GetIOByte = 7,
    /// 8: Set IOBYTE
    SetIOByte = 8,
    /// 9: Print string ($ terminated)
    PrintString = 9,
    /// 10: Read console buffer (line editor)
    ReadConsoleBuffer = 10,
    /// 11: Get console status
    ConsoleStatus = 11,
    /// 12: Return version number
    ReturnVersion = 12,
    /// 13: Reset disk system
    ResetDiskSystem = 13,
    /// 14: Select disk
    SelectDisk = 14,
    /// 15: Open file
    OpenFile = 15,
    /// 16: Close file
    CloseFile = 16,
    /// 17: Search for first
    SearchFirst = 17,
    /// 18: Search for next
    SearchNext = 18,
    /// 19: Delete file
    DeleteFile = 19,
    /// 20: Read sequential
    ReadSequential = 20,
    /// 21: Write sequential
    WriteSequential = 21,
    /// 22: Make file (create)
    MakeFile = 22,
    /// 23: Rename file
    RenameFile = 23,
    /// 24: Return login vector
    ReturnLoginVector = 24,
    /// 25: Return current disk
    ReturnCurrentDisk = 25,
    /// 26: Set DMA address
    SetDmaAddress = 26,
    /// 27: Get allocation vector address
    GetAllocationVector = 27,
    /// 28: Write protect current disk
    WriteProtectDisk = 28,
    /// 29: Get R/O vector
    GetReadOnlyVector = 29,
    /// 30: Set file attributes
    SetFileAttributes = 30,
    /// 31: Get DPB address
    GetDiskParameters = 31,
    /// 32: Get/set user code
    UserCode = 32,
    /// 33: Read random
    ReadRandom = 33,
    /// 34: Write random
    WriteRandom = 34,
    /// 35: Compute file size
    ComputeFileSize = 35,
    /// 36: Set random record
    SetRandomRecord = 36,
    /// 37: Reset drive
    ResetDrive = 37,
    /// 40: Write random with zero fill
    WriteRandomZeroFill = 40,
    /// 49: Get/set system control block (CP/M 3 subset)
    GetSetScb = 49,
    /// 101: Return directory label data
    DirLabel = 101,
    /// 102: Read file date stamps
    ReadFileDateStamps = 102,
    /// 105: Get date and time
    GetDateTime = 105,
    /// 108: Get/set program return code
    ProgramReturnCode = 108,
    /// 141: Delay in 20 ms ticks
    Delay = 141,
}

impl TryFrom<u8> for BdosFunction {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::SystemReset),
            1 => Ok(Self::ConsoleInput),
            2 => Ok(Self::ConsoleOutput),
            3 => Ok(Self::ReaderInput),
            4 => Ok(Self::PunchOutput),
            5 => Ok(Self::ListOutput),
            6 => Ok(Self::DirectConsoleIO),
            7 => Ok(Self::GetIOByte),
            8 => Ok(Self::SetIOByte),
            9 => Ok(Self::PrintString),
            10 => Ok(Self::ReadConsoleBuffer),
            11 => Ok(Self::ConsoleStatus),
            12 => Ok(Self::ReturnVersion),
            13 => Ok(Self::ResetDiskSystem),
            14 => Ok(Self::SelectDisk),
            15 => Ok(Self::OpenFile),
            16 => Ok(Self::CloseFile),
            17 => Ok(Self::SearchFirst),
            18 => Ok(Self::SearchNext),
            19 => Ok(Self::DeleteFile),
            20 => Ok(Self::ReadSequential),
            21 => Ok(Self::WriteSequential),
            22 => Ok(Self::MakeFile),
            23 => Ok(Self::RenameFile),
            24 => Ok(Self::ReturnLoginVector),
            25 => Ok(Self::ReturnCurrentDisk),
            26 => Ok(Self::SetDmaAddress),
            27 => Ok(Self::GetAllocationVector),
            28 => Ok(Self::WriteProtectDisk),
            29 => Ok(Self::GetReadOnlyVector),
            30 => Ok(Self::SetFileAttributes),
            31 => Ok(Self::GetDiskParameters),
            32 => Ok(Self::UserCode),
            33 => Ok(Self::ReadRandom),
            34 => Ok(Self::WriteRandom),
            35 => Ok(Self::ComputeFileSize),
            36 => Ok(Self::SetRandomRecord),
            37 => Ok(Self::ResetDrive),
            40 => Ok(Self::WriteRandomZeroFill),
            49 => Ok(Self::GetSetScb),
            101 => Ok(Self::DirLabel),
            102 => Ok(Self::ReadFileDateStamps),
            105 => Ok(Self::GetDateTime),
            108 => Ok(Self::ProgramReturnCode),
            141 => Ok(Self::Delay),
            _ => Err(value),
        }
    }
}

/// Record size in CP/M (always 128 bytes).
pub const RECORD_SIZE: usize = 128;

/// Dispatch the function selected by register C.
pub(crate) fn dispatch<C: Console>(em: &mut Emulator<C>) -> u16 {
    use BdosFunction::*;

    let func = em.machine.reg.c;
    let e = em.machine.reg.e;
    let de = em.machine.reg.de();

    let func = match BdosFunction::try_from(func) {
        Ok(f) => f,
        Err(n) => {
            // Unknown functions are non-fatal: log and return zero.
            trace!("BDOS {n} (unsupported) de={de:04x}");
            return 0;
        }
    };
    trace!("BDOS {func:?} de={de:04x}");

    match func {
        SystemReset => {
            em.machine.request_stop(ExitReason::OkTerm);
            0
        }
        ConsoleInput => {
            let b = em.console.read_wait().unwrap_or(0x1A);
            em.console.out_byte(b);
            b as u16
        }
        ConsoleOutput => {
            em.console.out_byte(e);
            0
        }
        ReaderInput => em.reader.get() as u16,
        PunchOutput => {
            em.punch.put(e);
            0
        }
        ListOutput => {
            em.printer.put(e);
            0
        }
        DirectConsoleIO => match e {
            0xFF => em.console.read_poll().unwrap_or(0) as u16,
            0xFE => {
                if em.console.status() {
                    0xFF
                } else {
                    0
                }
            }
            _ => {
                em.console.out_byte(e);
                0
            }
        },
        GetIOByte => em.machine.load(addr::IOBYTE) as u16,
        SetIOByte => {
            em.machine.store(addr::IOBYTE, e);
            0
        }
        PrintString => print_string(em, de),
        ReadConsoleBuffer => {
            read_console_buffer(em, de);
            0
        }
        ConsoleStatus => {
            if em.console.status() {
                0xFF
            } else {
                0
            }
        }
        ReturnVersion => 0x0022,
        ResetDiskSystem => {
            em.current_drive = em.default_drive;
            em.read_only = em.ro_default;
            em.dma = addr::DEFAULT_DMA;
            update_drvuser(em);
            0
        }
        SelectDisk => fdos::select_disk(em, e),
        OpenFile => fdos::open_file(em, de),
        CloseFile => fdos::close_file(em, de),
        SearchFirst => fdos::search_first(em, de),
        SearchNext => fdos::search_next(em),
        DeleteFile => fdos::delete_file(em, de),
        ReadSequential => fdos::read_sequential(em, de),
        WriteSequential => fdos::write_sequential(em, de),
        MakeFile => fdos::make_file(em, de),
        RenameFile => fdos::rename_file(em, de),
        ReturnLoginVector => {
            let mut v = 0u16;
            for (i, d) in em.drives.iter().enumerate() {
                if d.is_some() {
                    v |= 1 << i;
                }
            }
            v
        }
        ReturnCurrentDisk => em.current_drive as u16,
        SetDmaAddress => {
            // The 128-byte buffer must fit below the address-space end.
            if de > 0xFF80 {
                debug!("DMA {de:04x} leaves no room for a record");
                em.machine.request_stop(ExitReason::ErrBdosArg);
                return 0;
            }
            em.dma = de;
            0
        }
        GetAllocationVector => addr::ALV,
        WriteProtectDisk => {
            em.read_only[em.current_drive as usize] = true;
            0
        }
        GetReadOnlyVector => {
            let mut v = 0u16;
            for (i, &ro) in em.read_only.iter().enumerate() {
                if ro {
                    v |= 1 << i;
                }
            }
            v
        }
        SetFileAttributes => fdos::set_file_attributes(em, de),
        GetDiskParameters => addr::DPB,
        UserCode => {
            if e == 0xFF {
                em.user as u16
            } else {
                em.user = e & 0x0F;
                update_drvuser(em);
                0
            }
        }
        ReadRandom => fdos::read_random(em, de),
        WriteRandom | WriteRandomZeroFill => fdos::write_random(em, de),
        ComputeFileSize => fdos::compute_file_size(em, de),
        SetRandomRecord => fdos::set_random_record(em, de),
        ResetDrive => {
            for i in 0..16 {
                if de & (1 << i) != 0 {
                    em.read_only[i] = em.ro_default[i];
                }
            }
            0
        }
        GetSetScb => get_set_scb(em, de),
        DirLabel => 0x61, // label present, stamps enabled, no passwords
        ReadFileDateStamps => fdos::read_date_stamps(em, de),
        GetDateTime => {
            let (day, hh, mm, ss) = clock::now_stamp();
            em.machine.store16(de, day);
            em.machine.store(de.wrapping_add(2), hh);
            em.machine.store(de.wrapping_add(3), mm);
            ss as u16
        }
        ProgramReturnCode => {
            if de == 0xFFFF {
                em.program_rc
            } else {
                em.program_rc = de;
                0
            }
        }
        Delay => {
            clock::sleep_ms(de as u64 * 20);
            0
        }
    }
}

pub(crate) fn update_drvuser<C: Console>(em: &mut Emulator<C>) {
    let b = (em.user << 4) | (em.current_drive & 0x0F);
    em.machine.store(addr::DRVUSER, b);
}

/// BDOS 9: write characters from DE until `$`. Running off the end of the
/// address space without a terminator is a malformed argument.
fn print_string<C: Console>(em: &mut Emulator<C>, start: u16) -> u16 {
    let mut a = start;
    loop {
        let b = em.machine.load(a);
        if b == b'$' {
            return 0;
        }
        em.console.out_byte(b);
        if a == 0xFFFF {
            debug!("$-string at {start:04x} runs past memory end");
            em.machine.request_stop(ExitReason::ErrBdosArg);
            return 0;
        }
        a = a.wrapping_add(1);
    }
}

/// BDOS 10 line editor. The buffer's first byte is the capacity, the second
/// receives the stored length.
fn read_console_buffer<C: Console>(em: &mut Emulator<C>, buf: u16) {
    let capacity = em.machine.load(buf) as usize;
    let start_col = em.console.column();
    let mut stored: Vec<u8> = Vec::with_capacity(capacity);

    loop {
        let Some(b) = em.console.read_wait() else {
            break;
        };
        match b {
            0x03 if stored.is_empty() => {
                // ^C at the start of the line cancels the program.
                em.console.out_byte(b'^');
                em.console.out_byte(b'C');
                crlf(em);
                em.machine.request_stop(ExitReason::OkCtrlC);
                return;
            }
            0x05 => crlf(em), // physical newline, input continues
            0x08 | 0x7F => {
                if let Some(deleted) = stored.pop() {
                    let width = if deleted < 0x20 { 2 } else { 1 };
                    for _ in 0..width {
                        rub_out(em);
                    }
                }
            }
            0x0A | 0x0D => {
                em.console.out_byte(0x0D);
                break;
            }
            0x12 => {
                // ^R: retype the line from its start column.
                crlf(em);
                pad_to(em, start_col);
                for &c in &stored {
                    echo(em, c);
                }
            }
            0x15 | 0x18 => {
                // ^U / ^X: discard and restart.
                crlf(em);
                pad_to(em, start_col);
                stored.clear();
            }
            _ => {
                if stored.len() < capacity {
                    stored.push(b);
                    echo(em, b);
                }
            }
        }
    }

    em.machine.store(buf.wrapping_add(1), stored.len() as u8);
    for (i, &b) in stored.iter().enumerate() {
        em.machine.store(buf.wrapping_add(2 + i as u16), b);
    }
}

fn crlf<C: Console>(em: &mut Emulator<C>) {
    em.console.out_byte(0x0D);
    em.console.out_byte(0x0A);
}

fn pad_to<C: Console>(em: &mut Emulator<C>, col: u16) {
    while em.console.column() < col {
        em.console.out_byte(b' ');
    }
}

/// Echo with the control-prefix convention: a control byte shows as ^X.
fn echo<C: Console>(em: &mut Emulator<C>, b: u8) {
    if b < 0x20 {
        em.console.out_byte(b'^');
        em.console.out_byte(b + 0x40);
    } else {
        em.console.out_byte(b);
    }
}

/// Erase the last echoed position.
fn rub_out<C: Console>(em: &mut Emulator<C>) {
    em.console.out_byte(0x08);
    em.console.out_byte(b' ');
    em.console.out_byte(0x08);
}

/// BDOS 49: a fixed subset of the CP/M 3 system control block. The guest
/// passes a two-byte descriptor (offset, set-mode) optionally followed by a
/// value; writes are accepted and discarded.
fn get_set_scb<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let offset = em.machine.load(de);
    let mode = em.machine.load(de.wrapping_add(1));
    if mode == 0xFF || mode == 0xFE {
        return 0; // discard writes
    }
    let (cols, lines) = em.console.size();
    match offset {
        0x05 => 0x0022,
        0x10 => em.program_rc & 0x00FF,
        0x11 => em.program_rc >> 8,
        0x1A => cols.saturating_sub(1).min(255),
        0x1C => lines.min(255),
        0x26 => em.current_drive as u16,
        0x3C => em.dma,
        0x3D => em.dma >> 8,
        0x44 => em.user as u16,
        0x4A => 1, // multi-sector count
        _ => 0,
    }
}
