//! Program loading and initial memory layout.
//!
//! Builds the zero page, the default FCBs and command tail, the BDOS and
//! BIOS stubs, the fake disk structures and the magic page, then places the
//! `.com` image at the TPA.

use std::fs;
use std::path::PathBuf;

use crate::bdos::fdos;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::machine::{addr, Machine};

/// RET opcode; every magic-page byte holds one so a guest that inspects
/// these addresses sees plausible code.
const RET: u8 = 0xC9;
const JP: u8 = 0xC3;

/// Fake disk parameter block: an 8 MiB drive with 16 KiB blocks, 256
/// directory entries, no reserved tracks.
const DPB_BYTES: [u8; 15] = [
    0x40, 0x00, // SPT
    0x07, // BSH
    0x7F, // BLM
    0x07, // EXM
    0xFF, 0x01, // DSM
    0xFF, 0x00, // DRM
    0x80, 0x00, // AL0, AL1
    0x00, 0x00, // CKS
    0x00, 0x00, // OFF
];

const SERIAL_BYTES: [u8; 6] = [0x00, 0x16, 0x00, 0xC0, 0xFF, 0xEE];

/// Lay out everything except the program image and point the registers at
/// the TPA.
pub fn setup(m: &mut Machine, cfg: &Config) {
    // Magic page: every byte a RET; fetches there are trapped first.
    for i in 0..addr::MAGIC_ENTRIES {
        m.store(addr::MAGIC + i, RET);
    }

    // Serial number directly below the magic page.
    m.write_block(addr::SERIAL, &SERIAL_BYTES);

    // BIOS jump vector: 17 standard entries plus the delay hook, each
    // JP magic+1+k.
    for k in 0..18u16 {
        let entry = addr::BIOS_VECTOR + 3 * k;
        m.store(entry, JP);
        m.store16(entry + 1, addr::MAGIC + 1 + k);
    }

    // Fake DPB and an all-free allocation vector.
    m.write_block(addr::DPB, &DPB_BYTES);
    for i in 0..64u16 {
        m.store(addr::ALV + i, 0x00);
    }

    // BDOS stub: JP into the magic page, then four dummy error vectors.
    m.store(addr::BDOS_ENTRY, JP);
    m.store16(addr::BDOS_ENTRY + 1, addr::MAGIC);
    for k in 0..4u16 {
        m.store16(addr::BDOS_ENTRY + 3 + 2 * k, addr::BDOS_ENTRY);
    }

    // Zero page.
    m.store(0x0000, JP);
    m.store16(0x0001, addr::BIOS_VECTOR + 3); // WBOOT entry
    m.store(addr::IOBYTE, 0x00);
    m.store(addr::DRVUSER, cfg.default_drive & 0x0F);
    m.store(addr::BDOS_JUMP, JP);
    m.store16(addr::BDOS_JUMP + 1, addr::BDOS_ENTRY);

    // Default FCBs from the first two arguments.
    blank_fcb(m, addr::FCB1);
    blank_fcb(m, addr::FCB2);
    if let Some(arg) = cfg.args.first() {
        arg_to_fcb(m, addr::FCB1, arg);
    }
    if let Some(arg) = cfg.args.get(1) {
        arg_to_fcb(m, addr::FCB2, arg);
    }

    // Command tail: upper-cased, a space before each argument.
    let mut tail = Vec::new();
    for arg in &cfg.args {
        if tail.len() >= 127 {
            break;
        }
        tail.push(b' ');
        for b in arg.to_uppercase().bytes() {
            if tail.len() >= 127 {
                break;
            }
            tail.push(b);
        }
    }
    m.store(addr::DEFAULT_DMA, tail.len() as u8);
    m.write_block(addr::DEFAULT_DMA + 1, &tail);

    // Eight-level CCP stack with the WBOOT return pre-pushed.
    m.reg.sp = addr::INITIAL_SP;
    m.store16(addr::INITIAL_SP, addr::BIOS_VECTOR + 3);
    m.reg.pc = addr::TPA;
}

/// Copy the image into the TPA, refusing to run into the BDOS stub.
pub fn place_image(m: &mut Machine, image: &[u8]) -> CoreResult<()> {
    let room = (addr::TPA_TOP - addr::TPA) as usize;
    if image.len() > room {
        return Err(CoreError::ProgramTooLarge(format!(
            "{} bytes, TPA holds {}",
            image.len(),
            room
        )));
    }
    m.write_block(addr::TPA, image);
    Ok(())
}

/// Resolve `cfg.command` to a host file and read it.
///
/// A name containing `/` is a host path; anything else is a CP/M-style
/// `drive:name` reference into a configured drive directory. Either way the
/// basename must be a well-formed CP/M name with extension `.com` or none
/// (in which case `.com` is appended).
pub fn read_command_image(cfg: &Config) -> CoreResult<Vec<u8>> {
    let path = resolve_command(cfg)?;
    fs::read(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CoreError::ProgramNotFound(path.display().to_string()),
        _ => CoreError::Io(e),
    })
}

fn resolve_command(cfg: &Config) -> CoreResult<PathBuf> {
    let cmd = cfg.command.as_str();
    if cmd.is_empty() {
        return Err(CoreError::BadProgramName("(empty)".into()));
    }

    if cmd.contains('/') {
        let (dir, base) = cmd.rsplit_once('/').unwrap_or(("", cmd));
        let base = normalize_com_name(base)?;
        return Ok(PathBuf::from(dir).join(base));
    }

    // drive:name form, or a bare name on the default drive.
    let (drive, name) = match cmd.split_once(':') {
        Some((d, rest)) if d.len() == 1 => {
            let letter = d.as_bytes()[0].to_ascii_lowercase();
            if !(b'a'..=b'p').contains(&letter) {
                return Err(CoreError::BadProgramName(cmd.into()));
            }
            ((letter - b'a') as u8, rest)
        }
        Some(_) => return Err(CoreError::BadProgramName(cmd.into())),
        None => (cfg.default_drive, cmd),
    };
    let base = normalize_com_name(name)?;
    let dir = cfg.drives[drive as usize]
        .as_ref()
        .ok_or(CoreError::DriveNotConfigured(Config::drive_letter(drive)))?;
    Ok(dir.join(base))
}

/// Validate a command basename and give it its `.com` extension.
fn normalize_com_name(base: &str) -> CoreResult<String> {
    let lower = base.to_lowercase();
    let (stem, ext) = match lower.rsplit_once('.') {
        Some((s, e)) => (s, Some(e)),
        None => (lower.as_str(), None),
    };
    match ext {
        None => {}
        Some("com") => {}
        Some(_) => return Err(CoreError::BadProgramName(base.into())),
    }
    if fdos::nice_base_name(stem).is_none() {
        return Err(CoreError::BadProgramName(base.into()));
    }
    Ok(format!("{stem}.com"))
}

fn blank_fcb(m: &mut Machine, at: u16) {
    m.store(at, 0);
    for i in 1..12u16 {
        m.store(at + i, b' ');
    }
    for i in 12..16u16 {
        m.store(at + i, 0);
    }
}

/// Parse a command argument into a default FCB: optional drive prefix,
/// 8+3 split, `*` expanded to `?`-fill. Arguments that are not filenames
/// leave the FCB blank, which is what transient programs expect.
fn arg_to_fcb(m: &mut Machine, at: u16, arg: &str) {
    let upper = arg.to_uppercase();
    let mut rest = upper.as_str();
    let mut drive = 0u8;
    if let Some((d, r)) = rest.split_once(':') {
        if d.len() == 1 {
            let letter = d.as_bytes()[0];
            if !letter.is_ascii_uppercase() || letter > b'P' {
                return;
            }
            drive = letter - b'A' + 1;
            rest = r;
        } else {
            return;
        }
    }
    let (name, ext) = match rest.split_once('.') {
        Some((n, e)) => (n, e),
        None => (rest, ""),
    };
    if name.len() > 8 && !name.contains('*') || ext.len() > 3 && !ext.contains('*') {
        return;
    }
    m.store(at, drive);
    write_padded(m, at + 1, name, 8);
    write_padded(m, at + 9, ext, 3);
}

/// Write a field space-padded to `width`, expanding `*` to `?`-fill.
fn write_padded(m: &mut Machine, at: u16, field: &str, width: u16) {
    let mut fill = false;
    for i in 0..width {
        let ch = field.as_bytes().get(i as usize).copied();
        let b = match ch {
            Some(b'*') => {
                fill = true;
                b'?'
            }
            Some(c) if !fill => c,
            _ if fill => b'?',
            _ => b' ',
        };
        m.store(at + i, b);
    }
}
