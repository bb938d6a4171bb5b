//! FDOS: the disk half of the BDOS, mapped onto host-filesystem operations
//! on the directories standing in for drives A: through P:.
//!
//! Guest-visible failures come back as BDOS result codes (0xFF not found,
//! 0x01 reading unwritten data, 0x02 disk full, 0x06 record out of range).
//! Write-protection violations, FCB protocol violations and unexpected host
//! errors terminate the run instead.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use log::{debug, error, info, trace};

use super::fcb::{matches_pattern, Fcb, MAX_OFFSET};
use super::RECORD_SIZE;
use crate::config::Config;
use crate::console::Console;
use crate::emulator::Emulator;
use crate::registry::FileEntry;
use crate::ExitReason;

/// Files beyond this size are invisible to directory searches.
pub const MAX_SEARCH_SIZE: u64 = 8 * 1024 * 1024;

/// Characters a host file may use to be reachable from CP/M.
fn nice_char(c: char) -> bool {
    matches!(c, '#' | '$' | '@' | '-' | '0'..='9' | 'a'..='z')
}

/// A base name acceptable on a CP/M drive: one to eight characters from the
/// host set.
pub fn nice_base_name(s: &str) -> Option<&str> {
    (!s.is_empty() && s.len() <= 8 && s.chars().all(nice_char)).then_some(s)
}

/// Host file name to the 11-byte upper-case CP/M form, or `None` when the
/// name does not fit the 8+3 scheme.
pub fn host_to_cpm(name: &str) -> Option<[u8; 11]> {
    let (base, ext) = match name.split_once('.') {
        Some((b, e)) => (b, e),
        None => (name, ""),
    };
    nice_base_name(base)?;
    if ext.len() > 3 || !ext.chars().all(nice_char) || ext.contains('.') {
        return None;
    }
    let mut out = [b' '; 11];
    for (i, b) in base.bytes().enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    for (i, b) in ext.bytes().enumerate() {
        out[8 + i] = b.to_ascii_uppercase();
    }
    Some(out)
}

/// 11-byte CP/M name to the lower-case host form.
pub fn cpm_to_host(name: &[u8; 11]) -> String {
    let base: String = name[..8]
        .iter()
        .take_while(|&&b| b != b' ')
        .map(|&b| (b as char).to_ascii_lowercase())
        .collect();
    let ext: String = name[8..]
        .iter()
        .take_while(|&&b| b != b' ')
        .map(|&b| (b as char).to_ascii_lowercase())
        .collect();
    if ext.is_empty() {
        base
    } else {
        format!("{base}.{ext}")
    }
}

fn stop<C: Console>(em: &mut Emulator<C>, reason: ExitReason, what: &str) -> u16 {
    error!("{what}");
    em.machine.request_stop(reason);
    0xFF
}

fn host_error<C: Console>(em: &mut Emulator<C>, what: &str, e: io::Error) -> u16 {
    stop(em, ExitReason::ErrHost, &format!("{what}: {e}"))
}

/// FCB drive byte to drive number; 0 and the `?` search wildcard mean the
/// current drive.
fn resolve_drive<C: Console>(em: &Emulator<C>, byte: u8) -> u8 {
    match byte {
        0 | 0x3F => em.current_drive,
        1..=16 => byte - 1,
        other => {
            debug!("drive byte {other:#04x} treated as current drive");
            em.current_drive
        }
    }
}

/// Directory bound to a drive; an unconfigured drive ends the run.
fn drive_dir<C: Console>(em: &mut Emulator<C>, drive: u8) -> Option<PathBuf> {
    match em.drives[drive as usize].clone() {
        Some(dir) => Some(dir),
        None => {
            stop(
                em,
                ExitReason::ErrSelect,
                &format!("drive {}: not configured", Config::drive_letter(drive)),
            );
            None
        }
    }
}

/// All drive-visible names in `dir`, in directory order: regular files with
/// nice 8+3 names, no larger than [`MAX_SEARCH_SIZE`].
fn enumerate_dir<C: Console>(em: &mut Emulator<C>, dir: &Path) -> Option<Vec<[u8; 11]>> {
    let rd = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            host_error(em, &format!("reading {}", dir.display()), e);
            return None;
        }
    };
    let mut out = Vec::new();
    for entry in rd {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                host_error(em, &format!("reading {}", dir.display()), e);
                return None;
            }
        };
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(cpm) = host_to_cpm(name) else {
            continue;
        };
        let Ok(md) = entry.metadata() else {
            continue;
        };
        if md.is_file() && md.len() <= MAX_SEARCH_SIZE {
            out.push(cpm);
        }
    }
    Some(out)
}

/// BDOS 14.
pub(crate) fn select_disk<C: Console>(em: &mut Emulator<C>, e: u8) -> u16 {
    if e > 15 || em.drives[e as usize].is_none() {
        return stop(
            em,
            ExitReason::ErrSelect,
            &format!("select of unconfigured drive {e}"),
        );
    }
    em.current_drive = e;
    super::update_drvuser(em);
    0
}

/// BDOS 15. See the module notes for the ambiguous-name path.
pub(crate) fn open_file<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let mut fcb = Fcb::read(&em.machine, de);
    dump_fcb(&fcb, "open file");
    fcb.clamp_for_open();
    let drive = resolve_drive(em, fcb.drive());
    let Some(dir) = drive_dir(em, drive) else {
        return 0xFF;
    };
    let pattern = fcb.name11();

    let chosen = if fcb.is_ambiguous() {
        let Some(entries) = enumerate_dir(em, &dir) else {
            return 0xFF;
        };
        // First entry that matches and already spans the requested extent.
        let need_records = fcb.ex() as u64 * 128;
        entries.into_iter().find(|name| {
            matches_pattern(&pattern, name)
                && fs::metadata(dir.join(cpm_to_host(name)))
                    .map(|md| md.len().div_ceil(RECORD_SIZE as u64) >= need_records)
                    .unwrap_or(false)
        })
    } else {
        Some(pattern)
    };
    let Some(name11) = chosen else {
        info!("open: no match for {}", cpm_to_host(&pattern));
        return 0xFF;
    };

    let host = cpm_to_host(&name11);
    let path = dir.join(&host);
    let rodisk = em.read_only[drive as usize];
    let mut rofile = false;
    let open_ro = |p: &Path| File::open(p);
    let file = if rodisk {
        match open_ro(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0xFF,
            Err(e) => return host_error(em, &format!("opening {}", path.display()), e),
        }
    } else {
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0xFF,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => match open_ro(&path) {
                Ok(f) => {
                    rofile = true;
                    f
                }
                Err(e) if e.kind() == ErrorKind::NotFound => return 0xFF,
                Err(e) => return host_error(em, &format!("opening {}", path.display()), e),
            },
            Err(e) => return host_error(em, &format!("opening {}", path.display()), e),
        }
    };

    let mut entry = FileEntry::new(file, path);
    entry.rodisk = rodisk;
    entry.rofile = rofile;
    let id = em.registry.insert(entry);
    fcb.set_id(id);
    if fcb.is_ambiguous() {
        fcb.set_name11(&name11);
    }
    fcb.write_back(&mut em.machine);
    info!("open {host} as id {id:#06x}");
    0
}

/// BDOS 22: create-exclusive.
pub(crate) fn make_file<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let mut fcb = Fcb::read(&em.machine, de);
    dump_fcb(&fcb, "make file");
    if fcb.is_ambiguous() {
        return 0xFF;
    }
    fcb.clamp_for_open();
    let drive = resolve_drive(em, fcb.drive());
    if em.read_only[drive as usize] {
        return stop(
            em,
            ExitReason::ErrRoDisk,
            &format!(
                "create on read-only drive {}:",
                Config::drive_letter(drive)
            ),
        );
    }
    let Some(dir) = drive_dir(em, drive) else {
        return 0xFF;
    };
    let host = cpm_to_host(&fcb.name11());
    let path = dir.join(&host);
    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return 0xFF,
        Err(e) => return host_error(em, &format!("creating {}", path.display()), e),
    };
    let id = em.registry.insert(FileEntry::new(file, path));
    fcb.set_id(id);
    fcb.write_back(&mut em.machine);
    info!("make {host} as id {id:#06x}");
    0
}

/// BDOS 16.
pub(crate) fn close_file<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let mut fcb = Fcb::read(&em.machine, de);
    dump_fcb(&fcb, "close file");
    let Some(id) = fcb.id() else {
        return stop(em, ExitReason::ErrLogic, "close with stale or invalid file ID");
    };
    if em.dont_close {
        match em.registry.get_mut(id) {
            Some(entry) => {
                entry.written = false;
                return 0;
            }
            None => return stop(em, ExitReason::ErrLogic, "close with unknown file ID"),
        }
    }
    let Some(entry) = em.registry.remove(id) else {
        return stop(em, ExitReason::ErrLogic, "close with unknown file ID");
    };
    if entry.written {
        if let Err(e) = entry.file.sync_all() {
            return host_error(em, &format!("closing {}", entry.path.display()), e);
        }
    }
    fcb.clear_id();
    fcb.write_back(&mut em.machine);
    info!("close id {id:#06x}");
    0
}

/// BDOS 17.
pub(crate) fn search_first<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let fcb = Fcb::read(&em.machine, de);
    let drive = resolve_drive(em, fcb.drive());
    let Some(dir) = drive_dir(em, drive) else {
        return 0xFF;
    };
    let pattern = fcb.name11();
    let Some(mut entries) = enumerate_dir(em, &dir) else {
        return 0xFF;
    };
    entries.retain(|name| matches_pattern(&pattern, name));
    info!("search: {} match(es)", entries.len());
    em.search_list = entries.into();
    search_next(em)
}

/// BDOS 18: pop the head of the saved list into a synthesized directory
/// entry at the DMA address.
pub(crate) fn search_next<C: Console>(em: &mut Emulator<C>) -> u16 {
    let Some(name) = em.search_list.pop_front() else {
        return 0xFF;
    };
    let dma = em.dma;
    let m = &mut em.machine;
    m.store(dma, 0); // user 0
    m.write_block(dma.wrapping_add(1), &name);
    for i in 12..32u16 {
        m.store(dma.wrapping_add(i), 0);
    }
    // The remaining three directory slots of the sector read as empty.
    for i in 32..128u16 {
        m.store(dma.wrapping_add(i), 0xE5);
    }
    0
}

/// BDOS 19: delete every match of a possibly ambiguous pattern.
pub(crate) fn delete_file<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let fcb = Fcb::read(&em.machine, de);
    let drive = resolve_drive(em, fcb.drive());
    if em.read_only[drive as usize] {
        return stop(
            em,
            ExitReason::ErrRoDisk,
            &format!(
                "delete on read-only drive {}:",
                Config::drive_letter(drive)
            ),
        );
    }
    let Some(dir) = drive_dir(em, drive) else {
        return 0xFF;
    };
    let pattern = fcb.name11();
    let Some(entries) = enumerate_dir(em, &dir) else {
        return 0xFF;
    };
    let mut deleted = false;
    for name in entries {
        if !matches_pattern(&pattern, &name) {
            continue;
        }
        let path = dir.join(cpm_to_host(&name));
        match fs::metadata(&path) {
            Ok(md) if md.permissions().readonly() => {
                return stop(
                    em,
                    ExitReason::ErrRoFile,
                    &format!("delete of read-only file {}", path.display()),
                );
            }
            _ => {}
        }
        match fs::remove_file(&path) {
            Ok(()) => deleted = true,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return host_error(em, &format!("deleting {}", path.display()), e),
        }
    }
    if deleted {
        0
    } else {
        0xFF
    }
}

/// BDOS 23: link the new name, then drop the old one.
pub(crate) fn rename_file<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let fcb = Fcb::read(&em.machine, de);
    let drive = resolve_drive(em, fcb.drive());
    if em.read_only[drive as usize] {
        return stop(
            em,
            ExitReason::ErrRoDisk,
            &format!(
                "rename on read-only drive {}:",
                Config::drive_letter(drive)
            ),
        );
    }
    let Some(dir) = drive_dir(em, drive) else {
        return 0xFF;
    };
    let old = fcb.name11();
    let new = fcb.rename_target11();
    if old.contains(&b'?') || new.contains(&b'?') {
        return 0xFF;
    }
    let old_path = dir.join(cpm_to_host(&old));
    let new_path = dir.join(cpm_to_host(&new));
    match fs::hard_link(&old_path, &new_path) {
        Ok(()) => {}
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::AlreadyExists) => {
            return 0xFF;
        }
        Err(e) => return host_error(em, &format!("renaming {}", old_path.display()), e),
    }
    match fs::remove_file(&old_path) {
        Ok(()) => 0,
        Err(e) if e.kind() == ErrorKind::NotFound => 0,
        Err(e) => host_error(em, &format!("renaming {}", old_path.display()), e),
    }
}

/// BDOS 30: the attribute bits themselves have nowhere to live on a host
/// filesystem, so a valid, existing name is the whole contract.
pub(crate) fn set_file_attributes<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let fcb = Fcb::read(&em.machine, de);
    if fcb.is_ambiguous() {
        return 0xFF;
    }
    let drive = resolve_drive(em, fcb.drive());
    let Some(dir) = drive_dir(em, drive) else {
        return 0xFF;
    };
    let path = dir.join(cpm_to_host(&fcb.name11()));
    if path.is_file() {
        0
    } else {
        0xFF
    }
}

/// BDOS 35: ceil(size / 128) into the random record field.
pub(crate) fn compute_file_size<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let mut fcb = Fcb::read(&em.machine, de);
    if fcb.is_ambiguous() {
        return 0xFF;
    }
    let drive = resolve_drive(em, fcb.drive());
    let Some(dir) = drive_dir(em, drive) else {
        return 0xFF;
    };
    let path = dir.join(cpm_to_host(&fcb.name11()));
    let md = match fs::metadata(&path) {
        Ok(md) => md,
        Err(e) if e.kind() == ErrorKind::NotFound => return 0xFF,
        Err(e) => return host_error(em, &format!("sizing {}", path.display()), e),
    };
    fcb.set_random_record(md.len().div_ceil(RECORD_SIZE as u64) as u32);
    fcb.write_back(&mut em.machine);
    0
}

/// BDOS 36: sequential position into the random record field.
pub(crate) fn set_random_record<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let mut fcb = Fcb::read(&em.machine, de);
    let Some(offset) = fcb.seq_offset() else {
        return 6;
    };
    fcb.set_random_record(offset);
    fcb.write_back(&mut em.machine);
    0
}

/// BDOS 102: host atime/mtime as CP/M date stamps in FCB bytes 24..31.
pub(crate) fn read_date_stamps<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let mut fcb = Fcb::read(&em.machine, de);
    if fcb.is_ambiguous() {
        return 0xFF;
    }
    let drive = resolve_drive(em, fcb.drive());
    let Some(dir) = drive_dir(em, drive) else {
        return 0xFF;
    };
    let path = dir.join(cpm_to_host(&fcb.name11()));
    let md = match fs::metadata(&path) {
        Ok(md) => md,
        Err(e) if e.kind() == ErrorKind::NotFound => return 0xFF,
        Err(e) => return host_error(em, &format!("stamping {}", path.display()), e),
    };
    let modified = md.modified().map(crate::clock::file_stamp).unwrap_or((0, 0, 0));
    let accessed = md
        .accessed()
        .map(crate::clock::file_stamp)
        .unwrap_or(modified);
    fcb.set_date_stamps(accessed, modified);
    fcb.write_back(&mut em.machine);
    0
}

/// FCB dump for the deeper trace levels.
fn dump_fcb(fcb: &Fcb, what: &str) {
    debug!(
        "{what}: fcb@{:04x} drive {} name {:?} ex {} s2 {} cr {} rr {} id {:?}",
        fcb.addr(),
        fcb.drive(),
        String::from_utf8_lossy(&fcb.name11()),
        fcb.ex(),
        fcb.s2(),
        fcb.cr(),
        fcb.random_record(),
        fcb.id(),
    );
}

/// FCB ID with its tamper check, or a fatal protocol violation.
fn checked_id<C: Console>(em: &mut Emulator<C>, fcb: &Fcb) -> Option<u16> {
    match fcb.id() {
        Some(id) => Some(id),
        None => {
            stop(em, ExitReason::ErrLogic, "stale or invalid file ID");
            None
        }
    }
}

/// One record from the host file into the DMA buffer. 0 = ok, 1 = reading
/// unwritten data.
fn read_record<C: Console>(em: &mut Emulator<C>, id: u16, record: u32) -> u16 {
    trace!("read record {record} of id {id:#06x}");
    let mut buf = [0x1Au8; RECORD_SIZE];
    let pos = record as u64 * RECORD_SIZE as u64;
    let outcome: Result<usize, (String, io::Error)> = match em.registry.get(id) {
        None => return stop(em, ExitReason::ErrLogic, "file ID not in the registry"),
        Some(entry) => {
            let mut got = 0usize;
            loop {
                if got >= RECORD_SIZE {
                    break Ok(got);
                }
                match entry.file.read_at(&mut buf[got..], pos + got as u64) {
                    Ok(0) => break Ok(got),
                    Ok(n) => got += n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => break Err((entry.path.display().to_string(), e)),
                }
            }
        }
    };
    match outcome {
        Ok(0) => 1,
        Ok(_) => {
            em.machine.write_block(em.dma, &buf);
            0
        }
        Err((path, e)) => host_error(em, &format!("reading {path}"), e),
    }
}

/// One record from the DMA buffer into the host file. 0 = ok, 2 = disk
/// full; write protection is fatal.
fn write_record<C: Console>(em: &mut Emulator<C>, id: u16, record: u32) -> u16 {
    trace!("write record {record} of id {id:#06x}");
    let (rodisk, rofile) = match em.registry.get(id) {
        None => return stop(em, ExitReason::ErrLogic, "file ID not in the registry"),
        Some(entry) => (entry.rodisk, entry.rofile),
    };
    if rodisk {
        return stop(em, ExitReason::ErrRoDisk, "write on a read-only drive");
    }
    if rofile {
        return stop(em, ExitReason::ErrRoFile, "write to a read-only file");
    }
    let data = em.machine.read_block(em.dma, RECORD_SIZE);
    let pos = record as u64 * RECORD_SIZE as u64;
    let outcome: Result<(), (String, io::Error)> = match em.registry.get_mut(id) {
        None => return stop(em, ExitReason::ErrLogic, "file ID not in the registry"),
        Some(entry) => match entry.file.write_all_at(&data, pos) {
            Ok(()) => {
                entry.written = true;
                Ok(())
            }
            Err(e) => Err((entry.path.display().to_string(), e)),
        },
    };
    match outcome {
        Ok(()) => 0,
        Err((_, e)) if e.raw_os_error() == Some(nix::libc::ENOSPC) => 2,
        Err((path, e)) => host_error(em, &format!("writing {path}"), e),
    }
}

/// BDOS 20.
pub(crate) fn read_sequential<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let mut fcb = Fcb::read(&em.machine, de);
    dump_fcb(&fcb, "read sequential");
    let Some(id) = checked_id(em, &fcb) else {
        return 0xFF;
    };
    let Some(offset) = fcb.seq_offset() else {
        return 6;
    };
    if offset >= MAX_OFFSET {
        return 6;
    }
    let r = read_record(em, id, offset);
    if r == 0 {
        fcb.set_seq_offset(offset + 1);
        fcb.write_back(&mut em.machine);
    }
    r
}

/// BDOS 21.
pub(crate) fn write_sequential<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let mut fcb = Fcb::read(&em.machine, de);
    dump_fcb(&fcb, "write sequential");
    let Some(id) = checked_id(em, &fcb) else {
        return 0xFF;
    };
    let Some(offset) = fcb.seq_offset() else {
        return 6;
    };
    if offset >= MAX_OFFSET {
        return 6;
    }
    let r = write_record(em, id, offset);
    if r == 0 {
        fcb.set_seq_offset(offset + 1);
        fcb.write_back(&mut em.machine);
    }
    r
}

/// BDOS 33: like 20 but addressed by the random record field, which is
/// copied into the sequential triple on success.
pub(crate) fn read_random<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let mut fcb = Fcb::read(&em.machine, de);
    dump_fcb(&fcb, "read random");
    let Some(id) = checked_id(em, &fcb) else {
        return 0xFF;
    };
    let record = fcb.random_record();
    if record >= MAX_OFFSET {
        return 6;
    }
    let r = read_record(em, id, record);
    if r == 0 {
        fcb.set_seq_offset(record);
        fcb.write_back(&mut em.machine);
    }
    r
}

/// BDOS 34 and 40: host sparse files make zero-fill automatic.
pub(crate) fn write_random<C: Console>(em: &mut Emulator<C>, de: u16) -> u16 {
    let mut fcb = Fcb::read(&em.machine, de);
    dump_fcb(&fcb, "write random");
    let Some(id) = checked_id(em, &fcb) else {
        return 0xFF;
    };
    let record = fcb.random_record();
    if record >= MAX_OFFSET {
        return 6;
    }
    let r = write_record(em, id, record);
    if r == 0 {
        fcb.set_seq_offset(record);
        fcb.write_back(&mut em.machine);
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::Charset;
    use crate::console::{BufferPort, LineConsole};
    use crate::machine::addr;

    fn emulator(dir: &Path) -> Emulator<LineConsole<BufferPort>> {
        let cfg = Config {
            drives: {
                let mut d: [Option<PathBuf>; 16] = Default::default();
                d[0] = Some(dir.to_path_buf());
                d
            },
            ..Config::default()
        };
        let console = LineConsole::new(BufferPort::new(), Charset::default(), '_');
        Emulator::with_program(&cfg, console, &[0x00]).unwrap()
    }

    fn set_fcb<C: Console>(em: &mut Emulator<C>, name11: &[u8; 11]) {
        em.machine.store(addr::FCB1, 0);
        em.machine.write_block(addr::FCB1 + 1, name11);
        for i in 12..36u16 {
            em.machine.store(addr::FCB1 + i, 0);
        }
    }

    fn fill_dma<C: Console>(em: &mut Emulator<C>, byte: u8) {
        let dma = em.dma;
        for i in 0..RECORD_SIZE as u16 {
            em.machine.store(dma.wrapping_add(i), byte);
        }
    }

    #[test]
    fn make_write_close_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let em = &mut emulator(dir.path());
        set_fcb(em, b"TEST    DAT");
        assert_eq!(make_file(em, addr::FCB1), 0);

        // The ID and its check satisfy the tamper invariant.
        let fcb = Fcb::read(&em.machine, addr::FCB1);
        let id = u16::from_le_bytes([
            em.machine.load(addr::FCB1 + 16),
            em.machine.load(addr::FCB1 + 17),
        ]);
        let check = u16::from_le_bytes([
            em.machine.load(addr::FCB1 + 18),
            em.machine.load(addr::FCB1 + 19),
        ]);
        assert_eq!(id ^ check, super::super::fcb::ID_SIGNATURE);
        assert_eq!(fcb.id(), Some(id));

        fill_dma(em, 0xAA);
        assert_eq!(write_sequential(em, addr::FCB1), 0);
        let fcb = Fcb::read(&em.machine, addr::FCB1);
        assert_eq!(fcb.seq_offset(), Some(1), "triple advanced one record");
        assert_eq!(close_file(em, addr::FCB1), 0);
        let fcb = Fcb::read(&em.machine, addr::FCB1);
        assert_eq!(fcb.id(), None, "close clears the ID");

        let data = fs::read(dir.path().join("test.dat")).unwrap();
        assert_eq!(data, vec![0xAA; 128]);
    }

    #[test]
    fn make_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("test.dat"), b"x").unwrap();
        let em = &mut emulator(dir.path());
        set_fcb(em, b"TEST    DAT");
        assert_eq!(make_file(em, addr::FCB1), 0xFF);
    }

    #[test]
    fn open_missing_file_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let em = &mut emulator(dir.path());
        set_fcb(em, b"NOPE    DAT");
        assert_eq!(open_file(em, addr::FCB1), 0xFF);
        assert!(!em.machine.terminated);
    }

    #[test]
    fn sequential_read_pads_and_hits_eof() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = vec![0x11u8; 128];
        content.extend_from_slice(&[0x22, 0x33]);
        fs::write(dir.path().join("in.bin"), &content).unwrap();

        let em = &mut emulator(dir.path());
        set_fcb(em, b"IN      BIN");
        assert_eq!(open_file(em, addr::FCB1), 0);

        assert_eq!(read_sequential(em, addr::FCB1), 0);
        assert_eq!(em.machine.load(em.dma), 0x11);
        assert_eq!(read_sequential(em, addr::FCB1), 0);
        assert_eq!(em.machine.load(em.dma), 0x22);
        assert_eq!(em.machine.load(em.dma.wrapping_add(1)), 0x33);
        assert_eq!(
            em.machine.load(em.dma.wrapping_add(2)),
            0x1A,
            "incomplete tail pads with SUB"
        );
        let fcb = Fcb::read(&em.machine, addr::FCB1);
        assert_eq!(fcb.seq_offset(), Some(2));
        assert_eq!(read_sequential(em, addr::FCB1), 1, "reading unwritten data");
    }

    #[test]
    fn random_write_and_read_set_the_triple() {
        let dir = tempfile::tempdir().unwrap();
        let em = &mut emulator(dir.path());
        set_fcb(em, b"SPARSE  DAT");
        assert_eq!(make_file(em, addr::FCB1), 0);

        let mut fcb = Fcb::read(&em.machine, addr::FCB1);
        fcb.set_random_record(2);
        fcb.write_back(&mut em.machine);
        fill_dma(em, 0x55);
        assert_eq!(write_random(em, addr::FCB1), 0);
        let fcb = Fcb::read(&em.machine, addr::FCB1);
        assert_eq!(fcb.seq_offset(), Some(2), "triple mirrors the random record");

        // The hole reads back as zeros, the written record as data.
        let mut fcb = Fcb::read(&em.machine, addr::FCB1);
        fcb.set_random_record(0);
        fcb.write_back(&mut em.machine);
        assert_eq!(read_random(em, addr::FCB1), 0);
        assert_eq!(em.machine.load(em.dma), 0x00);
        let mut fcb = Fcb::read(&em.machine, addr::FCB1);
        fcb.set_random_record(2);
        fcb.write_back(&mut em.machine);
        assert_eq!(read_random(em, addr::FCB1), 0);
        assert_eq!(em.machine.load(em.dma), 0x55);
    }

    #[test]
    fn out_of_range_records_fail_with_six() {
        let dir = tempfile::tempdir().unwrap();
        let em = &mut emulator(dir.path());
        set_fcb(em, b"R       DAT");
        assert_eq!(make_file(em, addr::FCB1), 0);
        let mut fcb = Fcb::read(&em.machine, addr::FCB1);
        fcb.set_random_record(65_536);
        fcb.write_back(&mut em.machine);
        assert_eq!(read_random(em, addr::FCB1), 6);
        assert_eq!(write_random(em, addr::FCB1), 6);

        let mut fcb = Fcb::read(&em.machine, addr::FCB1);
        fcb.set_random_record(0);
        fcb.set_cr(200);
        fcb.write_back(&mut em.machine);
        assert_eq!(read_sequential(em, addr::FCB1), 6);
    }

    #[test]
    fn tampered_id_is_a_protocol_violation() {
        let dir = tempfile::tempdir().unwrap();
        let em = &mut emulator(dir.path());
        set_fcb(em, b"T       DAT");
        assert_eq!(make_file(em, addr::FCB1), 0);
        em.machine.store(addr::FCB1 + 18, 0x00);
        em.machine.store(addr::FCB1 + 19, 0x00);
        assert_eq!(read_sequential(em, addr::FCB1), 0xFF);
        assert!(em.machine.terminated);
        assert_eq!(em.machine.term_reason, ExitReason::ErrLogic);
    }

    #[test]
    fn search_enumerates_matches_in_directory_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("readme"), b"r").unwrap();
        fs::write(dir.path().join("NotNice.txt"), b"n").unwrap();

        let em = &mut emulator(dir.path());
        set_fcb(em, b"????????TXT");
        let mut seen = Vec::new();
        let mut r = search_first(em, addr::FCB1);
        while r == 0 {
            let dma = em.dma;
            assert_eq!(em.machine.load(dma), 0);
            seen.push(em.machine.read_block(dma.wrapping_add(1), 11));
            assert_eq!(em.machine.load(dma.wrapping_add(32)), 0xE5);
            assert_eq!(em.machine.load(dma.wrapping_add(127)), 0xE5);
            r = search_next(em);
        }
        assert_eq!(r, 0xFF);
        seen.sort();
        assert_eq!(seen, vec![b"A       TXT".to_vec(), b"B       TXT".to_vec()]);

        // The bare name is nice too and matched by an all-? pattern.
        set_fcb(em, b"???????????");
        let mut count = 0;
        let mut r = search_first(em, addr::FCB1);
        while r == 0 {
            count += 1;
            r = search_next(em);
        }
        assert_eq!(count, 3, "a.txt, b.txt and readme");
    }

    #[test]
    fn delete_honors_wildcards() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.tmp"), b"1").unwrap();
        fs::write(dir.path().join("y.tmp"), b"2").unwrap();
        fs::write(dir.path().join("keep.dat"), b"3").unwrap();

        let em = &mut emulator(dir.path());
        set_fcb(em, b"????????TMP");
        assert_eq!(delete_file(em, addr::FCB1), 0);
        assert!(!dir.path().join("x.tmp").exists());
        assert!(!dir.path().join("y.tmp").exists());
        assert!(dir.path().join("keep.dat").exists());

        assert_eq!(delete_file(em, addr::FCB1), 0xFF, "nothing left to delete");
    }

    #[test]
    fn rename_links_then_unlinks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.dat"), b"data").unwrap();
        let em = &mut emulator(dir.path());
        set_fcb(em, b"OLD     DAT");
        em.machine.store(addr::FCB1 + 16, 0);
        em.machine.write_block(addr::FCB1 + 17, b"NEW     DAT");
        assert_eq!(rename_file(em, addr::FCB1), 0);
        assert!(!dir.path().join("old.dat").exists());
        assert_eq!(fs::read(dir.path().join("new.dat")).unwrap(), b"data");
    }

    #[test]
    fn read_only_drive_makes_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let em = &mut emulator(dir.path());
        em.read_only[0] = true;
        set_fcb(em, b"NEW     DAT");
        assert_eq!(make_file(em, addr::FCB1), 0xFF);
        assert!(em.machine.terminated);
        assert_eq!(em.machine.term_reason, ExitReason::ErrRoDisk);
    }

    #[test]
    fn read_only_drive_opens_flag_rodisk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ro.dat"), vec![0u8; 128]).unwrap();
        let em = &mut emulator(dir.path());
        em.read_only[0] = true;
        set_fcb(em, b"RO      DAT");
        assert_eq!(open_file(em, addr::FCB1), 0);
        assert_eq!(read_sequential(em, addr::FCB1), 0);
        fill_dma(em, 0x77);
        assert_eq!(write_sequential(em, addr::FCB1), 0xFF);
        assert_eq!(em.machine.term_reason, ExitReason::ErrRoDisk);
    }

    #[test]
    fn compute_file_size_rounds_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("s.dat"), vec![0u8; 300]).unwrap();
        let em = &mut emulator(dir.path());
        set_fcb(em, b"S       DAT");
        assert_eq!(compute_file_size(em, addr::FCB1), 0);
        let fcb = Fcb::read(&em.machine, addr::FCB1);
        assert_eq!(fcb.random_record(), 3);
    }

    #[test]
    fn ambiguous_open_rewrites_the_fcb() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), vec![0u8; 64]).unwrap();
        let em = &mut emulator(dir.path());
        set_fcb(em, b"????????TXT");
        assert_eq!(open_file(em, addr::FCB1), 0);
        let fcb = Fcb::read(&em.machine, addr::FCB1);
        assert_eq!(&fcb.name11(), b"HELLO   TXT");
        assert!(fcb.id().is_some());
    }

    #[test]
    fn dont_close_keeps_the_file_registered() {
        let dir = tempfile::tempdir().unwrap();
        let em = &mut emulator(dir.path());
        em.dont_close = true;
        set_fcb(em, b"KEEP    DAT");
        assert_eq!(make_file(em, addr::FCB1), 0);
        fill_dma(em, 0x01);
        assert_eq!(write_sequential(em, addr::FCB1), 0);
        assert_eq!(close_file(em, addr::FCB1), 0);
        // The registry entry survives, so further writes still work.
        assert_eq!(write_sequential(em, addr::FCB1), 0);
        assert_eq!(em.registry.len(), 1);
    }

    #[test]
    fn name_translation() {
        assert_eq!(host_to_cpm("a.txt").unwrap(), *b"A       TXT");
        assert_eq!(host_to_cpm("readme").unwrap(), *b"README     ");
        assert!(host_to_cpm("toolongbasename").is_none());
        assert!(host_to_cpm("up.case").is_some());
        assert!(host_to_cpm("Upper.txt").is_none(), "host names are lower-case");
        assert!(host_to_cpm("a.b.c").is_none());
        assert_eq!(cpm_to_host(b"A       TXT"), "a.txt");
        assert_eq!(cpm_to_host(b"README     "), "readme");
    }
}
