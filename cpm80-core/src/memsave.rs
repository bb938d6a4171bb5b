//! Optional post-run save of a guest memory range, raw or Intel-HEX.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::config::{MemorySave, SaveFormat};
use crate::error::CoreResult;
use crate::machine::Machine;

/// Write the configured range ([start, end], both inclusive).
pub fn save(m: &Machine, spec: &MemorySave) -> CoreResult<()> {
    let len = spec.end.wrapping_sub(spec.start) as usize + 1;
    let data = m.read_block(spec.start, len);
    match spec.format {
        SaveFormat::Binary => write_binary(&spec.path, &data),
        SaveFormat::IntelHex => write_intel_hex(&spec.path, spec.start, &data),
    }
}

fn write_binary(path: &Path, data: &[u8]) -> CoreResult<()> {
    let mut f = File::create(path)?;
    f.write_all(data)?;
    Ok(())
}

/// 32-byte type-0 records followed by a type-1 EOF record carrying the
/// start address, each with the standard two's-complement checksum.
fn write_intel_hex(path: &Path, start: u16, data: &[u8]) -> CoreResult<()> {
    let mut f = File::create(path)?;
    for (i, chunk) in data.chunks(32).enumerate() {
        let addr = start.wrapping_add((i * 32) as u16);
        write_record(&mut f, 0x00, addr, chunk)?;
    }
    write_record(&mut f, 0x01, start, &[])?;
    Ok(())
}

fn write_record(f: &mut File, kind: u8, addr: u16, data: &[u8]) -> CoreResult<()> {
    let mut sum = data.len() as u8;
    sum = sum
        .wrapping_add((addr >> 8) as u8)
        .wrapping_add(addr as u8)
        .wrapping_add(kind);
    write!(f, ":{:02X}{:04X}{:02X}", data.len(), addr, kind)?;
    for &b in data {
        write!(f, "{:02X}", b)?;
        sum = sum.wrapping_add(b);
    }
    writeln!(f, "{:02X}", sum.wrapping_neg())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SaveFormat;
    use std::path::PathBuf;

    fn spec(path: PathBuf, format: SaveFormat, start: u16, end: u16) -> MemorySave {
        MemorySave {
            path,
            format,
            start,
            end,
        }
    }

    #[test]
    fn binary_range_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.bin");
        let mut m = Machine::new();
        m.write_block(0x0100, &[1, 2, 3, 4]);
        save(&m, &spec(path.clone(), SaveFormat::Binary, 0x0100, 0x0103)).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn intel_hex_records_and_checksums() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.hex");
        let mut m = Machine::new();
        m.write_block(0x0100, &[0x21, 0x46, 0x01]);
        save(&m, &spec(path.clone(), SaveFormat::IntelHex, 0x0100, 0x0102)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        // 03 + 01 + 00 + 00 + 21 + 46 + 01 = 0x6C; checksum 0x94.
        assert_eq!(lines[0], ":0301000021460194");
        // EOF record addressed at the start of the range.
        assert_eq!(lines[1], ":00010001FE");
    }

    #[test]
    fn long_ranges_split_into_32_byte_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.hex");
        let mut m = Machine::new();
        for i in 0..40u16 {
            m.store(0x0200 + i, i as u8);
        }
        save(&m, &spec(path.clone(), SaveFormat::IntelHex, 0x0200, 0x0227)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(":20020000"));
        assert!(lines[1].starts_with(":08022000"));
        assert!(lines[2].starts_with(":00020001"));
    }
}
