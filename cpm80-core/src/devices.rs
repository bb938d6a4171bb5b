//! Auxiliary character devices: printer, punch, reader.
//!
//! Each is optionally backed by a host file, in raw mode (bytes pass
//! unchanged) or text mode (character-set translation and host newline
//! conventions). The reader yields SUB (0x1A) once its file is exhausted.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

use log::error;

use crate::charset::Charset;
use crate::config::{DeviceFile, DeviceMode};
use crate::error::CoreResult;

/// CP/M end-of-input marker.
pub const SUB: u8 = 0x1A;

/// Printer or punch: an append-only byte sink.
pub struct OutDevice {
    sink: Option<File>,
    mode: DeviceMode,
    charset: Charset,
}

impl OutDevice {
    pub fn open(spec: Option<&DeviceFile>, charset: Charset) -> CoreResult<Self> {
        let (sink, mode) = match spec {
            Some(d) => (
                Some(
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&d.path)?,
                ),
                d.mode,
            ),
            None => (None, DeviceMode::Raw),
        };
        Ok(OutDevice { sink, mode, charset })
    }

    /// Device with no backing file; output is discarded.
    pub fn disconnected() -> Self {
        OutDevice {
            sink: None,
            mode: DeviceMode::Raw,
            charset: Charset::default(),
        }
    }

    pub fn put(&mut self, b: u8) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let result = match self.mode {
            DeviceMode::Raw => sink.write_all(&[b]),
            DeviceMode::Text => {
                // CR LF collapses to one host newline: CR is dropped, LF
                // carries the line break.
                match b {
                    0x0D => Ok(()),
                    0x0A => sink.write_all(b"\n"),
                    _ => {
                        let mut buf = [0u8; 4];
                        let ch = self.charset.from_cpm(b).unwrap_or('_');
                        sink.write_all(ch.encode_utf8(&mut buf).as_bytes())
                    }
                }
            }
        };
        if let Err(e) = result {
            error!("device write failed: {e}");
            self.sink = None;
        }
    }

    pub fn flush(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.flush();
        }
    }
}

/// Reader: a byte source drained from a host file.
pub struct InDevice {
    data: VecDeque<u8>,
}

impl InDevice {
    pub fn open(spec: Option<&DeviceFile>, charset: Charset) -> CoreResult<Self> {
        let mut data = VecDeque::new();
        if let Some(d) = spec {
            let mut raw = Vec::new();
            File::open(&d.path)?.read_to_end(&mut raw)?;
            match d.mode {
                DeviceMode::Raw => data.extend(raw),
                DeviceMode::Text => {
                    for ch in String::from_utf8_lossy(&raw).chars() {
                        if ch == '\n' {
                            data.push_back(0x0D);
                            data.push_back(0x0A);
                        } else if let Some(b) = charset.to_cpm(ch) {
                            data.push_back(b);
                        }
                    }
                }
            }
        }
        Ok(InDevice { data })
    }

    pub fn disconnected() -> Self {
        InDevice {
            data: VecDeque::new(),
        }
    }

    pub fn get(&mut self) -> u8 {
        self.data.pop_front().unwrap_or(SUB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec(path: PathBuf, mode: DeviceMode) -> Option<DeviceFile> {
        Some(DeviceFile { path, mode })
    }

    #[test]
    fn raw_output_passes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("punch.bin");
        let mut dev = OutDevice::open(
            spec(path.clone(), DeviceMode::Raw).as_ref(),
            Charset::default(),
        )
        .unwrap();
        for b in [0x00u8, 0x0D, 0x0A, 0xFF] {
            dev.put(b);
        }
        dev.flush();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x00, 0x0D, 0x0A, 0xFF]);
    }

    #[test]
    fn text_output_folds_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        let mut dev = OutDevice::open(
            spec(path.clone(), DeviceMode::Text).as_ref(),
            Charset::default(),
        )
        .unwrap();
        for &b in b"HI\r\nX" {
            dev.put(b);
        }
        dev.flush();
        assert_eq!(std::fs::read(&path).unwrap(), b"HI\nX");
    }

    #[test]
    fn text_reader_expands_newlines_and_ends_with_sub() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reader.txt");
        std::fs::write(&path, "AB\n").unwrap();
        let mut dev = InDevice::open(
            spec(path, DeviceMode::Text).as_ref(),
            Charset::default(),
        )
        .unwrap();
        assert_eq!(dev.get(), b'A');
        assert_eq!(dev.get(), b'B');
        assert_eq!(dev.get(), 0x0D);
        assert_eq!(dev.get(), 0x0A);
        assert_eq!(dev.get(), SUB);
        assert_eq!(dev.get(), SUB);
    }

    #[test]
    fn disconnected_devices_are_inert() {
        let mut out = OutDevice::disconnected();
        out.put(b'X');
        let mut inp = InDevice::disconnected();
        assert_eq!(inp.get(), SUB);
    }
}
