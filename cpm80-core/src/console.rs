//! Console I/O abstraction.
//!
//! [`Console`] is what the BDOS and BIOS layers talk to. [`LineConsole`]
//! implements the glass-teletype output discipline (logical column, tab
//! expansion, control suppression) over a [`TermPort`], which is the raw
//! host terminal; the CLI crate provides the real port and a full-screen
//! VT52 console, tests use [`BufferPort`].

use std::collections::VecDeque;

use crate::charset::Charset;

/// Character console as seen from the emulated machine. All bytes are CP/M
/// code points; implementations translate to and from host characters.
pub trait Console {
    /// Interpreted output: BS/TAB/CR/LF handling per the console mode.
    fn out_byte(&mut self, b: u8);

    /// A key is waiting.
    fn status(&mut self) -> bool;

    /// Non-blocking read.
    fn read_poll(&mut self) -> Option<u8>;

    /// Blocking read; `None` means the input source is gone (batch EOF or
    /// terminated session).
    fn read_wait(&mut self) -> Option<u8>;

    /// Pump host events (resize, buffered keys). Called from the
    /// interpreter loop cadence and before blocking reads.
    fn poll(&mut self);

    /// (columns, lines).
    fn size(&self) -> (u16, u16);

    /// Current logical output column.
    fn column(&self) -> u16;

    /// Restore the host terminal; called once on every exit path.
    fn shutdown(&mut self);
}

/// Host side of a line-mode console.
pub trait TermPort {
    fn write_host(&mut self, s: &str);
    fn flush(&mut self);
    /// Non-blocking: next host character if one is buffered.
    fn poll_input(&mut self) -> Option<char>;
    /// Blocking: next host character, `None` on end of input.
    fn wait_input(&mut self) -> Option<char>;
    /// Process pending host events without reading.
    fn pump(&mut self);
    fn size(&self) -> (u16, u16);
    /// Restore the terminal state.
    fn restore(&mut self);
}

/// Line-mode console: tracks a logical column, expands tabs to the next
/// multiple of eight, drops BS at column zero, suppresses other control
/// characters.
pub struct LineConsole<P: TermPort> {
    port: P,
    charset: Charset,
    unprintable: char,
    col: u16,
    pending: Option<u8>,
}

impl<P: TermPort> LineConsole<P> {
    pub fn new(port: P, charset: Charset, unprintable: char) -> Self {
        LineConsole {
            port,
            charset,
            unprintable,
            col: 0,
            pending: None,
        }
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    fn translate_in(&self, ch: char) -> Option<u8> {
        self.charset.to_cpm(ch)
    }
}

impl<P: TermPort> Console for LineConsole<P> {
    fn out_byte(&mut self, b: u8) {
        match b {
            0x08 => {
                // BS at the line start is dropped.
                if self.col > 0 {
                    self.col -= 1;
                    self.port.write_host("\u{8}");
                }
            }
            0x09 => loop {
                self.port.write_host(" ");
                self.col += 1;
                if self.col % 8 == 0 {
                    break;
                }
            },
            0x0A => self.port.write_host("\n"),
            0x0D => {
                self.col = 0;
                self.port.write_host("\r");
            }
            0x00..=0x1F | 0x7F => {} // suppressed
            _ => {
                let ch = self.charset.from_cpm(b).unwrap_or(self.unprintable);
                let mut buf = [0u8; 4];
                self.port.write_host(ch.encode_utf8(&mut buf));
                self.col += 1;
            }
        }
        self.port.flush();
    }

    fn status(&mut self) -> bool {
        if self.pending.is_some() {
            return true;
        }
        while let Some(ch) = self.port.poll_input() {
            if let Some(b) = self.translate_in(ch) {
                self.pending = Some(b);
                return true;
            }
        }
        false
    }

    fn read_poll(&mut self) -> Option<u8> {
        if self.status() {
            self.pending.take()
        } else {
            None
        }
    }

    fn read_wait(&mut self) -> Option<u8> {
        if let Some(b) = self.pending.take() {
            return Some(b);
        }
        loop {
            let ch = self.port.wait_input()?;
            if let Some(b) = self.translate_in(ch) {
                return Some(b);
            }
        }
    }

    fn poll(&mut self) {
        self.port.pump();
    }

    fn size(&self) -> (u16, u16) {
        self.port.size()
    }

    fn column(&self) -> u16 {
        self.col
    }

    fn shutdown(&mut self) {
        self.port.flush();
        self.port.restore();
    }
}

/// In-memory port for tests: captures host output, serves queued input.
#[derive(Default)]
pub struct BufferPort {
    pub output: String,
    pub input: VecDeque<char>,
    pub size: Option<(u16, u16)>,
}

impl BufferPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(s: &str) -> Self {
        BufferPort {
            input: s.chars().collect(),
            ..Self::default()
        }
    }

    pub fn queue(&mut self, s: &str) {
        self.input.extend(s.chars());
    }
}

impl TermPort for BufferPort {
    fn write_host(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn flush(&mut self) {}

    fn poll_input(&mut self) -> Option<char> {
        self.input.pop_front()
    }

    fn wait_input(&mut self) -> Option<char> {
        self.input.pop_front()
    }

    fn pump(&mut self) {}

    fn size(&self) -> (u16, u16) {
        self.size.unwrap_or((80, 24))
    }

    fn restore(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console() -> LineConsole<BufferPort> {
        LineConsole::new(BufferPort::new(), Charset::default(), '_')
    }

    #[test]
    fn graphics_advance_the_column() {
        let mut con = console();
        for &b in b"ABC" {
            con.out_byte(b);
        }
        assert_eq!(con.column(), 3);
        assert_eq!(con.port_mut().output, "ABC");
    }

    #[test]
    fn backspace_stops_at_the_margin() {
        let mut con = console();
        con.out_byte(0x08);
        assert_eq!(con.column(), 0);
        assert_eq!(con.port_mut().output, "");
        con.out_byte(b'X');
        con.out_byte(0x08);
        assert_eq!(con.column(), 0);
        assert_eq!(con.port_mut().output, "X\u{8}");
    }

    #[test]
    fn tab_expands_to_eight_column_stops() {
        let mut con = console();
        con.out_byte(b'A');
        con.out_byte(0x09);
        assert_eq!(con.column(), 8);
        con.out_byte(0x09);
        assert_eq!(con.column(), 16);
        assert_eq!(con.port_mut().output, "A               ");
    }

    #[test]
    fn carriage_return_resets_the_column() {
        let mut con = console();
        for &b in b"HI" {
            con.out_byte(b);
        }
        con.out_byte(0x0D);
        assert_eq!(con.column(), 0);
        con.out_byte(0x0A);
        assert_eq!(con.port_mut().output, "HI\r\n");
    }

    #[test]
    fn stray_controls_are_suppressed() {
        let mut con = console();
        con.out_byte(0x07);
        con.out_byte(0x1B);
        con.out_byte(0x7F);
        assert_eq!(con.port_mut().output, "");
        assert_eq!(con.column(), 0);
    }

    #[test]
    fn unmapped_bytes_print_the_substitute() {
        let mut con = console();
        con.out_byte(0xFE);
        assert_eq!(con.port_mut().output, "_");
    }

    #[test]
    fn input_is_translated_and_buffered() {
        let mut con = LineConsole::new(BufferPort::with_input("a\r"), Charset::default(), '_');
        assert!(con.status());
        assert_eq!(con.read_poll(), Some(b'a'));
        assert_eq!(con.read_wait(), Some(0x0D));
        assert_eq!(con.read_wait(), None);
        assert!(!con.status());
    }
}
