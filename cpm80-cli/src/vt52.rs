//! Full-screen VT52 console.
//!
//! Interprets the guest's VT52 escape sequences on an alternate screen:
//! cursor motion, home, reverse line feed, erase to end of line/screen,
//! direct cursor addressing, identify, and the graphics character set
//! (which draws through the charset's graphics view). Keys are encoded
//! back to the guest as VT52 sequences.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Duration;

use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEvent};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::QueueableCommand;

use cpm80_core::charset::Charset;
use cpm80_core::config::Config;
use cpm80_core::console::Console;
use cpm80_core::signals;

use crate::term::translate_key;

#[derive(Debug, Clone, Copy, PartialEq)]
enum EscState {
    Normal,
    Escape,
    RowByte,
    ColByte(u16),
}

pub struct Vt52Console {
    charset: Charset,
    unprintable: char,
    cols: u16,
    rows: u16,
    col: u16,
    row: u16,
    state: EscState,
    graphics: bool,
    keypad_application: bool,
    alt_function_keys: bool,
    exchange_delete: bool,
    exit_delay: u64,
    input: VecDeque<u8>,
    active: bool,
}

impl Vt52Console {
    pub fn new(cfg: &Config) -> Self {
        let _ = enable_raw_mode();
        let mut out = io::stdout();
        let _ = out.queue(EnterAlternateScreen);
        let _ = out.queue(Clear(ClearType::All));
        let _ = out.queue(MoveTo(0, 0));
        let _ = out.flush();
        Vt52Console {
            charset: cfg.charset.clone(),
            unprintable: cfg.unprintable,
            cols: cfg.columns,
            rows: cfg.lines,
            col: 0,
            row: 0,
            state: EscState::Normal,
            graphics: false,
            keypad_application: cfg.application_cursor,
            alt_function_keys: cfg.alt_function_keys,
            exchange_delete: cfg.exchange_delete,
            exit_delay: cfg.screen_delay,
            input: VecDeque::new(),
            active: true,
        }
    }

    fn place_cursor(&mut self) {
        let mut out = io::stdout();
        let _ = out.queue(MoveTo(self.col.min(self.cols - 1), self.row));
        let _ = out.flush();
    }

    fn print_char(&mut self, ch: char) {
        // Wrap deferred to the next graphic character at the right margin.
        if self.col >= self.cols {
            self.carriage_return();
            self.line_feed();
        }
        let mut out = io::stdout();
        let _ = out.queue(MoveTo(self.col, self.row));
        let mut buf = [0u8; 4];
        let _ = out.write_all(ch.encode_utf8(&mut buf).as_bytes());
        let _ = out.flush();
        self.col += 1;
    }

    fn carriage_return(&mut self) {
        self.col = 0;
    }

    fn line_feed(&mut self) {
        if self.row + 1 < self.rows {
            self.row += 1;
        } else {
            let mut out = io::stdout();
            let _ = out.queue(crossterm::terminal::ScrollUp(1));
            let _ = out.flush();
        }
    }

    fn reverse_line_feed(&mut self) {
        if self.row > 0 {
            self.row -= 1;
        } else {
            let mut out = io::stdout();
            let _ = out.queue(crossterm::terminal::ScrollDown(1));
            let _ = out.flush();
        }
    }

    fn control(&mut self, b: u8) {
        match b {
            0x07 => {
                let _ = io::stdout().write_all(b"\x07");
            }
            0x08 => {
                if self.col > 0 {
                    self.col -= 1;
                }
            }
            0x09 => {
                // Tab stops every eight columns, wrapping at the margin.
                loop {
                    self.print_char(' ');
                    if self.col % 8 == 0 {
                        break;
                    }
                }
            }
            0x0A => self.line_feed(),
            0x0D => self.carriage_return(),
            0x1B => self.state = EscState::Escape,
            _ => {} // other controls are suppressed
        }
    }

    fn escape(&mut self, b: u8) {
        self.state = EscState::Normal;
        let mut out = io::stdout();
        match b {
            b'A' => self.row = self.row.saturating_sub(1),
            b'B' => {
                if self.row + 1 < self.rows {
                    self.row += 1;
                }
            }
            b'C' => {
                if self.col + 1 < self.cols {
                    self.col += 1;
                }
            }
            b'D' => self.col = self.col.saturating_sub(1),
            b'E' => {
                let _ = out.queue(Clear(ClearType::All));
                self.row = 0;
                self.col = 0;
            }
            b'F' => self.graphics = true,
            b'G' => self.graphics = false,
            b'H' => {
                self.row = 0;
                self.col = 0;
            }
            b'I' => self.reverse_line_feed(),
            b'J' => {
                let _ = out.queue(MoveTo(self.col.min(self.cols - 1), self.row));
                let _ = out.queue(Clear(ClearType::FromCursorDown));
            }
            b'K' => {
                let _ = out.queue(MoveTo(self.col.min(self.cols - 1), self.row));
                let _ = out.queue(Clear(ClearType::UntilNewLine));
            }
            b'Y' => self.state = EscState::RowByte,
            b'Z' => {
                // Identify: report as a VT52 without extras.
                self.input.extend([0x1B, b'/', b'K']);
            }
            b'=' => self.keypad_application = true,
            b'>' => self.keypad_application = false,
            _ => {}
        }
        let _ = out.flush();
    }

    /// Encode one key for the guest, VT52-style. In application mode the
    /// cursor keys send `ESC ? x` sequences instead.
    fn encode_key(&mut self, key: KeyEvent) {
        if self.keypad_application {
            if let Some(letter) = match key.code {
                KeyCode::Up => Some(b'A'),
                KeyCode::Down => Some(b'B'),
                KeyCode::Right => Some(b'C'),
                KeyCode::Left => Some(b'D'),
                _ => None,
            } {
                self.input.extend([0x1B, b'?', letter]);
                return;
            }
        }
        let seq: &[u8] = match key.code {
            KeyCode::Up => &[0x1B, b'A'],
            KeyCode::Down => &[0x1B, b'B'],
            KeyCode::Right => &[0x1B, b'C'],
            KeyCode::Left => &[0x1B, b'D'],
            KeyCode::Home => &[0x1B, b'H'],
            KeyCode::F(n) => {
                let base = if self.alt_function_keys {
                    // Alternate encoding: ESC digit.
                    [0x1B, b'0' + (n % 10)]
                } else {
                    // VT52 keypad function keys P Q R S.
                    match n {
                        1 => [0x1B, b'P'],
                        2 => [0x1B, b'Q'],
                        3 => [0x1B, b'R'],
                        _ => [0x1B, b'S'],
                    }
                };
                self.input.extend(base);
                return;
            }
            _ => {
                if let Some(c) = translate_key(key, self.exchange_delete) {
                    if let Some(b) = self.charset.to_cpm(c) {
                        self.input.push_back(b);
                    }
                }
                return;
            }
        };
        self.input.extend(seq.iter().copied());
    }

    fn drain_events(&mut self) {
        while event::poll(Duration::from_millis(0)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(key)) => self.encode_key(key),
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }
}

impl Console for Vt52Console {
    fn out_byte(&mut self, b: u8) {
        match self.state {
            EscState::Normal => {
                if b < 0x20 || b == 0x7F {
                    self.control(b);
                } else {
                    let ch = if self.graphics {
                        self.charset.from_graph(b)
                    } else {
                        self.charset.from_cpm(b)
                    }
                    .unwrap_or(self.unprintable);
                    self.print_char(ch);
                }
            }
            EscState::Escape => self.escape(b),
            EscState::RowByte => {
                self.state = EscState::ColByte(b.saturating_sub(32) as u16);
            }
            EscState::ColByte(row) => {
                self.row = row.min(self.rows - 1);
                self.col = (b.saturating_sub(32) as u16).min(self.cols - 1);
                self.state = EscState::Normal;
            }
        }
        self.place_cursor();
    }

    fn status(&mut self) -> bool {
        if self.input.is_empty() {
            self.drain_events();
        }
        !self.input.is_empty()
    }

    fn read_poll(&mut self) -> Option<u8> {
        if self.input.is_empty() {
            self.drain_events();
        }
        self.input.pop_front()
    }

    fn read_wait(&mut self) -> Option<u8> {
        loop {
            if let Some(b) = self.read_poll() {
                return Some(b);
            }
            if signals::stop_requested() {
                return None;
            }
            let _ = event::poll(Duration::from_millis(50));
        }
    }

    fn poll(&mut self) {
        self.drain_events();
    }

    fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn column(&self) -> u16 {
        self.col.min(self.cols - 1)
    }

    fn shutdown(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if self.exit_delay > 0 {
            std::thread::sleep(Duration::from_secs(self.exit_delay));
        }
        let mut out = io::stdout();
        let _ = out.queue(LeaveAlternateScreen);
        let _ = out.flush();
        let _ = disable_raw_mode();
    }
}

impl Drop for Vt52Console {
    fn drop(&mut self) {
        // Restore without the exit delay if shutdown never ran.
        if self.active {
            self.exit_delay = 0;
            self.shutdown();
        }
    }
}
