//! Host terminal access for the line-mode console.
//!
//! On a TTY the port runs crossterm raw mode and translates key events; in
//! batch mode it reads and writes plain byte streams so the emulator can be
//! driven from files and pipes.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use cpm80_core::console::TermPort;
use cpm80_core::signals;

/// Translate a crossterm key event to the host character handed to the
/// console driver. Control keys become their ASCII control characters.
pub fn translate_key(key: KeyEvent, exchange_delete: bool) -> Option<char> {
    let KeyEvent {
        code, modifiers, ..
    } = key;
    if modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char(c) = code {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase() {
                return char::from_u32(upper as u32 - 64);
            }
        }
    }
    let (bs, del) = if exchange_delete {
        ('\x7f', '\x08')
    } else {
        ('\x08', '\x7f')
    };
    match code {
        KeyCode::Char(c) => Some(c),
        KeyCode::Enter => Some('\r'),
        KeyCode::Backspace => Some(bs),
        KeyCode::Delete => Some(del),
        KeyCode::Tab => Some('\t'),
        KeyCode::Esc => Some('\x1b'),
        KeyCode::Up => Some('\x0b'),
        KeyCode::Down => Some('\n'),
        KeyCode::Left => Some('\x08'),
        KeyCode::Right => Some('\x0c'),
        _ => None,
    }
}

pub struct StdioPort {
    batch: bool,
    raw_mode: bool,
    exchange_delete: bool,
    queue: VecDeque<char>,
    stdin_done: bool,
}

impl StdioPort {
    pub fn new(batch: bool, exchange_delete: bool) -> Self {
        let raw_mode = !batch && enable_raw_mode().is_ok();
        StdioPort {
            batch,
            raw_mode,
            exchange_delete,
            queue: VecDeque::new(),
            stdin_done: false,
        }
    }

    /// Drain whatever key events are pending right now.
    fn drain_events(&mut self) {
        if self.batch {
            return;
        }
        while event::poll(Duration::from_millis(0)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(key)) => {
                    if let Some(c) = translate_key(key, self.exchange_delete) {
                        self.queue.push_back(c);
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    fn batch_read(&mut self) -> Option<char> {
        if self.stdin_done {
            return None;
        }
        let mut byte = [0u8; 1];
        match io::stdin().read(&mut byte) {
            Ok(0) | Err(_) => {
                self.stdin_done = true;
                None
            }
            Ok(_) => Some(byte[0] as char),
        }
    }
}

impl TermPort for StdioPort {
    fn write_host(&mut self, s: &str) {
        // In raw mode output post-processing is off, so the console
        // driver's CR and LF map straight to the cursor motions the guest
        // asked for.
        let _ = io::stdout().lock().write_all(s.as_bytes());
    }

    fn flush(&mut self) {
        let _ = io::stdout().flush();
    }

    fn poll_input(&mut self) -> Option<char> {
        if let Some(c) = self.queue.pop_front() {
            return Some(c);
        }
        if self.batch {
            return self.batch_read();
        }
        self.drain_events();
        self.queue.pop_front()
    }

    fn wait_input(&mut self) -> Option<char> {
        if let Some(c) = self.queue.pop_front() {
            return Some(c);
        }
        if self.batch {
            return self.batch_read();
        }
        loop {
            if signals::stop_requested() {
                return None;
            }
            if event::poll(Duration::from_millis(50)).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if let Some(c) = translate_key(key, self.exchange_delete) {
                        return Some(c);
                    }
                }
            }
        }
    }

    fn pump(&mut self) {
        self.drain_events();
    }

    fn size(&self) -> (u16, u16) {
        crossterm::terminal::size().unwrap_or((80, 24))
    }

    fn restore(&mut self) {
        if self.raw_mode {
            let _ = disable_raw_mode();
            self.raw_mode = false;
        }
    }
}

impl Drop for StdioPort {
    fn drop(&mut self) {
        self.restore();
    }
}
