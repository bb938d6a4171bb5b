//! Configuration-file parser.
//!
//! The file is a sequence of directives made of keywords, integers
//! (decimal, octal with a leading 0, hex with 0x), identifiers, `=`, `,`
//! and double-quoted strings with `\\` `\"` `\'` escapes. `#` starts a
//! comment running to the end of the line.

use std::fmt;
use std::path::PathBuf;

use cpm80_core::charset;
use cpm80_core::config::{
    Config, ConsoleMode, CpuDelay, DeviceFile, DeviceMode, DumpEvents,
};

#[derive(Debug)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    Eq,
    Comma,
}

struct Lexer<'a> {
    src: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src: src.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            message: message.into(),
        }
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>, ParseError> {
        loop {
            match self.src.peek() {
                None => return Ok(None),
                Some('\n') => {
                    self.line += 1;
                    self.src.next();
                }
                Some(c) if c.is_whitespace() => {
                    self.src.next();
                }
                Some('#') => {
                    for c in self.src.by_ref() {
                        if c == '\n' {
                            self.line += 1;
                            break;
                        }
                    }
                }
                Some(_) => break,
            }
        }
        let line = self.line;
        let c = *self.src.peek().unwrap_or(&'\0');
        let token = match c {
            '=' => {
                self.src.next();
                Token::Eq
            }
            ',' => {
                self.src.next();
                Token::Comma
            }
            '"' => {
                self.src.next();
                let mut s = String::new();
                loop {
                    match self.src.next() {
                        None => return Err(self.error("unterminated string")),
                        Some('"') => break,
                        Some('\\') => match self.src.next() {
                            Some('\\') => s.push('\\'),
                            Some('"') => s.push('"'),
                            Some('\'') => s.push('\''),
                            other => {
                                return Err(self.error(format!(
                                    "bad escape {:?} in string",
                                    other
                                )))
                            }
                        },
                        Some('\n') => return Err(self.error("newline in string")),
                        Some(c) => s.push(c),
                    }
                }
                Token::Str(s)
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = self.src.peek() {
                    if d.is_ascii_alphanumeric() {
                        digits.push(d);
                        self.src.next();
                    } else {
                        break;
                    }
                }
                let value = if let Some(hex) = digits
                    .strip_prefix("0x")
                    .or_else(|| digits.strip_prefix("0X"))
                {
                    i64::from_str_radix(hex, 16)
                } else if digits.len() > 1 && digits.starts_with('0') {
                    i64::from_str_radix(&digits[1..], 8)
                } else {
                    digits.parse()
                };
                Token::Int(
                    value.map_err(|_| self.error(format!("bad number {digits:?}")))?,
                )
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&d) = self.src.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        s.push(d);
                        self.src.next();
                    } else {
                        break;
                    }
                }
                Token::Ident(s.to_lowercase())
            }
            other => return Err(self.error(format!("unexpected character {other:?}"))),
        };
        Ok(Some((line, token)))
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|(l, _)| *l)
            .unwrap_or(0)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn accept_eq(&mut self) {
        if matches!(self.peek(), Some(Token::Eq)) {
            self.pos += 1;
        }
    }

    fn accept_comma(&mut self) -> bool {
        if matches!(self.peek(), Some(Token::Comma)) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn want_ident(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Token::Ident(s)) => Ok(s),
            other => Err(self.error(format!("expected identifier, found {other:?}"))),
        }
    }

    fn want_int(&mut self) -> Result<i64, ParseError> {
        match self.next() {
            Some(Token::Int(n)) => Ok(n),
            other => Err(self.error(format!("expected number, found {other:?}"))),
        }
    }

    fn want_str(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            other => Err(self.error(format!("expected string, found {other:?}"))),
        }
    }

    /// on/off style value; a bare directive means "on".
    fn flag_value(&mut self) -> Result<bool, ParseError> {
        self.accept_eq();
        let explicit = match self.peek() {
            Some(Token::Ident(s)) if matches!(s.as_str(), "on" | "yes" | "true") => Some(true),
            Some(Token::Ident(s)) if matches!(s.as_str(), "off" | "no" | "false") => Some(false),
            _ => None,
        };
        if let Some(v) = explicit {
            self.pos += 1;
            return Ok(v);
        }
        Ok(true)
    }

    /// A character value: an integer code point or a one-character string.
    fn char_value(&mut self) -> Result<Option<char>, ParseError> {
        match self.next() {
            Some(Token::Int(n)) => Ok(char::from_u32(
                u32::try_from(n).map_err(|_| self.error("code point out of range"))?,
            )),
            Some(Token::Str(s)) => {
                let mut it = s.chars();
                match (it.next(), it.next()) {
                    (Some(c), None) => Ok(Some(c)),
                    _ => Err(self.error("expected a single character")),
                }
            }
            Some(Token::Ident(s)) if s == "none" => Ok(None),
            other => Err(self.error(format!("expected character, found {other:?}"))),
        }
    }
}

/// Parse configuration text over a starting `Config`.
pub fn apply(text: &str, cfg: &mut Config) -> Result<(), ParseError> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    while let Some(t) = lexer.next_token()? {
        tokens.push(t);
    }
    let mut p = Parser { tokens, pos: 0 };

    while p.peek().is_some() {
        let word = p.want_ident()?;
        match word.as_str() {
            "charset" | "alt" | "char" => directive_charset(&mut p, cfg, &word)?,
            "unprintable" => {
                p.accept_eq();
                if let Some(c) = p.char_value()? {
                    cfg.unprintable = c;
                }
            }
            "console" => {
                p.accept_eq();
                let mode = p.want_ident()?;
                cfg.console_mode = match mode.as_str() {
                    "line" => ConsoleMode::Line,
                    "screen" | "fullscreen" => ConsoleMode::FullScreen,
                    other => return Err(p.error(format!("unknown console mode {other:?}"))),
                };
            }
            "lines" => {
                p.accept_eq();
                cfg.lines = dimension(&mut p, 1, 100)?;
            }
            "columns" => {
                p.accept_eq();
                cfg.columns = dimension(&mut p, 1, 255)?;
            }
            "drive" => directive_drive(&mut p, cfg)?,
            "default" => {
                // default drive <letter>
                let sub = p.want_ident()?;
                if sub != "drive" {
                    return Err(p.error(format!("unknown directive default {sub}")));
                }
                p.accept_eq();
                let letter = p.want_ident()?;
                cfg.default_drive = drive_number(&mut p, &letter)?;
            }
            "logfile" => {
                p.accept_eq();
                cfg.log_path = Some(PathBuf::from(p.want_str()?));
            }
            "loglevel" => {
                p.accept_eq();
                let n = p.want_int()?;
                if !(0..=4).contains(&n) {
                    return Err(p.error("log level must be 0..4"));
                }
                cfg.log_level = n as u8;
            }
            "screen" => {
                // screen delay <seconds>
                let sub = p.want_ident()?;
                if sub != "delay" {
                    return Err(p.error(format!("unknown directive screen {sub}")));
                }
                p.accept_eq();
                cfg.screen_delay = p.want_int()?.max(0) as u64;
            }
            "application" => {
                let sub = p.want_ident()?;
                if sub != "cursor" {
                    return Err(p.error(format!("unknown directive application {sub}")));
                }
                cfg.application_cursor = p.flag_value()?;
            }
            "exchange" => {
                let sub = p.want_ident()?;
                if sub != "delete" {
                    return Err(p.error(format!("unknown directive exchange {sub}")));
                }
                cfg.exchange_delete = p.flag_value()?;
            }
            "close" => {
                let sub = p.want_ident()?;
                if sub != "files" {
                    return Err(p.error(format!("unknown directive close {sub}")));
                }
                cfg.dont_close = !p.flag_value()?;
            }
            "cpu" => {
                let sub = p.want_ident()?;
                if sub != "delay" {
                    return Err(p.error(format!("unknown directive cpu {sub}")));
                }
                p.accept_eq();
                let first = p.want_int()?;
                let delay = if p.accept_comma() {
                    let nanos = p.want_int()?;
                    CpuDelay {
                        every: first.max(1) as u64,
                        nanos: nanos.max(0) as u64,
                    }
                } else {
                    CpuDelay {
                        every: 1,
                        nanos: first.max(0) as u64,
                    }
                };
                cfg.cpu_delay = Some(delay);
            }
            "printer" => directive_device(&mut p, &mut cfg.printer)?,
            "punch" => directive_device(&mut p, &mut cfg.punch)?,
            "reader" => directive_device(&mut p, &mut cfg.reader)?,
            "dump" => {
                p.accept_eq();
                let flags = p.want_ident()?;
                cfg.dump_events = dump_events(&mut p, &flags)?;
            }
            other => return Err(p.error(format!("unknown directive {other:?}"))),
        }
    }
    Ok(())
}

fn dimension(p: &mut Parser, min: i64, max: i64) -> Result<u16, ParseError> {
    let n = p.want_int()?;
    if n < min || n > max {
        return Err(p.error(format!("value {n} outside {min}..{max}")));
    }
    Ok(n as u16)
}

fn drive_number(p: &mut Parser, letter: &str) -> Result<u8, ParseError> {
    let b = letter.as_bytes();
    if b.len() == 1 && (b'a'..=b'p').contains(&b[0]) {
        Ok(b[0] - b'a')
    } else {
        Err(p.error(format!("bad drive letter {letter:?}")))
    }
}

/// `drive <letter> = [readonly,] "<host-path>"`
fn directive_drive(p: &mut Parser, cfg: &mut Config) -> Result<(), ParseError> {
    let letter = p.want_ident()?;
    let n = drive_number(p, &letter)? as usize;
    p.accept_eq();
    let mut readonly = false;
    if matches!(p.peek(), Some(Token::Ident(s)) if s == "readonly") {
        p.pos += 1;
        readonly = true;
        p.accept_comma();
    }
    let path = p.want_str()?;
    cfg.drives[n] = Some(PathBuf::from(path));
    cfg.read_only[n] = readonly;
    Ok(())
}

/// `charset <name>`, `alt charset <name>`, `char <code> = <value>`,
/// `alt char <code> = <value>`
fn directive_charset(p: &mut Parser, cfg: &mut Config, word: &str) -> Result<(), ParseError> {
    let (alternate, what) = if word == "alt" {
        (true, p.want_ident()?)
    } else {
        (false, word.to_string())
    };
    match what.as_str() {
        "charset" => {
            p.accept_eq();
            let name = p.want_ident()?;
            let table = match name.as_str() {
                "ascii" => charset::ascii_table(),
                "graphics" | "vt52" => charset::graphics_table(),
                other => return Err(p.error(format!("unknown charset {other:?}"))),
            };
            for code in 0..=255u8 {
                cfg.charset.set_entry(alternate, code, table[code as usize]);
            }
        }
        "char" => {
            let code = p.want_int()?;
            if !(0..=255).contains(&code) {
                return Err(p.error("character code must be 0..255"));
            }
            p.accept_eq();
            let value = p.char_value()?;
            cfg.charset.set_entry(alternate, code as u8, value);
        }
        other => return Err(p.error(format!("unknown directive {other:?}"))),
    }
    Ok(())
}

/// `printer file "<path>"` / `printer mode raw|text`
fn directive_device(p: &mut Parser, slot: &mut Option<DeviceFile>) -> Result<(), ParseError> {
    let sub = p.want_ident()?;
    match sub.as_str() {
        "file" => {
            p.accept_eq();
            let path = PathBuf::from(p.want_str()?);
            match slot {
                Some(d) => d.path = path,
                None => {
                    *slot = Some(DeviceFile {
                        path,
                        mode: DeviceMode::Text,
                    })
                }
            }
        }
        "mode" => {
            p.accept_eq();
            let mode = p.want_ident()?;
            let mode = match mode.as_str() {
                "raw" => DeviceMode::Raw,
                "text" => DeviceMode::Text,
                other => return Err(p.error(format!("unknown device mode {other:?}"))),
            };
            match slot {
                Some(d) => d.mode = mode,
                None => {
                    return Err(p.error("device mode before device file"));
                }
            }
        }
        other => return Err(p.error(format!("unknown device directive {other:?}"))),
    }
    Ok(())
}

fn dump_events(p: &mut Parser, flags: &str) -> Result<DumpEvents, ParseError> {
    parse_dump_events(flags).ok_or_else(|| p.error(format!("bad dump flags {flags:?}")))
}

/// Dump selector letters: n(one), i (startup), e (exit), s (signal),
/// x (error), a (all). Shared with the command-line option.
pub fn parse_dump_events(flags: &str) -> Option<DumpEvents> {
    let mut ev = DumpEvents::default();
    for c in flags.chars() {
        match c {
            'n' => ev = DumpEvents::default(),
            'a' => ev = DumpEvents::all(),
            'i' => ev.startup = true,
            'e' => ev.exit = true,
            's' => ev.on_signal = true,
            'x' => ev.on_error = true,
            _ => return None,
        }
    }
    Some(ev)
}
