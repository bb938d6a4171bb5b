//! cpm80 - run CP/M-80 2.2 programs on a modern host.
//!
//! Usage:
//!   cpm80 [opts...] <command> [args...]
//!
//! The command is a host path (contains `/`) or a CP/M-style `drive:name`;
//! further arguments become the guest's command tail.

mod config_file;
mod term;
mod vt52;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

use cpm80_core::config::{Config, ConsoleMode, CpuDelay, MemorySave, SaveFormat};
use cpm80_core::console::{Console, LineConsole};
use cpm80_core::emulator::{Emulator, ExitInfo};
use cpm80_core::error::CoreResult;
use cpm80_core::{memsave, signals};

use term::StdioPort;
use vt52::Vt52Console;

/// Run CP/M-80 2.2 programs
#[derive(Parser, Debug)]
#[command(name = "cpm80", version)]
struct Args {
    /// Use the alternate character set
    #[arg(short = 'a')]
    alt_charset: bool,

    /// Batch console: plain byte streams on stdin/stdout
    #[arg(short = 'b')]
    batch: bool,

    /// Console columns (1..255)
    #[arg(short = 'c', value_name = "COLS")]
    columns: Option<u16>,

    /// Default drive letter (a..p)
    #[arg(short = 'd', value_name = "DRIVE")]
    default_drive: Option<char>,

    /// Save memory after a successful run: {b|h},START,END,PATH
    #[arg(short = 'e', value_name = "SPEC")]
    save: Option<String>,

    /// Configuration file
    #[arg(short = 'f', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the alternate function-key encoding
    #[arg(short = 'k')]
    alt_keys: bool,

    /// Console lines (1..100)
    #[arg(short = 'l', value_name = "LINES")]
    lines: Option<u16>,

    /// Machine-state dumps: letters from a,e,i,n,s,x
    #[arg(short = 'm', value_name = "FLAGS")]
    dumps: Option<String>,

    /// Do not really close files on BDOS close
    #[arg(short = 'n')]
    dont_close: bool,

    /// Full-screen (VT52) console
    #[arg(short = 's')]
    full_screen: bool,

    /// Log level 0..4
    #[arg(short = 'v', value_name = "LEVEL")]
    log_level: Option<u8>,

    /// Seconds to keep the final VT52 screen visible
    #[arg(short = 'w', value_name = "SECS")]
    screen_delay: Option<u64>,

    /// Exchange the BS and DEL keys
    #[arg(short = 'x')]
    exchange_delete: bool,

    /// CPU delay: NANOS, or COUNT,NANOS
    #[arg(short = 'y', value_name = "SPEC")]
    cpu_delay: Option<String>,

    /// CP/M command (host path or drive:name)
    command: String,

    /// Command tail arguments
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

/// Decimal, octal (leading 0) or hex (0x) integer.
fn parse_int(s: &str) -> Result<u32, String> {
    let v = if let Some(h) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(h, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        u32::from_str_radix(&s[1..], 8)
    } else {
        s.parse()
    };
    v.map_err(|_| format!("bad number {s:?}"))
}

/// `{b|h},START,END,PATH`
fn parse_save_spec(s: &str) -> Result<MemorySave, String> {
    let parts: Vec<&str> = s.splitn(4, ',').collect();
    let [fmt, start, end, path] = parts.as_slice() else {
        return Err("memory save spec is {b|h},START,END,PATH".into());
    };
    let format = match *fmt {
        "b" => SaveFormat::Binary,
        "h" => SaveFormat::IntelHex,
        other => return Err(format!("bad save format {other:?}")),
    };
    let start = parse_int(start)?;
    let end = parse_int(end)?;
    if start > 0xFFFF || end > 0xFFFF || start > end {
        return Err("save range must satisfy START <= END <= 0xFFFF".into());
    }
    Ok(MemorySave {
        path: PathBuf::from(path),
        format,
        start: start as u16,
        end: end as u16,
    })
}

/// `NANOS` or `COUNT,NANOS`
fn parse_cpu_delay(s: &str) -> Result<CpuDelay, String> {
    match s.split_once(',') {
        Some((count, nanos)) => Ok(CpuDelay {
            every: parse_int(count)?.max(1) as u64,
            nanos: parse_int(nanos)? as u64,
        }),
        None => Ok(CpuDelay {
            every: 1,
            nanos: parse_int(s)? as u64,
        }),
    }
}

fn build_config(args: &Args) -> Result<Config, String> {
    let mut cfg = Config::default();

    if let Some(path) = &args.config {
        let text =
            fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        config_file::apply(&text, &mut cfg).map_err(|e| format!("{}: {e}", path.display()))?;
    }

    // Command-line options win over the configuration file.
    if args.alt_charset {
        cfg.charset.use_alternate(true);
    }
    if args.batch {
        cfg.batch_mode = true;
        cfg.console_mode = ConsoleMode::Line;
    }
    if let Some(c) = args.columns {
        if !(1..=255).contains(&c) {
            return Err("columns must be 1..255".into());
        }
        cfg.columns = c;
    }
    if let Some(l) = args.lines {
        if !(1..=100).contains(&l) {
            return Err("lines must be 1..100".into());
        }
        cfg.lines = l;
    }
    if let Some(d) = args.default_drive {
        let d = d.to_ascii_lowercase();
        if !('a'..='p').contains(&d) {
            return Err(format!("bad drive letter {d:?}"));
        }
        cfg.default_drive = d as u8 - b'a';
    }
    if let Some(spec) = &args.save {
        cfg.memory_save = Some(parse_save_spec(spec)?);
    }
    if let Some(spec) = &args.cpu_delay {
        cfg.cpu_delay = Some(parse_cpu_delay(spec)?);
    }
    if let Some(flags) = &args.dumps {
        cfg.dump_events = config_file::parse_dump_events(flags)
            .ok_or_else(|| format!("bad dump flags {flags:?}"))?;
    }
    if let Some(level) = args.log_level {
        if level > 4 {
            return Err("log level must be 0..4".into());
        }
        cfg.log_level = level;
    }
    if let Some(secs) = args.screen_delay {
        cfg.screen_delay = secs;
    }
    if args.full_screen && !args.batch {
        cfg.console_mode = ConsoleMode::FullScreen;
    }
    if args.dont_close {
        cfg.dont_close = true;
    }
    if args.exchange_delete {
        cfg.exchange_delete = true;
    }
    if args.alt_keys {
        cfg.alt_function_keys = true;
    }

    cfg.command = args.command.clone();
    cfg.args = args.args.clone();
    Ok(cfg)
}

fn init_logger(cfg: &Config) {
    let level = match cfg.log_level {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Some(path) = &cfg.log_path {
        match fs::File::create(path) {
            Ok(f) => {
                builder.target(env_logger::Target::Pipe(Box::new(f)));
            }
            Err(e) => eprintln!("cpm80: cannot open log file {}: {e}", path.display()),
        }
    }
    let _ = builder.try_init();
}

fn run_with<C: Console>(cfg: &Config, console: C) -> CoreResult<ExitInfo> {
    let mut em = Emulator::new(cfg, console)?;
    let info = em.run();
    if let Some(save) = &cfg.memory_save {
        if !info.reason.is_error() {
            memsave::save(&em.machine, save)?;
        }
    }
    Ok(info)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let cfg = match build_config(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("cpm80: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logger(&cfg);

    if let Err(e) = signals::install() {
        eprintln!("cpm80: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cfg.console_mode {
        ConsoleMode::Line => {
            let port = StdioPort::new(cfg.batch_mode, cfg.exchange_delete);
            let console = LineConsole::new(port, cfg.charset.clone(), cfg.unprintable);
            run_with(&cfg, console)
        }
        ConsoleMode::FullScreen => run_with(&cfg, Vt52Console::new(&cfg)),
    };

    match result {
        Ok(info) => {
            if info.reason.is_error() || info.program_rc >= 0xFF00 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("cpm80: {e}");
            ExitCode::FAILURE
        }
    }
}
