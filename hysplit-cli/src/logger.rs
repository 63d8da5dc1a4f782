//! Terminal backend for the `log` facade.
use std::io::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

struct TermLogger {
    level: LevelFilter,
    stream: StandardStream,
}

fn level_color(level: Level) -> ColorSpec {
    let mut spec = ColorSpec::new();
    let color = match level {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::Green,
        Level::Debug => Color::Cyan,
        Level::Trace => Color::Magenta,
    };
    spec.set_fg(Some(color)).set_bold(level <= Level::Warn);
    spec
}

impl Log for TermLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Write errors are dropped.
        let mut out = self.stream.lock();
        let _ = write!(out, "{} ", chrono::Local::now().format("%H:%M:%S%.3f"));
        let _ = out.set_color(&level_color(record.level()));
        let _ = write!(out, "{:<5}", record.level());
        let _ = out.reset();
        if self.level >= LevelFilter::Debug {
            let _ = write!(out, " {}", record.target());
        }
        let _ = writeln!(out, " {}", record.args());
    }

    fn flush(&self) {
        let _ = self.stream.lock().flush();
    }
}

/// Install the stderr logger. `verbosity` counts `-v` flags on top of the
/// `info` default; `quiet` keeps errors only.
pub fn init(verbosity: u8, quiet: bool, color: ColorChoice) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let logger = TermLogger {
        level,
        stream: StandardStream::stderr(color),
    };
    if log::set_logger(Box::leak(Box::new(logger))).is_ok() {
        log::set_max_level(level);
    }
}
