//! `log` backend that writes to stderr or a file.

use crate::parse_args::Verbosity;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Mutex;

/// Output destination for logger
enum Output {
    Stderr,
    File(BufWriter<File>),
}

pub struct Logger {
    output: Mutex<Output>,
    level: LevelFilter,
}

impl Verbosity {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::Warn,
            Verbosity::Verbose => LevelFilter::Info,
            Verbosity::Trace => LevelFilter::Debug,
            Verbosity::TraceWire => LevelFilter::Trace,
        }
    }
}

impl Logger {
    /// Create a new logger writing to stderr
    pub fn stderr(verbosity: Verbosity) -> Self {
        Logger {
            output: Mutex::new(Output::Stderr),
            level: verbosity.level_filter(),
        }
    }

    /// Create a new logger writing to a file
    pub fn file(path: &str, verbosity: Verbosity) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Logger {
            output: Mutex::new(Output::File(BufWriter::new(file))),
            level: verbosity.level_filter(),
        })
    }

    /// Install as the global logger
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{:5}] {}", record.level(), record.args());
        if let Ok(mut output) = self.output.lock() {
            match &mut *output {
                Output::Stderr => {
                    eprintln!("{}", line);
                }
                Output::File(f) => {
                    let _ = writeln!(f, "{}", line);
                    let _ = f.flush();
                }
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut output) = self.output.lock() {
            if let Output::File(f) = &mut *output {
                let _ = f.flush();
            }
        }
    }
}
