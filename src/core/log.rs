/*
 * Copyright (C) 2020-2023 Fanout, Inc.
 * Copyright (C) 2023-2026 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::File;
use std::io::{self, Write};
use std::sync::{Mutex, OnceLock};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

// stdout may be carrying protocol data, so logs default to stderr
enum SharedOutput<'a> {
    Stderr(io::Stderr),
    File(&'a Mutex<File>),
}

impl Write for SharedOutput<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, io::Error> {
        match self {
            Self::Stderr(g) => g.write(buf),
            Self::File(g) => match g.lock() {
                Ok(mut f) => f.write(buf),
                Err(_) => Err(io::Error::new(io::ErrorKind::Other, "log file lock poisoned")),
            },
        }
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        match self {
            Self::Stderr(g) => g.flush(),
            Self::File(g) => match g.lock() {
                Ok(mut f) => f.flush(),
                Err(_) => Err(io::Error::new(io::ErrorKind::Other, "log file lock poisoned")),
            },
        }
    }
}

pub struct SimpleLogger {
    local_offset: Option<UtcOffset>,
    output_file: Option<Mutex<File>>,
}

impl SimpleLogger {
    fn format_line(&self, record: &Record, now: OffsetDateTime) -> String {
        let format = format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
        );

        let ts = now
            .to_offset(self.local_offset.unwrap_or(UtcOffset::UTC))
            .format(&format)
            .unwrap_or_default();

        let lname = match record.level() {
            Level::Error => "ERR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };

        if record.level() <= Level::Info {
            format!("[{}] {} {}", lname, ts, record.args())
        } else {
            format!(
                "[{}] {} [{}] {}",
                lname,
                ts,
                record.target(),
                record.args()
            )
        }
    }
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut output = match &self.output_file {
            Some(f) => SharedOutput::File(f),
            None => SharedOutput::Stderr(io::stderr()),
        };

        let line = self.format_line(record, OffsetDateTime::now_utc());

        // nowhere left to report a failure to log
        let _ = writeln!(&mut output, "{}", line);
    }

    fn flush(&self) {
        let mut output = match &self.output_file {
            Some(f) => SharedOutput::File(f),
            None => SharedOutput::Stderr(io::stderr()),
        };

        let _ = output.flush();
    }
}

// SAFETY: this method is unsound on platforms where another thread may
// modify environment vars
unsafe fn get_offset() -> Option<UtcOffset> {
    time::util::local_offset::set_soundness(time::util::local_offset::Soundness::Unsound);

    let offset = UtcOffset::current_local_offset().ok();

    time::util::local_offset::set_soundness(time::util::local_offset::Soundness::Sound);

    offset
}

static LOGGER: OnceLock<SimpleLogger> = OnceLock::new();

pub fn ensure_init_simple_logger(output_file: Option<File>) {
    LOGGER.get_or_init(|| {
        // SAFETY: the call happens once, early, before other threads are
        // started, which keeps the window for concurrent env changes small
        let local_offset = unsafe { get_offset() };

        SimpleLogger {
            local_offset,
            output_file: output_file.map(Mutex::new),
        }
    });
}

pub fn get_simple_logger() -> &'static SimpleLogger {
    ensure_init_simple_logger(None);

    LOGGER.get_or_init(|| SimpleLogger {
        local_offset: None,
        output_file: None,
    })
}

pub fn local_offset_check() {
    if get_simple_logger().local_offset.is_none() {
        log::warn!("Failed to determine local time offset. Log timestamps will be in UTC.");
    }
}

// 0 = error ... 4 and above = trace
pub fn level_filter(level: u8) -> LevelFilter {
    match level {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        4..=u8::MAX => LevelFilter::Trace,
    }
}
