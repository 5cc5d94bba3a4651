// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global logger instance and initialization.
//!
//! Thread-safe singleton with lazy initialization; a no-op until a caller
//! opts in with [`init_logger`], so a library consumer who never calls it
//! pays nothing beyond the level-filter check.

use super::output::{LogLevel, Output};
use std::io;
use std::sync::{Arc, Mutex, OnceLock};

static LOGGER: OnceLock<Arc<Mutex<GlobalLogger>>> = OnceLock::new();

struct GlobalLogger {
    output: Option<Arc<dyn Output>>,
    level_filter: LogLevel,
}

impl GlobalLogger {
    fn new() -> Self {
        Self {
            output: None,
            level_filter: LogLevel::Info,
        }
    }

    fn log(&self, level: LogLevel, message: &str) -> io::Result<()> {
        if level < self.level_filter {
            return Ok(());
        }
        if let Some(ref output) = self.output {
            output.write(level, message)?;
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        if let Some(ref output) = self.output {
            output.flush()?;
        }
        Ok(())
    }
}

/// Initialize the global logger. Only the first call takes effect.
pub fn init_logger(output: Arc<dyn Output>, level: LogLevel) {
    let _ = LOGGER.get_or_init(|| {
        let mut logger = GlobalLogger::new();
        logger.output = Some(output);
        logger.level_filter = level;
        Arc::new(Mutex::new(logger))
    });
}

#[inline]
fn get_logger() -> Option<Arc<Mutex<GlobalLogger>>> {
    LOGGER.get().cloned()
}

#[inline]
pub(crate) fn log_message(level: LogLevel, message: &str) {
    if let Some(logger) = get_logger() {
        if let Ok(guard) = logger.lock() {
            let _ = guard.log(level, message);
        }
    }
}

/// Flush the global logger's output. Safe to call before `init_logger`.
pub fn flush_logger() -> io::Result<()> {
    match get_logger() {
        Some(logger) => {
            let guard = logger.lock().map_err(|_| io::Error::other("logger mutex poisoned"))?;
            guard.flush()
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::output::ConsoleOutput;

    #[test]
    fn log_before_init_is_silent_noop() {
        log_message(LogLevel::Info, "no logger yet, should not panic");
    }

    #[test]
    fn flush_before_init_is_ok() {
        assert!(flush_logger().is_ok());
    }

    #[test]
    fn init_then_log() {
        init_logger(Arc::new(ConsoleOutput::new(LogLevel::Debug)), LogLevel::Debug);
        log_message(LogLevel::Debug, "after init");
    }
}
