// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compile-time configurable logging.
//!
//! State-machine transitions (connection state changes, LLRP arm/fire,
//! discovery range updates) go through this module instead of the plain
//! `log` crate so they can be feature-gated to zero cost; per-PDU byte
//! tracing still uses `log::trace!` directly (see `codec`).
//!
//! When the `logging` feature is disabled, [`debug!`], [`info!`], [`warn!`]
//! and [`error!`] expand to nothing and the format arguments are never
//! evaluated.

#[cfg(feature = "logging")]
mod logger;
#[cfg(feature = "logging")]
mod output;

#[cfg(feature = "logging")]
pub use logger::{flush_logger, init_logger};
#[cfg(feature = "logging")]
pub use output::{ConsoleOutput, FileOutput, LogLevel, Output};

#[cfg(feature = "logging")]
#[doc(hidden)]
pub fn __log(level: LogLevel, message: std::fmt::Arguments) {
    logger::log_message(level, &message.to_string());
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::logging::__log($crate::logging::LogLevel::Debug, format_args!($($arg)*))
    };
}
#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::logging::__log($crate::logging::LogLevel::Info, format_args!($($arg)*))
    };
}
#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::logging::__log($crate::logging::LogLevel::Warning, format_args!($($arg)*))
    };
}
#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::logging::__log($crate::logging::LogLevel::Error, format_args!($($arg)*))
    };
}
#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {};
}
