// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Diagnostic messages emitted by a [`StorageArray`].
//!
//! The array never writes to a global logger by itself. Instead, every array holds the
//! [`ArrayLogger`] it was given in its [`StorageArrayCreateInfo`] and reports through it. The
//! default, [`LogForwarder`], passes the messages on to the [`log`] facade under the
//! `storage_array` target, so that they show up in whatever logger the application installed.
//!
//! Any function taking a [`MessageSeverity`] and the formatted message can be used as a logger:
//!
//! ```
//! use std::{fmt, sync::Arc};
//! use storage_array::{MessageSeverity, StorageArrayCreateInfo};
//!
//! fn print_message(severity: MessageSeverity, args: fmt::Arguments<'_>) {
//!     eprintln!("[{:?}] {}", severity, args);
//! }
//!
//! let create_info = StorageArrayCreateInfo {
//!     logger: Arc::new(print_message),
//!     ..Default::default()
//! };
//! ```
//!
//! [`StorageArray`]: crate::StorageArray
//! [`StorageArrayCreateInfo`]: crate::StorageArrayCreateInfo

use std::fmt;

/// Severity of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageSeverity {
    /// An operation failed. The array is still in a valid state.
    Error,
    /// Something unexpected happened that was handled, such as data being discarded.
    Warning,
    /// A configuration was committed.
    Info,
    /// Layout details.
    Debug,
}

impl From<MessageSeverity> for log::Level {
    #[inline]
    fn from(val: MessageSeverity) -> Self {
        match val {
            MessageSeverity::Error => log::Level::Error,
            MessageSeverity::Warning => log::Level::Warn,
            MessageSeverity::Info => log::Level::Info,
            MessageSeverity::Debug => log::Level::Debug,
        }
    }
}

/// Receives the diagnostic messages of a [`StorageArray`].
///
/// The logger is called while the array holds one of its locks, so it must not call back into
/// the array.
///
/// [`StorageArray`]: crate::StorageArray
pub trait ArrayLogger: Send + Sync {
    fn log(&self, severity: MessageSeverity, args: fmt::Arguments<'_>);
}

impl<F> ArrayLogger for F
where
    F: Fn(MessageSeverity, fmt::Arguments<'_>) + Send + Sync,
{
    #[inline]
    fn log(&self, severity: MessageSeverity, args: fmt::Arguments<'_>) {
        self(severity, args)
    }
}

/// Forwards messages to the [`log`] crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogForwarder;

impl ArrayLogger for LogForwarder {
    #[inline]
    fn log(&self, severity: MessageSeverity, args: fmt::Arguments<'_>) {
        log::log!(target: "storage_array", log::Level::from(severity), "{}", args);
    }
}

/// Discards every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl ArrayLogger for NoopLogger {
    #[inline]
    fn log(&self, _severity: MessageSeverity, _args: fmt::Arguments<'_>) {}
}

macro_rules! array_log {
    ($logger:expr, $severity:ident, $($arg:tt)+) => {
        $crate::logger::ArrayLogger::log(
            &*$logger,
            $crate::logger::MessageSeverity::$severity,
            format_args!($($arg)+),
        )
    };
}

pub(crate) use array_log;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::RecordingLogger;

    fn discard(_severity: MessageSeverity, _args: fmt::Arguments<'_>) {}

    #[test]
    fn functions_are_loggers() {
        let logger: &dyn ArrayLogger = &discard;
        array_log!(logger, Error, "unused {}", 0);
    }

    #[test]
    fn macro_formats_messages() {
        let recorder = RecordingLogger::default();

        array_log!(&recorder, Warning, "dropped {} bytes", 12);
        array_log!(&recorder, Debug, "layout");

        assert_eq!(
            recorder.messages(),
            [
                (MessageSeverity::Warning, "dropped 12 bytes".to_owned()),
                (MessageSeverity::Debug, "layout".to_owned()),
            ],
        );
    }

    #[test]
    fn severity_maps_to_log_levels() {
        assert_eq!(log::Level::from(MessageSeverity::Error), log::Level::Error);
        assert_eq!(log::Level::from(MessageSeverity::Warning), log::Level::Warn);
        assert_eq!(log::Level::from(MessageSeverity::Info), log::Level::Info);
        assert_eq!(log::Level::from(MessageSeverity::Debug), log::Level::Debug);
    }

    #[test]
    fn forwarder_and_noop_do_not_panic_without_a_logger() {
        LogForwarder.log(MessageSeverity::Info, format_args!("committed"));
        NoopLogger.log(MessageSeverity::Error, format_args!("ignored"));
    }
}
