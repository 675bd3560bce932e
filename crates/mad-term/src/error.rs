// SPDX-License-Identifier: MIT
//
// Error type for the terminal core.
//
// Nothing here is retried: a terminal that refuses raw mode or a stdin
// that fails mid-read is an environment the editor cannot run in. Every
// variant carries enough to print "operation: system error" before exit.

use std::io;

use thiserror::Error;

/// Failures raised by the terminal session, the input decoder, and the
/// frame output path.
#[derive(Debug, Error)]
pub enum TermError {
    /// Standard input is not a character device.
    #[error("isatty: standard input is not a terminal")]
    NotATerminal,

    /// Querying or applying terminal attributes failed.
    #[error("{op}: {source}")]
    TerminalIo {
        /// The failing call (`tcgetattr` / `tcsetattr`).
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// A non-transient failure while reading input.
    #[error("read: {0}")]
    Read(#[source] io::Error),

    /// Writing a frame or control sequence to the output failed.
    #[error("write: {0}")]
    Write(#[source] io::Error),

    /// Another raw-mode handle on the same device is still alive.
    #[error("open: terminal device is already in use by this process")]
    DeviceBusy,
}

impl TermError {
    /// Name of the operation that failed, as shown to the user.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::NotATerminal => "isatty",
            Self::TerminalIo { op, .. } => *op,
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::DeviceBusy => "open",
        }
    }
}
