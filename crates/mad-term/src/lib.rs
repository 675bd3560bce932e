// SPDX-License-Identifier: MIT
//
// mad-term — terminal core for the mad editor.
//
// Owns everything between the editor and the tty: switching the terminal
// into raw mode and guaranteeing it comes back out, decoding the raw byte
// stream into key events, and writing whole frames in a single write.
//
// Like the rest of the stack this talks to the terminal directly through
// termios and ANSI escape sequences, with no TUI framework in between.
// The device sits behind the `session::Tty` trait so the full lifecycle,
// from acquire through decode to restore, can be exercised in memory.

pub mod ansi;
pub mod attrs;
pub mod error;
pub mod event_loop;
pub mod input;
pub mod output;
pub mod session;

#[cfg(test)]
mod testing;
