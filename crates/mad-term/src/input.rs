// SPDX-License-Identifier: MIT
//
// Input decoder.
//
// Turns the raw byte stream of a raw-mode terminal into one key event per
// call. The terminal is configured with VMIN=0 and a VTIME timeout, so a
// read returns zero bytes when nothing arrives in time; that becomes
// `KeyEvent::NoInput` and lets the caller's loop keep turning.
//
// # ESC ambiguity
//
// 0x1B is both the Escape key and the first byte of every escape
// sequence. After an ESC the decoder reads the follow-up bytes one at a
// time, each bounded by the same timeout. A terminal sends a whole
// sequence in one burst, so if the next byte is not there within the
// window the user pressed Escape on its own.
//
// Recognized sequences (VT100 / xterm):
//
// | Bytes                 | Key        |
// |-----------------------|------------|
// | `ESC [ A` / `ESC O A` | Up         |
// | `ESC [ B` / `ESC O B` | Down       |
// | `ESC [ C` / `ESC O C` | Right      |
// | `ESC [ D` / `ESC O D` | Left       |
// | `ESC [ H` / `ESC O H` | Home       |
// | `ESC [ F` / `ESC O F` | End        |
// | `ESC [ 1 ~`, `7 ~`    | Home       |
// | `ESC [ 2 ~`           | Insert     |
// | `ESC [ 3 ~`           | Delete     |
// | `ESC [ 4 ~`, `8 ~`    | End        |
// | `ESC [ 5 ~`           | Page Up    |
// | `ESC [ 6 ~`           | Page Down  |
//
// `ESC` followed by another printable byte is an Alt chord. Anything
// else, including a sequence cut short by the timeout, is reported as
// `Escape(Unknown)`.
//
// The decoder keeps nothing between calls. Every call starts from a
// clean slate, so it can be abandoned and restarted at any point.

use std::io::{self, Read};

use bitflags::bitflags;
use tracing::debug;

use crate::error::TermError;

/// The escape byte.
pub const ESC: u8 = 0x1B;

// ─── Event Types ────────────────────────────────────────────────────────────

/// One decoded keystroke, or the absence of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// A byte that is neither a control code nor ESC, passed through as-is.
    Character(u8),
    /// A key pressed together with Ctrl (control byte) or Alt (ESC prefix).
    ///
    /// For Ctrl chords `key` is the lower-case letter (or `@ [ \ ] ^ _`)
    /// whose low five bits equal the byte: 0x11 is Ctrl+`q`.
    ControlChord { key: char, modifiers: Modifiers },
    /// The Escape key or a recognized escape sequence.
    Escape(EscapeKind),
    /// The read timed out with no bytes.
    NoInput,
}

/// Keys reached through escape sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EscapeKind {
    /// A lone ESC, or a sequence we do not recognize.
    Unknown,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
}

bitflags! {
    /// Modifier keys held during a chord.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const CTRL = 0b0000_0001;
        const ALT  = 0b0000_0010;
    }
}

impl KeyEvent {
    /// Ctrl + `key`.
    #[inline]
    #[must_use]
    pub const fn ctrl(key: char) -> Self {
        Self::ControlChord {
            key,
            modifiers: Modifiers::CTRL,
        }
    }

    /// Alt + `key`.
    #[inline]
    #[must_use]
    pub const fn alt(key: char) -> Self {
        Self::ControlChord {
            key,
            modifiers: Modifiers::ALT,
        }
    }

    /// Whether this is exactly Ctrl + `key`.
    #[must_use]
    pub fn is_ctrl(self, key: char) -> bool {
        self == Self::ctrl(key)
    }

    /// Classify a single byte that is not part of an escape sequence.
    ///
    /// `0x00..=0x1F` become Ctrl chords (except ESC, which becomes a bare
    /// `Escape(Unknown)`); every other byte is a `Character`. A NUL byte
    /// is Ctrl+`@`, never confused with [`NoInput`](Self::NoInput).
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            ESC => Self::Escape(EscapeKind::Unknown),
            0x00..=0x1F => Self::ctrl(ctrl_base(byte)),
            _ => Self::Character(byte),
        }
    }
}

/// The key whose value masked to its low five bits is `byte`.
///
/// Letters come back lower-case: 0x01 -> `a`, 0x11 -> `q`, 0x00 -> `@`,
/// 0x1C..=0x1F -> `\ ] ^ _`.
const fn ctrl_base(byte: u8) -> char {
    ((byte & 0x1F) | 0x40).to_ascii_lowercase() as char
}

// ─── Decoder ────────────────────────────────────────────────────────────────

/// Longest escape sequence consumed as a single event, ESC included.
const MAX_SEQUENCE: usize = 16;

/// Bytes of an escape sequence consumed so far during one call.
///
/// Lives on the stack for a single [`Decoder::next_event`]. Bounds how far
/// a CSI sequence is read and is logged when the sequence is unrecognized.
#[derive(Debug, Default)]
struct RawReadState {
    buf: [u8; MAX_SEQUENCE],
    len: usize,
}

impl RawReadState {
    fn push(&mut self, byte: u8) {
        if self.len < self.buf.len() {
            self.buf[self.len] = byte;
            self.len += 1;
        }
    }

    const fn is_full(&self) -> bool {
        self.len == MAX_SEQUENCE
    }

    fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Reads key events from a byte source.
///
/// The source is expected to behave like a raw-mode terminal: `read()`
/// returning `Ok(0)` means the timeout elapsed with no input.
///
/// # Example
///
/// ```
/// use mad_term::input::{Decoder, EscapeKind, KeyEvent};
///
/// let mut decoder = Decoder::new(&b"\x1b[Ax\x11"[..]);
/// assert_eq!(decoder.next_event()?, KeyEvent::Escape(EscapeKind::Up));
/// assert_eq!(decoder.next_event()?, KeyEvent::Character(b'x'));
/// assert_eq!(decoder.next_event()?, KeyEvent::ctrl('q'));
/// assert_eq!(decoder.next_event()?, KeyEvent::NoInput);
/// # Ok::<(), mad_term::error::TermError>(())
/// ```
#[derive(Debug)]
pub struct Decoder<R> {
    src: R,
}

impl<R: Read> Decoder<R> {
    /// Decode events from `src`.
    #[must_use]
    pub const fn new(src: R) -> Self {
        Self { src }
    }

    /// The byte source.
    #[inline]
    pub const fn get_ref(&self) -> &R {
        &self.src
    }

    /// Give back the byte source.
    #[inline]
    pub fn into_inner(self) -> R {
        self.src
    }

    /// Decode the next key event.
    ///
    /// Blocks for at most the source's read timeout per byte read: one
    /// read for plain keys, one per byte of an escape sequence. A CSI
    /// sequence (`ESC [`) is consumed up to its final byte, so keys this
    /// decoder does not map (F5, Ctrl-arrows) still come out as a single
    /// `Escape(Unknown)`.
    ///
    /// # Errors
    ///
    /// [`TermError::Read`] on any read failure other than `WouldBlock`
    /// or `Interrupted`, which are retried.
    pub fn next_event(&mut self) -> Result<KeyEvent, TermError> {
        let Some(byte) = self.read_byte()? else {
            return Ok(KeyEvent::NoInput);
        };

        if byte == ESC {
            return self.decode_escape();
        }

        Ok(KeyEvent::from_byte(byte))
    }

    /// Read one byte. `None` means the read timed out.
    fn read_byte(&mut self) -> Result<Option<u8>, TermError> {
        let mut buf = [0u8; 1];
        loop {
            match self.src.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
                Err(e) => return Err(TermError::Read(e)),
            }
        }
    }

    /// Finish decoding after an ESC byte.
    fn decode_escape(&mut self) -> Result<KeyEvent, TermError> {
        let mut state = RawReadState::default();
        state.push(ESC);

        let Some(intro) = self.read_byte()? else {
            return Ok(KeyEvent::Escape(EscapeKind::Unknown));
        };
        state.push(intro);

        match intro {
            b'[' => self.decode_csi(state),
            b'O' => {
                let Some(letter) = self.read_byte()? else {
                    return Ok(unknown(&state));
                };
                state.push(letter);
                Ok(letter_key(letter).map_or_else(|| unknown(&state), KeyEvent::Escape))
            }
            ESC => Ok(unknown(&state)),
            b @ 0x20..=0x7E => Ok(KeyEvent::alt(b as char)),
            _ => Ok(unknown(&state)),
        }
    }

    /// Finish decoding after `ESC [`.
    ///
    /// Parameter and intermediate bytes (0x20..=0x3F) are collected until
    /// a final byte (0x40..=0x7E). A timeout, any other byte, or running
    /// past [`MAX_SEQUENCE`] ends the sequence as `Escape(Unknown)`.
    fn decode_csi(&mut self, mut state: RawReadState) -> Result<KeyEvent, TermError> {
        let final_byte = loop {
            if state.is_full() {
                return Ok(unknown(&state));
            }
            let Some(byte) = self.read_byte()? else {
                return Ok(unknown(&state));
            };
            state.push(byte);
            match byte {
                0x40..=0x7E => break byte,
                0x20..=0x3F => {}
                _ => return Ok(unknown(&state)),
            }
        };

        let seq = state.as_slice();
        let params = &seq[2..seq.len() - 1];
        let key = match params {
            [] => letter_key(final_byte),
            [digit] if final_byte == b'~' => tilde_key(*digit),
            _ => None,
        };
        Ok(key.map_or_else(|| unknown(&state), KeyEvent::Escape))
    }
}

/// `ESC [ <digit> ~` keys.
const fn tilde_key(digit: u8) -> Option<EscapeKind> {
    match digit {
        b'1' | b'7' => Some(EscapeKind::Home),
        b'2' => Some(EscapeKind::Insert),
        b'3' => Some(EscapeKind::Delete),
        b'4' | b'8' => Some(EscapeKind::End),
        b'5' => Some(EscapeKind::PageUp),
        b'6' => Some(EscapeKind::PageDown),
        _ => None,
    }
}

/// `ESC [ <letter>` and `ESC O <letter>` keys.
const fn letter_key(letter: u8) -> Option<EscapeKind> {
    match letter {
        b'A' => Some(EscapeKind::Up),
        b'B' => Some(EscapeKind::Down),
        b'C' => Some(EscapeKind::Right),
        b'D' => Some(EscapeKind::Left),
        b'H' => Some(EscapeKind::Home),
        b'F' => Some(EscapeKind::End),
        _ => None,
    }
}

fn unknown(state: &RawReadState) -> KeyEvent {
    debug!(bytes = ?state.as_slice(), "unrecognized escape sequence");
    KeyEvent::Escape(EscapeKind::Unknown)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
