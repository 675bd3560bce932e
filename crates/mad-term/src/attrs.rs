// SPDX-License-Identifier: MIT
//
// Terminal attributes — a bit-exact copy of the termios record.
//
// `libc::termios` differs between platforms (field widths, `c_line` on
// Linux, the size of `c_cc`) and carries no `PartialEq`. `Attributes`
// mirrors every field into plain values so sessions can compare, log and
// test attribute sets without touching the OS. The conversion in both
// directions is lossless: flag words keep bits we have no name for, so
// restoring a captured record puts back exactly what was there.
//
// Flag words are widened to `u64` (tcflag_t is `u32` on Linux and
// `c_ulong` on the BSDs); narrowing back is exact because every value
// we store came from a tcflag_t in the first place.
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::unnecessary_cast
)]

use bitflags::bitflags;

/// Number of control characters in the `c_cc` array on this platform.
pub const NCCS: usize = libc::NCCS;

/// Index of the minimum-bytes-per-read control character.
pub const VMIN: usize = libc::VMIN;

/// Index of the read-timeout control character (tenths of a second).
pub const VTIME: usize = libc::VTIME;

// ─── Flag Words ─────────────────────────────────────────────────────────────

bitflags! {
    /// Input-mode flags (`c_iflag`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InputFlags: u64 {
        /// A break condition raises SIGINT.
        const BRKINT = libc::BRKINT as u64;
        /// Translate carriage return to newline on input.
        const ICRNL = libc::ICRNL as u64;
        /// Enable input parity checking.
        const INPCK = libc::INPCK as u64;
        /// Strip the eighth bit of every input byte.
        const ISTRIP = libc::ISTRIP as u64;
        /// Software flow control (Ctrl-S / Ctrl-Q) on output.
        const IXON = libc::IXON as u64;

        const _ = !0;
    }
}

bitflags! {
    /// Output-mode flags (`c_oflag`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OutputFlags: u64 {
        /// Implementation-defined output post-processing (`\n` -> `\r\n`).
        const OPOST = libc::OPOST as u64;

        const _ = !0;
    }
}

bitflags! {
    /// Control-mode flags (`c_cflag`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlFlags: u64 {
        /// Character size mask.
        const CSIZE = libc::CSIZE as u64;
        /// Eight bits per character.
        const CS8 = libc::CS8 as u64;

        const _ = !0;
    }
}

bitflags! {
    /// Local-mode flags (`c_lflag`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LocalFlags: u64 {
        /// Echo input characters.
        const ECHO = libc::ECHO as u64;
        /// Canonical (line-buffered) input.
        const ICANON = libc::ICANON as u64;
        /// Extended input processing (Ctrl-V, Ctrl-O on some systems).
        const IEXTEN = libc::IEXTEN as u64;
        /// Generate signals for INTR, QUIT and SUSP characters.
        const ISIG = libc::ISIG as u64;

        const _ = !0;
    }
}

// ─── Attributes ─────────────────────────────────────────────────────────────

/// A complete, comparable terminal attribute set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub input: InputFlags,
    pub output: OutputFlags,
    pub control: ControlFlags,
    pub local: LocalFlags,
    /// Control characters, indexed by `VMIN`, `VTIME`, `VINTR`, ...
    pub control_chars: [u8; NCCS],
    /// Line discipline (Linux only, always 0 elsewhere).
    pub line: u8,
    pub input_speed: u64,
    pub output_speed: u64,
}

impl Attributes {
    /// Derive the raw-mode configuration from these attributes.
    ///
    /// Input: no break-to-SIGINT, no CR-to-NL, no parity check, no
    /// eighth-bit stripping, no software flow control. Output: no
    /// post-processing. Control: eight-bit characters. Local: no echo,
    /// no canonical mode, no extended processing, no signal keys.
    ///
    /// Reads become non-blocking with a timeout: `VMIN = 0` and
    /// `VTIME = read_timeout` tenths of a second, so `read()` returns
    /// zero bytes when nothing arrives in time.
    #[must_use]
    pub fn make_raw(&self, read_timeout: u8) -> Self {
        let mut raw = *self;

        raw.input.remove(
            InputFlags::BRKINT
                | InputFlags::ICRNL
                | InputFlags::INPCK
                | InputFlags::ISTRIP
                | InputFlags::IXON,
        );
        raw.output.remove(OutputFlags::OPOST);
        raw.control.remove(ControlFlags::CSIZE);
        raw.control.insert(ControlFlags::CS8);
        raw.local.remove(
            LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::IEXTEN | LocalFlags::ISIG,
        );

        raw.control_chars[VMIN] = 0;
        raw.control_chars[VTIME] = read_timeout;

        raw
    }

    /// Whether these attributes describe a raw-mode configuration.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        !self.local.intersects(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG)
            && !self.output.contains(OutputFlags::OPOST)
            && self.control_chars[VMIN] == 0
    }

    /// The configured read timeout in tenths of a second.
    #[inline]
    #[must_use]
    pub const fn read_timeout(&self) -> u8 {
        self.control_chars[VTIME]
    }

    // ── termios conversion ──────────────────────────────────────────

    /// Copy every field of a `termios` record.
    #[must_use]
    pub fn from_termios(t: &libc::termios) -> Self {
        let mut control_chars = [0; NCCS];
        control_chars.copy_from_slice(&t.c_cc);

        #[cfg(any(target_os = "linux", target_os = "android"))]
        let line = t.c_line;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let line = 0;

        Self {
            input: InputFlags::from_bits_retain(t.c_iflag as u64),
            output: OutputFlags::from_bits_retain(t.c_oflag as u64),
            control: ControlFlags::from_bits_retain(t.c_cflag as u64),
            local: LocalFlags::from_bits_retain(t.c_lflag as u64),
            control_chars,
            line,
            input_speed: t.c_ispeed as u64,
            output_speed: t.c_ospeed as u64,
        }
    }

    /// Rebuild the `termios` record these attributes were copied from.
    #[must_use]
    #[allow(unsafe_code)]
    pub fn to_termios(&self) -> libc::termios {
        // SAFETY: termios is a plain C struct; all-zero is a valid value
        // and every field we know about is overwritten below.
        let mut t: libc::termios = unsafe { std::mem::zeroed() };

        t.c_iflag = self.input.bits() as libc::tcflag_t;
        t.c_oflag = self.output.bits() as libc::tcflag_t;
        t.c_cflag = self.control.bits() as libc::tcflag_t;
        t.c_lflag = self.local.bits() as libc::tcflag_t;
        t.c_cc.copy_from_slice(&self.control_chars);
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            t.c_line = self.line;
        }
        t.c_ispeed = self.input_speed as libc::speed_t;
        t.c_ospeed = self.output_speed as libc::speed_t;

        t
    }
}

/// A typical cooked-mode terminal, for tests.
#[cfg(test)]
pub(crate) fn cooked() -> Attributes {
    let mut control_chars = [0; NCCS];
    control_chars[VMIN] = 1;
    control_chars[VTIME] = 0;
    control_chars[libc::VINTR] = 0x03;
    control_chars[libc::VEOF] = 0x04;

    Attributes {
        input: InputFlags::BRKINT | InputFlags::ICRNL | InputFlags::IXON,
        output: OutputFlags::OPOST | OutputFlags::from_bits_retain(libc::ONLCR as u64),
        control: ControlFlags::CS8 | ControlFlags::from_bits_retain(libc::CREAD as u64),
        local: LocalFlags::ECHO
            | LocalFlags::ICANON
            | LocalFlags::IEXTEN
            | LocalFlags::ISIG
            | LocalFlags::from_bits_retain(libc::ECHOE as u64),
        control_chars,
        line: 0,
        input_speed: libc::B38400 as u64,
        output_speed: libc::B38400 as u64,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
