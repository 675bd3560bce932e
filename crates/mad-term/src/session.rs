// SPDX-License-Identifier: MIT
//
// Terminal session — raw mode with guaranteed restoration.
//
// Safety: the real device uses `unsafe` for termios (tcgetattr,
// tcsetattr), ioctl (TIOCGWINSZ), isatty, and raw fd reads/writes. These
// are the standard POSIX interfaces for terminal control; each unsafe
// block is minimal.
#![allow(unsafe_code)]
//
// A `TerminalSession` owns the device it switched into raw mode and the
// attributes it found there. Restoration happens exactly once: through
// `release()`, or through `Drop` on early return, error propagation or
// unwinding. For the real stdin device two more paths exist. While a
// session is armed, a panic hook writes the restore sequence straight to
// fd 1 and puts the saved termios back before the default handler prints. Termination signals only set a
// flag (see `event_loop`), and the loop then leaves through the normal
// drop path.
//
// The device is behind the `Tty` trait so the whole lifecycle can run
// against an in-memory terminal in tests.

use std::io::{self, Read};
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once};

use tracing::{debug, error, info, warn};

use crate::attrs::Attributes;
use crate::error::TermError;

// ─── Size ───────────────────────────────────────────────────────────────────

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    /// Number of columns (width in character cells).
    pub cols: u16,
    /// Number of rows (height in character cells).
    pub rows: u16,
}

impl Size {
    /// Used when the terminal will not report its size.
    pub const FALLBACK: Self = Self { cols: 80, rows: 24 };
}

/// Query the current terminal size via `ioctl(TIOCGWINSZ)` on stdout.
///
/// Returns `None` if stdout is not a terminal or the query fails.
#[must_use]
pub fn terminal_size() -> Option<Size> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &raw mut ws) };

    if result == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some(Size {
            cols: ws.ws_col,
            rows: ws.ws_row,
        })
    } else {
        None
    }
}

// ─── Device Seam ────────────────────────────────────────────────────────────

/// A terminal whose line discipline can be queried and replaced.
pub trait Tty {
    /// Whether the device is a character device attached to a terminal.
    fn is_terminal(&self) -> bool;

    /// Read the current attribute set (`tcgetattr`).
    ///
    /// # Errors
    ///
    /// Returns the OS error if the query fails.
    fn get_attributes(&self) -> io::Result<Attributes>;

    /// Replace the attribute set (`tcsetattr`, flushing pending input).
    ///
    /// # Errors
    ///
    /// Returns the OS error if the device rejects the attributes.
    fn set_attributes(&mut self, attrs: &Attributes) -> io::Result<()>;

    /// Remember `original` for restore paths that cannot reach the
    /// session (panics). Called before any attribute is changed.
    fn arm_restore(&mut self, _original: &Attributes) {}

    /// Forget the attributes saved by [`arm_restore`](Self::arm_restore).
    fn disarm_restore(&mut self) {}
}

// ─── Panic-Safe Restore ─────────────────────────────────────────────────────

/// Backup of the original attributes for the panic hook, which cannot
/// reach the session that owns them.
static ATTRS_BACKUP: Mutex<Option<Attributes>> = Mutex::new(None);

/// Clear the screen and home the cursor. Written by the panic hook so the
/// panic message lands on an empty screen instead of a half-drawn frame.
const EMERGENCY_RESTORE: &[u8] = b"\x1b[?25h\x1b[2J\x1b[H";

static PANIC_HOOK_INSTALLED: Once = Once::new();

/// Install (once per process) a hook that restores the terminal before the
/// original panic handler prints.
fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            emergency_restore();
            original(info);
        }));
    });
}

/// Clear the screen and put the backed-up attributes back on stdin, if a
/// session is armed. Best-effort.
fn emergency_restore() {
    let Ok(guard) = ATTRS_BACKUP.lock() else {
        return;
    };
    let Some(original) = guard.as_ref() else {
        return;
    };

    // Bypass the stdout lock: the panic may have happened mid-frame.
    unsafe {
        let _ = libc::write(
            libc::STDOUT_FILENO,
            EMERGENCY_RESTORE.as_ptr().cast::<libc::c_void>(),
            EMERGENCY_RESTORE.len(),
        );
    }
    let termios = original.to_termios();
    unsafe {
        let _ = libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw const termios);
    }
}

// ─── StdinTty ───────────────────────────────────────────────────────────────

/// Set while a [`StdinTty`] exists.
static STDIN_CLAIMED: AtomicBool = AtomicBool::new(false);

/// The process's controlling terminal, reached through standard input.
///
/// Only one handle may exist at a time, so two sessions can never capture
/// each other's raw attributes as "original". Reads go straight to
/// `read(2)` on fd 0 with no userspace buffering, so the termios read
/// timeout is the only thing deciding when a read returns.
#[derive(Debug)]
pub struct StdinTty {
    fd: libc::c_int,
}

impl StdinTty {
    /// Claim standard input as the terminal device.
    ///
    /// # Errors
    ///
    /// Returns [`TermError::DeviceBusy`] if another handle is alive.
    pub fn open() -> Result<Self, TermError> {
        if STDIN_CLAIMED.swap(true, Ordering::AcqRel) {
            return Err(TermError::DeviceBusy);
        }
        Ok(Self {
            fd: libc::STDIN_FILENO,
        })
    }
}

impl Tty for StdinTty {
    fn is_terminal(&self) -> bool {
        unsafe { libc::isatty(self.fd) == 1 }
    }

    fn get_attributes(&self) -> io::Result<Attributes> {
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(self.fd, &raw mut termios) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Attributes::from_termios(&termios))
    }

    fn set_attributes(&mut self, attrs: &Attributes) -> io::Result<()> {
        let termios = attrs.to_termios();
        if unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &raw const termios) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn arm_restore(&mut self, original: &Attributes) {
        install_panic_hook();
        if let Ok(mut guard) = ATTRS_BACKUP.lock() {
            *guard = Some(*original);
        }
    }

    fn disarm_restore(&mut self) {
        if let Ok(mut guard) = ATTRS_BACKUP.lock() {
            *guard = None;
        }
    }
}

impl Read for StdinTty {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        #[allow(clippy::cast_sign_loss)] // n >= 0 checked above.
        let n = n as usize;
        Ok(n)
    }
}

impl Drop for StdinTty {
    fn drop(&mut self) {
        STDIN_CLAIMED.store(false, Ordering::Release);
    }
}

// ─── Session ────────────────────────────────────────────────────────────────

/// Raw-mode settings applied on acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a read waits for input, in tenths of a second (`VTIME`).
    pub read_timeout: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { read_timeout: 1 }
    }
}

/// A terminal held in raw mode.
///
/// Created by [`acquire`](Self::acquire); the original attributes are
/// restored by [`release`](Self::release) or, failing that, on drop.
/// The session owns its device, so the same device cannot be acquired
/// twice.
///
/// # Example
///
/// ```no_run
/// use mad_term::session::{SessionConfig, StdinTty, TerminalSession};
///
/// let tty = StdinTty::open()?;
/// let session = TerminalSession::acquire(tty, SessionConfig::default())?;
/// // ... read keys through the session ...
/// let tty = session.release()?;
/// # drop(tty);
/// # Ok::<(), mad_term::error::TermError>(())
/// ```
#[derive(Debug)]
pub struct TerminalSession<T: Tty> {
    device: T,
    /// Captured before raw mode; never modified afterwards.
    original: Attributes,
    active: bool,
}

impl<T: Tty> TerminalSession<T> {
    /// Switch `device` into raw mode.
    ///
    /// The restore hook is armed before anything changes. If applying the
    /// raw attributes fails, the original set is put back (best-effort)
    /// and the hook disarmed before the error is returned, so no partial
    /// raw state survives a failed acquisition.
    ///
    /// # Errors
    ///
    /// [`TermError::NotATerminal`] if the device is not a terminal;
    /// [`TermError::TerminalIo`] if querying or applying attributes fails.
    pub fn acquire(mut device: T, config: SessionConfig) -> Result<Self, TermError> {
        if !device.is_terminal() {
            return Err(TermError::NotATerminal);
        }

        let original = device
            .get_attributes()
            .map_err(|source| TermError::TerminalIo {
                op: "tcgetattr",
                source,
            })?;

        device.arm_restore(&original);

        let raw = original.make_raw(config.read_timeout);
        if let Err(source) = device.set_attributes(&raw) {
            if let Err(err) = device.set_attributes(&original) {
                warn!(%err, "could not roll back after failed tcsetattr");
            }
            device.disarm_restore();
            return Err(TermError::TerminalIo {
                op: "tcsetattr",
                source,
            });
        }

        info!(read_timeout = config.read_timeout, "terminal in raw mode");
        Ok(Self {
            device,
            original,
            active: true,
        })
    }

    /// The attributes the terminal had before raw mode.
    #[inline]
    #[must_use]
    pub const fn original(&self) -> &Attributes {
        &self.original
    }

    /// Whether raw mode is still in effect.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Restore the original attributes, end the session, and hand the
    /// device back. It can be acquired again.
    ///
    /// # Errors
    ///
    /// [`TermError::TerminalIo`] if the device rejects the original
    /// attributes. The session is finished either way, and the device is
    /// dropped.
    pub fn release(mut self) -> Result<T, TermError> {
        self.restore()?;

        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so `device` is moved out exactly
        // once. The remaining fields are `Copy`.
        Ok(unsafe { std::ptr::read(&this.device) })
    }

    fn restore(&mut self) -> Result<(), TermError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        let result = self.device.set_attributes(&self.original);
        self.device.disarm_restore();

        match result {
            Ok(()) => {
                info!("terminal restored");
                Ok(())
            }
            Err(source) => {
                error!(%source, "failed to restore terminal attributes");
                Err(TermError::TerminalIo {
                    op: "tcsetattr",
                    source,
                })
            }
        }
    }
}

impl<T: Tty + Read> Read for TerminalSession<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.device.read(buf)
    }
}

impl<T: Tty> Drop for TerminalSession<T> {
    fn drop(&mut self) {
        if self.active {
            debug!("session dropped while active, restoring");
            // Already logged inside restore(); nothing else to do here.
            let _ = self.restore();
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
