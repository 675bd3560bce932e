// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Event loop — read a key, dispatch it, redraw.
//
// The loop is single-threaded and has exactly one suspension point: the
// decoder's read, which the terminal's VTIME setting bounds to a tenth of
// a second by default. When the read times out the app gets an idle tick
// and the loop checks whether a termination signal arrived. Nothing ever
// blocks longer than one timeout, so a signal is noticed within that
// window and the loop returns normally, letting the session restore the
// terminal on the regular path.
//
// # Frames
//
// Every frame hides the cursor, clears the screen, homes the cursor, lets
// the app paint, homes the cursor again and shows it. The whole frame goes
// out in one write through `OutputBuffer`. On the way out (quit, signal,
// or error) the screen is cleared and the cursor homed, so the shell
// prompt or the error message starts on a clean screen.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicI32, Ordering};

use tracing::{debug, info, warn};

use crate::ansi;
use crate::error::TermError;
use crate::input::{Decoder, KeyEvent};
use crate::output::OutputBuffer;
use crate::session::{Size, TerminalSession, Tty};

// ─── Termination Signals ─────────────────────────────────────────────────────

/// Last termination signal received, 0 if none. Set by the signal handler,
/// cleared by the loop when it acts on it.
static TERMINATION_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Install handlers for SIGTERM, SIGHUP and SIGQUIT.
///
/// The handler only stores the signal number in an atomic, which is
/// async-signal-safe. Restoring the terminal from inside a handler is not:
/// that is left to the loop, which exits through the normal drop path.
pub fn install_termination_handlers() {
    for signal in [libc::SIGTERM, libc::SIGHUP, libc::SIGQUIT] {
        unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            sa.sa_sigaction = termination_handler as *const () as usize;
            sa.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&raw mut sa.sa_mask);
            libc::sigaction(signal, &raw const sa, std::ptr::null_mut());
        }
    }
}

extern "C" fn termination_handler(sig: libc::c_int) {
    TERMINATION_SIGNAL.store(sig, Ordering::Relaxed);
}

// ─── App Trait ───────────────────────────────────────────────────────────────

/// What the application tells the event loop to do after handling a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Continue running.
    Continue,
    /// Exit the event loop cleanly.
    Quit,
}

/// Why the event loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The application asked to quit.
    Quit,
    /// A termination signal arrived.
    Terminated(i32),
}

impl Exit {
    /// Process exit status: 0 for a user quit, `128 + signal` otherwise.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Quit => 0,
            Self::Terminated(signal) => 128 + signal,
        }
    }
}

/// Application interface for the event loop.
pub trait App {
    /// Handle a decoded key. Never called with [`KeyEvent::NoInput`].
    ///
    /// Return [`Action::Quit`] to exit the event loop.
    fn on_key(&mut self, key: KeyEvent) -> Action;

    /// Called when a read times out with no input.
    ///
    /// Return `true` if state changed and a repaint is needed.
    fn on_idle(&mut self) -> bool {
        false
    }

    /// Paint the screen body. The screen has been cleared and the cursor
    /// homed before this is called.
    ///
    /// # Errors
    ///
    /// Propagates write errors from `out`.
    fn paint(&mut self, out: &mut OutputBuffer, size: Size) -> io::Result<()>;
}

// ─── EventLoop ───────────────────────────────────────────────────────────────

/// The read/dispatch/render loop.
///
/// Owns the raw-mode session (through the decoder that reads from it) and
/// the output the frames go to.
///
/// # Example
///
/// ```no_run
/// use std::io;
/// use mad_term::event_loop::{Action, App, EventLoop};
/// use mad_term::input::KeyEvent;
/// use mad_term::output::OutputBuffer;
/// use mad_term::session::{SessionConfig, Size, StdinTty, TerminalSession};
///
/// struct QuitOnQ;
///
/// impl App for QuitOnQ {
///     fn on_key(&mut self, key: KeyEvent) -> Action {
///         if key.is_ctrl('q') { Action::Quit } else { Action::Continue }
///     }
///
///     fn paint(&mut self, _out: &mut OutputBuffer, _size: Size) -> io::Result<()> {
///         Ok(())
///     }
/// }
///
/// let session = TerminalSession::acquire(StdinTty::open()?, SessionConfig::default())?;
/// let mut event_loop = EventLoop::new(session, io::stdout(), Size::FALLBACK);
/// let exit = event_loop.run(&mut QuitOnQ);
/// event_loop.finish()?;
/// exit?;
/// # Ok::<(), mad_term::error::TermError>(())
/// ```
pub struct EventLoop<T: Tty + Read, W: Write> {
    decoder: Decoder<TerminalSession<T>>,
    out: W,
    frame: OutputBuffer,
    size: Size,
    termination: &'static AtomicI32,
}

impl<T: Tty + Read, W: Write> EventLoop<T, W> {
    /// Create a loop reading from `session` and drawing `size`-sized
    /// frames to `out`.
    pub fn new(session: TerminalSession<T>, out: W, size: Size) -> Self {
        Self {
            decoder: Decoder::new(session),
            out,
            frame: OutputBuffer::new(),
            size,
            termination: &TERMINATION_SIGNAL,
        }
    }

    /// The frame size in use.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> Size {
        self.size
    }

    /// The raw-mode session the loop reads from.
    #[inline]
    pub const fn session(&self) -> &TerminalSession<T> {
        self.decoder.get_ref()
    }

    /// The output frames are written to.
    #[inline]
    pub const fn output(&self) -> &W {
        &self.out
    }

    /// Run until the app quits, a termination signal arrives, or I/O fails.
    ///
    /// The screen is cleared on every one of those paths. The session is
    /// left in raw mode; call [`finish`](Self::finish) (or drop the loop)
    /// to restore the terminal.
    ///
    /// # Errors
    ///
    /// [`TermError::Read`] if reading input fails, [`TermError::Write`] if
    /// writing a frame fails.
    pub fn run(&mut self, app: &mut impl App) -> Result<Exit, TermError> {
        let result = self.run_inner(app);

        match (result, self.wipe()) {
            (Ok(exit), Ok(())) => Ok(exit),
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(err), Err(wipe_err)) => {
                warn!(%wipe_err, "could not clear the screen after a fatal error");
                Err(err)
            }
        }
    }

    /// Restore the terminal, end the session, and hand the device back.
    ///
    /// # Errors
    ///
    /// [`TermError::TerminalIo`] if the original attributes cannot be put
    /// back.
    pub fn finish(self) -> Result<T, TermError> {
        self.decoder.into_inner().release()
    }

    fn run_inner(&mut self, app: &mut impl App) -> Result<Exit, TermError> {
        self.render(app)?;

        loop {
            let key = self.decoder.next_event()?;

            let dirty = if key == KeyEvent::NoInput {
                app.on_idle()
            } else {
                debug!(?key, "key");
                if app.on_key(key) == Action::Quit {
                    info!("quit requested");
                    return Ok(Exit::Quit);
                }
                true
            };

            let signal = self.termination.swap(0, Ordering::Relaxed);
            if signal != 0 {
                info!(signal, "termination signal received");
                return Ok(Exit::Terminated(signal));
            }

            if dirty {
                self.render(app)?;
            }
        }
    }

    fn render(&mut self, app: &mut impl App) -> Result<(), TermError> {
        self.frame.clear();
        compose(&mut self.frame, app, self.size).map_err(TermError::Write)?;
        self.frame
            .flush_to(&mut self.out)
            .map_err(TermError::Write)
    }

    fn wipe(&mut self) -> Result<(), TermError> {
        self.frame.clear();
        ansi::wipe(&mut self.frame).map_err(TermError::Write)?;
        ansi::cursor_show(&mut self.frame).map_err(TermError::Write)?;
        self.frame
            .flush_to(&mut self.out)
            .map_err(TermError::Write)
    }

    #[cfg(test)]
    fn with_termination_flag(mut self, flag: &'static AtomicI32) -> Self {
        self.termination = flag;
        self
    }
}

/// Build one frame in `frame`.
fn compose(frame: &mut OutputBuffer, app: &mut impl App, size: Size) -> io::Result<()> {
    ansi::cursor_hide(frame)?;
    ansi::wipe(frame)?;
    app.paint(frame, size)?;
    ansi::cursor_home(frame)?;
    ansi::cursor_show(frame)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::cooked;
    use crate::input::EscapeKind;
    use crate::session::SessionConfig;
    use crate::testing::FakeTty;
    use pretty_assertions::assert_eq;

    const SIZE: Size = Size { cols: 10, rows: 3 };

    /// Records every key; quits on Ctrl-Q.
    #[derive(Default)]
    struct Recorder {
        keys: Vec<KeyEvent>,
        idles: usize,
        paints: usize,
    }

    impl App for Recorder {
        fn on_key(&mut self, key: KeyEvent) -> Action {
            self.keys.push(key);
            if key.is_ctrl('q') {
                Action::Quit
            } else {
                Action::Continue
            }
        }

        fn on_idle(&mut self) -> bool {
            self.idles += 1;
            false
        }

        fn paint(&mut self, out: &mut OutputBuffer, size: Size) -> io::Result<()> {
            self.paints += 1;
            for _ in 0..size.rows {
                out.write_all(b"~")?;
            }
            Ok(())
        }
    }

    /// A writer that always fails.
    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn event_loop(tty: &FakeTty) -> EventLoop<FakeTty, Vec<u8>> {
        static NEVER: AtomicI32 = AtomicI32::new(0);
        let session = TerminalSession::acquire(tty.clone(), SessionConfig::default()).unwrap();
        EventLoop::new(session, Vec::new(), SIZE).with_termination_flag(&NEVER)
    }

    fn output_str<T: Tty + Read>(event_loop: &EventLoop<T, Vec<u8>>) -> String {
        String::from_utf8_lossy(event_loop.output()).into_owned()
    }

    // ── Exit ────────────────────────────────────────────────────────

    #[test]
    fn exit_codes() {
        assert_eq!(Exit::Quit.code(), 0);
        assert_eq!(Exit::Terminated(libc::SIGTERM).code(), 128 + libc::SIGTERM);
    }

    // ── End to end ──────────────────────────────────────────────────

    #[test]
    fn ctrl_q_quits_and_restores() {
        let tty = FakeTty::new(cooked()).with_input(&[0x11]);
        let mut event_loop = event_loop(&tty);
        let mut app = Recorder::default();

        let exit = event_loop.run(&mut app).unwrap();
        assert_eq!(exit, Exit::Quit);
        assert_eq!(exit.code(), 0);
        assert_eq!(app.keys, vec![KeyEvent::ctrl('q')]);

        assert!(tty.current().is_raw());
        event_loop.finish().unwrap();
        assert_eq!(tty.current(), cooked());
    }

    #[test]
    fn arrow_up_is_dispatched_once() {
        let tty = FakeTty::new(cooked()).with_input(b"\x1b[A\x11");
        let mut event_loop = event_loop(&tty);
        let mut app = Recorder::default();

        event_loop.run(&mut app).unwrap();
        assert_eq!(
            app.keys,
            vec![KeyEvent::Escape(EscapeKind::Up), KeyEvent::ctrl('q')]
        );
    }

    #[test]
    fn timeouts_become_idle_ticks() {
        let tty = FakeTty::new(cooked());
        tty.push_input(b"");
        tty.push_input(b"");
        tty.push_input(b"\x11");
        let mut event_loop = event_loop(&tty);
        let mut app = Recorder::default();

        event_loop.run(&mut app).unwrap();
        assert_eq!(app.idles, 2);
        assert_eq!(app.keys.len(), 1);
        // Idle ticks that report no change do not repaint.
        assert_eq!(app.paints, 1);
    }

    #[test]
    fn each_key_repaints() {
        let tty = FakeTty::new(cooked()).with_input(b"ab\x11");
        let mut event_loop = event_loop(&tty);
        let mut app = Recorder::default();

        event_loop.run(&mut app).unwrap();
        // First frame plus one per non-quitting key.
        assert_eq!(app.paints, 3);
    }

    #[test]
    fn first_frame_layout() {
        let tty = FakeTty::new(cooked()).with_input(&[0x11]);
        let mut event_loop = event_loop(&tty);
        event_loop.run(&mut Recorder::default()).unwrap();

        let out = output_str(&event_loop);
        assert!(
            out.starts_with("\x1b[?25l\x1b[2J\x1b[H~~~\x1b[H\x1b[?25h"),
            "got {out:?}"
        );
    }

    #[test]
    fn quit_clears_screen() {
        let tty = FakeTty::new(cooked()).with_input(&[0x11]);
        let mut event_loop = event_loop(&tty);
        event_loop.run(&mut Recorder::default()).unwrap();

        assert!(output_str(&event_loop).ends_with("\x1b[2J\x1b[H\x1b[?25h"));
    }

    #[test]
    fn read_error_clears_screen_and_propagates() {
        let tty = FakeTty::new(cooked());
        tty.push_error(io::ErrorKind::BrokenPipe);
        let mut event_loop = event_loop(&tty);

        let err = event_loop.run(&mut Recorder::default()).unwrap_err();
        assert!(matches!(err, TermError::Read(_)));
        assert!(output_str(&event_loop).ends_with("\x1b[2J\x1b[H\x1b[?25h"));

        event_loop.finish().unwrap();
        assert_eq!(tty.current(), cooked());
    }

    #[test]
    fn dropping_the_loop_restores() {
        let tty = FakeTty::new(cooked());
        tty.push_error(io::ErrorKind::BrokenPipe);
        {
            let mut event_loop = event_loop(&tty);
            let _ = event_loop.run(&mut Recorder::default());
        }
        assert_eq!(tty.current(), cooked());
    }

    #[test]
    fn write_error_is_fatal() {
        let tty = FakeTty::new(cooked()).with_input(b"x");
        let session = TerminalSession::acquire(tty.clone(), SessionConfig::default()).unwrap();
        let mut event_loop = EventLoop::new(session, Broken, SIZE);

        let err = event_loop.run(&mut Recorder::default()).unwrap_err();
        assert!(matches!(err, TermError::Write(_)));
        event_loop.finish().unwrap();
        assert_eq!(tty.current(), cooked());
    }

    #[test]
    fn termination_signal_stops_the_loop() {
        static FLAG: AtomicI32 = AtomicI32::new(0);
        let tty = FakeTty::new(cooked());
        let session = TerminalSession::acquire(tty.clone(), SessionConfig::default()).unwrap();
        let mut event_loop =
            EventLoop::new(session, Vec::new(), SIZE).with_termination_flag(&FLAG);

        FLAG.store(libc::SIGTERM, Ordering::Relaxed);
        let exit = event_loop.run(&mut Recorder::default()).unwrap();

        assert_eq!(exit, Exit::Terminated(libc::SIGTERM));
        assert_eq!(FLAG.load(Ordering::Relaxed), 0);
        event_loop.finish().unwrap();
        assert_eq!(tty.current(), cooked());
    }

    #[test]
    fn sighup_reaches_the_loop() {
        install_termination_handlers();
        let tty = FakeTty::new(cooked());
        let session = TerminalSession::acquire(tty.clone(), SessionConfig::default()).unwrap();
        let mut event_loop = EventLoop::new(session, Vec::new(), SIZE);

        // raise() runs the handler on this thread before returning.
        assert_eq!(unsafe { libc::raise(libc::SIGHUP) }, 0);
        assert_eq!(TERMINATION_SIGNAL.load(Ordering::Relaxed), libc::SIGHUP);

        let exit = event_loop.run(&mut Recorder::default()).unwrap();
        assert_eq!(exit, Exit::Terminated(libc::SIGHUP));
        assert_eq!(exit.code(), 128 + libc::SIGHUP);
        assert_eq!(TERMINATION_SIGNAL.load(Ordering::Relaxed), 0);

        event_loop.finish().unwrap();
        assert_eq!(tty.current(), cooked());
    }

    #[test]
    fn session_stays_active_until_finish() {
        let tty = FakeTty::new(cooked()).with_input(&[0x11]);
        let mut event_loop = event_loop(&tty);
        event_loop.run(&mut Recorder::default()).unwrap();
        assert!(event_loop.session().is_active());
        assert_eq!(event_loop.size(), SIZE);
    }

    // ── App defaults ────────────────────────────────────────────────

    #[test]
    fn app_default_on_idle_is_clean() {
        struct Minimal;
        impl App for Minimal {
            fn on_key(&mut self, _key: KeyEvent) -> Action {
                Action::Continue
            }
            fn paint(&mut self, _out: &mut OutputBuffer, _size: Size) -> io::Result<()> {
                Ok(())
            }
        }
        assert!(!Minimal.on_idle());
    }
}
