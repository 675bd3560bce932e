// SPDX-License-Identifier: MIT
//
// mad — a raw-mode terminal text editor skeleton.
//
// The binary wires the mad-term library to a minimal editor:
//
//   StdinTty → TerminalSession (raw mode) → Decoder → Editor::on_key
//   Editor::paint → OutputBuffer → stdout (one write per frame)
//
// The editor has no buffer yet. It draws a `~` on every row and quits on
// Ctrl-Q or `q`. Whatever happens (quit, fatal error, SIGTERM, panic) the
// terminal is handed back in the state it was found in.

mod config;

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::process;

use anyhow::Context;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

use mad_term::ansi;
use mad_term::error::TermError;
use mad_term::event_loop::{self, Action, App, EventLoop, Exit};
use mad_term::input::KeyEvent;
use mad_term::output::OutputBuffer;
use mad_term::session::{self, SessionConfig, Size, StdinTty, TerminalSession};

use crate::config::{Command, Config, USAGE};

/// Exit status for bad command-line arguments.
const EXIT_USAGE: i32 = 2;

/// Exit status for fatal terminal errors.
const EXIT_FAILURE: i32 = 1;

/// Drawn at the start of every row past the end of the (empty) buffer.
const EMPTY_ROW: &[u8] = b"~";

// ─── Editor ─────────────────────────────────────────────────────────────────

/// The editor state machine, such as it is.
#[derive(Debug, Default)]
struct Editor {
    /// The most recent key dispatched, for logging and tests.
    last_key: Option<KeyEvent>,
    /// Number of keys dispatched so far.
    keys_seen: u64,
}

impl Editor {
    fn new() -> Self {
        Self::default()
    }
}

impl App for Editor {
    fn on_key(&mut self, key: KeyEvent) -> Action {
        if key.is_ctrl('q') || key == KeyEvent::Character(b'q') {
            info!(?key, "quit requested");
            return Action::Quit;
        }

        self.keys_seen += 1;
        self.last_key = Some(key);
        debug!(?key, keys_seen = self.keys_seen, "key");
        Action::Continue
    }

    fn paint(&mut self, out: &mut OutputBuffer, size: Size) -> io::Result<()> {
        for row in 0..size.rows {
            out.write_all(EMPTY_ROW)?;
            ansi::clear_line(out)?;
            if row + 1 < size.rows {
                out.write_all(b"\r\n")?;
            }
        }
        Ok(())
    }
}

// ─── Logging ────────────────────────────────────────────────────────────────

/// Send tracing output to `path`, appending. Stdout belongs to the editor,
/// so without a log file nothing is logged at all.
fn init_logging(path: &Path, debug: bool) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;

    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("a global log subscriber is already installed")?;
    Ok(())
}

// ─── Entry point ────────────────────────────────────────────────────────────

/// Acquire the terminal, run the editor, and restore the terminal.
fn run(config: SessionConfig) -> Result<Exit, TermError> {
    let session = TerminalSession::acquire(StdinTty::open()?, config)?;
    let size = session::terminal_size().unwrap_or(Size::FALLBACK);
    info!(cols = size.cols, rows = size.rows, "terminal size");

    let mut event_loop = EventLoop::new(session, io::stdout(), size);
    let mut editor = Editor::new();
    let outcome = event_loop.run(&mut editor);
    let released = event_loop.finish();

    match (outcome, released) {
        (Ok(exit), Ok(_tty)) => Ok(exit),
        (Ok(_), Err(err)) | (Err(err), Ok(_)) => Err(err),
        (Err(err), Err(release_err)) => {
            error!(%release_err, "terminal restore failed after a fatal error");
            Err(err)
        }
    }
}

fn start(config: &Config) -> anyhow::Result<()> {
    if let Some(path) = &config.log_file {
        init_logging(path, config.debug)?;
    }
    info!(version = env!("CARGO_PKG_VERSION"), "mad starting");
    event_loop::install_termination_handlers();
    Ok(())
}

fn main() {
    let command = match config::parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("mad: {e:#}");
            eprintln!("{USAGE}");
            process::exit(EXIT_USAGE);
        }
    };

    let config = match command {
        Command::Help => {
            println!("{USAGE}");
            return;
        }
        Command::Version => {
            println!("mad {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Command::Run(config) => config,
    };

    if let Err(e) = start(&config) {
        eprintln!("mad: {e:#}");
        process::exit(EXIT_FAILURE);
    }

    match run(config.session) {
        Ok(exit) => {
            info!(code = exit.code(), "mad exiting");
            process::exit(exit.code());
        }
        Err(e) => {
            error!(error = %e, "fatal");
            let mut stdout = io::stdout();
            let _ = ansi::wipe(&mut stdout).and_then(|()| stdout.flush());
            eprintln!("mad: {e}");
            process::exit(EXIT_FAILURE);
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
