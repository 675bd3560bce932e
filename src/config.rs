// SPDX-License-Identifier: MIT
//
// Command-line configuration.
//
// mad reads no config files and no environment variables. Everything that
// can be tuned comes in as a flag:
//
// | Flag                  | Effect                                        |
// |-----------------------|-----------------------------------------------|
// | `--log <path>`        | Append tracing output to `path`               |
// | `--debug`             | Log at DEBUG instead of INFO                  |
// | `--timeout <n>`       | Read timeout in tenths of a second (1..=255)  |
// | `-h`, `--help`        | Print usage and exit                          |
// | `-V`, `--version`     | Print the version and exit                    |

use std::path::PathBuf;

use anyhow::{Context, bail};
use mad_term::session::SessionConfig;

/// Usage text printed by `--help` and after argument errors.
pub const USAGE: &str = "\
usage: mad [--log <path>] [--debug] [--timeout <deciseconds>]

Options:
  --log <path>         append log output to <path>
  --debug              log at debug level (needs --log)
  --timeout <n>        key read timeout in tenths of a second, 1-255 [default: 1]
  -h, --help           print this help
  -V, --version        print the version

Press Ctrl-Q or q to quit.";

/// Settings for one run of the editor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    /// Raw-mode settings handed to the terminal session.
    pub session: SessionConfig,
    /// Where to write logs. Logging is off when `None`.
    pub log_file: Option<PathBuf>,
    /// Log at DEBUG level.
    pub debug: bool,
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Config),
    Help,
    Version,
}

/// Parse command-line arguments (without the program name).
///
/// # Errors
///
/// Returns an error for unknown flags, missing flag values, and timeouts
/// outside `1..=255`.
pub fn parse_args<I>(args: I) -> anyhow::Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut config = Config::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-V" | "--version" => return Ok(Command::Version),
            "--debug" => config.debug = true,
            "--log" => {
                let path = args.next().context("--log needs a file path")?;
                config.log_file = Some(PathBuf::from(path));
            }
            "--timeout" => {
                let value = args.next().context("--timeout needs a value")?;
                config.session.read_timeout = parse_timeout(&value)?;
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok(Command::Run(config))
}

/// A read timeout of 0 would turn every read into a busy poll.
fn parse_timeout(value: &str) -> anyhow::Result<u8> {
    let timeout: u8 = value
        .parse()
        .with_context(|| format!("invalid --timeout value: {value}"))?;
    if timeout == 0 {
        bail!("--timeout must be at least 1");
    }
    Ok(timeout)
}
