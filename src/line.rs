//! Line-oriented control protocol.
//!
//! One command per newline-terminated record. Command dispatch is an
//! exhaustive match over a typed [`Command`] enum rather than a map of
//! closures, so every handler and every parse failure has a test-reachable
//! name. Protocol output goes to the output stream, everything else (help,
//! errors, failure notices, leak warnings) to the error stream.
//!
//! The loop is generic over `tokio::io` readers and writers so whole
//! sessions run against in-memory streams in tests; the binary wires it to
//! stdin, stdout, and stderr.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::options::Options;
use crate::server::{ControlError, ControlState, RunRequest};

/// Help text, printed on request and for any unrecognized input.
const HELP: &str = "\
commands:
  help                      print this summary
  list                      print registered benchmark names
  run <name>[-N] <iters>    run a benchmark at parallelism N (default 1)
  set benchmem <bool>       force memory stats in run reports
  quit                      stop the server
";

/// A fully parsed command, one variant per handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Run(RunRequest),
    Set(Options),
    Quit,
}

/// Input that named a real command but carried unusable arguments.
///
/// Unknown command words are not an error; they fall back to [`Command::Help`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("usage: run <name>[-parallelism] <iterations>")]
    RunUsage,

    #[error("bad iteration count {0:?}")]
    BadIterations(String),

    #[error("parallelism must be positive")]
    ZeroParallelism,

    #[error("usage: set benchmem <true|false>")]
    SetUsage,

    #[error("unknown option {0:?}")]
    UnknownOption(String),

    #[error("bad bool value {0:?}")]
    BadBool(String),
}

/// Parse one input record into a [`Command`].
///
/// Empty input and unknown first tokens both map to `Help`; malformed
/// arguments to a recognized command yield the specific error instead.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.first().copied() {
        Some("help") => Ok(Command::Help),
        Some("list") => Ok(Command::List),
        Some("quit") | Some("exit") => Ok(Command::Quit),
        Some("run") => {
            if tokens.len() != 3 {
                return Err(ParseError::RunUsage);
            }
            let (name, parallelism) = split_parallelism(tokens[1])?;
            let iterations = tokens[2]
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ParseError::BadIterations(tokens[2].to_string()))?;
            Ok(Command::Run(RunRequest {
                name: name.to_string(),
                parallelism,
                iterations,
            }))
        }
        Some("set") => {
            if tokens.len() != 3 {
                return Err(ParseError::SetUsage);
            }
            if tokens[1] != "benchmem" {
                return Err(ParseError::UnknownOption(tokens[1].to_string()));
            }
            let benchmem = tokens[2]
                .parse::<bool>()
                .map_err(|_| ParseError::BadBool(tokens[2].to_string()))?;
            Ok(Command::Set(Options { benchmem }))
        }
        // Unknown or empty input is handled exactly like `help`.
        _ => Ok(Command::Help),
    }
}

/// Split the optional `-<parallelism>` suffix off a requested name.
///
/// The text after the last `-` counts as a degree only when it is entirely
/// ASCII digits; anything else stays part of the name. An explicit `-0` is a
/// user error, not a name.
fn split_parallelism(token: &str) -> Result<(&str, usize), ParseError> {
    if let Some((name, suffix)) = token.rsplit_once('-') {
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(degree) = suffix.parse::<usize>() {
                if degree == 0 {
                    return Err(ParseError::ZeroParallelism);
                }
                return Ok((name, degree));
            }
        }
    }
    Ok((token, 1))
}

/// How a session ended. Both ways exit the process cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The driver sent `quit` or `exit`.
    Quit,
    /// The input stream reached end-of-file.
    Eof,
}

/// Serve line-protocol commands until quit or end-of-input.
///
/// Returns `Err` only for I/O failures on the streams; the caller maps that
/// to the distinguished transport-fatal exit status. Every protocol-level
/// problem is written to `errors` and the loop continues.
pub async fn run_session<R, W, E>(
    state: &mut ControlState,
    input: R,
    mut output: W,
    mut errors: E,
) -> io::Result<SessionEnd>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => {
                debug!("input stream closed, ending session");
                return Ok(SessionEnd::Eof);
            }
        };

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                errors.write_all(format!("{}\n", e).as_bytes()).await?;
                errors.flush().await?;
                continue;
            }
        };

        match command {
            Command::Help => {
                errors.write_all(HELP.as_bytes()).await?;
            }
            Command::List => {
                let mut names = state.list();
                names.sort();
                for name in names {
                    output.write_all(name.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                }
                // Blank line marks end-of-list.
                output.write_all(b"\n").await?;
            }
            Command::Run(request) => match state.run(&request).await {
                Ok(outcome) => {
                    let benchmem = state.options().benchmem;
                    let report = outcome.result.report_line(&outcome.display_name, benchmem);
                    output.write_all(report.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    if let Some(degree) = outcome.leak {
                        errors
                            .write_all(
                                format!(
                                    "{} left parallelism set to {}\n",
                                    outcome.display_name, degree
                                )
                                .as_bytes(),
                            )
                            .await?;
                    }
                }
                Err(ControlError::Failed { display_name }) => {
                    errors
                        .write_all(format!("--- FAIL: {}\n", display_name).as_bytes())
                        .await?;
                }
                Err(e) => {
                    errors.write_all(format!("{}\n", e).as_bytes()).await?;
                }
            },
            Command::Set(options) => {
                state.set_options(options);
            }
            Command::Quit => {
                debug!("quit requested, ending session");
                return Ok(SessionEnd::Quit);
            }
        }

        output.flush().await?;
        errors.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("help"), Ok(Command::Help));
        assert_eq!(parse_command("list"), Ok(Command::List));
        assert_eq!(parse_command("quit"), Ok(Command::Quit));
        assert_eq!(parse_command("exit"), Ok(Command::Quit));
    }

    #[test]
    fn test_unknown_and_empty_input_fall_back_to_help() {
        assert_eq!(parse_command(""), Ok(Command::Help));
        assert_eq!(parse_command("   "), Ok(Command::Help));
        assert_eq!(parse_command("frobnicate now"), Ok(Command::Help));
    }

    #[test]
    fn test_parse_run_defaults_to_parallelism_one() {
        assert_eq!(
            parse_command("run alpha 100"),
            Ok(Command::Run(RunRequest {
                name: "alpha".to_string(),
                parallelism: 1,
                iterations: 100,
            }))
        );
    }

    #[test]
    fn test_parse_run_strips_parallelism_suffix() {
        assert_eq!(
            parse_command("run alpha-4 100"),
            Ok(Command::Run(RunRequest {
                name: "alpha".to_string(),
                parallelism: 4,
                iterations: 100,
            }))
        );
    }

    #[test]
    fn test_non_numeric_suffix_stays_in_the_name() {
        assert_eq!(
            parse_command("run alpha-beta 100"),
            Ok(Command::Run(RunRequest {
                name: "alpha-beta".to_string(),
                parallelism: 1,
                iterations: 100,
            }))
        );
        // Trailing dash is not a degree either.
        assert_eq!(
            parse_command("run alpha- 100"),
            Ok(Command::Run(RunRequest {
                name: "alpha-".to_string(),
                parallelism: 1,
                iterations: 100,
            }))
        );
    }

    #[test]
    fn test_parse_run_rejects_bad_arguments() {
        assert_eq!(parse_command("run alpha"), Err(ParseError::RunUsage));
        assert_eq!(
            parse_command("run alpha 1 extra"),
            Err(ParseError::RunUsage)
        );
        assert_eq!(
            parse_command("run alpha ten"),
            Err(ParseError::BadIterations("ten".to_string()))
        );
        assert_eq!(
            parse_command("run alpha 0"),
            Err(ParseError::BadIterations("0".to_string()))
        );
        assert_eq!(
            parse_command("run alpha -3"),
            Err(ParseError::BadIterations("-3".to_string()))
        );
        assert_eq!(
            parse_command("run alpha-0 10"),
            Err(ParseError::ZeroParallelism)
        );
    }

    #[test]
    fn test_parse_set() {
        assert_eq!(
            parse_command("set benchmem true"),
            Ok(Command::Set(Options { benchmem: true }))
        );
        assert_eq!(
            parse_command("set benchmem false"),
            Ok(Command::Set(Options { benchmem: false }))
        );
        assert_eq!(parse_command("set benchmem"), Err(ParseError::SetUsage));
        assert_eq!(
            parse_command("set cpuprofile on"),
            Err(ParseError::UnknownOption("cpuprofile".to_string()))
        );
        assert_eq!(
            parse_command("set benchmem yes"),
            Err(ParseError::BadBool("yes".to_string()))
        );
    }
}
