use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};

use crate::error::UsageError;
use crate::exchange::ExchangeMode;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n\nWritten by ",
    env!("CARGO_PKG_AUTHORS"),
    "."
);

/// Atomically exchange TARGET1 and TARGET2.
#[derive(Parser, Debug)]
#[command(
    name = "swap",
    version,
    long_version = LONG_VERSION,
    disable_help_flag = true,
    disable_version_flag = true,
    infer_long_args = true
)]
pub struct Args {
    /// Display this help and exit
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Output version information and exit
    #[arg(long, action = ArgAction::Version)]
    version: Option<bool>,

    /// If the filesystem cannot exchange atomically, swap with three
    /// renames instead (NOT atomic, NOT crash-safe)
    #[arg(long = "non-atomic")]
    pub non_atomic: bool,

    /// The two files to exchange
    #[arg(value_name = "TARGET")]
    pub files: Vec<PathBuf>,
}

/// The pair of operands plus how they may be exchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRequest {
    pub first: PathBuf,
    pub second: PathBuf,
    pub mode: ExchangeMode,
}

/// What the command line asked for.
#[derive(Debug)]
pub enum Parsed {
    /// `--help` or `--version`: print this text and stop.
    Info(String),
    Exchange(ExchangeRequest),
}

fn command(program_name: &str) -> clap::Command {
    Args::command()
        .bin_name(program_name.to_string())
        .override_usage(format!(
            "{program_name} TARGET1 TARGET2\n       {program_name} OPTION"
        ))
}

/// Parse `args` (including argv\[0\]) into a request.
pub fn parse<I, T>(program_name: &str, args: I) -> Result<Parsed, UsageError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match command(program_name).try_get_matches_from(args) {
        Ok(m) => m,
        Err(e) => return clap_error(e),
    };
    let args = Args::from_arg_matches(&matches).map_err(|e| invalid(&e))?;
    let mode = if args.non_atomic {
        ExchangeMode::AllowNonAtomicFallback
    } else {
        ExchangeMode::Atomic
    };
    let (first, second) = operands(args.files)?;
    Ok(Parsed::Exchange(ExchangeRequest {
        first,
        second,
        mode,
    }))
}

/// Exactly two operands, or the diagnostic naming what is wrong.
pub fn operands(mut files: Vec<PathBuf>) -> Result<(PathBuf, PathBuf), UsageError> {
    match files.len() {
        0 => Err(UsageError::MissingOperand),
        1 => Err(UsageError::MissingOperandAfter(files.remove(0))),
        2 => {
            let second = files.remove(1);
            let first = files.remove(0);
            Ok((first, second))
        }
        _ => Err(UsageError::ExtraOperand(files.swap_remove(2))),
    }
}

fn clap_error(e: clap::Error) -> Result<Parsed, UsageError> {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            Ok(Parsed::Info(e.render().to_string()))
        }
        ErrorKind::UnknownArgument => match e.get(ContextKind::InvalidArg) {
            Some(ContextValue::String(arg)) => Err(UsageError::UnrecognizedOption(arg.clone())),
            _ => Err(invalid(&e)),
        },
        _ => Err(invalid(&e)),
    }
}

fn invalid(e: &clap::Error) -> UsageError {
    let rendered = e.render().to_string();
    let line = rendered.lines().next().unwrap_or_default();
    UsageError::Invalid(line.trim_start_matches("error: ").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(args: &[&str]) -> Result<Parsed, UsageError> {
        parse("swap", std::iter::once("swap").chain(args.iter().copied()))
    }

    #[test]
    fn two_operands() {
        match request(&["a", "b"]).unwrap() {
            Parsed::Exchange(req) => {
                assert_eq!(req.first, PathBuf::from("a"));
                assert_eq!(req.second, PathBuf::from("b"));
                assert_eq!(req.mode, ExchangeMode::Atomic);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn operand_count() {
        assert_eq!(request(&[]).unwrap_err(), UsageError::MissingOperand);
        assert_eq!(
            request(&["only"]).unwrap_err(),
            UsageError::MissingOperandAfter(PathBuf::from("only"))
        );
        assert_eq!(
            request(&["a", "b", "c", "d"]).unwrap_err(),
            UsageError::ExtraOperand(PathBuf::from("c"))
        );
    }

    #[test]
    fn non_atomic_is_opt_in() {
        match request(&["--non-atomic", "a", "b"]).unwrap() {
            Parsed::Exchange(req) => assert_eq!(req.mode, ExchangeMode::AllowNonAtomicFallback),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn double_dash_ends_options() {
        match request(&["--", "-a", "--help"]).unwrap() {
            Parsed::Exchange(req) => {
                assert_eq!(req.first, PathBuf::from("-a"));
                assert_eq!(req.second, PathBuf::from("--help"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_option() {
        assert_eq!(
            request(&["--bogus", "a", "b"]).unwrap_err(),
            UsageError::UnrecognizedOption("--bogus".to_string())
        );
    }

    #[test]
    fn help_and_version_are_info() {
        match request(&["--help"]).unwrap() {
            Parsed::Info(text) => {
                assert!(text.contains("swap TARGET1 TARGET2"));
                assert!(text.contains("Atomically exchange"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match request(&["--version"]).unwrap() {
            Parsed::Info(text) => assert!(text.contains(env!("CARGO_PKG_VERSION"))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unambiguous_long_prefixes() {
        match request(&["--ver"]).unwrap() {
            Parsed::Info(text) => assert!(text.contains(env!("CARGO_PKG_VERSION"))),
            other => panic!("unexpected {other:?}"),
        }
        match request(&["--he"]).unwrap() {
            Parsed::Info(text) => assert!(text.contains("TARGET1 TARGET2")),
            other => panic!("unexpected {other:?}"),
        }
        match request(&["--non", "a", "b"]).unwrap() {
            Parsed::Exchange(req) => assert_eq!(req.mode, ExchangeMode::AllowNonAtomicFallback),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_help_is_not_recognised() {
        assert!(matches!(
            request(&["-h"]).unwrap_err(),
            UsageError::UnrecognizedOption(_)
        ));
    }
}
