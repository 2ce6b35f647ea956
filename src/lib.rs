//! Atomically exchange two files.
//!
//! `swap A B` leaves the file that was at `A` reachable at `B` and the
//! other way round, in one step: nobody looking at the directory can see
//! either name missing. Only the name-to-file bindings move, the file
//! contents are never touched.
//!
//! The driver is linear: parse the command line, resolve both operands'
//! (device, inode) identity, stop early if they are the same file, and
//! otherwise call the exchange primitive exactly once.
use std::ffi::{OsStr, OsString};
use std::io::{self, Write};
use std::path::Path;

use log::debug;

pub mod cli;
pub mod error;
pub mod exchange;
pub mod identity;

pub use cli::{ExchangeRequest, Parsed};
pub use error::{FallbackError, SwapError, UsageError};
pub use exchange::{ExchangeMode, Method};
pub use identity::{FileIdentity, Operand};

/// Name used when argv\[0\] is absent or unusable.
pub const PROGRAM_NAME: &str = "swap";

/// Process-level configuration handed in by the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Prefix for diagnostics and the name shown in usage text.
    pub program_name: String,
}

impl Default for Invocation {
    fn default() -> Self {
        Invocation {
            program_name: PROGRAM_NAME.to_string(),
        }
    }
}

impl Invocation {
    /// Derive the program name from argv\[0\]'s final component.
    pub fn from_arg0(arg0: Option<&OsStr>) -> Self {
        let name = arg0
            .and_then(|a| Path::new(a).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty());
        match name {
            Some(program_name) => Invocation { program_name },
            None => Invocation::default(),
        }
    }

    pub fn try_help(&self) -> String {
        format!(
            "Try '{} --help' for more information.",
            self.program_name
        )
    }
}

/// How a run ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Help or version text to print.
    Info(String),
    /// Both operands are the same file; nothing was touched.
    SameFile,
    Exchanged(Method),
}

/// Run one invocation. `args` includes argv\[0\].
pub fn run<I, T>(invocation: &Invocation, args: I) -> Result<Outcome, SwapError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let request = match cli::parse(&invocation.program_name, args)? {
        Parsed::Info(text) => return Ok(Outcome::Info(text)),
        Parsed::Exchange(request) => request,
    };
    debug!(
        "operands: {} {}",
        request.first.display(),
        request.second.display()
    );

    let first = Operand::resolve(&request.first)?;
    let second = Operand::resolve(&request.second)?;
    debug!("identities: {:?} {:?}", first.identity, second.identity);

    if first.same_file(&second) {
        debug!("operands share an inode, nothing to exchange");
        return Ok(Outcome::SameFile);
    }

    let method = exchange::exchange(&first.path, &second.path, request.mode)?;
    debug!("exchanged via {method:?}");
    Ok(Outcome::Exchanged(method))
}

/// Run, print whatever the run produced, and return the exit status.
pub fn main_with_args<I, O, E>(args: I, out: &mut O, err: &mut E) -> i32
where
    I: IntoIterator<Item = OsString>,
    O: Write,
    E: Write,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let invocation = Invocation::from_arg0(args.first().map(OsString::as_os_str));

    match run(&invocation, args) {
        Ok(Outcome::Info(text)) => {
            if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
                let _ = writeln!(err, "{}: write error: {}", invocation.program_name, os_text(&e));
                return 1;
            }
            0
        }
        Ok(_) => 0,
        Err(e) => {
            let _ = writeln!(err, "{}: {e}", invocation.program_name);
            if e.is_usage() {
                let _ = writeln!(err, "{}", invocation.try_help());
            }
            e.exit_code()
        }
    }
}

pub(crate) fn quote<P: AsRef<Path> + ?Sized>(path: &P) -> String {
    format!("'{}'", path.as_ref().display())
}

/// The OS message of `e` without std's " (os error N)" suffix.
pub(crate) fn os_text(e: &io::Error) -> String {
    let text = e.to_string();
    match text.rfind(" (os error ") {
        Some(i) if text.ends_with(')') => text[..i].to_string(),
        _ => text,
    }
}
