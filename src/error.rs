use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::{os_text, quote};

/// Everything that can stop a swap. Every variant is terminal.
#[derive(Debug, Error)]
pub enum SwapError {
    /// Wrong operand count or an option we do not know.
    #[error("{0}")]
    Usage(UsageError),

    /// An operand's identity could not be resolved.
    #[error("failed to access {}: {}", quote(.path), os_text(.source))]
    Access {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The exchange primitive itself refused.
    #[error("cannot exchange {} and {}: {}", quote(.first), quote(.second), os_text(.source))]
    Exchange {
        first: PathBuf,
        second: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The non-atomic rename sequence broke part way through.
    #[error("{0}")]
    Fallback(#[from] FallbackError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("missing file operand")]
    MissingOperand,
    #[error("missing file operand after {}", quote(.0))]
    MissingOperandAfter(PathBuf),
    #[error("extra operand {}", quote(.0))]
    ExtraOperand(PathBuf),
    #[error("unrecognized option '{0}'")]
    UnrecognizedOption(String),
    #[error("{0}")]
    Invalid(String),
}

/// Failure of one step of the three-rename fallback.
///
/// `stranded` is set when a file was left under its temporary name and
/// has to be moved back by hand.
#[derive(Debug, Error)]
#[error("non-atomic exchange failed while renaming {} to {}: {}{}",
    quote(.from), quote(.to), os_text(.source), stranded_note(.stranded))]
pub struct FallbackError {
    pub from: PathBuf,
    pub to: PathBuf,
    pub stranded: Option<PathBuf>,
    #[source]
    pub source: io::Error,
}

fn stranded_note(stranded: &Option<PathBuf>) -> String {
    match stranded {
        Some(p) => format!(" (file left at {})", quote(p)),
        None => String::new(),
    }
}

impl From<UsageError> for SwapError {
    fn from(e: UsageError) -> Self {
        SwapError::Usage(e)
    }
}

impl SwapError {
    pub fn is_usage(&self) -> bool {
        matches!(self, SwapError::Usage(_))
    }

    /// Process exit status for this error. Failures are not told apart.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
