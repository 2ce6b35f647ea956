//! The exchange primitive and its non-atomic stand-in.
//!
//! On Linux the swap is a single `renameat2(RENAME_EXCHANGE)`, on Apple
//! platforms `renameatx_np(RENAME_SWAP)`; both are reached through
//! `rustix::fs::renameat_with`. The rename sequence in [`rename_sequence`]
//! is only ever used when the caller opted in and the kernel or filesystem
//! said it cannot exchange. It is not atomic and not crash-safe: an
//! interruption between its steps leaves one file under a temporary name.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use rustix::io::Errno;

use crate::error::{FallbackError, SwapError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeMode {
    /// Only the atomic primitive is tried.
    #[default]
    Atomic,
    /// Fall back to three renames if the primitive is unsupported.
    AllowNonAtomicFallback,
}

/// How a successful exchange was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Atomic,
    RenameSequence,
}

static NEXT_TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn errno_to_io(e: Errno) -> io::Error {
    io::Error::from_raw_os_error(e.raw_os_error())
}

/// Atomically exchange the directory entries `first` and `second`.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
))]
pub fn atomic_exchange(first: &Path, second: &Path) -> io::Result<()> {
    use rustix::fs::{renameat_with, RenameFlags, CWD};
    renameat_with(CWD, first, CWD, second, RenameFlags::EXCHANGE).map_err(errno_to_io)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
pub fn atomic_exchange(_first: &Path, _second: &Path) -> io::Result<()> {
    Err(errno_to_io(Errno::NOSYS))
}

/// Whether `err` means the primitive is not available here, as opposed to
/// the exchange itself being refused.
pub fn is_unsupported(err: &io::Error) -> bool {
    match Errno::from_io_error(err) {
        Some(e) => {
            e == Errno::INVAL || e == Errno::NOSYS || e == Errno::NOTSUP || e == Errno::OPNOTSUPP
        }
        None => err.kind() == io::ErrorKind::Unsupported,
    }
}

/// Exchange `first` and `second`, invoking the primitive exactly once.
pub fn exchange(first: &Path, second: &Path, mode: ExchangeMode) -> Result<Method, SwapError> {
    exchange_with(first, second, mode, atomic_exchange, |from, to| {
        fs::rename(from, to)
    })
}

fn exchange_with<X, R>(
    first: &Path,
    second: &Path,
    mode: ExchangeMode,
    primitive: X,
    rename: R,
) -> Result<Method, SwapError>
where
    X: FnOnce(&Path, &Path) -> io::Result<()>,
    R: FnMut(&Path, &Path) -> io::Result<()>,
{
    debug!(
        "exchanging {} and {} ({mode:?})",
        first.display(),
        second.display()
    );
    let source = match primitive(first, second) {
        Ok(()) => return Ok(Method::Atomic),
        Err(e) => e,
    };
    // EINVAL is also the kernel's answer for an entry and its own descendant.
    if mode == ExchangeMode::AllowNonAtomicFallback
        && is_unsupported(&source)
        && !is_nested(first, second)
    {
        warn!(
            "atomic exchange unavailable ({source}); using a non-atomic rename sequence, \
             an interruption can leave a file under a temporary name"
        );
        rename_sequence_with(first, second, rename)?;
        return Ok(Method::RenameSequence);
    }
    Err(SwapError::Exchange {
        first: first.to_path_buf(),
        second: second.to_path_buf(),
        source,
    })
}

/// The directory entry `path` names: its parent resolved, the last
/// component kept as given so a symlink operand stays the link.
fn entry_path(path: &Path) -> io::Result<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = fs::canonicalize(parent)?;
    Ok(match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    })
}

/// Whether one operand's entry lies inside the other's.
pub fn is_nested(first: &Path, second: &Path) -> bool {
    match (entry_path(first), entry_path(second)) {
        (Ok(a), Ok(b)) => a.starts_with(&b) || b.starts_with(&a),
        _ => false,
    }
}

/// Temporary name next to `path`, unique within this process.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let fname = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "target".to_string());
    let pid = std::process::id();
    let ctr = NEXT_TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    parent.join(format!(".{fname}.{pid}.{ctr}.swap-tmp"))
}

/// Swap with `first -> tmp`, `second -> first`, `tmp -> second`.
///
/// A failure in the second step moves `first` back. A failure in the third
/// leaves `first`'s original file at the temporary path, reported in
/// [`FallbackError::stranded`].
pub fn rename_sequence(first: &Path, second: &Path) -> Result<(), FallbackError> {
    rename_sequence_with(first, second, |from, to| fs::rename(from, to))
}

fn rename_sequence_with<R>(
    first: &Path,
    second: &Path,
    mut rename: R,
) -> Result<(), FallbackError>
where
    R: FnMut(&Path, &Path) -> io::Result<()>,
{
    let tmp = temp_path_for(first);
    if fs::symlink_metadata(&tmp).is_ok() {
        return Err(FallbackError {
            from: first.to_path_buf(),
            to: tmp,
            stranded: None,
            source: io::Error::from(io::ErrorKind::AlreadyExists),
        });
    }

    debug!("rename {} -> {}", first.display(), tmp.display());
    rename(first, &tmp).map_err(|source| FallbackError {
        from: first.to_path_buf(),
        to: tmp.clone(),
        stranded: None,
        source,
    })?;

    debug!("rename {} -> {}", second.display(), first.display());
    if let Err(source) = rename(second, first) {
        let stranded = match rename(&tmp, first) {
            Ok(()) => None,
            Err(undo) => {
                warn!("could not move {} back: {undo}", tmp.display());
                Some(tmp.clone())
            }
        };
        return Err(FallbackError {
            from: second.to_path_buf(),
            to: first.to_path_buf(),
            stranded,
            source,
        });
    }

    debug!("rename {} -> {}", tmp.display(), second.display());
    rename(&tmp, second).map_err(|source| FallbackError {
        from: tmp.clone(),
        to: second.to_path_buf(),
        stranded: Some(tmp.clone()),
        source,
    })
}
