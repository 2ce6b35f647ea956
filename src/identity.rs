use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::error::SwapError;

/// The (device, inode) pair naming the file object behind a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub dev: u64,
    pub ino: u64,
}

impl FileIdentity {
    /// Resolve the identity of `path`, following symlinks (`stat`, not `lstat`).
    pub fn of(path: &Path) -> Result<Self, SwapError> {
        let meta = fs::metadata(path).map_err(|source| SwapError::Access {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(FileIdentity {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }
}

/// A path given on the command line together with its resolved identity.
#[derive(Debug, Clone)]
pub struct Operand {
    pub path: PathBuf,
    pub identity: FileIdentity,
}

impl Operand {
    pub fn resolve(path: &Path) -> Result<Self, SwapError> {
        let identity = FileIdentity::of(path)?;
        Ok(Operand {
            path: path.to_path_buf(),
            identity,
        })
    }

    pub fn same_file(&self, other: &Operand) -> bool {
        self.identity == other.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn hardlink_and_symlink_share_identity() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a");
        fs::write(&file, "x").unwrap();
        let hard = dir.path().join("hard");
        fs::hard_link(&file, &hard).unwrap();
        let soft = dir.path().join("soft");
        symlink(&file, &soft).unwrap();

        let id = FileIdentity::of(&file).unwrap();
        assert_eq!(id, FileIdentity::of(&hard).unwrap());
        assert_eq!(id, FileIdentity::of(&soft).unwrap());
    }

    #[test]
    fn distinct_files_differ() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "x").unwrap();
        fs::write(&b, "x").unwrap();
        let a = Operand::resolve(&a).unwrap();
        let b = Operand::resolve(&b).unwrap();
        assert!(!a.same_file(&b));
        assert!(a.same_file(&a.clone()));
    }

    #[test]
    fn broken_symlink_is_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("dangling");
        symlink(dir.path().join("nowhere"), &link).unwrap();
        match FileIdentity::of(&link) {
            Err(SwapError::Access { path, .. }) => assert_eq!(path, link),
            other => panic!("expected access error, got {other:?}"),
        }
    }
}
