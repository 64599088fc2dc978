//! Working directory resolution.
//!
//! The scan path is resolved once into a [`BaseDir`], which every later stage
//! (git introspection, resolution, discovery) receives explicitly. The
//! process working directory is left alone, so nothing downstream depends on
//! hidden global state.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::PathError;

/// Absolute, canonical directory a scan operates in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseDir(PathBuf);

impl BaseDir {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for BaseDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for BaseDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Resolves `path` against the current directory into a [`BaseDir`].
///
/// An empty path means the current directory. On success `path` is cleared:
/// from then on the scan works relative to the returned base directory.
/// On failure `path` is left untouched.
pub fn resolve_working_directory(path: &mut PathBuf) -> Result<BaseDir, PathError> {
    let base = resolve(path)?;
    *path = PathBuf::new();
    Ok(base)
}

fn resolve(path: &Path) -> Result<BaseDir, PathError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(PathError::CurrentDir)?
            .join(path)
    };

    let canonical = absolute
        .canonicalize()
        .map_err(|source| PathError::Inaccessible {
            path: absolute.display().to_string(),
            source,
        })?;

    if !canonical.is_dir() {
        return Err(PathError::NotADirectory {
            path: canonical.display().to_string(),
        });
    }

    Ok(BaseDir(canonical))
}
