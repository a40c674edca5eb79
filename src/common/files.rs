//! Atomic file writes and idempotent in-place edits.
//!
//! All writes go through a temp file in the target's directory that is
//! flushed and renamed over the target, so a concurrent reader sees either
//! the old content or the new content and never a partial file. The temp
//! file is removed on every error path when the `NamedTempFile` drops.

use std::borrow::Cow;
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Permissions for newly written files unless a caller asks otherwise.
pub const DEFAULT_MODE: u32 = 0o644;

type ContentFn<'a> = Box<dyn Fn(&str) -> String + Send + Sync + 'a>;
type LineFn<'a> = Box<dyn Fn(&str) -> Option<String> + Send + Sync + 'a>;

/// How [`modify_file`] rewrites existing content.
pub enum Transform<'a> {
    /// Whole-content function: old content in, new content out.
    Content(ContentFn<'a>),
    /// Per-line functions. `None` passes the line through unchanged.
    ///
    /// Functions run in order; each sees the output of the previous one.
    Lines(Vec<LineFn<'a>>),
}

impl<'a> Transform<'a> {
    pub fn content(f: impl Fn(&str) -> String + Send + Sync + 'a) -> Self {
        Transform::Content(Box::new(f))
    }

    pub fn line(f: impl Fn(&str) -> Option<String> + Send + Sync + 'a) -> Self {
        Transform::Lines(vec![Box::new(f)])
    }

    /// Apply the transform to `content` without touching the filesystem.
    pub fn apply(&self, content: &str) -> String {
        match self {
            Transform::Content(f) => f(content),
            Transform::Lines(fns) => transform_lines(content, fns),
        }
    }
}

/// Whether [`modify_file`] had to rewrite the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Changed,
    Unchanged,
}

/// Apply line functions, keeping every line terminator byte-for-byte.
///
/// `\r\n` and `\n` terminators are preserved per line, as is the presence
/// or absence of a final newline.
fn transform_lines(content: &str, fns: &[LineFn<'_>]) -> String {
    let mut out = String::with_capacity(content.len());
    for segment in content.split_inclusive('\n') {
        let (body, terminator) = if let Some(body) = segment.strip_suffix("\r\n") {
            (body, "\r\n")
        } else if let Some(body) = segment.strip_suffix('\n') {
            (body, "\n")
        } else {
            (segment, "")
        };

        let mut line = Cow::Borrowed(body);
        for f in fns {
            if let Some(replaced) = f(&line) {
                line = Cow::Owned(replaced);
            }
        }
        out.push_str(&line);
        out.push_str(terminator);
    }
    out
}

/// Write a file, creating parent directories as needed.
///
/// # Errors
/// [`Error::AlreadyExists`] when `overwrite` is false and `path` exists;
/// the existing file is left untouched.
pub fn write_file<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C, overwrite: bool) -> Result<()> {
    write_file_mode(path, content, overwrite, DEFAULT_MODE)
}

/// Write a file with specific Unix permissions, creating parent directories as needed.
///
/// # Arguments
/// * `path` - Path to the file to write
/// * `content` - Content to write
/// * `overwrite` - Replace an existing file instead of failing
/// * `mode` - Unix permission bits (e.g., 0o644, 0o440)
pub fn write_file_mode<P: AsRef<Path>, C: AsRef<[u8]>>(
    path: P,
    content: C,
    overwrite: bool,
    mode: u32,
) -> Result<()> {
    let path = path.as_ref();
    if !overwrite && path.exists() {
        return Err(Error::AlreadyExists {
            path: path.to_path_buf(),
        });
    }

    let mut tmp = temp_file_beside(path)?;
    tmp.write_all(content.as_ref())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::io("failed to write temp file for", path, e))?;
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))
        .map_err(|e| Error::io("failed to set permissions for", path, e))?;

    persist(tmp, path, overwrite)?;
    tracing::debug!(path = %path.display(), "wrote file");
    Ok(())
}

/// Read-modify-write `path` with `transform`.
///
/// The file is only rewritten when the content actually changes, so
/// applying the same transform twice leaves the second run a no-op.
/// Existing permission bits are kept.
///
/// # Errors
/// [`Error::FileNotFound`] if `path` does not exist.
pub fn modify_file<P: AsRef<Path>>(path: P, transform: &Transform<'_>) -> Result<EditOutcome> {
    let path = path.as_ref();
    let original = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(Error::io("failed to read", path, e)),
    };

    let updated = transform.apply(&original);
    if updated == original {
        tracing::debug!(path = %path.display(), "already up to date");
        return Ok(EditOutcome::Unchanged);
    }

    let mode = fs::metadata(path)
        .map_err(|e| Error::io("failed to stat", path, e))?
        .permissions()
        .mode()
        & 0o7777;
    write_file_mode(path, updated, true, mode)?;
    Ok(EditOutcome::Changed)
}

/// Create a temp file in the directory that will hold `path`.
///
/// Same directory means same filesystem, so the final rename is atomic.
pub(crate) fn temp_file_beside(path: &Path) -> Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| Error::io("failed to create directory", parent, e))?;
    NamedTempFile::new_in(parent).map_err(|e| Error::io("failed to create temp file in", parent, e))
}

/// Rename a finished temp file onto `path`.
///
/// Without `overwrite` the rename itself refuses to clobber, so a file that
/// appeared after the existence check still is not replaced.
pub(crate) fn persist(tmp: NamedTempFile, path: &Path, overwrite: bool) -> Result<()> {
    let result = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    match result {
        Ok(_) => Ok(()),
        Err(e) if !overwrite && e.error.kind() == ErrorKind::AlreadyExists => {
            Err(Error::AlreadyExists {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(Error::io("failed to move file into place at", path, e.error)),
    }
}
