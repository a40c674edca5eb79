//! Error types for provisioning.
//!
//! Every variant is fatal to a run. Step actions propagate these through
//! `anyhow`, so callers can still `downcast_ref::<Error>()` on a failure.

use std::path::PathBuf;

/// The result type used by the engine layers.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while provisioning an image.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A subprocess exited with a non-zero status.
    #[error("'{program}' failed (exit code {exit_code}){}", format_tail(.stderr_tail))]
    ProcessFailure {
        /// Program (or `sh` / `runuser`) that was executed.
        program: String,
        /// Exit code, or -1 when terminated by a signal.
        exit_code: i32,
        /// Last lines written to stderr.
        stderr_tail: String,
    },

    /// A subprocess could not be started at all.
    #[error("failed to execute '{program}'. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An HTTP request returned a non-2xx status or failed in transport.
    #[error("download of {url} failed: {}", describe_download(.status_code, .message))]
    DownloadFailure {
        url: String,
        /// HTTP status, absent on transport errors.
        status_code: Option<u16>,
        message: String,
    },

    /// A file that must exist before editing was missing.
    #[error("file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    /// A file write refused to replace an existing file.
    #[error("file already exists: {}", .path.display())]
    AlreadyExists { path: PathBuf },

    /// Any other filesystem failure.
    #[error("{action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The step graph is not a DAG.
    #[error("cyclic dependency between steps: {}", .cycle.join(", "))]
    CyclicDependency {
        /// Steps that could not be ordered.
        cycle: Vec<String>,
    },

    /// A step names a prerequisite that was never declared.
    #[error("step '{step}' depends on unknown step '{prerequisite}'")]
    UnknownPrerequisite { step: String, prerequisite: String },

    /// Two steps were declared with the same identifier.
    #[error("step '{step}' declared more than once")]
    DuplicateStep { step: String },

    /// No release binary is published for this machine.
    #[error("{arch} is unsupported")]
    UnsupportedArchitecture { arch: String },

    /// A downloaded file did not match its published digest.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The target user name is not a portable POSIX login name.
    #[error("invalid user name '{name}': {reason}")]
    InvalidUserName { name: String, reason: &'static str },

    /// A step action failed; `cause` carries the step's own error chain.
    #[error("step '{step}' failed: {cause:#}")]
    StepFailed { step: String, cause: anyhow::Error },
}

impl Error {
    /// Identifier of the failing step, if this is a step failure.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Error::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

fn format_tail(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(":\n{}", tail)
    }
}

fn describe_download(status_code: &Option<u16>, message: &str) -> String {
    match status_code {
        Some(code) => format!("HTTP {} {}", code, message),
        None => message.to_string(),
    }
}
