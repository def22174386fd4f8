//! Build error types.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons a build phase can fail.
///
/// These never leave the build job: the orchestrator turns them into a
/// `Stopped` outcome and a line in the output buffer.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Working directory aliases the source or output directory
    #[error("working directory {work} must differ from the {other} directory")]
    SafetyViolation { work: PathBuf, other: &'static str },

    /// Tool executable could not be located
    #[error("tool not found: {0}")]
    ToolNotFound(PathBuf),

    /// Launch requested without an engine executable
    #[error("no engine executable configured")]
    NoEngine,

    /// Process creation failed
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Copying into or out of the working directory failed
    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Build manifest could not be read or written
    #[error("build manifest error: {0}")]
    Manifest(#[from] crate::build::manifest::ManifestError),

    /// Other IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
