//! Error types for the shrink pipeline.
//!
//! Every failure is fatal for the run that produced it. The CLI maps each
//! variant to a process exit code via [`ShrinkError::exit_code`].

use crate::pipeline::Stage;
use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the core
pub type Result<T> = std::result::Result<T, ShrinkError>;

/// Failures raised by the indexing, extraction, resolution and writing stages
#[derive(Error, Diagnostic, Debug)]
pub enum ShrinkError {
    /// The input archive could not be read from disk
    #[error("Failed to read archive {}", path.display())]
    #[diagnostic(code(jarprune::archive_unreadable))]
    ArchiveUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The container structure (central directory, local headers) is invalid
    #[error("Archive is corrupt: {reason}")]
    #[diagnostic(
        code(jarprune::archive_corrupt),
        help("the input must be a single-disk, non-ZIP64, unencrypted ZIP/JAR archive")
    )]
    ArchiveCorrupt { reason: String },

    /// A `.class` member failed structural validation
    #[error("Malformed class file `{member}`: {reason}")]
    #[diagnostic(
        code(jarprune::malformed_class),
        help("use `--on-malformed treat-as-resource` to keep going; its references will not be followed")
    )]
    MalformedClass { member: String, reason: String },

    /// No entry point was declared and the manifest has no `Main-Class`
    #[error("No entry point declared and the archive manifest has no Main-Class")]
    #[diagnostic(code(jarprune::missing_entry_point), help("pass one with `--entry-point`"))]
    MissingEntryPoint,

    /// The declared entry point is not a class in the archive
    #[error("Entry point `{entry_point}` is not present in the archive")]
    #[diagnostic(code(jarprune::unknown_entry_point))]
    UnknownEntryPoint { entry_point: String },

    /// A keep pattern could not be compiled
    #[error("Invalid keep pattern `{pattern}`")]
    #[diagnostic(code(jarprune::invalid_pattern))]
    InvalidKeepPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// I/O failure while producing the output archive
    #[error("Failed to write output archive {}", path.display())]
    #[diagnostic(code(jarprune::write_error))]
    ArchiveWriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The shared cancellation token was tripped
    #[error("Run cancelled during {stage}")]
    #[diagnostic(code(jarprune::cancelled))]
    Cancelled { stage: Stage },
}

impl ShrinkError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        ShrinkError::ArchiveCorrupt {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(member: &str, reason: impl Into<String>) -> Self {
        ShrinkError::MalformedClass {
            member: member.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ShrinkError::ArchiveWriteError {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            ShrinkError::ArchiveUnreadable { .. } | ShrinkError::ArchiveCorrupt { .. } => 2,
            ShrinkError::MalformedClass { .. } => 3,
            ShrinkError::MissingEntryPoint
            | ShrinkError::UnknownEntryPoint { .. }
            | ShrinkError::InvalidKeepPattern { .. } => 4,
            ShrinkError::ArchiveWriteError { .. } => 5,
            ShrinkError::Cancelled { .. } => 130,
        }
    }
}
