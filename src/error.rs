// Copyright (C) 2026 by GiGa infosystems

//! The error type shared by every stage of the pipeline

use std::io;
use std::path::PathBuf;

/// Everything that can make a comparison fail.
///
/// Every variant is reported the same way to the user, the distinction exists for callers & tests
/// that want to react to a specific stage failing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad or missing input, including packages that aren't registry dependencies of the project
    #[error("{0}")]
    InvalidInput(String),

    /// No published version satisfies the requested constraint
    #[error("no published version of `{name}` matches `{constraint}`")]
    NotFound { name: String, constraint: String },

    /// A package source could not be queried for the available versions
    #[error("failed to query {source_id}: {reason}")]
    Query { source_id: String, reason: String },

    /// The archive for a resolved version could not be downloaded
    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    /// A network request took longer than the configured timeout
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// An archive entry would be extracted outside of the target directory
    #[error("unsafe archive entry `{}`: {reason}", entry.display())]
    UnsafeArchive { entry: PathBuf, reason: &'static str },

    /// The archive could not be parsed
    #[error("corrupt archive {}: {reason}", archive.display())]
    CorruptArchive { archive: PathBuf, reason: String },

    /// The diff engine itself failed
    #[error("diff engine failed: {0}")]
    DiffEngine(String),

    #[error("failed to read the project metadata: {0}")]
    Metadata(#[from] cargo_metadata::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    pub(crate) fn corrupt(archive: &std::path::Path, reason: impl ToString) -> Self {
        Error::CorruptArchive {
            archive: archive.to_owned(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
