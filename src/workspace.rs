// Copyright (C) 2026 by GiGa infosystems

//! A private scratch directory per comparison, see [`Workspace`] & [`with_workspace`]

use crate::cleanup::{self, SharedCleanupContext};
use crate::error::Result;
use log::{debug, warn};
use std::io;
use std::path::Path;
use tempfile::TempDir;

const PREFIX: &str = "cargo-depdiff-";

/// A uniquely named, initially empty directory that is removed again when the workspace is closed
/// or dropped.
///
/// If a [`SharedCleanupContext`] is given, the directory is registered with it while it exists,
/// so that an interruption handler can remove it.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    cleanup: Option<SharedCleanupContext>,
}

impl Workspace {
    /// Create a workspace in `parent`, or in the system's temporary directory
    pub fn create(parent: Option<&Path>, cleanup: Option<SharedCleanupContext>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };

        debug!("Created workspace {:?}", dir.path());
        if let Some(ref cleanup) = cleanup {
            cleanup::lock(cleanup).add(dir.path().to_owned());
        }

        Ok(Workspace {
            dir: Some(dir),
            cleanup,
        })
    }

    pub fn path(&self) -> &Path {
        match self.dir {
            Some(ref dir) => dir.path(),
            None => unreachable!("the directory is only taken when closing"),
        }
    }

    fn release(&mut self) -> io::Result<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };

        let path = dir.path().to_owned();
        let result = match dir.close() {
            // Already removed by the interruption handler
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result,
        };
        if let Some(ref cleanup) = self.cleanup {
            cleanup::lock(cleanup).remove(&path);
        }
        debug!("Removed workspace {path:?}");
        result
    }

    /// Remove the workspace & everything in it
    pub fn close(mut self) -> io::Result<()> {
        self.release()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("Failed to remove the workspace: {err}");
        }
    }
}

/// Run `f` with the path of a fresh workspace, removing the workspace afterwards whatever `f`
/// returned.
///
/// Failing to remove the workspace is logged but never replaces the result of `f`.
pub fn with_workspace<T>(
    parent: Option<&Path>,
    cleanup: Option<SharedCleanupContext>,
    f: impl FnOnce(&Path) -> Result<T>,
) -> Result<T> {
    let workspace = Workspace::create(parent, cleanup)?;
    let result = f(workspace.path());

    if let Err(err) = workspace.close() {
        warn!("Failed to remove the workspace: {err}");
    }

    result
}
