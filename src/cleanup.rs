// Copyright (C) 2026 by GiGa infosystems

//! Paths to remove when the process gets interrupted before it can clean up after itself

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The paths that still exist & have to be removed on interruption
#[derive(Default, Debug)]
pub struct CleanupContext {
    paths: Vec<PathBuf>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Forget about a path, for when it got removed regularly
    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove all registered paths, ignoring paths that are already gone
    pub fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            debug!("Cleaning up {path:?}");
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };

            if let Err(err) = result
                && path.exists()
            {
                warn!("Failed to remove {path:?}: {err}");
            }
        }
    }
}

/// A [`CleanupContext`] shared with the interruption handler
pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Lock the context even if another thread panicked while holding it.
///
/// The list of paths stays valid whatever happened to the thread that held the lock.
pub fn lock(ctx: &SharedCleanupContext) -> MutexGuard<'_, CleanupContext> {
    ctx.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_add_remove() {
        let mut ctx = CleanupContext::new();
        let path = PathBuf::from("/tmp/cargo-depdiff-test");

        ctx.add(path.clone());
        assert_eq!(ctx.paths(), [path.clone()]);

        ctx.remove(&path);
        assert!(ctx.paths().is_empty());
    }

    #[test]
    fn test_cleanup_files_and_dirs() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("archive.crate");
        let sub_dir = dir.path().join("unpacked");
        fs::write(&file, "archive").unwrap();
        fs::create_dir(&sub_dir).unwrap();
        fs::write(sub_dir.join("lib.rs"), "lib").unwrap();

        let ctx = new_shared();
        lock(&ctx).add(file.clone());
        lock(&ctx).add(sub_dir.clone());
        lock(&ctx).add(dir.path().join("never-created"));

        lock(&ctx).cleanup();

        assert!(!file.exists());
        assert!(!sub_dir.exists());
        assert!(lock(&ctx).paths().is_empty());
    }

    #[test]
    fn test_lock_survives_poisoning() {
        let ctx = new_shared();
        let poisoner = Arc::clone(&ctx);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(ctx.is_poisoned());
        lock(&ctx).add(PathBuf::from("/tmp/cargo-depdiff-test"));
        assert_eq!(lock(&ctx).paths().len(), 1);
    }
}
