// Copyright (C) 2026 by GiGa infosystems

//! Find the locked version of a dependency & where cargo unpacked it, using `cargo metadata`

use crate::error::Result;
use crate::package::{LocalPackageRecord, PackageIdentity};
use cargo_metadata::MetadataCommand;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::Path;

/// Looks up the installed copy of a dependency of the current project
#[cfg_attr(test, mockall::automock)]
pub trait LocalLookup {
    /// The locked & installed copy of `name`, or `None` if it isn't a registry dependency
    fn lookup_local(&self, name: &str) -> Option<LocalPackageRecord>;
}

/// Whether a `cargo metadata` source string belongs to a package registry.
///
/// Path dependencies (no source) and git dependencies can't be compared against published
/// versions.
fn is_registry_source(repr: Option<&str>) -> bool {
    repr.is_some_and(|repr| repr.starts_with("registry+") || repr.starts_with("sparse+"))
}

/// The registry packages of a project's lock file, indexed by name
#[derive(Debug, Default)]
pub struct LockedPackages {
    packages: BTreeMap<String, LocalPackageRecord>,
}

impl LockedPackages {
    /// Run `cargo metadata --locked` for the `Cargo.toml` at `manifest_path` (or the one cargo
    /// finds from the current directory).
    ///
    /// Fails if the lock file is missing or out of date, as this must never change it.
    pub fn gather(manifest_path: Option<&Path>) -> Result<Self> {
        let mut command = MetadataCommand::new();
        if let Some(path) = manifest_path {
            command.manifest_path(path);
        }
        let data = command.other_options(vec!["--locked".to_owned()]).exec()?;

        let mut locked = LockedPackages::default();
        for package in data.packages {
            let source = package.source.as_ref().map(|source| source.repr.as_str());
            if !is_registry_source(source) {
                debug!("Skipping {} {} from {source:?}", package.name, package.version);
                continue;
            }

            let Some(dir) = package.manifest_path.parent() else {
                continue;
            };

            locked.insert(LocalPackageRecord {
                ident: PackageIdentity::new(package.name.to_string(), package.version),
                path: dir.as_std_path().to_owned(),
            });
        }

        info!("Found {} locked registry packages", locked.len());
        Ok(locked)
    }

    /// Add a record, keeping the highest version if `name` is locked multiple times
    pub fn insert(&mut self, record: LocalPackageRecord) {
        match self.packages.get(&record.ident.name) {
            Some(existing) if existing.ident.version >= record.ident.version => (),
            _ => {
                self.packages.insert(record.ident.name.clone(), record);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }
}

impl LocalLookup for LockedPackages {
    fn lookup_local(&self, name: &str) -> Option<LocalPackageRecord> {
        self.packages.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(name: &str, version: &str) -> LocalPackageRecord {
        LocalPackageRecord {
            ident: PackageIdentity::new(name, version.parse().unwrap()),
            path: PathBuf::from(format!("/registry/src/{name}-{version}")),
        }
    }

    #[test]
    fn test_registry_sources() {
        assert!(is_registry_source(Some(
            "registry+https://github.com/rust-lang/crates.io-index"
        )));
        assert!(is_registry_source(Some("sparse+https://index.crates.io/")));
        assert!(!is_registry_source(Some(
            "git+https://github.com/example/examplegem?branch=main#0123abcd"
        )));
        assert!(!is_registry_source(Some("path+file:///src/examplegem")));
        assert!(!is_registry_source(None));
    }

    #[test]
    fn test_lookup() {
        let mut locked = LockedPackages::default();
        locked.insert(record("examplegem", "1.0.0"));
        locked.insert(record("othergem", "0.3.1"));

        assert_eq!(locked.lookup_local("examplegem"), Some(record("examplegem", "1.0.0")));
        assert_eq!(locked.lookup_local("missinggem"), None);
        assert_eq!(locked.lookup_local("ExampleGem"), None);
        assert_eq!(locked.names().collect::<Vec<_>>(), ["examplegem", "othergem"]);
    }

    #[test]
    fn test_highest_locked_version_wins() {
        let mut locked = LockedPackages::default();
        locked.insert(record("examplegem", "1.2.0"));
        locked.insert(record("examplegem", "0.9.0"));
        locked.insert(record("examplegem", "1.10.0"));
        locked.insert(record("examplegem", "1.3.0"));

        assert_eq!(locked.len(), 1);
        assert_eq!(locked.lookup_local("examplegem"), Some(record("examplegem", "1.10.0")));
    }
}
