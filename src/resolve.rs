// Copyright (C) 2026 by GiGa infosystems

//! Select the published version to compare against, see [`Resolver::resolve`]

use crate::constraint::VersionConstraint;
use crate::error::{Error, Result};
use crate::package::PackageIdentity;
use crate::source::PackageSource;
use log::{debug, info};
use std::fmt;

/// A specific version of a package together with the source that can produce its archive
pub struct RemoteCandidate<'a> {
    pub ident: PackageIdentity,
    /// The SHA-256 of the archive (hex encoded), if the source reported one
    pub checksum: Option<String>,
    pub source: &'a dyn PackageSource,
}

impl fmt::Debug for RemoteCandidate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteCandidate({} from {})", self.ident, self.source.id())
    }
}

/// Queries a list of package sources, in order
#[derive(Default)]
pub struct Resolver {
    sources: Vec<Box<dyn PackageSource>>,
}

impl Resolver {
    pub fn new(sources: Vec<Box<dyn PackageSource>>) -> Self {
        Resolver { sources }
    }

    pub fn push(&mut self, source: impl PackageSource + 'static) {
        self.sources.push(Box::new(source));
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Find the highest published version of `name` matching `constraint` across all sources.
    ///
    /// If multiple sources publish the same highest version, the source that was configured first
    /// wins. Any source failing to answer fails the whole resolution.
    pub fn resolve(&self, name: &str, constraint: &VersionConstraint) -> Result<RemoteCandidate<'_>> {
        let mut best: Option<RemoteCandidate<'_>> = None;

        for source in &self.sources {
            let Some(releases) = source.releases(name)? else {
                debug!("{} doesn't know `{name}`", source.id());
                continue;
            };

            for release in releases {
                if !constraint.matches(&release.version) {
                    continue;
                }

                // Strictly greater, so earlier sources win ties
                if best
                    .as_ref()
                    .is_some_and(|best| best.ident.version >= release.version)
                {
                    continue;
                }

                best = Some(RemoteCandidate {
                    ident: PackageIdentity::new(name, release.version),
                    checksum: release.checksum,
                    source: source.as_ref(),
                });
            }
        }

        let candidate = best.ok_or_else(|| Error::NotFound {
            name: name.to_owned(),
            constraint: constraint.to_string(),
        })?;

        info!("Resolved `{name}` ({constraint}) to {candidate:?}");
        Ok(candidate)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::package::Release;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::collections::BTreeMap;
    use std::io::{Cursor, Read};

    /// An in-memory package source that counts how often it was asked for anything
    pub(crate) struct MemorySource {
        pub id: String,
        pub releases: BTreeMap<String, Vec<Release>>,
        pub archives: BTreeMap<String, Vec<u8>>,
        /// Shared so that tests can keep counting after the source moved into a [`Resolver`]
        pub requests: Rc<Cell<usize>>,
    }

    impl MemorySource {
        pub fn new(id: &str) -> Self {
            MemorySource {
                id: id.to_owned(),
                releases: BTreeMap::new(),
                archives: BTreeMap::new(),
                requests: Rc::default(),
            }
        }

        pub fn with_release(mut self, name: &str, version: &str) -> Self {
            self.releases
                .entry(name.to_owned())
                .or_default()
                .push(Release::new(version.parse().unwrap()));
            self
        }

        pub fn with_archive(mut self, name: &str, version: &str, archive: Vec<u8>) -> Self {
            self = self.with_release(name, version);
            self.archives.insert(format!("{name}-{version}"), archive);
            self
        }
    }

    impl PackageSource for MemorySource {
        fn id(&self) -> &str {
            &self.id
        }

        fn releases(&self, name: &str) -> Result<Option<Vec<Release>>> {
            self.requests.set(self.requests.get() + 1);
            Ok(self.releases.get(name).cloned())
        }

        fn open_archive(
            &self,
            ident: &PackageIdentity,
            _checksum: Option<&str>,
        ) -> Result<Box<dyn Read>> {
            self.requests.set(self.requests.get() + 1);
            match self.archives.get(&ident.full_name()) {
                Some(archive) => Ok(Box::new(Cursor::new(archive.clone()))),
                None => Err(Error::Download {
                    url: format!("memory://{}/{}", self.id, ident.full_name()),
                    reason: "no such archive".to_owned(),
                }),
            }
        }
    }

    struct FailingSource;

    impl PackageSource for FailingSource {
        fn id(&self) -> &str {
            "failing"
        }

        fn releases(&self, _name: &str) -> Result<Option<Vec<Release>>> {
            Err(Error::Query {
                source_id: "failing".to_owned(),
                reason: "connection refused".to_owned(),
            })
        }

        fn open_archive(&self, _: &PackageIdentity, _: Option<&str>) -> Result<Box<dyn Read>> {
            unreachable!("never resolves anything")
        }
    }

    fn any() -> VersionConstraint {
        VersionConstraint::any()
    }

    #[test]
    fn test_selects_the_highest_matching_version() {
        let mut resolver = Resolver::default();
        resolver.push(
            MemorySource::new("one")
                .with_release("examplegem", "1.0.0")
                .with_release("examplegem", "2.0.0")
                .with_release("examplegem", "1.10.0")
                .with_release("examplegem", "3.0.0-beta.1"),
        );

        let candidate = resolver.resolve("examplegem", &any()).unwrap();
        assert_eq!(candidate.ident.to_string(), "examplegem 2.0.0");
        assert_eq!(candidate.source.id(), "one");

        let candidate = resolver
            .resolve("examplegem", &"~> 1.0".parse().unwrap())
            .unwrap();
        assert_eq!(candidate.ident.version, "1.10.0".parse().unwrap());
    }

    #[test]
    fn test_highest_version_across_sources() {
        let mut resolver = Resolver::default();
        resolver.push(MemorySource::new("one").with_release("examplegem", "1.0.0"));
        resolver.push(MemorySource::new("two").with_release("examplegem", "1.2.0"));
        resolver.push(MemorySource::new("three"));

        let candidate = resolver.resolve("examplegem", &any()).unwrap();
        assert_eq!(candidate.ident.version, "1.2.0".parse().unwrap());
        assert_eq!(candidate.source.id(), "two");
    }

    #[test]
    fn test_ties_go_to_the_first_source() {
        let mut resolver = Resolver::default();
        resolver.push(MemorySource::new("one").with_release("examplegem", "2.0.0"));
        resolver.push(MemorySource::new("two").with_release("examplegem", "2.0.0"));

        let candidate = resolver.resolve("examplegem", &any()).unwrap();
        assert_eq!(candidate.source.id(), "one");
    }

    #[test]
    fn test_not_found() {
        let mut resolver = Resolver::default();
        resolver.push(MemorySource::new("one").with_release("examplegem", "2.0.0"));

        let err = resolver
            .resolve("examplegem", &"= 9.9.9".parse().unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
        assert_eq!(
            err.to_string(),
            "no published version of `examplegem` matches `= 9.9.9`"
        );

        let err = resolver.resolve("missinggem", &any()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "{err:?}");

        let err = Resolver::default().resolve("examplegem", &any()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
    }

    #[test]
    fn test_failing_source_fails_the_resolution() {
        let mut resolver = Resolver::default();
        resolver.push(MemorySource::new("one").with_release("examplegem", "2.0.0"));
        resolver.push(FailingSource);

        let err = resolver.resolve("examplegem", &any()).unwrap_err();
        assert!(matches!(err, Error::Query { .. }), "{err:?}");
    }
}
