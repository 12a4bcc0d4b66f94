// Copyright (C) 2026 by GiGa infosystems

//! Run a whole comparison: look up, resolve, fetch, unpack & diff, see [`Pipeline::run`]

use crate::cleanup::SharedCleanupContext;
use crate::constraint::VersionConstraint;
use crate::diff::DiffEngine;
use crate::error::{Error, Result};
use crate::fetch::fetch;
use crate::local::LocalLookup;
use crate::package::PackageIdentity;
use crate::resolve::Resolver;
use crate::unpack::unpack;
use crate::workspace::with_workspace;
use log::debug;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// The stage a [`Pipeline`] is in.
///
/// Stages only ever advance in this order, except that any stage may go to [`Stage::Failed`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum Stage {
    Idle,
    Resolving,
    Fetching,
    Unpacking,
    Diffing,
    Done,
    Failed,
}

/// What to compare
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Request {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl Request {
    pub fn new(name: impl Into<String>, constraint: VersionConstraint) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid_input("package name required"));
        }

        Ok(Request { name, constraint })
    }
}

/// The two versions that got compared
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Outcome {
    pub local: PackageIdentity,
    pub remote: PackageIdentity,
}

/// Compares the installed copy of a dependency against a published version.
///
/// A pipeline can be run multiple times, each run starts from [`Stage::Idle`] again.
pub struct Pipeline<'a> {
    lookup: &'a dyn LocalLookup,
    resolver: &'a Resolver,
    engine: &'a dyn DiffEngine,
    workspace_parent: Option<PathBuf>,
    cleanup: Option<SharedCleanupContext>,
    stage: Stage,
    history: Vec<Stage>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        lookup: &'a dyn LocalLookup,
        resolver: &'a Resolver,
        engine: &'a dyn DiffEngine,
    ) -> Self {
        Pipeline {
            lookup,
            resolver,
            engine,
            workspace_parent: None,
            cleanup: None,
            stage: Stage::Idle,
            history: vec![Stage::Idle],
        }
    }

    /// Create the workspaces in `parent` instead of the system's temporary directory
    pub fn workspace_in(self, parent: impl Into<PathBuf>) -> Self {
        Pipeline {
            workspace_parent: Some(parent.into()),
            ..self
        }
    }

    /// Register the workspaces with `ctx` while they exist
    pub fn cleanup_context(self, ctx: SharedCleanupContext) -> Self {
        Pipeline {
            cleanup: Some(ctx),
            ..self
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// All stages of the last run, starting with [`Stage::Idle`]
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    fn advance(&mut self, stage: Stage) {
        debug!("{:?} -> {stage:?}", self.stage);
        self.stage = stage;
        self.history.push(stage);
    }

    /// Compare the locally installed version of `request.name` against the highest published
    /// version matching `request.constraint`, passing both directories to the diff engine.
    ///
    /// Nothing is queried or downloaded if the package isn't a registry dependency of the
    /// project. All downloaded & unpacked files are removed before returning, whether the
    /// comparison succeeded or not.
    pub fn run(&mut self, request: &Request) -> Result<Outcome> {
        self.stage = Stage::Idle;
        self.history = vec![Stage::Idle];

        let result = self.run_stages(request);
        if result.is_err() {
            self.advance(Stage::Failed);
        }
        result
    }

    fn run_stages(&mut self, request: &Request) -> Result<Outcome> {
        let local = self.lookup.lookup_local(&request.name).ok_or_else(|| {
            Error::invalid_input(format!(
                "`{}` is not a registry dependency of this project",
                request.name
            ))
        })?;
        debug!("Installed copy of {} is at {:?}", local.ident, local.path);

        self.advance(Stage::Resolving);
        let resolver = self.resolver;
        let candidate = resolver.resolve(&request.name, &request.constraint)?;

        let parent = self.workspace_parent.clone();
        let cleanup = self.cleanup.clone();
        let remote = with_workspace(parent.as_deref(), cleanup, |dir: &Path| {
            self.advance(Stage::Fetching);
            let archive = fetch(&candidate, dir)?;

            self.advance(Stage::Unpacking);
            let unpacked = unpack(&archive, &dir.join("unpacked"), candidate.ident.clone())?;

            self.advance(Stage::Diffing);
            self.engine.diff(&local.path, &unpacked.path)?;

            Ok(unpacked.ident)
        })?;

        self.advance(Stage::Done);
        Ok(Outcome {
            local: local.ident,
            remote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::MockDiffEngine;
    use crate::local::MockLocalLookup;
    use crate::package::LocalPackageRecord;
    use crate::resolve::tests::MemorySource;
    use crate::unpack::tests::crate_archive;
    use std::fs;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};
    use tempfile::{TempDir, tempdir};

    /// An installed copy of `examplegem 1.0.0`
    fn installed() -> (TempDir, MockLocalLookup) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("lib.rs"), "// v1").unwrap();

        let record = LocalPackageRecord {
            ident: PackageIdentity::new("examplegem", "1.0.0".parse().unwrap()),
            path: dir.path().to_owned(),
        };
        let mut lookup = MockLocalLookup::new();
        lookup
            .expect_lookup_local()
            .withf(|name| name == "examplegem")
            .returning(move |_| Some(record.clone()));
        lookup
            .expect_lookup_local()
            .withf(|name| name != "examplegem")
            .returning(|_| None);

        (dir, lookup)
    }

    fn published() -> MemorySource {
        MemorySource::new("memory")
            .with_archive("examplegem", "1.0.0", crate_archive("examplegem", "1.0.0", "// v1"))
            .with_archive("examplegem", "2.0.0", crate_archive("examplegem", "2.0.0", "// v2"))
    }

    fn request(name: &str, constraint: &str) -> Request {
        Request::new(name, constraint.parse().unwrap()).unwrap()
    }

    /// A diff engine that remembers what it was asked to compare
    fn recording_engine() -> (MockDiffEngine, Arc<Mutex<Vec<(PathBuf, String)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);

        let mut engine = MockDiffEngine::new();
        engine.expect_diff().returning(move |local, remote| {
            let lib = fs::read_to_string(remote.join("src/lib.rs")).unwrap();
            let version = if lib == "// v1" { "1.0.0" } else { "2.0.0" };
            assert!(remote.ends_with(format!("unpacked/examplegem-{version}")));
            recorded.lock().unwrap().push((local.to_owned(), lib));
            Ok(())
        });

        (engine, calls)
    }

    #[test]
    fn test_compare_against_latest() {
        let (installed_dir, lookup) = installed();
        let mut resolver = Resolver::default();
        resolver.push(published());
        let (engine, calls) = recording_engine();
        let scratch = tempdir().unwrap();

        let mut pipeline = Pipeline::new(&lookup, &resolver, &engine).workspace_in(scratch.path());
        let outcome = pipeline.run(&request("examplegem", "any")).unwrap();

        assert_eq!(outcome.local.to_string(), "examplegem 1.0.0");
        assert_eq!(outcome.remote.to_string(), "examplegem 2.0.0");
        assert_eq!(
            *calls.lock().unwrap(),
            [(installed_dir.path().to_owned(), "// v2".to_owned())]
        );
        assert_eq!(pipeline.stage(), Stage::Done);
        assert_eq!(
            pipeline.history(),
            [
                Stage::Idle,
                Stage::Resolving,
                Stage::Fetching,
                Stage::Unpacking,
                Stage::Diffing,
                Stage::Done,
            ]
        );
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_compare_against_constrained_version() {
        let (_installed_dir, lookup) = installed();
        let mut resolver = Resolver::default();
        resolver.push(published());
        let (engine, calls) = recording_engine();

        let mut pipeline = Pipeline::new(&lookup, &resolver, &engine);
        let outcome = pipeline.run(&request("examplegem", "~> 1.0")).unwrap();

        assert_eq!(outcome.remote.version, "1.0.0".parse().unwrap());
        assert_eq!(calls.lock().unwrap()[0].1, "// v1");
    }

    #[test]
    fn test_not_a_dependency() {
        let (_installed_dir, lookup) = installed();
        let source = published();
        let requests = Rc::clone(&source.requests);
        let mut resolver = Resolver::default();
        resolver.push(source);
        let mut engine = MockDiffEngine::new();
        engine.expect_diff().never();

        let mut pipeline = Pipeline::new(&lookup, &resolver, &engine);
        let err = pipeline.run(&request("missinggem", "any")).unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
        assert_eq!(
            err.to_string(),
            "`missinggem` is not a registry dependency of this project"
        );
        assert_eq!(pipeline.history(), [Stage::Idle, Stage::Failed]);
        assert_eq!(requests.get(), 0);
    }

    #[test]
    fn test_no_matching_version() {
        let (_installed_dir, lookup) = installed();
        let mut resolver = Resolver::default();
        resolver.push(published());
        let mut engine = MockDiffEngine::new();
        engine.expect_diff().never();
        let scratch = tempdir().unwrap();

        let mut pipeline = Pipeline::new(&lookup, &resolver, &engine).workspace_in(scratch.path());
        let err = pipeline.run(&request("examplegem", "= 9.9.9")).unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
        assert_eq!(
            err.to_string(),
            "no published version of `examplegem` matches `= 9.9.9`"
        );
        assert_eq!(
            pipeline.history(),
            [Stage::Idle, Stage::Resolving, Stage::Failed]
        );
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unsafe_archive_is_never_diffed() {
        use crate::unpack::tests::{TestEntry, tar_gz};

        let (_installed_dir, lookup) = installed();
        let mut resolver = Resolver::default();
        resolver.push(MemorySource::new("memory").with_archive(
            "examplegem",
            "2.0.0",
            tar_gz(&[TestEntry::File("../../etc/passwd", "root::0:0::/:/bin/sh", 0o644)]),
        ));
        let mut engine = MockDiffEngine::new();
        engine.expect_diff().never();
        let scratch = tempdir().unwrap();

        let mut pipeline = Pipeline::new(&lookup, &resolver, &engine).workspace_in(scratch.path());
        let err = pipeline.run(&request("examplegem", "any")).unwrap_err();

        assert!(matches!(err, Error::UnsafeArchive { .. }), "{err:?}");
        assert_eq!(
            pipeline.history(),
            [
                Stage::Idle,
                Stage::Resolving,
                Stage::Fetching,
                Stage::Unpacking,
                Stage::Failed,
            ]
        );
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
        assert!(!scratch.path().join("etc").exists());
    }

    #[test]
    fn test_diff_engine_failure_still_cleans_up() {
        let (_installed_dir, lookup) = installed();
        let mut resolver = Resolver::default();
        resolver.push(published());
        let mut engine = MockDiffEngine::new();
        engine
            .expect_diff()
            .times(1)
            .returning(|_, _| Err(Error::DiffEngine("exit status: 2".to_owned())));
        let scratch = tempdir().unwrap();
        let ctx = crate::cleanup::new_shared();

        let mut pipeline = Pipeline::new(&lookup, &resolver, &engine)
            .workspace_in(scratch.path())
            .cleanup_context(ctx.clone());
        let err = pipeline.run(&request("examplegem", "any")).unwrap_err();

        assert!(matches!(err, Error::DiffEngine(_)), "{err:?}");
        assert_eq!(pipeline.stage(), Stage::Failed);
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
        assert!(crate::cleanup::lock(&ctx).paths().is_empty());
    }

    #[test]
    fn test_empty_name() {
        let err = Request::new("  ", VersionConstraint::any()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{err:?}");
        assert_eq!(err.to_string(), "package name required");
    }
}
