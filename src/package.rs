// Copyright (C) 2026 by GiGa infosystems

//! The values passed between the stages of the pipeline

use semver::Version;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A package with a specific version
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PackageIdentity {
    pub name: String,
    pub version: Version,
}

impl PackageIdentity {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        PackageIdentity {
            name: name.into(),
            version,
        }
    }

    /// The `name-version` form used for `.crate` files and the directory inside them
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl fmt::Debug for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PackageIdentity({self})")
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// A published, non-yanked version as reported by a [`crate::source::PackageSource`]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Release {
    pub version: Version,
    /// The SHA-256 of the archive (hex encoded), if the source reports it
    pub checksum: Option<String>,
}

impl Release {
    pub fn new(version: Version) -> Self {
        Release {
            version,
            checksum: None,
        }
    }

    pub fn with_checksum(self, checksum: impl Into<String>) -> Self {
        Release {
            checksum: Some(checksum.into()),
            ..self
        }
    }
}

/// A dependency that is already locked & materialized for the current project.
///
/// The directory belongs to cargo and is only ever read.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LocalPackageRecord {
    pub ident: PackageIdentity,
    /// The directory containing the `Cargo.toml` of the package
    pub path: PathBuf,
}

/// A package extracted into a [`crate::workspace::Workspace`].
///
/// It is only valid as long as the workspace it got extracted into exists.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UnpackedPackage {
    pub ident: PackageIdentity,
    pub path: PathBuf,
}
