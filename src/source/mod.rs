// Copyright (C) 2026 by GiGa infosystems

//! Remote package sources that can list the published versions of a package and produce the
//! archive for one of them

use crate::error::Result;
use crate::package::{PackageIdentity, Release};
use log::warn;
use semver::Version;
use std::io::Read;

mod crates_io;
mod sparse;

pub use crates_io::CratesIo;
pub use sparse::SparseIndex;

/// An origin of published packages, such as crates.io or an alternative registry
pub trait PackageSource {
    /// A human readable identifier of this source (usually its URL)
    fn id(&self) -> &str;

    /// All published releases of a package that have not been yanked.
    ///
    /// Returns `Ok(None)` if this source doesn't know the package at all.
    fn releases(&self, name: &str) -> Result<Option<Vec<Release>>>;

    /// Open the `.crate` archive of a release for reading
    fn open_archive(&self, ident: &PackageIdentity, checksum: Option<&str>)
    -> Result<Box<dyn Read>>;
}

/// Parse a version string reported by a source, skipping it with a warning if it is invalid
fn parse_release_version(source: &str, name: &str, version: &str) -> Option<Version> {
    match version.parse::<Version>() {
        Ok(version) => Some(version),
        Err(err) => {
            warn!("Ignoring invalid version {version:?} of `{name}` from {source}: {err}");
            None
        }
    }
}
