// Copyright (C) 2026 by GiGa infosystems

//! `cargo-depdiff` is an application that shows what changed between the version of a dependency
//! locked in a project and another published version of it.
//!
//! The order of operations is:
//! * Look up the locked & installed copy of the dependency with [`local::LockedPackages`]
//! * Resolve the published version to compare against with [`resolve::Resolver`], querying
//!   [crates.io] and sparse registry indexes (see [`source`])
//! * Download its `.crate` file into a [`workspace::Workspace`] with [`fetch::fetch`]
//! * Safely extract it with [`unpack::unpack`]
//! * Compare both directories with a [`diff::DiffEngine`]
//!
//! [`pipeline::Pipeline`] runs all of these in order & removes the workspace afterwards.
//!
//! Only registry dependencies can be compared, path & `git` dependencies have no published
//! versions to compare against.
//!
//! [crates.io]: https://crates.io

pub mod cleanup;
pub mod constraint;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod http;
pub mod local;
pub mod package;
pub mod pipeline;
pub mod resolve;
pub mod source;
pub mod unpack;
pub mod workspace;

pub use error::{Error, Result};
