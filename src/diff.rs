// Copyright (C) 2026 by GiGa infosystems

//! Compare two package trees, either with an external tool ([`ExternalTool`], `diff -ruN` by
//! default) or as a structured summary ([`TreeDiff::between`])

use crate::error::{Error, Result};
use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

/// Compares the installed copy of a package against the unpacked published one
#[cfg_attr(test, mockall::automock)]
pub trait DiffEngine {
    /// Emit the differences between `local` & `remote`.
    ///
    /// Finding differences is not a failure.
    fn diff(&self, local: &Path, remote: &Path) -> Result<()>;
}

/// An external program that gets the two directories appended to its arguments & writes to the
/// inherited stdout.
///
/// Exit codes `0` (no differences) and `1` (differences) are successes, as with `diff`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExternalTool {
    program: String,
    args: Vec<String>,
}

pub const DEFAULT_TOOL: &str = "diff -ruN";

impl Default for ExternalTool {
    fn default() -> Self {
        ExternalTool {
            program: "diff".to_owned(),
            args: vec!["-ruN".to_owned()],
        }
    }
}

impl FromStr for ExternalTool {
    type Err = Error;

    /// Split a command line on whitespace, quoting isn't supported
    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace().map(str::to_owned);
        let program = words
            .next()
            .ok_or_else(|| Error::invalid_input("the diff tool command is empty"))?;

        Ok(ExternalTool {
            program,
            args: words.collect(),
        })
    }
}

impl fmt::Display for ExternalTool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", std::iter::once(&self.program).chain(&self.args).join(" "))
    }
}

impl DiffEngine for ExternalTool {
    fn diff(&self, local: &Path, remote: &Path) -> Result<()> {
        debug!("Running `{self} {local:?} {remote:?}`");

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(local)
            .arg(remote)
            .status()
            .map_err(|err| Error::DiffEngine(format!("failed to run `{self}`: {err}")))?;

        match status.code() {
            Some(0) => {
                info!("No differences found");
                Ok(())
            }
            Some(1) => Ok(()),
            Some(code) => Err(Error::DiffEngine(format!(
                "`{self}` returned status code {code}"
            ))),
            None => Err(Error::DiffEngine(format!("`{self}` was terminated ({status})"))),
        }
    }
}

/// A file that exists on both sides with different contents
#[derive(Serialize, Clone, PartialEq, Eq, Debug)]
pub struct Changed {
    pub path: PathBuf,
    pub local_size: u64,
    pub remote_size: u64,
}

/// The files that differ between two directory trees.
///
/// Paths are relative to the compared directories & sorted, directories themselves aren't listed.
#[derive(Serialize, Default, PartialEq, Eq, Debug)]
pub struct TreeDiff {
    /// Files only present in the remote tree
    pub added: Vec<PathBuf>,
    /// Files only present in the local tree
    pub removed: Vec<PathBuf>,
    pub changed: Vec<Changed>,
    /// The number of files that are identical on both sides
    pub unchanged: usize,
}

#[derive(PartialEq, Eq)]
enum TreeEntry {
    File { path: PathBuf, size: u64 },
    Symlink(PathBuf),
}

impl TreeEntry {
    fn size(&self) -> u64 {
        match self {
            TreeEntry::File { size, .. } => *size,
            TreeEntry::Symlink(target) => target.as_os_str().len() as u64,
        }
    }

    fn same_contents(&self, other: &TreeEntry) -> io::Result<bool> {
        match (self, other) {
            (
                TreeEntry::File { path, size },
                TreeEntry::File {
                    path: other_path,
                    size: other_size,
                },
            ) => Ok(size == other_size && fs::read(path)? == fs::read(other_path)?),
            (TreeEntry::Symlink(target), TreeEntry::Symlink(other)) => Ok(target == other),
            _ => Ok(false),
        }
    }
}

fn collect_tree(
    root: &Path,
    relative: &Path,
    entries: &mut BTreeMap<PathBuf, TreeEntry>,
) -> io::Result<()> {
    for entry in fs::read_dir(root.join(relative))? {
        let entry = entry?;
        let path = relative.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_tree(root, &path, entries)?;
        } else if file_type.is_symlink() {
            entries.insert(path, TreeEntry::Symlink(fs::read_link(entry.path())?));
        } else {
            let size = entry.metadata()?.len();
            entries.insert(
                path,
                TreeEntry::File {
                    path: entry.path(),
                    size,
                },
            );
        }
    }

    Ok(())
}

impl TreeDiff {
    /// Compare the files below `local` with the files below `remote`
    pub fn between(local: &Path, remote: &Path) -> Result<Self> {
        let mut local_entries = BTreeMap::new();
        collect_tree(local, Path::new(""), &mut local_entries)?;
        let mut remote_entries = BTreeMap::new();
        collect_tree(remote, Path::new(""), &mut remote_entries)?;

        let added = remote_entries
            .keys()
            .filter(|path| !local_entries.contains_key(*path))
            .cloned()
            .collect();
        let removed = local_entries
            .keys()
            .filter(|path| !remote_entries.contains_key(*path))
            .cloned()
            .collect();

        let mut diff = TreeDiff {
            added,
            removed,
            ..TreeDiff::default()
        };

        for (path, local_entry) in &local_entries {
            let Some(remote_entry) = remote_entries.get(path) else {
                continue;
            };

            if local_entry.same_contents(remote_entry)? {
                diff.unchanged += 1;
            } else {
                diff.changed.push(Changed {
                    path: path.clone(),
                    local_size: local_entry.size(),
                    remote_size: remote_entry.size(),
                });
            }
        }

        Ok(diff)
    }

    /// Whether both trees contain the same files
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Print JSON to stdout, pretty printed if stdout is a terminal
pub fn output_json(value: &impl Serialize) -> Result<()> {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    println!("{}", json.map_err(io::Error::from)?);

    Ok(())
}

/// Prints a [`TreeDiff`] as JSON instead of running an external tool
#[derive(Clone, Copy, Default, Debug)]
pub struct TreeSummary;

impl DiffEngine for TreeSummary {
    fn diff(&self, local: &Path, remote: &Path) -> Result<()> {
        let diff = TreeDiff::between(local, remote)?;
        info!(
            "{} added, {} removed, {} changed, {} unchanged files",
            diff.added.len(),
            diff.removed.len(),
            diff.changed.len(),
            diff.unchanged
        );
        output_json(&diff)
    }
}
