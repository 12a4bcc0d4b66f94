// Copyright (C) 2026 by GiGa infosystems

//! Safely extract `.crate` archives (gzip compressed tarballs), see [`unpack`].

use crate::error::{Error, Result};
use crate::package::{PackageIdentity, UnpackedPackage};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Entry, EntryType};

fn open(archive: &Path) -> Result<Archive<GzDecoder<File>>> {
    let file = File::open(archive)?;
    Ok(Archive::new(GzDecoder::new(file)))
}

fn unsafe_entry(entry: &Path, reason: &'static str) -> Error {
    Error::UnsafeArchive {
        entry: entry.to_owned(),
        reason,
    }
}

/// Check that an entry path is relative and has no `..` segments, returning it without `.`
/// segments
fn relative_entry_path(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => (),
            Component::ParentDir => return Err(unsafe_entry(path, "contains a `..` segment")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_entry(path, "is an absolute path"));
            }
        }
    }
    Ok(out)
}

/// Check that a link target stays inside the extraction directory, lexically.
///
/// `base` is the directory (relative to the extraction directory) the target is relative to.
/// Returns the paths the target walks through, which must not be symlinks themselves.
fn check_link_target(entry: &Path, base: &Path, target: &Path) -> Result<Vec<PathBuf>> {
    let mut resolved = base.to_owned();
    let mut traversed = Vec::new();
    let mut components = target.components().peekable();

    while let Some(component) = components.next() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                if components.peek().is_some() {
                    traversed.push(resolved.clone());
                }
            }
            Component::CurDir => (),
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(unsafe_entry(entry, "links outside of the archive"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_entry(entry, "links to an absolute path"));
            }
        }
    }

    Ok(traversed)
}

fn link_target<R: Read>(archive: &Path, entry: &Entry<'_, R>) -> Result<PathBuf> {
    match entry.link_name() {
        Ok(Some(target)) => Ok(target.into_owned()),
        Ok(None) => Err(Error::corrupt(archive, "link entry without a target")),
        Err(err) => Err(Error::corrupt(archive, err)),
    }
}

/// Walk all entries without extracting anything, failing on the first unsafe entry.
///
/// Returns the number of entries.
fn validate(archive: &Path) -> Result<usize> {
    let mut tar = open(archive)?;
    let mut paths = Vec::new();
    let mut symlinks = HashSet::new();
    let mut link_walks = Vec::new();

    for entry in tar.entries().map_err(|err| Error::corrupt(archive, err))? {
        let entry = entry.map_err(|err| Error::corrupt(archive, err))?;
        let raw_path = entry.path().map_err(|err| Error::corrupt(archive, err))?;
        let path = relative_entry_path(&raw_path)?;

        let kind = entry.header().entry_type();
        if kind.is_symlink() {
            let target = link_target(archive, &entry)?;
            let base = path.parent().unwrap_or(Path::new(""));
            link_walks.push((path.clone(), check_link_target(&raw_path, base, &target)?));
            symlinks.insert(path.clone());
        } else if kind.is_hard_link() {
            let target = link_target(archive, &entry)?;
            link_walks.push((path.clone(), check_link_target(&raw_path, Path::new(""), &target)?));
        }

        paths.push(path);
    }

    // Writing through a symlinked directory could end up anywhere the link points to
    if let Some(path) = paths
        .iter()
        .find(|path| path.ancestors().skip(1).any(|ancestor| symlinks.contains(ancestor)))
    {
        return Err(unsafe_entry(path, "is inside a symlinked directory"));
    }

    // Resolving `..` after a symlink happens relative to where that symlink points to
    if let Some((path, _)) = link_walks
        .iter()
        .find(|(_, walk)| walk.iter().any(|step| symlinks.contains(step)))
    {
        return Err(unsafe_entry(path, "links through another symlink"));
    }

    if paths.is_empty() {
        return Err(Error::corrupt(archive, "the archive has no entries"));
    }

    Ok(paths.len())
}

#[cfg(unix)]
fn set_executable_bits(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o644 | (mode & 0o111)))
}

#[cfg(not(unix))]
fn set_executable_bits(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

fn extract_entry<R: Read>(
    archive: &Path,
    target_dir: &Path,
    mut entry: Entry<'_, R>,
) -> Result<()> {
    let raw_path = entry.path().map_err(|err| Error::corrupt(archive, err))?;
    let path = relative_entry_path(&raw_path)?;
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    let dest = target_dir.join(&path);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let kind = entry.header().entry_type();
    match kind {
        EntryType::Directory => fs::create_dir_all(&dest)?,
        EntryType::Regular | EntryType::Continuous => {
            let mode = entry.header().mode().unwrap_or(0o644);
            let mut file = File::create(&dest)?;
            io::copy(&mut entry, &mut file).map_err(|err| Error::corrupt(archive, err))?;
            set_executable_bits(&dest, mode)?;
        }
        EntryType::Symlink => {
            let target = link_target(archive, &entry)?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &dest)?;
            #[cfg(not(unix))]
            debug!("Skipping symlink {path:?} -> {target:?}");
        }
        EntryType::Link => {
            let target = link_target(archive, &entry)?;
            fs::hard_link(target_dir.join(target), &dest)?;
        }
        kind => debug!("Skipping {path:?} of type {kind:?}"),
    }

    Ok(())
}

/// The directory holding the package's files inside `target_dir`.
///
/// `.crate` files contain a single `{name}-{version}` directory, for other archives with a single
/// top level directory that one is used.
fn package_root(target_dir: &Path, ident: &PackageIdentity) -> Result<PathBuf> {
    let expected = target_dir.join(ident.full_name());
    if expected.is_dir() {
        return Ok(expected);
    }

    let entries = fs::read_dir(target_dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<io::Result<Vec<_>>>()?;

    match &*entries {
        [single] if single.is_dir() => Ok(single.clone()),
        _ => Ok(target_dir.to_owned()),
    }
}

/// Extract every entry of the `.crate` archive at `archive` into `target_dir`.
///
/// All entries are validated before anything is written, so an archive with any entry that would
/// end up outside of `target_dir` (via `..` segments, absolute paths, or links) fails with
/// [`Error::UnsafeArchive`] without extracting anything. The executable bits of files are kept,
/// owners and other permission bits are not.
///
/// If extraction fails halfway, the already extracted files are left behind.
pub fn unpack(archive: &Path, target_dir: &Path, ident: PackageIdentity) -> Result<UnpackedPackage> {
    let entries = validate(archive)?;

    info!("Unpacking {entries} entries of {ident} to {target_dir:?}...");
    fs::create_dir_all(target_dir)?;

    let mut tar = open(archive)?;
    for entry in tar.entries().map_err(|err| Error::corrupt(archive, err))? {
        let entry = entry.map_err(|err| Error::corrupt(archive, err))?;
        extract_entry(archive, target_dir, entry)?;
    }

    let path = package_root(target_dir, &ident)?;
    debug!("{ident} unpacked to {path:?}");
    Ok(UnpackedPackage { ident, path })
}
