// Copyright (C) 2026 by GiGa infosystems

//! Download the archive of a [`RemoteCandidate`] into a workspace

use crate::error::{Error, Result};
use crate::http;
use crate::resolve::RemoteCandidate;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// Passes writes through while hashing them
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// The path of the archive for `candidate` inside `workspace_dir`.
///
/// Errors if the file name would be anything but a plain file directly inside the workspace.
pub fn archive_path(candidate: &RemoteCandidate<'_>, workspace_dir: &Path) -> Result<PathBuf> {
    let file_name = format!("{}.crate", candidate.ident.full_name());

    let mut components = Path::new(&file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(workspace_dir.join(file_name)),
        _ => Err(Error::Download {
            url: candidate.source.id().to_owned(),
            reason: format!("refusing to write archive {file_name:?} outside of the workspace"),
        }),
    }
}

/// Download the archive of `candidate` to `{workspace_dir}/{name}-{version}.crate` and return that
/// path.
///
/// Never overwrites an existing file. If the source reported a checksum, the downloaded archive
/// has to match it. A failed download may leave a partial file behind.
pub fn fetch(candidate: &RemoteCandidate<'_>, workspace_dir: &Path) -> Result<PathBuf> {
    let path = archive_path(candidate, workspace_dir)?;
    let download_error = |reason: String| Error::Download {
        url: format!("{} ({})", candidate.ident, candidate.source.id()),
        reason,
    };

    info!("Downloading {} from {}...", candidate.ident, candidate.source.id());

    let mut reader = candidate
        .source
        .open_archive(&candidate.ident, candidate.checksum.as_deref())?;

    let file = File::create_new(&path)?;
    let mut writer = HashingWriter {
        inner: file,
        hasher: Sha256::new(),
    };

    // HTTP bodies report errors with their URL, other sources only get the package named
    let bytes = io::copy(&mut reader, &mut writer).map_err(|err| match err.downcast::<Error>() {
        Ok(err) => err,
        Err(err) if http::is_timeout(&err) => Error::Timeout {
            url: format!("{} ({})", candidate.ident, candidate.source.id()),
        },
        Err(err) => download_error(err.to_string()),
    })?;
    writer.flush()?;

    let checksum = hex::encode(writer.hasher.finalize());
    if let Some(ref expected) = candidate.checksum
        && !expected.eq_ignore_ascii_case(&checksum)
    {
        return Err(download_error(format!(
            "checksum mismatch, expected {expected} but got {checksum}"
        )));
    }

    debug!("Downloaded {bytes} bytes to {path:?} (sha256 {checksum})");
    Ok(path)
}
