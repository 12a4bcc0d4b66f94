// Copyright (C) 2026 by GiGa infosystems

//! Registries speaking cargo's sparse index protocol
//!
//! The index root contains a `config.json` with the download location (`dl`), and one file per
//! package with one JSON object per published version.

use super::{PackageSource, parse_release_version};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::package::{PackageIdentity, Release};
use log::debug;
use serde::Deserialize;
use std::cell::OnceCell;
use std::io::Read;

const DOWNLOAD_MARKERS: [&str; 5] = [
    "{crate}",
    "{version}",
    "{prefix}",
    "{lowerprefix}",
    "{sha256-checksum}",
];

#[derive(Deserialize)]
struct IndexConfig {
    dl: String,
}

#[derive(Deserialize)]
struct IndexEntry {
    vers: String,
    #[serde(default)]
    cksum: Option<String>,
    #[serde(default)]
    yanked: bool,
}

/// A registry index using the sparse protocol, like `https://index.crates.io/`
pub struct SparseIndex {
    root: String,
    http: HttpClient,
    /// The `dl` template from `config.json`, fetched on first use
    dl: OnceCell<String>,
}

impl SparseIndex {
    /// Create a source for the index at `url`, which may carry cargo's `sparse+` prefix
    pub fn new(url: &str, http: HttpClient) -> Self {
        let root = url
            .strip_prefix("sparse+")
            .unwrap_or(url)
            .trim_end_matches('/')
            .to_owned();

        SparseIndex {
            root,
            http,
            dl: OnceCell::new(),
        }
    }

    fn download_template(&self) -> Result<&str> {
        if let Some(dl) = self.dl.get() {
            return Ok(dl);
        }

        let url = format!("{}/config.json", self.root);
        let config = self.http.get_text(&url)?.ok_or_else(|| Error::Query {
            source_id: self.root.clone(),
            reason: "the index has no `config.json`".to_owned(),
        })?;
        let config = serde_json::from_str::<IndexConfig>(&config).map_err(|err| Error::Query {
            source_id: self.root.clone(),
            reason: format!("invalid `config.json`: {err}"),
        })?;

        Ok(self.dl.get_or_init(|| config.dl))
    }
}

/// The directory of a package inside the index, following cargo's layout
fn prefix(name: &str) -> String {
    let segment = |skip, take| name.chars().skip(skip).take(take).collect::<String>();
    match name.chars().count() {
        1 => "1".to_owned(),
        2 => "2".to_owned(),
        3 => format!("3/{}", segment(0, 1)),
        _ => format!("{}/{}", segment(0, 2), segment(2, 2)),
    }
}

fn index_path(name: &str) -> String {
    let name = name.to_lowercase();
    format!("{}/{name}", prefix(&name))
}

fn download_url(dl: &str, ident: &PackageIdentity, checksum: Option<&str>) -> String {
    if !DOWNLOAD_MARKERS.iter().any(|marker| dl.contains(marker)) {
        return format!("{dl}/{}/{}/download", ident.name, ident.version);
    }

    let prefix = prefix(&ident.name);
    dl.replace("{crate}", &ident.name)
        .replace("{version}", &ident.version.to_string())
        .replace("{lowerprefix}", &prefix.to_lowercase())
        .replace("{prefix}", &prefix)
        .replace("{sha256-checksum}", checksum.unwrap_or_default())
}

impl PackageSource for SparseIndex {
    fn id(&self) -> &str {
        &self.root
    }

    fn releases(&self, name: &str) -> Result<Option<Vec<Release>>> {
        if name.is_empty() || !name.is_ascii() {
            return Ok(None);
        }

        let url = format!("{}/{}", self.root, index_path(name));
        let Some(lines) = self.http.get_text(&url)? else {
            return Ok(None);
        };

        let mut releases = Vec::new();
        for line in lines.lines().filter(|line| !line.trim().is_empty()) {
            let entry = serde_json::from_str::<IndexEntry>(line).map_err(|err| Error::Query {
                source_id: self.root.clone(),
                reason: format!("invalid index entry for `{name}`: {err}"),
            })?;

            if entry.yanked {
                continue;
            }

            if let Some(version) = parse_release_version(&self.root, name, &entry.vers) {
                let release = Release::new(version);
                releases.push(match entry.cksum {
                    Some(cksum) => release.with_checksum(cksum),
                    None => release,
                });
            }
        }

        debug!("{} lists {} releases of `{name}`", self.root, releases.len());
        Ok(Some(releases))
    }

    fn open_archive(
        &self,
        ident: &PackageIdentity,
        checksum: Option<&str>,
    ) -> Result<Box<dyn Read>> {
        let url = download_url(self.download_template()?, ident, checksum);
        let response = self.http.get_stream(&url)?;
        Ok(Box::new(response))
    }
}
