// Copyright (C) 2026 by GiGa infosystems

//! [crates.io] as a package source, using its web API for version listings

use super::{PackageSource, parse_release_version};
use crate::error::{Error, Result};
use crate::http::{self, HttpClient, USER_AGENT};
use crate::package::{PackageIdentity, Release};
use crates_io_api::SyncClient;
use log::debug;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// Where [crates.io] serves `.crate` files from
pub const CRATES_IO_DOWNLOADS: &str = "https://static.crates.io/crates";

/// The web API [`SyncClient`] talks to
const CRATES_IO_API: &str = "https://crates.io/api/v1";

const CRATES_IO_ID: &str = "crates.io";

/// The [crates.io] registry
///
/// [`SyncClient`] brings its own HTTP client without a timeout, so its requests are run against
/// the timeout of `http` instead.
pub struct CratesIo {
    api: Arc<SyncClient>,
    http: HttpClient,
    downloads: String,
}

impl CratesIo {
    pub fn new(http: HttpClient) -> Result<Self> {
        let api = SyncClient::new(USER_AGENT, Duration::from_millis(1000))
            .map_err(|err| Error::invalid_input(format!("invalid user agent: {err}")))?;

        Ok(CratesIo {
            api: Arc::new(api),
            http,
            downloads: CRATES_IO_DOWNLOADS.to_owned(),
        })
    }

    /// Use a different base URL for `.crate` downloads (such as a mirror)
    pub fn with_downloads_from(self, base: impl Into<String>) -> Self {
        CratesIo {
            downloads: base.into().trim_end_matches('/').to_owned(),
            ..self
        }
    }

    fn archive_url(&self, ident: &PackageIdentity) -> String {
        format!("{}/{}/{}.crate", self.downloads, ident.name, ident.full_name())
    }
}

impl PackageSource for CratesIo {
    fn id(&self) -> &str {
        CRATES_IO_ID
    }

    fn releases(&self, name: &str) -> Result<Option<Vec<Release>>> {
        let url = format!("{CRATES_IO_API}/crates/{name}");
        let api = Arc::clone(&self.api);
        let crate_name = name.to_owned();
        let response =
            http::with_deadline(&url, self.http.timeout(), move || api.get_crate(&crate_name))?;

        let info = match response {
            Ok(info) => info,
            Err(err) => return api_error(&url, err).map_or(Ok(None), Err),
        };

        let releases = info
            .versions
            .into_iter()
            .filter(|version| !version.yanked)
            .filter_map(|version| parse_release_version(CRATES_IO_ID, name, &version.num))
            .map(Release::new)
            .collect::<Vec<_>>();

        debug!("{CRATES_IO_ID} lists {} releases of `{name}`", releases.len());
        Ok(Some(releases))
    }

    fn open_archive(
        &self,
        ident: &PackageIdentity,
        _checksum: Option<&str>,
    ) -> Result<Box<dyn Read>> {
        let response = self.http.get_stream(&self.archive_url(ident))?;
        Ok(Box::new(response))
    }
}

/// The error for a failed API request, `None` if crates.io doesn't know the package
fn api_error(url: &str, err: crates_io_api::Error) -> Option<Error> {
    match err {
        crates_io_api::Error::NotFound(_) => None,
        crates_io_api::Error::Http(err) if err.is_timeout() => Some(Error::Timeout {
            url: url.to_owned(),
        }),
        err => Some(Error::Query {
            source_id: CRATES_IO_ID.to_owned(),
            reason: err.to_string(),
        }),
    }
}
