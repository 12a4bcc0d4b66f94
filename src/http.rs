// Copyright (C) 2026 by GiGa infosystems

//! A small blocking HTTP client shared by the package sources

use crate::error::{Error, Result};
use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use std::io::{self, Read};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// The `User-Agent` sent with every request
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The default timeout for each request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking HTTP client with a per-request timeout.
///
/// Requests are never retried.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| Error::invalid_input(format!("failed to set up HTTP client: {err}")))?;
        Ok(HttpClient { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET a text document (such as a registry index file).
    ///
    /// Returns `Ok(None)` if the server reports that the document doesn't exist.
    pub fn get_text(&self, url: &str) -> Result<Option<String>> {
        debug!("GET {url}");

        let query_error = |reason: String| Error::Query {
            source_id: url.to_owned(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| classify(url, err, query_error))?;

        if is_missing(response.status()) {
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .map_err(|err| classify(url, err, query_error))?;

        let text = response
            .text()
            .map_err(|err| classify(url, err, query_error))?;
        Ok(Some(text))
    }

    /// GET a binary artifact, returning the response to be read as a stream
    pub fn get_stream(&self, url: &str) -> Result<Download> {
        debug!("GET {url} (stream)");

        let download_error = |reason: String| Error::Download {
            url: url.to_owned(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| classify(url, err, download_error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(format!("server responded with {status}")));
        }

        Ok(Download {
            url: url.to_owned(),
            response,
        })
    }
}

/// The body of a download.
///
/// Read errors carry an [`Error`] naming the URL, which [`io::Error::downcast`] gets back. A body
/// that stalls for longer than the timeout gives [`Error::Timeout`].
#[derive(Debug)]
pub struct Download {
    url: String,
    response: Response,
}

impl Download {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Read for Download {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.response.read(buf).map_err(|err| {
            if is_timeout(&err) {
                let url = self.url.clone();
                io::Error::new(io::ErrorKind::TimedOut, Error::Timeout { url })
            } else {
                let kind = err.kind();
                let err = Error::Download {
                    url: self.url.clone(),
                    reason: err.to_string(),
                };
                io::Error::new(kind, err)
            }
        })
    }
}

/// Whether a failed read was caused by a timeout.
///
/// `reqwest` reports a stalled body as an error of kind [`io::ErrorKind::Other`], with the timeout
/// somewhere down its source chain.
pub fn is_timeout(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::TimedOut {
        return true;
    }

    let mut source = err
        .get_ref()
        .map(|inner| inner as &(dyn std::error::Error + 'static));
    while let Some(inner) = source {
        if let Some(err) = inner.downcast_ref::<reqwest::Error>()
            && err.is_timeout()
        {
            return true;
        }
        if let Some(err) = inner.downcast_ref::<io::Error>()
            && err.kind() == io::ErrorKind::TimedOut
        {
            return true;
        }
        source = inner.source();
    }

    false
}

/// Run a blocking request that can't be given a timeout of its own, giving up after `timeout`.
///
/// After a timeout the request keeps running on its thread and its result is dropped.
pub fn with_deadline<T, F>(url: &str, timeout: Duration, request: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("depdiff-request".to_owned())
        .spawn(move || {
            // The receiver is gone after a timeout
            let _ = sender.send(request());
        })?;

    receiver.recv_timeout(timeout).map_err(|err| match err {
        RecvTimeoutError::Timeout => Error::Timeout {
            url: url.to_owned(),
        },
        RecvTimeoutError::Disconnected => {
            Error::Io(io::Error::other(format!("request to {url} stopped unexpectedly")))
        }
    })
}

/// Statuses registries use to report a package they don't know
fn is_missing(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS
    )
}

fn classify(url: &str, err: reqwest::Error, otherwise: impl Fn(String) -> Error) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            url: url.to_owned(),
        }
    } else {
        otherwise(err.to_string())
    }
}
