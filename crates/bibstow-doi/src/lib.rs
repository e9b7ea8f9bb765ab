use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use thiserror::Error;
use tracing::debug;

/// The doi.org content negotiation endpoint.
pub const DEFAULT_BASE_URL: &str = "https://doi.org";

/// Default fetch timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const BIBTEX_MIME: &str = "application/x-bibtex";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("DOI {doi} resolved with HTTP status {status}")]
    Status { doi: String, status: StatusCode },
    #[error("empty BibTeX response for DOI {0}")]
    EmptyRecord(String),
}

/// Reduce a user-supplied identifier to a bare DOI.
///
/// Handles the forms people paste on a command line:
/// - `10.1234/example`
/// - `doi:10.1234/example`
/// - `https://doi.org/10.1234/example`
/// - `http://dx.doi.org/10.1234/example`
///
/// Trailing sentence punctuation is stripped. Returns `None` when no DOI is
/// present at all.
pub fn normalize_doi(input: &str) -> Option<String> {
    static DOI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b10\.\d{4,9}/\S+").unwrap());

    let found = DOI_RE.find(input.trim())?;
    let doi = found.as_str().trim_end_matches(['.', ',', ';', ':']);
    if doi.split('/').nth(1).is_none_or(str::is_empty) {
        return None;
    }
    Some(doi.to_string())
}

/// Blocking client for fetching BibTeX records from a DOI resolver.
pub struct DoiClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl DoiClient {
    /// Client against doi.org with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_options(DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Client against an alternative resolver endpoint and timeout.
    pub fn with_options(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("bibstow/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The resolution URL for a bare DOI.
    pub fn resolution_url(&self, doi: &str) -> String {
        format!("{}/{}", self.base_url, doi)
    }

    /// Fetch the BibTeX record for a DOI.
    ///
    /// One GET with an `Accept: application/x-bibtex` header, redirects
    /// followed. Any transport error or non-success status is an error; there
    /// is no retry and no partial result.
    pub fn fetch_bibtex(&self, doi: &str) -> Result<String, FetchError> {
        let url = self.resolution_url(doi);
        debug!(%url, "requesting BibTeX record");

        let resp = self.client.get(&url).header(ACCEPT, BIBTEX_MIME).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                doi: doi.to_string(),
                status,
            });
        }

        let body = resp.text()?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyRecord(doi.to_string()));
        }
        debug!(bytes = body.len(), "received BibTeX record");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// One-shot HTTP server on localhost that answers every connection with
    /// a canned response, standing in for the resolver endpoint.
    fn serve_once(response: &'static str) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).unwrap();
            stream.write_all(response.as_bytes()).unwrap();
        });
        (base_url, handle)
    }

    #[test]
    fn test_fetch_returns_record_body() {
        let (base_url, handle) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/x-bibtex\r\nContent-Length: 15\r\nConnection: close\r\n\r\n@misc{k,\n}\ntail",
        );
        let client = DoiClient::with_options(&base_url, DEFAULT_TIMEOUT).unwrap();
        let body = client.fetch_bibtex("10.1/x").unwrap();
        assert!(body.starts_with("@misc{k,"));
        handle.join().unwrap();
    }

    #[test]
    fn test_fetch_non_success_status_is_fatal() {
        let (base_url, handle) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let client = DoiClient::with_options(&base_url, DEFAULT_TIMEOUT).unwrap();
        match client.fetch_bibtex("10.1/missing") {
            Err(FetchError::Status { doi, status }) => {
                assert_eq!(doi, "10.1/missing");
                assert_eq!(status, StatusCode::NOT_FOUND);
            }
            other => panic!("expected Status error, got {other:?}"),
        }
        handle.join().unwrap();
    }

    #[test]
    fn test_fetch_blank_body_is_an_error() {
        let (base_url, handle) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n \n",
        );
        let client = DoiClient::with_options(&base_url, DEFAULT_TIMEOUT).unwrap();
        assert!(matches!(
            client.fetch_bibtex("10.1/blank"),
            Err(FetchError::EmptyRecord(doi)) if doi == "10.1/blank"
        ));
        handle.join().unwrap();
    }

    #[test]
    fn test_normalize_bare_doi() {
        assert_eq!(
            normalize_doi("10.1038/nphys1170").as_deref(),
            Some("10.1038/nphys1170")
        );
    }

    #[test]
    fn test_normalize_doi_prefix() {
        assert_eq!(
            normalize_doi("doi:10.1038/nphys1170").as_deref(),
            Some("10.1038/nphys1170")
        );
    }

    #[test]
    fn test_normalize_resolver_urls() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1016/0021-9681(87)90171-8").as_deref(),
            Some("10.1016/0021-9681(87)90171-8")
        );
        assert_eq!(
            normalize_doi("http://dx.doi.org/10.1038/nphys1170").as_deref(),
            Some("10.1038/nphys1170")
        );
    }

    #[test]
    fn test_normalize_strips_trailing_punctuation() {
        assert_eq!(
            normalize_doi("10.1038/nphys1170.").as_deref(),
            Some("10.1038/nphys1170")
        );
    }

    #[test]
    fn test_normalize_rejects_non_doi() {
        assert_eq!(normalize_doi("not-a-doi"), None);
        assert_eq!(normalize_doi(""), None);
        assert_eq!(normalize_doi("10.1038/"), None);
    }

    #[test]
    fn test_resolution_url() {
        let client = DoiClient::new().unwrap();
        assert_eq!(
            client.resolution_url("10.1038/nphys1170"),
            "https://doi.org/10.1038/nphys1170"
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = DoiClient::with_options("http://localhost:8080/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            client.resolution_url("10.1/x"),
            "http://localhost:8080/10.1/x"
        );
    }
}
