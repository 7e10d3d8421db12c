#![forbid(unsafe_code)]

//! HTTP seam used for startup fetches and the remote backend.
//!
//! The engine never talks to a socket itself. [`HttpTransport`] is the only
//! way out, which keeps tests free of network access. With the `http`
//! feature, [`ReqwestTransport`] provides a blocking implementation.

use crate::error::TransportError;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP client.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
    fn post_json(&self, url: &str, body: &str) -> Result<HttpResponse, TransportError>;
}

#[cfg(feature = "http")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(feature = "http")]
mod reqwest_transport {
    use super::{HttpResponse, HttpTransport};
    use crate::error::TransportError;

    /// [`HttpTransport`] over `reqwest::blocking`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::blocking::Client,
        base_url: String,
    }

    impl ReqwestTransport {
        /// `base_url` is prepended to every path, e.g. `http://127.0.0.1:8050`.
        #[must_use]
        pub fn new(base_url: impl Into<String>) -> Self {
            Self {
                client: reqwest::blocking::Client::new(),
                base_url: base_url.into(),
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base_url.trim_end_matches('/'), path)
        }

        fn finish(url: &str, response: reqwest::Result<reqwest::blocking::Response>) -> Result<HttpResponse, TransportError> {
            let failed = |e: reqwest::Error| TransportError::Request {
                url: url.to_string(),
                message: e.to_string(),
            };
            let response = response.map_err(failed)?;
            let status = response.status().as_u16();
            let body = response.text().map_err(failed)?;
            Ok(HttpResponse { status, body })
        }
    }

    impl HttpTransport for ReqwestTransport {
        fn get(&self, path: &str) -> Result<HttpResponse, TransportError> {
            let url = self.url(path);
            Self::finish(&url, self.client.get(&url).send())
        }

        fn post_json(&self, path: &str, body: &str) -> Result<HttpResponse, TransportError> {
            let url = self.url(path);
            let request = self
                .client
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.to_string());
            Self::finish(&url, request.send())
        }
    }
}
