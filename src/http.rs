use std::io::{Read, Write};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use thiserror::Error;

use crate::config::RequestConfig;

const USER_AGENT: &str = "text-browser/0.1.0";
const CHUNK_SIZE: usize = 512;

/// A fetched HTTP response: status, headers, and a body that can be
/// consumed exactly once, in fixed-size chunks.
pub struct PageResponse {
    pub status: u16,
    pub headers: HeaderMap,
    body: Box<dyn Read>,
}

impl std::fmt::Debug for PageResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl PageResponse {
    pub fn new(status: u16, headers: HeaderMap, body: Box<dyn Read>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// The declared content type, or an empty string when the header is
    /// absent or not valid UTF-8.
    pub fn content_type(&self) -> String {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string()
    }

    /// Read the entire body and return it as a string.
    pub fn read_text(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.read_bytes()?).into_owned())
    }

    /// Read the entire body into memory.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = self
                .body
                .read(&mut chunk)
                .context("Failed to read response body")?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
        }
        Ok(data)
    }

    /// Stream the body into a writer, returning the number of bytes written.
    pub fn copy_to(&mut self, out: &mut dyn Write) -> Result<u64> {
        let mut written = 0u64;
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = self
                .body
                .read(&mut chunk)
                .context("Failed to read response body")?;
            if n == 0 {
                break;
            }
            out.write_all(&chunk[..n])
                .context("Failed to write response body")?;
            written += n as u64;
        }
        Ok(written)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never produced an HTTP response (DNS, connection,
    /// invalid header, ...). Not recoverable by the renderer pipeline.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an error status. The response is carried
    /// so the error-renderer chain can still inspect and render it.
    #[error("HTTP error status {}", .0.status)]
    HttpStatus(PageResponse),
}

pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(request: &RequestConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    /// Perform a blocking GET. Error statuses (4xx/5xx) are returned as
    /// `FetchError::HttpStatus` with the response attached.
    pub fn fetch(&self, url: &str, request: &RequestConfig) -> Result<PageResponse, FetchError> {
        tracing::debug!(url, "fetching");

        let mut req = self.client.get(url);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if !request.params.is_empty() {
            req = req.query(&request.params);
        }

        let response = req.send()?;
        let status = response.status();
        let headers = response.headers().clone();
        let page = PageResponse::new(status.as_u16(), headers, Box::new(response));

        if status.is_client_error() || status.is_server_error() {
            Err(FetchError::HttpStatus(page))
        } else {
            Ok(page)
        }
    }
}
