use std::io::Read;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::warn;

use crate::error::HarvestError;

pub struct TransportResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Transport: Send + Sync {
    fn open_stream(&self, location: &str) -> Result<TransportResponse, HarvestError>;
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub max_retries: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    max_retries: usize,
}

impl HttpTransport {
    pub fn new(options: &TransportOptions) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("harvest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HarvestError::Transport(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(options.connect_timeout)
            .timeout(options.timeout)
            .build()
            .map_err(|err| HarvestError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            max_retries: options.max_retries,
        })
    }

    fn send_with_retries(
        &self,
        location: &str,
    ) -> Result<reqwest::blocking::Response, HarvestError> {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.get(location).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        attempt += 1;
                        warn!(location, status, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        attempt += 1;
                        warn!(location, error = %err, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
                        continue;
                    }
                    return Err(HarvestError::Transport(err.to_string()));
                }
            }
        }
    }
}

impl Transport for HttpTransport {
    fn open_stream(&self, location: &str) -> Result<TransportResponse, HarvestError> {
        let response = self.send_with_retries(location)?;
        Ok(TransportResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
