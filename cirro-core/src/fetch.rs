use crate::error::{CirroError, Result};
use bytes::Bytes;
use std::time::Duration;

/// Header set on edge-to-origin fetches so the origin never redirects its
/// own fill traffic back to an edge node. Presence is the marker, the value
/// is ignored.
pub const CDN_REQUEST_HEADER: &str = "x-cdn-request";

/// Path an edge posts its advertised address to when registering.
pub const REGISTER_PATH: &str = "/cdn_register";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const REGISTER_BACKOFF_START: Duration = Duration::from_millis(500);
const REGISTER_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// OriginClient is an edge node's HTTP client towards its origin: cache
/// fill fetches and the registration handshake.
pub struct OriginClient {
    client: reqwest::Client,
    origin_addr: String,
}

impl OriginClient {
    pub fn new(origin_addr: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|error| CirroError::Internal(error.to_string()))?;

        Ok(Self {
            client,
            origin_addr,
        })
    }

    pub fn origin_addr(&self) -> &str {
        &self.origin_addr
    }

    /// Fetch `request_path` from the origin with the anti-loop marker set.
    /// `Ok(None)` means the origin does not have the file.
    pub async fn fetch(&self, request_path: &str) -> Result<Option<Bytes>> {
        let url = format!("{}{}", self.origin_addr, request_path);
        let response = self
            .client
            .get(&url)
            .header(CDN_REQUEST_HEADER, "true")
            .send()
            .await
            .map_err(|error| CirroError::OriginUnreachable(error.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CirroError::Http(format!(
                "origin returned {} for {}",
                status, request_path
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| CirroError::Http(error.to_string()))?;
        Ok(Some(body))
    }

    /// Register the edge's advertised address with the origin. The body is
    /// the plain address, no structured encoding.
    pub async fn register(&self, advertise_addr: &str) -> Result<()> {
        let url = format!("{}{}", self.origin_addr, REGISTER_PATH);
        let response = self
            .client
            .post(&url)
            .body(advertise_addr.to_string())
            .send()
            .await
            .map_err(|error| CirroError::OriginUnreachable(error.to_string()))?;

        if !response.status().is_success() {
            return Err(CirroError::Http(format!(
                "registration rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Keep registering until it succeeds. The backoff doubles from 500ms
    /// up to a 30s cap.
    pub async fn register_with_backoff(&self, advertise_addr: &str) {
        let mut backoff = REGISTER_BACKOFF_START;
        loop {
            match self.register(advertise_addr).await {
                Ok(()) => {
                    tracing::info!("Registered at origin {}", self.origin_addr);
                    return;
                }
                Err(error) => {
                    tracing::warn!(
                        "Registration at origin {} failed: {}, retrying in {:?}",
                        self.origin_addr,
                        error,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(REGISTER_BACKOFF_CAP);
                }
            }
        }
    }
}
