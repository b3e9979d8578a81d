//! Exposure Service Client
//!
//! JSON-over-HTTP client for the network switch's forwarder endpoints.
//! The tracker only talks to the [`ExposureApi`] trait, so its batch
//! logic can run against an in-memory fake.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TrackerConfig;
use crate::error::ApiError;
use crate::types::Protocol;

const EXPOSE_PATH: &str = "/services/forwarder/expose";
const UNEXPOSE_PATH: &str = "/services/forwarder/unexpose";

/// Body of `POST /services/forwarder/expose`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposeRequest {
    /// Host-side `ip:port` to listen on
    pub local: String,
    /// Switch-side `ip:port` to forward to
    pub remote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

/// Body of `POST /services/forwarder/unexpose`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnexposeRequest {
    /// Host-side `ip:port` previously exposed
    pub local: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

/// Remote side of the tracker: tells the switch to (un)forward a port
#[async_trait]
pub trait ExposureApi: Send + Sync {
    async fn expose(&self, request: &ExposeRequest) -> std::result::Result<(), ApiError>;

    async fn unexpose(&self, request: &UnexposeRequest) -> std::result::Result<(), ApiError>;
}

/// reqwest-backed Exposure Service client
#[derive(Debug, Clone)]
pub struct ExposureClient {
    http_client: Client,
    base_url: String,
}

impl ExposureClient {
    /// Create a client for the service at `config.base_url`
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("port-tracker/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body; any 2xx is success, anything else carries the
    /// response text as the error message.
    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<(), ApiError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.http_client.post(&url).json(body).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                debug!(%url, %status, error = %e, "Failed to read error body");
                String::new()
            }
        };
        let message = match text.trim() {
            "" => status.to_string(),
            t => t.to_string(),
        };
        Err(ApiError::status(status.as_u16(), message))
    }
}

#[async_trait]
impl ExposureApi for ExposureClient {
    async fn expose(&self, request: &ExposeRequest) -> std::result::Result<(), ApiError> {
        debug!(local = %request.local, remote = %request.remote, "Exposing port");
        self.post(EXPOSE_PATH, request).await
    }

    async fn unexpose(&self, request: &UnexposeRequest) -> std::result::Result<(), ApiError> {
        debug!(local = %request.local, "Unexposing port");
        self.post(UNEXPOSE_PATH, request).await
    }
}
