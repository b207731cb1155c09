//! `ActivityPub` HTTP client.
//!
//! Fetches remote actor and note documents and media, and posts signed
//! deliveries to remote inboxes.

#![allow(missing_docs)]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};
use vernissage_activitypub::{BaseObjectDto, PersonDto};
use vernissage_common::{AppError, AppResult, Config};

use crate::store::{DeliveryQueue, DownloadedMedia, MediaFetcher, RemoteFetcher, SignedDelivery};

const ACTIVITY_JSON: &str = "application/activity+json";
const ACCEPT_ACTIVITY: &str =
    "application/activity+json, application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// Error type for AP client operations.
#[derive(Debug, thiserror::Error)]
pub enum ApClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Request failed: {status} - {body}")]
    RequestFailed { status: u16, body: String },
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl From<ApClientError> for AppError {
    fn from(error: ApClientError) -> Self {
        match error {
            ApClientError::RequestFailed { status, .. }
                if status == StatusCode::NOT_FOUND.as_u16()
                    || status == StatusCode::GONE.as_u16() =>
            {
                Self::NotFound(error.to_string())
            }
            ApClientError::InvalidDocument(_) => Self::NotFound(error.to_string()),
            other => Self::Federation(other.to_string()),
        }
    }
}

/// `ActivityPub` HTTP client.
#[derive(Clone)]
pub struct ApClient {
    client: Client,
    user_agent: String,
}

impl ApClient {
    /// Create a new AP client identifying as `instance_url`.
    pub fn new(instance_url: &str, timeout: Duration) -> Result<Self, ApClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let user_agent = format!(
            "vernissage-rs/{} (+{instance_url})",
            env!("CARGO_PKG_VERSION")
        );

        Ok(Self { client, user_agent })
    }

    /// Create a client from application configuration.
    pub fn from_config(config: &Config) -> Result<Self, ApClientError> {
        Self::new(
            &config.server.url,
            Duration::from_secs(config.federation.http_timeout_secs),
        )
    }

    /// User agent sent with every request.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Post a signed delivery to its inbox.
    pub async fn deliver(&self, delivery: &SignedDelivery) -> Result<(), ApClientError> {
        debug!(inbox = %delivery.inbox, "Delivering activity");

        let response = self
            .client
            .post(&delivery.inbox)
            .headers(delivery.headers.clone())
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::CONTENT_TYPE, ACTIVITY_JSON)
            .header(header::ACCEPT, ACCEPT_ACTIVITY)
            .body(delivery.body.clone())
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            info!(inbox = %delivery.inbox, status = %status, "Activity delivered successfully");
            Ok(())
        } else if status == StatusCode::GONE {
            warn!(inbox = %delivery.inbox, "Remote actor is gone (410)");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            error!(
                inbox = %delivery.inbox,
                status = %status,
                body = %body,
                "Activity delivery failed"
            );
            Err(ApClientError::RequestFailed {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Fetch and decode a remote `ActivityPub` document.
    pub async fn fetch_document<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApClientError> {
        debug!(url = %url, "Fetching remote document");

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, ACCEPT_ACTIVITY)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApClientError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApClientError::InvalidDocument(e.to_string()))
    }
}

#[async_trait]
impl RemoteFetcher for ApClient {
    async fn fetch_actor(&self, url: &str) -> AppResult<PersonDto> {
        Ok(self.fetch_document(url).await?)
    }

    async fn fetch_note(&self, url: &str) -> AppResult<BaseObjectDto> {
        Ok(self.fetch_document(url).await?)
    }
}

#[async_trait]
impl MediaFetcher for ApClient {
    async fn download(&self, url: &str, media_type: Option<&str>) -> AppResult<DownloadedMedia> {
        debug!(url = %url, "Downloading remote media");

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(ApClientError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApClientError::RequestFailed {
                status: status.as_u16(),
                body: String::new(),
            }
            .into());
        }

        let served_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let data = response.bytes().await.map_err(ApClientError::from)?;

        Ok(DownloadedMedia {
            url: url.to_string(),
            media_type: media_type.map(ToString::to_string).or(served_type),
            data,
        })
    }
}

/// Delivers immediately instead of queueing; for development setups
/// without a job queue.
#[async_trait]
impl DeliveryQueue for ApClient {
    async fn enqueue(&self, delivery: SignedDelivery) -> AppResult<()> {
        self.deliver(&delivery)
            .await
            .map_err(|e| AppError::Queue(e.to_string()))
    }
}
