// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of envelopes to the router's bulk save endpoint.
//!
//! Each call makes exactly one attempt. There is no retry, no idempotency key
//! and no deduplication: sending the same envelope twice produces two writes
//! on the router.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::config::ImporterConfig;
use crate::errors::{DeliveryError, ImportError};
use crate::http::build_client;
use crate::record::Envelope;

#[async_trait]
pub trait Delivery: Send + Sync {
    /// Sends one envelope. Returns once the router has answered, or the
    /// attempt has failed.
    async fn deliver(&self, envelope: &Envelope<'_>) -> Result<(), DeliveryError>;
}

/// Posts envelopes as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDelivery {
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        HttpDelivery { client, endpoint }
    }

    pub fn from_config(config: &ImporterConfig) -> Result<Self, ImportError> {
        Ok(Self::new(build_client(config)?, config.endpoint_url()))
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    async fn deliver(&self, envelope: &Envelope<'_>) -> Result<(), DeliveryError> {
        // The body is complete before the request starts, so a failed
        // serialization never reaches the wire.
        let body = envelope
            .to_json()
            .map_err(|e| DeliveryError::Payload(e.to_string()))?;

        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Destination(e.status(), e.to_string()))?;

        let status = resp.status();
        // Always read the body to the end so the connection is released.
        let drained = resp.bytes().await;

        if status.is_success() {
            if let Err(e) = drained {
                debug!("Failed to drain response body: {e}");
            }
            return Ok(());
        }

        let text = drained
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        Err(DeliveryError::Destination(Some(status), text))
    }
}
