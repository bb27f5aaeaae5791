// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client used to reach the router.
//!
//! Every worker shares one pooled `reqwest::Client`; the pool size is bounded
//! in practice by the worker count, since each worker has at most one call in
//! flight.

use crate::config::ImporterConfig;
use crate::errors::ImportError;
use core::time::Duration;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Builds the client for the router with the configured deadline and proxy.
///
/// Unlike a long-lived agent, an import cannot fall back to a direct
/// connection when the proxy is unusable: an invalid proxy URL is reported
/// as a configuration error.
pub fn build_client(config: &ImporterConfig) -> Result<reqwest::Client, ImportError> {
    let mut client = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(config.delivery_timeout)
        .pool_idle_timeout(Some(POOL_IDLE_TIMEOUT))
        .pool_max_idle_per_host(config.workers)
        .tcp_keepalive(Some(TCP_KEEPALIVE));

    if let Some(https_uri) = &config.https_proxy {
        let proxy = reqwest::Proxy::https(https_uri.as_str())
            .map_err(|e| ImportError::HttpClient(format!("invalid proxy {https_uri}: {e}")))?;
        client = client.proxy(proxy);
    }

    client
        .build()
        .map_err(|e| ImportError::HttpClient(e.to_string()))
}
