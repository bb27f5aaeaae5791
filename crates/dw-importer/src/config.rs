// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ImportError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ROUTER: &str = "localhost:8082";
pub const DEFAULT_RESOURCE: &str = "locationlogs";
pub const DEFAULT_DUMPFILE: &str = "locationlogs.json";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_DEPTH_PER_WORKER: usize = 5;
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on concurrent workers.
pub const MAX_WORKERS: usize = 1024;
/// Upper bound on queued records, well below tokio's semaphore limit.
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// What to do with a line that is not a valid dump record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedRecordPolicy {
    /// Treat the whole dump as untrustworthy and stop the import.
    #[default]
    Abort,
    /// Log the line and move on to the next one.
    Skip,
}

/// What to do with a record whose `$date` does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPolicy {
    /// Stop the import.
    #[default]
    Strict,
    /// Log the value and send the record with a timestamp of 0.
    Lenient,
}

/// Configuration for a single import run
#[derive(Debug, Clone)]
pub struct ImporterConfig {
    /// Router host and port (e.g., localhost:8082)
    pub router: String,
    /// API resource the records are saved under (e.g., locationlogs)
    pub resource: String,
    /// Path to the line-oriented JSON dump
    pub dumpfile: PathBuf,
    /// Number of concurrent workers, and so of in-flight HTTP calls
    pub workers: usize,
    /// Queued records allowed per worker before the reader blocks
    pub queue_depth_per_worker: usize,
    /// Deadline for each delivery call
    pub delivery_timeout: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    pub malformed_records: MalformedRecordPolicy,
    pub timestamps: TimestampPolicy,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            router: DEFAULT_ROUTER.to_string(),
            resource: DEFAULT_RESOURCE.to_string(),
            dumpfile: PathBuf::from(DEFAULT_DUMPFILE),
            workers: DEFAULT_WORKERS,
            queue_depth_per_worker: DEFAULT_QUEUE_DEPTH_PER_WORKER,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            https_proxy: None,
            malformed_records: MalformedRecordPolicy::default(),
            timestamps: TimestampPolicy::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ImporterConfig {
    /// Bulk save endpoint for the configured router and resource.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("http://{}/api/{}/save_bulk", self.router, self.resource)
    }

    /// Capacity of the work queue.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.workers.saturating_mul(self.queue_depth_per_worker)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.router.trim().is_empty() {
            return Err(ImportError::InvalidConfig(
                "router cannot be empty".to_string(),
            ));
        }

        if self.resource.trim().is_empty() || self.resource.contains('/') {
            return Err(ImportError::InvalidConfig(format!(
                "Invalid resource '{}'",
                self.resource
            )));
        }

        if self.workers == 0 {
            return Err(ImportError::InvalidConfig(
                "worker count must be greater than 0".to_string(),
            ));
        }

        if self.workers > MAX_WORKERS {
            return Err(ImportError::InvalidConfig(format!(
                "worker count {} exceeds the maximum of {MAX_WORKERS}",
                self.workers
            )));
        }

        if self.queue_depth_per_worker == 0 {
            return Err(ImportError::InvalidConfig(
                "queue depth per worker must be greater than 0".to_string(),
            ));
        }

        match self.workers.checked_mul(self.queue_depth_per_worker) {
            Some(capacity) if capacity <= MAX_QUEUE_CAPACITY => {}
            _ => {
                return Err(ImportError::InvalidConfig(format!(
                    "queue capacity of {} workers x {} records exceeds the maximum of {MAX_QUEUE_CAPACITY}",
                    self.workers, self.queue_depth_per_worker
                )));
            }
        }

        if self.delivery_timeout.is_zero() {
            return Err(ImportError::InvalidConfig(
                "delivery timeout must be greater than 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ImportError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}
