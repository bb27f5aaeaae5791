// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::path::PathBuf;

/// Conditions that terminate the whole import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unable to open dump {path}: {source}")]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to read dump after line {last_sequence}: {source}")]
    ReadInput {
        last_sequence: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse record {sequence}: {reason} (string: {content})")]
    MalformedRecord {
        sequence: u64,
        reason: String,
        content: String,
    },

    #[error("Unable to parse timestamp {value:?} of record {sequence}: {reason}")]
    InvalidTimestamp {
        sequence: u64,
        value: String,
        reason: String,
    },

    #[error("Unable to encode record {sequence}: {reason}")]
    Encode { sequence: u64, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Import cancelled")]
    Cancelled,

    #[error("Worker stopped unexpectedly: {0}")]
    WorkerPanicked(String),
}

/// Reasons a dump record cannot be turned into a wire record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("expected 2 coordinates in loc, got {0}")]
    MissingCoordinates(usize),

    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

/// Outcome of a failed delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The envelope could not be serialized; nothing was sent.
    #[error("Failed to prepare payload: {0}")]
    Payload(String),

    /// The router could not be reached or answered with a non-success status.
    #[error("Error shipping data: {0:?} {1}")]
    Destination(Option<StatusCode>, String),
}
