// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record shapes flowing through the importer.
//!
//! A [`RawRecord`] is one dump line as read from disk. Workers decode it into a
//! [`DumpRecord`] (the legacy export schema), transform it into a
//! [`CanonicalRecord`] (the router's schema) and wrap it in an [`Envelope`]
//! before sending.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One input line and its 1-based position in the dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    content: Vec<u8>,
    sequence: u64,
}

impl RawRecord {
    #[must_use]
    pub fn new(content: Vec<u8>, sequence: u64) -> Self {
        Self { content, sequence }
    }

    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Lossy text form of the line, for logs that allow a manual replay.
    #[must_use]
    pub fn content_lossy(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    pub fn decode(&self) -> Result<DumpRecord, serde_json::Error> {
        serde_json::from_slice(&self.content)
    }
}

/// Extended JSON date wrapper written by the document store: `{"$date": "..."}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DumpTimestamp {
    #[serde(rename = "$date")]
    pub date: String,
}

/// A location log as exported from the legacy store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DumpRecord {
    /// `[longitude, latitude]`, in that order.
    pub loc: Vec<f64>,
    pub timestamp: DumpTimestamp,
    pub user_id: u64,
}

/// A location log in the shape the router's bulk save API accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub lon: f64,
    pub lat: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub user_id: String,
}

/// Bulk save body carrying exactly one record under the resource key.
///
/// Serializes as `{"<resource>":[{...}]}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<'a> {
    resource: &'a str,
    records: [CanonicalRecord; 1],
}

impl<'a> Envelope<'a> {
    #[must_use]
    pub fn new(resource: &'a str, record: CanonicalRecord) -> Self {
        Self {
            resource,
            records: [record],
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource
    }

    #[must_use]
    pub fn record(&self) -> &CanonicalRecord {
        &self.records[0]
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Serialize for Envelope<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.resource, &self.records)?;
        map.end()
    }
}
