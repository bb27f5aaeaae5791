// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mapping from the legacy dump schema to the router's wire schema.

use chrono::NaiveDateTime;

use crate::errors::TransformError;
use crate::record::{CanonicalRecord, DumpRecord};

/// Layout of the `$date` strings in the dump: UTC, literal `Z`, optional fraction.
pub const DUMP_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Converts a dump record into its wire form.
///
/// Coordinates map positionally (`loc[0]` is longitude, `loc[1]` latitude),
/// the timestamp is parsed with [`DUMP_TIMESTAMP_FORMAT`] and truncated to
/// whole seconds, and the user id becomes its plain decimal string.
pub fn transform(dump: &DumpRecord) -> Result<CanonicalRecord, TransformError> {
    let (lon, lat) = coordinates(dump)?;
    let timestamp = parse_timestamp(&dump.timestamp.date)?;
    Ok(CanonicalRecord {
        lon,
        lat,
        timestamp,
        user_id: dump.user_id.to_string(),
    })
}

/// Same as [`transform`] but with a caller-supplied timestamp, for records
/// whose `$date` is unusable and the caller decided to keep going.
pub fn transform_with_timestamp(
    dump: &DumpRecord,
    timestamp: i64,
) -> Result<CanonicalRecord, TransformError> {
    let (lon, lat) = coordinates(dump)?;
    Ok(CanonicalRecord {
        lon,
        lat,
        timestamp,
        user_id: dump.user_id.to_string(),
    })
}

/// Parses a dump `$date` value into seconds since the Unix epoch.
pub fn parse_timestamp(value: &str) -> Result<i64, TransformError> {
    NaiveDateTime::parse_from_str(value, DUMP_TIMESTAMP_FORMAT)
        .map(|parsed| parsed.and_utc().timestamp())
        .map_err(|e| TransformError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn coordinates(dump: &DumpRecord) -> Result<(f64, f64), TransformError> {
    match dump.loc.as_slice() {
        [lon, lat, ..] => Ok((*lon, *lat)),
        other => Err(TransformError::MissingCoordinates(other.len())),
    }
}
