// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Worker loop: dequeue, decode, transform, deliver, report.
//!
//! Workers are symmetric and share nothing but the queue and the cancellation
//! token. A delivery failure only affects its own record; a malformed record
//! (under [`MalformedRecordPolicy::Abort`]) or a bad timestamp (under
//! [`TimestampPolicy::Strict`]) cancels the whole import.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ImporterConfig, MalformedRecordPolicy, TimestampPolicy};
use crate::delivery::Delivery;
use crate::errors::{DeliveryError, ImportError, TransformError};
use crate::queue::WorkQueue;
use crate::record::{Envelope, RawRecord};
use crate::transform::{transform, transform_with_timestamp};

/// Per-record settings every worker shares.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub resource: Arc<str>,
    pub malformed_records: MalformedRecordPolicy,
    pub timestamps: TimestampPolicy,
}

impl From<&ImporterConfig> for WorkerConfig {
    fn from(config: &ImporterConfig) -> Self {
        WorkerConfig {
            resource: Arc::from(config.resource.as_str()),
            malformed_records: config.malformed_records,
            timestamps: config.timestamps,
        }
    }
}

/// What a worker did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl WorkerReport {
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.delivered + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Failed,
    Skipped,
}

pub struct Worker {
    id: usize,
    queue: WorkQueue,
    delivery: Arc<dyn Delivery>,
    config: WorkerConfig,
    cancel_token: CancellationToken,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: WorkQueue,
        delivery: Arc<dyn Delivery>,
        config: WorkerConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Worker {
            id,
            queue,
            delivery,
            config,
            cancel_token,
        }
    }

    /// Processes records until the queue is closed and drained, or the
    /// import is cancelled.
    ///
    /// On a fatal record the token is cancelled before the error is returned,
    /// so the producer and the other workers stop too.
    pub async fn run(self) -> Result<WorkerReport, ImportError> {
        let mut report = WorkerReport::default();
        debug!(worker = self.id, "Worker started");

        loop {
            let record = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    debug!(worker = self.id, "Worker cancelled");
                    break;
                }
                next = self.queue.next() => match next {
                    Some(record) => record,
                    None => break,
                },
            };

            match self.process(&record).await {
                Ok(Outcome::Delivered) => report.delivered += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    self.cancel_token.cancel();
                    return Err(e);
                }
            }
        }

        debug!(
            worker = self.id,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Worker finished"
        );
        Ok(report)
    }

    async fn process(&self, record: &RawRecord) -> Result<Outcome, ImportError> {
        let sequence = record.sequence();

        let dump = match record.decode() {
            Ok(dump) => dump,
            Err(e) => return self.malformed(record, e.to_string()),
        };

        let canonical = match transform(&dump) {
            Ok(canonical) => canonical,
            Err(e @ TransformError::MissingCoordinates(_)) => {
                return self.malformed(record, e.to_string())
            }
            Err(TransformError::InvalidTimestamp { value, reason }) => {
                if self.config.timestamps == TimestampPolicy::Strict {
                    return Err(ImportError::InvalidTimestamp {
                        sequence,
                        value,
                        reason,
                    });
                }
                warn!(
                    worker = self.id,
                    sequence, "Unable to parse timestamp {value:?}: {reason}, sending 0"
                );
                match transform_with_timestamp(&dump, 0) {
                    Ok(canonical) => canonical,
                    Err(e) => return self.malformed(record, e.to_string()),
                }
            }
        };

        let envelope = Envelope::new(&self.config.resource, canonical);
        match self.delivery.deliver(&envelope).await {
            Ok(()) => {
                info!(worker = self.id, sequence, "Processed {sequence}");
                Ok(Outcome::Delivered)
            }
            Err(DeliveryError::Payload(reason)) => Err(ImportError::Encode { sequence, reason }),
            Err(e) => {
                warn!(
                    worker = self.id,
                    sequence,
                    "Failed sending record {sequence}: {e} (string: {})",
                    record.content_lossy()
                );
                Ok(Outcome::Failed)
            }
        }
    }

    fn malformed(&self, record: &RawRecord, reason: String) -> Result<Outcome, ImportError> {
        match self.config.malformed_records {
            MalformedRecordPolicy::Abort => Err(ImportError::MalformedRecord {
                sequence: record.sequence(),
                reason,
                content: record.content_lossy(),
            }),
            MalformedRecordPolicy::Skip => {
                warn!(
                    worker = self.id,
                    sequence = record.sequence(),
                    "Skipping record {}: {reason} (string: {})",
                    record.sequence(),
                    record.content_lossy()
                );
                Ok(Outcome::Skipped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::work_queue;
    use crate::record::CanonicalRecord;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    const VALID: &str =
        r#"{"loc":[4.895,52.370],"timestamp":{"$date":"2020-01-02T03:04:05Z"},"user_id":7}"#;

    /// Records every envelope; fails the ones whose user id is listed.
    #[derive(Default)]
    struct RecordingDelivery {
        sent: Mutex<Vec<(String, CanonicalRecord)>>,
        reject_user_ids: Vec<String>,
    }

    #[async_trait]
    impl Delivery for RecordingDelivery {
        async fn deliver(&self, envelope: &Envelope<'_>) -> Result<(), DeliveryError> {
            let record = envelope.record().clone();
            let rejected = self.reject_user_ids.contains(&record.user_id);
            self.sent
                .lock()
                .unwrap()
                .push((envelope.resource().to_string(), record));
            if rejected {
                return Err(DeliveryError::Destination(
                    Some(StatusCode::BAD_GATEWAY),
                    "bad gateway".to_string(),
                ));
            }
            Ok(())
        }
    }

    fn worker_config(
        malformed_records: MalformedRecordPolicy,
        timestamps: TimestampPolicy,
    ) -> WorkerConfig {
        WorkerConfig {
            resource: Arc::from("locationlogs"),
            malformed_records,
            timestamps,
        }
    }

    async fn run_worker(
        lines: &[&str],
        delivery: Arc<RecordingDelivery>,
        config: WorkerConfig,
    ) -> (Result<WorkerReport, ImportError>, CancellationToken) {
        let (tx, queue) = work_queue(lines.len() + 1);
        for (i, line) in lines.iter().enumerate() {
            tx.push(RawRecord::new(line.as_bytes().to_vec(), i as u64 + 1))
                .await
                .expect("open queue");
        }
        drop(tx);

        let cancel_token = CancellationToken::new();
        let worker = Worker::new(1, queue, delivery, config, cancel_token.clone());
        (worker.run().await, cancel_token)
    }

    #[tokio::test]
    async fn test_delivers_transformed_records() {
        let delivery = Arc::new(RecordingDelivery::default());
        let (result, cancel_token) = run_worker(
            &[VALID, VALID],
            Arc::clone(&delivery),
            worker_config(MalformedRecordPolicy::Abort, TimestampPolicy::Strict),
        )
        .await;

        let report = result.expect("no fatal record");
        assert_eq!(report.delivered, 2);
        assert_eq!(report.processed(), 2);
        assert!(!cancel_token.is_cancelled());

        let sent = delivery.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "locationlogs");
        assert_eq!(
            sent[0].1,
            CanonicalRecord {
                lon: 4.895,
                lat: 52.370,
                timestamp: 1_577_934_245,
                user_id: "7".to_string(),
            }
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_progress_is_logged_at_info() {
        let delivery = Arc::new(RecordingDelivery::default());
        let (result, _) = run_worker(
            &[VALID, VALID],
            Arc::clone(&delivery),
            worker_config(MalformedRecordPolicy::Abort, TimestampPolicy::Strict),
        )
        .await;
        assert_eq!(result.expect("no fatal record").delivered, 2);

        logs_assert(|lines: &[&str]| {
            for sequence in [1, 2] {
                let message = format!("Processed {sequence}");
                if !lines
                    .iter()
                    .any(|line| line.contains(" INFO ") && line.contains(&message))
                {
                    return Err(format!("no INFO line for {message:?}"));
                }
            }
            Ok(())
        });
    }

    #[tokio::test]
    async fn test_missing_latitude_aborts() {
        let delivery = Arc::new(RecordingDelivery::default());
        let (result, cancel_token) = run_worker(
            &[
                r#"{"loc":[4.895],"timestamp":{"$date":"2020-01-02T03:04:05Z"},"user_id":7}"#,
                VALID,
            ],
            Arc::clone(&delivery),
            worker_config(MalformedRecordPolicy::Abort, TimestampPolicy::Strict),
        )
        .await;

        match result {
            Err(ImportError::MalformedRecord { sequence, .. }) => assert_eq!(sequence, 1),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(cancel_token.is_cancelled());
        assert!(delivery.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_aborts() {
        let delivery = Arc::new(RecordingDelivery::default());
        let (result, _) = run_worker(
            &[VALID, "not json"],
            Arc::clone(&delivery),
            worker_config(MalformedRecordPolicy::Abort, TimestampPolicy::Strict),
        )
        .await;

        match result {
            Err(ImportError::MalformedRecord {
                sequence, content, ..
            }) => {
                assert_eq!(sequence, 2);
                assert_eq!(content, "not json");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(delivery.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_skip_policy_continues() {
        let delivery = Arc::new(RecordingDelivery::default());
        let (result, cancel_token) = run_worker(
            &["not json", VALID],
            Arc::clone(&delivery),
            worker_config(MalformedRecordPolicy::Skip, TimestampPolicy::Strict),
        )
        .await;

        let report = result.expect("skipped records are not fatal");
        assert_eq!(report.skipped, 1);
        assert_eq!(report.delivered, 1);
        assert!(!cancel_token.is_cancelled());
        assert!(logs_contain("Skipping record 1"));
    }

    #[tokio::test]
    async fn test_strict_timestamps_abort() {
        let delivery = Arc::new(RecordingDelivery::default());
        let (result, _) = run_worker(
            &[r#"{"loc":[1.0,2.0],"timestamp":{"$date":"yesterday"},"user_id":3}"#],
            Arc::clone(&delivery),
            worker_config(MalformedRecordPolicy::Skip, TimestampPolicy::Strict),
        )
        .await;

        match result {
            Err(ImportError::InvalidTimestamp { sequence, value, .. }) => {
                assert_eq!(sequence, 1);
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(delivery.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lenient_timestamps_send_zero() {
        let delivery = Arc::new(RecordingDelivery::default());
        let (result, _) = run_worker(
            &[r#"{"loc":[1.0,2.0],"timestamp":{"$date":"yesterday"},"user_id":3}"#],
            Arc::clone(&delivery),
            worker_config(MalformedRecordPolicy::Abort, TimestampPolicy::Lenient),
        )
        .await;

        assert_eq!(result.expect("lenient").delivered, 1);
        let sent = delivery.sent.lock().unwrap();
        assert_eq!(sent[0].1.timestamp, 0);
        assert_eq!(sent[0].1.user_id, "3");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_delivery_failure_is_not_fatal() {
        let delivery = Arc::new(RecordingDelivery {
            reject_user_ids: vec!["7".to_string()],
            ..Default::default()
        });
        let other_user =
            r#"{"loc":[1.0,2.0],"timestamp":{"$date":"2020-01-02T03:04:05Z"},"user_id":8}"#;
        let (result, cancel_token) = run_worker(
            &[VALID, other_user],
            Arc::clone(&delivery),
            worker_config(MalformedRecordPolicy::Abort, TimestampPolicy::Strict),
        )
        .await;

        let report = result.expect("delivery failures are not fatal");
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert!(!cancel_token.is_cancelled());
        assert!(logs_contain("Failed sending record 1"));
        assert!(logs_contain(r#""user_id":7"#));
    }

    #[tokio::test]
    async fn test_cancelled_worker_stops() {
        let (_tx, queue) = work_queue(1);
        let cancel_token = CancellationToken::new();
        cancel_token.cancel();
        let worker = Worker::new(
            3,
            queue,
            Arc::new(RecordingDelivery::default()),
            worker_config(MalformedRecordPolicy::Abort, TimestampPolicy::Strict),
            cancel_token,
        );
        assert_eq!(worker.run().await.expect("clean stop"), WorkerReport::default());
    }

    #[test]
    fn test_worker_config_from_importer_config() {
        let config = ImporterConfig {
            resource: "tracks".to_string(),
            malformed_records: MalformedRecordPolicy::Skip,
            ..Default::default()
        };
        let worker_config = WorkerConfig::from(&config);
        assert_eq!(&*worker_config.resource, "tracks");
        assert_eq!(worker_config.malformed_records, MalformedRecordPolicy::Skip);
        assert_eq!(worker_config.timestamps, TimestampPolicy::Strict);
    }
}
