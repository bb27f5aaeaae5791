// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires the producer, the work queue and the worker pool together.

use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ImporterConfig;
use crate::delivery::{Delivery, HttpDelivery};
use crate::errors::ImportError;
use crate::producer::Producer;
use crate::queue::work_queue;
use crate::worker::{Worker, WorkerConfig, WorkerReport};

/// Totals for a finished import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Lines read from the dump and handed to the workers.
    pub read: u64,
    pub delivered: u64,
    /// Records whose delivery failed; they are logged for a manual replay.
    pub failed: u64,
    /// Malformed records skipped under the skip policy.
    pub skipped: u64,
}

impl PipelineSummary {
    fn add(&mut self, report: WorkerReport) {
        self.delivered += report.delivered;
        self.failed += report.failed;
        self.skipped += report.skipped;
    }

    #[must_use]
    pub fn processed(&self) -> u64 {
        self.delivered + self.failed + self.skipped
    }
}

pub struct Pipeline {
    config: ImporterConfig,
    delivery: Arc<dyn Delivery>,
    cancel_token: CancellationToken,
}

impl Pipeline {
    /// Builds a pipeline that posts to the router named in `config`.
    pub fn new(config: ImporterConfig) -> Result<Self, ImportError> {
        config.validate()?;
        let delivery = HttpDelivery::from_config(&config)?;
        Ok(Self::with_delivery(config, Arc::new(delivery)))
    }

    /// Builds a pipeline around any delivery implementation.
    pub fn with_delivery(config: ImporterConfig, delivery: Arc<dyn Delivery>) -> Self {
        Pipeline {
            config,
            delivery,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Replaces the pipeline's cancellation token, so a caller can stop the
    /// import from outside (e.g. on Ctrl-C).
    #[must_use]
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Imports the configured dump file.
    pub async fn run(self) -> Result<PipelineSummary, ImportError> {
        self.config.validate()?;
        let producer = Producer::open(&self.config.dumpfile, self.cancel_token.clone()).await?;
        let source = self.config.dumpfile.display().to_string();
        self.drive(producer, &source).await
    }

    /// Imports from an already opened line-oriented reader.
    pub async fn run_from_reader<R>(self, reader: R) -> Result<PipelineSummary, ImportError>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        self.config.validate()?;
        let producer = Producer::new(reader, self.cancel_token.clone());
        self.drive(producer, "input stream").await
    }

    /// `source` names the input in the start-up log line.
    async fn drive<R>(
        self,
        producer: Producer<R>,
        source: &str,
    ) -> Result<PipelineSummary, ImportError>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let (tx, queue) = work_queue(self.config.queue_capacity());
        let worker_config = WorkerConfig::from(&self.config);

        info!(
            "Importing {source} into {} with {} workers (queue capacity {})",
            self.config.endpoint_url(),
            self.config.workers,
            tx.capacity()
        );

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            let worker = Worker::new(
                id,
                queue.clone(),
                Arc::clone(&self.delivery),
                worker_config.clone(),
                self.cancel_token.clone(),
            );
            workers.spawn(worker.run());
        }
        // Workers hold their own handles; ours would keep the queue open.
        drop(queue);

        let produced = producer.run(tx).await;
        if let Err(e) = &produced {
            if !matches!(e, ImportError::Cancelled) {
                error!("Stopping import: {e}");
                self.cancel_token.cancel();
            }
        }

        let mut summary = PipelineSummary::default();
        let mut fatal: Option<ImportError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(report)) => summary.add(report),
                Ok(Err(e)) => {
                    debug!("Worker stopped the import: {e}");
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    self.cancel_token.cancel();
                    fatal.get_or_insert(ImportError::WorkerPanicked(e.to_string()));
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }
        summary.read = produced?;
        if summary.processed() < summary.read && self.cancel_token.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        Ok(summary)
    }
}
