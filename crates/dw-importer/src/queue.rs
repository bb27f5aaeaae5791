// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded multi-consumer work queue between the producer and the workers.
//!
//! A bounded `tokio::sync::mpsc` channel whose receiver is shared by all
//! workers. Pushing into a full queue suspends the producer until a worker
//! takes a record; dropping the [`WorkSender`] closes the queue, after which
//! workers see the remaining records and then `None`.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::record::RawRecord;

#[must_use]
pub fn work_queue(capacity: usize) -> (WorkSender, WorkQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        WorkSender { tx },
        WorkQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer side. Dropping it closes the queue.
#[derive(Debug)]
pub struct WorkSender {
    tx: mpsc::Sender<RawRecord>,
}

impl WorkSender {
    /// Enqueues a record, waiting while the queue is full.
    ///
    /// Gives the record back if every consumer is gone.
    pub async fn push(&self, record: RawRecord) -> Result<(), RawRecord> {
        self.tx.send(record).await.map_err(|e| e.0)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer side, cheap to clone: one handle per worker.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    rx: Arc<Mutex<mpsc::Receiver<RawRecord>>>,
}

impl WorkQueue {
    /// Takes the next record, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<RawRecord> {
        self.rx.lock().await.recv().await
    }
}
