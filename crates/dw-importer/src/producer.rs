// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reads the dump line by line and feeds the work queue.

use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::ImportError;
use crate::queue::WorkSender;
use crate::record::RawRecord;

const READ_BUFFER_SIZE: usize = 64 * 1024;

pub struct Producer<R> {
    reader: R,
    cancel_token: CancellationToken,
}

impl Producer<BufReader<File>> {
    /// Opens a dump file for reading.
    pub async fn open(path: &Path, cancel_token: CancellationToken) -> Result<Self, ImportError> {
        let file = File::open(path)
            .await
            .map_err(|source| ImportError::OpenInput {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(
            BufReader::with_capacity(READ_BUFFER_SIZE, file),
            cancel_token,
        ))
    }
}

impl<R> Producer<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, cancel_token: CancellationToken) -> Self {
        Producer {
            reader,
            cancel_token,
        }
    }

    /// Pushes every line into the queue, in file order, numbered from 1.
    ///
    /// Consumes the sender, so the queue is closed when this returns. Stops
    /// early with [`ImportError::Cancelled`] once the token is cancelled, and
    /// quietly when every consumer is gone. Returns how many records were
    /// enqueued.
    pub async fn run(mut self, sender: WorkSender) -> Result<u64, ImportError> {
        let mut line = Vec::with_capacity(256);
        let mut sequence: u64 = 0;

        loop {
            line.clear();
            let read = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => return Err(ImportError::Cancelled),
                read = self.reader.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(source) => {
                    return Err(ImportError::ReadInput {
                        last_sequence: sequence,
                        source,
                    })
                }
            }

            sequence += 1;
            let record = RawRecord::new(trim_line_ending(&line).to_vec(), sequence);

            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => return Err(ImportError::Cancelled),
                pushed = sender.push(record) => {
                    if pushed.is_err() {
                        debug!("Work queue has no consumers left, stopped reading at line {sequence}");
                        return Ok(sequence - 1);
                    }
                }
            }
        }

        debug!("Finished reading dump: {sequence} records");
        Ok(sequence)
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
