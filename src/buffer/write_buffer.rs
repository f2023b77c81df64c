use std::thread;

use thiserror::Error;

use super::config::{ConfigError, WriteBufferConfig};
use super::request::{BufferState, WriteRequest};
use super::scope::BatchScope;
use crate::transport::BatchWriter;
use crate::value::Record;

/// Errors returned while flushing a buffer.
#[derive(Debug, Error)]
pub enum FlushError<E> {
    /// The transport failed. Pending writes are kept.
    #[error("batch write failed: {0}")]
    Transport(#[source] E),
    /// A bounded retry policy ran out of rounds with items still unprocessed.
    #[error("{remaining} request(s) still unprocessed after {rounds} flush round(s)")]
    RetriesExhausted { rounds: u32, remaining: usize },
}

impl<E> FlushError<E> {
    /// The transport error, if that is what this is.
    pub fn transport(&self) -> Option<&E> {
        match self {
            FlushError::Transport(err) => Some(err),
            FlushError::RetriesExhausted { .. } => None,
        }
    }
}

/// Accumulates puts and deletes per table and submits them in batches.
///
/// With a primary key configured, the newest request for a key replaces any
/// older one still pending in the same table, so a batch never carries two
/// writes to one item. A buffer belongs to one caller at a time; concurrent
/// batching needs one buffer per unit of work.
pub struct WriteBuffer<W> {
    writer: W,
    config: WriteBufferConfig,
    state: BufferState,
}

impl<W> WriteBuffer<W> {
    /// A buffer with the default config: threshold 25, no deduplication.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            config: WriteBufferConfig::default(),
            state: BufferState::new(),
        }
    }

    pub fn with_config(writer: W, config: WriteBufferConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            writer,
            config,
            state: BufferState::new(),
        })
    }

    pub fn config(&self) -> &WriteBufferConfig {
        &self.config
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Give back the transport. Pending writes are discarded.
    pub fn into_writer(self) -> W {
        self.writer
    }

    pub fn state(&self) -> &BufferState {
        &self.state
    }

    /// Total pending requests across all tables.
    pub fn pending_len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Pending requests for `table`, oldest first.
    pub fn pending(&self, table: &str) -> &[WriteRequest] {
        self.state
            .table(table)
            .map(|buffer| buffer.requests())
            .unwrap_or(&[])
    }

    /// Drop everything pending without sending it.
    pub fn clear(&mut self) -> BufferState {
        std::mem::take(&mut self.state)
    }

    fn enqueue(&mut self, table: &str, request: WriteRequest) {
        let key = &self.config.primary_key;
        let buffer = self.state.table_mut(table);
        let superseded = buffer.supersede(key, request.target());
        if superseded > 0 {
            tracing::trace!(table, superseded, "replaced pending write for key");
        }
        buffer.push(request);
    }
}

impl<W: BatchWriter> WriteBuffer<W> {
    /// Enqueue a put of `item`, flushing if the threshold is reached.
    pub fn put(
        &mut self,
        table: impl AsRef<str>,
        item: Record,
    ) -> Result<(), FlushError<W::Error>> {
        self.enqueue(table.as_ref(), WriteRequest::put(item));
        self.flush_if_needed().map(|_| ())
    }

    /// Enqueue a delete of the item identified by `key`, flushing if the
    /// threshold is reached.
    pub fn delete(
        &mut self,
        table: impl AsRef<str>,
        key: Record,
    ) -> Result<(), FlushError<W::Error>> {
        self.enqueue(table.as_ref(), WriteRequest::delete(key));
        self.flush_if_needed().map(|_| ())
    }

    /// Drain the buffer if the pending count has reached the threshold.
    /// Returns whether anything was sent.
    pub fn flush_if_needed(&mut self) -> Result<bool, FlushError<W::Error>> {
        if self.pending_len() < self.config.flush_threshold {
            return Ok(false);
        }
        self.drain()?;
        Ok(true)
    }

    /// Run one flush round: submit up to `flush_threshold` pending requests as
    /// one batch. The buffer then holds what the store reported as unprocessed,
    /// followed by whatever did not fit in the batch.
    ///
    /// On a transport error nothing is dropped: the buffer still holds the
    /// whole batch.
    pub fn flush(&mut self) -> Result<(), FlushError<W::Error>> {
        self.state.prune();
        if self.state.is_empty() {
            return Ok(());
        }

        let batch = self.state.take_front(self.config.flush_threshold);
        let held_back = std::mem::take(&mut self.state);
        tracing::debug!(
            tables = batch.table_names().count(),
            requests = batch.len(),
            held_back = held_back.len(),
            "flushing write batch"
        );

        match self.writer.batch_write(&batch) {
            Ok(mut unprocessed) => {
                unprocessed.prune();
                if !unprocessed.is_empty() {
                    tracing::warn!(
                        sent = batch.len(),
                        unprocessed = unprocessed.len(),
                        "store left part of the batch unprocessed"
                    );
                }
                unprocessed.append(held_back);
                self.state = unprocessed;
                Ok(())
            }
            Err(err) => {
                let mut restored = batch;
                restored.append(held_back);
                self.state = restored;
                Err(FlushError::Transport(err))
            }
        }
    }

    /// Flush repeatedly until nothing is pending.
    ///
    /// Rounds are bounded and paced by the configured [`RetryPolicy`](super::RetryPolicy);
    /// every round counts, including those that only work through a backlog
    /// larger than one batch.
    pub fn drain(&mut self) -> Result<(), FlushError<W::Error>> {
        let retry = self.config.retry;
        let mut rounds = 0u32;
        while !self.is_empty() {
            if !retry.allows(rounds) {
                return Err(FlushError::RetriesExhausted {
                    rounds,
                    remaining: self.pending_len(),
                });
            }
            if rounds > 0 && !retry.backoff.is_zero() {
                thread::sleep(retry.backoff);
            }
            self.flush()?;
            rounds = rounds.saturating_add(1);
        }
        Ok(())
    }

    /// Open a batching scope. See [`BatchScope`].
    pub fn begin(&mut self) -> BatchScope<'_, W> {
        BatchScope::new(self)
    }

    /// Run `work` inside a batching scope.
    ///
    /// If `work` succeeds the buffer is drained before its value is returned.
    /// If it fails, nothing is flushed and its error is returned as is.
    pub fn scoped<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<FlushError<W::Error>>,
    {
        match work(self) {
            Ok(value) => {
                self.drain()?;
                Ok(value)
            }
            Err(err) => {
                if !self.is_empty() {
                    tracing::debug!(
                        pending = self.pending_len(),
                        "batch scope failed; pending writes left unflushed"
                    );
                }
                Err(err)
            }
        }
    }
}
