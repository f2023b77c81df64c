use std::ops::{Deref, DerefMut};

use super::write_buffer::{FlushError, WriteBuffer};
use crate::transport::BatchWriter;

/// An open batching scope over a [`WriteBuffer`].
///
/// Writes go through the scope (it derefs to the buffer). Close it with
/// [`end`](Self::end): a successful end drains the buffer; an unsuccessful one
/// leaves pending writes where they are. Dropping a scope without ending it
/// behaves like an unsuccessful end.
///
/// ```ignore
/// let mut scope = buffer.begin();
/// scope.put("users", user)?;
/// scope.delete("users", stale_key)?;
/// scope.end(true)?;
/// ```
pub struct BatchScope<'a, W: BatchWriter> {
    buffer: &'a mut WriteBuffer<W>,
    ended: bool,
}

impl<'a, W: BatchWriter> BatchScope<'a, W> {
    pub(crate) fn new(buffer: &'a mut WriteBuffer<W>) -> Self {
        Self {
            buffer,
            ended: false,
        }
    }

    /// Close the scope, draining the buffer if `success`.
    pub fn end(mut self, success: bool) -> Result<(), FlushError<W::Error>> {
        self.ended = true;
        if success {
            self.buffer.drain()
        } else {
            log_abandoned(&*self.buffer);
            Ok(())
        }
    }

    /// Shorthand for `end(true)`.
    pub fn commit(self) -> Result<(), FlushError<W::Error>> {
        self.end(true)
    }

    /// Shorthand for `end(false)`.
    pub fn abandon(self) {
        // An unsuccessful end never flushes, so it cannot fail.
        let _ = self.end(false);
    }
}

fn log_abandoned<W>(buffer: &WriteBuffer<W>) {
    if !buffer.is_empty() {
        tracing::debug!(
            pending = buffer.pending_len(),
            "batch scope abandoned; pending writes left unflushed"
        );
    }
}

impl<W: BatchWriter> Deref for BatchScope<'_, W> {
    type Target = WriteBuffer<W>;

    fn deref(&self) -> &Self::Target {
        self.buffer
    }
}

impl<W: BatchWriter> DerefMut for BatchScope<'_, W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer
    }
}

impl<W: BatchWriter> Drop for BatchScope<'_, W> {
    fn drop(&mut self) {
        if !self.ended {
            log_abandoned(&*self.buffer);
        }
    }
}
