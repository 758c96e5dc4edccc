//! Cyclic worker selection with failover.

use crate::config::WorkerAddress;
use crate::error::{Result, StreamError};

/// Position in a fixed, non-empty worker list.
///
/// [`acquire`](Self::acquire) tries workers starting at the current position
/// and wraps around at most once. On success the position moves one past the
/// worker that answered, so consecutive acquisitions spread across workers.
/// If every worker fails the position is left where it started.
#[derive(Debug, Clone)]
pub struct WorkerCursor {
    workers: Vec<WorkerAddress>,
    position: usize,
}

impl WorkerCursor {
    pub fn new(workers: Vec<WorkerAddress>) -> Result<Self> {
        if workers.is_empty() {
            return Err(StreamError::Configuration(
                "No workers configured for distributed processing".to_string(),
            ));
        }
        Ok(Self {
            workers,
            position: 0,
        })
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> &WorkerAddress {
        &self.workers[self.position]
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workers(&self) -> &[WorkerAddress] {
        &self.workers
    }

    fn advance(&mut self) {
        self.position = (self.position + 1) % self.workers.len();
    }

    /// Open a resource on the first worker that accepts, trying each worker once.
    ///
    /// Only [`StreamError::Connection`] moves on to the next worker; any other
    /// error is returned at once with the position restored. Returns the last
    /// worker's error if all of them refuse.
    pub fn acquire<T, F>(&mut self, mut open: F) -> Result<T>
    where
        F: FnMut(&WorkerAddress) -> Result<T>,
    {
        let start = self.position;
        loop {
            let address = &self.workers[self.position];
            match open(address) {
                Ok(value) => {
                    tracing::debug!(worker = %address, "Acquired worker");
                    self.advance();
                    return Ok(value);
                }
                Err(err @ StreamError::Connection { .. }) => {
                    tracing::warn!(worker = %address, "Worker unavailable: {}", err);
                    self.advance();
                    if self.position == start {
                        return Err(err);
                    }
                }
                Err(err) => {
                    // Not a reachability failure
                    self.position = start;
                    return Err(err);
                }
            }
        }
    }
}
