//! Failure supervision for pipeline work.
//!
//! Every unit of work (a stage thread, a distributor loop, a channel reader)
//! runs through an [`ErrorHandler`]. The handler:
//! 1. catches errors and panics, attributing them to a dotted path such as
//!    `pipeline.distributed.Distributor`,
//! 2. reports them once through `tracing`,
//! 3. records the first failure of its scope so the scope owner can re-raise
//!    it after joining its threads,
//! 4. closes the channels registered with the scope and cancels its registered
//!    inputs, so blocked siblings wake whether they wait to push or to receive.
//!
//! `ChannelClosed` is the cascading-close signal, not a failure: it is logged
//! at debug level and never recorded.

use crate::channel::{InputChannel, OutputChannel};
use crate::error::{Result, StreamError};
use crate::stream::lock;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// A reported failure, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub path: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Shared by every scope of one handler tree.
#[derive(Default)]
struct Reporter {
    failures: Mutex<Vec<Failure>>,
    threads_spawned: AtomicUsize,
}

struct Scope {
    path: String,
    failure: Mutex<Option<StreamError>>,
    teardown: Mutex<Vec<OutputChannel>>,
    /// Dropped on failure, which disconnects `cancelled`
    cancel: Mutex<Option<Sender<()>>>,
    cancelled: Receiver<()>,
}

impl Scope {
    fn new(path: String) -> Self {
        let (cancel, cancelled) = bounded(0);
        Self {
            path,
            failure: Mutex::new(None),
            teardown: Mutex::new(Vec::new()),
            cancel: Mutex::new(Some(cancel)),
            cancelled,
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Supervisor for one scope of work. Cloning yields a handle to the same scope.
#[derive(Clone)]
pub struct ErrorHandler {
    scope: Arc<Scope>,
    reporter: Arc<Reporter>,
}

impl ErrorHandler {
    /// Root handler; paths of nested scopes start at their own key.
    pub fn root() -> Self {
        Self::new("")
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scope: Arc::new(Scope::new(name.into())),
            reporter: Arc::new(Reporter::default()),
        }
    }

    /// Child scope whose path is extended by `key`.
    pub fn nested(&self, key: &str) -> Self {
        Self {
            scope: Arc::new(Scope::new(join_path(&self.scope.path, key))),
            reporter: Arc::clone(&self.reporter),
        }
    }

    pub fn path(&self) -> &str {
        &self.scope.path
    }

    /// Run `work` on the current thread under supervision.
    ///
    /// Returns `None` when it failed; the failure is then recorded in this
    /// scope and available from [`take_failure`](Self::take_failure).
    pub fn handle<T, F>(&self, name: &str, work: F) -> Option<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(work))
            .unwrap_or_else(|payload| Err(StreamError::Panic(panic_message(payload))));
        match outcome {
            Ok(value) => Some(value),
            Err(err) => {
                self.escalate(name, err);
                None
            }
        }
    }

    /// Run `work` on a new named thread under supervision.
    pub fn run<F>(&self, name: &str, work: F) -> Supervised
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let handler = self.clone();
        let thread_name = join_path(self.path(), name);
        let owned_name = name.to_string();
        let spawned = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                handler.handle(&owned_name, work);
            });

        match spawned {
            Ok(handle) => {
                self.reporter.threads_spawned.fetch_add(1, Ordering::SeqCst);
                tracing::trace!(thread = %thread_name, "Spawned supervised thread");
                Supervised {
                    name: thread_name,
                    handle: Some(handle),
                }
            }
            Err(e) => {
                self.escalate(name, StreamError::Io(e));
                Supervised {
                    name: thread_name,
                    handle: None,
                }
            }
        }
    }

    /// Record a failure that happened in `name` within this scope.
    pub fn escalate(&self, name: &str, err: StreamError) {
        if err.is_shutdown() {
            tracing::debug!(path = %join_path(self.path(), name), "Stopped by closed channel");
            return;
        }

        // An error that already carries a path was reported where it happened
        let err = if err.path().is_some() {
            err
        } else {
            let path = join_path(self.path(), name);
            let attributed = StreamError::Processing {
                path: path.clone(),
                source: Box::new(err),
            };
            tracing::error!(path = %path, "{}", attributed);
            lock(&self.reporter.failures).push(Failure {
                path,
                message: attributed.to_string(),
                at: Utc::now(),
            });
            attributed
        };

        {
            let mut slot = lock(&self.scope.failure);
            if slot.is_none() {
                *slot = Some(err);
            } else {
                tracing::debug!(scope = %self.path(), "Additional failure: {}", err);
            }
        }

        for channel in lock(&self.scope.teardown).drain(..) {
            channel.close();
        }
        lock(&self.scope.cancel).take();
    }

    /// Close `channel` if this scope fails (immediately, if it already has).
    pub fn close_on_failure(&self, channel: OutputChannel) {
        if self.has_failed() {
            channel.close();
        } else {
            lock(&self.scope.teardown).push(channel);
        }
    }

    /// End `input` for its consumer if this scope fails, even while its
    /// producer stays open and idle.
    pub fn cancel_on_failure(&self, input: &mut InputChannel) {
        input.cancel_on(self.scope.cancelled.clone());
    }

    pub fn has_failed(&self) -> bool {
        lock(&self.scope.failure).is_some()
    }

    /// First failure recorded in this scope, for the owner to re-raise.
    pub fn take_failure(&self) -> Option<StreamError> {
        lock(&self.scope.failure).take()
    }

    /// `Err` with the recorded failure, `Ok` if the scope succeeded.
    pub fn finish(&self) -> Result<()> {
        lock(&self.scope.teardown).clear();
        match self.take_failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Every failure reported anywhere in this handler tree, oldest first.
    pub fn failures(&self) -> Vec<Failure> {
        lock(&self.reporter.failures).clone()
    }

    /// Threads started through [`run`](Self::run) in this handler tree.
    pub fn threads_spawned(&self) -> usize {
        self.reporter.threads_spawned.load(Ordering::SeqCst)
    }
}

/// Handle to a thread started by [`ErrorHandler::run`].
pub struct Supervised {
    name: String,
    handle: Option<JoinHandle<()>>,
}

impl Supervised {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the thread. Its failures were already recorded by the handler.
    pub fn join(self) {
        if let Some(handle) = self.handle {
            if handle.join().is_err() {
                tracing::error!(thread = %self.name, "Supervised thread panicked outside its work");
            }
        }
    }
}
