//! Error handling for reconstream
//!
//! This module defines the crate error type and a Result alias used by every
//! stage, codec and worker session.

use thiserror::Error;

/// Main error type for reconstream operations
#[derive(Error, Debug)]
pub enum StreamError {
    /// Empty or malformed stream/node configuration, unknown plugin names
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A specific worker could not be reached
    #[error("Connection to {address} failed: {source}")]
    Connection {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// A stage failed; `path` is the dotted name of the failing unit of work
    #[error("Processing error in {path}: {source}")]
    Processing {
        path: String,
        #[source]
        source: Box<StreamError>,
    },

    /// A stage's own logic rejected its input
    #[error("{0}")]
    Failed(String),

    /// Codec failures (unknown frame id, truncated payload, bad metadata)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A worker process reported a failure over the wire
    #[error("Remote error: {0}")]
    Remote(String),

    /// Push on a channel whose consumer or producer end is already closed
    #[error("Channel closed")]
    ChannelClosed,

    /// Supervised work panicked
    #[error("Panicked: {0}")]
    Panic(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StreamError>,
    },
}

impl StreamError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        StreamError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a stage failure from any displayable message
    pub fn failed(message: impl Into<String>) -> Self {
        StreamError::Failed(message.into())
    }

    /// Whether this error is the cascading-close signal rather than a failure.
    ///
    /// A stage whose downstream consumer went away sees `ChannelClosed` on push;
    /// that is how teardown reaches it, not something to report.
    pub fn is_shutdown(&self) -> bool {
        match self {
            StreamError::ChannelClosed => true,
            StreamError::WithContext { source, .. } => source.is_shutdown(),
            _ => false,
        }
    }

    /// Dotted path of the unit of work that failed, if the error was attributed.
    pub fn path(&self) -> Option<&str> {
        match self {
            StreamError::Processing { path, .. } => Some(path),
            StreamError::WithContext { source, .. } => source.path(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

/// Result type alias for reconstream operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
