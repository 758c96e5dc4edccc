//! # reconstream: streaming reconstruction pipelines
//!
//! A pipeline is a [`Stream`]: an ordered list of stages connected by
//! closeable channels, each stage on its own thread. Stages can be single
//! gadgets, parallel branches, external processes, or work fanned out to
//! remote workers.
//!
//! ## Architecture
//!
//! - **Channels**: crossbeam-backed, closeable; closing is the only
//!   cancellation signal ([`channel`])
//! - **Supervision**: every unit of work runs under an [`ErrorHandler`] that
//!   attributes failures to a dotted path and tears its scope down
//! - **Loader**: resolves plugin class names and carries the worker list
//!   ([`loader`])
//! - **Distribution**: distributors, cyclic worker failover, the session
//!   protocol and the worker server ([`distributed`])
//! - **Codecs**: the binary message formats ([`io`])
//!
//! ## Example
//!
//! ```no_run
//! use reconstream::{make_channel, Context, Loader, Message, Stream, StreamConfig};
//!
//! # fn main() -> reconstream::Result<()> {
//! let config = StreamConfig::from_toml_str(r#"
//!     key = "pipeline"
//!     [[nodes]]
//!     type = "gadget"
//!     classname = "PassThroughGadget"
//! "#)?;
//! let stream = Stream::new(&config, &Context::default(), &Loader::default())?;
//!
//! let (input, stream_input) = make_channel();
//! let (stream_output, output) = make_channel();
//! input.push(Message::new("hello".to_string()))?;
//! input.close();
//!
//! stream.run(stream_input, stream_output)?;
//! assert_eq!(output.count(), 1);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod context;
pub mod distributed;
pub mod error;
pub mod io;
pub mod loader;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use channel::{make_bounded_channel, make_channel, InputChannel, MessageSink, OutputChannel};
pub use config::{DistributionConfig, NodeConfig, ServerConfig, StreamConfig, WorkerAddress};
pub use context::Context;
pub use distributed::{Distributor, WorkerCursor, WorkerServer};
pub use error::{Result, ResultExt, StreamError};
pub use loader::Loader;
pub use stream::{ErrorHandler, Failure, Node, Processable, PureGadget, Stream};
pub use types::{Image, ImageHeader, Message, MetaContainer};
