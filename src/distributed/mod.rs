//! Remote execution: worker selection, distributors, the session protocol and
//! the worker server.
//!
//! The coordinator side lives in the `Distributed` and `PureDistributed`
//! stages; this module provides what they are built from plus
//! [`WorkerServer`], the process that runs sessions on behalf of them.

pub mod distributor;
pub mod protocol;
pub mod remote_channel;
pub mod server;
pub mod worker;

pub use distributor::{ChannelCreator, ChunkDistributor, Distributor, RoundRobinDistributor};
pub use remote_channel::{RemoteChannel, RemoteIncoming, RemoteSink};
pub use server::WorkerServer;
pub use worker::WorkerCursor;
