//! Streams and the stage variants they are built from.
//!
//! A [`Stream`] is an ordered list of [`Processable`] stages connected by
//! channels, each stage running on its own supervised thread. Stage variants:
//!
//! - **Node** - a single gadget
//! - **Parallel** - branch into named sub-streams, merge their outputs
//! - **External** - a stage run by another process over a socket
//! - **Distributed** - fan out over remote workers through a distributor
//! - **ParallelProcess** - pure gadgets on a local thread pool, order kept
//! - **PureDistributed** - pure gadgets on remote workers, order kept

pub mod distributed;
pub mod error_handler;
pub mod executor;
pub mod external;
pub mod node;
pub mod nodes;
pub mod parallel;
pub mod parallel_process;
pub mod processable;
pub mod pure_distributed;

pub use distributed::Distributed;
pub use error_handler::{ErrorHandler, Failure, Supervised};
pub use executor::Stream;
pub use external::External;
pub use node::{Branch, Merge, Node, PureGadget, PureNode, PureStream};
pub use parallel::Parallel;
pub use parallel_process::ParallelProcess;
pub use processable::{process_async, NodeStage, Processable};
pub use pure_distributed::PureDistributed;

use std::sync::{Mutex, MutexGuard};

/// Lock ignoring poisoning; panics are already reported by the error handler.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
