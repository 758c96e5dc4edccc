//! The closed set of stage variants a stream is built from.

use crate::channel::{InputChannel, OutputChannel};
use crate::config::NodeConfig;
use crate::context::Context;
use crate::error::Result;
use crate::loader::Loader;
use crate::stream::error_handler::{ErrorHandler, Supervised};
use crate::stream::node::Node;
use crate::stream::{
    lock, Distributed, External, Parallel, ParallelProcess, PureDistributed,
};
use std::sync::{Arc, Mutex};

/// A single gadget stage.
pub struct NodeStage {
    name: String,
    node: Mutex<Box<dyn Node>>,
}

impl NodeStage {
    pub fn new(name: impl Into<String>, node: Box<dyn Node>) -> Self {
        Self {
            name: name.into(),
            node: Mutex::new(node),
        }
    }

    pub fn process(&self, input: InputChannel, output: OutputChannel) -> Result<()> {
        lock(&self.node).process(input, output)
    }
}

/// One stage of a stream.
pub enum Processable {
    Node(NodeStage),
    Parallel(Parallel),
    External(External),
    Distributed(Distributed),
    ParallelProcess(ParallelProcess),
    PureDistributed(PureDistributed),
}

impl Processable {
    /// Build the stage described by `config`.
    pub fn load(config: &NodeConfig, context: &Context, loader: &Loader) -> Result<Self> {
        let stage = match config {
            NodeConfig::Gadget(c) => {
                Processable::Node(NodeStage::new(c.name(), loader.load_gadget(c, context)?))
            }
            NodeConfig::Parallel(c) => Processable::Parallel(Parallel::new(c, context, loader)?),
            NodeConfig::External(c) => Processable::External(External::new(c, context, loader)?),
            NodeConfig::Distributed(c) => {
                Processable::Distributed(Distributed::new(c, context, loader)?)
            }
            NodeConfig::ParallelProcess(c) => {
                Processable::ParallelProcess(ParallelProcess::new(c, context, loader)?)
            }
            NodeConfig::PureDistributed(c) => {
                Processable::PureDistributed(PureDistributed::new(c, context, loader)?)
            }
        };
        tracing::trace!(stage = stage.name(), kind = stage.kind(), "Loaded stage");
        Ok(stage)
    }

    pub fn name(&self) -> &str {
        match self {
            Processable::Node(n) => &n.name,
            Processable::Parallel(p) => p.key(),
            Processable::External(e) => e.name(),
            Processable::Distributed(d) => d.name(),
            Processable::ParallelProcess(p) => p.name(),
            Processable::PureDistributed(p) => p.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Processable::Node(_) => "node",
            Processable::Parallel(_) => "parallel",
            Processable::External(_) => "external",
            Processable::Distributed(_) => "distributed",
            Processable::ParallelProcess(_) => "parallel_process",
            Processable::PureDistributed(_) => "pure_distributed",
        }
    }

    /// Run the stage until its input is exhausted or it fails.
    pub fn process(
        &self,
        input: InputChannel,
        output: OutputChannel,
        handler: &ErrorHandler,
    ) -> Result<()> {
        match self {
            Processable::Node(n) => n.process(input, output),
            Processable::Parallel(p) => p.process(input, output, handler),
            Processable::External(e) => e.process(input, output, handler),
            Processable::Distributed(d) => d.process(input, output, handler),
            Processable::ParallelProcess(p) => p.process(input, output, handler),
            Processable::PureDistributed(p) => p.process(input, output, handler),
        }
    }
}

/// Run `processable` on its own supervised thread.
///
/// The stage's output is closed when it returns, successful or not, so the
/// next stage always sees end-of-stream.
pub fn process_async(
    processable: Arc<Processable>,
    input: InputChannel,
    output: OutputChannel,
    handler: &ErrorHandler,
) -> Supervised {
    let name = processable.name().to_string();
    let scope = handler.clone();
    handler.run(&name, move || {
        let closer = output.clone();
        let result = processable.process(input, output, &scope);
        closer.close();
        result
    })
}
