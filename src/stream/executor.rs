//! Linear stream execution.

use crate::channel::{make_channel, InputChannel, OutputChannel};
use crate::config::StreamConfig;
use crate::context::Context;
use crate::error::{Result, StreamError};
use crate::loader::Loader;
use crate::stream::error_handler::ErrorHandler;
use crate::stream::processable::{process_async, Processable};
use std::sync::Arc;

/// Stages connected head to tail.
///
/// For N stages, N-1 internal channels are created per run: stage 0 reads the
/// stream input, stage N-1 writes the stream output, and stage i writes to the
/// channel stage i+1 reads.
pub struct Stream {
    key: String,
    nodes: Vec<Arc<Processable>>,
}

impl Stream {
    /// Build every stage. Fails before anything runs if the config is empty
    /// or names an unknown plugin.
    pub fn new(config: &StreamConfig, context: &Context, loader: &Loader) -> Result<Self> {
        if config.nodes.is_empty() {
            return Err(StreamError::Configuration(format!(
                "Stream {:?} has no nodes",
                config.key
            )));
        }

        let nodes = config
            .nodes
            .iter()
            .map(|node| Processable::load(node, context, loader).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(key = %config.key, stages = nodes.len(), "Built stream");
        Ok(Self {
            key: config.key.clone(),
            nodes,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stage names in order
    pub fn stage_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.name()).collect()
    }

    /// Run every stage to completion.
    ///
    /// All stage threads are joined before returning. The first failure in
    /// the stream, attributed to its path, is returned.
    pub fn process(
        &self,
        input: InputChannel,
        output: OutputChannel,
        handler: &ErrorHandler,
    ) -> Result<()> {
        let scope = handler.nested(&self.key);

        let mut inputs = Vec::with_capacity(self.nodes.len());
        let mut outputs = Vec::with_capacity(self.nodes.len());
        inputs.push(input);
        for _ in 1..self.nodes.len() {
            let (tx, rx) = make_channel();
            scope.close_on_failure(tx.clone());
            outputs.push(tx);
            inputs.push(rx);
        }
        scope.close_on_failure(output.clone());
        outputs.push(output.clone());
        for input in inputs.iter_mut() {
            scope.cancel_on_failure(input);
        }

        let threads: Vec<_> = self
            .nodes
            .iter()
            .zip(inputs.into_iter().zip(outputs))
            .map(|(node, (input, output))| process_async(Arc::clone(node), input, output, &scope))
            .collect();

        for thread in threads {
            thread.join();
        }
        output.close();

        let result = scope.finish();
        match &result {
            Ok(()) => tracing::debug!(key = %self.key, "Stream finished"),
            Err(e) => tracing::debug!(key = %self.key, "Stream failed: {}", e),
        }
        result
    }

    /// Run under a fresh root handler
    pub fn run(&self, input: InputChannel, output: OutputChannel) -> Result<()> {
        self.process(input, output, &ErrorHandler::root())
    }
}
