//! PassThroughGadget - forwards every message unchanged.

use crate::channel::{InputChannel, OutputChannel};
use crate::error::Result;
use crate::stream::node::Node;

#[derive(Debug, Default)]
pub struct PassThroughGadget {
    forwarded: u64,
}

impl PassThroughGadget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages forwarded so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}

impl Node for PassThroughGadget {
    fn process(&mut self, input: InputChannel, output: OutputChannel) -> Result<()> {
        for message in input {
            output.push(message)?;
            self.forwarded += 1;
        }
        tracing::trace!(forwarded = self.forwarded, "PassThroughGadget finished");
        Ok(())
    }
}
