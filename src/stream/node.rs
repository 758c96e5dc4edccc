//! Stage implementation contracts.
//!
//! - **`Node`** - a stage that owns its input and output for the whole run.
//! - **`PureGadget`** - a stateless message-to-message function; usable inside
//!   `ParallelProcess`/`PureDistributed` and, through [`PureNode`], as a node.
//! - **`Branch`** / **`Merge`** - the fan-out and fan-in halves of `Parallel`.

use crate::channel::{InputChannel, OutputChannel};
use crate::error::{Result, ResultExt};
use crate::types::Message;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A pipeline stage.
///
/// `process` must drain `input` before returning. The caller closes `output`
/// once `process` returns, whether it succeeded or not.
pub trait Node: Send {
    fn process(&mut self, input: InputChannel, output: OutputChannel) -> Result<()>;
}

/// Stateless one-in, one-out transformation.
pub trait PureGadget: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, message: Message) -> Result<Message>;
}

/// Runs a [`PureGadget`] as a [`Node`].
pub struct PureNode {
    gadget: Arc<dyn PureGadget>,
}

impl PureNode {
    pub fn new(gadget: Arc<dyn PureGadget>) -> Self {
        Self { gadget }
    }
}

impl Node for PureNode {
    fn process(&mut self, input: InputChannel, output: OutputChannel) -> Result<()> {
        for message in input {
            output.push(self.gadget.process(message)?)?;
        }
        Ok(())
    }
}

/// A chain of pure gadgets applied in order.
#[derive(Clone, Default)]
pub struct PureStream {
    gadgets: Vec<Arc<dyn PureGadget>>,
}

impl PureStream {
    pub fn new(gadgets: Vec<Arc<dyn PureGadget>>) -> Self {
        Self { gadgets }
    }

    pub fn process(&self, message: Message) -> Result<Message> {
        self.gadgets.iter().try_fold(message, |message, gadget| {
            gadget.process(message).context(gadget.name())
        })
    }

    pub fn len(&self) -> usize {
        self.gadgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gadgets.is_empty()
    }
}

/// Splits one input across named outputs.
pub trait Branch: Send {
    fn process(
        &mut self,
        input: InputChannel,
        outputs: BTreeMap<String, OutputChannel>,
    ) -> Result<()>;
}

/// Combines named inputs into one output.
pub trait Merge: Send {
    fn process(
        &mut self,
        inputs: BTreeMap<String, InputChannel>,
        output: OutputChannel,
    ) -> Result<()>;
}
