//! UnorderedMerge - forwards messages from all sub-streams as they arrive.

use crate::channel::{InputChannel, OutputChannel};
use crate::error::Result;
use crate::stream::node::Merge;
use crossbeam_channel::Select;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct UnorderedMerge;

impl Merge for UnorderedMerge {
    fn process(
        &mut self,
        inputs: BTreeMap<String, InputChannel>,
        output: OutputChannel,
    ) -> Result<()> {
        let mut receivers: Vec<_> = inputs
            .into_values()
            .filter_map(InputChannel::into_receiver)
            .collect();

        while !receivers.is_empty() {
            let (index, received) = {
                let mut select = Select::new();
                for receiver in &receivers {
                    select.recv(receiver);
                }
                let operation = select.select();
                let index = operation.index();
                (index, operation.recv(&receivers[index]))
            };
            match received {
                Ok(message) => output.push(message)?,
                // Disconnected: that sub-stream is done
                Err(_) => {
                    receivers.swap_remove(index);
                }
            }
        }
        Ok(())
    }
}
