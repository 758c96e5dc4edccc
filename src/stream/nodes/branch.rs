//! RoundRobinBranch - deals messages across sub-streams in key order.

use crate::channel::{InputChannel, OutputChannel};
use crate::error::{Result, StreamError};
use crate::stream::node::Branch;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct RoundRobinBranch;

impl Branch for RoundRobinBranch {
    fn process(
        &mut self,
        input: InputChannel,
        outputs: BTreeMap<String, OutputChannel>,
    ) -> Result<()> {
        let outputs: Vec<OutputChannel> = outputs.into_values().collect();
        if outputs.is_empty() {
            return Err(StreamError::Configuration(
                "RoundRobinBranch needs at least one output".to_string(),
            ));
        }
        for (index, message) in input.enumerate() {
            outputs[index % outputs.len()].push(message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::make_channel;
    use crate::types::Message;

    #[test]
    fn test_deals_in_key_order() {
        let (in_tx, in_rx) = make_channel();
        for i in 0..5u32 {
            in_tx.push(Message::new(i)).unwrap();
        }
        in_tx.close();

        let (a_tx, a_rx) = make_channel();
        let (b_tx, b_rx) = make_channel();
        let outputs = BTreeMap::from([("b".to_string(), b_tx), ("a".to_string(), a_tx)]);
        RoundRobinBranch.process(in_rx, outputs).unwrap();

        let a: Vec<u32> = a_rx.map(|m| *m.downcast_ref::<u32>().unwrap()).collect();
        let b: Vec<u32> = b_rx.map(|m| *m.downcast_ref::<u32>().unwrap()).collect();
        assert_eq!(a, vec![0, 2, 4]);
        assert_eq!(b, vec![1, 3]);
    }
}
