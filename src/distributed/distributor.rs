//! Distributors decide which remote channel each message goes to.
//!
//! A distributor reads the stage input and pushes messages to channels it
//! obtains from a [`ChannelCreator`]. Results coming back from those channels
//! are forwarded to the stage output by the surrounding `Distributed` stage;
//! the distributor may also push messages straight to the output.

use crate::channel::{InputChannel, OutputChannel};
use crate::config::Properties;
use crate::error::{Result, StreamError};

/// Source of fresh remote channels for a distributor.
///
/// Each call opens a new session on the next available worker.
#[cfg_attr(test, mockall::automock)]
pub trait ChannelCreator {
    fn create(&mut self) -> Result<OutputChannel>;
}

pub trait Distributor: Send {
    /// Route every message of `input`. Returns once `input` is exhausted.
    fn process(
        &mut self,
        input: &mut InputChannel,
        creator: &mut dyn ChannelCreator,
        output: &OutputChannel,
    ) -> Result<()>;
}

/// Spreads messages one by one over a fixed number of channels.
///
/// Property `channels` (default 1). Channels are opened lazily as the first
/// messages arrive.
#[derive(Debug)]
pub struct RoundRobinDistributor {
    channels: usize,
}

impl RoundRobinDistributor {
    pub fn new(channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(StreamError::Configuration(
                "RoundRobinDistributor needs at least one channel".to_string(),
            ));
        }
        Ok(Self { channels })
    }

    pub fn from_properties(properties: &Properties) -> Result<Self> {
        Self::new(properties.get_or("channels", 1)?)
    }
}

impl Distributor for RoundRobinDistributor {
    fn process(
        &mut self,
        input: &mut InputChannel,
        creator: &mut dyn ChannelCreator,
        _output: &OutputChannel,
    ) -> Result<()> {
        let mut open: Vec<OutputChannel> = Vec::with_capacity(self.channels);
        for (index, message) in input.enumerate() {
            let slot = index % self.channels;
            if slot == open.len() {
                open.push(creator.create()?);
            }
            open[slot].push(message)?;
        }
        Ok(())
    }
}

/// Sends consecutive runs of `chunk_size` messages to a fresh channel each.
///
/// Property `chunk_size` (default 1). A channel is closed as soon as its chunk
/// is complete so the worker can finish it.
#[derive(Debug)]
pub struct ChunkDistributor {
    chunk_size: usize,
}

impl ChunkDistributor {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StreamError::Configuration(
                "ChunkDistributor chunk_size must be positive".to_string(),
            ));
        }
        Ok(Self { chunk_size })
    }

    pub fn from_properties(properties: &Properties) -> Result<Self> {
        Self::new(properties.get_or("chunk_size", 1)?)
    }
}

impl Distributor for ChunkDistributor {
    fn process(
        &mut self,
        input: &mut InputChannel,
        creator: &mut dyn ChannelCreator,
        _output: &OutputChannel,
    ) -> Result<()> {
        let mut current: Option<OutputChannel> = None;
        for (index, message) in input.enumerate() {
            if index % self.chunk_size == 0 {
                if let Some(done) = current.take() {
                    done.close();
                }
                current = Some(creator.create()?);
            }
            if let Some(channel) = &current {
                channel.push(message)?;
            }
        }
        if let Some(done) = current {
            done.close();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::make_channel;
    use crate::types::Message;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn input_of(values: &[u32]) -> InputChannel {
        let (tx, rx) = make_channel();
        for v in values {
            tx.push(Message::new(*v)).unwrap();
        }
        tx.close();
        rx
    }

    /// Mock creator handing out local channels whose consumer ends are kept.
    fn local_creator(opened: Arc<Mutex<Vec<InputChannel>>>) -> MockChannelCreator {
        let mut creator = MockChannelCreator::new();
        creator.expect_create().returning(move || {
            let (tx, rx) = make_channel();
            opened.lock().unwrap().push(rx);
            Ok(tx)
        });
        creator
    }

    fn drain(channels: Vec<InputChannel>) -> Vec<Vec<u32>> {
        channels
            .into_iter()
            .map(|c| c.map(|m| *m.downcast_ref::<u32>().unwrap()).collect())
            .collect()
    }

    #[test]
    fn test_round_robin_spreads_messages() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let mut creator = local_creator(Arc::clone(&opened));
        let (output, _out) = make_channel();
        let mut distributor = RoundRobinDistributor::new(2).unwrap();

        let mut input = input_of(&[0, 1, 2, 3, 4]);
        distributor.process(&mut input, &mut creator, &output).unwrap();
        drop(creator);

        let channels = std::mem::take(&mut *opened.lock().unwrap());
        assert_eq!(drain(channels), vec![vec![0, 2, 4], vec![1, 3]]);
    }

    #[test]
    fn test_round_robin_opens_no_more_than_needed() {
        let mut creator = MockChannelCreator::new();
        creator.expect_create().times(1).returning(|| {
            let (tx, rx) = make_channel();
            std::mem::forget(rx);
            Ok(tx)
        });
        let (output, _out) = make_channel();
        let mut input = input_of(&[7]);
        RoundRobinDistributor::new(4)
            .unwrap()
            .process(&mut input, &mut creator, &output)
            .unwrap();
    }

    #[test]
    fn test_chunk_distributor_closes_finished_chunks() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let mut creator = local_creator(Arc::clone(&opened));
        let (output, _out) = make_channel();

        let mut input = input_of(&[0, 1, 2, 3, 4]);
        ChunkDistributor::new(2)
            .unwrap()
            .process(&mut input, &mut creator, &output)
            .unwrap();

        // Every channel was closed by the distributor, so draining terminates
        let channels = std::mem::take(&mut *opened.lock().unwrap());
        assert_eq!(drain(channels), vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn test_creation_failure_propagates() {
        let mut creator = MockChannelCreator::new();
        creator.expect_create().returning(|| {
            Err(StreamError::Connection {
                address: "worker:9002".to_string(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            })
        });
        let (output, _out) = make_channel();
        let mut input = input_of(&[1, 2]);
        let err = RoundRobinDistributor::new(2)
            .unwrap()
            .process(&mut input, &mut creator, &output)
            .unwrap_err();
        assert!(matches!(err, StreamError::Connection { .. }));
    }

    #[test]
    fn test_properties() {
        let props = Properties::new().with("channels", 3);
        assert_eq!(RoundRobinDistributor::from_properties(&props).unwrap().channels, 3);
        let props = Properties::new().with("chunk_size", "0");
        assert!(ChunkDistributor::from_properties(&props).is_err());
        assert_eq!(
            ChunkDistributor::from_properties(&Properties::new()).unwrap().chunk_size,
            1
        );
    }
}
