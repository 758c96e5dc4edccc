//! Closeable message channels between pipeline stages.
//!
//! A channel has one producer end ([`OutputChannel`]) and one consumer end
//! ([`InputChannel`]). Local channels are crossbeam channels; the producer end
//! can also be backed by any [`MessageSink`], which is how remote worker
//! sessions present themselves to distributors.
//!
//! Closing is the only cancellation signal in the system:
//! - closing the producer end lets the consumer drain what was pushed and then
//!   see end-of-stream,
//! - closing (or dropping) the consumer end makes further pushes fail with
//!   [`StreamError::ChannelClosed`], which is how an upstream stage learns that
//!   nobody is listening anymore.
//!
//! A consumer end can also be tied to cancellation signals (see
//! [`ErrorHandler::cancel_on_failure`](crate::stream::ErrorHandler::cancel_on_failure)):
//! when a signal's sender goes away, a blocked consumer wakes and sees
//! end-of-stream even though its producer is still open.

use crate::error::{Result, StreamError};
use crate::types::Message;
use crossbeam_channel::{bounded, unbounded, Receiver, Select, Sender};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Destination a producer end writes into.
pub trait MessageSink: Send + Sync {
    /// Append a message. Fails once the sink is closed.
    fn push(&self, message: Message) -> Result<()>;

    /// Mark end-of-stream. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Local sink over a crossbeam sender.
struct LocalSink {
    sender: Mutex<Option<Sender<Message>>>,
}

impl MessageSink for LocalSink {
    fn push(&self, message: Message) -> Result<()> {
        // Clone the sender out so a push blocked on a full bounded channel does
        // not hold the lock against concurrent pushers or close().
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(StreamError::ChannelClosed)?;
        sender.send(message).map_err(|_| StreamError::ChannelClosed)
    }

    fn close(&self) {
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

/// Producer end of a channel.
///
/// Cloning yields another handle to the same end: a push from any clone lands
/// in the same queue and a close from any clone closes it for all of them.
/// The end also closes when the last handle is dropped.
#[derive(Clone)]
pub struct OutputChannel {
    sink: Arc<dyn MessageSink>,
}

impl OutputChannel {
    /// Wrap an arbitrary sink as a producer end
    pub fn from_sink(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    pub fn push(&self, message: Message) -> Result<()> {
        self.sink.push(message)
    }

    pub fn close(&self) {
        self.sink.close();
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }
}

impl fmt::Debug for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputChannel")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumer end of a channel.
///
/// Iterating blocks while the channel is empty and open, yields messages in
/// push order, and ends once the producer end is closed and the queue drained.
pub struct InputChannel {
    receiver: Option<Receiver<Message>>,
    cancellations: Vec<Receiver<()>>,
}

impl InputChannel {
    /// Block for the next message; `None` at end-of-stream or once cancelled.
    pub fn recv(&mut self) -> Option<Message> {
        let receiver = self.receiver.as_ref()?;
        if self.cancellations.is_empty() {
            return receiver.recv().ok();
        }

        let received = {
            let mut select = Select::new();
            let data = select.recv(receiver);
            for cancellation in &self.cancellations {
                select.recv(cancellation);
            }
            let operation = select.select();
            let index = operation.index();
            if index == data {
                Some(operation.recv(receiver).ok())
            } else {
                let _ = operation.recv(&self.cancellations[index - 1]);
                None
            }
        };
        match received {
            Some(message) => message,
            None => {
                tracing::debug!("Input cancelled");
                self.close();
                None
            }
        }
    }

    /// End the stream for this consumer once `signal` disconnects.
    pub(crate) fn cancel_on(&mut self, signal: Receiver<()>) {
        self.cancellations.push(signal);
    }

    /// Stop consuming. Producers see `ChannelClosed` on their next push.
    pub fn close(&mut self) {
        self.receiver = None;
    }

    pub fn is_closed(&self) -> bool {
        self.receiver.is_none()
    }

    /// Messages currently buffered
    pub fn len(&self) -> usize {
        self.receiver.as_ref().map_or(0, Receiver::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn into_receiver(self) -> Option<Receiver<Message>> {
        self.receiver
    }
}

impl Iterator for InputChannel {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        self.recv()
    }
}

impl fmt::Debug for InputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputChannel")
            .field("closed", &self.is_closed())
            .field("buffered", &self.len())
            .finish()
    }
}

fn wrap(sender: Sender<Message>, receiver: Receiver<Message>) -> (OutputChannel, InputChannel) {
    let sink = LocalSink {
        sender: Mutex::new(Some(sender)),
    };
    (
        OutputChannel::from_sink(Arc::new(sink)),
        InputChannel {
            receiver: Some(receiver),
            cancellations: Vec::new(),
        },
    )
}

/// Create an unbounded channel
pub fn make_channel() -> (OutputChannel, InputChannel) {
    let (tx, rx) = unbounded();
    wrap(tx, rx)
}

/// Create a channel holding at most `capacity` messages; pushes block while full.
pub fn make_bounded_channel(capacity: usize) -> (OutputChannel, InputChannel) {
    let (tx, rx) = bounded(capacity);
    wrap(tx, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;
    use std::time::Duration;

    fn values(input: InputChannel) -> Vec<u32> {
        input
            .map(|m| *m.downcast_ref::<u32>().expect("u32 payload"))
            .collect()
    }

    #[test]
    fn test_fifo_then_end_of_stream() {
        let (output, mut input) = make_channel();
        for i in 0..5u32 {
            output.push(Message::new(i)).unwrap();
        }
        output.close();

        assert_eq!(input.len(), 5);
        let first = input.recv().unwrap();
        assert_eq!(first.downcast_ref::<u32>(), Some(&0));
        assert_eq!(values(input), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_end_of_stream_is_reported_repeatedly() {
        let (output, mut input) = make_channel();
        output.close();
        assert!(input.recv().is_none());
        assert!(input.recv().is_none());
    }

    #[test]
    fn test_push_after_close_fails() {
        let (output, _input) = make_channel();
        output.close();
        output.close();
        assert!(output.is_closed());
        assert!(matches!(
            output.push(Message::new(1u32)),
            Err(StreamError::ChannelClosed)
        ));
    }

    #[test]
    fn test_consumer_close_rejects_pushes() {
        let (output, mut input) = make_channel();
        output.push(Message::new(1u32)).unwrap();
        input.close();
        assert!(input.recv().is_none());
        assert!(output.push(Message::new(2u32)).unwrap_err().is_shutdown());
    }

    #[test]
    fn test_dropping_last_producer_closes() {
        let (output, input) = make_channel();
        let clone = output.clone();
        drop(output);
        clone.push(Message::new(7u32)).unwrap();
        drop(clone);
        assert_eq!(values(input), vec![7]);
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let (output, mut input) = make_channel();
        let consumer = thread::spawn(move || input.recv().is_none());
        thread::sleep(Duration::from_millis(20));
        output.close();
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn test_concurrent_pushes_from_clones() {
        let (output, input) = make_channel();
        let producers: Vec<_> = (0..4u32)
            .map(|p| {
                let output = output.clone();
                thread::spawn(move || {
                    for i in 0..100u32 {
                        output.push(Message::new(p * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        output.close();

        let received = values(input);
        assert_eq!(received.len(), 400);
        // Per-producer order is preserved
        for p in 0..4u32 {
            let own: Vec<_> = received.iter().filter(|v| **v / 1000 == p).collect();
            assert!(own.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_bounded_channel_applies_backpressure() {
        let (output, mut input) = make_bounded_channel(1);
        output.push(Message::new(1u32)).unwrap();

        let producer = {
            let output = output.clone();
            thread::spawn(move || output.push(Message::new(2u32)))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!producer.is_finished());

        assert!(input.recv().is_some());
        producer.join().unwrap().unwrap();
        assert_eq!(input.recv().and_then(|m| m.downcast_ref::<u32>().copied()), Some(2));
    }

    #[test]
    fn test_cancellation_wakes_idle_consumer() {
        let (output, mut input) = make_channel();
        let (signal, cancellation) = bounded::<()>(0);
        input.cancel_on(cancellation);
        output.push(Message::new(1u32)).unwrap();

        let first = input.recv().and_then(|m| m.downcast_ref::<u32>().copied());
        assert_eq!(first, Some(1));

        let consumer = thread::spawn(move || {
            let ended = input.recv().is_none();
            (ended, input.is_closed())
        });
        thread::sleep(Duration::from_millis(20));
        drop(signal);

        assert_eq!(consumer.join().unwrap(), (true, true));
        // The producer is still open but nobody listens anymore
        assert!(output.push(Message::new(2u32)).unwrap_err().is_shutdown());
    }

    proptest! {
        #[test]
        fn test_consumer_observes_exactly_what_was_pushed(
            pushed in prop::collection::vec(any::<u32>(), 0..200)
        ) {
            let (output, input) = make_channel();
            for v in &pushed {
                output.push(Message::new(*v)).unwrap();
            }
            output.close();
            prop_assert_eq!(values(input), pushed);
        }
    }
}
