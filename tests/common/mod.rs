//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod gadgets;

use reconstream::{
    make_channel, InputChannel, Loader, Message, MessageSink, MetaContainer, StreamError,
    WorkerAddress, WorkerServer,
};
use std::net::TcpListener;
use std::sync::Mutex;
use std::time::Duration;

/// Connect timeout used by distributed tests
pub fn test_timeout() -> Duration {
    Duration::from_millis(500)
}

/// Start a worker server on an ephemeral local port
pub fn spawn_worker(loader: Loader) -> WorkerAddress {
    let server = WorkerServer::bind("127.0.0.1:0", loader).expect("bind worker");
    let port = server.local_addr().expect("worker address").port();
    server.spawn().expect("start worker");
    WorkerAddress::new("127.0.0.1", port)
}

/// Address that refuses connections: the port was bound and released
pub fn refused_address() -> WorkerAddress {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe");
    let port = listener.local_addr().expect("probe address").port();
    drop(listener);
    WorkerAddress::new("127.0.0.1", port)
}

/// Closed input channel preloaded with `count` text messages
pub fn text_input(count: usize) -> InputChannel {
    let (tx, rx) = make_channel();
    for i in 0..count {
        tx.push(Message::new(format!("msg-{}", i))).expect("push");
    }
    tx.close();
    rx
}

/// Closed input of `count` text messages carrying their index under meta key `seq`
pub fn sequenced_input(count: usize) -> InputChannel {
    let (tx, rx) = make_channel();
    for i in 0..count {
        let mut meta = MetaContainer::new();
        meta.set("seq", i);
        tx.push(Message::new(format!("msg-{}", i)).with_meta(meta))
            .expect("push");
    }
    tx.close();
    rx
}

#[derive(Debug)]
pub enum SinkEvent {
    Push(Message),
    Close,
}

/// Output sink recording every push and close call in arrival order
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<SinkEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl MessageSink for RecordingSink {
    fn push(&self, message: Message) -> reconstream::Result<()> {
        let mut events = self.events.lock().unwrap();
        if matches!(events.last(), Some(SinkEvent::Close)) {
            return Err(StreamError::ChannelClosed);
        }
        events.push(SinkEvent::Push(message));
        Ok(())
    }

    fn close(&self) {
        self.events.lock().unwrap().push(SinkEvent::Close);
    }

    fn is_closed(&self) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event, SinkEvent::Close))
    }
}

/// Drain text messages from a finished stage
pub fn collect_text(output: InputChannel) -> Vec<String> {
    output
        .map(|m| m.downcast::<String>().expect("text message").0)
        .collect()
}
