//! Gadgets registered by integration tests

use reconstream::error::{Result, StreamError};
use reconstream::{InputChannel, Loader, Message, MetaContainer, Node, OutputChannel, PureGadget};
use std::sync::Arc;

/// Upper-cases text messages
pub struct Shout;

impl PureGadget for Shout {
    fn name(&self) -> &str {
        "Shout"
    }

    fn process(&self, message: Message) -> Result<Message> {
        let (text, meta) = message
            .downcast::<String>()
            .map_err(|m| StreamError::failed(format!("Shout expects text, got {}", m.type_name())))?;
        let mut shouted = Message::new(text.to_uppercase());
        if let Some(meta) = meta {
            shouted = shouted.with_meta(meta);
        }
        Ok(shouted)
    }
}

/// Fails on the first message it sees
pub struct Explode;

impl Node for Explode {
    fn process(&mut self, mut input: InputChannel, _output: OutputChannel) -> Result<()> {
        match input.recv() {
            Some(_) => Err(StreamError::failed("Processing failed")),
            None => Ok(()),
        }
    }
}

/// Tags each message with the worker that handled it under meta key `worker`
pub struct Stamp {
    worker: String,
}

impl PureGadget for Stamp {
    fn name(&self) -> &str {
        "Stamp"
    }

    fn process(&self, mut message: Message) -> Result<Message> {
        message
            .meta_mut()
            .get_or_insert_with(MetaContainer::new)
            .set("worker", &self.worker);
        Ok(message)
    }
}

/// Built-in plugins plus the test gadgets
pub fn test_loader() -> Loader {
    let mut loader = Loader::default();
    loader
        .register_pure_gadget("Shout", |_, _| Ok(Arc::new(Shout)))
        .register_gadget("Explode", |_, _| Ok(Box::new(Explode)));
    loader
}

/// Test loader whose `Stamp` gadget tags messages with `worker`
pub fn stamping_loader(worker: &str) -> Loader {
    let worker = worker.to_string();
    let mut loader = test_loader();
    loader.register_pure_gadget("Stamp", move |_, _| {
        Ok(Arc::new(Stamp {
            worker: worker.clone(),
        }))
    });
    loader
}
