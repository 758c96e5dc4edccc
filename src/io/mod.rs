//! Message codecs.
//!
//! Every message on the wire is a `u16` id followed by a body. Readers are
//! selected by id; writers are tried in order and the first one that accepts a
//! message serializes it, id included.
//!
//! The same [`Codecs`] set is used for worker sessions, external modules and
//! persisted output.

pub mod image;
pub mod primitives;
pub mod text;

pub use image::{ImageReader, ImageWriter};
pub use text::{TextReader, TextWriter};

use crate::error::{Result, StreamError};
use crate::types::Message;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

/// Session configuration frame (worker config JSON)
pub const CONFIG: u16 = 2;
/// Session header frame (context JSON)
pub const HEADER: u16 = 3;
/// End of the sender's message stream
pub const CLOSE: u16 = 4;
pub const TEXT: u16 = 5;
/// Failure report carrying the failing path and message
pub const ERROR: u16 = 8;
pub const IMAGE: u16 = 1022;

/// Decodes message bodies of one frame id.
pub trait Reader: Send + Sync {
    /// Frame id this reader handles
    fn slot(&self) -> u16;

    /// Read one message body; the id has already been consumed.
    fn read(&self, stream: &mut dyn Read) -> Result<Message>;
}

/// Encodes messages of the payload types it accepts.
pub trait Writer: Send + Sync {
    fn accepts(&self, message: &Message) -> bool;

    /// Write the frame id and body.
    fn write(&self, stream: &mut dyn Write, message: Message) -> Result<()>;
}

/// Ordered codec lists for one connection.
#[derive(Clone, Default)]
pub struct Codecs {
    readers: HashMap<u16, Arc<dyn Reader>>,
    writers: Vec<Arc<dyn Writer>>,
}

impl Codecs {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in readers and writers
    pub fn builtin() -> Self {
        Self::new()
            .with_reader(Arc::new(ImageReader))
            .with_reader(Arc::new(TextReader))
            .with_writer(Arc::new(ImageWriter))
            .with_writer(Arc::new(TextWriter))
    }

    /// Register a reader under its own slot
    pub fn with_reader(self, reader: Arc<dyn Reader>) -> Self {
        let slot = reader.slot();
        self.with_reader_at(slot, reader)
    }

    /// Register a reader under an explicit slot
    pub fn with_reader_at(mut self, slot: u16, reader: Arc<dyn Reader>) -> Self {
        self.readers.insert(slot, reader);
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn Writer>) -> Self {
        self.writers.push(writer);
        self
    }

    pub fn accepts(&self, message: &Message) -> bool {
        self.writers.iter().any(|w| w.accepts(message))
    }

    /// Serialize with the first writer accepting `message`
    pub fn write(&self, stream: &mut dyn Write, message: Message) -> Result<()> {
        match self.writers.iter().find(|w| w.accepts(&message)) {
            Some(writer) => writer.write(stream, message),
            None => Err(StreamError::Serialization(format!(
                "no writer accepts messages of type {}",
                message.type_name()
            ))),
        }
    }

    /// Decode the body of a frame whose id was already read
    pub fn read(&self, id: u16, stream: &mut dyn Read) -> Result<Message> {
        match self.readers.get(&id) {
            Some(reader) => reader.read(stream),
            None => Err(StreamError::Serialization(format!(
                "no reader registered for message id {}",
                id
            ))),
        }
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    pub fn writer_count(&self) -> usize {
        self.writers.len()
    }
}
