//! Text codec (message id 5) for `String` payloads.

use crate::error::{Result, StreamError};
use crate::io::primitives::{read_meta, read_string, write_meta, write_string, write_u16};
use crate::io::{Reader, Writer, TEXT};
use crate::types::Message;
use std::io::{Read, Write};

#[derive(Debug, Default)]
pub struct TextWriter;

impl Writer for TextWriter {
    fn accepts(&self, message: &Message) -> bool {
        message.is::<String>()
    }

    fn write(&self, stream: &mut dyn Write, message: Message) -> Result<()> {
        let (text, meta) = message.downcast::<String>().map_err(|m| {
            StreamError::Serialization(format!("TextWriter cannot write {}", m.type_name()))
        })?;
        write_u16(stream, TEXT)?;
        write_meta(stream, meta.as_ref())?;
        write_string(stream, &text)
    }
}

#[derive(Debug, Default)]
pub struct TextReader;

impl Reader for TextReader {
    fn slot(&self) -> u16 {
        TEXT
    }

    fn read(&self, stream: &mut dyn Read) -> Result<Message> {
        let meta = read_meta(stream)?;
        let message = Message::new(read_string(stream)?);
        Ok(match meta {
            Some(meta) => message.with_meta(meta),
            None => message,
        })
    }
}
