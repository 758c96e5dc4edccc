//! Session framing between a coordinator and a worker.
//!
//! A session starts with a CONFIG frame (worker config JSON) and a HEADER
//! frame (context JSON) from the coordinator. Both sides then exchange message
//! frames; each side ends its direction with CLOSE. A worker whose stream
//! failed ends with ERROR instead, carrying the failure description.

use crate::error::{Result, StreamError};
use crate::io::primitives::{read_string, write_string, write_u16};
use crate::io::{Codecs, CLOSE, CONFIG, ERROR, HEADER};
use crate::types::Message;
use std::io::{ErrorKind, Read, Write};

/// One decoded frame
#[derive(Debug)]
pub enum Frame {
    Message(Message),
    Config(String),
    Header(String),
    Close,
    Error(String),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Message(_) => "message",
            Frame::Config(_) => "config",
            Frame::Header(_) => "header",
            Frame::Close => "close",
            Frame::Error(_) => "error",
        }
    }
}

/// Read the next frame id; `None` on a clean end of stream at a frame boundary.
fn read_id(stream: &mut dyn Read) -> Result<Option<u16>> {
    let mut buf = [0u8; 2];
    loop {
        match stream.read(&mut buf[..1]) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    stream.read_exact(&mut buf[1..])?;
    Ok(Some(u16::from_le_bytes(buf)))
}

/// Read one frame, decoding message bodies with `codecs`.
pub fn read_frame(stream: &mut dyn Read, codecs: &Codecs) -> Result<Option<Frame>> {
    let Some(id) = read_id(stream)? else {
        return Ok(None);
    };
    let frame = match id {
        CONFIG => Frame::Config(read_string(stream)?),
        HEADER => Frame::Header(read_string(stream)?),
        CLOSE => Frame::Close,
        ERROR => Frame::Error(read_string(stream)?),
        other => Frame::Message(codecs.read(other, stream)?),
    };
    Ok(Some(frame))
}

/// Read a frame that must be present, e.g. during the session handshake.
pub fn expect_frame(stream: &mut dyn Read, codecs: &Codecs) -> Result<Frame> {
    read_frame(stream, codecs)?.ok_or_else(|| {
        StreamError::Serialization("connection closed before the session handshake".to_string())
    })
}

pub fn write_config(stream: &mut dyn Write, config_json: &str) -> Result<()> {
    write_u16(stream, CONFIG)?;
    write_string(stream, config_json)
}

pub fn write_header(stream: &mut dyn Write, context_json: &str) -> Result<()> {
    write_u16(stream, HEADER)?;
    write_string(stream, context_json)
}

pub fn write_close(stream: &mut dyn Write) -> Result<()> {
    write_u16(stream, CLOSE)
}

pub fn write_error(stream: &mut dyn Write, message: &str) -> Result<()> {
    write_u16(stream, ERROR)?;
    write_string(stream, message)
}
