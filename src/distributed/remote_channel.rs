//! A channel whose far end is a session on another process.
//!
//! The outgoing half is an [`OutputChannel`] backed by [`RemoteSink`], so a
//! distributor pushes to it like to any local channel. The incoming half,
//! [`RemoteIncoming`], yields the session's results until the peer closes.

use crate::channel::{MessageSink, OutputChannel};
use crate::config::WorkerAddress;
use crate::context::Context;
use crate::distributed::protocol::{self, Frame};
use crate::error::{Result, StreamError};
use crate::io::Codecs;
use crate::types::Message;
use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outgoing half of a session
pub struct RemoteSink {
    writer: Mutex<Option<BufWriter<TcpStream>>>,
    codecs: Codecs,
    peer: String,
}

impl MessageSink for RemoteSink {
    fn push(&self, message: Message) -> Result<()> {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let writer = guard.as_mut().ok_or(StreamError::ChannelClosed)?;
        self.codecs.write(&mut *writer, message)?;
        writer.flush()?;
        Ok(())
    }

    fn close(&self) {
        let Some(mut writer) = self.writer.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            return;
        };
        let result = protocol::write_close(&mut writer).and_then(|_| Ok(writer.flush()?));
        if let Err(e) = result {
            tracing::debug!(peer = %self.peer, "Failed to send close: {}", e);
        }
        if let Err(e) = writer.get_ref().shutdown(Shutdown::Write) {
            tracing::debug!(peer = %self.peer, "Failed to shut down write half: {}", e);
        }
    }

    fn is_closed(&self) -> bool {
        self.writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

impl Drop for RemoteSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Incoming half of a session: results until the peer's CLOSE.
pub struct RemoteIncoming {
    reader: BufReader<TcpStream>,
    codecs: Codecs,
    peer: String,
    done: bool,
}

impl RemoteIncoming {
    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            match protocol::read_frame(&mut self.reader, &self.codecs)? {
                Some(Frame::Message(message)) => return Ok(Some(message)),
                Some(Frame::Close) => return Ok(None),
                Some(Frame::Error(message)) => {
                    return Err(StreamError::Remote(format!("{}: {}", self.peer, message)))
                }
                Some(other) => {
                    tracing::warn!(peer = %self.peer, "Ignoring unexpected {} frame", other.kind());
                }
                None => {
                    return Err(StreamError::Remote(format!(
                        "{}: connection closed before end of stream",
                        self.peer
                    )))
                }
            }
        }
    }
}

impl Iterator for RemoteIncoming {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Result<Message>> {
        if self.done {
            return None;
        }
        match self.next_message() {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// An open session: push messages to `output`, read results from `incoming`.
pub struct RemoteChannel {
    output: OutputChannel,
    incoming: RemoteIncoming,
}

impl RemoteChannel {
    /// Connect to a worker and send the session handshake.
    pub fn connect(
        address: &WorkerAddress,
        timeout: Duration,
        config_json: &str,
        context: &Context,
        codecs: Codecs,
    ) -> Result<Self> {
        let stream = connect_with_timeout(address, timeout)?;
        // Socket failures during the handshake count as unreachable
        Self::open(stream, address.to_string(), config_json, context, codecs).map_err(|e| match e {
            StreamError::Io(source) => StreamError::Connection {
                address: address.to_string(),
                source,
            },
            other => other,
        })
    }

    /// Start a session over an already connected stream.
    pub fn open(
        stream: TcpStream,
        peer: String,
        config_json: &str,
        context: &Context,
        codecs: Codecs,
    ) -> Result<Self> {
        stream.set_nodelay(true)?;
        let read_half = stream.try_clone()?;

        let mut writer = BufWriter::new(stream);
        protocol::write_config(&mut writer, config_json)?;
        protocol::write_header(&mut writer, &context.to_json()?)?;
        writer.flush()?;

        tracing::debug!(peer = %peer, "Opened remote session");
        let sink = RemoteSink {
            writer: Mutex::new(Some(writer)),
            codecs: codecs.clone(),
            peer: peer.clone(),
        };
        Ok(Self {
            output: OutputChannel::from_sink(Arc::new(sink)),
            incoming: RemoteIncoming {
                reader: BufReader::new(read_half),
                codecs,
                peer,
                done: false,
            },
        })
    }

    pub fn peer(&self) -> &str {
        self.incoming.peer()
    }

    pub fn split(self) -> (OutputChannel, RemoteIncoming) {
        (self.output, self.incoming)
    }
}

fn connect_with_timeout(address: &WorkerAddress, timeout: Duration) -> Result<TcpStream> {
    let connection_error = |source: std::io::Error| StreamError::Connection {
        address: address.to_string(),
        source,
    };
    let resolved = (address.host.as_str(), address.port)
        .to_socket_addrs()
        .map_err(connection_error)?;

    let mut last_error = std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "address resolved to nothing",
    );
    for socket_addr in resolved {
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = e,
        }
    }
    Err(connection_error(last_error))
}

/// Push every result of `incoming` to `output`.
pub fn forward(incoming: RemoteIncoming, output: &OutputChannel) -> Result<()> {
    for message in incoming {
        output.push(message?)?;
    }
    Ok(())
}
