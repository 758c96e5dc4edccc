//! Worker side of distributed processing.
//!
//! A [`WorkerServer`] accepts sessions and runs each on its own threads:
//! 1. read the CONFIG and HEADER frames and build the requested stream,
//! 2. feed incoming message frames into the stream until CLOSE,
//! 3. write the stream's output back as message frames,
//! 4. finish with CLOSE, or with ERROR as soon as the stream fails; in that
//!    case incoming frames are still drained up to the coordinator's CLOSE.

use crate::channel::{make_channel, OutputChannel};
use crate::config::WorkerConfig;
use crate::context::Context;
use crate::distributed::protocol::{self, Frame};
use crate::error::{Result, StreamError};
use crate::io::Codecs;
use crate::loader::Loader;
use crate::stream::{lock, ErrorHandler, Stream};
use std::io::{self, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(10);

pub struct WorkerServer {
    listener: TcpListener,
    loader: Arc<Loader>,
    running: Arc<AtomicBool>,
}

impl WorkerServer {
    pub fn bind(address: impl ToSocketAddrs, loader: Loader) -> Result<Self> {
        let listener = TcpListener::bind(address)?;
        Ok(Self {
            listener,
            loader: Arc::new(loader),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag that stops [`serve`](Self::serve); checked between accept polls
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Accept sessions until the running flag is cleared.
    ///
    /// Sessions already started keep running on their own threads.
    pub fn serve(&self) -> Result<()> {
        tracing::info!(address = ?self.listener.local_addr().ok(), "Worker server listening");
        self.listener.set_nonblocking(true)?;
        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        tracing::warn!(peer = %peer, "Failed to configure connection: {}", e);
                        continue;
                    }
                    self.start_session(stream, peer);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => tracing::warn!("Failed to accept connection: {}", e),
            }
        }
        tracing::info!("Worker server stopped");
        Ok(())
    }

    fn start_session(&self, stream: TcpStream, peer: SocketAddr) {
        let loader = Arc::clone(&self.loader);
        let spawned = thread::Builder::new()
            .name("session".to_string())
            .spawn(move || match run_session(stream, &loader) {
                Ok(()) => tracing::info!(peer = %peer, "Session finished"),
                Err(e) => tracing::warn!(peer = %peer, "Session failed: {}", e),
            });
        if let Err(e) = spawned {
            tracing::error!("Failed to start session thread: {}", e);
        }
    }

    /// Serve on a background thread
    pub fn spawn(self) -> Result<thread::JoinHandle<()>> {
        Ok(thread::Builder::new()
            .name("worker-server".to_string())
            .spawn(move || {
                if let Err(e) = self.serve() {
                    tracing::error!("Worker server stopped: {}", e);
                }
            })?)
    }
}

/// Read the session handshake
fn handshake(reader: &mut BufReader<TcpStream>, loader: &Loader) -> Result<(WorkerConfig, Context)> {
    let codecs = loader.load_codecs(&[], &[])?;
    let config = match protocol::expect_frame(reader, &codecs)? {
        Frame::Config(json) => WorkerConfig::from_json(&json)?,
        other => {
            return Err(StreamError::Serialization(format!(
                "expected config frame, got {}",
                other.kind()
            )))
        }
    };
    let context = match protocol::expect_frame(reader, &codecs)? {
        Frame::Header(json) => Context::from_json(&json)?,
        other => {
            return Err(StreamError::Serialization(format!(
                "expected header frame, got {}",
                other.kind()
            )))
        }
    };
    Ok((config, context))
}

/// Run one session to completion on the current thread.
pub fn run_session(stream: TcpStream, loader: &Loader) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let writer = Arc::new(Mutex::new(BufWriter::new(stream)));

    let built = handshake(&mut reader, loader).and_then(|(config, context)| {
        let codecs = loader.load_codecs(&config.readers, &config.writers)?;
        let pipeline = Stream::new(&config.stream, &context, loader)?;
        Ok((codecs, pipeline))
    });
    let (codecs, pipeline) = match built {
        Ok(built) => built,
        Err(e) => {
            tracing::warn!("Rejecting session: {}", e);
            finish(&writer, Some(&e.to_string()))?;
            drain(&mut reader, &Codecs::builtin());
            return Err(e);
        }
    };
    tracing::info!(stream = %pipeline.key(), stages = pipeline.len(), "Session started");

    let handler = ErrorHandler::root();
    let (in_tx, in_rx) = make_channel();
    let (out_tx, out_rx) = make_channel();

    let stream_handler = handler.clone();
    let key = pipeline.key().to_string();
    let runner = handler.run(&key, move || {
        pipeline.process(in_rx, out_tx, &stream_handler)
    });

    let write_codecs = codecs.clone();
    let results = Arc::clone(&writer);
    let sender = handler.run("Writer", move || {
        for message in out_rx {
            let mut writer = lock(&results);
            write_codecs.write(&mut *writer, message)?;
            writer.flush()?;
        }
        Ok(())
    });

    let receiver = handler.run("Reader", move || {
        let result = receive(&mut reader, &codecs, &in_tx);
        in_tx.close();
        result
    });

    runner.join();
    sender.join();

    // Report the outcome without waiting for the coordinator to finish sending
    let failure = handler.take_failure();
    let finished = finish(&writer, failure.as_ref().map(|e| e.to_string()).as_deref());
    receiver.join();
    finished?;
    match failure.or_else(|| handler.take_failure()) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Feed message frames into the stream up to the coordinator's CLOSE.
///
/// Once the stream stops accepting input the remaining frames are discarded,
/// so the final frame is not lost to a connection reset.
fn receive(
    reader: &mut BufReader<TcpStream>,
    codecs: &Codecs,
    input: &OutputChannel,
) -> Result<()> {
    let mut accepting = true;
    loop {
        match protocol::read_frame(reader, codecs)? {
            Some(Frame::Message(message)) => {
                if accepting && input.push(message).is_err() {
                    tracing::debug!("Stream stopped accepting input");
                    accepting = false;
                }
            }
            Some(Frame::Close) => return Ok(()),
            None => {
                return Err(StreamError::Remote(
                    "coordinator disconnected without closing".to_string(),
                ))
            }
            Some(other) => {
                tracing::warn!("Ignoring unexpected {} frame", other.kind());
            }
        }
    }
}

/// Discard frames up to the coordinator's CLOSE
fn drain(reader: &mut BufReader<TcpStream>, codecs: &Codecs) {
    loop {
        match protocol::read_frame(reader, codecs) {
            Ok(Some(Frame::Close)) | Ok(None) | Err(_) => break,
            Ok(Some(_)) => {}
        }
    }
}

/// Send the final CLOSE or ERROR frame and half-close the socket.
fn finish(writer: &Mutex<BufWriter<TcpStream>>, error: Option<&str>) -> Result<()> {
    let mut writer = lock(writer);
    match error {
        Some(message) => protocol::write_error(&mut *writer, message)?,
        None => protocol::write_close(&mut *writer)?,
    }
    writer.flush()?;
    if let Err(e) = writer.get_ref().shutdown(Shutdown::Write) {
        tracing::debug!("Failed to shut down write half: {}", e);
    }
    Ok(())
}
