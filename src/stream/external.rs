//! External stage: a stage implemented by another process.
//!
//! The module is either already listening (`connect`) or started by the
//! stage (`execute`) and told which local port to connect back to. Either way
//! the session uses the worker protocol; the config frame carries the stage
//! name and its properties instead of a stream.

use crate::channel::{InputChannel, OutputChannel};
use crate::config::{ExternalConfig, ExternalExecute, Properties, WorkerAddress};
use crate::context::Context;
use crate::distributed::remote_channel::{forward, RemoteChannel};
use crate::error::{Result, StreamError};
use crate::io::Codecs;
use crate::loader::Loader;
use crate::stream::error_handler::ErrorHandler;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

/// Environment variable carrying the port a started module connects to
pub const PORT_ENV: &str = "RECONSTREAM_PORT";

const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Config frame sent to an external module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSession {
    pub name: String,
    pub properties: Properties,
}

enum Target {
    Connect(WorkerAddress),
    Execute(ExternalExecute),
}

pub struct External {
    name: String,
    target: Target,
    session_config: String,
    context: Context,
    codecs: Codecs,
    timeout: Duration,
}

impl External {
    pub fn new(config: &ExternalConfig, context: &Context, loader: &Loader) -> Result<Self> {
        let target = match (&config.connect, &config.execute) {
            (Some(connect), None) => {
                Target::Connect(WorkerAddress::new(connect.address.clone(), connect.port))
            }
            (None, Some(execute)) => Target::Execute(execute.clone()),
            _ => {
                return Err(StreamError::Configuration(format!(
                    "External {:?} needs exactly one of connect or execute",
                    config.name
                )))
            }
        };
        let session_config = serde_json::to_string(&ExternalSession {
            name: config.name.clone(),
            properties: config.properties.clone(),
        })?;

        Ok(Self {
            name: config.name.clone(),
            target,
            session_config,
            context: context.clone(),
            codecs: loader.load_codecs(&config.readers, &config.writers)?,
            timeout: loader.distribution().connect_timeout(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn process(
        &self,
        mut input: InputChannel,
        output: OutputChannel,
        handler: &ErrorHandler,
    ) -> Result<()> {
        let scope = handler.nested(&self.name);
        scope.close_on_failure(output.clone());
        scope.cancel_on_failure(&mut input);

        let Some((channel, child)) = scope.handle("Connect", || self.open()) else {
            input.close();
            output.close();
            return scope.finish();
        };

        let (remote, incoming) = channel.split();
        let reader_output = output.clone();
        let reader = scope.run("ChannelReader", move || forward(incoming, &reader_output));

        scope.handle("Writer", || {
            for message in input.by_ref() {
                remote.push(message)?;
            }
            Ok(())
        });
        input.close();
        remote.close();
        reader.join();
        output.close();

        if let Some(child) = child {
            reap(child, &self.name);
        }
        scope.finish()
    }

    fn open(&self) -> Result<(RemoteChannel, Option<Child>)> {
        match &self.target {
            Target::Connect(address) => {
                let channel = RemoteChannel::connect(
                    address,
                    self.timeout,
                    &self.session_config,
                    &self.context,
                    self.codecs.clone(),
                )?;
                Ok((channel, None))
            }
            Target::Execute(execute) => {
                let listener = TcpListener::bind(("127.0.0.1", 0))?;
                let port = listener.local_addr()?.port();
                let mut child = Command::new(&execute.command)
                    .args(&execute.args)
                    .arg(port.to_string())
                    .env(PORT_ENV, port.to_string())
                    .spawn()
                    .map_err(|e| {
                        StreamError::Configuration(format!(
                            "Failed to start external module {:?}: {}",
                            execute.command, e
                        ))
                    })?;
                tracing::info!(module = %execute.command, pid = child.id(), port, "Started external module");

                let opened = accept(&listener, &mut child, self.timeout).and_then(|stream| {
                    RemoteChannel::open(
                        stream,
                        format!("{} (pid {})", execute.command, child.id()),
                        &self.session_config,
                        &self.context,
                        self.codecs.clone(),
                    )
                });
                match opened {
                    Ok(channel) => Ok((channel, Some(child))),
                    Err(e) => {
                        if let Err(kill_error) = child.kill() {
                            tracing::debug!("Failed to kill external module: {}", kill_error);
                        }
                        let _ = child.wait();
                        Err(e)
                    }
                }
            }
        }
    }
}

/// Wait for the started module to connect back
fn accept(listener: &TcpListener, child: &mut Child, timeout: Duration) -> Result<TcpStream> {
    let address = listener.local_addr()?.to_string();
    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if let Some(status) = child.try_wait()? {
                    return Err(StreamError::Connection {
                        address,
                        source: io::Error::new(
                            io::ErrorKind::ConnectionRefused,
                            format!("external module exited with {} before connecting", status),
                        ),
                    });
                }
                if Instant::now() >= deadline {
                    return Err(StreamError::Connection {
                        address,
                        source: io::Error::new(
                            io::ErrorKind::TimedOut,
                            "external module did not connect in time",
                        ),
                    });
                }
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn reap(mut child: Child, name: &str) {
    match child.wait() {
        Ok(status) if status.success() => {
            tracing::debug!(stage = name, "External module exited");
        }
        Ok(status) => tracing::warn!(stage = name, "External module exited with {}", status),
        Err(e) => tracing::warn!(stage = name, "Failed to wait for external module: {}", e),
    }
}
