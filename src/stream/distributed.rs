//! Distributed stage: a distributor fans messages out to remote workers.
//!
//! Every channel the distributor asks for is a new session on the next
//! available worker (see [`WorkerCursor`]). A reader thread per session pushes
//! the worker's results to the stage output.
//!
//! Shutdown order once the distributor returns (or fails): the stage input is
//! closed, every remote channel is closed, the reader threads are joined, and
//! finally the stage output is closed.

use crate::channel::{InputChannel, OutputChannel};
use crate::config::{DistributedConfig, WorkerConfig};
use crate::context::Context;
use crate::distributed::distributor::{ChannelCreator, Distributor};
use crate::distributed::remote_channel::{forward, RemoteChannel};
use crate::distributed::worker::WorkerCursor;
use crate::error::Result;
use crate::io::Codecs;
use crate::loader::Loader;
use crate::stream::error_handler::{ErrorHandler, Supervised};
use crate::stream::lock;
use std::sync::Mutex;
use std::time::Duration;

pub struct Distributed {
    name: String,
    distributor: Mutex<Box<dyn Distributor>>,
    cursor: Mutex<WorkerCursor>,
    worker_config: String,
    context: Context,
    codecs: Codecs,
    connect_timeout: Duration,
}

impl Distributed {
    pub fn new(config: &DistributedConfig, context: &Context, loader: &Loader) -> Result<Self> {
        let distribution = loader.distribution();
        let cursor = WorkerCursor::new(distribution.workers.clone())?;
        let distributor = loader.load_distributor(&config.distributor, context)?;
        let codecs = loader.load_codecs(&config.readers, &config.writers)?;
        let worker_config = WorkerConfig {
            readers: config.readers.clone(),
            writers: config.writers.clone(),
            stream: config.stream.clone(),
        }
        .to_json()?;

        Ok(Self {
            name: config.name.clone(),
            distributor: Mutex::new(distributor),
            cursor: Mutex::new(cursor),
            worker_config,
            context: context.clone(),
            codecs,
            connect_timeout: distribution.connect_timeout(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the worker the next session will be attempted on
    pub fn cursor_position(&self) -> usize {
        lock(&self.cursor).position()
    }

    /// Open a session on the first reachable worker, starting at the cursor.
    pub fn create_remote_channel(&self) -> Result<RemoteChannel> {
        lock(&self.cursor).acquire(|address| {
            RemoteChannel::connect(
                address,
                self.connect_timeout,
                &self.worker_config,
                &self.context,
                self.codecs.clone(),
            )
        })
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

        let mut creator = SessionCreator {
            stage: self,
            output: &output,
            scope: &scope,
            readers: Vec::new(),
            channels: Vec::new(),
        };
        {
            let mut distributor = lock(&self.distributor);
            scope.handle("Distributor", || {
                distributor.process(&mut input, &mut creator, &output)
            });
        }

        input.close();
        let SessionCreator {
            readers, channels, ..
        } = creator;
        tracing::debug!(stage = %self.name, sessions = channels.len(), "Distributor finished");
        for channel in &channels {
            channel.close();
        }
        for reader in readers {
            reader.join();
        }
        output.close();
        scope.finish()
    }
}

/// Hands the distributor fresh sessions and starts their reader threads.
struct SessionCreator<'a> {
    stage: &'a Distributed,
    output: &'a OutputChannel,
    scope: &'a ErrorHandler,
    readers: Vec<Supervised>,
    channels: Vec<OutputChannel>,
}

impl ChannelCreator for SessionCreator<'_> {
    fn create(&mut self) -> Result<OutputChannel> {
        let (remote, incoming) = self.stage.create_remote_channel()?.split();
        let output = self.output.clone();
        self.readers
            .push(self.scope.run("ChannelReader", move || forward(incoming, &output)));
        self.channels.push(remote.clone());
        Ok(remote)
    }
}
