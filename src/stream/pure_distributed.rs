//! PureDistributed stage: a pure stream on remote workers, order preserved.
//!
//! One session is opened per configured worker. Messages are dealt to the
//! sessions in turn and a ticket naming the session is queued for each; the
//! collector reads results back in ticket order. The ticket queue is bounded,
//! which caps the number of messages in flight.

use crate::channel::{InputChannel, OutputChannel};
use crate::config::{PureDistributedConfig, WorkerConfig};
use crate::context::Context;
use crate::distributed::remote_channel::{RemoteChannel, RemoteIncoming};
use crate::distributed::worker::WorkerCursor;
use crate::error::{Result, StreamError};
use crate::io::Codecs;
use crate::loader::Loader;
use crate::stream::error_handler::ErrorHandler;
use crate::stream::lock;
use crossbeam_channel::bounded;
use std::sync::Mutex;
use std::time::Duration;

pub struct PureDistributed {
    name: String,
    cursor: Mutex<WorkerCursor>,
    worker_config: String,
    context: Context,
    codecs: Codecs,
    connect_timeout: Duration,
    max_in_flight: usize,
}

impl PureDistributed {
    pub fn new(config: &PureDistributedConfig, context: &Context, loader: &Loader) -> Result<Self> {
        if config.max_in_flight == 0 {
            return Err(StreamError::Configuration(format!(
                "PureDistributed {:?} needs max_in_flight of at least one",
                config.name
            )));
        }
        let distribution = loader.distribution();
        let cursor = WorkerCursor::new(distribution.workers.clone())?;
        // Every gadget must be pure; checked here so workers never see an invalid stream
        for gadget in &config.stream.gadgets {
            loader.load_pure_gadget(gadget, context)?;
        }
        let worker_config = WorkerConfig {
            readers: config.readers.clone(),
            writers: config.writers.clone(),
            stream: config.stream.to_stream(config.name.clone()),
        }
        .to_json()?;

        Ok(Self {
            name: config.name.clone(),
            cursor: Mutex::new(cursor),
            worker_config,
            context: context.clone(),
            codecs: loader.load_codecs(&config.readers, &config.writers)?,
            connect_timeout: distribution.connect_timeout(),
            max_in_flight: config.max_in_flight,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn open_sessions(&self) -> Result<(Vec<OutputChannel>, Vec<RemoteIncoming>)> {
        let mut cursor = lock(&self.cursor);
        let mut outputs = Vec::with_capacity(cursor.len());
        let mut incomings = Vec::with_capacity(cursor.len());
        for _ in 0..cursor.len() {
            let channel = cursor.acquire(|address| {
                RemoteChannel::connect(
                    address,
                    self.connect_timeout,
                    &self.worker_config,
                    &self.context,
                    self.codecs.clone(),
                )
            })?;
            let (output, incoming) = channel.split();
            outputs.push(output);
            incomings.push(incoming);
        }
        Ok((outputs, incomings))
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

        let Some((sessions, mut incomings)) = scope.handle("Connect", || self.open_sessions())
        else {
            input.close();
            output.close();
            return scope.finish();
        };

        let (ticket_tx, ticket_rx) = bounded::<usize>(self.max_in_flight);
        let collector_output = output.clone();
        let collector = scope.run("Collector", move || {
            for ticket in ticket_rx {
                let result = incomings[ticket].next().unwrap_or_else(|| {
                    Err(StreamError::Remote(format!(
                        "{} ended before returning every result",
                        incomings[ticket].peer()
                    )))
                })?;
                collector_output.push(result)?;
            }
            // Wait for each worker to acknowledge the end of its session
            for incoming in incomings {
                for unexpected in incoming {
                    unexpected?;
                    tracing::warn!("Discarding result without a ticket");
                }
            }
            Ok(())
        });

        scope.handle("Dispatch", || {
            for (index, message) in input.by_ref().enumerate() {
                if scope.has_failed() {
                    break;
                }
                let session = index % sessions.len();
                if ticket_tx.send(session).is_err() {
                    break;
                }
                sessions[session].push(message)?;
            }
            Ok(())
        });

        input.close();
        drop(ticket_tx);
        for session in &sessions {
            session.close();
        }
        collector.join();
        output.close();
        scope.finish()
    }
}
