//! ParallelProcess stage: a pure stream on a local thread pool.
//!
//! Messages are numbered as they are read, processed by whichever worker
//! thread is free, and re-sequenced before being pushed, so output order
//! equals input order.

use crate::channel::{InputChannel, OutputChannel};
use crate::config::ParallelProcessConfig;
use crate::context::Context;
use crate::error::{Result, StreamError};
use crate::loader::Loader;
use crate::stream::error_handler::ErrorHandler;
use crate::stream::node::PureStream;
use crate::types::Message;
use crossbeam_channel::{bounded, unbounded};
use std::collections::BTreeMap;

pub struct ParallelProcess {
    name: String,
    workers: usize,
    stream: PureStream,
}

impl ParallelProcess {
    pub fn new(config: &ParallelProcessConfig, context: &Context, loader: &Loader) -> Result<Self> {
        if config.workers == 0 {
            return Err(StreamError::Configuration(format!(
                "ParallelProcess {:?} needs at least one worker",
                config.name
            )));
        }
        let gadgets = config
            .stream
            .gadgets
            .iter()
            .map(|g| loader.load_pure_gadget(g, context))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: config.name.clone(),
            workers: config.workers,
            stream: PureStream::new(gadgets),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workers(&self) -> usize {
        self.workers
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

        let (job_tx, job_rx) = bounded::<(u64, Message)>(self.workers * 2);
        let (done_tx, done_rx) = unbounded::<(u64, Result<Message>)>();

        let mut threads = Vec::with_capacity(self.workers + 1);
        for _ in 0..self.workers {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let stream = self.stream.clone();
            threads.push(scope.run("Worker", move || {
                for (sequence, message) in jobs {
                    if done.send((sequence, stream.process(message))).is_err() {
                        break;
                    }
                }
                Ok(())
            }));
        }
        drop(job_rx);
        drop(done_tx);

        let collector_output = output.clone();
        threads.push(scope.run("Collector", move || {
            let mut pending = BTreeMap::new();
            let mut next = 0u64;
            for (sequence, result) in done_rx {
                pending.insert(sequence, result);
                while let Some(result) = pending.remove(&next) {
                    collector_output.push(result?)?;
                    next += 1;
                }
            }
            Ok(())
        }));

        for (sequence, message) in (0u64..).zip(input) {
            if scope.has_failed() || job_tx.send((sequence, message)).is_err() {
                break;
            }
        }
        drop(job_tx);

        for thread in threads {
            thread.join();
        }
        output.close();
        scope.finish()
    }
}
