//! Parallel stage: branch into named sub-streams and merge their outputs.

use crate::channel::{make_channel, InputChannel, OutputChannel};
use crate::config::ParallelConfig;
use crate::context::Context;
use crate::error::{Result, StreamError};
use crate::loader::Loader;
use crate::stream::error_handler::ErrorHandler;
use crate::stream::node::{Branch, Merge};
use crate::stream::{lock, Stream};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

pub struct Parallel {
    key: String,
    branch: Arc<Mutex<Box<dyn Branch>>>,
    merge: Arc<Mutex<Box<dyn Merge>>>,
    streams: Vec<Arc<Stream>>,
}

impl Parallel {
    pub fn new(config: &ParallelConfig, context: &Context, loader: &Loader) -> Result<Self> {
        if config.streams.is_empty() {
            return Err(StreamError::Configuration(format!(
                "Parallel {:?} has no streams",
                config.key
            )));
        }
        let mut keys = HashSet::new();
        for stream in &config.streams {
            if !keys.insert(stream.key.as_str()) {
                return Err(StreamError::Configuration(format!(
                    "Parallel {:?} has duplicate stream key {:?}",
                    config.key, stream.key
                )));
            }
        }

        let streams = config
            .streams
            .iter()
            .map(|s| Stream::new(s, context, loader).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            key: config.key.clone(),
            branch: Arc::new(Mutex::new(loader.load_branch(&config.branch, context)?)),
            merge: Arc::new(Mutex::new(loader.load_merge(&config.merge, context)?)),
            streams,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn process(
        &self,
        mut input: InputChannel,
        output: OutputChannel,
        handler: &ErrorHandler,
    ) -> Result<()> {
        let scope = handler.nested(&self.key);
        scope.close_on_failure(output.clone());
        scope.cancel_on_failure(&mut input);

        let mut branch_outputs = BTreeMap::new();
        let mut merge_inputs = BTreeMap::new();
        let mut threads = Vec::with_capacity(self.streams.len() + 2);

        for stream in &self.streams {
            let (branch_tx, stream_in) = make_channel();
            let (stream_out, merge_rx) = make_channel();
            scope.close_on_failure(branch_tx.clone());
            scope.close_on_failure(stream_out.clone());
            branch_outputs.insert(stream.key().to_string(), branch_tx);
            merge_inputs.insert(stream.key().to_string(), merge_rx);

            let key = stream.key().to_string();
            let stream = Arc::clone(stream);
            let stream_scope = scope.clone();
            threads.push(scope.run(&key, move || {
                stream.process(stream_in, stream_out, &stream_scope)
            }));
        }

        let branch = Arc::clone(&self.branch);
        let branch_closers: Vec<OutputChannel> = branch_outputs.values().cloned().collect();
        threads.push(scope.run("Branch", move || {
            let result = lock(&branch).process(input, branch_outputs);
            for channel in branch_closers {
                channel.close();
            }
            result
        }));

        let merge = Arc::clone(&self.merge);
        let merge_output = output.clone();
        threads.push(scope.run("Merge", move || {
            let result = lock(&merge).process(merge_inputs, merge_output.clone());
            merge_output.close();
            result
        }));

        for thread in threads {
            thread.join();
        }
        output.close();
        scope.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GadgetConfig, NodeConfig, PluginConfig, StreamConfig};
    use crate::stream::node::Node;
    use crate::types::Message;

    struct Reject;

    impl Node for Reject {
        fn process(&mut self, mut input: InputChannel, _output: OutputChannel) -> Result<()> {
            match input.recv() {
                Some(_) => Err(StreamError::failed("rejected")),
                None => Ok(()),
            }
        }
    }

    fn sub_stream(key: &str, classname: &str) -> StreamConfig {
        StreamConfig::new(key, vec![NodeConfig::Gadget(GadgetConfig::new(classname))])
    }

    fn config(streams: Vec<StreamConfig>) -> ParallelConfig {
        ParallelConfig {
            key: "parallel".to_string(),
            branch: PluginConfig::new("RoundRobinBranch"),
            merge: PluginConfig::new("UnorderedMerge"),
            streams,
        }
    }

    fn loader() -> Loader {
        let mut loader = Loader::default();
        loader.register_gadget("Reject", |_, _| Ok(Box::new(Reject)));
        loader
    }

    #[test]
    fn test_branch_and_merge_everything() {
        let parallel = Parallel::new(
            &config(vec![
                sub_stream("left", "PassThroughGadget"),
                sub_stream("right", "PassThroughGadget"),
            ]),
            &Context::default(),
            &loader(),
        )
        .unwrap();

        let (in_tx, in_rx) = make_channel();
        let (out_tx, out_rx) = make_channel();
        for i in 0..20u32 {
            in_tx.push(Message::new(i)).unwrap();
        }
        in_tx.close();

        let handler = ErrorHandler::root();
        parallel.process(in_rx, out_tx, &handler).unwrap();
        let mut values: Vec<u32> = out_rx.map(|m| *m.downcast_ref::<u32>().unwrap()).collect();
        values.sort_unstable();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
        // Two sub-streams with one stage each, plus branch and merge
        assert_eq!(handler.threads_spawned(), 6);
    }

    #[test]
    fn test_sub_stream_failure_is_attributed() {
        let parallel = Parallel::new(
            &config(vec![
                sub_stream("left", "PassThroughGadget"),
                sub_stream("right", "Reject"),
            ]),
            &Context::default(),
            &loader(),
        )
        .unwrap();

        let (in_tx, in_rx) = make_channel();
        let (out_tx, _out_rx) = make_channel();
        for i in 0..4u32 {
            in_tx.push(Message::new(i)).unwrap();
        }
        in_tx.close();

        let err = parallel
            .process(in_rx, out_tx, &ErrorHandler::new("pipeline"))
            .unwrap_err();
        assert_eq!(err.path(), Some("pipeline.parallel.right.Reject"));
    }

    #[test]
    fn test_invalid_configs() {
        let ctx = Context::default();
        assert!(Parallel::new(&config(vec![]), &ctx, &loader()).is_err());
        let dup = config(vec![
            sub_stream("a", "PassThroughGadget"),
            sub_stream("a", "PassThroughGadget"),
        ]);
        assert!(Parallel::new(&dup, &ctx, &loader()).is_err());
        let mut unknown = config(vec![sub_stream("a", "PassThroughGadget")]);
        unknown.merge = PluginConfig::new("OrderedMerge");
        assert!(Parallel::new(&unknown, &ctx, &loader()).is_err());
    }
}
