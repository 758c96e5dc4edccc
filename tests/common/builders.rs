//! Test data builders for stream configs

use reconstream::config::{
    DistributedConfig, GadgetConfig, PluginConfig, Properties, PureDistributedConfig,
    PureStreamConfig,
};
use reconstream::{NodeConfig, StreamConfig};

/// Builder for linear streams of gadgets
pub struct StreamBuilder {
    key: String,
    nodes: Vec<NodeConfig>,
}

impl StreamBuilder {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            nodes: Vec::new(),
        }
    }

    /// Append a gadget stage named `name`
    pub fn gadget(mut self, classname: &str, name: &str) -> Self {
        self.nodes
            .push(NodeConfig::Gadget(GadgetConfig::new(classname).named(name)));
        self
    }

    pub fn node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn build(self) -> StreamConfig {
        StreamConfig::new(self.key, self.nodes)
    }
}

/// Distributed stage running `stream` on every session
pub fn distributed(name: &str, distributor: &str, channels: usize, stream: StreamConfig) -> NodeConfig {
    NodeConfig::Distributed(DistributedConfig {
        name: name.to_string(),
        distributor: PluginConfig::new(distributor)
            .with_properties(Properties::new().with("channels", channels).with("chunk_size", channels)),
        readers: vec![],
        writers: vec![],
        stream,
    })
}

/// Order-preserving remote stage over the given pure gadgets
pub fn pure_distributed(name: &str, gadgets: &[&str], max_in_flight: usize) -> PureDistributedConfig {
    PureDistributedConfig {
        name: name.to_string(),
        readers: vec![],
        writers: vec![],
        stream: PureStreamConfig {
            gadgets: gadgets.iter().map(|g| GadgetConfig::new(*g)).collect(),
        },
        max_in_flight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_builder() {
        let config = StreamBuilder::new("pipeline")
            .gadget("PassThroughGadget", "A")
            .gadget("PassThroughGadget", "B")
            .build();

        assert_eq!(config.key, "pipeline");
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[1].name(), "B");
    }
}
