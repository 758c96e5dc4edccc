//! Resolves plugin class names to implementations.
//!
//! Implementations are compiled in and registered by class name. The `dll`
//! field of a config is kept for diagnostics only. Unknown class names are
//! configuration errors, raised while the stream is being built so nothing
//! starts running.
//!
//! The loader also carries the [`DistributionConfig`] (the worker list) that
//! distributed stages use; it is injected by whoever builds the loader.

use crate::config::{
    DistributionConfig, GadgetConfig, PluginConfig, Properties, ReaderConfig, WriterConfig,
};
use crate::context::Context;
use crate::distributed::distributor::{ChunkDistributor, Distributor, RoundRobinDistributor};
use crate::error::{Result, StreamError};
use crate::io::{Codecs, ImageReader, ImageWriter, Reader, TextReader, TextWriter, Writer};
use crate::stream::node::{Branch, Merge, Node, PureGadget, PureNode};
use crate::stream::nodes::{
    ImageFftGadget, MagnitudeGadget, PassThroughGadget, RoundRobinBranch, UnorderedMerge,
};
use std::collections::HashMap;
use std::sync::Arc;

pub type GadgetFactory =
    Arc<dyn Fn(&Context, &Properties) -> Result<Box<dyn Node>> + Send + Sync>;
pub type PureGadgetFactory =
    Arc<dyn Fn(&Context, &Properties) -> Result<Arc<dyn PureGadget>> + Send + Sync>;
pub type DistributorFactory =
    Arc<dyn Fn(&Context, &Properties) -> Result<Box<dyn Distributor>> + Send + Sync>;
pub type BranchFactory =
    Arc<dyn Fn(&Context, &Properties) -> Result<Box<dyn Branch>> + Send + Sync>;
pub type MergeFactory =
    Arc<dyn Fn(&Context, &Properties) -> Result<Box<dyn Merge>> + Send + Sync>;
pub type ReaderFactory = Arc<dyn Fn() -> Arc<dyn Reader> + Send + Sync>;
pub type WriterFactory = Arc<dyn Fn() -> Arc<dyn Writer> + Send + Sync>;

/// Factories of one plugin kind, by class name.
#[derive(Clone)]
struct Registry<F> {
    kind: &'static str,
    entries: HashMap<String, F>,
}

impl<F: Clone> Registry<F> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    fn register(&mut self, classname: &str, factory: F) {
        if self.entries.insert(classname.to_string(), factory).is_some() {
            tracing::debug!(kind = self.kind, classname, "Replaced registered factory");
        }
    }

    fn load_factory(&self, classname: &str, dll: &str) -> Result<F> {
        tracing::debug!(kind = self.kind, classname, dll, "Loading factory");
        self.entries.get(classname).cloned().ok_or_else(|| {
            StreamError::Configuration(format!(
                "Unknown {} class {:?}{}",
                self.kind,
                classname,
                if dll.is_empty() {
                    String::new()
                } else {
                    format!(" (library {:?})", dll)
                }
            ))
        })
    }

    fn contains(&self, classname: &str) -> bool {
        self.entries.contains_key(classname)
    }
}

#[derive(Clone)]
pub struct Loader {
    gadgets: Registry<GadgetFactory>,
    pure_gadgets: Registry<PureGadgetFactory>,
    distributors: Registry<DistributorFactory>,
    branches: Registry<BranchFactory>,
    merges: Registry<MergeFactory>,
    readers: Registry<ReaderFactory>,
    writers: Registry<WriterFactory>,
    distribution: DistributionConfig,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(DistributionConfig::default())
    }
}

impl Loader {
    /// Loader with every built-in plugin registered
    pub fn new(distribution: DistributionConfig) -> Self {
        let mut loader = Self::empty(distribution);
        loader
            .register_gadget("PassThroughGadget", |_, _| Ok(Box::new(PassThroughGadget::new())))
            .register_pure_gadget("ImageFftGadget", |_, _| Ok(Arc::new(ImageFftGadget::new())))
            .register_pure_gadget("MagnitudeGadget", |_, _| Ok(Arc::new(MagnitudeGadget)))
            .register_distributor("RoundRobinDistributor", |_, props| {
                Ok(Box::new(RoundRobinDistributor::from_properties(props)?))
            })
            .register_distributor("ChunkDistributor", |_, props| {
                Ok(Box::new(ChunkDistributor::from_properties(props)?))
            })
            .register_branch("RoundRobinBranch", |_, _| Ok(Box::new(RoundRobinBranch)))
            .register_merge("UnorderedMerge", |_, _| Ok(Box::new(UnorderedMerge)))
            .register_reader("ImageReader", || Arc::new(ImageReader))
            .register_reader("TextReader", || Arc::new(TextReader))
            .register_writer("ImageWriter", || Arc::new(ImageWriter))
            .register_writer("TextWriter", || Arc::new(TextWriter));
        loader
    }

    /// Loader with nothing registered
    pub fn empty(distribution: DistributionConfig) -> Self {
        Self {
            gadgets: Registry::new("gadget"),
            pure_gadgets: Registry::new("pure gadget"),
            distributors: Registry::new("distributor"),
            branches: Registry::new("branch"),
            merges: Registry::new("merge"),
            readers: Registry::new("reader"),
            writers: Registry::new("writer"),
            distribution,
        }
    }

    pub fn with_distribution(mut self, distribution: DistributionConfig) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn distribution(&self) -> &DistributionConfig {
        &self.distribution
    }

    // ==================== Registration ====================

    pub fn register_gadget<F>(&mut self, classname: &str, factory: F) -> &mut Self
    where
        F: Fn(&Context, &Properties) -> Result<Box<dyn Node>> + Send + Sync + 'static,
    {
        self.gadgets.register(classname, Arc::new(factory));
        self
    }

    /// Register a pure gadget; it is also loadable as an ordinary gadget.
    pub fn register_pure_gadget<F>(&mut self, classname: &str, factory: F) -> &mut Self
    where
        F: Fn(&Context, &Properties) -> Result<Arc<dyn PureGadget>> + Send + Sync + 'static,
    {
        let factory: PureGadgetFactory = Arc::new(factory);
        let as_node = Arc::clone(&factory);
        self.pure_gadgets.register(classname, factory);
        self.gadgets.register(
            classname,
            Arc::new(move |context: &Context, properties: &Properties| {
                Ok(Box::new(PureNode::new(as_node(context, properties)?)) as Box<dyn Node>)
            }),
        );
        self
    }

    pub fn register_distributor<F>(&mut self, classname: &str, factory: F) -> &mut Self
    where
        F: Fn(&Context, &Properties) -> Result<Box<dyn Distributor>> + Send + Sync + 'static,
    {
        self.distributors.register(classname, Arc::new(factory));
        self
    }

    pub fn register_branch<F>(&mut self, classname: &str, factory: F) -> &mut Self
    where
        F: Fn(&Context, &Properties) -> Result<Box<dyn Branch>> + Send + Sync + 'static,
    {
        self.branches.register(classname, Arc::new(factory));
        self
    }

    pub fn register_merge<F>(&mut self, classname: &str, factory: F) -> &mut Self
    where
        F: Fn(&Context, &Properties) -> Result<Box<dyn Merge>> + Send + Sync + 'static,
    {
        self.merges.register(classname, Arc::new(factory));
        self
    }

    pub fn register_reader<F>(&mut self, classname: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Reader> + Send + Sync + 'static,
    {
        self.readers.register(classname, Arc::new(factory));
        self
    }

    pub fn register_writer<F>(&mut self, classname: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Writer> + Send + Sync + 'static,
    {
        self.writers.register(classname, Arc::new(factory));
        self
    }

    // ==================== Loading ====================

    pub fn has_gadget(&self, classname: &str) -> bool {
        self.gadgets.contains(classname)
    }

    pub fn load_gadget(&self, config: &GadgetConfig, context: &Context) -> Result<Box<dyn Node>> {
        let factory = self.gadgets.load_factory(&config.classname, &config.dll)?;
        factory(context, &config.properties).map_err(|e| e.with_context(config.name()))
    }

    pub fn load_pure_gadget(
        &self,
        config: &GadgetConfig,
        context: &Context,
    ) -> Result<Arc<dyn PureGadget>> {
        let factory = self.pure_gadgets.load_factory(&config.classname, &config.dll)?;
        factory(context, &config.properties).map_err(|e| e.with_context(config.name()))
    }

    pub fn load_distributor(
        &self,
        config: &PluginConfig,
        context: &Context,
    ) -> Result<Box<dyn Distributor>> {
        let factory = self.distributors.load_factory(&config.classname, &config.dll)?;
        factory(context, &config.properties)
    }

    pub fn load_branch(&self, config: &PluginConfig, context: &Context) -> Result<Box<dyn Branch>> {
        let factory = self.branches.load_factory(&config.classname, &config.dll)?;
        factory(context, &config.properties)
    }

    pub fn load_merge(&self, config: &PluginConfig, context: &Context) -> Result<Box<dyn Merge>> {
        let factory = self.merges.load_factory(&config.classname, &config.dll)?;
        factory(context, &config.properties)
    }

    /// Build the codec set for a connection. An empty list selects every
    /// built-in codec of that direction.
    pub fn load_codecs(&self, readers: &[ReaderConfig], writers: &[WriterConfig]) -> Result<Codecs> {
        let mut codecs = Codecs::new();

        if readers.is_empty() {
            codecs = codecs
                .with_reader(Arc::new(ImageReader))
                .with_reader(Arc::new(TextReader));
        }
        for config in readers {
            let factory = self.readers.load_factory(&config.classname, &config.dll)?;
            let reader = factory();
            let slot = config.slot.unwrap_or_else(|| reader.slot());
            codecs = codecs.with_reader_at(slot, reader);
        }

        if writers.is_empty() {
            codecs = codecs
                .with_writer(Arc::new(ImageWriter))
                .with_writer(Arc::new(TextWriter));
        }
        for config in writers {
            let factory = self.writers.load_factory(&config.classname, &config.dll)?;
            codecs = codecs.with_writer(factory());
        }
        Ok(codecs)
    }
}
