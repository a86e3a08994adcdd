//! Name → processor lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::command::{CommandProcessor, CommandSpec};
use super::noop::NoopProcessor;
use super::traits::FrameProcessor;
use crate::{Error, Result};

/// Registry of frame processors keyed by identifier.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn FrameProcessor>>,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}

impl ProcessorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `noop` processor.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NoopProcessor));
        registry
    }

    /// Register a processor under its own name, replacing any previous one.
    pub fn register(&mut self, processor: Arc<dyn FrameProcessor>) {
        let name = processor.name().to_string();
        if self.processors.insert(name.clone(), processor).is_some() {
            debug!("Replaced frame processor '{}'", name);
        } else {
            debug!("Registered frame processor '{}'", name);
        }
    }

    /// Register a command-backed processor.
    pub fn register_command(&mut self, spec: CommandSpec) {
        self.register(Arc::new(CommandProcessor::new(spec)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FrameProcessor>> {
        self.processors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// Registered identifiers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.processors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve `names` into processors, in order.
    ///
    /// Fails on the first unknown name before anything runs.
    pub fn build_chain<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn FrameProcessor>>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.get(name)
                    .ok_or_else(|| Error::UnknownProcessor(name.to_string()))
            })
            .collect()
    }
}
