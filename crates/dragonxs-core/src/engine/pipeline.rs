use super::cache::OutputCache;
use super::config::PipelineConfig;
use super::dispatcher::{TaskDispatcher, TaskRunner};
use super::error::EngineError;
use super::executor::IsolatedExecutor;
use crate::core::deck::template::load_template;
use crate::core::deck::writer::{DeckWriter, HomogenizedDeckWriter};
use crate::core::library::codec::{LibraryCodec, TomlLibraryCodec};
use tracing::debug;

/// The concrete implementation of each pipeline role for one run.
pub struct Pipeline {
    pub deck_writer: Box<dyn DeckWriter>,
    pub runner: Box<dyn TaskRunner>,
    pub codec: Box<dyn LibraryCodec>,
}

impl Pipeline {
    /// Homogenized decks, isolated local execution and TOML libraries.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, EngineError> {
        let template = load_template(config.template_path.as_deref())?;
        let deck_writer = HomogenizedDeckWriter::new(template, config.deck_options());

        let executor = IsolatedExecutor::new(config.max_library_name_chars);
        let mut dispatcher = TaskDispatcher::new(Box::new(executor), config.workers);
        if let Some(root) = &config.cache.root {
            debug!(root = %root.display(), "Output cache enabled.");
            dispatcher = dispatcher.with_cache(OutputCache::new(root));
        }

        Ok(Self {
            deck_writer: Box::new(deck_writer),
            runner: Box::new(dispatcher),
            codec: Box::new(TomlLibraryCodec),
        })
    }

    pub fn with_deck_writer(mut self, writer: impl DeckWriter + 'static) -> Self {
        self.deck_writer = Box::new(writer);
        self
    }

    pub fn with_runner(mut self, runner: impl TaskRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn with_codec(mut self, codec: impl LibraryCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }
}
