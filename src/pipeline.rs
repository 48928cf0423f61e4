use crate::core::{
    ConnectionId, EngineHost, OutputAnchorHost, Plugin, PluginConfig, PluginCoordinator, Result,
    RunMode, RunStats,
};
use crate::sink::file::JsonLinesAnchor;
use crate::source::file::CsvFeed;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Engine stand-in that writes each output anchor to `<dir>/<anchor>.jsonl`
/// and routes diagnostics to the log.
pub struct LocalEngine {
    output_dir: PathBuf,
}

impl LocalEngine {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }
}

impl EngineHost for LocalEngine {
    fn output_anchor(&mut self, name: &str) -> Result<Box<dyn OutputAnchorHost>> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("{name}.jsonl"));
        Ok(Box::new(JsonLinesAnchor::create(path)?))
    }

    fn report_error(&mut self, message: &str) {
        tracing::error!(target: "engine", "{}", message);
    }

    fn report_info(&mut self, message: &str) {
        tracing::info!(target: "engine", "{}", message);
    }

    fn report_progress(&mut self, percent: f64) {
        tracing::debug!(target: "engine", percent, "tool progress");
    }
}

/// Replays CSV feeds through a plugin in the order a host engine would:
/// every connection initialized, then each connection's records, then every
/// connection closed.
pub struct Pipeline<P: Plugin> {
    coordinator: PluginCoordinator<P>,
    feeds: Vec<(ConnectionId, CsvFeed<File>)>,
}

impl<P: Plugin> Pipeline<P> {
    pub fn new<D: AsRef<Path>>(plugin: P, config: PluginConfig, output_dir: D) -> Result<Self> {
        let engine = Box::new(LocalEngine::new(output_dir));
        Ok(Self {
            coordinator: PluginCoordinator::new(plugin, config, engine)?,
            feeds: Vec::new(),
        })
    }

    pub fn connect<F: AsRef<Path>>(&mut self, anchor: &str, file_path: F) -> Result<ConnectionId> {
        let name = file_path.as_ref().display().to_string();
        let feed = CsvFeed::open(file_path)?;
        let id = self.coordinator.add_incoming_connection(anchor, &name)?;
        self.feeds.push((id, feed));
        Ok(id)
    }

    pub fn coordinator(&self) -> &PluginCoordinator<P> {
        &self.coordinator
    }

    pub fn run(&mut self) -> Result<RunStats> {
        for (id, feed) in &self.feeds {
            self.coordinator
                .on_connection_initialized(*id, feed.schema().clone())?;
        }

        let metadata_only = self.coordinator.context().run_mode() == RunMode::MetadataOnly;
        for (id, feed) in std::mem::take(&mut self.feeds) {
            if !metadata_only {
                for handle in feed.into_handles() {
                    self.coordinator.on_record_received(id, handle?)?;
                }
            }
            self.coordinator.on_progress(id, 100.0)?;
            self.coordinator.on_connection_closed(id)?;
        }

        self.coordinator.shutdown();
        Ok(self.coordinator.stats())
    }
}
