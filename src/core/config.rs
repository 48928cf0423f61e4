use crate::core::{PluginError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Records flow and the plugin processes batches.
    #[default]
    Full,
    /// Only schemas are negotiated; no record is exchanged.
    MetadataOnly,
}

/// How many records a connection buffers before a batch is processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BatchSizeRepr", into = "BatchSizeRepr")]
pub enum BatchSize {
    /// Records accumulate until every connection closes.
    #[default]
    Unbounded,
    Records(NonZeroUsize),
}

impl BatchSize {
    pub fn records(count: usize) -> Self {
        NonZeroUsize::new(count).map_or(Self::Unbounded, Self::Records)
    }

    pub fn limit(self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Records(n) => Some(n.get()),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BatchSizeRepr {
    Count(usize),
    Keyword(String),
}

impl TryFrom<BatchSizeRepr> for BatchSize {
    type Error = String;

    fn try_from(repr: BatchSizeRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            BatchSizeRepr::Count(n) => NonZeroUsize::new(n)
                .map(Self::Records)
                .ok_or_else(|| "record_batch_size must be positive".to_string()),
            BatchSizeRepr::Keyword(word) if word == "unbounded" => Ok(Self::Unbounded),
            BatchSizeRepr::Keyword(word) => Err(format!(
                "record_batch_size must be a positive integer or \"unbounded\", got \"{word}\""
            )),
        }
    }
}

impl From<BatchSize> for BatchSizeRepr {
    fn from(size: BatchSize) -> Self {
        match size {
            BatchSize::Unbounded => Self::Keyword("unbounded".to_string()),
            BatchSize::Records(n) => Self::Count(n.get()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorSpec {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
}

impl AnchorSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }
}

/// Per-run plugin configuration, fixed once the coordinator is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub input_anchors: Vec<AnchorSpec>,
    #[serde(default)]
    pub output_anchors: Vec<AnchorSpec>,
    #[serde(default)]
    pub record_batch_size: BatchSize,
    #[serde(default)]
    pub run_mode: RunMode,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.input_anchors.push(AnchorSpec::new(name));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output_anchors.push(AnchorSpec::new(name));
        self
    }

    pub fn with_batch_size(mut self, size: BatchSize) -> Self {
        self.record_batch_size = size;
        self
    }

    pub fn with_run_mode(mut self, mode: RunMode) -> Self {
        self.run_mode = mode;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_names("input", &self.input_anchors)?;
        check_names("output", &self.output_anchors)
    }
}

fn check_names(side: &str, anchors: &[AnchorSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for anchor in anchors {
        if anchor.name.trim().is_empty() {
            return Err(PluginError::Config(format!("{side} anchor name is empty")));
        }
        if !seen.insert(anchor.name.as_str()) {
            return Err(PluginError::Config(format!(
                "duplicate {side} anchor '{}'",
                anchor.name
            )));
        }
    }
    Ok(())
}
