//! Model Router for task-based candidate chains
//!
//! Maps each task (extraction, OCR, receipt scan, completion) to an ordered
//! list of candidate models and a per-attempt timeout, and builds the
//! [`FallbackChain`] for it. Chains are plain values handed to the stages, so
//! tests inject their own instead of touching global state.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tresor/config/models.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::ai::ModelRef;
use crate::error::{Error, Result};
use crate::fallback::{FallbackChain, DEFAULT_ATTEMPT_TIMEOUT};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/models.toml");

/// Task types for model routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Structured transaction extraction (JSON output)
    Extraction,
    /// Image transcription
    Ocr,
    /// Single receipt scan (vision + JSON output)
    Receipt,
    /// Short free-text completions (category suggestion)
    Completion,
}

impl TaskType {
    /// Get the config key for this task type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Ocr => "ocr",
            Self::Receipt => "receipt",
            Self::Completion => "completion",
        }
    }

    /// Get all task types
    pub fn all() -> &'static [TaskType] {
        &[Self::Extraction, Self::Ocr, Self::Receipt, Self::Completion]
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.as_str() == key)
    }
}

/// Candidates and timeout for one task
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    pub models: Vec<ModelRef>,
    pub timeout: Duration,
}

/// Router configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// Chain used by tasks without their own
    pub default_models: Vec<ModelRef>,
    /// Default per-attempt timeout
    pub default_timeout: Duration,
    /// Per-task chains
    pub chains: HashMap<TaskType, ChainConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_models: Vec::new(),
            default_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            chains: HashMap::new(),
        }
    }
}

impl RouterConfig {
    /// The same chain for every task (tests, `--model` overrides)
    pub fn single_chain(models: Vec<ModelRef>, timeout: Duration) -> Self {
        Self {
            default_models: models,
            default_timeout: timeout,
            chains: HashMap::new(),
        }
    }

    /// Resolved chain config for a task
    pub fn chain_config(&self, task: TaskType) -> ChainConfig {
        self.chains.get(&task).cloned().unwrap_or_else(|| ChainConfig {
            models: self.default_models.clone(),
            timeout: self.default_timeout,
        })
    }
}

/// Model Router
#[derive(Debug, Clone)]
pub struct ModelRouter {
    config: RouterConfig,
    config_path: Option<PathBuf>,
}

impl ModelRouter {
    /// Create a new model router (override file if present, else embedded defaults)
    pub fn new() -> Result<Self> {
        let config_path = default_config_path();
        let config = load_config(config_path.as_deref())?;
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Create with a custom config path
    pub fn with_config_path(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Model config not found: {}",
                path.display()
            )));
        }
        let config = load_config(Some(&path))?;
        Ok(Self {
            config,
            config_path: Some(path),
        })
    }

    /// Create with an explicit configuration (for testing)
    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            config,
            config_path: None,
        }
    }

    /// Fallback chain for a task
    pub fn chain_for(&self, task: TaskType) -> Result<FallbackChain> {
        let chain = self.config.chain_config(task);
        FallbackChain::new(chain.models)
            .map(|c| c.with_timeout(chain.timeout))
            .map_err(|_| Error::Config(format!("No models configured for task '{}'", task.as_str())))
    }

    /// Get the router configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Get the config path (if using file-based config)
    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config_path.as_ref()
    }

    /// Whether the active config came from an override file
    pub fn is_override(&self) -> bool {
        self.config_path.as_ref().is_some_and(|p| p.exists())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tresor").join("config").join("models.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<RouterConfig> {
    let content = match override_path {
        Some(path) if path.exists() => fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?,
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    defaults: Option<RawChain>,
    #[serde(default)]
    chains: HashMap<String, RawChain>,
}

#[derive(Debug, Deserialize)]
struct RawChain {
    models: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

fn parse_models(task: &str, models: Vec<String>) -> Result<Vec<ModelRef>> {
    models
        .iter()
        .map(|m| {
            m.parse()
                .map_err(|e| Error::Config(format!("Invalid model in [{}]: {}", task, e)))
        })
        .collect()
}

fn parse_timeout(task: &str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        return Err(Error::Config(format!("timeout_secs in [{}] must be at least 1", task)));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<RouterConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = RouterConfig::default();

    // Apply defaults
    if let Some(defaults) = raw.defaults {
        if let Some(models) = defaults.models {
            config.default_models = parse_models("defaults", models)?;
        }
        if let Some(timeout) = defaults.timeout_secs {
            config.default_timeout = parse_timeout("defaults", timeout)?;
        }
    }

    // Apply task-specific chains
    for (task_name, chain) in raw.chains {
        let Some(task) = TaskType::from_key(&task_name) else {
            tracing::warn!(task = %task_name, "Ignoring unknown task in model config");
            continue;
        };

        let models = match chain.models {
            Some(models) => parse_models(&task_name, models)?,
            None => config.default_models.clone(),
        };
        let timeout = match chain.timeout_secs {
            Some(secs) => parse_timeout(&task_name, secs)?,
            None => config.default_timeout,
        };

        config.chains.insert(
            task,
            ChainConfig {
                models,
                timeout,
            },
        );
    }

    Ok(config)
}
