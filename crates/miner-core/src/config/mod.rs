//! Configuration management with file persistence
//!
//! Operator settings live in a TOML file; per-subnet policy lives in a
//! separate JSON file (see [`policy`]) because it is shared with the network
//! tooling that provisions subnets.

pub mod policy;

pub use policy::{PolicySet, SubnetPolicy};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::strategy::PromptStrategy;

/// Miner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub budget: BudgetConfig,
    pub routing: RoutingConfig,
    pub inference: InferenceConfig,
    pub strategies: StrategyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the ledger, result log and policy files
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Fraction of each monthly allowance kept unspent (0.0 to 1.0)
    pub reserve_fraction: f64,
    /// Aggregate utilization above which every task is rejected
    pub utilization_ceiling_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Highest-capability model, used for complex reasoning
    pub complex_model: String,
    /// Fastest/cheapest model, used for simple generation
    pub fast_model: String,
    /// Model used when a subnet has no policy
    pub default_model: String,
    /// Provider assumed for model names matching no known family
    pub fallback_provider: String,
    pub temperature: f32,
    /// Token ceiling used when a subnet has no policy
    pub default_max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Backend name: "echo" or "openrouter"
    pub backend: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Formatted responses are truncated to this many characters
    pub max_response_chars: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Prompt template overrides keyed by strategy name
    pub templates: BTreeMap<String, String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            reserve_fraction: 0.1,
            utilization_ceiling_percent: 90.0,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            complex_model: "claude-sonnet".to_string(),
            fast_model: "gemini-pro".to_string(),
            default_model: "openai-gpt4".to_string(),
            fallback_provider: "openai".to_string(),
            temperature: 0.7,
            default_max_tokens: 1000,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: "echo".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            timeout_secs: 120,
            max_response_chars: 8000,
        }
    }
}

impl PathsConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join("token-budgets.json")
    }

    pub fn result_log_path(&self) -> PathBuf {
        self.state_dir.join("task-history.jsonl")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.state_dir.join("performance-metrics.json")
    }

    pub fn policy_path(&self) -> PathBuf {
        self.state_dir.join("subnet-profiles.json")
    }
}

impl InferenceConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("MINER_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolved_api_key().map(|opt| opt.map(|key| redact_key(&key)))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

/// Mask all but the last four characters of a key
fn redact_key(key: &str) -> String {
    let len = key.chars().count();
    if len <= 4 {
        return "***".to_string();
    }
    let suffix: String = key.chars().skip(len - 4).collect();
    format!("***{}", suffix)
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("MINER_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("subnet-miner")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a file, or return defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            // Return default config without creating file
            Ok(Config::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.inference.enforce_env_only()?;

        if !(0.0..1.0).contains(&self.budget.reserve_fraction) {
            return Err(anyhow!("budget.reserve_fraction must be in [0.0, 1.0)"));
        }
        if !(0.0..=100.0).contains(&self.budget.utilization_ceiling_percent) {
            return Err(anyhow!(
                "budget.utilization_ceiling_percent must be between 0 and 100"
            ));
        }
        if !["echo", "openrouter"].contains(&self.inference.backend.as_str()) {
            return Err(anyhow!(
                "inference.backend must be one of: echo, openrouter"
            ));
        }
        for name in self.strategies.templates.keys() {
            name.parse::<PromptStrategy>()
                .map_err(|e| anyhow!("strategies.templates: {}", e))?;
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "paths.state_dir" => Ok(self.paths.state_dir.display().to_string()),

            "budget.reserve_fraction" => Ok(self.budget.reserve_fraction.to_string()),
            "budget.utilization_ceiling_percent" => {
                Ok(self.budget.utilization_ceiling_percent.to_string())
            }

            "routing.complex_model" => Ok(self.routing.complex_model.clone()),
            "routing.fast_model" => Ok(self.routing.fast_model.clone()),
            "routing.default_model" => Ok(self.routing.default_model.clone()),
            "routing.fallback_provider" => Ok(self.routing.fallback_provider.clone()),
            "routing.temperature" => Ok(self.routing.temperature.to_string()),
            "routing.default_max_tokens" => Ok(self.routing.default_max_tokens.to_string()),

            "inference.backend" => Ok(self.inference.backend.clone()),
            "inference.base_url" => Ok(self.inference.base_url.clone()),
            "inference.timeout_secs" => Ok(self.inference.timeout_secs.to_string()),
            "inference.max_response_chars" => Ok(self.inference.max_response_chars.to_string()),

            // API key (special handling - show redacted)
            "inference.api_key" | "api_key" => match self.inference.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => {
                    Ok("(not set - use MINER_API_KEY or OPENROUTER_API_KEY env var)".to_string())
                }
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `subnet-miner config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "paths.state_dir" => {
                self.paths.state_dir = PathBuf::from(value);
            }

            "budget.reserve_fraction" => {
                let fraction: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid reserve_fraction value: {}", value))?;
                if !(0.0..1.0).contains(&fraction) {
                    return Err(anyhow!("Reserve fraction must be in [0.0, 1.0)"));
                }
                self.budget.reserve_fraction = fraction;
            }
            "budget.utilization_ceiling_percent" => {
                let ceiling: f64 = value.parse().with_context(|| {
                    format!("Invalid utilization_ceiling_percent value: {}", value)
                })?;
                if !(0.0..=100.0).contains(&ceiling) {
                    return Err(anyhow!("Utilization ceiling must be between 0 and 100"));
                }
                self.budget.utilization_ceiling_percent = ceiling;
            }

            "routing.complex_model" => self.routing.complex_model = value.to_string(),
            "routing.fast_model" => self.routing.fast_model = value.to_string(),
            "routing.default_model" => self.routing.default_model = value.to_string(),
            "routing.fallback_provider" => {
                let valid = ["openai", "anthropic", "google"];
                if !valid.contains(&value) {
                    return Err(anyhow!(
                        "Invalid fallback provider: {}. Valid options: {}",
                        value,
                        valid.join(", ")
                    ));
                }
                self.routing.fallback_provider = value.to_string();
            }
            "routing.temperature" => {
                let temp: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid temperature value: {}", value))?;
                if !(0.0..=2.0).contains(&temp) {
                    return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
                }
                self.routing.temperature = temp;
            }
            "routing.default_max_tokens" => {
                self.routing.default_max_tokens = value
                    .parse()
                    .with_context(|| format!("Invalid default_max_tokens value: {}", value))?;
            }

            "inference.backend" => {
                let valid = ["echo", "openrouter"];
                if !valid.contains(&value) {
                    return Err(anyhow!(
                        "Invalid backend: {}. Valid options: {}",
                        value,
                        valid.join(", ")
                    ));
                }
                self.inference.backend = value.to_string();
            }
            "inference.base_url" => self.inference.base_url = value.to_string(),
            "inference.timeout_secs" => {
                self.inference.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }
            "inference.max_response_chars" => {
                self.inference.max_response_chars = value
                    .parse()
                    .with_context(|| format!("Invalid max_response_chars value: {}", value))?;
            }

            // API key cannot be set via config
            "inference.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the MINER_API_KEY or OPENROUTER_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `subnet-miner config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "paths.state_dir",
            "budget.reserve_fraction",
            "budget.utilization_ceiling_percent",
            "routing.complex_model",
            "routing.fast_model",
            "routing.default_model",
            "routing.fallback_provider",
            "routing.temperature",
            "routing.default_max_tokens",
            "inference.backend",
            "inference.base_url",
            "inference.timeout_secs",
            "inference.max_response_chars",
            "inference.api_key",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
