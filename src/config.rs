use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BotchatConfig {
    pub completion: CompletionConfig,
    pub orchestrator: OrchestratorConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    /// Overrides the provider's public endpoint.
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".into()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Messages of history sent with each reply request.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_memory_refresh_threshold")]
    pub memory_refresh_threshold: usize,
    /// First try plus retries through the outbox.
    #[serde(default = "default_max_completion_attempts")]
    pub max_completion_attempts: u32,
    #[serde(default = "default_max_learned_responses")]
    pub max_learned_responses: usize,
    #[serde(default = "default_suggestion_count")]
    pub suggestion_count: usize,
    #[serde(default = "default_summary_window")]
    pub summary_window: usize,
    #[serde(default)]
    pub remote_mood: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            memory_refresh_threshold: default_memory_refresh_threshold(),
            max_completion_attempts: default_max_completion_attempts(),
            max_learned_responses: default_max_learned_responses(),
            suggestion_count: default_suggestion_count(),
            summary_window: default_summary_window(),
            remote_mood: false,
        }
    }
}

fn default_context_window() -> usize {
    10
}
fn default_memory_refresh_threshold() -> usize {
    5
}
fn default_max_completion_attempts() -> u32 {
    3
}
fn default_max_learned_responses() -> usize {
    20
}
fn default_suggestion_count() -> usize {
    3
}
fn default_summary_window() -> usize {
    50
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory for the file cache. In-memory when unset.
    pub path: Option<String>,
}

impl CacheConfig {
    /// Expands a leading `~/` against `$HOME`.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        let raw = self.path.as_deref()?;
        match raw.strip_prefix("~/") {
            Some(rest) => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
                Some(PathBuf::from(home).join(rest))
            }
            None => Some(PathBuf::from(raw)),
        }
    }
}

/// Load configuration from file or use defaults.
///
/// Search order:
/// 1. `BOTCHAT_CONFIG` env var
/// 2. `~/.botchat/config.toml`
/// 3. Zero-config defaults (no file needed)
pub fn load() -> anyhow::Result<BotchatConfig> {
    let path = config_path();

    if path.exists() {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let mut config = parse(&content)
            .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))?;

        resolve_api_key(&mut config);
        validate(&config)?;

        info!("loaded config from {}", path.display());
        Ok(config)
    } else {
        info!("no config file found, using zero-config defaults");
        let mut config = BotchatConfig::default();
        resolve_api_key(&mut config);
        Ok(config)
    }
}

/// Parse a TOML document without touching the environment.
pub fn parse(content: &str) -> Result<BotchatConfig, toml::de::Error> {
    toml::from_str(content)
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("BOTCHAT_CONFIG") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".botchat").join("config.toml")
}

/// Fill the API key from the environment, then the local key store.
fn resolve_api_key(config: &mut BotchatConfig) {
    if config.completion.api_key.is_none() {
        config.completion.api_key = match config.completion.provider.as_str() {
            "anthropic" => std::env::var("ANTHROPIC_API_KEY").ok(),
            "openai" => std::env::var("OPENAI_API_KEY").ok(),
            _ => None,
        }
        .or_else(|| crate::secrets::load_api_key(&config.completion.provider));
    }
}

/// Validate the config and return clear error messages.
pub fn validate(config: &BotchatConfig) -> anyhow::Result<()> {
    let valid_providers = ["anthropic", "openai"];
    if !valid_providers.contains(&config.completion.provider.as_str()) {
        anyhow::bail!(
            "invalid provider '{}': must be one of {:?}",
            config.completion.provider,
            valid_providers
        );
    }

    if config.completion.max_tokens == 0 {
        anyhow::bail!("completion.max_tokens must be > 0");
    }

    if config.orchestrator.context_window == 0 {
        anyhow::bail!("orchestrator.context_window must be > 0");
    }

    if config.orchestrator.max_completion_attempts == 0 {
        anyhow::bail!("orchestrator.max_completion_attempts must be > 0");
    }

    Ok(())
}
