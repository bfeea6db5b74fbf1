use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Spawn an executable per prompt and read its stdout.
    #[default]
    Command,
    /// OpenAI-compatible chat completions endpoint.
    Http,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Command => write!(f, "command"),
            LlmProvider::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Long-poll timeout passed to getUpdates. 0 means short polling.
    #[serde(default)]
    pub poll_timeout_secs: u32,
    /// Chats the relay answers. Empty means every chat.
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_command_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the local Ollama OpenAI-compatible endpoint.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return self.base_url.trim_end_matches('/');
        }
        "http://localhost:11434/v1"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TelegramConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_url: default_api_url(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: 0,
            allowed_chat_ids: Vec::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: String::new(),
            command: default_command(),
            args: default_command_args(),
            base_url: String::new(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_command() -> String {
    "ollama".to_string()
}

fn default_command_args() -> Vec<String> {
    vec!["run".to_string()]
}

fn default_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Read the config file (if present), apply environment overrides and
    /// validate. A missing file is allowed so the relay can run from the
    /// environment alone.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with the environment lookup supplied by the caller.
    pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            info!(
                "Config file {} not found, using defaults and environment",
                path.display()
            );
            Config::default()
        };

        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay values from `lookup` (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(url) = lookup("TELEGRAM_API_URL") {
            self.telegram.api_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        if let Some(interval) = lookup("POLL_INTERVAL_MS") {
            self.telegram.poll_interval_ms = interval
                .trim()
                .parse()
                .with_context(|| format!("POLL_INTERVAL_MS is not a number: {}", interval))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!(
                "Telegram bot token is missing: set [telegram] bot_token or TELEGRAM_BOT_TOKEN"
            );
        }
        if self.llm.model.trim().is_empty() {
            anyhow::bail!("Model name is missing: set [llm] model or OLLAMA_MODEL");
        }
        if self.telegram.poll_interval_ms == 0 {
            anyhow::bail!("[telegram] poll_interval_ms must be greater than zero");
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("[llm] timeout_secs must be greater than zero");
        }
        reqwest::Url::parse(&self.telegram.api_url)
            .with_context(|| format!("Invalid Telegram API URL: {}", self.telegram.api_url))?;
        if self.llm.provider == LlmProvider::Command && self.llm.command.trim().is_empty() {
            anyhow::bail!("[llm] command must not be empty for the command provider");
        }
        Ok(())
    }
}
