use crate::types::DEFAULT_MESSAGE_TEXT;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub message: MessageConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_env_remove")]
    pub env_remove: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MessageConfig {
    #[serde(default = "default_message_text")]
    pub text: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default)]
    pub wire_log: Option<PathBuf>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            prompt: default_prompt(),
            env_remove: default_env_remove(),
            cwd: None,
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            text: default_message_text(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl PollConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ProbeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let cfg: ProbeConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config toml: {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.program.trim().is_empty() {
            bail!("command.program must not be empty");
        }
        if self.poll.timeout_secs == 0 {
            bail!("poll.timeout_secs must be greater than zero");
        }
        if self.poll.interval_ms == 0 {
            bail!("poll.interval_ms must be greater than zero");
        }
        Ok(())
    }
}

fn default_program() -> String {
    "claude".to_string()
}

fn default_args() -> Vec<String> {
    [
        "-p",
        "--input-format",
        "stream-json",
        "--output-format",
        "stream-json",
        "--verbose",
        "--include-partial-messages",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_prompt() -> String {
    "Just say hi back".to_string()
}

// Set when running nested inside another claude session; the CLI refuses to start with it.
fn default_env_remove() -> Vec<String> {
    vec!["CLAUDECODE".to_string()]
}

fn default_message_text() -> String {
    DEFAULT_MESSAGE_TEXT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_interval_ms() -> u64 {
    100
}
