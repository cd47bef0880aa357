//! Process configuration read from the environment
//!
//! Read once at startup and passed down explicitly. LLM provider variables are
//! handled separately by [`crate::llm::LlmConfig`].

use crate::agent::AgentConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub doc_root: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub default_glob: String,
    pub agent: AgentConfig,
    pub tool_timeout: Duration,
    pub port: u16,
    /// `None` disables trace persistence
    pub session_log_dir: Option<PathBuf>,
    pub index: Option<IndexConfig>,
    pub batch_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub url: String,
    pub indices: Vec<String>,
    pub timeout: Duration,
}

const INDEX_TIMEOUT: Duration = Duration::from_secs(10);

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let allowed_extensions = list(&env.string("LEGAL_ALLOWED_EXTENSIONS", "txt,md"));
        if allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid {
                var: "LEGAL_ALLOWED_EXTENSIONS",
                value: String::new(),
                reason: "at least one extension is required".to_string(),
            });
        }

        let max_steps: usize = env.parse("AGENT_MAX_STEPS", 10)?;
        if max_steps == 0 {
            return Err(ConfigError::Invalid {
                var: "AGENT_MAX_STEPS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let max_llm_attempts: u32 = env.parse("AGENT_MAX_LLM_ATTEMPTS", 3)?;

        let agent = AgentConfig {
            max_steps,
            timeout: Duration::from_secs(env.parse("AGENT_TIMEOUT_SECONDS", 90)?),
            max_llm_attempts: max_llm_attempts.max(1),
            retry_base: Duration::from_millis(env.parse("AGENT_RETRY_BASE_MS", 1000)?),
            ..AgentConfig::default()
        };

        // Set but empty disables persistence; unset falls back to `logs`
        let session_log_dir = match lookup("LEGAL_SESSION_LOG_DIR") {
            None => Some(PathBuf::from("logs")),
            Some(dir) if dir.trim().is_empty() => None,
            Some(dir) => Some(PathBuf::from(dir.trim())),
        };

        let index = env.optional("LEGAL_INDEX_URL").map(|url| IndexConfig {
            url,
            indices: list(&env.string("LEGAL_INDEX_NAMES", "legal_gesetze,legal_urteile")),
            timeout: INDEX_TIMEOUT,
        });

        Ok(Self {
            doc_root: PathBuf::from(env.string("LEGAL_DOC_ROOT", "./data")),
            allowed_extensions,
            default_glob: env.string("LEGAL_DEFAULT_GLOB", "**/*.{txt,md}"),
            agent,
            tool_timeout: Duration::from_secs(env.parse("AGENT_TOOL_TIMEOUT_SECONDS", 30)?),
            port: env.parse("LEGAL_PORT", 8000)?,
            session_log_dir,
            index,
            batch_concurrency: env.parse::<usize>("LEGAL_BATCH_CONCURRENCY", 4)?.max(1),
        })
    }
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn optional(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.optional(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
