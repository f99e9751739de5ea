use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_SCORES_CSV_PATH: &str = "Resume scorer card.csv";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Attempt budgets for each validated-generation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudgets {
    pub criteria: u32,
    pub headers: u32,
    pub scoring: u32,
}

impl Default for AttemptBudgets {
    fn default() -> Self {
        Self {
            criteria: 3,
            headers: 2,
            scoring: 2,
        }
    }
}

/// Settings for the generation backend (HTTP transport level).
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmSettings,
    pub budgets: AttemptBudgets,
    pub scoring_concurrency: usize,
    pub scores_csv_path: PathBuf,
    pub prompt_templates_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = AttemptBudgets::default();
        let config = Config {
            llm: LlmSettings {
                api_key: require_env("OPENAI_API_KEY")?,
                api_url: env_or("OPENAI_API_URL", DEFAULT_OPENAI_API_URL.to_string())?,
                model: env_or("OPENAI_MODEL", DEFAULT_MODEL.to_string())?,
                max_retries: env_or("LLM_MAX_RETRIES", 5)?,
                retry_backoff_ms: env_or("LLM_RETRY_BACKOFF_MS", 500)?,
                timeout_secs: env_or("LLM_TIMEOUT_SECS", 120)?,
            },
            budgets: AttemptBudgets {
                criteria: env_or("CRITERIA_MAX_ATTEMPTS", defaults.criteria)?,
                headers: env_or("HEADERS_MAX_ATTEMPTS", defaults.headers)?,
                scoring: env_or("SCORING_MAX_ATTEMPTS", defaults.scoring)?,
            },
            scoring_concurrency: env_or("SCORING_CONCURRENCY", 4)?,
            scores_csv_path: env_or(
                "SCORES_CSV_PATH",
                PathBuf::from(DEFAULT_SCORES_CSV_PATH),
            )?,
            prompt_templates_dir: std::env::var("PROMPT_TEMPLATES_DIR")
                .ok()
                .map(PathBuf::from),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let budgets = [
            ("CRITERIA_MAX_ATTEMPTS", self.budgets.criteria),
            ("HEADERS_MAX_ATTEMPTS", self.budgets.headers),
            ("SCORING_MAX_ATTEMPTS", self.budgets.scoring),
            ("LLM_MAX_RETRIES", self.llm.max_retries),
        ];
        for (key, value) in budgets {
            if value == 0 {
                bail!("{key} must be at least 1");
            }
        }
        if self.scoring_concurrency == 0 {
            bail!("SCORING_CONCURRENCY must be at least 1");
        }
        Ok(())
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_or(key, std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T>(key: &str, raw: Option<&str>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{value}'")),
    }
}
