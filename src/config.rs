use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub gmail: GmailConfig,
    pub gemini: GeminiConfig,
    pub data_dir: String,
    pub settings_path: String,
    pub sender_name: String,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GmailConfig {
    pub credentials_path: String,
    pub token_cache_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Daemon lifetime; no new cycles start after this many minutes.
    pub max_runtime_minutes: u64,
}

impl Config {
    pub fn new() -> Result<Self> {
        // Check the variables without which no cycle can run
        Self::check_required_env_vars()?;

        Ok(Config {
            gmail: GmailConfig {
                credentials_path: std::env::var("GMAIL_CREDENTIALS_PATH")
                    .context("GMAIL_CREDENTIALS_PATH must be set")?,
                token_cache_path: std::env::var("GMAIL_TOKEN_CACHE_PATH")
                    .unwrap_or_else(|_| "./gmail-token-cache.json".to_string()),
            },
            gemini: GeminiConfig {
                api_key: std::env::var("GEMINI_API_KEY")
                    .context("GEMINI_API_KEY must be set")?,
                model: std::env::var("GEMINI_MODEL")
                    .unwrap_or_else(|_| "gemini-2.0-flash-lite".to_string()),
                base_url: std::env::var("GEMINI_BASE_URL")
                    .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            },
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string()),
            settings_path: std::env::var("SETTINGS_PATH")
                .unwrap_or_else(|_| "./settings.json".to_string()),
            sender_name: std::env::var("SENDER_NAME")
                .unwrap_or_else(|_| "Mail Triage".to_string()),
            scheduler: SchedulerConfig {
                max_runtime_minutes: std::env::var("MAX_RUNTIME_MINUTES")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
        })
    }

    pub fn ignore_patterns_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("ignore_patterns.json")
    }

    pub fn watermark_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("watermark.json")
    }

    pub fn backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("email_backups")
    }

    fn check_required_env_vars() -> Result<()> {
        let required_vars = [
            "GMAIL_CREDENTIALS_PATH",
            "GEMINI_API_KEY",
        ];

        let missing_vars: Vec<&str> = required_vars
            .iter()
            .copied()
            .filter(|var| std::env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true))
            .collect();

        if !missing_vars.is_empty() {
            anyhow::bail!(
                "Missing environment variables: {}\n\
                 \n\
                 💡 Solutions:\n\
                 1. Create a .env file with your credentials:\n\
                    cp .env.example .env\n\
                    # Then edit .env with your values\n\
                 \n\
                 2. Or export the variables manually:\n\
                    export GMAIL_CREDENTIALS_PATH=/path/to/client_credentials.json\n\
                    export GEMINI_API_KEY=your-api-key\n\
                    cargo run -- --dry-run",
                missing_vars.join(", ")
            );
        }

        Ok(())
    }
}
