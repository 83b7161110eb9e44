use anyhow::{Context, Result};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::Category;

/// Runtime settings document.
///
/// Loaded from a JSON file (snake_case keys) layered with
/// `MAILTRIAGE__<SECTION>__<KEY>` environment overrides. Every field has a
/// default so a partial or missing file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rate_limiting: RateLimitSettings,
    pub email_processing: EmailProcessingSettings,
    pub ai_analysis: AiAnalysisSettings,
    pub labels: LabelSettings,
    pub garbage_cleanup: GarbageCleanupSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_requests_per_minute: usize,
    pub daily_limit: u32,
    pub check_interval_minutes: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        RateLimitSettings {
            max_requests_per_minute: 15,
            daily_limit: 1500,
            check_interval_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailProcessingSettings {
    pub max_emails_per_check: u32,
    pub inter_message_delay_seconds: u64,
    pub auto_label_emails: bool,
    pub move_spam_to_spam_folder: bool,
    /// Restrict the unread query to messages newer than the last cycle.
    pub check_after_watermark: bool,
    /// Send replies directly instead of leaving drafts.
    pub auto_send_replies: bool,
    pub use_ai_drafts: bool,
}

impl Default for EmailProcessingSettings {
    fn default() -> Self {
        EmailProcessingSettings {
            max_emails_per_check: 10,
            inter_message_delay_seconds: 5,
            auto_label_emails: true,
            move_spam_to_spam_folder: true,
            check_after_watermark: false,
            auto_send_replies: false,
            use_ai_drafts: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiAnalysisSettings {
    pub daily_call_cap: u32,
    pub max_attempts: u32,
    pub min_call_spacing_ms: u64,
}

impl Default for AiAnalysisSettings {
    fn default() -> Self {
        AiAnalysisSettings {
            daily_call_cap: 1000,
            max_attempts: 2,
            min_call_spacing_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSettings {
    pub important: String,
    pub promotional: String,
    pub social: String,
    pub updates: String,
    pub newsletter: String,
    pub spam: String,
    pub review_needed: String,
    pub pre_filtered: String,
}

impl Default for LabelSettings {
    fn default() -> Self {
        LabelSettings {
            important: "📧 Important".to_string(),
            promotional: "📧 Promotional".to_string(),
            social: "📧 Social".to_string(),
            updates: "📧 Updates".to_string(),
            newsletter: "📧 Newsletter".to_string(),
            spam: "🗑️ Spam".to_string(),
            review_needed: "🔧 Review Needed".to_string(),
            pre_filtered: "📂 Pre-filtered".to_string(),
        }
    }
}

impl LabelSettings {
    pub fn for_category(&self, category: Category) -> &str {
        match category {
            Category::Important => &self.important,
            Category::Promotional => &self.promotional,
            Category::Social => &self.social,
            Category::Updates => &self.updates,
            Category::Newsletter => &self.newsletter,
            Category::Spam => &self.spam,
        }
    }

    /// Every label this tool manages, used to highlight them in listings.
    pub fn all(&self) -> Vec<&str> {
        vec![
            &self.important,
            &self.promotional,
            &self.social,
            &self.updates,
            &self.newsletter,
            &self.spam,
            &self.review_needed,
            &self.pre_filtered,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GarbageCleanupSettings {
    pub enabled: bool,
    pub confidence_threshold: u32,
    pub max_emails_to_analyze: u32,
    pub only_delete_older_than_days: i64,
    pub require_multiple_indicators: bool,
    pub dry_run_mode: bool,
    pub backup_before_delete: bool,
}

impl Default for GarbageCleanupSettings {
    fn default() -> Self {
        GarbageCleanupSettings {
            enabled: false,
            confidence_threshold: 85,
            max_emails_to_analyze: 20,
            only_delete_older_than_days: 30,
            require_multiple_indicators: true,
            dry_run_mode: true,
            backup_before_delete: true,
        }
    }
}

/// Cached settings loader; `refresh` drops the cache so the next `load`
/// re-reads the document.
pub struct SettingsStore {
    path: PathBuf,
    cached: Option<Settings>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SettingsStore {
            path: path.into(),
            cached: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the cached settings, reading them on first use.
    ///
    /// A broken document is logged and replaced by defaults.
    pub fn load(&mut self) -> &Settings {
        if self.cached.is_none() {
            let settings = match Self::read(&self.path) {
                Ok(settings) => {
                    debug!("Settings loaded from {}", self.path.display());
                    settings
                }
                Err(e) => {
                    error!("❌ Error loading settings from {}, using defaults: {:#}", self.path.display(), e);
                    Settings::default()
                }
            };
            self.cached = Some(settings);
        }

        self.cached.get_or_insert_with(Settings::default)
    }

    pub fn refresh(&mut self) {
        if self.cached.take().is_some() {
            info!("🔄 Settings cache invalidated");
        }
    }

    pub fn read(path: &Path) -> Result<Settings> {
        let document = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("MAILTRIAGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Unable to read settings document")?;

        document
            .try_deserialize::<Settings>()
            .context("Invalid settings document")
    }
}
