use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::classifier::{AiClassifier, Category, ClassificationSource};
use crate::clock::Clock;
use crate::email::labels::{INBOX, UNREAD};
use crate::email::{LabelCache, MailboxProvider};
use crate::filters::{PreFilter, SpamFilter};
use crate::garbage::{run_garbage_cleanup, CleanupResult, GarbageDetector};
use crate::model::TextModel;
use crate::rate_limiter::{RateGovernor, UsageStats};
use crate::reply::{Delivery, DraftGenerator, DraftStats};
use crate::settings::{Settings, SettingsStore};
use crate::watermark::{after_clause, WatermarkStore};

/// Counters for one processing cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Local>,
    pub total_processed: u32,
    /// Classified by the pre-filter; no model call made.
    pub pre_filtered: u32,
    pub spam_filtered: u32,
    pub ai_analyzed: u32,
    pub drafts_created: u32,
    pub skipped_empty: u32,
    pub errors: u32,
}

impl RunStatistics {
    pub fn new(started_at: DateTime<Local>) -> Self {
        RunStatistics {
            cycle_id: Uuid::new_v4(),
            started_at,
            total_processed: 0,
            pre_filtered: 0,
            spam_filtered: 0,
            ai_analyzed: 0,
            drafts_created: 0,
            skipped_empty: 0,
            errors: 0,
        }
    }

    pub fn print_summary(&self) {
        println!("\n📈 Cycle {} summary:", self.cycle_id);
        println!("   Emails processed: {}", self.total_processed);
        println!("   Spam filtered: {}", self.spam_filtered);
        println!("   Pre-filtered (API calls saved): {}", self.pre_filtered);
        println!("   AI analyzed: {}", self.ai_analyzed);
        println!("   Drafts created: {}", self.drafts_created);
        println!("   Skipped (no readable content): {}", self.skipped_empty);
        println!("   Errors: {}", self.errors);
    }
}

/// Options fixed for the lifetime of an orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub sender_name: String,
    pub backup_dir: PathBuf,
    pub watermark_path: PathBuf,
    /// Global dry run: no labels, drafts or deletions are written.
    pub dry_run: bool,
    /// Overrides `max_emails_per_check` when set.
    pub limit: Option<u32>,
}

/// Drives the per-message triage pipeline and owns all run state.
pub struct Orchestrator {
    mailbox: Arc<dyn MailboxProvider>,
    model: Arc<dyn TextModel>,
    clock: Arc<dyn Clock>,
    settings: SettingsStore,
    governor: RateGovernor,
    classifier: AiClassifier,
    drafts: DraftGenerator,
    pre_filter: PreFilter,
    spam_filter: SpamFilter,
    labels: LabelCache,
    watermark: WatermarkStore,
    options: OrchestratorOptions,
    stats: RunStatistics,
    draft_stats: DraftStats,
}

impl Orchestrator {
    pub fn new(
        mailbox: Arc<dyn MailboxProvider>,
        model: Arc<dyn TextModel>,
        clock: Arc<dyn Clock>,
        mut settings: SettingsStore,
        spam_filter: SpamFilter,
        options: OrchestratorOptions,
    ) -> Self {
        let current = settings.load().clone();

        let governor = RateGovernor::per_minute(
            clock.clone(),
            current.rate_limiting.max_requests_per_minute,
            current.rate_limiting.daily_limit,
        );
        let classifier = AiClassifier::new(model.clone(), clock.clone(), &current.ai_analysis);
        let drafts = DraftGenerator::new(
            model.clone(),
            options.sender_name.clone(),
            current.email_processing.use_ai_drafts,
        );
        let stats = RunStatistics::new(clock.now());

        Orchestrator {
            mailbox,
            model,
            clock,
            settings,
            governor,
            classifier,
            drafts,
            pre_filter: PreFilter::default(),
            spam_filter,
            labels: LabelCache::new(),
            watermark: WatermarkStore::new(options.watermark_path.clone()),
            options,
            stats,
            draft_stats: DraftStats::default(),
        }
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn draft_statistics(&self) -> &DraftStats {
        &self.draft_stats
    }

    pub fn reset_statistics(&mut self) {
        self.stats = RunStatistics::new(self.clock.now());
        self.draft_stats = DraftStats::default();
    }

    pub fn usage(&mut self) -> UsageStats {
        self.governor.usage()
    }

    pub fn settings(&mut self) -> &Settings {
        self.settings.load()
    }

    /// Re-read the settings document and apply new limits to every stage.
    pub fn refresh_settings(&mut self) {
        self.settings.refresh();
        let current = self.settings.load().clone();

        self.governor.set_limits(
            current.rate_limiting.max_requests_per_minute,
            current.rate_limiting.daily_limit,
        );
        self.classifier.apply_settings(&current.ai_analysis);
        self.drafts.set_use_ai_drafts(current.email_processing.use_ai_drafts);
    }

    /// Run one full cycle over unread mail, then the optional cleanup pass.
    pub async fn run_cycle(&mut self) -> RunStatistics {
        self.reset_statistics();
        self.labels.start_run();

        let cycle_start: DateTime<Utc> = self.clock.now().with_timezone(&Utc);
        let settings = self.settings.load().clone();
        let processing = &settings.email_processing;

        info!("📬 Checking for new emails (cycle {})", self.stats.cycle_id);

        let mut query = "is:unread".to_string();
        if processing.check_after_watermark {
            match self.watermark.load() {
                Ok(Some(watermark)) => {
                    query.push(' ');
                    query.push_str(&after_clause(watermark));
                }
                Ok(None) => {}
                Err(e) => warn!("⚠️  Ignoring unreadable watermark: {:#}", e),
            }
        }

        let max_results = self.options.limit.unwrap_or(processing.max_emails_per_check);

        let message_ids = match self.mailbox.list_messages(&query, max_results).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("❌ Error listing messages, ending cycle: {:#}", e);
                self.stats.errors += 1;
                return self.stats.clone();
            }
        };

        if message_ids.is_empty() {
            info!("No new messages found.");
        } else {
            info!("Found {} unread message(s)", message_ids.len());
        }

        let delay = Duration::from_secs(processing.inter_message_delay_seconds);
        for (index, message_id) in message_ids.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                info!(
                    "→ Waiting {}s before processing next email ({}/{})...",
                    delay.as_secs(),
                    index + 1,
                    message_ids.len()
                );
                self.clock.sleep(delay).await;
            }

            if let Err(e) = self.process_message(message_id, &settings).await {
                error!("→ Error processing email {}: {:#}", message_id, e);
                self.stats.errors += 1;
                self.mark_for_review(message_id, &settings).await;
            }
        }

        let listing_truncated = message_ids.len() >= max_results as usize;
        if processing.check_after_watermark && listing_truncated {
            info!("⏸️  Listing hit the limit of {}; watermark not advanced", max_results);
        } else if processing.check_after_watermark && !self.options.dry_run {
            if let Err(e) = self.watermark.store(cycle_start) {
                warn!("⚠️  Unable to advance watermark: {:#}", e);
            }
        }

        self.draft_stats.print();

        if settings.garbage_cleanup.enabled {
            if self.governor.should_skip_non_essential() {
                info!("⏭️  Skipping garbage cleanup to preserve quota");
            } else {
                println!("\n🗑️ Running garbage email cleanup...");
                let result = self.run_garbage_cleanup_pass().await;
                result.print_summary();
            }
        }

        self.stats.print_summary();
        self.stats.clone()
    }

    /// Run the garbage cleanup with the current settings.
    pub async fn run_garbage_cleanup_pass(&mut self) -> CleanupResult {
        let cleanup_settings = self.settings.load().garbage_cleanup.clone();
        let detector = GarbageDetector::new(self.model.clone(), self.clock.clone(), cleanup_settings);

        let result = run_garbage_cleanup(
            self.mailbox.as_ref(),
            &detector,
            &mut self.governor,
            &self.options.backup_dir,
            self.options.dry_run,
        )
        .await;

        if !result.report.is_empty() {
            println!("\n{}", result.report);
        }
        for e in &result.errors {
            warn!("⚠️  {}", e);
        }

        result
    }

    async fn process_message(&mut self, message_id: &str, settings: &Settings) -> Result<()> {
        let message = self
            .mailbox
            .get_message(message_id)
            .await
            .with_context(|| format!("Unable to fetch email {}", message_id))?;

        self.stats.total_processed += 1;
        info!("Processing email from: {} | Subject: {}", message.from, message.subject);

        if let Some(reason) = self.spam_filter.check(&message.from, &message.subject, &message.body) {
            info!("→ Email filtered out by spam detection ({}) - saving API call", reason);
            self.stats.spam_filtered += 1;

            let remove: &[&str] = if settings.email_processing.move_spam_to_spam_folder {
                &[UNREAD, INBOX]
            } else {
                &[]
            };
            return self.apply_label(message_id, &settings.labels.spam, remove).await;
        }

        if !message.has_readable_content() {
            info!("→ No readable content found in email");
            self.stats.skipped_empty += 1;
            return Ok(());
        }

        let decision = self.pre_filter.evaluate(&message.from, &message.subject, &message.body);
        if decision.skip {
            let category = decision.category.unwrap_or(Category::Updates);
            info!("→ Pre-filtered: {} ({}) - saving API call", decision.reason, category);
            self.stats.pre_filtered += 1;

            self.apply_label(message_id, settings.labels.for_category(category), &[UNREAD])
                .await?;
            return self
                .apply_label(message_id, &settings.labels.pre_filtered, &[UNREAD])
                .await;
        }

        info!("🤖 Analyzing with {}...", self.model.model_name());
        let result = self
            .classifier
            .classify(&mut self.governor, &message.body, &message.from, &message.to, &message.subject)
            .await;

        if result.source != ClassificationSource::QuotaSkipped {
            self.stats.ai_analyzed += 1;
        }

        info!(
            "📊 Categorized as: {} ({} priority) | 🎯 Confidence: {}% | Reply needed: {}",
            result.category, result.priority, result.confidence, result.needs_reply
        );

        if settings.email_processing.auto_label_emails {
            self.apply_label(message_id, settings.labels.for_category(result.category), &[UNREAD])
                .await?;
        }

        if result.needs_reply || result.category == Category::Important {
            let delivery = if self.options.dry_run {
                Delivery::DryRun
            } else if settings.email_processing.auto_send_replies {
                Delivery::Send
            } else {
                Delivery::Draft
            };

            let draft = self
                .drafts
                .create_smart_draft(
                    self.mailbox.as_ref(),
                    &mut self.governor,
                    &message,
                    result.category,
                    result.priority,
                    delivery,
                )
                .await;

            if draft.should_create_draft {
                info!("🎉 Smart draft created ({}, {}% confidence)", draft.reason, draft.confidence);
                self.stats.drafts_created += 1;
            } else {
                info!("⏭️  Draft not created: {}", draft.reason);
            }
            self.draft_stats.record(result.category, draft.should_create_draft);
        } else {
            self.draft_stats.record(result.category, false);
        }

        if !result.suggested_actions.is_empty() {
            info!("→ Suggested Actions: {}", result.suggested_actions.join(", "));
        }

        Ok(())
    }

    async fn apply_label(&mut self, message_id: &str, label: &str, remove: &[&str]) -> Result<()> {
        if self.options.dry_run {
            println!("   🏷️  [DRY RUN] Would apply label '{}' to {}", label, message_id);
            return Ok(());
        }

        self.labels
            .apply(self.mailbox.as_ref(), message_id, label, remove)
            .await
            .map(|_| ())
    }

    async fn mark_for_review(&mut self, message_id: &str, settings: &Settings) {
        if let Err(e) = self
            .apply_label(message_id, &settings.labels.review_needed, &[UNREAD])
            .await
        {
            error!("→ Failed to apply error label to {}: {:#}", message_id, e);
        }
    }
}
