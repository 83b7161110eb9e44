use anyhow::{Context, Result};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::detector::{GarbageAnalysis, GarbageDetector, Recommendation};
use crate::email::{MailboxProvider, Message};
use crate::rate_limiter::RateGovernor;

const CLEANUP_QUERY: &str = "in:inbox OR in:spam";
const ANALYSIS_DELAY: Duration = Duration::from_millis(100);
const PROTECTED_IN_REPORT: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupResult {
    pub total_analyzed: u32,
    pub marked_for_deletion: u32,
    pub actually_deleted: u32,
    pub skipped_important: u32,
    pub errors: Vec<String>,
    pub dry_run: bool,
    pub report: String,
}

impl CleanupResult {
    pub fn print_summary(&self) {
        println!("\n📋 Garbage Cleanup Summary:");
        println!("   Emails analyzed: {}", self.total_analyzed);
        println!("   Marked for deletion: {}", self.marked_for_deletion);
        println!("   Actually deleted: {}", self.actually_deleted);
        println!("   Protected as important: {}", self.skipped_important);
        println!("   Dry run mode: {}", if self.dry_run { "YES" } else { "NO" });

        if !self.errors.is_empty() {
            println!("   Errors: {}", self.errors.len());
        }

        if self.dry_run && self.marked_for_deletion > 0 {
            println!("\n⚠️  Note: Dry run mode is enabled. No emails were actually deleted.");
            println!("   To enable actual deletion, set garbage_cleanup.dry_run_mode to false in the settings file");
        }
    }
}

/// Analyze recent inbox and spam messages and trash confirmed garbage.
///
/// Nothing is trashed when either `dry_run` (the global flag) or the
/// cleanup's own dry-run setting is on.
pub async fn run_garbage_cleanup(
    mailbox: &dyn MailboxProvider,
    detector: &GarbageDetector,
    governor: &mut RateGovernor,
    backup_dir: &Path,
    dry_run: bool,
) -> CleanupResult {
    let settings = detector.settings();

    if !settings.enabled {
        return CleanupResult {
            report: "Garbage cleanup is disabled".to_string(),
            ..CleanupResult::default()
        };
    }

    info!("🗑️ Starting garbage email cleanup...");

    let mut result = CleanupResult {
        dry_run: dry_run || settings.dry_run_mode,
        ..CleanupResult::default()
    };

    let message_ids = match mailbox
        .list_messages(CLEANUP_QUERY, settings.max_emails_to_analyze)
        .await
    {
        Ok(ids) => ids,
        Err(e) => {
            error!("❌ Cleanup failed: {:#}", e);
            result.errors.push(format!("Cleanup failed: {:#}", e));
            return result;
        }
    };

    info!("📧 Found {} emails to analyze", message_ids.len());

    let mut analyzed: Vec<(Message, GarbageAnalysis)> = Vec::new();

    for message_id in &message_ids {
        match mailbox.get_message(message_id).await {
            Ok(message) => {
                let analysis = detector.analyze(governor, &message).await;
                result.total_analyzed += 1;

                if analysis.is_protected() {
                    result.skipped_important += 1;
                } else if analysis.is_deletable() {
                    result.marked_for_deletion += 1;
                }

                analyzed.push((message, analysis));
            }
            Err(e) => {
                warn!("⚠️  Failed to analyze message {}: {:#}", message_id, e);
                result.errors.push(format!("Failed to analyze message {}: {:#}", message_id, e));
            }
        }

        detector.clock().sleep(ANALYSIS_DELAY).await;
    }

    result.report = cleanup_report(&analyzed, result.dry_run);

    if result.dry_run {
        info!("🔍 Dry run: {} message(s) would be moved to trash", result.marked_for_deletion);
        return result;
    }

    for (message, analysis) in &analyzed {
        if !analysis.is_deletable() {
            continue;
        }

        if settings.backup_before_delete {
            let now_ms = detector.clock().now().timestamp_millis();
            match backup_message(mailbox, backup_dir, &message.id, now_ms).await {
                Ok(path) => info!("📄 Email backup created: {}", path.display()),
                Err(e) => {
                    error!("❌ Failed to backup email {}: {:#}", message.id, e);
                    result
                        .errors
                        .push(format!("Failed to backup {}, skipping deletion", message.id));
                    continue;
                }
            }
        }

        match mailbox.trash_message(&message.id).await {
            Ok(()) => {
                result.actually_deleted += 1;
                info!("🗑️ Moved to trash: {}", message.id);
            }
            Err(e) => {
                error!("❌ Failed to delete {}: {:#}", message.id, e);
                result.errors.push(format!("Failed to delete {}: {:#}", message.id, e));
            }
        }
    }

    info!("✅ Garbage cleanup completed");
    result
}

/// Write the provider's full representation of a message to
/// `<backup_dir>/<message_id>_<unix_ms>.json`.
pub async fn backup_message(
    mailbox: &dyn MailboxProvider,
    backup_dir: &Path,
    message_id: &str,
    unix_ms: i64,
) -> Result<PathBuf> {
    let exported = mailbox.export_message(message_id).await?;

    tokio::fs::create_dir_all(backup_dir)
        .await
        .with_context(|| format!("Unable to create backup directory {}", backup_dir.display()))?;

    let path = backup_dir.join(format!("{}_{}.json", message_id, unix_ms));
    let content = serde_json::to_string_pretty(&exported)?;
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("Unable to write backup {}", path.display()))?;

    Ok(path)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

pub fn cleanup_report(results: &[(Message, GarbageAnalysis)], dry_run: bool) -> String {
    let marked: Vec<_> = results.iter().filter(|(_, a)| a.is_deletable()).collect();
    let review: Vec<_> = results
        .iter()
        .filter(|(_, a)| a.is_garbage && a.recommendation == Recommendation::Review)
        .collect();
    let protected: Vec<_> = results.iter().filter(|(_, a)| a.is_protected()).collect();

    let mut report = String::from("🗑️ GARBAGE EMAIL CLEANUP REPORT\n");
    report.push_str(&"=".repeat(50));
    report.push_str("\n\n");

    report.push_str("📊 Summary:\n");
    report.push_str(&format!("- Total emails analyzed: {}\n", results.len()));
    report.push_str(&format!("- Marked for deletion: {}\n", marked.len()));
    report.push_str(&format!("- Needs manual review: {}\n", review.len()));
    report.push_str(&format!("- Protected as important: {}\n", protected.len()));
    report.push_str(&format!("- Dry run mode: {}\n\n", if dry_run { "YES" } else { "NO" }));

    if !marked.is_empty() {
        report.push_str("🗑️ Emails marked for deletion:\n");
        for (i, (message, analysis)) in marked.iter().enumerate() {
            report.push_str(&format!("{}. Subject: {}...\n", i + 1, truncate(&message.subject, 50)));
            report.push_str(&format!("   From: {}\n", message.from));
            report.push_str(&format!("   Confidence: {}%\n", analysis.confidence));
            report.push_str(&format!("   Reasons: {}\n\n", analysis.reasons.join(", ")));
        }
    }

    if !review.is_empty() {
        report.push_str("🔍 Suspected garbage kept for manual review:\n");
        for (i, (message, analysis)) in review.iter().enumerate() {
            report.push_str(&format!(
                "{}. {}... ({}%)\n",
                i + 1,
                truncate(&message.subject, 50),
                analysis.confidence
            ));
        }
        report.push('\n');
    }

    if !protected.is_empty() {
        report.push_str("🛡️ Important emails protected:\n");
        for (i, (message, _)) in protected.iter().take(PROTECTED_IN_REPORT).enumerate() {
            report.push_str(&format!("{}. {}...\n", i + 1, truncate(&message.subject, 60)));
        }
        if protected.len() > PROTECTED_IN_REPORT {
            report.push_str(&format!("... and {} more\n", protected.len() - PROTECTED_IN_REPORT));
        }
    }

    report
}
