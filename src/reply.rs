use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::classifier::{Category, Priority};
use crate::email::{MailboxProvider, Message};
use crate::model::{GenerationParams, TextModel};
use crate::rate_limiter::RateGovernor;

const AUTOMATED_SENDERS: &[&str] = &[
    "noreply", "no-reply", "donotreply", "do-not-reply", "automated", "system", "support@",
    "admin@", "notifications@", "updates@", "news@", "amazon.com", "paypal.com", "google.com",
    "facebook.com", "twitter.com", "linkedin.com", "github.com", "stackoverflow.com",
];

const NO_REPLY_SUBJECTS: &[&str] = &[
    "confirmation", "receipt", "order", "shipped", "delivered", "newsletter", "digest", "update",
    "notification", "password", "reset", "verify", "activated", "welcome", "thank you for",
    "subscription",
];

const REPLY_BODY_CHARS: usize = 800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDecision {
    pub needs_reply: bool,
    pub reason: String,
    pub confidence: u8,
}

impl ReplyDecision {
    fn new(needs_reply: bool, reason: impl Into<String>, confidence: u8) -> Self {
        ReplyDecision {
            needs_reply,
            reason: reason.into(),
            confidence,
        }
    }
}

/// Whether a message deserves a human reply, from sender, subject and
/// classification alone.
pub fn should_reply(message: &Message, category: Category, priority: Priority) -> ReplyDecision {
    let sender = message.from.to_lowercase();
    let subject = message.subject.to_lowercase();

    if AUTOMATED_SENDERS.iter().any(|s| sender.contains(s)) {
        return ReplyDecision::new(false, "Automated sender - no reply needed", 95);
    }

    if NO_REPLY_SUBJECTS.iter().any(|s| subject.contains(s)) {
        return ReplyDecision::new(false, "Automated notification - no reply needed", 90);
    }

    if matches!(
        category,
        Category::Promotional | Category::Newsletter | Category::Updates | Category::Spam
    ) {
        return ReplyDecision::new(
            false,
            format!("Category '{}' typically doesn't require replies", category),
            85,
        );
    }

    if category == Category::Important || priority == Priority::High {
        return ReplyDecision::new(true, "Important email likely requires response", 85);
    }

    ReplyDecision::new(true, "Email may require response - creating draft", 70)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftResult {
    pub should_create_draft: bool,
    pub draft_body: Option<String>,
    pub reason: String,
    pub confidence: u8,
}

/// What to do with a composed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Draft,
    Send,
    /// Compose only; nothing is written to the mailbox.
    DryRun,
}

pub fn reply_subject(subject: &str) -> String {
    let prefix = subject.trim_start().get(..3);
    if prefix.is_some_and(|p| p.eq_ignore_ascii_case("re:")) {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

/// Build the RFC 822 reply document, threaded onto `message`.
pub fn compose_reply(message: &Message, body: &str) -> Vec<u8> {
    let mut lines = vec![
        format!("To: {}", message.from),
        format!("Subject: {}", reply_subject(&message.subject)),
    ];

    if let Some(message_id) = &message.message_id {
        lines.push(format!("In-Reply-To: {}", message_id));
        lines.push(format!("References: {}", message_id));
    }

    lines.push("Content-Type: text/plain; charset=UTF-8".to_string());
    lines.push(String::new());
    lines.push(body.replace("\r\n", "\n").replace('\n', "\r\n"));

    lines.join("\r\n").into_bytes()
}

/// Writes reply bodies: a fixed acknowledgment, or model text when enabled.
pub struct DraftGenerator {
    model: Arc<dyn TextModel>,
    sender_name: String,
    use_ai_drafts: bool,
}

impl DraftGenerator {
    pub fn new(model: Arc<dyn TextModel>, sender_name: impl Into<String>, use_ai_drafts: bool) -> Self {
        DraftGenerator {
            model,
            sender_name: sender_name.into(),
            use_ai_drafts,
        }
    }

    pub fn set_use_ai_drafts(&mut self, enabled: bool) {
        self.use_ai_drafts = enabled;
    }

    pub fn template(&self, message: &Message) -> String {
        format!(
            "Thank you for your email regarding \"{}\".\n\n\
             I appreciate you reaching out and will review this carefully. \
             I'll get back to you with a proper response shortly.\n\n\
             Best regards,\n{}",
            message.subject, self.sender_name
        )
    }

    /// Reply body for `message`; `None` when there is no one to reply to.
    pub async fn generate_draft(
        &self,
        governor: &mut RateGovernor,
        message: &Message,
        category: Category,
        priority: Priority,
    ) -> Option<String> {
        if message.from.trim().is_empty() {
            return None;
        }

        if self.use_ai_drafts {
            if governor.should_skip_non_essential() {
                info!("⏭️  Quota is low, using the template reply");
            } else if let Some(body) = self.ai_draft(governor, message, category, priority).await {
                return Some(body);
            }
        }

        Some(self.template(message))
    }

    async fn ai_draft(
        &self,
        governor: &mut RateGovernor,
        message: &Message,
        category: Category,
        priority: Priority,
    ) -> Option<String> {
        if let Err(e) = governor.wait_if_needed().await {
            warn!("⚠️ {} - using the template reply", e);
            return None;
        }

        let excerpt: String = message.body.chars().take(REPLY_BODY_CHARS).collect();
        let prompt = format!(
            "Create a professional, contextual reply draft for this email:\n\n\
             FROM: {}\nSUBJECT: {}\nCONTENT: {}\nCATEGORY: {}\nPRIORITY: {}\n\n\
             Create a response that:\n\
             1. Acknowledges their message appropriately\n\
             2. Is professional but warm in tone\n\
             3. Addresses any questions or requests mentioned\n\
             4. Is concise (2-4 sentences max)\n\
             5. Ends with appropriate next steps or closing\n\n\
             Do not include email headers, a salutation or a signature.\n\
             Just provide the main body content of the reply.",
            message.from, message.subject, excerpt, category, priority
        );

        let response = self.model.generate(&prompt, &GenerationParams::REPLY).await;
        governor.record(response.is_ok());

        match response {
            Ok(text) if !text.trim().is_empty() => Some(format!(
                "Hi {},\n\n{}\n\nBest regards,\n{}",
                message.sender_name(),
                text.trim(),
                self.sender_name
            )),
            Ok(_) => {
                warn!("⚠️ Empty draft from model, using the template reply");
                None
            }
            Err(e) => {
                warn!("❌ Error generating draft content: {}", e);
                None
            }
        }
    }

    /// Decide, compose and deliver a reply. Never fails; problems are
    /// reported in the result.
    pub async fn create_smart_draft(
        &self,
        mailbox: &dyn MailboxProvider,
        governor: &mut RateGovernor,
        message: &Message,
        category: Category,
        priority: Priority,
        delivery: Delivery,
    ) -> DraftResult {
        let decision = should_reply(message, category, priority);
        if !decision.needs_reply {
            return DraftResult {
                should_create_draft: false,
                draft_body: None,
                reason: decision.reason,
                confidence: decision.confidence,
            };
        }

        debug!("🤖 Generating smart draft content...");
        let Some(body) = self.generate_draft(governor, message, category, priority).await else {
            return DraftResult {
                should_create_draft: false,
                draft_body: None,
                reason: "Failed to generate appropriate draft content".to_string(),
                confidence: 50,
            };
        };

        let raw = compose_reply(message, &body);
        let delivered = match delivery {
            Delivery::DryRun => {
                println!("   📝 [DRY RUN] Would create reply: {}", reply_subject(&message.subject));
                Ok(())
            }
            Delivery::Draft => mailbox.create_draft(&raw, &message.thread_id).await.map(|draft_id| {
                info!("✅ Smart draft created: {} (draft {})", reply_subject(&message.subject), draft_id);
            }),
            Delivery::Send => mailbox.send_message(&raw, &message.thread_id).await.map(|()| {
                info!("📤 Reply sent: {}", reply_subject(&message.subject));
            }),
        };

        match delivered {
            Ok(()) => DraftResult {
                should_create_draft: true,
                draft_body: Some(body),
                reason: "Created smart draft for email requiring response".to_string(),
                confidence: decision.confidence,
            },
            Err(e) => {
                warn!("❌ Error creating draft for {}: {:#}", message.id, e);
                DraftResult {
                    should_create_draft: false,
                    draft_body: None,
                    reason: format!("Error occurred while creating draft: {:#}", e),
                    confidence: 0,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryDraftStats {
    pub processed: u32,
    pub drafts_created: u32,
}

/// Draft outcomes for one cycle, overall and per category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftStats {
    pub total_processed: u32,
    pub drafts_created: u32,
    pub drafts_skipped: u32,
    pub categories: BTreeMap<Category, CategoryDraftStats>,
}

impl DraftStats {
    pub fn record(&mut self, category: Category, created: bool) {
        self.total_processed += 1;
        let entry = self.categories.entry(category).or_default();
        entry.processed += 1;

        if created {
            self.drafts_created += 1;
            entry.drafts_created += 1;
        } else {
            self.drafts_skipped += 1;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        f64::from(self.drafts_created) / f64::from(self.total_processed) * 100.0
    }

    pub fn print(&self) {
        if self.total_processed == 0 {
            return;
        }

        println!("\n📊 Smart Draft Statistics:");
        println!("   Total emails processed: {}", self.total_processed);
        println!("   Drafts created: {}", self.drafts_created);
        println!("   Drafts skipped: {}", self.drafts_skipped);
        println!("   Success rate: {:.1}%", self.success_rate());

        if !self.categories.is_empty() {
            println!("   By category:");
            for (category, stats) in &self.categories {
                let rate = f64::from(stats.drafts_created) / f64::from(stats.processed.max(1)) * 100.0;
                println!("     {}: {}/{} ({:.1}%)", category, stats.drafts_created, stats.processed, rate);
            }
        }
    }
}
