use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::email::Message;
use crate::model::{extract_json, GenerationParams, TextModel};
use crate::rate_limiter::RateGovernor;
use crate::settings::GarbageCleanupSettings;

/// Keyword families that mark a message as worth keeping.
const IMPORTANT_PATTERNS: &[(&str, &[&str])] = &[
    (
        "work_business",
        &[
            "meeting", "deadline", "project", "urgent", "important", "invoice", "receipt",
            "confirmation", "appointment", "contract", "proposal", "report", "presentation",
            "client", "customer", "vendor", "supplier",
        ],
    ),
    (
        "financial",
        &[
            "bank", "payment", "transaction", "statement", "bill", "invoice", "receipt", "tax",
            "financial", "account", "balance", "credit", "debit", "transfer", "subscription",
            "renewal",
        ],
    ),
    (
        "personal",
        &[
            "family", "friend", "personal", "birthday", "anniversary", "wedding", "graduation",
            "celebration", "invitation",
        ],
    ),
    (
        "security_system",
        &[
            "password reset", "security alert", "account verification", "two-factor", "2fa",
            "login attempt", "suspicious activity", "verification code", "activation",
            "confirmation code",
        ],
    ),
    (
        "health_legal",
        &[
            "doctor", "appointment", "medical", "health", "prescription", "legal", "court",
            "attorney", "lawyer", "insurance",
        ],
    ),
];

const TRUSTED_SENDER_DOMAINS: &[&str] = &[
    "bank", "paypal", "amazon", "google", "microsoft", "apple", "government", "irs", "official",
    "support", "security", "stripe", "visa", "mastercard", "amex", "discover",
];

const OBVIOUS_SPAM_PATTERNS: &[&str] = &[
    "viagra",
    "cialis",
    "lottery winner",
    "congratulations you have won",
    "nigerian prince",
    "inheritance claim",
    "tax refund pending",
    "click here to claim",
    "you are the winner",
    "claim your prize now",
    "free money",
    "make money fast",
    "work from home scam",
];

const DISPOSABLE_DOMAINS: &[&str] = &[
    "tempmail",
    "guerrillamail",
    "10minutemail",
    "mailinator",
    "throwaway",
    "temp-mail",
    "discard.email",
];

const OLD_PROMO_PATTERNS: &[&str] = &["unsubscribe", "promotional", "marketing email"];

const SPAM_PHRASES_SCORE: u32 = 25;
const DISPOSABLE_DOMAIN_SCORE: u32 = 30;
const OLD_PROMO_SCORE: u32 = 20;
const NEAR_EMPTY_SCORE: u32 = 25;

/// Pattern confidence at which a second opinion from the model is requested.
const AI_CONFIRM_THRESHOLD: u8 = 70;

const AI_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GarbageCategory {
    ObviousSpam,
    PromotionalOld,
    SuspiciousDomain,
    Important,
    Safe,
}

impl GarbageCategory {
    fn from_model(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("promotional_old") => GarbageCategory::PromotionalOld,
            Some("suspicious_domain") => GarbageCategory::SuspiciousDomain,
            Some("important") => GarbageCategory::Important,
            Some("safe") => GarbageCategory::Safe,
            _ => GarbageCategory::ObviousSpam,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Delete,
    Keep,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyCheck {
    Passed,
    FailedImportantDetected,
    FailedBusinessDetected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GarbageAnalysis {
    pub is_garbage: bool,
    pub confidence: u8,
    pub reasons: Vec<String>,
    pub category: GarbageCategory,
    pub recommendation: Recommendation,
    pub safety_check: SafetyCheck,
}

impl GarbageAnalysis {
    fn keep(reason: impl Into<String>, safety_check: SafetyCheck) -> Self {
        GarbageAnalysis {
            is_garbage: false,
            confidence: 0,
            reasons: vec![reason.into()],
            category: if safety_check == SafetyCheck::Passed {
                GarbageCategory::Safe
            } else {
                GarbageCategory::Important
            },
            recommendation: Recommendation::Keep,
            safety_check,
        }
    }

    /// Only a message that passed every safety gate may be trashed.
    pub fn is_deletable(&self) -> bool {
        self.is_garbage
            && self.recommendation == Recommendation::Delete
            && self.safety_check == SafetyCheck::Passed
    }

    pub fn is_protected(&self) -> bool {
        self.safety_check != SafetyCheck::Passed
    }
}

/// Importance allow-list match: the family name and the matching keyword.
pub fn importance_match(subject: &str, sender: &str, body: &str) -> Option<(&'static str, &'static str)> {
    let subject = subject.to_lowercase();
    let sender = sender.to_lowercase();
    let body = body.to_lowercase();

    for &(family, patterns) in IMPORTANT_PATTERNS {
        for &pattern in patterns {
            if subject.contains(pattern) || sender.contains(pattern) || body.contains(pattern) {
                return Some((family, pattern));
            }
        }
    }

    TRUSTED_SENDER_DOMAINS
        .iter()
        .find(|domain| sender.contains(*domain))
        .map(|domain| ("trusted_domain", *domain))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGarbageReview {
    #[serde(default)]
    is_garbage: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasons: Vec<String>,
    category: Option<String>,
    #[serde(default)]
    recommendation: String,
    safety_override: Option<String>,
}

/// Two-layer garbage check: keyword scoring, then model confirmation.
pub struct GarbageDetector {
    model: Arc<dyn TextModel>,
    clock: Arc<dyn Clock>,
    settings: GarbageCleanupSettings,
}

impl GarbageDetector {
    pub fn new(model: Arc<dyn TextModel>, clock: Arc<dyn Clock>, settings: GarbageCleanupSettings) -> Self {
        GarbageDetector { model, clock, settings }
    }

    pub fn settings(&self) -> &GarbageCleanupSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Keyword layer. Pure given the current time.
    pub fn pattern_analysis(&self, message: &Message, now: DateTime<Utc>) -> GarbageAnalysis {
        if let Some((family, pattern)) = importance_match(&message.subject, &message.from, &message.body) {
            info!("🛡️ Email marked as IMPORTANT ({}): {}", family, pattern);
            return GarbageAnalysis::keep("Detected as important email", SafetyCheck::FailedImportantDetected);
        }

        let subject = message.subject.to_lowercase();
        let sender = message.from.to_lowercase();
        let body = message.body.to_lowercase();

        let mut score = 0u32;
        let mut reasons = Vec::new();
        let mut category = GarbageCategory::Safe;

        let spam_count = OBVIOUS_SPAM_PATTERNS
            .iter()
            .filter(|pattern| subject.contains(*pattern) || body.contains(*pattern))
            .count();
        if spam_count >= 2 {
            score += SPAM_PHRASES_SCORE;
            reasons.push(format!("Multiple obvious spam patterns detected ({})", spam_count));
            category = GarbageCategory::ObviousSpam;
        }

        if DISPOSABLE_DOMAINS.iter().any(|domain| sender.contains(domain)) {
            score += DISPOSABLE_DOMAIN_SCORE;
            reasons.push("Suspicious temporary email domain".to_string());
            if category == GarbageCategory::Safe {
                category = GarbageCategory::SuspiciousDomain;
            }
        }

        let age_days = (now - message.date).num_days();
        if age_days > self.settings.only_delete_older_than_days
            && OLD_PROMO_PATTERNS.iter().any(|pattern| body.contains(pattern))
            && message.body.trim().chars().count() < 200
        {
            score += OLD_PROMO_SCORE;
            reasons.push(format!("Old promotional email ({} days) with minimal content", age_days));
            if category == GarbageCategory::Safe {
                category = GarbageCategory::PromotionalOld;
            }
        }

        if message.body.trim().chars().count() < 10 && message.subject.trim().chars().count() < 5 {
            score += NEAR_EMPTY_SCORE;
            reasons.push("Extremely short/empty email".to_string());
        }

        let required_reasons = if self.settings.require_multiple_indicators { 2 } else { 1 };
        let is_garbage = score >= self.settings.confidence_threshold && reasons.len() >= required_reasons;

        debug!("Pattern score {} with {} reason(s) for {}", score, reasons.len(), message.id);

        GarbageAnalysis {
            is_garbage,
            confidence: score.min(100) as u8,
            reasons,
            category: if is_garbage {
                if category == GarbageCategory::Safe {
                    GarbageCategory::ObviousSpam
                } else {
                    category
                }
            } else {
                GarbageCategory::Safe
            },
            recommendation: if is_garbage {
                Recommendation::Delete
            } else {
                Recommendation::Keep
            },
            safety_check: SafetyCheck::Passed,
        }
    }

    /// Full analysis. A message is garbage only when both layers agree.
    pub async fn analyze(&self, governor: &mut RateGovernor, message: &Message) -> GarbageAnalysis {
        let pattern = self.pattern_analysis(message, self.clock.now().with_timezone(&Utc));

        if pattern.is_protected() || !pattern.is_garbage {
            return pattern;
        }

        if pattern.confidence < AI_CONFIRM_THRESHOLD {
            // Not strong enough to ask for confirmation; never deleted on patterns alone
            return GarbageAnalysis {
                recommendation: Recommendation::Review,
                ..pattern
            };
        }

        let review = self.ai_review(governor, message).await;
        if review.is_protected() {
            return review;
        }

        if review.is_garbage && review.recommendation == Recommendation::Delete {
            let mut reasons = pattern.reasons.clone();
            for reason in review.reasons {
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }

            return GarbageAnalysis {
                is_garbage: true,
                confidence: pattern.confidence.max(review.confidence),
                reasons,
                category: review.category,
                recommendation: Recommendation::Delete,
                safety_check: SafetyCheck::Passed,
            };
        }

        let mut reasons = pattern.reasons;
        reasons.push("AI review did not confirm garbage".to_string());
        GarbageAnalysis {
            is_garbage: false,
            confidence: pattern.confidence,
            reasons,
            category: GarbageCategory::Safe,
            recommendation: Recommendation::Keep,
            safety_check: SafetyCheck::Passed,
        }
    }

    async fn ai_review(&self, governor: &mut RateGovernor, message: &Message) -> GarbageAnalysis {
        if let Err(e) = governor.wait_if_needed().await {
            warn!("⚠️ {} - keeping {}", e, message.id);
            return GarbageAnalysis::keep(
                "AI analysis unavailable - defaulting to keep for safety",
                SafetyCheck::FailedImportantDetected,
            );
        }

        let prompt = build_review_prompt(message);
        let response = self.model.generate(&prompt, &GenerationParams::SAFETY_REVIEW).await;
        governor.record(response.is_ok());

        let parsed = response
            .map_err(|e| e.to_string())
            .and_then(|text| {
                let json = extract_json(&text).ok_or_else(|| "no JSON object in response".to_string())?;
                serde_json::from_str::<RawGarbageReview>(json).map_err(|e| e.to_string())
            });

        let review = match parsed {
            Ok(review) => review,
            Err(e) => {
                warn!("❌ AI garbage analysis failed for {}: {}", message.id, e);
                return GarbageAnalysis::keep(
                    "AI analysis failed - defaulting to keep for safety",
                    SafetyCheck::FailedImportantDetected,
                );
            }
        };

        let safety_check = match review.safety_override.as_deref().map(str::trim) {
            Some("none") => SafetyCheck::Passed,
            Some("business_detected") => SafetyCheck::FailedBusinessDetected,
            _ => SafetyCheck::FailedImportantDetected,
        };

        if safety_check != SafetyCheck::Passed {
            info!("🛡️ AI safety override for {}: {:?}", message.id, safety_check);
            let mut reasons = review.reasons;
            reasons.push("AI safety override triggered".to_string());
            return GarbageAnalysis {
                is_garbage: false,
                confidence: clamp_confidence(review.confidence),
                reasons,
                category: GarbageCategory::Important,
                recommendation: Recommendation::Keep,
                safety_check,
            };
        }

        let recommendation = if review.recommendation.eq_ignore_ascii_case("delete") {
            Recommendation::Delete
        } else {
            Recommendation::Keep
        };

        GarbageAnalysis {
            is_garbage: review.is_garbage,
            confidence: clamp_confidence(review.confidence),
            reasons: review.reasons,
            category: GarbageCategory::from_model(review.category.as_deref()),
            recommendation,
            safety_check,
        }
    }
}

fn clamp_confidence(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 100.0).round() as u8
}

fn build_review_prompt(message: &Message) -> String {
    let excerpt: String = message.body.chars().take(AI_BODY_CHARS).collect();

    format!(
        r#"CRITICAL SAFETY INSTRUCTION: You are analyzing an email for potential deletion. Be EXTREMELY CONSERVATIVE.
When in doubt, ALWAYS recommend KEEP. Only recommend deletion for obvious spam/garbage.

NEVER recommend deletion if the email contains:
- Work/business communications (meetings, deadlines, projects)
- Financial information (invoices, receipts, payments, banking)
- Personal communications from real people
- System notifications (password resets, security alerts, verifications)
- Appointment confirmations or important dates
- Educational content or courses
- Legal or government communications

Only consider for deletion if it's clearly:
- Obvious spam (viagra, lottery scams, inheritance scams)
- Completely empty or meaningless emails
- Emails from known temporary/fake domains
- Very old promotional emails with zero value

Email to analyze:
Subject: {subject}
From: {from}
Body (first {chars} chars): {excerpt}

Respond in JSON format:
{{
  "isGarbage": boolean,
  "confidence": number (0-100),
  "reasons": ["specific reason"],
  "category": "obvious_spam" | "promotional_old" | "suspicious_domain" | "important" | "safe",
  "recommendation": "delete" | "keep",
  "safetyOverride": "none" | "important_detected" | "business_detected"
}}"#,
        subject = message.subject,
        from = message.from,
        chars = AI_BODY_CHARS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::ModelError;
    use async_trait::async_trait;
    use chrono::{Duration, Local, TimeZone};

    struct NeverCalled;

    #[async_trait]
    impl TextModel for NeverCalled {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String, ModelError> {
            panic!("model must not be called");
        }

        fn model_name(&self) -> &str {
            "never"
        }
    }

    fn detector(settings: GarbageCleanupSettings) -> GarbageDetector {
        let clock = Arc::new(ManualClock::new(Local.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()));
        GarbageDetector::new(Arc::new(NeverCalled), clock, settings)
    }

    fn message(from: &str, subject: &str, body: &str, age_days: i64) -> Message {
        Message {
            id: "g1".to_string(),
            thread_id: "t1".to_string(),
            message_id: None,
            from: from.to_string(),
            to: "me@example.com".to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            date: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_importance_families_and_domains() {
        assert_eq!(
            importance_match("Quarterly report", "a@b.com", ""),
            Some(("work_business", "report"))
        );
        assert_eq!(
            importance_match("Hi", "alerts@paypal.com", ""),
            Some(("trusted_domain", "paypal"))
        );
        assert_eq!(importance_match("Hi", "x@y.com", "nothing here"), None);
    }

    #[test]
    fn test_important_message_is_vetoed() {
        let detector = detector(GarbageCleanupSettings::default());
        let analysis = detector.pattern_analysis(
            &message("x@tempmail.com", "Your invoice", "free money viagra", 90),
            Utc::now(),
        );

        assert!(!analysis.is_garbage);
        assert_eq!(analysis.safety_check, SafetyCheck::FailedImportantDetected);
        assert_eq!(analysis.recommendation, Recommendation::Keep);
    }

    #[test]
    fn test_scores_add_up() {
        let detector = detector(GarbageCleanupSettings {
            confidence_threshold: 70,
            ..GarbageCleanupSettings::default()
        });
        let analysis = detector.pattern_analysis(
            &message("promo@tempmail.com", "Free money", "free money and viagra, unsubscribe", 90),
            Utc::now(),
        );

        assert_eq!(analysis.confidence, 75);
        assert_eq!(analysis.reasons.len(), 3);
        assert!(analysis.is_garbage);
        assert_eq!(analysis.recommendation, Recommendation::Delete);
    }

    #[test]
    fn test_single_reason_never_garbage_with_multiple_required() {
        let detector = detector(GarbageCleanupSettings {
            confidence_threshold: 10,
            require_multiple_indicators: true,
            ..GarbageCleanupSettings::default()
        });
        let analysis = detector.pattern_analysis(&message("a@tempmail.com", "Hello there", "see attached", 1), Utc::now());

        assert_eq!(analysis.reasons.len(), 1);
        assert!(!analysis.is_garbage);

        let lenient = super::GarbageDetector::new(
            Arc::new(NeverCalled),
            detector.clock().clone(),
            GarbageCleanupSettings {
                confidence_threshold: 10,
                require_multiple_indicators: false,
                ..GarbageCleanupSettings::default()
            },
        );
        assert!(lenient.pattern_analysis(&message("a@tempmail.com", "Hello there", "see attached", 1), Utc::now()).is_garbage);
    }

    #[test]
    fn test_recent_promo_not_scored() {
        let detector = detector(GarbageCleanupSettings::default());
        let analysis = detector.pattern_analysis(&message("shop@x.com", "Spring", "unsubscribe here", 3), Utc::now());
        assert!(analysis.reasons.is_empty());
        assert_eq!(analysis.category, GarbageCategory::Safe);
    }

    #[tokio::test]
    async fn test_low_confidence_garbage_goes_to_review_without_model() {
        let detector = detector(GarbageCleanupSettings {
            confidence_threshold: 50,
            require_multiple_indicators: true,
            ..GarbageCleanupSettings::default()
        });
        let clock = detector.clock().clone();
        let mut governor = RateGovernor::per_minute(clock, 15, 1500);

        // disposable domain (30) + near empty (25) = 55
        let analysis = detector.analyze(&mut governor, &message("x@mailinator.com", "hey", "", 1)).await;

        assert!(analysis.is_garbage);
        assert_eq!(analysis.confidence, 55);
        assert_eq!(analysis.recommendation, Recommendation::Review);
        assert!(!analysis.is_deletable());
    }
}
