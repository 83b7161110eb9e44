use chrono::{DateTime, Local, NaiveDate};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::model::{extract_json, GenerationParams, ModelError, TextModel};
use crate::rate_limiter::{QuotaExhausted, RateGovernor};
use crate::settings::AiAnalysisSettings;

/// Number of body characters embedded in the classification prompt.
const PROMPT_BODY_CHARS: usize = 800;

const FALLBACK_CONFIDENCE: u8 = 30;
const QUOTA_SKIP_CONFIDENCE: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Important,
    Promotional,
    Social,
    Updates,
    Spam,
    Newsletter,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Important,
        Category::Promotional,
        Category::Social,
        Category::Updates,
        Category::Spam,
        Category::Newsletter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Important => "Important",
            Category::Promotional => "Promotional",
            Category::Social => "Social",
            Category::Updates => "Updates",
            Category::Spam => "Spam",
            Category::Newsletter => "Newsletter",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ClassificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ClassificationError::UnknownCategory(wanted.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        })
    }
}

impl FromStr for Priority {
    type Err = ClassificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(ClassificationError::UnknownPriority(other.to_string())),
        }
    }
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    Model,
    /// Every attempt failed; keyword heuristics were used.
    Fallback,
    /// The classifier's own daily cap was reached; no call was made.
    QuotaSkipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub category: Category,
    pub priority: Priority,
    pub needs_reply: bool,
    /// Always within 0..=100.
    pub confidence: u8,
    pub rationale: String,
    pub suggested_actions: Vec<String>,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    fn clamp_confidence(value: f64) -> u8 {
        if value.is_nan() {
            return 0;
        }
        value.clamp(0.0, 100.0).round() as u8
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("no JSON object in model output: {0}")]
    NotJson(String),
    #[error("invalid JSON in model output: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("missing or empty field '{0}'")]
    MissingField(&'static str),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("unknown priority '{0}'")]
    UnknownPriority(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Quota(#[from] QuotaExhausted),
}

impl ClassificationError {
    fn is_rate_limit(&self) -> bool {
        match self {
            ClassificationError::Model(e) => e.is_rate_limit(),
            ClassificationError::Quota(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClassification {
    category: Option<String>,
    priority: Option<String>,
    #[serde(default)]
    needs_reply: Option<bool>,
    #[serde(default)]
    confidence: Option<RawConfidence>,
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    suggested_actions: Option<Vec<String>>,
}

/// Models answer `90`, `90.5` or `"90"` interchangeably.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawConfidence {
    Number(f64),
    Text(String),
}

impl RawConfidence {
    fn value(&self) -> Option<f64> {
        match self {
            RawConfidence::Number(n) => Some(*n),
            RawConfidence::Text(t) => t.trim().trim_end_matches('%').trim().parse().ok(),
        }
    }
}

/// Parse a model response into a classification.
///
/// Text around the JSON object is ignored. A missing or empty category or
/// priority, or a category outside the closed set, is an error.
pub fn parse_classification(response: &str) -> Result<ClassificationResult, ClassificationError> {
    let json = extract_json(response)
        .ok_or_else(|| ClassificationError::NotJson(response.chars().take(100).collect()))?;
    let raw: RawClassification = serde_json::from_str(json)?;

    let category = raw
        .category
        .filter(|c| !c.trim().is_empty())
        .ok_or(ClassificationError::MissingField("category"))?
        .parse::<Category>()?;
    let priority = raw
        .priority
        .filter(|p| !p.trim().is_empty())
        .ok_or(ClassificationError::MissingField("priority"))?
        .parse::<Priority>()?;

    Ok(ClassificationResult {
        category,
        priority,
        needs_reply: raw.needs_reply.unwrap_or(false),
        confidence: ClassificationResult::clamp_confidence(
            raw.confidence.as_ref().and_then(RawConfidence::value).unwrap_or(50.0),
        ),
        rationale: raw.analysis.unwrap_or_default(),
        suggested_actions: raw.suggested_actions.unwrap_or_default(),
        source: ClassificationSource::Model,
    })
}

pub fn build_prompt(body: &str, from: &str, subject: &str) -> String {
    let excerpt: String = body.chars().take(PROMPT_BODY_CHARS).collect();

    format!(
        r#"Analyze this email quickly. Return JSON only.

FROM: {from}
SUBJECT: {subject}
CONTENT: {excerpt}

Categories: Important, Promotional, Social, Updates, Newsletter, Spam
Priority: High, Medium, Low
NeedsReply: true ONLY for personal messages requiring responses

Reply Rules:
- TRUE: Job offers, business inquiries, personal messages, meeting requests
- FALSE: Newsletters, promotions, notifications, automated emails

JSON format:
{{
  "category": "category",
  "priority": "priority",
  "needsReply": false,
  "confidence": 90,
  "analysis": "brief reason",
  "suggestedActions": ["action"]
}}"#
    )
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

pub fn fallback_priority(from: &str, subject: &str) -> Priority {
    let from = from.to_lowercase();
    let subject = subject.to_lowercase();

    if contains_any(&subject, &["urgent", "important", "interview", "job"]) {
        return Priority::High;
    }
    if contains_any(&from, &["noreply", "no-reply"]) || contains_any(&subject, &["newsletter", "unsubscribe"]) {
        return Priority::Low;
    }
    Priority::Medium
}

pub fn fallback_needs_reply(from: &str, subject: &str) -> bool {
    let from = from.to_lowercase();
    let subject = subject.to_lowercase();

    if contains_any(&from, &["noreply", "no-reply", "automated", "system"])
        || contains_any(&subject, &["newsletter", "unsubscribe"])
    {
        return false;
    }

    contains_any(&subject, &["interview", "job", "opportunity", "meeting"])
}

/// Classifies messages with the remote model, falling back to keyword
/// heuristics whenever the model cannot produce a usable answer.
pub struct AiClassifier {
    model: Arc<dyn TextModel>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    min_call_spacing: Duration,
    daily_cap: u32,
    daily_calls: u32,
    last_reset: NaiveDate,
    last_call: Option<DateTime<Local>>,
}

impl AiClassifier {
    pub fn new(model: Arc<dyn TextModel>, clock: Arc<dyn Clock>, settings: &AiAnalysisSettings) -> Self {
        let last_reset = clock.now().date_naive();
        AiClassifier {
            model,
            clock,
            max_attempts: settings.max_attempts.max(1),
            min_call_spacing: Duration::from_millis(settings.min_call_spacing_ms),
            daily_cap: settings.daily_call_cap,
            daily_calls: 0,
            last_reset,
            last_call: None,
        }
    }

    pub fn apply_settings(&mut self, settings: &AiAnalysisSettings) {
        self.max_attempts = settings.max_attempts.max(1);
        self.min_call_spacing = Duration::from_millis(settings.min_call_spacing_ms);
        self.daily_cap = settings.daily_call_cap;
    }

    pub fn daily_calls(&self) -> u32 {
        self.daily_calls
    }

    /// Classify one message. Never fails: errors end in a fallback result.
    pub async fn classify(
        &mut self,
        governor: &mut RateGovernor,
        body: &str,
        from: &str,
        to: &str,
        subject: &str,
    ) -> ClassificationResult {
        self.reset_daily_if_needed();

        if self.daily_calls >= self.daily_cap {
            warn!("⚠️ Skipping AI analysis to preserve quota ({} calls today)", self.daily_calls);
            return ClassificationResult {
                category: Category::Updates,
                priority: Priority::Medium,
                needs_reply: false,
                confidence: QUOTA_SKIP_CONFIDENCE,
                rationale: "Analysis skipped to preserve daily quota".to_string(),
                suggested_actions: vec!["Mark as read".to_string()],
                source: ClassificationSource::QuotaSkipped,
            };
        }

        debug!("Classifying message for {} from {}", to, from);
        let prompt = build_prompt(body, from, subject);
        let mut last_error: Option<ClassificationError> = None;

        for attempt in 1..=self.max_attempts {
            match self.attempt(governor, &prompt).await {
                Ok(result) => {
                    info!(
                        "✅ Email categorized: {} ({} priority, {}% confidence)",
                        result.category, result.priority, result.confidence
                    );
                    return result;
                }
                Err(ClassificationError::Quota(e)) => {
                    warn!("⚠️ {} - using fallback classification", e);
                    last_error = Some(ClassificationError::Quota(e));
                    break;
                }
                Err(e) => {
                    warn!("❌ Attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    let pause = if e.is_rate_limit() {
                        Duration::from_secs(u64::from(attempt) * 2)
                    } else {
                        Duration::from_secs(1)
                    };
                    last_error = Some(e);

                    if attempt < self.max_attempts {
                        info!("⏳ Retrying in {}s...", pause.as_secs());
                        self.clock.sleep(pause).await;
                    }
                }
            }
        }

        warn!("⚠️ AI analysis failed after {} attempt(s), using fallback", self.max_attempts);
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());

        ClassificationResult {
            category: Category::Updates,
            priority: fallback_priority(from, subject),
            needs_reply: fallback_needs_reply(from, subject),
            confidence: FALLBACK_CONFIDENCE,
            rationale: format!("Fallback analysis due to API error: {}", reason),
            suggested_actions: vec!["Review manually".to_string()],
            source: ClassificationSource::Fallback,
        }
    }

    async fn attempt(
        &mut self,
        governor: &mut RateGovernor,
        prompt: &str,
    ) -> Result<ClassificationResult, ClassificationError> {
        self.respect_spacing().await;
        governor.wait_if_needed().await?;

        debug!("🤖 {} analysis...", self.model.model_name());
        let response = self.model.generate(prompt, &GenerationParams::CLASSIFICATION).await;

        self.last_call = Some(self.clock.now());
        self.daily_calls += 1;
        governor.record(response.is_ok());

        parse_classification(&response?)
    }

    async fn respect_spacing(&self) {
        let Some(last_call) = self.last_call else {
            return;
        };

        let elapsed = (self.clock.now() - last_call).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.min_call_spacing {
            let wait = self.min_call_spacing - elapsed;
            debug!("⏳ Rate limiting: waiting {}ms...", wait.as_millis());
            self.clock.sleep(wait).await;
        }
    }

    fn reset_daily_if_needed(&mut self) {
        let today = self.clock.now().date_naive();
        if today != self.last_reset {
            self.daily_calls = 0;
            self.last_reset = today;
            info!("🔄 Daily classifier counter reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, ModelError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            Scripted {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TextModel for Scripted {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String, ModelError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ModelError::EmptyResponse))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn setup(replies: Vec<Result<String, ModelError>>) -> (Arc<Scripted>, Arc<ManualClock>, AiClassifier, RateGovernor) {
        let model = Arc::new(Scripted::new(replies));
        let clock = Arc::new(ManualClock::new(Local.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()));
        let classifier = AiClassifier::new(model.clone(), clock.clone(), &AiAnalysisSettings::default());
        let governor = RateGovernor::per_minute(clock.clone(), 15, 1500);
        (model, clock, classifier, governor)
    }

    #[test]
    fn test_category_parsing_is_closed_and_case_insensitive() {
        assert_eq!("important".parse::<Category>().unwrap(), Category::Important);
        assert_eq!(" NEWSLETTER ".parse::<Category>().unwrap(), Category::Newsletter);
        assert!(matches!(
            "Urgent".parse::<Category>(),
            Err(ClassificationError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_parse_classification_clamps_confidence() {
        let result = parse_classification(
            r#"```json
{"category": "Social", "priority": "Low", "needsReply": false, "confidence": 140, "analysis": "friend request"}
```"#,
        )
        .unwrap();

        assert_eq!(result.category, Category::Social);
        assert_eq!(result.priority, Priority::Low);
        assert_eq!(result.confidence, 100);

        let negative = parse_classification(r#"{"category": "Spam", "priority": "Low", "confidence": -5}"#).unwrap();
        assert_eq!(negative.confidence, 0);
    }

    #[test]
    fn test_parse_classification_tolerates_null_optional_fields() {
        let result = parse_classification(
            r#"{"category": "Important", "priority": "High", "needsReply": null,
                "confidence": null, "analysis": null, "suggestedActions": null}"#,
        )
        .unwrap();

        assert_eq!(result.category, Category::Important);
        assert_eq!(result.priority, Priority::High);
        assert!(!result.needs_reply);
        assert_eq!(result.confidence, 50);
        assert!(result.rationale.is_empty());
        assert!(result.suggested_actions.is_empty());
    }

    #[test]
    fn test_parse_classification_accepts_textual_confidence() {
        let quoted = parse_classification(
            r#"{"category": "Important", "priority": "High", "needsReply": true, "confidence": "90"}"#,
        )
        .unwrap();
        assert_eq!(quoted.confidence, 90);
        assert!(quoted.needs_reply);

        let percent = parse_classification(r#"{"category": "Updates", "priority": "Low", "confidence": "75%"}"#).unwrap();
        assert_eq!(percent.confidence, 75);

        let garbled = parse_classification(r#"{"category": "Updates", "priority": "Low", "confidence": "high"}"#).unwrap();
        assert_eq!(garbled.confidence, 50);
    }

    #[test]
    fn test_parse_classification_rejects_missing_fields() {
        assert!(matches!(
            parse_classification(r#"{"category": "", "priority": "High"}"#),
            Err(ClassificationError::MissingField("category"))
        ));
        assert!(matches!(
            parse_classification(r#"{"category": "Updates"}"#),
            Err(ClassificationError::MissingField("priority"))
        ));
        assert!(matches!(
            parse_classification("I cannot help with that."),
            Err(ClassificationError::NotJson(_))
        ));
    }

    #[test]
    fn test_prompt_embeds_first_800_chars() {
        let body = "a".repeat(1000);
        let prompt = build_prompt(&body, "x@example.com", "Hi");
        assert!(prompt.contains(&"a".repeat(800)));
        assert!(!prompt.contains(&"a".repeat(801)));
    }

    #[test]
    fn test_fallback_heuristics() {
        assert_eq!(fallback_priority("boss@corp.com", "URGENT: contract"), Priority::High);
        assert_eq!(fallback_priority("noreply@shop.com", "Your receipt"), Priority::Low);
        assert_eq!(fallback_priority("a@b.com", "Hello"), Priority::Medium);

        assert!(fallback_needs_reply("recruiter@corp.com", "Interview next week"));
        assert!(!fallback_needs_reply("system@corp.com", "Meeting reminder"));
        assert!(!fallback_needs_reply("a@b.com", "Hello"));
    }

    #[tokio::test]
    async fn test_non_json_twice_falls_back() {
        let (model, clock, mut classifier, mut governor) = setup(vec![
            Ok("not json at all".to_string()),
            Ok("still not json".to_string()),
        ]);

        let result = classifier
            .classify(&mut governor, "body", "someone@example.com", "me@example.com", "Hello")
            .await;

        assert_eq!(result.category, Category::Updates);
        assert_eq!(result.confidence, 30);
        assert_eq!(result.source, ClassificationSource::Fallback);
        assert_eq!(model.calls(), 2);
        assert_eq!(governor.usage().daily_usage, 2);
        // 1s retry pause, then the rest of the 3s spacing
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_rate_limit_backoff_then_success() {
        let (model, clock, mut classifier, mut governor) = setup(vec![
            Err(ModelError::RateLimited("429".to_string())),
            Ok(r#"{"category": "Important", "priority": "High", "needsReply": true, "confidence": 92}"#.to_string()),
        ]);

        let result = classifier
            .classify(&mut governor, "body", "friend@example.com", "me@example.com", "Lunch?")
            .await;

        assert_eq!(result.category, Category::Important);
        assert!(result.needs_reply);
        assert_eq!(model.calls(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2), Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_daily_cap_skips_model() {
        let (model, _clock, mut classifier, mut governor) = setup(vec![]);
        classifier.apply_settings(&AiAnalysisSettings {
            daily_call_cap: 0,
            ..AiAnalysisSettings::default()
        });

        let result = classifier
            .classify(&mut governor, "body", "a@b.com", "me@example.com", "Hi")
            .await;

        assert_eq!(result.confidence, 50);
        assert_eq!(result.source, ClassificationSource::QuotaSkipped);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_governor_falls_back_without_calling() {
        let (model, _clock, mut classifier, _governor) = setup(vec![]);
        let clock = Arc::new(ManualClock::new(Local.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()));
        let mut governor = RateGovernor::per_minute(clock, 15, 0);

        let result = classifier
            .classify(&mut governor, "body", "a@b.com", "me@example.com", "Hi")
            .await;

        assert_eq!(result.source, ClassificationSource::Fallback);
        assert_eq!(model.calls(), 0);
    }
}
