use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use super::rules::{Field, Fields};

const SPAM_INDICATORS: &[&str] = &[
    "free money",
    "click here now",
    "urgent action required",
    "act now",
    "congratulations you won",
    "you are a winner",
    "claim your prize",
    "nigerian prince",
    "inheritance",
    "lottery winner",
];

const PROMOTIONAL_INDICATORS: &[&str] = &[
    "unsubscribe",
    "sale",
    "discount",
    "limited time",
    "offer",
    "deal",
    "coupon",
    "promo",
    "special offer",
    "save money",
];

const SOCIAL_INDICATORS: &[&str] = &[
    "facebook",
    "twitter",
    "instagram",
    "linkedin",
    "social",
    "friend request",
    "tagged you",
    "mentioned you",
];

const NEWSLETTER_INDICATORS: &[&str] = &[
    "newsletter",
    "weekly update",
    "monthly digest",
    "blog post",
    "article",
    "news",
    "digest",
    "roundup",
];

const SPAM_SUBJECT_PATTERNS: &[&str] = &[
    "winner",
    "congratulations",
    "claim your",
    "urgent action",
    "final notice",
    "act now",
    "limited time",
    "expire",
];

const DEFINITE_SPAM_PATTERNS: &[&str] = &[
    "click here now",
    "free money",
    "nigerian prince",
    "you have won",
    "claim your prize",
    "inheritance fund",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailType {
    Spam,
    Promotional,
    Social,
    Newsletter,
    Legitimate,
}

/// Coarse type of a message from keyword indicators, checked in order.
pub fn classify_email_type(sender: &str, subject: &str, body: &str) -> EmailType {
    let fields = Fields::new(sender, subject, body);
    let in_subject_or_body = |needles: &[&'static str]| {
        fields.find(Field::Subject, needles).is_some() || fields.find(Field::Body, needles).is_some()
    };

    if in_subject_or_body(SPAM_INDICATORS) {
        return EmailType::Spam;
    }
    if in_subject_or_body(PROMOTIONAL_INDICATORS) {
        return EmailType::Promotional;
    }
    if fields.find(Field::Sender, SOCIAL_INDICATORS).is_some()
        || fields.find(Field::Subject, SOCIAL_INDICATORS).is_some()
    {
        return EmailType::Social;
    }
    if in_subject_or_body(NEWSLETTER_INDICATORS) {
        return EmailType::Newsletter;
    }
    EmailType::Legitimate
}

/// Sender substrings that are always treated as spam.
///
/// Stored as a JSON array; entries are only ever added.
#[derive(Debug, Clone)]
pub struct IgnoreList {
    path: PathBuf,
    patterns: Vec<String>,
}

impl IgnoreList {
    /// Load the list, starting empty when the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let patterns = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Unable to read ignore patterns from {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid ignore patterns file {}", path.display()))?
        } else {
            debug!("No ignore patterns file at {}", path.display());
            Vec::new()
        };

        Ok(IgnoreList { path, patterns })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Add new patterns (duplicates ignored) and persist the list.
    pub fn extend<I, S>(&mut self, new_patterns: I) -> Result<&[String]>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for pattern in new_patterns {
            let pattern = pattern.into();
            let pattern = pattern.trim();
            if !pattern.is_empty() && !self.patterns.iter().any(|p| p == pattern) {
                self.patterns.push(pattern.to_string());
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Unable to create directory {}", parent.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(&self.patterns)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Unable to write ignore patterns to {}", self.path.display()))?;

        info!("📝 Ignore list now has {} pattern(s)", self.patterns.len());
        Ok(&self.patterns)
    }

    pub fn matches(&self, sender: &str) -> bool {
        let sender = sender.to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| sender.contains(&pattern.to_lowercase()))
    }
}

/// Spam check that runs before the pre-filter.
///
/// Its keyword sets overlap with the pre-filter rules; the two stay
/// separate because a spam hit leaves the inbox while a pre-filter hit is
/// only labelled.
pub struct SpamFilter {
    ignore_list: IgnoreList,
}

impl SpamFilter {
    pub fn new(ignore_list: IgnoreList) -> Self {
        SpamFilter { ignore_list }
    }

    pub fn ignore_list(&self) -> &IgnoreList {
        &self.ignore_list
    }

    pub fn ignore_list_mut(&mut self) -> &mut IgnoreList {
        &mut self.ignore_list
    }

    /// Returns the reason when the message should be treated as spam.
    pub fn check(&self, sender: &str, subject: &str, body: &str) -> Option<String> {
        if self.ignore_list.matches(sender) {
            return Some("Sender is on the ignore list".to_string());
        }

        if !subject.is_empty() && !body.is_empty() && classify_email_type(sender, subject, body) == EmailType::Spam {
            return Some("Classified as spam".to_string());
        }

        let fields = Fields::new(sender, subject, body);

        if let Some(pattern) = fields.find(Field::Subject, SPAM_SUBJECT_PATTERNS) {
            return Some(format!("Spam subject pattern '{}'", pattern));
        }

        if let Some(pattern) = fields.find(Field::Body, DEFINITE_SPAM_PATTERNS) {
            return Some(format!("Spam content pattern '{}'", pattern));
        }

        None
    }
}

/// Load the ignore list, logging and continuing empty when it is unreadable.
pub fn load_ignore_list_or_empty(path: &Path) -> IgnoreList {
    IgnoreList::load(path).unwrap_or_else(|e| {
        warn!("⚠️  {:#}; continuing with an empty ignore list", e);
        IgnoreList {
            path: path.to_path_buf(),
            patterns: Vec::new(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filter() -> SpamFilter {
        let dir = TempDir::new().unwrap();
        SpamFilter::new(IgnoreList::load(dir.path().join("ignore.json")).unwrap())
    }

    #[test]
    fn test_classify_email_type_order() {
        assert_eq!(classify_email_type("a@b.com", "Claim your prize", "now"), EmailType::Spam);
        assert_eq!(classify_email_type("a@b.com", "Big discount", "x"), EmailType::Promotional);
        assert_eq!(classify_email_type("alerts@facebook.com", "Hello", "x"), EmailType::Social);
        assert_eq!(classify_email_type("a@b.com", "Monthly digest", "x"), EmailType::Newsletter);
        assert_eq!(classify_email_type("a@b.com", "Lunch?", "Friday works"), EmailType::Legitimate);
    }

    #[test]
    fn test_only_spam_type_triggers() {
        let filter = filter();
        assert!(filter.check("store@brand.com", "Big discount", "coupon inside").is_none());
        assert!(filter.check("x@y.com", "Hello", "Congratulations you won a car").is_some());
    }

    #[test]
    fn test_subject_and_body_patterns() {
        let filter = filter();
        assert_eq!(
            filter.check("x@y.com", "FINAL NOTICE", "").as_deref(),
            Some("Spam subject pattern 'final notice'")
        );
        assert_eq!(
            filter.check("x@y.com", "", "You have won!").as_deref(),
            Some("Spam content pattern 'you have won'")
        );
        assert!(filter.check("friend@example.com", "Can we meet Friday?", "Coffee?").is_none());
    }

    #[test]
    fn test_ignore_list_persists_and_deduplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("ignore.json");

        let mut list = IgnoreList::load(&path).unwrap();
        assert!(list.patterns().is_empty());

        list.extend(["noreply@glassdoor.com", "noreply@reddit.com"]).unwrap();
        list.extend(["noreply@reddit.com", "  "]).unwrap();
        assert_eq!(list.patterns().len(), 2);

        let reloaded = IgnoreList::load(&path).unwrap();
        assert_eq!(reloaded.patterns(), list.patterns());
        assert!(reloaded.matches("Reddit <NoReply@Reddit.com>"));
        assert!(!reloaded.matches("friend@example.com"));
    }

    #[test]
    fn test_ignored_sender_is_spam() {
        let dir = TempDir::new().unwrap();
        let mut list = IgnoreList::load(dir.path().join("ignore.json")).unwrap();
        list.extend(["spammy.biz"]).unwrap();

        let filter = SpamFilter::new(list);
        assert_eq!(
            filter.check("deals@spammy.biz", "Hello", "hi").as_deref(),
            Some("Sender is on the ignore list")
        );
    }
}
