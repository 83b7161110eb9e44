use log::debug;

use super::rules::{first_match, Condition, Field, Fields, Rule};
use crate::classifier::Category;

/// Ordered pre-filter table. The automated-sender rule sits first, so
/// automated shipping notices land in Updates through it.
static PRE_FILTER_RULES: &[Rule] = &[
    Rule {
        reason: "Automated sender",
        category: Category::Updates,
        when: Condition::Contains(Field::Sender, &["noreply", "no-reply", "donotreply", "automated"]),
    },
    Rule {
        reason: "Marketing/Newsletter",
        category: Category::Promotional,
        when: Condition::Any(&[
            Condition::Contains(Field::Body, &["unsubscribe", "marketing@"]),
            Condition::Contains(Field::Subject, &["newsletter", "promotion", "deal", "sale"]),
        ]),
    },
    Rule {
        reason: "Social media notification",
        category: Category::Social,
        when: Condition::Any(&[
            Condition::Contains(Field::Sender, &["facebook", "twitter", "linkedin", "instagram"]),
            Condition::All(&[
                Condition::Contains(Field::Sender, &["notification"]),
                Condition::Any(&[
                    Condition::Contains(Field::Sender, &["social"]),
                    Condition::Contains(Field::Subject, &["liked"]),
                ]),
            ]),
        ]),
    },
    Rule {
        reason: "Shipping/Order confirmation",
        category: Category::Updates,
        when: Condition::All(&[
            Condition::Contains(Field::Subject, &["order", "shipped", "delivery", "tracking"]),
            Condition::Contains(Field::Sender, &["amazon", "fedex", "ups", "shipping"]),
        ]),
    },
    Rule {
        reason: "System notification",
        category: Category::Updates,
        when: Condition::Any(&[
            Condition::Contains(Field::Subject, &["backup", "server", "system", "maintenance"]),
            Condition::All(&[
                Condition::Contains(Field::Subject, &["alert"]),
                Condition::Contains(Field::Sender, &["monitoring"]),
            ]),
        ]),
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreFilterDecision {
    pub skip: bool,
    pub reason: String,
    /// Set whenever `skip` is true.
    pub category: Option<Category>,
}

/// Decides from headers and body alone whether a model call is needed.
#[derive(Debug)]
pub struct PreFilter {
    rules: &'static [Rule],
}

impl Default for PreFilter {
    fn default() -> Self {
        PreFilter { rules: PRE_FILTER_RULES }
    }
}

impl PreFilter {
    pub fn evaluate(&self, sender: &str, subject: &str, body: &str) -> PreFilterDecision {
        let fields = Fields::new(sender, subject, body);

        match first_match(self.rules, &fields) {
            Some(rule) => {
                debug!("Pre-filter rule '{}' matched → {}", rule.reason, rule.category);
                PreFilterDecision {
                    skip: true,
                    reason: rule.reason.to_string(),
                    category: Some(rule.category),
                }
            }
            None => PreFilterDecision {
                skip: false,
                reason: "Requires AI analysis".to_string(),
                category: None,
            },
        }
    }
}
