//! Declarative keyword rules over a message's sender, subject and body.

use crate::classifier::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Sender,
    Subject,
    Body,
}

/// A predicate over lower-cased message fields.
#[derive(Debug)]
pub enum Condition {
    /// The field contains at least one of the substrings.
    Contains(Field, &'static [&'static str]),
    All(&'static [Condition]),
    Any(&'static [Condition]),
}

/// Lower-cased view of the fields rules inspect.
#[derive(Debug, Clone)]
pub struct Fields {
    sender: String,
    subject: String,
    body: String,
}

impl Fields {
    pub fn new(sender: &str, subject: &str, body: &str) -> Self {
        Fields {
            sender: sender.to_lowercase(),
            subject: subject.to_lowercase(),
            body: body.to_lowercase(),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Sender => &self.sender,
            Field::Subject => &self.subject,
            Field::Body => &self.body,
        }
    }

    /// The first needle found in `field`, if any.
    pub fn find(&self, field: Field, needles: &[&'static str]) -> Option<&'static str> {
        let haystack = self.get(field);
        needles.iter().copied().find(|needle| haystack.contains(needle))
    }
}

impl Condition {
    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Condition::Contains(field, needles) => fields.find(*field, needles).is_some(),
            Condition::All(conditions) => conditions.iter().all(|c| c.matches(fields)),
            Condition::Any(conditions) => conditions.iter().any(|c| c.matches(fields)),
        }
    }
}

/// One entry of an ordered rule table; the first matching rule wins.
#[derive(Debug)]
pub struct Rule {
    pub reason: &'static str,
    pub category: Category,
    pub when: Condition,
}

pub fn first_match<'a>(rules: &'a [Rule], fields: &Fields) -> Option<&'a Rule> {
    rules.iter().find(|rule| rule.when.matches(fields))
}
