pub mod pre_filter;
pub mod rules;
pub mod spam;

pub use pre_filter::{PreFilter, PreFilterDecision};
pub use spam::{classify_email_type, EmailType, IgnoreList, SpamFilter};
