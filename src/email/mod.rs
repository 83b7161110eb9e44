pub mod common;
pub mod labels;
pub mod mailbox;

// Re-export commonly used items
pub use common::{parse_raw_message, Message};
pub use labels::LabelCache;
pub use mailbox::{LabelInfo, MailboxProvider};
