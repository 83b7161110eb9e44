use anyhow::Result;
use async_trait::async_trait;

use super::common::Message;

/// Label as reported by the mailbox provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
    pub label_type: String,
}

/// Remote mailbox operations the triage pipeline depends on.
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    /// Search messages; returns ids, newest first.
    async fn list_messages(&self, query: &str, max_results: u32) -> Result<Vec<String>>;

    async fn get_message(&self, message_id: &str) -> Result<Message>;

    /// Full provider representation of a message, written to disk as a backup.
    async fn export_message(&self, message_id: &str) -> Result<serde_json::Value>;

    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a user label and return its id.
    async fn create_label(&self, name: &str) -> Result<String>;

    async fn modify_labels(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<()>;

    /// Store an RFC 822 document as a draft in `thread_id`; returns the draft id.
    async fn create_draft(&self, raw: &[u8], thread_id: &str) -> Result<String>;

    async fn send_message(&self, raw: &[u8], thread_id: &str) -> Result<()>;

    /// Move to trash. Messages are never deleted permanently.
    async fn trash_message(&self, message_id: &str) -> Result<()>;
}
