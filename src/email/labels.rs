use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::{HashMap, HashSet};

use super::mailbox::{LabelInfo, MailboxProvider};

pub const UNREAD: &str = "UNREAD";
pub const INBOX: &str = "INBOX";

/// Label name → id lookups, plus the record of labels applied this run.
#[derive(Debug, Default)]
pub struct LabelCache {
    ids: HashMap<String, String>,
    applied: HashSet<(String, String)>,
}

impl LabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a label id, creating the label when it does not exist yet.
    pub async fn get_or_create(&mut self, mailbox: &dyn MailboxProvider, name: &str) -> Result<String> {
        if let Some(id) = self.ids.get(name) {
            return Ok(id.clone());
        }

        let labels = mailbox.list_labels().await.context("Unable to list labels")?;
        for label in labels {
            self.ids.insert(label.name, label.id);
        }

        if let Some(id) = self.ids.get(name) {
            return Ok(id.clone());
        }

        let id = mailbox
            .create_label(name)
            .await
            .with_context(|| format!("Unable to create label '{}'", name))?;
        info!("→ Created new label: {}", name);
        self.ids.insert(name.to_string(), id.clone());
        Ok(id)
    }

    /// Apply `name` to a message and remove the given system labels.
    ///
    /// Returns `false` without calling the mailbox when this label was already
    /// applied to the message during the current run.
    pub async fn apply(
        &mut self,
        mailbox: &dyn MailboxProvider,
        message_id: &str,
        name: &str,
        remove: &[&str],
    ) -> Result<bool> {
        let key = (message_id.to_string(), name.to_string());
        if self.applied.contains(&key) {
            debug!("Label '{}' already applied to {} this run", name, message_id);
            return Ok(false);
        }

        let label_id = self.get_or_create(mailbox, name).await?;
        let remove: Vec<String> = remove.iter().map(|s| s.to_string()).collect();

        mailbox
            .modify_labels(message_id, &[label_id], &remove)
            .await
            .with_context(|| format!("Unable to apply label '{}' to {}", name, message_id))?;

        self.applied.insert(key);
        Ok(true)
    }

    /// Forget per-run state; label ids stay cached.
    pub fn start_run(&mut self) {
        self.applied.clear();
    }
}

/// Print labels as a table, labels managed by this tool first.
pub fn print_labels(labels: Vec<LabelInfo>, managed: &[&str]) {
    if labels.is_empty() {
        println!("No labels found.");
        return;
    }

    println!("Found {} label(s):\n", labels.len());
    println!("{:<40} {:<30} {:<15}", "Label Name", "Label ID", "Type");
    println!("{}", "=".repeat(85));

    let mut sorted_labels = labels;
    sorted_labels.sort_by(|a, b| {
        let a_managed = managed.contains(&a.name.as_str());
        let b_managed = managed.contains(&b.name.as_str());

        match (a_managed, b_managed) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        }
    });

    for label in sorted_labels {
        if managed.contains(&label.name.as_str()) {
            println!("✨ {:<38} {:<30} {:<15}", label.name, label.id, label.label_type);
        } else {
            println!("{:<40} {:<30} {:<15}", label.name, label.id, label.label_type);
        }
    }
}
