#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, Utc};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use mailtriage::clock::ManualClock;
use mailtriage::email::{LabelInfo, MailboxProvider, Message};
use mailtriage::filters::{IgnoreList, SpamFilter};
use mailtriage::model::{GenerationParams, ModelError, TextModel};
use mailtriage::orchestrator::{Orchestrator, OrchestratorOptions};
use mailtriage::settings::SettingsStore;

pub fn message(id: &str, from: &str, subject: &str, body: &str) -> Message {
    Message {
        id: id.to_string(),
        thread_id: format!("thread-{}", id),
        message_id: Some(format!("<{}@mail.example.com>", id)),
        from: from.to_string(),
        to: "me@example.com".to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        date: Utc::now(),
    }
}

pub fn old_message(id: &str, from: &str, subject: &str, body: &str, age_days: i64) -> Message {
    Message {
        date: Utc::now() - Duration::days(age_days),
        ..message(id, from, subject, body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Modification {
    pub message_id: String,
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredReply {
    pub thread_id: String,
    pub raw: String,
}

#[derive(Default)]
struct MailboxState {
    messages: Vec<Message>,
    labels: Vec<LabelInfo>,
    created_labels: Vec<String>,
    modifications: Vec<Modification>,
    drafts: Vec<StoredReply>,
    sent: Vec<StoredReply>,
    trashed: Vec<String>,
    queries: Vec<String>,
    fail_list: bool,
    fail_get: HashSet<String>,
    fail_export: HashSet<String>,
}

/// In-memory mailbox recording every call made by the pipeline.
#[derive(Default)]
pub struct MockMailbox {
    state: Mutex<MailboxState>,
}

impl MockMailbox {
    pub fn new(messages: Vec<Message>) -> Arc<Self> {
        let mailbox = MockMailbox::default();
        {
            let mut state = mailbox.state.lock().unwrap();
            state.messages = messages;
            state.labels = vec![
                LabelInfo {
                    id: "INBOX".to_string(),
                    name: "INBOX".to_string(),
                    label_type: "system".to_string(),
                },
                LabelInfo {
                    id: "UNREAD".to_string(),
                    name: "UNREAD".to_string(),
                    label_type: "system".to_string(),
                },
            ];
        }
        Arc::new(mailbox)
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_get(&self, message_id: &str) {
        self.state.lock().unwrap().fail_get.insert(message_id.to_string());
    }

    pub fn fail_export(&self, message_id: &str) {
        self.state.lock().unwrap().fail_export.insert(message_id.to_string());
    }

    pub fn add_message(&self, message: Message) {
        self.state.lock().unwrap().messages.push(message);
    }

    /// Names of the labels added to a message, in order.
    pub fn labels_added(&self, message_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .modifications
            .iter()
            .filter(|m| m.message_id == message_id)
            .flat_map(|m| m.add.iter())
            .map(|id| {
                state
                    .labels
                    .iter()
                    .find(|l| &l.id == id)
                    .map(|l| l.name.clone())
                    .unwrap_or_else(|| id.clone())
            })
            .collect()
    }

    pub fn modifications(&self) -> Vec<Modification> {
        self.state.lock().unwrap().modifications.clone()
    }

    pub fn created_labels(&self) -> Vec<String> {
        self.state.lock().unwrap().created_labels.clone()
    }

    pub fn drafts(&self) -> Vec<StoredReply> {
        self.state.lock().unwrap().drafts.clone()
    }

    pub fn sent(&self) -> Vec<StoredReply> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn trashed(&self) -> Vec<String> {
        self.state.lock().unwrap().trashed.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }
}

#[async_trait]
impl MailboxProvider for MockMailbox {
    async fn list_messages(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.to_string());
        if state.fail_list {
            bail!("mailbox unavailable");
        }
        Ok(state
            .messages
            .iter()
            .take(max_results as usize)
            .map(|m| m.id.clone())
            .collect())
    }

    async fn get_message(&self, message_id: &str) -> Result<Message> {
        let state = self.state.lock().unwrap();
        if state.fail_get.contains(message_id) {
            bail!("fetch failed for {}", message_id);
        }
        match state.messages.iter().find(|m| m.id == message_id) {
            Some(message) => Ok(message.clone()),
            None => bail!("no message {}", message_id),
        }
    }

    async fn export_message(&self, message_id: &str) -> Result<serde_json::Value> {
        let state = self.state.lock().unwrap();
        if state.fail_export.contains(message_id) {
            bail!("export failed for {}", message_id);
        }
        Ok(serde_json::json!({ "id": message_id, "raw": "backup" }))
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let id = format!("Label_{}", state.labels.len() + 1);
        state.labels.push(LabelInfo {
            id: id.clone(),
            name: name.to_string(),
            label_type: "user".to_string(),
        });
        state.created_labels.push(name.to_string());
        Ok(id)
    }

    async fn modify_labels(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<()> {
        self.state.lock().unwrap().modifications.push(Modification {
            message_id: message_id.to_string(),
            add: add.to_vec(),
            remove: remove.to_vec(),
        });
        Ok(())
    }

    async fn create_draft(&self, raw: &[u8], thread_id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.drafts.push(StoredReply {
            thread_id: thread_id.to_string(),
            raw: String::from_utf8_lossy(raw).to_string(),
        });
        Ok(format!("draft-{}", state.drafts.len()))
    }

    async fn send_message(&self, raw: &[u8], thread_id: &str) -> Result<()> {
        self.state.lock().unwrap().sent.push(StoredReply {
            thread_id: thread_id.to_string(),
            raw: String::from_utf8_lossy(raw).to_string(),
        });
        Ok(())
    }

    async fn trash_message(&self, message_id: &str) -> Result<()> {
        self.state.lock().unwrap().trashed.push(message_id.to_string());
        Ok(())
    }
}

/// Model returning queued replies in order; an empty queue is an error.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
        Arc::new(ScriptedModel {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(texts: &[&str]) -> Arc<Self> {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Request("no scripted reply".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Local::now()))
}

pub fn write_settings(dir: &Path, json: &str) -> std::path::PathBuf {
    let path = dir.join("settings.json");
    std::fs::write(&path, json).unwrap();
    path
}

pub struct Harness {
    pub mailbox: Arc<MockMailbox>,
    pub model: Arc<ScriptedModel>,
    pub clock: Arc<ManualClock>,
    pub orchestrator: Orchestrator,
}

pub fn harness(
    dir: &Path,
    settings_json: &str,
    messages: Vec<Message>,
    model: Arc<ScriptedModel>,
    dry_run: bool,
) -> Harness {
    let mailbox = MockMailbox::new(messages);
    let clock = manual_clock();
    let settings = SettingsStore::new(write_settings(dir, settings_json));
    let ignore_list = IgnoreList::load(dir.join("ignore_patterns.json")).unwrap();

    let orchestrator = Orchestrator::new(
        mailbox.clone(),
        model.clone(),
        clock.clone(),
        settings,
        SpamFilter::new(ignore_list),
        OrchestratorOptions {
            sender_name: "Test User".to_string(),
            backup_dir: dir.join("email_backups"),
            watermark_path: dir.join("watermark.json"),
            dry_run,
            limit: None,
        },
    );

    Harness {
        mailbox,
        model,
        clock,
        orchestrator,
    }
}

pub fn started_at(clock: &ManualClock) -> DateTime<Local> {
    use mailtriage::clock::Clock;
    clock.now()
}
