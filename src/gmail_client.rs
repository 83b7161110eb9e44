use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::api::{Draft, Label, Message as GmailMessage, ModifyMessageRequest, Scope};
use google_gmail1::{hyper, hyper_rustls, oauth2, Gmail};
use log::{debug, info};
use std::io::Cursor;

use crate::config::GmailConfig;
use crate::email::{parse_raw_message, LabelInfo, MailboxProvider, Message};

const USER_ID: &str = "me";

pub struct GmailClient {
    hub: Gmail<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>,
}

impl GmailClient {
    pub async fn new(config: &GmailConfig) -> Result<Self> {
        info!("Connecting to Gmail API via OAuth2");

        // Read OAuth2 client credentials from file
        let secret = oauth2::read_application_secret(&config.credentials_path)
            .await
            .context("Unable to read OAuth2 client credentials file")?;

        // Scope::Modify covers reading, labelling, drafting and trashing
        let auth = oauth2::InstalledFlowAuthenticator::builder(
            secret,
            oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(&config.token_cache_path)
        .build()
        .await
        .context("Unable to create OAuth2 authenticator")?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .build();

        let client = hyper::Client::builder().build(connector);
        let hub = Gmail::new(client, auth);

        info!("✅ Gmail API connection established successfully");

        Ok(GmailClient { hub })
    }
}

#[async_trait]
impl MailboxProvider for GmailClient {
    async fn list_messages(&self, query: &str, max_results: u32) -> Result<Vec<String>> {
        debug!("Search criteria: {} (max {})", query, max_results);

        let result = self
            .hub
            .users()
            .messages_list(USER_ID)
            .q(query)
            .max_results(max_results)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .context("Error searching for emails")?;

        let message_ids: Vec<String> = result
            .1
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| msg.id)
            .collect();

        debug!("Found {} email(s) for '{}'", message_ids.len(), query);
        Ok(message_ids)
    }

    async fn get_message(&self, message_id: &str) -> Result<Message> {
        debug!("Complete email retrieval for ID: {}", message_id);

        let (_, message) = self
            .hub
            .users()
            .messages_get(USER_ID, message_id)
            .format("raw")
            .add_scope(Scope::Modify)
            .doit()
            .await
            .with_context(|| format!("Unable to retrieve email {}", message_id))?;

        // Raw content is already decoded by the API client (RFC822 bytes)
        let raw = message.raw.context("No raw content in email")?;
        let thread_id = message.thread_id.unwrap_or_else(|| message_id.to_string());

        debug!("Email retrieved, size: {} bytes", raw.len());
        parse_raw_message(message_id, &thread_id, &raw)
    }

    async fn export_message(&self, message_id: &str) -> Result<serde_json::Value> {
        let (_, message) = self
            .hub
            .users()
            .messages_get(USER_ID, message_id)
            .format("full")
            .add_scope(Scope::Modify)
            .doit()
            .await
            .with_context(|| format!("Unable to export email {}", message_id))?;

        serde_json::to_value(&message).context("Unable to serialize email for backup")
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        info!("Retrieving Gmail labels list");

        let result = self
            .hub
            .users()
            .labels_list(USER_ID)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .context("Unable to list labels")?;

        Ok(result
            .1
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| {
                Some(LabelInfo {
                    id: label.id?,
                    name: label.name?,
                    label_type: label.type_.unwrap_or_else(|| "Unknown".to_string()),
                })
            })
            .collect())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let request = Label {
            name: Some(name.to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            message_list_visibility: Some("show".to_string()),
            ..Default::default()
        };

        let (_, label) = self
            .hub
            .users()
            .labels_create(request, USER_ID)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .with_context(|| format!("Unable to create label '{}'", name))?;

        label.id.context("Created label has no id")
    }

    async fn modify_labels(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<()> {
        let mut modify_request = ModifyMessageRequest::default();
        if !add.is_empty() {
            modify_request.add_label_ids = Some(add.to_vec());
        }
        if !remove.is_empty() {
            modify_request.remove_label_ids = Some(remove.to_vec());
        }

        self.hub
            .users()
            .messages_modify(modify_request, USER_ID, message_id)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .context("Unable to modify email labels")?;

        Ok(())
    }

    async fn create_draft(&self, raw: &[u8], thread_id: &str) -> Result<String> {
        let draft = Draft {
            message: Some(GmailMessage {
                thread_id: Some(thread_id.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let (_, created) = self
            .hub
            .users()
            .drafts_create(draft, USER_ID)
            .add_scope(Scope::Modify)
            .upload(
                Cursor::new(raw.to_vec()),
                "message/rfc822".parse().context("Invalid MIME type")?,
            )
            .await
            .context("Unable to create draft")?;

        Ok(created.id.unwrap_or_default())
    }

    async fn send_message(&self, raw: &[u8], thread_id: &str) -> Result<()> {
        let message = GmailMessage {
            thread_id: Some(thread_id.to_string()),
            ..Default::default()
        };

        self.hub
            .users()
            .messages_send(message, USER_ID)
            .add_scope(Scope::Modify)
            .upload(
                Cursor::new(raw.to_vec()),
                "message/rfc822".parse().context("Invalid MIME type")?,
            )
            .await
            .context("Failed to send message")?;

        Ok(())
    }

    async fn trash_message(&self, message_id: &str) -> Result<()> {
        self.hub
            .users()
            .messages_trash(USER_ID, message_id)
            .add_scope(Scope::Modify)
            .doit()
            .await
            .with_context(|| format!("Unable to trash email {}", message_id))?;

        Ok(())
    }
}
