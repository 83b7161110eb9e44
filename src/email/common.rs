/// Common structures for messages fetched from the mailbox
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use regex::Regex;
use std::sync::LazyLock;

/// A message as seen by the triage pipeline. Immutable once fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    /// RFC 822 `Message-ID` header, used to thread replies.
    pub message_id: Option<String>,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub date: DateTime<Utc>,
}

impl Message {
    /// Display name of the sender, falling back to "there".
    pub fn sender_name(&self) -> &str {
        let name = self.from.split('<').next().unwrap_or("").trim().trim_matches('"');
        if name.is_empty() || name.contains('@') {
            "there"
        } else {
            name
        }
    }

    pub fn has_readable_content(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid html tag pattern"));

/// Build a [`Message`] from a raw RFC 822 document.
pub fn parse_raw_message(id: &str, thread_id: &str, raw: &[u8]) -> Result<Message> {
    let parsed = mail_parser::MessageParser::default()
        .parse(raw)
        .context("Unable to parse email")?;

    let date = match parsed.date() {
        Some(date_header) => DateTime::from_timestamp(date_header.to_timestamp(), 0)
            .unwrap_or_else(Utc::now),
        None => {
            warn!("No date in email {}, using current date", id);
            Utc::now()
        }
    };

    let format_address = |addr: &mail_parser::Addr| match (&addr.name, &addr.address) {
        (Some(name), Some(email)) => format!("{} <{}>", name, email),
        (None, Some(email)) => email.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    };

    let from = parsed
        .from()
        .and_then(|addrs| addrs.first())
        .map(format_address)
        .unwrap_or_default();

    let to = parsed
        .to()
        .and_then(|addrs| addrs.first())
        .map(format_address)
        .unwrap_or_default();

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();

    // Prefer text/plain, fall back to stripped HTML
    let mut body = parsed
        .body_text(0)
        .map(|text| text.to_string())
        .unwrap_or_default();

    if body.trim().is_empty() {
        if let Some(html_body) = parsed.body_html(0) {
            let html_str = html_body
                .replace("<br>", "\n")
                .replace("<BR>", "\n")
                .replace("</p>", "\n")
                .replace("</P>", "\n");
            body = HTML_TAG.replace_all(&html_str, "").to_string();
        }
    }

    Ok(Message {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        message_id: parsed.message_id().map(|m| format!("<{}>", m)),
        from,
        to,
        subject,
        body,
        date,
    })
}
