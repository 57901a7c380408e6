//! Email messages and the transport boundary
//!
//! [`EmailMessage`] collects recipients, content and attachments; a
//! [`MailTransport`] delivers it. [`PickupDirectoryTransport`] drops each
//! message as an `.eml` file into a directory watched by an SMTP relay.

use super::error::{DatabaseError, Result};
use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

fn split_addresses(addresses: &str) -> impl Iterator<Item = String> + '_ {
    addresses
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// An outgoing email
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub html: bool,
    pub attachments: Vec<PathBuf>,
}

impl EmailMessage {
    pub fn new(to: &str, subject: impl Into<String>, body: impl Into<String>) -> Self {
        let mut message = Self {
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        };
        message.add_to(to);
        message
    }

    #[must_use]
    pub fn from_address(mut self, from: impl Into<String>) -> Self {
        let from = from.into();
        self.from = if from.trim().is_empty() { None } else { Some(from) };
        self
    }

    #[must_use]
    pub fn html(mut self, html: bool) -> Self {
        self.html = html;
        self
    }

    /// Add primary recipients; `;` or `,` separate multiple addresses
    pub fn add_to(&mut self, addresses: &str) {
        self.to.extend(split_addresses(addresses));
    }

    pub fn add_cc(&mut self, addresses: &str) {
        self.cc.extend(split_addresses(addresses));
    }

    pub fn add_bcc(&mut self, addresses: &str) {
        self.bcc.extend(split_addresses(addresses));
    }

    /// Attach a file unless a path differing only in case is attached already
    pub fn add_attachment(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let lowered = path.to_string_lossy().to_lowercase();
        if !self
            .attachments
            .iter()
            .any(|p| p.to_string_lossy().to_lowercase() == lowered)
        {
            self.attachments.push(path);
        }
    }

    /// Attachment names, comma separated, five per line
    pub fn attachment_string(&self) -> String {
        let mut out = String::new();
        for (i, path) in self.attachments.iter().enumerate() {
            if i > 0 {
                out.push_str(if i % 5 == 0 { ",\n" } else { ", " });
            }
            out.push_str(&path.to_string_lossy());
        }
        out
    }

    /// Plain-text rendering for logs and audit files
    pub fn memo_format(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("From: {}\r\n", self.from.as_deref().unwrap_or("")));
        out.push_str(&format!("To: {}\r\n", self.to.join(", ")));
        out.push_str(&format!("CC: {}\r\n", self.cc.join(", ")));
        if !self.bcc.is_empty() {
            out.push_str(&format!("BCC: {}\r\n", self.bcc.join(", ")));
        }
        let attachments = self.attachment_string();
        if !attachments.is_empty() {
            out.push_str(&format!("Attachments: {}\r\n", attachments));
        }
        out.push_str(&format!("Subject: {}\r\n", self.subject));
        out.push_str(&format!("{}\r\n", self.body));
        out
    }

    /// Fails when the message has nowhere to go
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(DatabaseError::invalid_operation("Email has no recipients"));
        }
        Ok(())
    }

    /// RFC 822 text of the message. Attachments are not embedded.
    pub fn to_rfc822(&self, default_from: &str) -> String {
        let mut out = String::new();
        let from = self.from.as_deref().unwrap_or(default_from);
        out.push_str(&format!("From: {}\r\n", from));
        out.push_str(&format!("To: {}\r\n", self.to.join(", ")));
        if !self.cc.is_empty() {
            out.push_str(&format!("Cc: {}\r\n", self.cc.join(", ")));
        }
        if !self.bcc.is_empty() {
            out.push_str(&format!("Bcc: {}\r\n", self.bcc.join(", ")));
        }
        out.push_str(&format!("Subject: {}\r\n", self.subject));
        out.push_str(&format!("Date: {}\r\n", Local::now().to_rfc2822()));
        out.push_str("MIME-Version: 1.0\r\n");
        let content_type = if self.html { "text/html" } else { "text/plain" };
        out.push_str(&format!("Content-Type: {}; charset=utf-8\r\n", content_type));
        out.push_str("\r\n");
        for line in self.body.lines() {
            // Leading dots are doubled so relays do not read them as end of data
            if line.starts_with('.') {
                out.push('.');
            }
            out.push_str(line);
            out.push_str("\r\n");
        }
        out
    }
}

/// Delivers email messages
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Writes messages as `.eml` files for an SMTP relay's pickup directory.
///
/// Attachments are copied next to the message into `<message>_files/`.
#[derive(Debug)]
pub struct PickupDirectoryTransport {
    directory: PathBuf,
    default_from: String,
    sequence: AtomicU64,
}

impl PickupDirectoryTransport {
    pub fn new(directory: impl Into<PathBuf>, default_from: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            default_from: default_from.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn next_stem(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!(
            "{}-{}-{:04}",
            Local::now().format("%Y%m%d%H%M%S%3f"),
            std::process::id(),
            n
        )
    }
}

#[async_trait]
impl MailTransport for PickupDirectoryTransport {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        message.validate()?;
        tokio::fs::create_dir_all(&self.directory).await?;

        let stem = self.next_stem();
        if !message.attachments.is_empty() {
            let files = self.directory.join(format!("{}_files", stem));
            tokio::fs::create_dir_all(&files).await?;
            for attachment in &message.attachments {
                let Some(name) = attachment.file_name() else {
                    warn!(path = %attachment.display(), "skipping attachment without a file name");
                    continue;
                };
                if let Err(e) = tokio::fs::copy(attachment, files.join(name)).await {
                    warn!(path = %attachment.display(), error = %e, "error adding attachment");
                }
            }
        }

        let path = self.directory.join(format!("{}.eml", stem));
        tokio::fs::write(&path, message.to_rfc822(&self.default_from)).await?;
        info!(path = %path.display(), subject = %message.subject, "email queued");
        debug!(recipients = message.to.len() + message.cc.len() + message.bcc.len());
        Ok(())
    }
}
