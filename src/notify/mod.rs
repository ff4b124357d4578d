//! Outgoing e-mail.
//!
//! Delivery is best effort: [`dispatch`] hands a message to the configured
//! [`Mailer`] on a blocking thread and only logs failures, so a broken mail
//! setup never fails the request that triggered it.

use crate::config::MailConfig;
use crate::error::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

/// Something that can deliver an [`Email`]. Implementations may block.
pub trait Mailer: Send + Sync {
    fn send(&self, email: &Email) -> Result<()>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &Email) -> Result<()> {
        info!(
            to = %email.to,
            subject = %email.subject,
            "Outgoing mail: {}",
            email.text
        );
        Ok(())
    }
}

/// Drops one `.eml` file per message into a directory, for a local MTA or
/// a human to pick up
#[derive(Debug, Clone)]
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn render(email: &Email) -> String {
        let mut message = format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nMIME-Version: 1.0\r\n",
            email.from,
            email.to,
            email.subject,
            Utc::now().to_rfc2822()
        );

        match &email.html {
            None => {
                message.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
                message.push_str(&email.text);
                message.push_str("\r\n");
            }
            Some(html) => {
                let boundary = uuid::Uuid::new_v4().simple().to_string();
                message.push_str(&format!(
                    "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\r\n"
                ));
                message.push_str(&format!(
                    "--{boundary}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}\r\n",
                    email.text
                ));
                message.push_str(&format!(
                    "--{boundary}\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{html}\r\n"
                ));
                message.push_str(&format!("--{boundary}--\r\n"));
            }
        }

        message
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, email: &Email) -> Result<()> {
        let name = format!(
            "{}-{}.eml",
            Utc::now().format("%Y%m%d%H%M%S"),
            uuid::Uuid::new_v4().simple()
        );
        let path = self.dir.join(name);
        std::fs::write(&path, Self::render(email))?;
        debug!("Mail to {} written to {:?}", email.to, path);
        Ok(())
    }
}

/// Pick the mailer the configuration asks for
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match &config.outbox_dir {
        Some(dir) => {
            info!("Mail outbox: {:?}", dir);
            Ok(Arc::new(OutboxMailer::new(dir)?))
        }
        None => {
            info!("No mail outbox configured, outgoing mail is only logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Send in the background. Failures are logged and otherwise ignored.
pub fn dispatch(mailer: Arc<dyn Mailer>, email: Email) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = mailer.send(&email) {
            warn!("Failed to send mail to {}: {}", email.to, e.log_safe());
        }
    })
}

/// The message a question author receives when someone answers
pub fn new_answer_email(
    config: &MailConfig,
    to: &str,
    question_title: &str,
    question_url: &str,
) -> Email {
    Email {
        from: config.from.clone(),
        to: to.to_string(),
        subject: "New answer to your question".to_string(),
        text: format!("Link: {question_url}"),
        html: Some(format!(
            "Link: <a href=\"{question_url}\">{}</a>",
            escape_html(question_title)
        )),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
