//! Mailbox collaborator: recent-message listing and per-message actions.

pub mod gmail;

pub use gmail::{GmailConfig, GmailMailbox};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MailboxError;

/// Longest body kept per message, in characters.
pub const MAX_BODY_CHARS: usize = 2000;

/// One message as seen by the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub date: String,
    pub snippet: String,
    pub body: String,
}

/// Read and act on the user's inbox.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Messages received within the last `window_days`, at most `limit`.
    async fn fetch_recent(
        &self,
        window_days: u32,
        limit: u32,
    ) -> Result<Vec<EmailSummary>, MailboxError>;

    /// Move a message to the trash.
    async fn move_to_trash(&self, id: &str) -> Result<(), MailboxError>;

    /// Remove a message from the inbox without deleting it.
    async fn archive(&self, id: &str) -> Result<(), MailboxError>;
}
