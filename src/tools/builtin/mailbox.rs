//! Mailbox tools: list recent mail, trash, archive.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::TurnContext;
use crate::mailbox::{EmailSummary, Mailbox};
use crate::tools::tool::{Tool, ToolError, ToolOutput, optional_u32, require_str};

const DEFAULT_DAYS: u32 = 3;
const DEFAULT_MAX_RESULTS: u32 = 20;
const SNIPPET_PREVIEW_CHARS: usize = 100;

/// List recent inbox messages.
pub struct FetchInboxEmailsTool {
    mailbox: Arc<dyn Mailbox>,
}

impl FetchInboxEmailsTool {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self { mailbox }
    }
}

#[async_trait]
impl Tool for FetchInboxEmailsTool {
    fn name(&self) -> &str {
        "fetch_inbox_emails"
    }

    fn description(&self) -> &str {
        "Fetch recent emails from the inbox (promotions and social tabs excluded). \
         Returns id, sender, subject, received date and a snippet for each message."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "days": {
                    "type": "integer",
                    "description": "Number of days to look back (default: 3)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of emails to fetch (default: 20)"
                }
            }
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &TurnContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let days = optional_u32(&params, "days", DEFAULT_DAYS)?;
        let max_results = optional_u32(&params, "max_results", DEFAULT_MAX_RESULTS)?;

        let emails = self.mailbox.fetch_recent(days, max_results).await?;
        tracing::debug!(days, max_results, found = emails.len(), "Fetched inbox");
        Ok(ToolOutput::text(format_listing(&emails), start.elapsed()))
    }
}

fn format_listing(emails: &[EmailSummary]) -> String {
    if emails.is_empty() {
        return "No emails found.".to_string();
    }

    let mut out = format!("Found {} emails:\n\n", emails.len());
    for (i, email) in emails.iter().enumerate() {
        let preview: String = email.snippet.chars().take(SNIPPET_PREVIEW_CHARS).collect();
        let _ = write!(
            out,
            "{}. ID: {}\n   From: {}\n   Subject: {}\n   Date: {}\n   Snippet: {}...\n\n",
            i + 1,
            email.id,
            email.sender,
            email.subject,
            email.date,
            preview
        );
    }
    out
}

/// Move one message to the trash.
pub struct TrashEmailTool {
    mailbox: Arc<dyn Mailbox>,
}

impl TrashEmailTool {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self { mailbox }
    }
}

#[async_trait]
impl Tool for TrashEmailTool {
    fn name(&self) -> &str {
        "trash_email"
    }

    fn description(&self) -> &str {
        "Move an email to the trash."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        email_id_schema()
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &TurnContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let id = require_str(&params, "email_id")?;
        self.mailbox
            .move_to_trash(id)
            .await
            .map_err(|e| {
                ToolError::ExternalService(format!("Failed to trash email {}: {}", id, e))
            })?;
        Ok(ToolOutput::text(
            format!("Email {} moved to trash.", id),
            start.elapsed(),
        ))
    }
}

/// Remove one message from the inbox.
pub struct ArchiveEmailTool {
    mailbox: Arc<dyn Mailbox>,
}

impl ArchiveEmailTool {
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self { mailbox }
    }
}

#[async_trait]
impl Tool for ArchiveEmailTool {
    fn name(&self) -> &str {
        "archive_email"
    }

    fn description(&self) -> &str {
        "Archive an email (remove it from the inbox without deleting it)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        email_id_schema()
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &TurnContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let id = require_str(&params, "email_id")?;
        self.mailbox.archive(id).await.map_err(|e| {
            ToolError::ExternalService(format!("Failed to archive email {}: {}", id, e))
        })?;
        Ok(ToolOutput::text(format!("Email {} archived.", id), start.elapsed()))
    }
}

fn email_id_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "email_id": {
                "type": "string",
                "description": "The Gmail message ID"
            }
        },
        "required": ["email_id"]
    })
}

/// The three mailbox tools, in the order they are offered to the model.
pub fn mailbox_tools(mailbox: Arc<dyn Mailbox>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(FetchInboxEmailsTool::new(Arc::clone(&mailbox))),
        Arc::new(TrashEmailTool::new(Arc::clone(&mailbox))),
        Arc::new(ArchiveEmailTool::new(mailbox)),
    ]
}
