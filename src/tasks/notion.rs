//! Notion database task tracker.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use super::{CreatedTask, TaskMetadata, TaskTracker};
use crate::error::TaskError;

const DEFAULT_API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion rejects rich-text objects longer than this.
const MAX_RICH_TEXT_CHARS: usize = 2000;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.\-+]+@[\w.\-]+").expect("email pattern is valid"));

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_key: Option<SecretString>,
    pub database_id: Option<String>,
    pub api_base: String,
}

impl NotionConfig {
    /// Read `NOTION_API_KEY` and `NOTION_DATABASE_ID` from the environment.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("NOTION_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            database_id: std::env::var("NOTION_DATABASE_ID")
                .ok()
                .filter(|d| !d.is_empty()),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

pub struct NotionTaskTracker {
    client: Client,
    config: NotionConfig,
}

impl NotionTaskTracker {
    pub fn new(config: NotionConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }
}

#[async_trait]
impl TaskTracker for NotionTaskTracker {
    async fn create_task(
        &self,
        title: &str,
        description: &str,
        metadata: &TaskMetadata,
    ) -> Result<CreatedTask, TaskError> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| TaskError::NotConfigured("NOTION_API_KEY is not set".to_string()))?;
        let database_id = self.config.database_id.as_deref().ok_or_else(|| {
            TaskError::NotConfigured("NOTION_DATABASE_ID is not set".to_string())
        })?;

        let body = page_request(database_id, title, description, metadata);
        let url = format!("{}/pages", self.config.api_base.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskError::Request(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            // Notion error bodies carry a human-readable "message".
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or(text);
            return Err(TaskError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let page: Value = serde_json::from_str(&text)
            .map_err(|e| TaskError::Request(format!("invalid JSON from Notion: {}", e)))?;
        let created = CreatedTask {
            id: page["id"].as_str().unwrap_or_default().to_string(),
            url: page["url"].as_str().unwrap_or_default().to_string(),
        };
        tracing::info!(task_id = %created.id, title = %title, "Notion task created");
        Ok(created)
    }
}

/// Address part of a sender such as `Jane <jane@x.com>`; the input itself if
/// no address is found.
pub fn extract_email(sender: &str) -> &str {
    EMAIL_RE.find(sender).map(|m| m.as_str()).unwrap_or(sender)
}

fn rich_text(content: &str) -> Value {
    let chars: Vec<char> = content.chars().collect();
    let chunks: Vec<Value> = if chars.is_empty() {
        vec![json!({"type": "text", "text": {"content": ""}})]
    } else {
        chars
            .chunks(MAX_RICH_TEXT_CHARS)
            .map(|chunk| {
                json!({"type": "text", "text": {"content": chunk.iter().collect::<String>()}})
            })
            .collect()
    };
    Value::Array(chunks)
}

/// Body of a `POST /pages` request creating a row in `database_id`.
fn page_request(
    database_id: &str,
    title: &str,
    description: &str,
    metadata: &TaskMetadata,
) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("Task".to_string(), json!({ "title": rich_text(title) }));

    let non_empty = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(sender) = non_empty(&metadata.sender) {
        properties.insert(
            "Sender".to_string(),
            json!({ "email": extract_email(&sender) }),
        );
    }
    if let Some(action) = non_empty(&metadata.action_item) {
        properties.insert(
            "Action Item".to_string(),
            json!({ "rich_text": rich_text(&action) }),
        );
    }
    if let Some(due) = non_empty(&metadata.due_date) {
        properties.insert("Due Date".to_string(), json!({ "date": { "start": due } }));
    }
    if let Some(received) = non_empty(&metadata.received_on) {
        properties.insert(
            "Received On".to_string(),
            json!({ "date": { "start": received } }),
        );
    }

    json!({
        "parent": { "database_id": database_id },
        "properties": properties,
        "children": [{
            "object": "block",
            "type": "paragraph",
            "paragraph": { "rich_text": rich_text(description) }
        }]
    })
}
