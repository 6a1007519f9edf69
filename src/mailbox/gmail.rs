//! Gmail REST mailbox.
//!
//! Authenticates with a previously authorized OAuth token file (the format
//! Google's client libraries write). An expired access token is refreshed with
//! the stored refresh token and the file is rewritten. The interactive consent
//! flow is out of scope: a missing token file is reported as
//! `MailboxError::NotConfigured`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Local, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{EmailSummary, MAX_BODY_CHARS, Mailbox};
use crate::error::MailboxError;

const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Gmail sends unpadded base64url; accept both forms.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Where to find credentials and which endpoint to talk to.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub token_path: PathBuf,
    pub api_base: String,
}

impl GmailConfig {
    pub fn new(token_path: impl Into<PathBuf>) -> Self {
        Self {
            token_path: token_path.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Token file contents. Unknown fields are carried through rewrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl StoredToken {
    /// A token without a parseable expiry is assumed valid until the API
    /// rejects it.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .as_deref()
            .and_then(parse_expiry)
            .is_some_and(|exp| exp - chrono::Duration::seconds(EXPIRY_SKEW_SECS) <= now)
    }
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // google-auth token files store naive UTC timestamps.
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Gmail-backed `Mailbox`.
pub struct GmailMailbox {
    client: Client,
    config: GmailConfig,
    token: Mutex<Option<StoredToken>>,
}

impl GmailMailbox {
    pub fn new(config: GmailConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            config,
            token: Mutex::new(None),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Current access token, loading and refreshing as needed.
    async fn access_token(&self) -> Result<String, MailboxError> {
        let mut cached = self.token.lock().await;

        let mut token = match cached.take() {
            Some(token) => token,
            None => self.load_token().await?,
        };

        if token.is_expired(Utc::now()) {
            token = self.refresh(token).await?;
        }

        let access = token.token.clone();
        *cached = Some(token);
        Ok(access)
    }

    async fn load_token(&self) -> Result<StoredToken, MailboxError> {
        let path = &self.config.token_path;
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MailboxError::NotConfigured(format!(
                    "token file {} not found; authorize Gmail access first",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(MailboxError::Auth(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| MailboxError::Auth(format!("malformed token file: {}", e)))
    }

    async fn refresh(&self, mut token: StoredToken) -> Result<StoredToken, MailboxError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            token.refresh_token.clone(),
            token.client_id.clone(),
            token.client_secret.clone(),
        ) else {
            return Err(MailboxError::Auth(
                "access token expired and no refresh credentials are stored".to_string(),
            ));
        };
        let token_uri = token
            .token_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        tracing::info!("Refreshing Gmail access token");
        let response = self
            .client
            .post(&token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MailboxError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailboxError::Auth(format!(
                "token refresh failed with HTTP {}: {}",
                status, body
            )));
        }
        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| MailboxError::Auth(format!("bad refresh response: {}", e)))?;

        token.token = refreshed.access_token;
        token.expiry = refreshed
            .expires_in
            .map(|secs| (Utc::now() + chrono::Duration::seconds(secs)).to_rfc3339());

        if let Err(e) = self.save_token(&token).await {
            tracing::warn!(error = %e, "Could not persist refreshed Gmail token");
        }
        Ok(token)
    }

    async fn save_token(&self, token: &StoredToken) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(token).map_err(std::io::Error::other)?;
        tokio::fs::write(&self.config.token_path, json).await
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, MailboxError> {
        let access = self.access_token().await?;
        let response = self
            .client
            .get(self.api_url(path))
            .bearer_auth(access)
            .query(query)
            .send()
            .await
            .map_err(|e| MailboxError::Request(e.to_string()))?;
        read_json(response).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, MailboxError> {
        let access = self.access_token().await?;
        let response = self
            .client
            .post(self.api_url(path))
            .bearer_auth(access)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailboxError::Request(e.to_string()))?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, MailboxError> {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if status.as_u16() == 401 {
        return Err(MailboxError::Auth(text));
    }
    if !status.is_success() {
        return Err(MailboxError::Api {
            status: status.as_u16(),
            message: text,
        });
    }
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| MailboxError::Request(format!("invalid JSON: {}", e)))
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn fetch_recent(
        &self,
        window_days: u32,
        limit: u32,
    ) -> Result<Vec<EmailSummary>, MailboxError> {
        let query = recent_query(Local::now(), window_days);
        tracing::debug!(query = %query, limit, "Listing Gmail messages");

        let listing = self
            .get_json(
                "messages",
                &[("q", query), ("maxResults", limit.to_string())],
            )
            .await?;

        let ids: Vec<String> = listing
            .get("messages")
            .and_then(|m| m.as_array())
            .map(|msgs| {
                msgs.iter()
                    .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut emails = Vec::with_capacity(ids.len());
        for id in ids {
            let detail = self
                .get_json(&format!("messages/{}", id), &[("format", "full".to_string())])
                .await?;
            emails.push(parse_message(&id, &detail));
        }
        Ok(emails)
    }

    async fn move_to_trash(&self, id: &str) -> Result<(), MailboxError> {
        self.post_json(&format!("messages/{}/trash", id), serde_json::json!({}))
            .await?;
        tracing::info!(message_id = %id, "Message moved to trash");
        Ok(())
    }

    async fn archive(&self, id: &str) -> Result<(), MailboxError> {
        self.post_json(
            &format!("messages/{}/modify", id),
            serde_json::json!({ "removeLabelIds": ["INBOX"] }),
        )
        .await?;
        tracing::info!(message_id = %id, "Message archived");
        Ok(())
    }
}

/// Search query for the last `days` days, skipping promotions and social.
fn recent_query(now: DateTime<Local>, days: u32) -> String {
    let after = now - chrono::Duration::days(i64::from(days));
    format!(
        "after:{} -category:promotions -category:social",
        after.format("%Y/%m/%d")
    )
}

/// Convert a `format=full` message resource into a summary.
fn parse_message(id: &str, detail: &serde_json::Value) -> EmailSummary {
    let payload = detail.get("payload").cloned().unwrap_or_default();
    let header = |name: &str, default: &str| -> String {
        payload
            .get("headers")
            .and_then(|h| h.as_array())
            .and_then(|headers| {
                headers.iter().find(|h| {
                    h.get("name")
                        .and_then(|n| n.as_str())
                        .is_some_and(|n| n.eq_ignore_ascii_case(name))
                })
            })
            .and_then(|h| h.get("value"))
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    };

    let snippet = detail
        .get("snippet")
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_string();
    let body = plain_text_body(&payload).unwrap_or_else(|| snippet.clone());

    EmailSummary {
        id: id.to_string(),
        subject: header("Subject", "No Subject"),
        sender: header("From", "Unknown Sender"),
        date: header("Date", "Unknown Date"),
        snippet,
        body: body.chars().take(MAX_BODY_CHARS).collect(),
    }
}

/// First `text/plain` body in the part tree, depth first.
fn plain_text_body(part: &serde_json::Value) -> Option<String> {
    if let Some(parts) = part.get("parts").and_then(|p| p.as_array()) {
        return parts.iter().find_map(|child| {
            let mime = child.get("mimeType").and_then(|m| m.as_str());
            if mime == Some("text/plain") {
                decode_body(child)
            } else {
                plain_text_body(child)
            }
        });
    }
    decode_body(part)
}

fn decode_body(part: &serde_json::Value) -> Option<String> {
    let data = part.get("body")?.get("data")?.as_str()?;
    let bytes = URL_SAFE_LENIENT.decode(data).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
