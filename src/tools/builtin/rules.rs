//! Rule store accessors exposed to the model.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::TurnContext;
use crate::rules::{RuleStore, TriageRule};
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

/// Look up the saved rule for one sender.
pub struct GetUserRulesTool {
    store: Arc<RuleStore>,
}

impl GetUserRulesTool {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetUserRulesTool {
    fn name(&self) -> &str {
        "get_user_rules"
    }

    fn description(&self) -> &str {
        "Check whether there is a saved rule for a specific sender. Returns the rule \
         (always_important, always_archive, always_trash, promotional) or 'no_rule'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sender": {
                    "type": "string",
                    "description": "Email address or display name of the sender"
                }
            },
            "required": ["sender"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &TurnContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let sender = require_str(&params, "sender")?;
        let answer = self
            .store
            .get(sender)
            .map(|rule| rule.as_str())
            .unwrap_or("no_rule");
        Ok(ToolOutput::text(answer, start.elapsed()))
    }
}

/// Save (or overwrite) the rule for a sender.
pub struct SaveUserRuleTool {
    store: Arc<RuleStore>,
}

impl SaveUserRuleTool {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveUserRuleTool {
    fn name(&self) -> &str {
        "save_user_rule"
    }

    fn description(&self) -> &str {
        "Save a rule for a specific sender so future triage applies it automatically. \
         Use when the user says a sender is always important, promotional, or spam."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let rules: Vec<&str> = TriageRule::ALL.iter().map(|r| r.as_str()).collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "sender": {
                    "type": "string",
                    "description": "Email address or display name of the sender"
                },
                "rule": {
                    "type": "string",
                    "enum": rules,
                    "description": "How emails from this sender should be treated"
                }
            },
            "required": ["sender", "rule"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &TurnContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let sender = require_str(&params, "sender")?;
        let rule: TriageRule = require_str(&params, "rule")?
            .parse()
            .map_err(|e: crate::rules::UnknownRule| ToolError::InvalidParameters(e.to_string()))?;

        self.store.set(sender, rule)?;
        tracing::info!(
            turn_id = %ctx.turn_id,
            sender = %sender,
            rule = %rule,
            "Sender rule saved"
        );

        Ok(ToolOutput::text(
            format!(
                "Rule saved: Emails from '{}' will be treated as '{}'.",
                sender, rule
            ),
            start.elapsed(),
        ))
    }
}

/// List every saved rule.
pub struct GetAllRulesTool {
    store: Arc<RuleStore>,
}

impl GetAllRulesTool {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetAllRulesTool {
    fn name(&self) -> &str {
        "get_all_rules"
    }

    fn description(&self) -> &str {
        "Return all saved sender rules. Call this at the start of a triage session \
         to apply the user's preferences."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        _ctx: &TurnContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let rules = self.store.list_all();
        if rules.is_empty() {
            return Ok(ToolOutput::text("No rules saved yet.", start.elapsed()));
        }

        let listing: String = rules
            .iter()
            .map(|(sender, rule)| format!("- {}: {}\n", sender, rule))
            .collect();
        Ok(ToolOutput::text(
            format!("Current Rules:\n{}", listing.trim_end()),
            start.elapsed(),
        ))
    }
}

/// The three rule tools, in the order they are offered to the model.
pub fn rule_tools(store: Arc<RuleStore>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetUserRulesTool::new(Arc::clone(&store))),
        Arc::new(SaveUserRuleTool::new(Arc::clone(&store))),
        Arc::new(GetAllRulesTool::new(store)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Arc<RuleStore> {
        Arc::new(RuleStore::load(dir.path().join("preferences.json")))
    }

    #[tokio::test]
    async fn unknown_sender_has_no_rule() {
        let dir = TempDir::new().unwrap();
        let tool = GetUserRulesTool::new(store(&dir));
        let out = tool
            .execute(serde_json::json!({"sender": "a@x.com"}), &TurnContext::default())
            .await
            .unwrap();
        assert_eq!(out.to_model_text(), "no_rule");
    }

    #[tokio::test]
    async fn save_then_lookup() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let ctx = TurnContext::default();

        let saved = SaveUserRuleTool::new(Arc::clone(&store))
            .execute(
                serde_json::json!({"sender": "deals@shop.com", "rule": "promotional"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(
            saved.to_model_text(),
            "Rule saved: Emails from 'deals@shop.com' will be treated as 'promotional'."
        );

        let found = GetUserRulesTool::new(Arc::clone(&store))
            .execute(serde_json::json!({"sender": "deals@shop.com"}), &ctx)
            .await
            .unwrap();
        assert_eq!(found.to_model_text(), "promotional");
    }

    #[tokio::test]
    async fn save_rejects_unknown_rule() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let err = SaveUserRuleTool::new(Arc::clone(&store))
            .execute(
                serde_json::json!({"sender": "a@x.com", "rule": "always_delete"}),
                &TurnContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_all_rules() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let tool = GetAllRulesTool::new(Arc::clone(&store));
        let ctx = TurnContext::default();

        let empty = tool.execute(serde_json::json!({}), &ctx).await.unwrap();
        assert_eq!(empty.to_model_text(), "No rules saved yet.");

        store.set("b@x.com", TriageRule::AlwaysTrash).unwrap();
        store.set("a@x.com", TriageRule::AlwaysImportant).unwrap();
        let listed = tool.execute(serde_json::json!({}), &ctx).await.unwrap();
        assert_eq!(
            listed.to_model_text(),
            "Current Rules:\n- a@x.com: always_important\n- b@x.com: always_trash"
        );
    }

    #[test]
    fn rule_tools_order() {
        let dir = TempDir::new().unwrap();
        let names: Vec<String> = rule_tools(store(&dir))
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, ["get_user_rules", "save_user_rule", "get_all_rules"]);
    }
}
