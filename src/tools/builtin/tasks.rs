//! Follow-up task creation (served by the task provider binary).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::TurnContext;
use crate::tasks::{TaskMetadata, TaskTracker};
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

pub struct CreateTaskTool {
    tracker: Arc<dyn TaskTracker>,
}

impl CreateTaskTool {
    pub fn new(tracker: Arc<dyn TaskTracker>) -> Self {
        Self { tracker }
    }
}

fn optional_string(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn name(&self) -> &str {
        "create_notion_task"
    }

    fn description(&self) -> &str {
        "Create a new task in the Notion database with detailed metadata. The description \
         becomes the page content; sender, action item and dates fill the matching columns."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Title of the task"
                },
                "description": {
                    "type": "string",
                    "description": "Details for the task, added as page content"
                },
                "sender": {
                    "type": "string",
                    "description": "Sender of the email"
                },
                "action_item": {
                    "type": "string",
                    "description": "The specific action required"
                },
                "due_date": {
                    "type": "string",
                    "description": "Due date, YYYY-MM-DD"
                },
                "received_on": {
                    "type": "string",
                    "description": "Date the email was received, YYYY-MM-DD"
                }
            },
            "required": ["title"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &TurnContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let title = require_str(&params, "title")?;
        let description = optional_string(&params, "description").unwrap_or_default();
        let metadata = TaskMetadata {
            sender: optional_string(&params, "sender"),
            action_item: optional_string(&params, "action_item"),
            due_date: optional_string(&params, "due_date"),
            received_on: optional_string(&params, "received_on"),
        };

        let created = self
            .tracker
            .create_task(title, &description, &metadata)
            .await
            .map_err(|e| ToolError::ExternalService(format!("Error creating Notion task: {}", e)))?;

        Ok(ToolOutput::text(
            format!(
                "Successfully created Notion task: {}\nURL: {}",
                title, created.url
            ),
            start.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::TaskError;
    use crate::tasks::CreatedTask;

    #[derive(Default)]
    struct RecordingTracker {
        seen: Mutex<Vec<(String, String, TaskMetadata)>>,
        fail: bool,
    }

    #[async_trait]
    impl TaskTracker for RecordingTracker {
        async fn create_task(
            &self,
            title: &str,
            description: &str,
            metadata: &TaskMetadata,
        ) -> Result<CreatedTask, TaskError> {
            if self.fail {
                return Err(TaskError::Api {
                    status: 400,
                    message: "Sender is expected to be email".to_string(),
                });
            }
            self.seen.lock().unwrap().push((
                title.to_string(),
                description.to_string(),
                metadata.clone(),
            ));
            Ok(CreatedTask {
                id: "page-1".to_string(),
                url: "https://www.notion.so/page-1".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn creates_task_with_metadata() {
        let tracker = Arc::new(RecordingTracker::default());
        let tool = CreateTaskTool::new(tracker.clone());

        let out = tool
            .execute(
                serde_json::json!({
                    "title": "Review Q1 report",
                    "description": "Numbers attached",
                    "sender": "Boss <boss@work.com>",
                    "due_date": "2025-03-14",
                    "received_on": ""
                }),
                &TurnContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(
            out.to_model_text(),
            "Successfully created Notion task: Review Q1 report\nURL: https://www.notion.so/page-1"
        );
        let seen = tracker.seen.lock().unwrap();
        let (title, description, metadata) = &seen[0];
        assert_eq!(title, "Review Q1 report");
        assert_eq!(description, "Numbers attached");
        assert_eq!(metadata.sender.as_deref(), Some("Boss <boss@work.com>"));
        assert_eq!(metadata.due_date.as_deref(), Some("2025-03-14"));
        assert_eq!(metadata.received_on, None);
    }

    #[tokio::test]
    async fn tracker_failure_is_reported() {
        let tool = CreateTaskTool::new(Arc::new(RecordingTracker {
            fail: true,
            ..Default::default()
        }));
        let err = tool
            .execute(serde_json::json!({"title": "x"}), &TurnContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Error creating Notion task"));
    }
}
