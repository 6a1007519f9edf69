//! Task-tracking collaborator.

pub mod notion;

pub use notion::{NotionConfig, NotionTaskTracker};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Optional details attached to a follow-up task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Sender as it appeared in the email, e.g. `Name <a@b.c>`.
    pub sender: Option<String>,
    pub action_item: Option<String>,
    /// `YYYY-MM-DD`.
    pub due_date: Option<String>,
    /// `YYYY-MM-DD`.
    pub received_on: Option<String>,
}

/// A task that was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTask {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait TaskTracker: Send + Sync {
    async fn create_task(
        &self,
        title: &str,
        description: &str,
        metadata: &TaskMetadata,
    ) -> Result<CreatedTask, TaskError>;
}
