//! Chat service: lazily builds the agent, then runs turns against it.

use std::sync::Arc;

use crate::agent::builder::{AgentDescriptor, AgentFactory};
use crate::agent::guard::{InitGuard, InitState};
use crate::agent::runner::ConversationRunner;
use crate::agent::turn::{TurnOutcome, run_turn};
use crate::error::{ChatError, InitError};

pub struct ChatService {
    guard: InitGuard<AgentDescriptor>,
    factory: Arc<dyn AgentFactory>,
    runner: Arc<dyn ConversationRunner>,
    default_session: String,
}

impl ChatService {
    pub fn new(
        factory: Arc<dyn AgentFactory>,
        runner: Arc<dyn ConversationRunner>,
        default_session: impl Into<String>,
    ) -> Self {
        Self {
            guard: InitGuard::new(),
            factory,
            runner,
            default_session: default_session.into(),
        }
    }

    /// The agent, built on first use.
    pub async fn agent(&self) -> Result<Arc<AgentDescriptor>, InitError> {
        self.guard.ensure_ready(|| self.factory.build()).await
    }

    pub fn is_initialized(&self) -> bool {
        self.guard.is_ready()
    }

    pub fn init_state(&self) -> InitState {
        self.guard.state()
    }

    pub fn default_session(&self) -> &str {
        &self.default_session
    }

    /// Run one turn. `session_id` falls back to the default session.
    pub async fn chat(
        &self,
        session_id: Option<&str>,
        message: &str,
    ) -> Result<TurnOutcome, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let agent = self.agent().await?;
        let session_id = session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default_session.as_str());
        Ok(run_turn(self.runner.as_ref(), agent, session_id, message).await?)
    }

    /// Drop the built agent so the next request rebuilds it.
    pub async fn reset(&self) {
        self.guard.reset().await;
    }
}
