//! Scripted model and agent helpers shared by the agent tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::agent::AgentDescriptor;
use crate::error::LlmError;
use crate::llm::{LlmProvider, ToolCall, ToolCompletionRequest, ToolCompletionResponse};
use crate::tools::{Tool, ToolCatalog};

/// Model that replays canned responses and records every request.
#[derive(Default)]
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ToolCompletionResponse, LlmError>>>,
    pub requests: Mutex<Vec<ToolCompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<ToolCompletionResponse, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

pub(crate) fn text_reply(text: &str) -> Result<ToolCompletionResponse, LlmError> {
    Ok(ToolCompletionResponse {
        content: Some(text.to_string()),
        tool_calls: Vec::new(),
        input_tokens: 10,
        output_tokens: 5,
    })
}

pub(crate) fn tool_reply(
    text: Option<&str>,
    calls: &[(&str, &str, serde_json::Value)],
) -> Result<ToolCompletionResponse, LlmError> {
    Ok(ToolCompletionResponse {
        content: text.map(str::to_string),
        tool_calls: calls
            .iter()
            .map(|(id, name, args)| ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args.clone(),
            })
            .collect(),
        input_tokens: 10,
        output_tokens: 5,
    })
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(LlmError::InvalidResponse {
                provider: "scripted".into(),
                reason: "script exhausted".into(),
            })
        })
    }
}

pub(crate) fn descriptor_with(
    model: Arc<ScriptedModel>,
    tools: Vec<Arc<dyn Tool>>,
    max_iterations: usize,
) -> AgentDescriptor {
    AgentDescriptor {
        name: "DigitalDeclutter".to_string(),
        model,
        instruction: "Triage the inbox.".to_string(),
        catalog: Arc::new(ToolCatalog::new(tools)),
        max_iterations,
    }
}

pub(crate) fn agent_with(
    model: Arc<ScriptedModel>,
    tools: Vec<Arc<dyn Tool>>,
    max_iterations: usize,
) -> Arc<AgentDescriptor> {
    Arc::new(descriptor_with(model, tools, max_iterations))
}
