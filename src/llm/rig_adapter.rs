//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::OneOrMany;
use rig::completion::{CompletionError, CompletionModel, ToolDefinition as RigToolDefinition};
use rig::message::{AssistantContent, Message, ToolResultContent, UserContent};
use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::costs;
use crate::llm::provider::{
    ChatMessage, LlmProvider, Role, ToolCall, ToolChoice, ToolCompletionRequest,
    ToolCompletionResponse,
};

const PROVIDER: &str = "gemini";

/// Adapter that runs our requests through a rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        costs::model_costs(&self.model_name)
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let conversation = split_conversation(request.messages)?;

        let mut builder = self
            .model
            .completion_request(conversation.prompt)
            .messages(conversation.history);
        if let Some(preamble) = conversation.preamble {
            builder = builder.preamble(preamble);
        }
        // Withholding the tools is the portable way to force a text answer.
        if request.tool_choice == ToolChoice::Auto && !request.tools.is_empty() {
            builder = builder.tools(
                request
                    .tools
                    .into_iter()
                    .map(|t| RigToolDefinition {
                        name: t.name,
                        description: t.description,
                        parameters: t.parameters,
                    })
                    .collect(),
            );
        }

        let response = builder.send().await.map_err(map_completion_error)?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for item in response.choice.into_iter() {
            match item {
                AssistantContent::Text(t) => text.push_str(&t.text),
                AssistantContent::ToolCall(call) => tool_calls.push(ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                }),
                _ => {}
            }
        }

        Ok(ToolCompletionResponse {
            content: (!text.is_empty()).then_some(text),
            tool_calls,
            input_tokens: saturate(response.usage.input_tokens),
            output_tokens: saturate(response.usage.output_tokens),
        })
    }
}

fn saturate(tokens: u64) -> u32 {
    u32::try_from(tokens).unwrap_or(u32::MAX)
}

/// A conversation in the shape rig's request builder wants.
struct RigConversation {
    preamble: Option<String>,
    history: Vec<Message>,
    prompt: Message,
}

/// Split our flat message list into preamble, history, and final prompt.
///
/// System messages are joined into the preamble. Consecutive tool results
/// are grouped into one user message so each assistant call batch is
/// answered in a single reply.
fn split_conversation(messages: Vec<ChatMessage>) -> Result<RigConversation, LlmError> {
    let mut preamble: Vec<String> = Vec::new();
    let mut converted: Vec<Message> = Vec::new();
    let mut pending_results: Vec<UserContent> = Vec::new();

    for msg in messages {
        if msg.role != Role::Tool {
            flush_results(&mut pending_results, &mut converted);
        }
        match msg.role {
            Role::System => preamble.push(msg.content),
            Role::User => converted.push(Message::user(msg.content)),
            Role::Assistant => converted.push(assistant_message(msg)),
            Role::Tool => {
                let id = msg.tool_call_id.or(msg.name).unwrap_or_default();
                pending_results.push(UserContent::tool_result(
                    id,
                    OneOrMany::one(ToolResultContent::text(msg.content)),
                ));
            }
        }
    }
    flush_results(&mut pending_results, &mut converted);

    let prompt = converted.pop().ok_or_else(|| LlmError::InvalidRequest {
        provider: PROVIDER.to_string(),
        reason: "conversation has no user or tool message".to_string(),
    })?;

    Ok(RigConversation {
        preamble: (!preamble.is_empty()).then(|| preamble.join("\n\n")),
        history: converted,
        prompt,
    })
}

fn flush_results(pending: &mut Vec<UserContent>, out: &mut Vec<Message>) {
    if let Ok(content) = OneOrMany::many(std::mem::take(pending)) {
        out.push(Message::User { content });
    }
}

fn assistant_message(msg: ChatMessage) -> Message {
    let mut parts = Vec::new();
    if !msg.content.is_empty() {
        parts.push(AssistantContent::text(msg.content));
    }
    for call in msg.tool_calls.unwrap_or_default() {
        parts.push(AssistantContent::tool_call(call.id, call.name, call.arguments));
    }
    match OneOrMany::many(parts) {
        Ok(content) => Message::Assistant { id: None, content },
        Err(_) => Message::assistant(""),
    }
}

fn map_completion_error(err: CompletionError) -> LlmError {
    match err {
        CompletionError::ProviderError(body) => classify_provider_error(&body),
        CompletionError::HttpError(e) => LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        },
        other => LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Map a provider error body to an error kind.
///
/// Gemini reports `{"error": {"code": 400, "status": "INVALID_ARGUMENT"}}`;
/// bodies that are not JSON fall back to the status words they contain.
pub(crate) fn classify_provider_error(body: &str) -> LlmError {
    let code = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/code").and_then(|c| c.as_u64()));
    let upper = body.to_ascii_uppercase();
    let provider = PROVIDER.to_string();

    match code {
        Some(429) => LlmError::RateLimited {
            provider,
            retry_after: None,
        },
        Some(401 | 403) => LlmError::AuthFailed { provider },
        Some(400..=499) => LlmError::InvalidRequest {
            provider,
            reason: body.to_string(),
        },
        Some(_) => LlmError::RequestFailed {
            provider,
            reason: body.to_string(),
        },
        None if upper.contains("RESOURCE_EXHAUSTED") => LlmError::RateLimited {
            provider,
            retry_after: None,
        },
        None if upper.contains("UNAUTHENTICATED") || upper.contains("PERMISSION_DENIED") => {
            LlmError::AuthFailed { provider }
        }
        None if upper.contains("INVALID_ARGUMENT")
            || upper.contains("NOT_FOUND")
            || upper.contains("FAILED_PRECONDITION") =>
        {
            LlmError::InvalidRequest {
                provider,
                reason: body.to_string(),
            }
        }
        None => LlmError::RequestFailed {
            provider,
            reason: body.to_string(),
        },
    }
}
