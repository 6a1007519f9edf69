//! Conversational runners: turn a user message into an ordered event stream.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::events::{EventStream, TurnEvent};
use crate::agent::session::SessionStore;
use crate::agent::{AgentDescriptor, truncate_for_preview};
use crate::context::TurnContext;
use crate::error::TurnError;
use crate::llm::costs::exchange_cost;
use crate::llm::{ChatMessage, ToolCall, ToolChoice, ToolCompletionRequest};
use crate::tools::ToolCatalog;

/// Default upper bound on model round-trips within one turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Events buffered between the loop and a slow consumer.
const EVENT_BUFFER: usize = 32;

/// Runs one turn of a conversation.
pub trait ConversationRunner: Send + Sync {
    /// Start a turn. Events arrive in the order they happened; an `Err` item
    /// ends the turn.
    fn run(&self, agent: Arc<AgentDescriptor>, session_id: &str, user_text: &str) -> EventStream;
}

/// Agentic loop against the descriptor's model and tool catalog.
#[derive(Debug, Default, Clone)]
pub struct LlmRunner {
    sessions: Arc<SessionStore>,
}

impl LlmRunner {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}

impl ConversationRunner for LlmRunner {
    fn run(&self, agent: Arc<AgentDescriptor>, session_id: &str, user_text: &str) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let ctx = TurnContext::new(session_id);
        let sessions = Arc::clone(&self.sessions);
        let user_text = user_text.to_string();

        let handle = tokio::spawn(async move {
            let turn_id = ctx.turn_id;
            match agentic_loop(&agent, &sessions, &ctx, user_text, &tx).await {
                Ok(()) => {}
                Err(Halt::ConsumerGone) => {
                    tracing::debug!(%turn_id, "Event consumer went away, stopping turn");
                }
                Err(Halt::Fault(err)) => {
                    let _ = tx.send(Err(err)).await;
                }
            }
        });

        // Surface a panicked or cancelled loop as a fault after its last event.
        // The tail lives as long as the stream, so dropping the stream aborts
        // whatever model or tool call the loop is waiting on.
        let abort = AbortOnDrop(handle.abort_handle());
        let tail = futures::stream::once(async move {
            let _abort = abort;
            match handle.await {
                Ok(()) => None,
                Err(e) if e.is_panic() => {
                    let payload = e.into_panic();
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "agent loop panicked".to_string());
                    Some(Err(TurnError::Runner(message)))
                }
                Err(_) => Some(Err(TurnError::Cancelled)),
            }
        })
        .filter_map(futures::future::ready);

        Box::pin(ReceiverStream::new(rx).chain(tail))
    }
}

/// Aborts the turn task when dropped. A no-op once the task has finished.
struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Halt {
    ConsumerGone,
    Fault(TurnError),
}

async fn emit(
    tx: &mpsc::Sender<Result<TurnEvent, TurnError>>,
    event: TurnEvent,
) -> Result<(), Halt> {
    tx.send(Ok(event)).await.map_err(|_| Halt::ConsumerGone)
}

fn conversation(
    agent: &AgentDescriptor,
    history: &[ChatMessage],
    turn: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + turn.len() + 1);
    messages.push(ChatMessage::system(agent.instruction.clone()));
    messages.extend_from_slice(history);
    messages.extend_from_slice(turn);
    messages
}

async fn agentic_loop(
    agent: &AgentDescriptor,
    sessions: &SessionStore,
    ctx: &TurnContext,
    user_text: String,
    tx: &mpsc::Sender<Result<TurnEvent, TurnError>>,
) -> Result<(), Halt> {
    let history = sessions.history(&ctx.session_id);
    let mut turn = vec![ChatMessage::user(user_text)];
    let tools = agent.catalog.tool_definitions();

    for iteration in 1..=agent.max_iterations {
        let request =
            ToolCompletionRequest::new(conversation(agent, &history, &turn), tools.clone());

        let response = agent
            .model
            .complete_with_tools(request)
            .await
            .map_err(|e| Halt::Fault(TurnError::Model(e)))?;
        log_usage(agent, ctx, iteration, response.input_tokens, response.output_tokens);

        let text = response.content.filter(|t| !t.is_empty());
        if let Some(text) = &text {
            emit(tx, TurnEvent::text(text.clone())).await?;
        }

        if response.tool_calls.is_empty() {
            turn.push(ChatMessage::assistant(text.unwrap_or_default()));
            sessions.commit(&ctx.session_id, turn);
            return Ok(());
        }

        turn.push(ChatMessage::assistant_with_tool_calls(
            text,
            response.tool_calls.clone(),
        ));

        for call in response.tool_calls {
            emit(
                tx,
                TurnEvent::ToolInvocation {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            )
            .await?;

            let (output, is_error) = dispatch(&agent.catalog, &call, ctx).await;

            emit(
                tx,
                TurnEvent::ToolResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    output: output.clone(),
                    is_error,
                },
            )
            .await?;
            turn.push(ChatMessage::tool_result(call.id, call.name, output));
        }
    }

    // Out of tool rounds: ask for a final answer with tools switched off.
    tracing::warn!(
        turn_id = %ctx.turn_id,
        max_iterations = agent.max_iterations,
        "Tool round limit reached, requesting final answer"
    );
    let mut request = ToolCompletionRequest::new(conversation(agent, &history, &turn), tools);
    request.tool_choice = ToolChoice::None;
    let response = agent
        .model
        .complete_with_tools(request)
        .await
        .map_err(|e| Halt::Fault(TurnError::Model(e)))?;
    log_usage(
        agent,
        ctx,
        agent.max_iterations + 1,
        response.input_tokens,
        response.output_tokens,
    );

    let text = response.content.unwrap_or_default();
    if !text.is_empty() {
        emit(tx, TurnEvent::text(text.clone())).await?;
    }
    turn.push(ChatMessage::assistant(text));
    sessions.commit(&ctx.session_id, turn);
    Ok(())
}

/// Run one tool call. Failures become error results for the model.
async fn dispatch(catalog: &ToolCatalog, call: &ToolCall, ctx: &TurnContext) -> (String, bool) {
    let Some(tool) = catalog.get(&call.name) else {
        tracing::warn!(tool = %call.name, "Model requested an unknown tool");
        return (format!("Error: unknown tool '{}'", call.name), true);
    };

    match tool.execute(call.arguments.clone(), ctx).await {
        Ok(output) => {
            let text = output.to_model_text();
            tracing::info!(
                tool = %call.name,
                provenance = %tool.provenance(),
                duration_ms = output.duration.as_millis() as u64,
                preview = %truncate_for_preview(&text, 80),
                "Tool call succeeded"
            );
            (text, false)
        }
        Err(e) => {
            tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
            (format!("Error: {e}"), true)
        }
    }
}

fn log_usage(
    agent: &AgentDescriptor,
    ctx: &TurnContext,
    iteration: usize,
    input_tokens: u32,
    output_tokens: u32,
) {
    let cost = exchange_cost(agent.model.cost_per_token(), input_tokens, output_tokens);
    tracing::debug!(
        turn_id = %ctx.turn_id,
        iteration,
        input_tokens,
        output_tokens,
        cost_usd = %cost,
        "Model exchange"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{ScriptedModel, agent_with, text_reply, tool_reply};
    use crate::error::LlmError;
    use crate::llm::Role;
    use crate::rules::{RuleStore, TriageRule};
    use crate::tools::builtin::rule_tools;

    async fn collect(stream: EventStream) -> Vec<Result<TurnEvent, TurnError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn plain_answer_is_one_fragment_and_commits_history() {
        let model = ScriptedModel::new(vec![text_reply("Hello!")]);
        let agent = agent_with(model.clone(), Vec::new(), DEFAULT_MAX_ITERATIONS);
        let runner = LlmRunner::default();

        let events = collect(runner.run(agent, "s1", "hi")).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &TurnEvent::text("Hello!"));
        assert_eq!(runner.sessions().len("s1"), 2);

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[1].content, "hi");
    }

    #[tokio::test]
    async fn rule_tool_call_mid_turn_updates_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RuleStore::load(dir.path().join("preferences.json")));
        let model = ScriptedModel::new(vec![
            tool_reply(
                None,
                &[(
                    "call_1",
                    "save_user_rule",
                    serde_json::json!({"sender": "boss@work.com", "rule": "always_important"}),
                )],
            ),
            text_reply("Saved that rule."),
        ]);
        let agent = agent_with(model.clone(), rule_tools(Arc::clone(&store)), 10);
        let runner = LlmRunner::default();

        let events: Vec<TurnEvent> = collect(runner.run(agent, "s1", "boss is important"))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            TurnEvent::ToolInvocation { name, .. } if name == "save_user_rule"
        ));
        match &events[1] {
            TurnEvent::ToolResult {
                call_id,
                output,
                is_error,
                ..
            } => {
                assert_eq!(call_id, "call_1");
                assert!(!is_error);
                assert_eq!(
                    output,
                    "Rule saved: Emails from 'boss@work.com' will be treated as 'always_important'."
                );
            }
            other => panic!("expected tool result, got {other:?}"),
        }
        assert_eq!(events[2], TurnEvent::text("Saved that rule."));
        assert_eq!(store.get("boss@work.com"), Some(TriageRule::AlwaysImportant));

        // The second request carries the tool result back to the model.
        let requests = model.requests.lock().unwrap();
        let last = requests[1].messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_an_error_result() {
        let model = ScriptedModel::new(vec![
            tool_reply(
                Some("Let me check. "),
                &[("c1", "delete_everything", serde_json::json!({}))],
            ),
            text_reply("That tool does not exist."),
        ]);
        let agent = agent_with(model, Vec::new(), 10);

        let events: Vec<TurnEvent> = collect(LlmRunner::default().run(agent, "s", "go"))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(events[0], TurnEvent::text("Let me check. "));
        assert!(matches!(
            &events[2],
            TurnEvent::ToolResult { is_error: true, output, .. } if output.contains("unknown tool")
        ));
        assert_eq!(events[3], TurnEvent::text("That tool does not exist."));
    }

    #[tokio::test]
    async fn model_failure_ends_the_turn_without_committing() {
        let model = ScriptedModel::new(vec![Err(LlmError::AuthFailed {
            provider: "gemini".into(),
        })]);
        let agent = agent_with(model, Vec::new(), 10);
        let runner = LlmRunner::default();

        let events = collect(runner.run(agent, "s", "hi")).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(TurnError::Model(_))));
        assert_eq!(runner.sessions().len("s"), 0);
    }

    #[tokio::test]
    async fn round_limit_forces_a_final_answer() {
        let call = [("c", "get_all_rules", serde_json::json!({}))];
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RuleStore::load(dir.path().join("p.json")));
        let model = ScriptedModel::new(vec![
            tool_reply(None, &call),
            tool_reply(None, &call),
            text_reply("Here is what I found."),
        ]);
        let agent = agent_with(model.clone(), rule_tools(store), 2);

        let events = collect(LlmRunner::default().run(agent, "s", "loop")).await;

        let last = events.last().unwrap().as_ref().unwrap();
        assert_eq!(last, &TurnEvent::text("Here is what I found."));
        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].tool_choice, ToolChoice::None);
    }

    /// Model whose single call takes a while, recording whether it finished.
    #[derive(Default)]
    struct SlowModel {
        started: tokio::sync::Notify,
        finished: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl crate::llm::LlmProvider for SlowModel {
        fn model_name(&self) -> &str {
            "slow"
        }

        fn cost_per_token(&self) -> (rust_decimal::Decimal, rust_decimal::Decimal) {
            (rust_decimal::Decimal::ZERO, rust_decimal::Decimal::ZERO)
        }

        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> Result<crate::llm::ToolCompletionResponse, LlmError> {
            self.started.notify_one();
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            self.finished.store(true, std::sync::atomic::Ordering::SeqCst);
            text_reply("too late")
        }
    }

    #[tokio::test]
    async fn dropping_the_stream_aborts_the_in_flight_call() {
        let model = Arc::new(SlowModel::default());
        let agent = Arc::new(AgentDescriptor {
            name: "DigitalDeclutter".to_string(),
            model: model.clone(),
            instruction: "Triage the inbox.".to_string(),
            catalog: Arc::new(ToolCatalog::default()),
            max_iterations: 10,
        });
        let runner = LlmRunner::default();

        let stream = runner.run(agent, "s", "hi");
        model.started.notified().await;
        drop(stream);
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        assert!(!model.finished.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(runner.sessions().len("s"), 0);
    }

    #[tokio::test]
    async fn departed_consumer_stops_the_loop_without_committing() {
        let model = ScriptedModel::new(vec![text_reply("nobody is listening")]);
        let agent = agent_with(model, Vec::new(), 10);
        let sessions = SessionStore::default();
        let ctx = TurnContext::new("s");
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let result = agentic_loop(&agent, &sessions, &ctx, "hi".to_string(), &tx).await;

        assert!(matches!(result, Err(Halt::ConsumerGone)));
        assert_eq!(sessions.len("s"), 0);
    }

    #[tokio::test]
    async fn history_carries_into_the_next_turn() {
        let model = ScriptedModel::new(vec![text_reply("first"), text_reply("second")]);
        let agent = agent_with(model.clone(), Vec::new(), 10);
        let runner = LlmRunner::default();

        collect(runner.run(Arc::clone(&agent), "s", "one")).await;
        collect(runner.run(agent, "s", "two")).await;

        let requests = model.requests.lock().unwrap();
        let contents: Vec<&str> = requests[1]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["Triage the inbox.", "one", "first", "two"]);
    }
}
