//! Turn execution: fold a runner's event stream into the reply text.

use std::sync::Arc;

use futures::{Stream, StreamExt};

use crate::agent::events::TurnEvent;
use crate::agent::runner::ConversationRunner;
use crate::agent::{AgentDescriptor, truncate_for_preview};
use crate::error::TurnError;

/// Result of a completed turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Concatenated text fragments, in order.
    pub text: String,
    pub tool_calls: usize,
    pub tool_results: usize,
    pub fragments: usize,
}

/// Consume `events` in order and concatenate the text fragments.
///
/// Tool events are logged and otherwise skipped. The first `Err` aborts the
/// fold and whatever text had accumulated is discarded.
pub async fn fold_events<S>(events: S) -> Result<TurnOutcome, TurnError>
where
    S: Stream<Item = Result<TurnEvent, TurnError>>,
{
    let mut events = std::pin::pin!(events);
    let mut outcome = TurnOutcome::default();

    while let Some(event) = events.next().await {
        match event? {
            TurnEvent::TextFragment(fragment) => {
                tracing::debug!(
                    target: "declutter::turn",
                    len = fragment.len(),
                    "text fragment"
                );
                outcome.fragments += 1;
                outcome.text.push_str(&fragment);
            }
            TurnEvent::ToolInvocation {
                call_id,
                name,
                arguments,
            } => {
                tracing::debug!(
                    target: "declutter::turn",
                    %call_id,
                    tool = %name,
                    args = %truncate_for_preview(&arguments.to_string(), 120),
                    "tool invocation"
                );
                outcome.tool_calls += 1;
            }
            TurnEvent::ToolResult {
                call_id,
                name,
                output,
                is_error,
            } => {
                tracing::debug!(
                    target: "declutter::turn",
                    %call_id,
                    tool = %name,
                    is_error,
                    output = %truncate_for_preview(&output, 120),
                    "tool result"
                );
                outcome.tool_results += 1;
            }
        }
    }

    Ok(outcome)
}

/// Run one turn for `session_id` and return its outcome.
pub async fn run_turn(
    runner: &dyn ConversationRunner,
    agent: Arc<AgentDescriptor>,
    session_id: &str,
    user_text: &str,
) -> Result<TurnOutcome, TurnError> {
    tracing::info!(
        session_id,
        message = %truncate_for_preview(user_text, 80),
        "Turn started"
    );
    let outcome = fold_events(runner.run(agent, session_id, user_text)).await;
    match &outcome {
        Ok(o) => tracing::info!(
            session_id,
            fragments = o.fragments,
            tool_calls = o.tool_calls,
            reply_chars = o.text.chars().count(),
            "Turn complete"
        ),
        Err(e) => tracing::error!(
            session_id,
            category = e.category(),
            error = %e,
            "Turn failed"
        ),
    }
    outcome
}
