//! Agent construction, lazy initialization, and turn execution.

pub mod builder;
pub mod events;
pub mod guard;
pub mod runner;
pub mod service;
pub mod session;
pub mod turn;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{AGENT_NAME, AgentBuilder, AgentDescriptor, AgentFactory, render_instruction};
pub use events::{EventStream, TurnEvent};
pub use guard::{InitGuard, InitState};
pub use runner::{ConversationRunner, DEFAULT_MAX_ITERATIONS, LlmRunner};
pub use service::ChatService;
pub use session::SessionStore;
pub use turn::{TurnOutcome, fold_events, run_turn};

/// Collapse whitespace and cut `output` to `max_chars` for log previews.
pub fn truncate_for_preview(output: &str, max_chars: usize) -> String {
    let collapsed: String = output
        .chars()
        .take(max_chars + 50)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    // char_indices gives byte offsets at char boundaries, so the slice is valid UTF-8.
    if collapsed.chars().count() > max_chars {
        let byte_offset = collapsed
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(collapsed.len());
        format!("{}...", &collapsed[..byte_offset])
    } else {
        collapsed
    }
}
