//! Events produced while a turn runs.

use std::pin::Pin;

use futures::Stream;

use crate::error::TurnError;

/// One step of a running turn, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A piece of the assistant's reply text.
    TextFragment(String),
    /// The model asked for a tool to be run.
    ToolInvocation {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// A tool finished; `output` is what the model will see.
    ToolResult {
        call_id: String,
        name: String,
        output: String,
        is_error: bool,
    },
}

impl TurnEvent {
    pub fn text(fragment: impl Into<String>) -> Self {
        Self::TextFragment(fragment.into())
    }
}

/// Ordered event sequence for one turn. An `Err` item ends the turn.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<TurnEvent, TurnError>> + Send>>;
