//! Built-in tools: sender rules, mailbox actions, and task creation.

pub mod mailbox;
pub mod rules;
pub mod tasks;

pub use mailbox::mailbox_tools;
pub use rules::rule_tools;
pub use tasks::CreateTaskTool;
