//! Inbox Declutter: a conversational inbox triage agent.

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod mcp;
pub mod rules;
pub mod tasks;
pub mod tools;

pub use config::AppConfig;
