//! Tool abstraction for agent capabilities.

pub mod builtin;
pub mod catalog;
pub mod tool;

pub use catalog::{ToolCatalog, ToolProviderFactory};
pub use tool::*;
