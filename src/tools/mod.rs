//! Tool Catalog - tool definitions, argument schemas, and command templates

mod catalog;
mod definition;
mod template;

pub use catalog::{MAX_FILE_CONTENT_BYTES, ToolCatalog};
pub use definition::{ArgSpec, ArgType, RiskTier, ToolDefinition, ToolName};
pub use template::{ArgValue, CommandTemplate, RemoteCommand, Slot};
