//! Tool system and the Dataverse tools

pub mod base;
pub mod crm;
pub mod registry;
pub mod script;

pub use base::{Tool, ToolCall, ToolExample, ToolExecutor, ToolResult};
pub use crm::{CrmOperation, CrmTool, CrmToolFactory};
pub use registry::{ToolFactory, ToolRegistry};
pub use script::{RunScriptTool, RunScriptToolFactory, RUN_SCRIPT_DESCRIPTION, RUN_SCRIPT_NAME};

/// Names and descriptions of every tool, available without a connection
pub fn catalog() -> Vec<(&'static str, &'static str)> {
    let mut entries: Vec<_> = CrmOperation::ALL
        .iter()
        .map(|operation| (operation.name(), operation.description()))
        .collect();
    entries.push((RUN_SCRIPT_NAME, RUN_SCRIPT_DESCRIPTION));
    entries
}
