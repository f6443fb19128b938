//! Tool registry for managing available tools

use std::collections::HashMap;
use std::sync::Arc;

use super::crm::{CrmOperation, CrmToolFactory};
use super::script::RunScriptToolFactory;
use super::{Tool, ToolExecutor};
use crate::dataverse::DataverseTools;
use crate::error::{Result, ToolError};
use crate::script::{ScriptLimits, ScriptRunner};

/// Registry for managing tool creation and registration
pub struct ToolRegistry {
    factories: HashMap<String, Box<dyn ToolFactory>>,
}

/// Factory trait for creating tools
pub trait ToolFactory: Send + Sync {
    /// Create a new instance of the tool
    fn create(&self) -> Box<dyn Tool>;

    /// Get the name of the tool this factory creates
    fn tool_name(&self) -> &str;

    /// Get the description of the tool this factory creates
    fn tool_description(&self) -> &str;
}

impl ToolRegistry {
    /// Create an empty tool registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Every CRM operation plus `run_script`, all sharing `tools`
    pub fn for_dataverse(tools: Arc<DataverseTools>, limits: ScriptLimits) -> Self {
        let mut registry = Self::new();
        for operation in CrmOperation::ALL {
            registry.register_factory(Box::new(CrmToolFactory::new(
                operation,
                Arc::clone(&tools),
            )));
        }
        let runner = ScriptRunner::new(tools).with_limits(limits);
        registry.register_factory(Box::new(RunScriptToolFactory::new(runner)));
        registry
    }

    /// Register a tool factory
    pub fn register_factory(&mut self, factory: Box<dyn ToolFactory>) {
        self.factories
            .insert(factory.tool_name().to_string(), factory);
    }

    /// Create a tool by name
    pub fn create_tool(&self, name: &str) -> Option<Box<dyn Tool>> {
        self.factories.get(name).map(|factory| factory.create())
    }

    /// List all available tool names, sorted
    pub fn list_tools(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get tool name and description
    pub fn get_tool_info(&self, name: &str) -> Option<(&str, &str)> {
        self.factories
            .get(name)
            .map(|factory| (factory.tool_name(), factory.tool_description()))
    }

    /// Create a tool executor with the specified tools
    pub fn create_executor(&self, tool_names: &[String]) -> Result<ToolExecutor> {
        let mut executor = ToolExecutor::new();

        for name in tool_names {
            let tool = self
                .create_tool(name)
                .ok_or_else(|| ToolError::NotFound { name: name.clone() })?;
            executor.register_tool(tool);
        }

        Ok(executor)
    }

    /// Create a tool executor with all available tools
    pub fn create_executor_with_all(&self) -> ToolExecutor {
        let mut executor = ToolExecutor::new();

        for factory in self.factories.values() {
            executor.register_tool(factory.create());
        }

        executor
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
