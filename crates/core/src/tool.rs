//! Tool catalogs: the capabilities a robot may invoke mid-reply.
//!
//! A [`ToolCatalog`] exposes immutable declarations plus an executor.
//! Every declared name must be executable; an undeclared name fails with
//! [`ToolError::UnknownTool`]. Catalogs are built once and shared read-only
//! across concurrent turns.

use async_trait::async_trait;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A single invocable capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "get_form").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool. The returned string is already suitable for
    /// inclusion in conversation text.
    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// A provider-agnostic registry of invocable capabilities.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// Declarations in catalog order.
    fn tool_definitions(&self) -> &[ToolDefinition];

    /// Whether `name` is declared by this catalog.
    fn declares(&self, name: &str) -> bool {
        self.tool_definitions().iter().any(|d| d.name == name)
    }

    /// Run a declared tool. Not retried here; errors go to the caller.
    async fn execute_tool_call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolError>;
}

/// An ordered set of [`Tool`]s acting as one catalog.
///
/// Registering a tool whose name is already present replaces it in place,
/// so names stay unique within the set.
pub struct ToolSet {
    tools: Vec<Box<dyn Tool>>,
    definitions: Vec<ToolDefinition>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            definitions: Vec::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let definition = tool.to_definition();
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(index) => {
                self.tools[index] = tool;
                self.definitions[index] = definition;
            }
            None => {
                self.tools.push(tool);
                self.definitions.push(definition);
            }
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, tool: Box<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolCatalog for ToolSet {
    fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    async fn execute_tool_call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(arguments).await
    }
}
