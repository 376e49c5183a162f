//! An allow-listed view over another catalog.

use std::sync::Arc;

use async_trait::async_trait;
use botrelay_core::error::ToolError;
use botrelay_core::provider::ToolDefinition;
use botrelay_core::tool::ToolCatalog;

/// Exposes only the named tools of an inner catalog.
///
/// Names not declared by the inner catalog are ignored. Calls to tools
/// outside the allow-list fail as unknown.
pub struct FilteredCatalog {
    inner: Arc<dyn ToolCatalog>,
    definitions: Vec<ToolDefinition>,
}

impl FilteredCatalog {
    pub fn new<S: AsRef<str>>(inner: Arc<dyn ToolCatalog>, allow: &[S]) -> Self {
        let definitions = inner
            .tool_definitions()
            .iter()
            .filter(|d| allow.iter().any(|a| a.as_ref() == d.name))
            .cloned()
            .collect();
        Self { inner, definitions }
    }
}

#[async_trait]
impl ToolCatalog for FilteredCatalog {
    fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    async fn execute_tool_call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolError> {
        if !self.declares(name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }
        self.inner.execute_tool_call(name, arguments).await
    }
}
