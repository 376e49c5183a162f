//! Composite catalog: several catalogs behind one dispatch surface.
//!
//! Declarations are the concatenation of every component's declarations,
//! in construction order. Dispatch scans components in the same order and
//! the first one declaring the name executes the call.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use botrelay_core::error::ToolError;
use botrelay_core::provider::ToolDefinition;
use botrelay_core::tool::ToolCatalog;
use tracing::warn;

pub struct CompositeToolCatalog {
    catalogs: Vec<Arc<dyn ToolCatalog>>,
    definitions: Vec<ToolDefinition>,
}

impl CompositeToolCatalog {
    pub fn new(catalogs: Vec<Arc<dyn ToolCatalog>>) -> Self {
        let definitions: Vec<ToolDefinition> = catalogs
            .iter()
            .flat_map(|c| c.tool_definitions().iter().cloned())
            .collect();

        let mut seen = HashSet::new();
        for def in &definitions {
            if !seen.insert(def.name.as_str()) {
                warn!(tool = %def.name, "Tool declared by more than one catalog, first one wins");
            }
        }

        Self {
            catalogs,
            definitions,
        }
    }

    /// Number of component catalogs.
    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}

#[async_trait]
impl ToolCatalog for CompositeToolCatalog {
    fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    async fn execute_tool_call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, ToolError> {
        let catalog = self
            .catalogs
            .iter()
            .find(|c| c.declares(name))
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        catalog.execute_tool_call(name, arguments).await
    }
}
