//! Tool catalogs for botrelay robots.
//!
//! Built-in catalogs (`clock`, `forms`, `slack`) are plain [`ToolSet`]s.
//! A robot's capability set is assembled from named catalogs into a
//! [`CompositeToolCatalog`], optionally narrowing the last one with a
//! [`FilteredCatalog`].
//!
//! [`ToolSet`]: botrelay_core::tool::ToolSet

pub mod clock;
pub mod composite;
pub mod filtered;
pub mod forms;
pub mod slack;

use std::sync::Arc;

use botrelay_core::error::ToolError;
use botrelay_core::tool::ToolCatalog;

pub use composite::CompositeToolCatalog;
pub use filtered::FilteredCatalog;
pub use forms::{Form, FormField, FormRepository, InMemoryFormRepository};
pub use slack::SlackClient;

/// Shared backends the built-in catalogs are constructed over.
#[derive(Clone)]
pub struct CatalogDeps {
    pub forms: Arc<dyn FormRepository>,
    pub slack: Arc<SlackClient>,
}

impl CatalogDeps {
    /// Sample forms and a Slack client keyed from `SLACK_BOT_TOKEN`.
    pub fn from_env() -> Self {
        Self {
            forms: Arc::new(InMemoryFormRepository::with_samples()),
            slack: Arc::new(SlackClient::from_env()),
        }
    }
}

/// Build one built-in catalog by name.
pub fn catalog_by_name(name: &str, deps: &CatalogDeps) -> Result<Arc<dyn ToolCatalog>, ToolError> {
    let catalog: Arc<dyn ToolCatalog> = match name {
        "clock" => Arc::new(clock::clock_catalog()),
        "forms" => Arc::new(forms::forms_catalog(deps.forms.clone())),
        "slack" => Arc::new(slack::slack_catalog(deps.slack.clone())),
        other => {
            return Err(ToolError::NotConfigured(format!(
                "no catalog named '{other}'"
            )));
        }
    };
    Ok(catalog)
}

/// Assemble a robot's catalog from names in precedence order.
///
/// A non-empty `tool_filter` restricts the last catalog to those names.
pub fn assemble<S: AsRef<str>>(
    names: &[S],
    tool_filter: &[S],
    deps: &CatalogDeps,
) -> Result<CompositeToolCatalog, ToolError> {
    let mut catalogs = names
        .iter()
        .map(|n| catalog_by_name(n.as_ref(), deps))
        .collect::<Result<Vec<_>, _>>()?;

    if !tool_filter.is_empty()
        && let Some(last) = catalogs.pop()
    {
        catalogs.push(Arc::new(FilteredCatalog::new(last, tool_filter)));
    }

    Ok(CompositeToolCatalog::new(catalogs))
}
