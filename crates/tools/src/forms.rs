//! Forms catalog: look up forms and record answers to them.
//!
//! Backed by a [`FormRepository`]. The in-memory repository is what the
//! CLI and tests use; a deployment plugs in its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use botrelay_core::error::ToolError;
use botrelay_core::tool::{Tool, ToolSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmission {
    pub id: String,
    pub form_id: String,
    pub answers: BTreeMap<String, String>,
    pub submitted_at: DateTime<Utc>,
}

/// Where forms live.
#[async_trait]
pub trait FormRepository: Send + Sync {
    async fn get(&self, form_id: &str) -> Result<Option<Form>, ToolError>;

    async fn list(&self) -> Result<Vec<Form>, ToolError>;

    async fn submit(
        &self,
        form_id: &str,
        answers: BTreeMap<String, String>,
    ) -> Result<FormSubmission, ToolError>;
}

/// Forms held in memory.
#[derive(Default)]
pub struct InMemoryFormRepository {
    forms: RwLock<BTreeMap<String, Form>>,
    submissions: RwLock<Vec<FormSubmission>>,
}

impl InMemoryFormRepository {
    pub fn new(forms: impl IntoIterator<Item = Form>) -> Self {
        Self {
            forms: RwLock::new(forms.into_iter().map(|f| (f.id.clone(), f)).collect()),
            submissions: RwLock::new(Vec::new()),
        }
    }

    /// A couple of demo forms.
    pub fn with_samples() -> Self {
        let field = |name: &str, label: &str, required: bool| FormField {
            name: name.into(),
            label: label.into(),
            required,
        };
        Self::new([
            Form {
                id: "F-1001".into(),
                title: "Customer intake".into(),
                description: "Basic details collected from new customers.".into(),
                fields: vec![
                    field("full_name", "Full name", true),
                    field("email", "Email address", true),
                    field("company", "Company", false),
                ],
            },
            Form {
                id: "F-2040".into(),
                title: "Support feedback".into(),
                description: "How did we do on your last support request?".into(),
                fields: vec![
                    field("rating", "Rating from 1 to 5", true),
                    field("comments", "Anything else?", false),
                ],
            },
        ])
    }

    pub async fn submissions(&self) -> Vec<FormSubmission> {
        self.submissions.read().await.clone()
    }
}

#[async_trait]
impl FormRepository for InMemoryFormRepository {
    async fn get(&self, form_id: &str) -> Result<Option<Form>, ToolError> {
        Ok(self.forms.read().await.get(form_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Form>, ToolError> {
        Ok(self.forms.read().await.values().cloned().collect())
    }

    async fn submit(
        &self,
        form_id: &str,
        answers: BTreeMap<String, String>,
    ) -> Result<FormSubmission, ToolError> {
        let submission = FormSubmission {
            id: uuid::Uuid::new_v4().to_string(),
            form_id: form_id.to_string(),
            answers,
            submitted_at: Utc::now(),
        };
        self.submissions.write().await.push(submission.clone());
        Ok(submission)
    }
}

fn form_id_arg(arguments: &serde_json::Value) -> Result<&str, ToolError> {
    arguments["form_id"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'form_id' argument".into()))
}

fn not_found(tool: &str, form_id: &str) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.into(),
        reason: format!("no form with id '{form_id}'"),
    }
}

fn to_pretty(tool: &str, value: &impl Serialize) -> Result<String, ToolError> {
    serde_json::to_string_pretty(value).map_err(|e| ToolError::ExecutionFailed {
        tool_name: tool.into(),
        reason: e.to_string(),
    })
}

pub struct GetFormTool {
    repo: Arc<dyn FormRepository>,
}

#[async_trait]
impl Tool for GetFormTool {
    fn name(&self) -> &str {
        "get_form"
    }

    fn description(&self) -> &str {
        "Fetch a form by its id, including its title, description and fields."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "form_id": { "type": "string", "description": "The form id, e.g. F-1001" }
            },
            "required": ["form_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let form_id = form_id_arg(&arguments)?;
        let form = self
            .repo
            .get(form_id)
            .await?
            .ok_or_else(|| not_found(self.name(), form_id))?;
        to_pretty(self.name(), &form)
    }
}

pub struct ListFormsTool {
    repo: Arc<dyn FormRepository>,
}

#[async_trait]
impl Tool for ListFormsTool {
    fn name(&self) -> &str {
        "list_forms"
    }

    fn description(&self) -> &str {
        "List the ids and titles of all available forms."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<String, ToolError> {
        let forms = self.repo.list().await?;
        if forms.is_empty() {
            return Ok("No forms available.".into());
        }
        Ok(forms
            .iter()
            .map(|f| format!("{}: {}", f.id, f.title))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

pub struct SubmitFormResponseTool {
    repo: Arc<dyn FormRepository>,
}

#[async_trait]
impl Tool for SubmitFormResponseTool {
    fn name(&self) -> &str {
        "submit_form_response"
    }

    fn description(&self) -> &str {
        "Submit answers to a form on behalf of the customer. All required fields must be answered."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "form_id": { "type": "string" },
                "answers": {
                    "type": "object",
                    "description": "Field name to answer",
                    "additionalProperties": { "type": "string" }
                }
            },
            "required": ["form_id", "answers"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let form_id = form_id_arg(&arguments)?;
        let answers: BTreeMap<String, String> = arguments
            .get("answers")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ToolError::InvalidArguments(format!("'answers': {e}")))?
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'answers' argument".into()))?;

        let form = self
            .repo
            .get(form_id)
            .await?
            .ok_or_else(|| not_found(self.name(), form_id))?;

        let missing: Vec<&str> = form
            .fields
            .iter()
            .filter(|f| f.required)
            .filter(|f| answers.get(&f.name).is_none_or(|a| a.trim().is_empty()))
            .map(|f| f.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let submission = self.repo.submit(form_id, answers).await?;
        Ok(format!(
            "Submitted response {} to form {}.",
            submission.id, submission.form_id
        ))
    }
}

/// The `forms` catalog.
pub fn forms_catalog(repo: Arc<dyn FormRepository>) -> ToolSet {
    ToolSet::new()
        .with(Box::new(GetFormTool { repo: repo.clone() }))
        .with(Box::new(ListFormsTool { repo: repo.clone() }))
        .with(Box::new(SubmitFormResponseTool { repo }))
}
