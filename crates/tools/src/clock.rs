//! Clock catalog: the current time, optionally shifted by an offset.

use async_trait::async_trait;
use botrelay_core::error::ToolError;
use botrelay_core::tool::{Tool, ToolSet};
use chrono::{FixedOffset, Utc};

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Pass offset_hours to get the local time of another timezone."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "offset_hours": {
                    "type": "number",
                    "description": "Hours east of UTC, between -12 and 14 (default 0)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let offset_hours = match arguments.get("offset_hours") {
            None | Some(serde_json::Value::Null) => 0.0,
            Some(v) => v.as_f64().ok_or_else(|| {
                ToolError::InvalidArguments("'offset_hours' must be a number".into())
            })?,
        };
        if !(-12.0..=14.0).contains(&offset_hours) {
            return Err(ToolError::InvalidArguments(format!(
                "offset_hours {offset_hours} is outside -12..=14"
            )));
        }

        let now = Utc::now();
        if offset_hours == 0.0 {
            return Ok(format!("{} (UTC)", now.to_rfc3339()));
        }

        let seconds = (offset_hours * 3600.0).round() as i32;
        let offset = FixedOffset::east_opt(seconds)
            .ok_or_else(|| ToolError::InvalidArguments("invalid offset".into()))?;
        Ok(format!(
            "{} (UTC{offset})",
            now.with_timezone(&offset).to_rfc3339()
        ))
    }
}

/// The `clock` catalog.
pub fn clock_catalog() -> ToolSet {
    ToolSet::new().with(Box::new(CurrentTimeTool))
}
