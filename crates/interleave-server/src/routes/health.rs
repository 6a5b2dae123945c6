//! Health and introspection endpoints.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use interleave_core::transport::ToolInfo;
use serde_json::{Value, json};

use crate::state::AppState;

const PROMPT_PREVIEW_CHARS: usize = 200;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "tools": state.agent().registry().tool_names(),
    }))
}

pub async fn tools(State(state): State<AppState>) -> Json<Value> {
    let tools: Vec<ToolInfo> = state
        .agent()
        .registry()
        .definitions()
        .iter()
        .map(ToolInfo::from)
        .collect();
    Json(json!({ "tools": tools }))
}

pub async fn agent_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "tools": state.agent().registry().tool_names(),
        "systemPrompt": prompt_preview(state.agent().system_prompt()),
    }))
}

fn prompt_preview(prompt: &str) -> String {
    let mut preview: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let preview = prompt_preview(&long);
        assert_eq!(preview.chars().count(), 203);
        assert!(preview.ends_with("..."));
        assert_eq!(prompt_preview("short"), "short...");
    }
}
