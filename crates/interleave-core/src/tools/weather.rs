//! `get_weather` tool: simulated conditions for a location.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value, json};

use super::ToolDefinition;
use crate::core::events::ToolOutput;

const CONDITIONS: [&str; 5] = ["Sunny", "Cloudy", "Rainy", "Partly cloudy", "Clear"];
const TEMPS_F: [u32; 6] = [65, 68, 72, 75, 78, 82];

pub fn definition() -> ToolDefinition {
    let mut params = Map::new();
    params.insert(
        "location".to_string(),
        json!({
            "type": "string",
            "description": "City name or location (e.g., \"New York\", \"London, UK\")"
        }),
    );
    ToolDefinition::from_parameters(
        "get_weather",
        "Get weather information for a location",
        params,
    )
}

/// The same location always reports the same weather within one build.
pub fn execute(input: &Value) -> ToolOutput {
    let location = input
        .get("location")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim();

    let mut hasher = DefaultHasher::new();
    location.to_lowercase().hash(&mut hasher);
    let seed = hasher.finish();

    let condition = CONDITIONS[(seed % CONDITIONS.len() as u64) as usize];
    let temp = TEMPS_F[((seed >> 16) % TEMPS_F.len() as u64) as usize];

    ToolOutput::success(format!(
        "Weather in {location}: {condition}, {temp}°F (simulated response)"
    ))
}
