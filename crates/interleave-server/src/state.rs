use std::sync::Arc;

use interleave_core::core::Agent;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    agent: Arc<Agent>,
    base_path: Arc<str>,
}

impl AppState {
    pub fn new(agent: Arc<Agent>) -> Self {
        let base_path = normalize_base_path(&agent.config().server.base_path);
        Self {
            agent,
            base_path: Arc::from(base_path),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Route prefix: empty, or `/segment` without a trailing slash.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
