//! Local tool registry.

use super::{ToolCatalog, ToolHandler, ToolSpec};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// How a registered tool is executed.
#[derive(Clone)]
pub enum ToolRoute {
    /// Run in-process.
    Direct(Arc<dyn ToolHandler>),
    /// Submit to the job queue under a task name.
    Queued { task: String },
}

impl std::fmt::Debug for ToolRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolRoute::Direct(_) => write!(f, "Direct"),
            ToolRoute::Queued { task } => write!(f, "Queued({})", task),
        }
    }
}

/// Registry of tool specs and their routes, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    routes: HashMap<String, ToolRoute>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, spec: ToolSpec, route: ToolRoute) -> Result<()> {
        if self.routes.contains_key(&spec.name) {
            return Err(AgentError::DuplicateTool(spec.name));
        }

        info!("Registered tool: {} ({:?})", spec.name, route);
        self.routes.insert(spec.name.clone(), route);
        self.specs.push(spec);
        Ok(())
    }

    pub fn route(&self, name: &str) -> Option<&ToolRoute> {
        self.routes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[async_trait]
impl ToolCatalog for ToolRegistry {
    async fn list_tools(&self) -> Vec<ToolSpec> {
        self.specs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str) -> ToolSpec {
        ToolSpec::new(name, "test tool", json!({"type": "object", "properties": {}}))
    }

    #[test]
    fn test_register_and_list_in_order() {
        let mut registry = ToolRegistry::new();
        registry
            .register(spec("b_tool"), ToolRoute::Queued { task: "b.task".into() })
            .unwrap();
        registry
            .register(spec("a_tool"), ToolRoute::Queued { task: "a.task".into() })
            .unwrap();

        let names: Vec<String> = tokio_test::block_on(registry.list_tools())
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
        assert!(matches!(
            registry.route("a_tool"),
            Some(ToolRoute::Queued { task }) if task == "a.task"
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(spec("dup"), ToolRoute::Queued { task: "x".into() })
            .unwrap();
        let err = registry
            .register(spec("dup"), ToolRoute::Queued { task: "y".into() })
            .unwrap_err();

        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "dup"));
        assert_eq!(registry.len(), 1);
    }
}
