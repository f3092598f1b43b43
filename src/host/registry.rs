//! Immutable tool catalog assembled once at startup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::state::ToolContext;

pub type ToolFuture = BoxFuture<'static, Result<Value>>;

/// Leaf function implementing one tool.
pub type ToolHandler = Arc<dyn Fn(Value, ToolContext) -> ToolFuture + Send + Sync>;

/// Tool definition as advertised by `tools/list`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Clone)]
pub struct ToolDescriptor {
    pub definition: ToolDefinition,
    pub handler: ToolHandler,
}

impl ToolDescriptor {
    pub fn new<F, Fut>(name: &str, description: &str, input_schema: Value, f: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            definition: ToolDefinition {
                name: name.to_string(),
                description: description.to_string(),
                input_schema,
            },
            handler: Arc::new(move |args, ctx| f(args, ctx).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build the catalog. Names must be unique.
    pub fn new(tools: Vec<ToolDescriptor>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(tools.len());
        for (idx, tool) in tools.iter().enumerate() {
            if by_name.insert(tool.name().to_string(), idx).is_some() {
                anyhow::bail!("duplicate tool name: {}", tool.name());
            }
        }
        Ok(Self { tools, by_name })
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&idx| &self.tools[idx])
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn echo(args: Value, _ctx: ToolContext) -> Result<Value> {
        Ok(args)
    }

    #[test]
    fn test_lookup_and_order() {
        let registry = ToolRegistry::new(vec![
            ToolDescriptor::new("b_tool", "B", json!({"type": "object"}), echo),
            ToolDescriptor::new("a_tool", "A", json!({"type": "object"}), echo),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("a_tool").is_some());
        assert!(registry.get("c_tool").is_none());

        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ToolRegistry::new(vec![
            ToolDescriptor::new("dup", "1", json!({}), echo),
            ToolDescriptor::new("dup", "2", json!({}), echo),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_definition_wire_form() {
        let tool = ToolDescriptor::new("t", "desc", json!({"type": "object"}), echo);
        let wire = serde_json::to_value(&tool.definition).unwrap();
        assert_eq!(
            wire,
            json!({"name": "t", "description": "desc", "inputSchema": {"type": "object"}})
        );
    }
}
