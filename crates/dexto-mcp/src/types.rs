//! MCP capability types.

use rmcp::model as rmcp_model;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Definition of one tool exposed by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// JSON Schema for input parameters.
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Create a descriptor with an open object schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Create from an rmcp `Tool`.
    #[must_use]
    pub fn from_rmcp(tool: &rmcp_model::Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.as_deref().map(String::from),
            input_schema: serde_json::to_value(&*tool.input_schema)
                .unwrap_or_else(|_| serde_json::json!({"type": "object"})),
        }
    }
}

/// A tool in the aggregated cross-server namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedTool {
    /// The server that owns the tool.
    pub server: String,
    /// The definition.
    pub tool: ToolDescriptor,
    /// Set when another server registered the name first.
    pub shadowed: bool,
}

/// Definition of one prompt exposed by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptDescriptor {
    /// Prompt name.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
}

impl PromptDescriptor {
    /// Create from an rmcp `Prompt`.
    #[must_use]
    pub fn from_rmcp(prompt: &rmcp_model::Prompt) -> Self {
        Self {
            name: prompt.name.to_string(),
            description: prompt.description.as_deref().map(String::from),
        }
    }
}

/// Definition of one resource exposed by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource URI.
    pub uri: String,
    /// Display name.
    pub name: Option<String>,
}

/// Result of one MCP tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolResult {
    /// Concatenated text content.
    pub content: String,
    /// Whether the server flagged the result as an error.
    pub is_error: bool,
}

impl McpToolResult {
    /// Successful text result.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

impl From<rmcp_model::CallToolResult> for McpToolResult {
    fn from(result: rmcp_model::CallToolResult) -> Self {
        let content = result
            .content
            .iter()
            .filter_map(|item| match item.raw {
                rmcp_model::RawContent::Text(ref text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            content,
            is_error: result.is_error.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_constructors() {
        assert!(!McpToolResult::text("ok").is_error);
        assert!(McpToolResult::error("bad").is_error);
    }

    #[test]
    fn test_descriptor_serde() {
        let descriptor = ToolDescriptor::new("search");
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: ToolDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(descriptor, back);
    }
}
