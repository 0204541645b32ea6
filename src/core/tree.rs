//! Structured rule syntax
//!
//! A rule document is the outer condition element holding zero or more
//! nodes. Nodes are either `boolean` (operator `true`, `false`, `and`, `or`,
//! `not`) or `condition` (`field`, `operator`, `value`):
//!
//! ```json
//! {
//!   "nodes": [
//!     { "kind": "boolean", "operator": "or", "children": [
//!       { "kind": "condition", "field": "group", "operator": "=", "value": "editor" },
//!       { "kind": "condition", "field": "user", "operator": "=", "value": "alice" }
//!     ]}
//!   ]
//! }
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One node of a structured rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuleNode {
    Boolean {
        operator: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<RuleNode>,
    },
    Condition {
        field: String,
        operator: String,
        value: String,
    },
}

impl RuleNode {
    pub fn boolean(operator: impl Into<String>, children: Vec<RuleNode>) -> Self {
        RuleNode::Boolean {
            operator: operator.into(),
            children,
        }
    }

    pub fn condition(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        RuleNode::Condition {
            field: field.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// Element name: `boolean` or `condition`
    pub fn kind_name(&self) -> &'static str {
        match self {
            RuleNode::Boolean { .. } => "boolean",
            RuleNode::Condition { .. } => "condition",
        }
    }

    pub fn children(&self) -> &[RuleNode] {
        match self {
            RuleNode::Boolean { children, .. } => children,
            RuleNode::Condition { .. } => &[],
        }
    }
}

/// Outer rule element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub nodes: Vec<RuleNode>,
}

impl RuleDocument {
    pub fn new(node: RuleNode) -> Self {
        RuleDocument { nodes: vec![node] }
    }

    /// Document with no nodes; denies everything
    pub fn empty() -> Self {
        RuleDocument::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
