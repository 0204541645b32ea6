//! Rule canonicalization
//!
//! Recursively sorts the operands of every `and`/`or` so that rules written
//! with operands in a different order render to the same text. The canonical
//! text is the persisted deduplication key for stored rules and must stay
//! stable.
//!
//! Sibling order:
//! 1. `boolean` nodes before `condition` nodes
//! 2. `boolean`: operator, case-insensitive
//! 3. `condition`: field, case-insensitive, then value
//!
//! Remaining ties fall back to the condition operator (then the raw field)
//! or, for boolean nodes, the canonical form of their operands.

use super::parser::RuleParser;
use super::predicate::Predicate;
use super::tree::{RuleDocument, RuleNode};
use crate::error::ParseError;
use std::cmp::Ordering;

/// Text stored for an empty rule
pub const EMPTY_RULE: &str = "false";

/// Sort a structured tree
pub fn canonicalize_tree(node: &RuleNode) -> RuleNode {
    match node {
        RuleNode::Boolean { operator, children } => {
            let mut children: Vec<RuleNode> = children.iter().map(canonicalize_tree).collect();
            children.sort_by(node_order);
            RuleNode::Boolean {
                operator: operator.clone(),
                children,
            }
        }
        RuleNode::Condition { .. } => node.clone(),
    }
}

/// Sort a predicate tree using the structured-node order
///
/// # Examples
/// ```
/// use access_rules::core::canonical::canonicalize;
/// use access_rules::core::parser::RuleParser;
///
/// let a = canonicalize(&RuleParser::parse("user alice or group editor").unwrap());
/// let b = canonicalize(&RuleParser::parse("group editor or user alice").unwrap());
/// assert_eq!(a, b);
/// assert_eq!(a.render(), "group editor or user alice");
/// ```
pub fn canonicalize(predicate: &Predicate) -> Predicate {
    match predicate {
        Predicate::And(children) => Predicate::And(sorted(children)),
        Predicate::Or(children) => Predicate::Or(sorted(children)),
        Predicate::Not(child) => Predicate::not(canonicalize(child)),
        leaf => leaf.clone(),
    }
}

/// Canonical text of a parsed rule
pub fn canonical_text(predicate: &Predicate) -> String {
    canonicalize(predicate).render()
}

/// Canonical text of a structured rule; an empty document is `"false"`
pub fn canonical_string(document: &RuleDocument) -> Result<String, ParseError> {
    if document.is_empty() {
        return Ok(EMPTY_RULE.to_string());
    }
    Ok(canonical_text(&RuleParser::parse_document(document)?))
}

fn sorted(children: &[Predicate]) -> Vec<Predicate> {
    let mut keyed: Vec<(RuleNode, Predicate)> = children
        .iter()
        .map(|child| {
            let child = canonicalize(child);
            (child.to_structured(), child)
        })
        .collect();
    keyed.sort_by(|a, b| node_order(&a.0, &b.0));
    keyed.into_iter().map(|(_, child)| child).collect()
}

/// Total order over sibling nodes
///
/// Operands of boolean nodes must already be canonical.
pub fn node_order(a: &RuleNode, b: &RuleNode) -> Ordering {
    match (a, b) {
        (RuleNode::Boolean { operator: oa, .. }, RuleNode::Boolean { operator: ob, .. }) => {
            cmp_ignore_case(oa, ob).then_with(|| signature(a).cmp(&signature(b)))
        }
        (
            RuleNode::Condition {
                field: fa,
                operator: oa,
                value: va,
            },
            RuleNode::Condition {
                field: fb,
                operator: ob,
                value: vb,
            },
        ) => cmp_ignore_case(fa, fb)
            .then_with(|| va.cmp(vb))
            .then_with(|| oa.cmp(ob))
            .then_with(|| fa.cmp(fb)),
        (RuleNode::Boolean { .. }, RuleNode::Condition { .. }) => Ordering::Less,
        (RuleNode::Condition { .. }, RuleNode::Boolean { .. }) => Ordering::Greater,
    }
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Deterministic one-line form of a node, used to break ties
fn signature(node: &RuleNode) -> String {
    match node {
        RuleNode::Boolean { operator, children } => format!(
            "{}({})",
            operator.to_lowercase(),
            children.iter().map(signature).collect::<Vec<_>>().join(",")
        ),
        RuleNode::Condition {
            field,
            operator,
            value,
        } => format!("{} {} {}", field, operator, value),
    }
}
