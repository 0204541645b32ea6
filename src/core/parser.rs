//! Rule parser
//!
//! Two front-ends producing the same [`Predicate`] trees:
//! - compact text: `group editor or (user al* and not ip 10.0.0.0/8)`
//! - structured nodes: [`RuleNode`] / [`RuleDocument`]
//!
//! Leaf clauses:
//! - `group NAME`, `group != NAME`
//! - `user PATTERN`, `user != PATTERN`
//! - `ip ADDR[/MASK]`
//! - `date OP DATE` with OP one of `<`, `<=`, `>`, `>=` and DATE as
//!   `yyyy-MM-dd` or `dd.MM.yyyy`
//!
//! `<=` and `>=` are stored as strict comparisons against a boundary moved
//! by one day: `date <= D` becomes `date < D+1`, `date >= D` becomes
//! `date > D-1`. Persisted rule text depends on this shift.

use super::address::Address;
use super::clause::{BooleanClauseParser, LeafParser};
use super::predicate::Predicate;
use super::tree::{RuleDocument, RuleNode};
use crate::error::ParseError;
use chrono::{Duration, NaiveDate};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d.%m.%Y"];

const KEYWORDS: [&str; 5] = ["and", "or", "not", "true", "false"];

/// Rule input in either syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    Text(String),
    Tree(RuleDocument),
}

impl From<&str> for RuleSource {
    fn from(text: &str) -> Self {
        RuleSource::Text(text.to_string())
    }
}

impl From<String> for RuleSource {
    fn from(text: String) -> Self {
        RuleSource::Text(text)
    }
}

impl From<RuleDocument> for RuleSource {
    fn from(document: RuleDocument) -> Self {
        RuleSource::Tree(document)
    }
}

impl From<RuleNode> for RuleSource {
    fn from(node: RuleNode) -> Self {
        RuleSource::Tree(RuleDocument::new(node))
    }
}

/// Stateless rule parser
pub struct RuleParser;

impl RuleParser {
    /// Parse compact rule text
    ///
    /// # Examples
    /// ```
    /// use access_rules::core::parser::RuleParser;
    ///
    /// let rule = RuleParser::parse("group editor or user alice").unwrap();
    /// assert_eq!(rule.render(), "group editor or user alice");
    /// ```
    pub fn parse(text: &str) -> Result<Predicate, ParseError> {
        BooleanClauseParser::new(RuleClauses).parse(text)
    }

    /// Parse one structured node
    pub fn parse_node(node: &RuleNode) -> Result<Predicate, ParseError> {
        match node {
            RuleNode::Boolean { operator, children } => {
                match operator.to_ascii_lowercase().as_str() {
                    "true" => Ok(Predicate::True),
                    "false" => Ok(Predicate::False),
                    "and" => Predicate::and(Self::parse_nodes(children)?),
                    "or" => Predicate::or(Self::parse_nodes(children)?),
                    "not" => match children.as_slice() {
                        [child] => Ok(Predicate::not(Self::parse_node(child)?)),
                        _ => Err(ParseError::NotArity(children.len())),
                    },
                    _ => Err(ParseError::UnknownOperator {
                        field: "boolean".to_string(),
                        operator: operator.clone(),
                    }),
                }
            }
            RuleNode::Condition {
                field,
                operator,
                value,
            } => condition(field, operator.trim(), value.trim()),
        }
    }

    /// Parse a whole document
    ///
    /// No nodes yields `false`; several top-level nodes are combined with `and`.
    pub fn parse_document(document: &RuleDocument) -> Result<Predicate, ParseError> {
        match document.nodes.as_slice() {
            [] => Ok(Predicate::False),
            [node] => Self::parse_node(node),
            nodes => Predicate::and(Self::parse_nodes(nodes)?),
        }
    }

    pub fn parse_source(source: &RuleSource) -> Result<Predicate, ParseError> {
        match source {
            RuleSource::Text(text) => Self::parse(text),
            RuleSource::Tree(document) => Self::parse_document(document),
        }
    }

    fn parse_nodes(nodes: &[RuleNode]) -> Result<Vec<Predicate>, ParseError> {
        nodes.iter().map(Self::parse_node).collect()
    }
}

/// Leaf clauses of the compact syntax
struct RuleClauses;

impl LeafParser for RuleClauses {
    fn parse_leaf(&self, clause: &str) -> Result<Predicate, ParseError> {
        let unknown = || ParseError::UnknownClause(clause.to_string());

        let (keyword, rest) = clause.split_once(' ').ok_or_else(unknown)?;
        let rest = rest.trim();

        match keyword.to_ascii_lowercase().as_str() {
            "group" | "user" => {
                let (operator, value) = split_equality(rest);
                if value.is_empty() {
                    return Err(unknown());
                }
                condition(keyword, operator, value)
            }
            "ip" => condition("ip", "=", rest),
            "date" => {
                let operator = ["<=", ">=", "<", ">"]
                    .into_iter()
                    .find(|op| rest.starts_with(op))
                    .ok_or_else(|| ParseError::UnknownOperator {
                        field: "date".to_string(),
                        operator: rest.split(' ').next().unwrap_or_default().to_string(),
                    })?;
                condition("date", operator, rest[operator.len()..].trim())
            }
            _ => Err(unknown()),
        }
    }
}

/// `!= NAME`, `= NAME` or bare `NAME`
fn split_equality(rest: &str) -> (&str, &str) {
    if let Some(value) = rest.strip_prefix("!=") {
        ("!=", value.trim())
    } else if let Some(value) = rest.strip_prefix('=') {
        ("=", value.trim())
    } else {
        ("=", rest)
    }
}

/// Build a leaf from field/operator/value, shared by both syntaxes
fn condition(field: &str, operator: &str, value: &str) -> Result<Predicate, ParseError> {
    let unsupported = || ParseError::UnknownOperator {
        field: field.to_string(),
        operator: operator.to_string(),
    };

    match field.to_ascii_lowercase().as_str() {
        "group" => match operator {
            "=" => Ok(Predicate::group(word(field, value)?, false)),
            "!=" => Ok(Predicate::group(word(field, value)?, true)),
            _ => Err(unsupported()),
        },
        "user" => match operator {
            "=" => Predicate::user(word(field, value)?, false),
            "!=" => Predicate::user(word(field, value)?, true),
            _ => Err(unsupported()),
        },
        "ip" => match operator {
            "=" => Ok(Predicate::Ip(Address::parse(value)?)),
            _ => Err(unsupported()),
        },
        "date" => {
            let date = parse_date(value)?;
            match operator {
                "<" => Ok(Predicate::DateBefore(date)),
                ">" => Ok(Predicate::DateAfter(date)),
                "<=" => Ok(Predicate::DateBefore(shift(date, 1, value)?)),
                ">=" => Ok(Predicate::DateAfter(shift(date, -1, value)?)),
                _ => Err(unsupported()),
            }
        }
        _ => Err(ParseError::UnknownField(field.to_string())),
    }
}

/// Group names and user patterns must read back as the same single word
/// from rendered rule text.
fn word<'a>(field: &str, value: &'a str) -> Result<&'a str, ParseError> {
    let invalid = value.is_empty()
        || value.chars().any(|c| c.is_whitespace() || c == '(' || c == ')')
        || value.starts_with('=')
        || value.starts_with("!=")
        || KEYWORDS.iter().any(|k| value.eq_ignore_ascii_case(k));
    if invalid {
        return Err(ParseError::InvalidValue {
            field: field.to_ascii_lowercase(),
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Accepts `yyyy-MM-dd` and `dd.MM.yyyy`
pub fn parse_date(value: &str) -> Result<NaiveDate, ParseError> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .ok_or_else(|| ParseError::InvalidDate(value.to_string()))
}

fn shift(date: NaiveDate, days: i64, value: &str) -> Result<NaiveDate, ParseError> {
    date.checked_add_signed(Duration::days(days))
        .ok_or_else(|| ParseError::InvalidDate(value.to_string()))
}
