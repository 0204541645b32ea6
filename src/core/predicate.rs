//! Leaf predicates and boolean connectives
//!
//! A predicate tree is immutable after parsing. All request state (principal,
//! roles, time, source address) arrives through [`EvaluationContext`], so
//! evaluation is pure for a given context.

use super::address::Address;
use super::pattern::UserPattern;
use super::tree::RuleNode;
use crate::error::ParseError;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Date format used when rendering date clauses
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Role membership capability, queried on demand during evaluation
pub trait RoleSource {
    fn has_role(&self, role: &str) -> bool;
}

impl RoleSource for HashSet<String> {
    fn has_role(&self, role: &str) -> bool {
        self.contains(role)
    }
}

impl RoleSource for BTreeSet<String> {
    fn has_role(&self, role: &str) -> bool {
        self.contains(role)
    }
}

impl<const N: usize> RoleSource for [&str; N] {
    fn has_role(&self, role: &str) -> bool {
        self.contains(&role)
    }
}

/// Everything a predicate may look at, built fresh per evaluation
pub struct EvaluationContext<'a> {
    pub principal_id: &'a str,
    pub roles: &'a dyn RoleSource,
    pub timestamp: DateTime<Utc>,
    pub source_address: Option<Address>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        principal_id: &'a str,
        roles: &'a dyn RoleSource,
        timestamp: DateTime<Utc>,
        source_address: Option<Address>,
    ) -> Self {
        EvaluationContext {
            principal_id,
            roles,
            timestamp,
            source_address,
        }
    }
}

/// Rule predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    True,
    False,
    /// Role membership, optionally negated (`group != NAME`)
    Group { name: String, negate: bool },
    /// Principal id match, optionally negated (`user != PATTERN`)
    User { pattern: UserPattern, negate: bool },
    Ip(Address),
    /// Evaluation time strictly before the start of the date (UTC)
    DateBefore(NaiveDate),
    /// Evaluation time strictly after the start of the date (UTC)
    DateAfter(NaiveDate),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn group(name: impl Into<String>, negate: bool) -> Self {
        Predicate::Group {
            name: name.into(),
            negate,
        }
    }

    pub fn user(pattern: impl Into<String>, negate: bool) -> Result<Self, ParseError> {
        Ok(Predicate::User {
            pattern: UserPattern::new(pattern)?,
            negate,
        })
    }

    pub fn and(children: Vec<Predicate>) -> Result<Self, ParseError> {
        if children.is_empty() {
            return Err(ParseError::EmptyConnective("and".to_string()));
        }
        Ok(Predicate::And(children))
    }

    pub fn or(children: Vec<Predicate>) -> Result<Self, ParseError> {
        if children.is_empty() {
            return Err(ParseError::EmptyConnective("or".to_string()));
        }
        Ok(Predicate::Or(children))
    }

    pub fn not(child: Predicate) -> Self {
        Predicate::Not(Box::new(child))
    }

    /// Evaluate against a context
    ///
    /// Missing context (no source address for an `ip` clause) evaluates to
    /// `false`. Connectives short-circuit; an empty `And`/`Or` is false.
    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> bool {
        match self {
            Predicate::True => true,
            Predicate::False => false,
            Predicate::Group { name, negate } => ctx.roles.has_role(name) ^ *negate,
            Predicate::User { pattern, negate } => pattern.matches(ctx.principal_id) ^ *negate,
            Predicate::Ip(address) => ctx
                .source_address
                .as_ref()
                .map_or(false, |source| address.contains(source)),
            Predicate::DateBefore(date) => ctx.timestamp < start_of_day(date),
            Predicate::DateAfter(date) => ctx.timestamp > start_of_day(date),
            Predicate::Not(child) => !child.evaluate(ctx),
            Predicate::And(children) => {
                !children.is_empty() && children.iter().all(|c| c.evaluate(ctx))
            }
            Predicate::Or(children) => children.iter().any(|c| c.evaluate(ctx)),
        }
    }

    /// Single-line textual form accepted by the compact parser
    pub fn render(&self) -> String {
        match self {
            Predicate::True => "true".to_string(),
            Predicate::False => "false".to_string(),
            Predicate::Group { name, negate } => format!("group {}{}", neg(*negate), name),
            Predicate::User { pattern, negate } => format!("user {}{}", neg(*negate), pattern),
            Predicate::Ip(address) => format!("ip {}", address),
            Predicate::DateBefore(date) => format!("date < {}", date.format(DATE_FORMAT)),
            Predicate::DateAfter(date) => format!("date > {}", date.format(DATE_FORMAT)),
            Predicate::Not(child) => format!("not {}", child.render_operand()),
            Predicate::And(children) => join(children, " and "),
            Predicate::Or(children) => join(children, " or "),
        }
    }

    fn render_operand(&self) -> String {
        match self {
            Predicate::And(_) | Predicate::Or(_) => format!("({})", self.render()),
            _ => self.render(),
        }
    }

    /// Structured-syntax equivalent
    pub fn to_structured(&self) -> RuleNode {
        match self {
            Predicate::True => RuleNode::boolean("true", Vec::new()),
            Predicate::False => RuleNode::boolean("false", Vec::new()),
            Predicate::Group { name, negate } => {
                RuleNode::condition("group", eq_op(*negate), name.as_str())
            }
            Predicate::User { pattern, negate } => {
                RuleNode::condition("user", eq_op(*negate), pattern.as_str())
            }
            Predicate::Ip(address) => RuleNode::condition("ip", "=", address.to_string()),
            Predicate::DateBefore(date) => {
                RuleNode::condition("date", "<", date.format(DATE_FORMAT).to_string())
            }
            Predicate::DateAfter(date) => {
                RuleNode::condition("date", ">", date.format(DATE_FORMAT).to_string())
            }
            Predicate::Not(child) => RuleNode::boolean("not", vec![child.to_structured()]),
            Predicate::And(children) => RuleNode::boolean(
                "and",
                children.iter().map(Predicate::to_structured).collect(),
            ),
            Predicate::Or(children) => RuleNode::boolean(
                "or",
                children.iter().map(Predicate::to_structured).collect(),
            ),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn start_of_day(date: &NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn neg(negate: bool) -> &'static str {
    if negate {
        "!= "
    } else {
        ""
    }
}

fn eq_op(negate: bool) -> &'static str {
    if negate {
        "!="
    } else {
        "="
    }
}

fn join(children: &[Predicate], separator: &str) -> String {
    children
        .iter()
        .map(Predicate::render_operand)
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn roles(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_group_predicate() {
        let r = roles(&["editor"]);
        let ctx = EvaluationContext::new("bob", &r, at(2024, 1, 1), None);

        assert!(Predicate::group("editor", false).evaluate(&ctx));
        assert!(!Predicate::group("admin", false).evaluate(&ctx));
        assert!(!Predicate::group("editor", true).evaluate(&ctx));
        assert!(Predicate::group("admin", true).evaluate(&ctx));
    }

    #[test]
    fn test_user_predicate() {
        let r = roles(&[]);
        let alice = EvaluationContext::new("alice", &r, at(2024, 1, 1), None);
        let bob = EvaluationContext::new("bob", &r, at(2024, 1, 1), None);

        let p = Predicate::user("al*", false).unwrap();
        assert!(p.evaluate(&alice));
        assert!(!p.evaluate(&bob));

        let p = Predicate::user("alice", true).unwrap();
        assert!(!p.evaluate(&alice));
        assert!(p.evaluate(&bob));
    }

    #[test]
    fn test_ip_predicate_fails_closed() {
        let r = roles(&[]);
        let net = Predicate::Ip(Address::parse("10.0.0.0/8").unwrap());

        let inside = EvaluationContext::new(
            "bob",
            &r,
            at(2024, 1, 1),
            Some(Address::parse("10.1.1.1").unwrap()),
        );
        let outside = EvaluationContext::new(
            "bob",
            &r,
            at(2024, 1, 1),
            Some(Address::parse("192.168.1.1").unwrap()),
        );
        let unknown = EvaluationContext::new("bob", &r, at(2024, 1, 1), None);

        assert!(net.evaluate(&inside));
        assert!(!net.evaluate(&outside));
        assert!(!net.evaluate(&unknown));
    }

    #[test]
    fn test_date_predicates_are_strict() {
        let r = roles(&[]);
        let midnight = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let ctx = EvaluationContext::new("bob", &r, midnight, None);

        assert!(!Predicate::DateBefore(date(2024, 6, 1)).evaluate(&ctx));
        assert!(!Predicate::DateAfter(date(2024, 6, 1)).evaluate(&ctx));
        assert!(Predicate::DateBefore(date(2024, 6, 2)).evaluate(&ctx));
        assert!(Predicate::DateAfter(date(2024, 5, 31)).evaluate(&ctx));
    }

    #[test]
    fn test_connectives() {
        let r = roles(&["editor"]);
        let ctx = EvaluationContext::new("carol", &r, at(2024, 1, 1), None);

        let p = Predicate::or(vec![
            Predicate::group("admin", false),
            Predicate::not(Predicate::user("bob", false).unwrap()),
        ])
        .unwrap();
        assert!(p.evaluate(&ctx));

        let p = Predicate::and(vec![Predicate::True, Predicate::False]).unwrap();
        assert!(!p.evaluate(&ctx));
    }

    #[test]
    fn test_empty_connectives_rejected() {
        assert_eq!(
            Predicate::and(vec![]),
            Err(ParseError::EmptyConnective("and".to_string()))
        );
        assert!(Predicate::or(vec![]).is_err());

        let r = roles(&[]);
        let ctx = EvaluationContext::new("x", &r, at(2024, 1, 1), None);
        assert!(!Predicate::And(vec![]).evaluate(&ctx));
        assert!(!Predicate::Or(vec![]).evaluate(&ctx));
    }

    #[test]
    fn test_render() {
        let p = Predicate::and(vec![
            Predicate::group("editor", false),
            Predicate::or(vec![
                Predicate::user("al*", true).unwrap(),
                Predicate::Ip(Address::parse("10.0.0.0/8").unwrap()),
            ])
            .unwrap(),
            Predicate::not(Predicate::DateAfter(date(2030, 1, 2))),
        ])
        .unwrap();

        assert_eq!(
            p.render(),
            "group editor and (user != al* or ip 10.0.0.0/255.0.0.0) and not date > 2030-01-02"
        );
    }

    #[test]
    fn test_to_structured() {
        let p = Predicate::or(vec![
            Predicate::group("admin", true),
            Predicate::DateBefore(date(2020, 1, 2)),
        ])
        .unwrap();

        assert_eq!(
            p.to_structured(),
            RuleNode::boolean(
                "or",
                vec![
                    RuleNode::condition("group", "!=", "admin"),
                    RuleNode::condition("date", "<", "2020-01-02"),
                ]
            )
        );
    }

    #[test]
    fn test_array_role_source() {
        let r = ["reader", "editor"];
        let ctx = EvaluationContext::new("x", &r, at(2024, 1, 1), None);
        assert!(Predicate::group("reader", false).evaluate(&ctx));
        assert!(!Predicate::group("admin", false).evaluate(&ctx));
    }
}
