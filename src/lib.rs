//! # Access Rules - Boolean Access Rule Engine
//!
//! `access-rules` decides whether a principal may exercise a permission on an
//! object. Rules are small boolean expressions over group membership, user
//! identity, source address and date:
//!
//! ```text
//! group editor or (user al* and ip 192.168.0.0/16 and date < 2030-01-01)
//! ```
//!
//! - **Two syntaxes**: compact text and a structured tree (JSON via serde)
//! - **Canonical rule text**: operand order does not matter, so equal rules
//!   are stored once and shared between objects
//! - **Per-session decision cache**: bounded LRU, invalidated when an
//!   object's rules change or the session logs in again
//! - **Super-user fallback**: permissions without a rule are granted to the
//!   configured super user only
//!
//! ## Quick Start
//!
//! ```rust
//! use access_rules::{AccessCoordinator, Principal, Result};
//!
//! # fn main() -> Result<()> {
//! let access = AccessCoordinator::builder().build()?;
//!
//! // Attach a rule to an object
//! access.add_rule(Some("doc_42"), "read", "group editor or user alice", "readers", None)?;
//!
//! // Evaluate for a session
//! let bob = access.sessions().open(Principal::new("bob", ["editor"]), None);
//! assert!(access.check_permission(bob.as_ref(), Some("doc_42"), "read")?);
//!
//! let carol = access.sessions().open(Principal::new("carol", Vec::<String>::new()), None);
//! assert!(!access.check_permission(carol.as_ref(), Some("doc_42"), "read")?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use access_rules::{AccessConfig, AccessCoordinator, Result};
//!
//! # fn main() -> Result<()> {
//! let config = AccessConfig::from_toml_str(r#"
//!     super_user = "root"
//!     cache_capacity = 500
//!     rule_id_prefix = "ACL"
//! "#)?;
//!
//! let access = AccessCoordinator::builder().config(config).build()?;
//! let id = access.add_rule(None, "create-doc", "group author", "", None)?;
//! assert_eq!(id, "ACL0000000001");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;

pub use crate::config::AccessConfig;
pub use crate::core::{
    canonical_string, canonical_text, canonicalize, AccessCoordinator, AccessCoordinatorBuilder,
    Address, DecisionCache, EvaluationContext, InMemoryRuleStore, Predicate, Principal,
    RuleDocument, RuleMapping, RuleNode, RuleParser, RuleSource, RuleStore, SessionContext,
    SessionRegistry, StoredRule, SubjectKey, UserSession,
};
pub use crate::error::{AccessError, ParseError, Result};
