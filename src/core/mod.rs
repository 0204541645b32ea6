//! Access rule engine
//!
//! Leaf-first:
//! - [`address`]: IP network containment
//! - [`pattern`]: user-id wildcards
//! - [`predicate`]: predicate tree and evaluation context
//! - [`clause`], [`parser`], [`tree`]: compact and structured rule syntax
//! - [`canonical`]: canonical rule text for deduplication
//! - [`cache`], [`session`]: per-session decision caching
//! - [`store`], [`allocator`]: rule storage boundary and rule ids
//! - [`coordinator`]: the facade

pub mod address;
pub mod allocator;
pub mod cache;
pub mod canonical;
pub mod clause;
pub mod coordinator;
pub mod parser;
pub mod pattern;
pub mod predicate;
pub mod session;
pub mod store;
pub mod tree;

pub use address::Address;
pub use cache::{DecisionCache, SubjectKey};
pub use canonical::{canonical_string, canonical_text, canonicalize, canonicalize_tree};
pub use coordinator::{AccessCoordinator, AccessCoordinatorBuilder};
pub use parser::{RuleParser, RuleSource};
pub use predicate::{EvaluationContext, Predicate, RoleSource};
pub use session::{Principal, SessionContext, SessionRegistry, UserSession};
pub use store::{InMemoryRuleStore, RuleMapping, RuleStore, StoredRule};
pub use tree::{RuleDocument, RuleNode};
