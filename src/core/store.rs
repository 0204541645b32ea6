//! Rule and mapping storage boundary
//!
//! [`RuleStore`] is the narrow interface to wherever rules and mappings are
//! persisted. [`InMemoryRuleStore`] is the process-local implementation.

use super::parser::RuleParser;
use super::predicate::Predicate;
use crate::error::{AccessError, ParseError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// A persisted rule, shared by every mapping that references it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRule {
    pub rule_id: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    /// Canonical rule text
    pub expression: String,
    pub description: String,
    #[serde(skip)]
    parsed: OnceLock<Predicate>,
}

impl StoredRule {
    pub fn new(
        rule_id: impl Into<String>,
        creator: impl Into<String>,
        created_at: DateTime<Utc>,
        expression: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        StoredRule {
            rule_id: rule_id.into(),
            creator: creator.into(),
            created_at,
            expression: expression.into(),
            description: description.into(),
            parsed: OnceLock::new(),
        }
    }

    /// Parsed predicate, derived on first use and kept
    pub fn parsed(&self) -> std::result::Result<&Predicate, ParseError> {
        if let Some(predicate) = self.parsed.get() {
            return Ok(predicate);
        }
        let predicate = RuleParser::parse(&self.expression)?;
        Ok(self.parsed.get_or_init(|| predicate))
    }
}

/// (object, permission) → rule association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMapping {
    /// None for a-priori permissions
    pub object_id: Option<String>,
    pub permission: String,
    pub rule_id: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
}

/// Synchronous, authoritative rule/mapping storage
///
/// Failures surface as [`AccessError::StoreUnavailable`]; retrying is up to
/// the implementation.
pub trait RuleStore: Send + Sync {
    fn get_rule_id(&self, object_id: Option<&str>, permission: &str) -> Result<Option<String>>;

    fn create_mapping(&self, mapping: RuleMapping) -> Result<()>;

    /// Replace the mapping for the same (object, permission)
    fn update_mapping(&self, mapping: RuleMapping) -> Result<()>;

    /// Returns whether a mapping existed
    fn delete_mapping(&self, object_id: Option<&str>, permission: &str) -> Result<bool>;

    /// Permissions mapped for an object, sorted
    fn permissions_for(&self, object_id: Option<&str>) -> Result<Vec<String>>;

    fn get_rule(&self, rule_id: &str) -> Result<Option<Arc<StoredRule>>>;

    fn create_rule(&self, rule: StoredRule) -> Result<()>;

    /// Returns whether the rule existed
    fn delete_rule(&self, rule_id: &str) -> Result<bool>;

    fn find_rule_ids_by_text(&self, text: &str, description: &str) -> Result<BTreeSet<String>>;

    /// Smallest counter value not yet used under `prefix`
    fn next_free_rule_id(&self, prefix: &str) -> Result<u64>;
}

type MappingKey = (Option<String>, String);

/// Process-local store
///
/// Can be switched offline to exercise failure handling.
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<String, Arc<StoredRule>>>,
    mappings: RwLock<HashMap<MappingKey, RuleMapping>>,
    available: AtomicBool,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        InMemoryRuleStore {
            rules: RwLock::new(HashMap::new()),
            mappings: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.read().len()
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AccessError::StoreUnavailable(
                "in-memory store is offline".to_string(),
            ))
        }
    }

    fn key(object_id: Option<&str>, permission: &str) -> MappingKey {
        (object_id.map(str::to_string), permission.to_string())
    }
}

impl Default for InMemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore for InMemoryRuleStore {
    fn get_rule_id(&self, object_id: Option<&str>, permission: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self
            .mappings
            .read()
            .get(&Self::key(object_id, permission))
            .map(|m| m.rule_id.clone()))
    }

    fn create_mapping(&self, mapping: RuleMapping) -> Result<()> {
        self.check()?;
        let key = (mapping.object_id.clone(), mapping.permission.clone());
        self.mappings.write().insert(key, mapping);
        Ok(())
    }

    fn update_mapping(&self, mapping: RuleMapping) -> Result<()> {
        self.create_mapping(mapping)
    }

    fn delete_mapping(&self, object_id: Option<&str>, permission: &str) -> Result<bool> {
        self.check()?;
        Ok(self
            .mappings
            .write()
            .remove(&Self::key(object_id, permission))
            .is_some())
    }

    fn permissions_for(&self, object_id: Option<&str>) -> Result<Vec<String>> {
        self.check()?;
        let mut permissions: Vec<String> = self
            .mappings
            .read()
            .values()
            .filter(|m| m.object_id.as_deref() == object_id)
            .map(|m| m.permission.clone())
            .collect();
        permissions.sort();
        Ok(permissions)
    }

    fn get_rule(&self, rule_id: &str) -> Result<Option<Arc<StoredRule>>> {
        self.check()?;
        Ok(self.rules.read().get(rule_id).cloned())
    }

    fn create_rule(&self, rule: StoredRule) -> Result<()> {
        self.check()?;
        self.rules
            .write()
            .insert(rule.rule_id.clone(), Arc::new(rule));
        Ok(())
    }

    fn delete_rule(&self, rule_id: &str) -> Result<bool> {
        self.check()?;
        Ok(self.rules.write().remove(rule_id).is_some())
    }

    fn find_rule_ids_by_text(&self, text: &str, description: &str) -> Result<BTreeSet<String>> {
        self.check()?;
        Ok(self
            .rules
            .read()
            .values()
            .filter(|r| r.expression == text && r.description == description)
            .map(|r| r.rule_id.clone())
            .collect())
    }

    fn next_free_rule_id(&self, prefix: &str) -> Result<u64> {
        self.check()?;
        let highest = self
            .rules
            .read()
            .keys()
            .filter_map(|id| id.strip_prefix(prefix))
            .filter_map(|digits| digits.parse::<u64>().ok())
            .max();
        Ok(highest.map_or(1, |n| n + 1))
    }
}
