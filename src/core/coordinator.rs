//! Access coordinator
//!
//! The facade the rest of the system calls. Decisions go through the
//! session's decision cache; on a miss the mapped rule is looked up,
//! evaluated against a fresh context and cached. Without a mapped rule only
//! the super user is granted.
//!
//! Authoring parses and canonicalizes rule text, reuses an existing stored
//! rule with the same canonical text when there is one, and otherwise
//! allocates a new rule id. A rule created for a mapping write that then
//! fails is deleted again. Decisions evaluated while an invalidation ran are
//! returned but not cached.

use super::allocator::RuleIdAllocator;
use super::cache::SubjectKey;
use super::canonical::canonical_text;
use super::parser::{RuleParser, RuleSource};
use super::predicate::{EvaluationContext, Predicate, RoleSource};
use super::session::{SessionContext, SessionRegistry};
use super::store::{InMemoryRuleStore, RuleMapping, RuleStore, StoredRule};
use crate::config::AccessConfig;
use crate::error::{AccessError, Result};
use ahash::AHashMap;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stored rule chosen for an authoring call
struct ResolvedRule {
    rule_id: String,
    text: String,
    created: bool,
}

/// Role lookups routed to the session at evaluation time
struct SessionRoles<'a>(&'a dyn SessionContext);

impl RoleSource for SessionRoles<'_> {
    fn has_role(&self, role: &str) -> bool {
        self.0.is_user_in_role(role)
    }
}

pub struct AccessCoordinator {
    config: AccessConfig,
    store: Arc<dyn RuleStore>,
    sessions: Arc<SessionRegistry>,
    allocator: RuleIdAllocator,
    // canonical rule text -> rule id; only grows
    rule_ids: RwLock<AHashMap<String, String>>,
}

impl AccessCoordinator {
    pub fn builder() -> AccessCoordinatorBuilder {
        AccessCoordinatorBuilder::new()
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    /// May the session's principal exercise `permission` on `object_id`?
    ///
    /// `None` as object id checks an a-priori permission.
    pub fn check_permission(
        &self,
        session: &dyn SessionContext,
        object_id: Option<&str>,
        permission: &str,
    ) -> Result<bool> {
        let key = SubjectKey::new(object_id, permission);
        let login_time = session.current_login_time();

        if let Some(allowed) = session.decision_cache().get(&key, login_time) {
            debug!("Cache hit for {:?}: {}", key, allowed);
            return Ok(allowed);
        }

        let generation = session.decision_cache().generation();
        let allowed = match self.store.get_rule_id(object_id, permission)? {
            None => {
                let principal = session.current_principal_id();
                let allowed = session.is_super_user(&principal);
                debug!(
                    "No rule for {:?}; super-user fallback for '{}': {}",
                    key, principal, allowed
                );
                allowed
            }
            Some(rule_id) => match self.store.get_rule(&rule_id)? {
                Some(rule) => self.evaluate_stored(session, &rule),
                None => {
                    warn!("Mapping for {:?} references missing rule {}", key, rule_id);
                    false
                }
            },
        };

        if !session
            .decision_cache()
            .put_if_current(key, allowed, login_time, generation)
        {
            debug!("Invalidated while evaluating; not caching");
        }
        Ok(allowed)
    }

    /// A-priori permission check
    pub fn check_a_priori(&self, session: &dyn SessionContext, permission: &str) -> Result<bool> {
        self.check_permission(session, None, permission)
    }

    /// Evaluate a stored rule by id, bypassing the cache
    pub fn check_rule(&self, session: &dyn SessionContext, rule_id: &str) -> Result<bool> {
        let rule = self
            .store
            .get_rule(rule_id)?
            .ok_or_else(|| AccessError::RuleNotFound(rule_id.to_string()))?;
        Ok(self.evaluate_stored(session, &rule))
    }

    /// Parse and evaluate an ad-hoc rule, bypassing the cache
    pub fn check_expression(
        &self,
        session: &dyn SessionContext,
        rule: impl Into<RuleSource>,
    ) -> Result<bool> {
        let predicate = RuleParser::parse_source(&rule.into())?;
        Ok(self.evaluate(session, &predicate))
    }

    fn evaluate_stored(&self, session: &dyn SessionContext, rule: &StoredRule) -> bool {
        match rule.parsed() {
            Ok(predicate) => self.evaluate(session, predicate),
            Err(e) => {
                warn!("Stored rule {} does not parse, denying: {}", rule.rule_id, e);
                false
            }
        }
    }

    fn evaluate(&self, session: &dyn SessionContext, predicate: &Predicate) -> bool {
        let principal = session.current_principal_id();
        let roles = SessionRoles(session);
        let ctx = EvaluationContext::new(
            &principal,
            &roles,
            Utc::now(),
            session.current_source_address(),
        );
        predicate.evaluate(&ctx)
    }

    /// Attach a rule to (object, permission), replacing any existing mapping
    ///
    /// Returns the id of the stored rule used, which may be shared with other
    /// mappings. A parse failure aborts before anything is written; a failed
    /// mapping write leaves no new rule behind.
    pub fn add_rule(
        &self,
        object_id: Option<&str>,
        permission: &str,
        rule: impl Into<RuleSource>,
        description: &str,
        creator: Option<&str>,
    ) -> Result<String> {
        let creator = creator.unwrap_or(self.config.creator.as_str());
        let replace = self.store.get_rule_id(object_id, permission)?.is_some();
        let resolved = self.resolve_rule(&rule.into(), description, creator)?;
        let rule_id = self.commit(resolved, object_id, permission, creator, replace)?;

        info!("Mapped {:?}/{} to rule {}", object_id, permission, rule_id);
        self.invalidate(&[object_id]);
        Ok(rule_id)
    }

    /// Replace the rule of an existing mapping
    pub fn update_rule(
        &self,
        object_id: Option<&str>,
        permission: &str,
        rule: impl Into<RuleSource>,
        description: &str,
        creator: Option<&str>,
    ) -> Result<String> {
        if self.store.get_rule_id(object_id, permission)?.is_none() {
            return Err(AccessError::MappingNotFound {
                object_id: object_id.map(str::to_string),
                permission: permission.to_string(),
            });
        }

        let creator = creator.unwrap_or(self.config.creator.as_str());
        let resolved = self.resolve_rule(&rule.into(), description, creator)?;
        let rule_id = self.commit(resolved, object_id, permission, creator, true)?;

        info!("Remapped {:?}/{} to rule {}", object_id, permission, rule_id);
        self.invalidate(&[object_id]);
        Ok(rule_id)
    }

    /// Remove one mapping; stored rules are left for housekeeping
    pub fn remove_rule(&self, object_id: Option<&str>, permission: &str) -> Result<bool> {
        let removed = self.store.delete_mapping(object_id, permission)?;
        if removed {
            info!("Removed mapping {:?}/{}", object_id, permission);
            self.invalidate(&[object_id]);
        }
        Ok(removed)
    }

    /// Remove every mapping of an object; returns how many
    pub fn remove_all_rules(&self, object_id: Option<&str>) -> Result<usize> {
        let mut removed = 0;
        for permission in self.store.permissions_for(object_id)? {
            if self.store.delete_mapping(object_id, &permission)? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} mappings of {:?}", removed, object_id);
            self.invalidate(&[object_id]);
        }
        Ok(removed)
    }

    pub fn has_rule(&self, object_id: Option<&str>, permission: &str) -> Result<bool> {
        Ok(self.store.get_rule_id(object_id, permission)?.is_some())
    }

    pub fn has_any_rule(&self, object_id: Option<&str>) -> Result<bool> {
        Ok(!self.store.permissions_for(object_id)?.is_empty())
    }

    pub fn permissions_for(&self, object_id: Option<&str>) -> Result<Vec<String>> {
        self.store.permissions_for(object_id)
    }

    /// Stored rule mapped to (object, permission)
    pub fn rule_for(
        &self,
        object_id: Option<&str>,
        permission: &str,
    ) -> Result<Option<Arc<StoredRule>>> {
        match self.store.get_rule_id(object_id, permission)? {
            Some(rule_id) => self.store.get_rule(&rule_id),
            None => Ok(None),
        }
    }

    /// Drop cached decisions for these objects in every live session
    pub fn invalidate(&self, object_ids: &[Option<&str>]) -> usize {
        self.sessions.evict_all_for_ids(object_ids)
    }

    /// Find or create the stored rule for `source`
    ///
    /// The dedup table is left alone; [`Self::commit`] records the rule once
    /// its mapping is written.
    fn resolve_rule(
        &self,
        source: &RuleSource,
        description: &str,
        creator: &str,
    ) -> Result<ResolvedRule> {
        let predicate = RuleParser::parse_source(source)?;
        let text = canonical_text(&predicate);

        let known = self.rule_ids.read().get(&text).cloned();
        if let Some(rule_id) = known {
            if self.store.get_rule(&rule_id)?.is_some() {
                debug!("Reusing rule {} for '{}'", rule_id, text);
                return Ok(ResolvedRule { rule_id, text, created: false });
            }
        }

        if let Some(rule_id) = self
            .store
            .find_rule_ids_by_text(&text, description)?
            .into_iter()
            .next()
        {
            info!("Reusing stored rule {} for '{}'", rule_id, text);
            return Ok(ResolvedRule { rule_id, text, created: false });
        }

        let rule_id = self
            .allocator
            .next_id(&self.config.rule_id_prefix, self.store.as_ref())?;
        self.store.create_rule(StoredRule::new(
            rule_id.clone(),
            creator,
            Utc::now(),
            text.clone(),
            description,
        ))?;
        info!("Created rule {}: '{}'", rule_id, text);
        Ok(ResolvedRule { rule_id, text, created: true })
    }

    /// Write the mapping to a resolved rule
    ///
    /// On failure a rule created by this call is deleted again and the error
    /// returned; only a written mapping makes the rule known to dedup.
    fn commit(
        &self,
        resolved: ResolvedRule,
        object_id: Option<&str>,
        permission: &str,
        creator: &str,
        replace: bool,
    ) -> Result<String> {
        let mapping = self.mapping(object_id, permission, &resolved.rule_id, creator);
        let written = if replace {
            self.store.update_mapping(mapping)
        } else {
            self.store.create_mapping(mapping)
        };

        if let Err(e) = written {
            if resolved.created {
                match self.store.delete_rule(&resolved.rule_id) {
                    Ok(_) => debug!("Rolled back rule {}", resolved.rule_id),
                    Err(undo) => warn!(
                        "Rule {} left without mapping, delete failed: {}",
                        resolved.rule_id, undo
                    ),
                }
            }
            return Err(e);
        }

        self.rule_ids
            .write()
            .insert(resolved.text, resolved.rule_id.clone());
        Ok(resolved.rule_id)
    }

    fn mapping(
        &self,
        object_id: Option<&str>,
        permission: &str,
        rule_id: &str,
        creator: &str,
    ) -> RuleMapping {
        RuleMapping {
            object_id: object_id.map(str::to_string),
            permission: permission.to_string(),
            rule_id: rule_id.to_string(),
            creator: creator.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Builder for [`AccessCoordinator`]
///
/// # Examples
///
/// ```
/// use access_rules::core::coordinator::AccessCoordinator;
/// use access_rules::core::session::Principal;
///
/// # fn main() -> access_rules::Result<()> {
/// let access = AccessCoordinator::builder().build()?;
/// access.add_rule(Some("doc_1"), "read", "group editor or user alice", "readers", None)?;
///
/// let session = access.sessions().open(Principal::new("bob", ["editor"]), None);
/// assert!(access.check_permission(session.as_ref(), Some("doc_1"), "read")?);
/// # Ok(())
/// # }
/// ```
pub struct AccessCoordinatorBuilder {
    config: AccessConfig,
    store: Option<Arc<dyn RuleStore>>,
    sessions: Option<Arc<SessionRegistry>>,
}

impl AccessCoordinatorBuilder {
    pub fn new() -> Self {
        AccessCoordinatorBuilder {
            config: AccessConfig::default(),
            store: None,
            sessions: None,
        }
    }

    pub fn config(mut self, config: AccessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn RuleStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share a session registry; by default one is created from the config
    pub fn sessions(mut self, sessions: Arc<SessionRegistry>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn build(self) -> Result<AccessCoordinator> {
        self.config.validate()?;

        let store: Arc<dyn RuleStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryRuleStore::new()),
        };
        let sessions = self.sessions.unwrap_or_else(|| {
            Arc::new(SessionRegistry::new(
                self.config.super_user.clone(),
                self.config.cache_capacity,
            ))
        });

        info!(
            "Access coordinator ready (prefix '{}', cache capacity {})",
            self.config.rule_id_prefix, self.config.cache_capacity
        );

        Ok(AccessCoordinator {
            allocator: RuleIdAllocator::new(self.config.rule_id_width),
            config: self.config,
            store,
            sessions,
            rule_ids: RwLock::new(AHashMap::new()),
        })
    }
}

impl Default for AccessCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
