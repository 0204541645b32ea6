//! Principal/session provider and in-process sessions
//!
//! The engine reads the current principal, roles, source address and login
//! time through [`SessionContext`]. Each session owns its [`DecisionCache`];
//! the [`SessionRegistry`] tracks live sessions so rule changes can
//! invalidate cached decisions everywhere.

use super::address::Address;
use super::cache::{DecisionCache, SubjectKey};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// What the engine needs to know about the requesting session
pub trait SessionContext: Send + Sync {
    fn session_id(&self) -> &str;

    fn current_principal_id(&self) -> String;

    fn current_roles(&self) -> HashSet<String>;

    fn current_source_address(&self) -> Option<Address>;

    fn current_login_time(&self) -> DateTime<Utc>;

    fn is_super_user(&self, principal_id: &str) -> bool;

    fn decision_cache(&self) -> &DecisionCache;

    /// Role check used during evaluation
    ///
    /// Called once per `group` clause. The default copies the whole role set
    /// through [`Self::current_roles`]; implementations holding the roles
    /// should override it with a direct lookup, as [`UserSession`] does.
    fn is_user_in_role(&self, role: &str) -> bool {
        self.current_roles().contains(role)
    }
}

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub roles: HashSet<String>,
}

impl Principal {
    pub fn new<I, S>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Principal {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn guest() -> Self {
        Principal::new("guest", Vec::<String>::new())
    }
}

/// In-process session
pub struct UserSession {
    id: String,
    principal: RwLock<Principal>,
    source_address: RwLock<Option<Address>>,
    login_time: RwLock<DateTime<Utc>>,
    super_user: String,
    decisions: DecisionCache,
}

impl UserSession {
    pub fn new(
        id: impl Into<String>,
        principal: Principal,
        source_address: Option<Address>,
        super_user: impl Into<String>,
        cache_capacity: usize,
    ) -> Self {
        UserSession {
            id: id.into(),
            principal: RwLock::new(principal),
            source_address: RwLock::new(source_address),
            login_time: RwLock::new(Utc::now()),
            super_user: super_user.into(),
            decisions: DecisionCache::new(cache_capacity),
        }
    }

    /// Switch principal and start a new login epoch
    ///
    /// The login time strictly advances, so every previously cached
    /// decision becomes stale.
    pub fn relogin(&self, principal: Principal) {
        let mut login_time = self.login_time.write();
        let now = Utc::now();
        *login_time = if now > *login_time {
            now
        } else {
            *login_time + Duration::nanoseconds(1)
        };
        *self.principal.write() = principal;
        debug!("Session {} logged in again at {}", self.id, *login_time);
    }

    pub fn set_source_address(&self, address: Option<Address>) {
        *self.source_address.write() = address;
    }

    pub fn principal(&self) -> Principal {
        self.principal.read().clone()
    }
}

impl SessionContext for UserSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn current_principal_id(&self) -> String {
        self.principal.read().id.clone()
    }

    fn current_roles(&self) -> HashSet<String> {
        self.principal.read().roles.clone()
    }

    fn current_source_address(&self) -> Option<Address> {
        self.source_address.read().clone()
    }

    fn current_login_time(&self) -> DateTime<Utc> {
        *self.login_time.read()
    }

    fn is_super_user(&self, principal_id: &str) -> bool {
        principal_id == self.super_user
    }

    fn decision_cache(&self) -> &DecisionCache {
        &self.decisions
    }

    fn is_user_in_role(&self, role: &str) -> bool {
        self.principal.read().roles.contains(role)
    }
}

/// Live session table
///
/// Holds sessions weakly; a session dropped by its owner disappears from
/// bulk invalidation without being closed explicitly.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Weak<UserSession>>>,
    super_user: String,
    cache_capacity: usize,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(super_user: impl Into<String>, cache_capacity: usize) -> Self {
        SessionRegistry {
            sessions: RwLock::new(HashMap::new()),
            super_user: super_user.into(),
            cache_capacity,
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a session for `principal`
    pub fn open(&self, principal: Principal, source_address: Option<Address>) -> Arc<UserSession> {
        let id = format!("session-{:08}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(UserSession::new(
            id.clone(),
            principal,
            source_address,
            self.super_user.clone(),
            self.cache_capacity,
        ));
        self.sessions.write().insert(id.clone(), Arc::downgrade(&session));
        debug!("Opened {}", id);
        session
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<UserSession>> {
        self.sessions.read().get(session_id).and_then(Weak::upgrade)
    }

    pub fn close(&self, session_id: &str) -> bool {
        let closed = self.sessions.write().remove(session_id).is_some();
        if closed {
            debug!("Closed {}", session_id);
        }
        closed
    }

    /// Sessions still alive; dead entries are pruned
    pub fn live_sessions(&self) -> Vec<Arc<UserSession>> {
        let mut sessions = self.sessions.write();
        sessions.retain(|_, weak| weak.strong_count() > 0);
        sessions.values().filter_map(Weak::upgrade).collect()
    }

    pub fn len(&self) -> usize {
        self.live_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop one cached decision in every live session
    pub fn evict(&self, key: &SubjectKey) {
        for session in self.live_sessions() {
            session.decision_cache().evict(key);
        }
    }

    /// Drop cached decisions for `ids` in every live session
    ///
    /// Sessions that end while this runs are skipped.
    pub fn evict_all_for_ids(&self, ids: &[Option<&str>]) -> usize {
        let removed: usize = self
            .live_sessions()
            .iter()
            .map(|session| session.decision_cache().evict_all_for_ids(ids))
            .sum();
        info!("Invalidated {} cached decisions for {:?}", removed, ids);
        removed
    }
}
