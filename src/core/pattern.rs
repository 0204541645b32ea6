//! Wildcard patterns for `user` clauses
//!
//! `*` matches any run of characters (including none); everything else is
//! literal. Patterns are anchored at both ends.

use crate::error::ParseError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Compiled user-id pattern
///
/// Equality and hashing use the pattern text only.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserPattern {
    text: String,
    // None for wildcard-free patterns, which compare directly
    matcher: Option<Regex>,
}

impl UserPattern {
    /// Compile a pattern
    ///
    /// # Examples
    /// ```
    /// use access_rules::core::pattern::UserPattern;
    ///
    /// let p = UserPattern::new("al*").unwrap();
    /// assert!(p.matches("alice"));
    /// assert!(p.matches("al"));
    /// assert!(!p.matches("bob"));
    /// ```
    pub fn new(text: impl Into<String>) -> Result<Self, ParseError> {
        let text = text.into();
        let matcher = if text.contains('*') {
            Some(Self::compile(&text)?)
        } else {
            None
        };
        Ok(UserPattern { text, matcher })
    }

    /// Translate to an anchored regex: `*` becomes `.*`, the rest is escaped
    fn compile(text: &str) -> Result<Regex, ParseError> {
        let body = text
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("^(?s:{})$", body))
            .map_err(|_| ParseError::InvalidPattern(text.to_string()))
    }

    pub fn matches(&self, principal_id: &str) -> bool {
        match &self.matcher {
            Some(re) => re.is_match(principal_id),
            None => self.text == principal_id,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.matcher.is_some()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl PartialEq for UserPattern {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for UserPattern {}

impl Hash for UserPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Debug for UserPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UserPattern").field(&self.text).finish()
    }
}

impl fmt::Display for UserPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TryFrom<String> for UserPattern {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        UserPattern::new(value)
    }
}

impl From<UserPattern> for String {
    fn from(pattern: UserPattern) -> Self {
        pattern.text
    }
}
