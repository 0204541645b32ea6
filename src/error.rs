//! Error types for rule parsing, authoring and evaluation

use thiserror::Error;

/// Errors raised while turning rule text or rule trees into predicates
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A clause matched none of the known leaf patterns
    #[error("Unknown clause: '{0}'")]
    UnknownClause(String),

    /// A structured condition named an unrecognized field
    #[error("Unknown condition field: '{0}'")]
    UnknownField(String),

    /// A field was combined with an operator it does not support
    #[error("Unsupported operator '{operator}' for field '{field}'")]
    UnknownOperator { field: String, operator: String },

    /// Date value in neither `yyyy-MM-dd` nor `dd.MM.yyyy` form
    #[error("Invalid date: '{0}'")]
    InvalidDate(String),

    /// Malformed IP address or mask
    #[error("Unresolved address: '{0}'")]
    UnresolvedAddress(String),

    /// `and`/`or` without operands
    #[error("Connective '{0}' requires at least one operand")]
    EmptyConnective(String),

    /// `not` with anything other than one operand
    #[error("'not' takes exactly one operand, got {0}")]
    NotArity(usize),

    #[error("Unbalanced parentheses in '{0}'")]
    UnbalancedParentheses(String),

    #[error("Unexpected token: '{0}'")]
    UnexpectedToken(String),

    #[error("Empty rule expression")]
    EmptyExpression,

    /// User pattern that could not be compiled
    #[error("Invalid user pattern: '{0}'")]
    InvalidPattern(String),

    /// Condition value the compact syntax cannot carry as a single word
    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },
}

/// Engine-level errors
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The backing rule/mapping store failed; never retried here
    #[error("Rule store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("No rule mapped for {object_id:?}/{permission}")]
    MappingNotFound {
        object_id: Option<String>,
        permission: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration format error: {0}")]
    ConfigFormat(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AccessError>;
