//! Errors raised while building templates and group registries
//!
//! Both kinds are configuration errors: they surface once, at construction
//! time, and are never retried.

use thiserror::Error;

/// Output template parsing failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{` was opened but never closed
    #[error("Unterminated placeholder starting at offset {position}")]
    UnterminatedPlaceholder { position: usize },

    /// `{}` or `{:fmt}` without a property name
    #[error("Empty placeholder name at offset {position}")]
    EmptyPlaceholder { position: usize },

    /// A stray `}` that is not part of a `}}` escape
    #[error("Unmatched closing brace at offset {position}")]
    UnmatchedClosingBrace { position: usize },

    /// Level format other than `u`, `w`, `u3`, `w3` or `d`
    #[error("Unknown level format '{0}': expected one of u, w, u3, w3, d")]
    UnknownLevelFormat(String),

    /// Timestamp format that chrono cannot interpret
    #[error("Invalid timestamp format '{0}'")]
    InvalidTimestampFormat(String),
}

/// Group registry construction failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// Group names must contain at least one non-whitespace character
    #[error("Group name cannot be empty")]
    EmptyName,

    /// The group's output template did not parse
    #[error("Invalid output template for group '{group}': {source}")]
    InvalidTemplate {
        group: String,
        #[source]
        source: TemplateError,
    },
}
