//! Trading domain entities.
//!
//! Every entity here is owned by a single user and mirrored as a protected
//! resource. This crate only holds the records and their validation rules
//! (no IO, no HTTP, no storage).

pub mod bot;
pub mod exchange;
pub mod runner;
pub mod strategy;

pub use bot::Bot;
pub use exchange::Exchange;
pub use runner::{Runner, RunnerKind};
pub use strategy::{Strategy, StrategyLanguage};

use botforge_core::{DomainError, DomainResult};

/// Longest accepted display name for any owned entity.
pub const MAX_NAME_LEN: usize = 128;

/// Normalize and validate an entity name.
pub(crate) fn validate_name(kind: &str, name: impl Into<String>) -> DomainResult<String> {
    let name = name.into().trim().to_string();
    if name.is_empty() {
        return Err(DomainError::validation(format!("{kind} name cannot be empty")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "{kind} name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name)
}
