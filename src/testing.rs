//! Testing utilities and mock implementations.
//!
//! These types are provided for use in tests. They may appear unused in
//! the library itself but are consumed by unit and integration tests.

#![allow(dead_code)]
#![allow(clippy::needless_pass_by_ref_mut)] // &mut self for ergonomics with RefCell

use crate::error::Result;
use crate::traits::{CompletionLog, RoleCatalog};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::BTreeSet;

/// A mock role catalog for testing.
///
/// Knows a fixed set of roles and records every role it was asked about.
#[derive(Debug, Default)]
pub struct MockRoleCatalog {
    roles: RefCell<BTreeSet<String>>,
    lookups: RefCell<Vec<String>>,
}

impl MockRoleCatalog {
    /// Create a catalog with no roles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog knowing `roles`.
    #[must_use]
    pub fn with_roles(roles: &[&str]) -> Self {
        let mut catalog = Self::new();
        for role in roles {
            catalog.add_role(role);
        }
        catalog
    }

    /// Add a known role.
    pub fn add_role(&mut self, role: &str) {
        self.roles.borrow_mut().insert(role.to_string());
    }

    /// Roles looked up so far, in call order.
    #[must_use]
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.borrow().clone()
    }
}

impl RoleCatalog for MockRoleCatalog {
    fn role_exists(&self, role: &str) -> bool {
        self.lookups.borrow_mut().push(role.to_string());
        self.roles.borrow().contains(role)
    }

    fn describe_role(&self, role: &str) -> String {
        format!("roles/{role}.md")
    }
}

/// A mock completion log for testing.
#[derive(Debug, Default)]
pub struct MockCompletionLog {
    completions: RefCell<Vec<(String, DateTime<Utc>)>>,
}

impl MockCompletionLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completion of `task_id` at `at`.
    pub fn record(&mut self, task_id: &str, at: DateTime<Utc>) {
        self.completions.borrow_mut().push((task_id.to_string(), at));
    }
}

impl CompletionLog for MockCompletionLog {
    fn count_completions_since(&self, task_id: Option<&str>, since: DateTime<Utc>) -> Result<usize> {
        Ok(self
            .completions
            .borrow()
            .iter()
            .filter(|(id, at)| *at >= since && task_id.map_or(true, |wanted| id == wanted))
            .count())
    }
}

/// A completion log that always fails, for testing error paths.
#[derive(Debug, Default)]
pub struct FailingCompletionLog {
    error_message: String,
}

impl FailingCompletionLog {
    /// Create a new failing log with the specified error message.
    #[must_use]
    pub fn new(error_message: impl Into<String>) -> Self {
        Self { error_message: error_message.into() }
    }
}

impl CompletionLog for FailingCompletionLog {
    fn count_completions_since(&self, _task_id: Option<&str>, _since: DateTime<Utc>) -> Result<usize> {
        Err(std::io::Error::other(self.error_message.clone()).into())
    }
}
