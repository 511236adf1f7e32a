//! Source key to target id translation.

use std::collections::HashMap;

use crate::error::{MigrateError, Result};

/// Per-container sequential id allocation.
#[derive(Debug, Default, Clone)]
pub struct Sequences {
    next: HashMap<String, i64>,
}

impl Sequences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for `container`, starting at 1.
    pub fn next(&mut self, container: &str) -> i64 {
        let counter = self.next.entry(container.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Clone)]
struct Assignment {
    container: String,
    target: i64,
}

/// Maps every source document key to its newly assigned sequential id.
///
/// Ids are sequential per container. Source keys are unique across the whole
/// source store, so lookups need no container qualifier, and a key can be
/// assigned only once.
#[derive(Debug, Default, Clone)]
pub struct IdentifierTranslator {
    sequences: Sequences,
    assigned: HashMap<String, Assignment>,
}

impl IdentifierTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id of `container` for `source_key`.
    pub fn assign(&mut self, container: &str, source_key: &str) -> Result<i64> {
        if let Some(existing) = self.assigned.get(source_key) {
            return Err(MigrateError::DuplicateIdentifier {
                container: existing.container.clone(),
                key: source_key.to_string(),
            });
        }

        let target = self.sequences.next(container);
        self.assigned.insert(
            source_key.to_string(),
            Assignment {
                container: container.to_string(),
                target,
            },
        );
        Ok(target)
    }

    /// Target id of a previously assigned source key.
    pub fn resolve(&self, source_key: &str) -> Result<i64> {
        self.lookup(source_key)
            .ok_or_else(|| MigrateError::dangling(source_key, "no target id assigned"))
    }

    /// Like [`resolve`](Self::resolve), naming the referring field on failure.
    pub fn resolve_for(&self, source_key: &str, context: impl Into<String>) -> Result<i64> {
        self.lookup(source_key)
            .ok_or_else(|| MigrateError::dangling(source_key, context))
    }

    pub fn lookup(&self, source_key: &str) -> Option<i64> {
        self.assigned.get(source_key).map(|a| a.target)
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

/// Administrative-user ids, filled while the administrative model is
/// materialized and read when audit-user fields are remapped.
///
/// Without an administrative model in the registry there is nothing to remap
/// against, and every audit-user reference maps to no user.
#[derive(Debug, Default, Clone)]
pub struct AdminUserIds {
    ids: HashMap<String, i64>,
    without_admin_model: bool,
}

impl AdminUserIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids for a registry that holds no administrative model.
    pub fn without_admin_model() -> Self {
        Self {
            without_admin_model: true,
            ..Self::default()
        }
    }

    pub fn record(&mut self, source_key: &str, target: i64) {
        self.ids.insert(source_key.to_string(), target);
    }

    /// Target id of an administrative user. `None` when the registry has no
    /// administrative model; an unknown key otherwise is a dangling reference.
    pub fn remap(&self, source_key: &str, context: impl Into<String>) -> Result<Option<i64>> {
        if self.without_admin_model {
            return Ok(None);
        }
        self.ids
            .get(source_key)
            .copied()
            .map(Some)
            .ok_or_else(|| MigrateError::dangling(source_key, context))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
