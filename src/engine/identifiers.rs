//! Unique identifiers for in-flight cases.
//!
//! Trace files are named after the case identifier, so two cases that share a
//! base name (`a/add.asm`, `b/add.asm`) must not be in flight under the same
//! identifier at once.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use rand::Rng;
use tracing::debug;

use crate::cases::TestCase;
use crate::{JudgeError, JudgeResult, short_hash};

/// Identifiers currently claimed by running cases.
#[derive(Debug, Default)]
pub struct IdentifierSet {
    active: Mutex<HashSet<String>>,
}

/// Releases its identifier when dropped.
#[derive(Debug)]
pub struct IdentifierGuard<'a> {
    set: &'a IdentifierSet,
    identifier: String,
}

impl IdentifierGuard<'_> {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Drop for IdentifierGuard<'_> {
    fn drop(&mut self) {
        self.set.release(&self.identifier);
    }
}

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_insert(&self, identifier: &str) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.insert(identifier.to_string())
    }

    fn release(&self, identifier: &str) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(identifier);
    }

    pub fn is_active(&self, identifier: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim an identifier for `case`.
    ///
    /// Tries the base name, then the base name suffixed with a hash of the
    /// program, then with a random six-digit number.
    pub fn claim(&self, case: &TestCase) -> JudgeResult<IdentifierGuard<'_>> {
        let base = &case.identifier;
        if self.try_insert(base) {
            return Ok(self.guard(base.clone()));
        }

        let content = std::fs::read(&case.path)
            .unwrap_or_else(|_| case.path.to_string_lossy().as_bytes().to_vec());
        let hashed = format!("{base}-{}", short_hash(&content));
        if self.try_insert(&hashed) {
            debug!(base = %base, identifier = %hashed, "identifier collision, using content hash");
            return Ok(self.guard(hashed));
        }

        let random = format!("{base}-{}", rand::rng().random_range(100_000..1_000_000));
        if self.try_insert(&random) {
            debug!(base = %base, identifier = %random, "identifier collision, using random suffix");
            return Ok(self.guard(random));
        }

        Err(JudgeError::NamingConflict { identifier: base.clone() })
    }

    fn guard(&self, identifier: String) -> IdentifierGuard<'_> {
        IdentifierGuard { set: self, identifier }
    }
}
