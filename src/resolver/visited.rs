use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::package::PackageIdentity;

/// Canonical keys of every package reached during one resolution run.
///
/// Shared by all concurrent branches. The only mutation is [`insert`], which
/// checks and inserts under one lock so two branches can never both claim
/// the same package.
///
/// [`insert`]: VisitedSet::insert
#[derive(Debug, Default)]
pub struct VisitedSet {
    keys: Mutex<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `identity`. Returns `true` for the first caller only.
    pub fn insert(&self, identity: &PackageIdentity) -> bool {
        self.lock().insert(identity.key().to_string())
    }

    pub fn contains(&self, identity: &PackageIdentity) -> bool {
        self.lock().contains(identity.key())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted snapshot of the lower-cased canonical keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().iter().cloned().collect();
        keys.sort_unstable();
        keys
    }

    // A panic elsewhere cannot leave the set half-updated.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FromIterator<PackageIdentity> for VisitedSet {
    fn from_iter<I: IntoIterator<Item = PackageIdentity>>(iter: I) -> Self {
        let set = Self::new();
        for identity in iter {
            set.insert(&identity);
        }
        set
    }
}
