//! Record of every domain value observed on the wire.

use std::collections::BTreeSet;

use super::message::DomainId;

/// Append-only set of observed domains/subdomains.
///
/// Grows regardless of the configured filter. The value space is small
/// (256 numbers, or 15-character names), so nothing is ever evicted.
#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    seen: BTreeSet<DomainId>,
}

impl DomainRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `domain`. Returns `true` if it had not been seen before.
    pub fn observe(&mut self, domain: DomainId) -> bool {
        self.seen.insert(domain)
    }

    /// Whether `domain` has been seen.
    #[must_use]
    pub fn contains(&self, domain: &DomainId) -> bool {
        self.seen.contains(domain)
    }

    /// Snapshot of everything seen so far, in sorted order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DomainId> {
        self.seen.iter().copied().collect()
    }

    /// Number of distinct values seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
