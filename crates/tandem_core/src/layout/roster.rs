//! Roster: which identifier lives in which slot, as of one snapshot.

use tandem_shared::{BodyKind, EntityId};

use crate::memory::Slot;

/// One live body in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosterEntry {
    /// Entity identifier.
    pub id: EntityId,
    /// Record slot for this snapshot.
    pub slot: Slot,
    /// Transform authority.
    pub kind: BodyKind,
}

/// Live bodies published alongside the record block.
///
/// The consumer resolves identifiers through the roster of the snapshot it
/// is reading, never through the simulator's allocator. A freed slot drops
/// out of the roster in the same snapshot that stops writing it.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
    /// Bumped on every rewrite so readers can cache lookups.
    generation: u64,
}

impl Roster {
    /// Returns the rewrite counter.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the number of live bodies.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no body is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in slot order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Replaces every entry and bumps the generation.
    pub fn replace(&mut self, entries: impl IntoIterator<Item = RosterEntry>) {
        self.entries.clear();
        self.entries.extend(entries);
        self.generation += 1;
    }

    /// Finds the entry for `id`; O(n).
    #[must_use]
    pub fn find(&self, id: &EntityId) -> Option<&RosterEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }
}
