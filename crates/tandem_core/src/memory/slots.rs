//! # Slot Allocator
//!
//! Maps entity identifiers to fixed record slots in the shared buffer.

use std::collections::HashMap;
use std::fmt;

use tandem_shared::EntityId;

use crate::error::{SlotError, SlotResult};

/// Terminates the embedded free list.
pub const FREE_LIST_END: i32 = -1;

/// Index of a record in the shared record block.
///
/// Only meaningful inside the simulator and inside one published snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Slot(u32);

impl Slot {
    /// Wraps a raw slot index.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Returns the raw index as `usize` for slicing.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// Fixed-capacity allocator of record slots.
///
/// Free slots form a singly linked list threaded through `next_free`: each
/// free slot holds the index of the next free slot, the last one holds
/// [`FREE_LIST_END`]. Allocation pops the head, release pushes onto it.
///
/// Releasing a slot leaves its record untouched. The handoff guarantees the
/// consumer never reads a slot absent from the snapshot's roster, so stale
/// contents are harmless until the next owner overwrites them.
///
/// # Example
///
/// ```rust,ignore
/// let mut slots = SlotAllocator::new(3);
///
/// let a = slots.allocate(EntityId::new("a"))?; // slot 0
/// let b = slots.allocate(EntityId::new("b"))?; // slot 1
/// slots.free(&EntityId::new("b"));
///
/// // The most recently freed slot is handed out first
/// assert_eq!(slots.allocate(EntityId::new("d"))?, b);
/// ```
pub struct SlotAllocator {
    /// Embedded free list, one link per slot.
    next_free: Box<[i32]>,
    /// Head of the free list.
    head: i32,
    /// Slot -> identifier.
    owners: Box<[Option<EntityId>]>,
    /// Identifier -> slot.
    slots: HashMap<EntityId, Slot>,
}

impl SlotAllocator {
    /// Creates an allocator with every slot free.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not fit the `i32` free list.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        let last = i32::try_from(capacity).expect("capacity must fit in an i32 free list") - 1;

        // 0 -> 1 -> ... -> capacity-1 -> END
        let next_free: Vec<i32> = (0..=last)
            .map(|i| if i == last { FREE_LIST_END } else { i + 1 })
            .collect();

        Self {
            next_free: next_free.into_boxed_slice(),
            head: 0,
            owners: vec![None; capacity as usize].into_boxed_slice(),
            slots: HashMap::with_capacity(capacity as usize),
        }
    }

    /// Returns the fixed capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.owners.len() as u32
    }

    /// Returns the number of live entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no entity is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns true if the free list is exhausted.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.head == FREE_LIST_END
    }

    /// Assigns a slot to `id`.
    ///
    /// This is a **O(1)** operation.
    ///
    /// # Errors
    ///
    /// [`SlotError::CapacityExceeded`] when every slot is live, and
    /// [`SlotError::AlreadyAllocated`] when `id` already owns one. The table
    /// is unchanged in both cases.
    pub fn allocate(&mut self, id: EntityId) -> SlotResult<Slot> {
        if self.slots.contains_key(&id) {
            return Err(SlotError::AlreadyAllocated(id));
        }
        if self.head == FREE_LIST_END {
            return Err(SlotError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }

        #[allow(clippy::cast_sign_loss)]
        let slot = Slot::new(self.head as u32);
        self.head = self.next_free[slot.as_usize()];
        self.next_free[slot.as_usize()] = FREE_LIST_END;

        self.owners[slot.as_usize()] = Some(id.clone());
        self.slots.insert(id, slot);

        Ok(slot)
    }

    /// Releases the slot owned by `id`.
    ///
    /// This is a **O(1)** operation. Unknown identifiers are a no-op.
    ///
    /// # Returns
    ///
    /// The released slot, or None if `id` owned nothing.
    pub fn free(&mut self, id: &EntityId) -> Option<Slot> {
        let slot = self.slots.remove(id)?;

        self.owners[slot.as_usize()] = None;
        self.next_free[slot.as_usize()] = self.head;
        #[allow(clippy::cast_possible_wrap)]
        {
            self.head = slot.index() as i32;
        }

        Some(slot)
    }

    /// Looks up the slot owned by `id`.
    #[inline]
    #[must_use]
    pub fn slot_of(&self, id: &EntityId) -> Option<Slot> {
        self.slots.get(id).copied()
    }

    /// Looks up the identifier that owns `slot`.
    #[inline]
    #[must_use]
    pub fn owner_of(&self, slot: Slot) -> Option<&EntityId> {
        self.owners.get(slot.as_usize())?.as_ref()
    }

    /// Iterates live entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &EntityId)> {
        self.owners
            .iter()
            .enumerate()
            .filter_map(|(index, owner)| owner.as_ref().map(|id| (Slot::new(index as u32), id)))
    }

    /// Walks the free list from its head.
    ///
    /// Intended for diagnostics and tests; O(free slots).
    pub fn free_slots(&self) -> impl Iterator<Item = Slot> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            if cursor == FREE_LIST_END {
                return None;
            }
            #[allow(clippy::cast_sign_loss)]
            let slot = Slot::new(cursor as u32);
            cursor = self.next_free[slot.as_usize()];
            Some(slot)
        })
    }
}
