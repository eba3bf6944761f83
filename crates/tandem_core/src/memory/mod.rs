//! # Memory Management
//!
//! Fixed-capacity slot bookkeeping for the shared record block.
//!
//! ## Design Philosophy
//!
//! Capacity is chosen once when the session starts. During simulation:
//! - Allocation and release are O(1)
//! - The free list lives inside a flat `i32` array, no per-slot boxes
//! - Growing means rebuilding the whole buffer, which steady state never does

mod slots;

pub use slots::{Slot, SlotAllocator, FREE_LIST_END};
