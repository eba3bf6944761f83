//! Header and per-body record offsets, plus typed views over them.

use tandem_shared::Mat4;

use crate::memory::Slot;

// =============================================================================
// HEADER
// =============================================================================

/// Buffer state flag (`u32`, see `BufferState`).
pub const HEADER_STATE: usize = 0;
/// Duration of the last step in milliseconds (`f32`).
pub const HEADER_STEP_DURATION: usize = 1;
/// Seconds since the simulator started when the last step ran (`f32`).
pub const HEADER_STEP_TIMESTAMP: usize = 2;
/// Engine sub-steps taken by the last step (`u32`).
pub const HEADER_SUB_STEPS: usize = 3;
/// Words in the header.
pub const HEADER_SIZE: usize = 4;

// =============================================================================
// BODY RECORD
// =============================================================================

/// Column-major 4x4 world transform (`f32` x 16).
pub const MATRIX_OFFSET: usize = 0;
/// Linear speed (`f32`).
pub const LINEAR_SPEED_OFFSET: usize = 16;
/// Angular speed (`f32`).
pub const ANGULAR_SPEED_OFFSET: usize = 17;
/// First collision slot index (`i32`).
pub const COLLISIONS_OFFSET: usize = 18;
/// Collision entries per body; contacts beyond this are dropped.
pub const MAX_COLLISIONS: usize = 8;
/// Words per body record.
pub const BODY_DATA_SIZE: usize = COLLISIONS_OFFSET + MAX_COLLISIONS;

/// Marks an unused collision entry.
pub const NO_COLLISION: i32 = -1;

/// Read-only view of one body record.
#[derive(Clone, Copy)]
pub struct BodyRecord<'a> {
    words: &'a [u32],
}

impl<'a> BodyRecord<'a> {
    pub(crate) fn new(words: &'a [u32]) -> Self {
        debug_assert_eq!(words.len(), BODY_DATA_SIZE);
        Self { words }
    }

    #[inline]
    fn floats(&self) -> &'a [f32] {
        let words: &'a [u32] = self.words;
        bytemuck::cast_slice(&words[..COLLISIONS_OFFSET])
    }

    /// World transform.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_slice(&self.floats()[MATRIX_OFFSET..MATRIX_OFFSET + 16])
    }

    /// Linear speed.
    #[inline]
    #[must_use]
    pub fn linear_speed(&self) -> f32 {
        self.floats()[LINEAR_SPEED_OFFSET]
    }

    /// Angular speed.
    #[inline]
    #[must_use]
    pub fn angular_speed(&self) -> f32 {
        self.floats()[ANGULAR_SPEED_OFFSET]
    }

    /// Raw collision entries, [`NO_COLLISION`] included.
    #[inline]
    #[must_use]
    pub fn collision_words(&self) -> &'a [i32] {
        let words: &'a [u32] = self.words;
        bytemuck::cast_slice(&words[COLLISIONS_OFFSET..])
    }

    /// Slots this body currently touches.
    pub fn collisions(&self) -> impl Iterator<Item = Slot> + 'a {
        self.collision_words()
            .iter()
            .take_while(|&&index| index != NO_COLLISION)
            .filter_map(|&index| u32::try_from(index).ok().map(Slot::new))
    }
}

/// Mutable view of one body record.
pub struct BodyRecordMut<'a> {
    words: &'a mut [u32],
}

impl<'a> BodyRecordMut<'a> {
    pub(crate) fn new(words: &'a mut [u32]) -> Self {
        debug_assert_eq!(words.len(), BODY_DATA_SIZE);
        Self { words }
    }

    #[inline]
    fn floats_mut(&mut self) -> &mut [f32] {
        bytemuck::cast_slice_mut(&mut self.words[..COLLISIONS_OFFSET])
    }

    /// Read-only view of the same record.
    #[must_use]
    pub fn as_record(&self) -> BodyRecord<'_> {
        BodyRecord::new(self.words)
    }

    /// Writes the world transform.
    pub fn set_matrix(&mut self, matrix: &Mat4) {
        self.floats_mut()[MATRIX_OFFSET..MATRIX_OFFSET + 16].copy_from_slice(&matrix.to_cols_array());
    }

    /// Writes both speeds.
    pub fn set_speeds(&mut self, linear: f32, angular: f32) {
        let floats = self.floats_mut();
        floats[LINEAR_SPEED_OFFSET] = linear;
        floats[ANGULAR_SPEED_OFFSET] = angular;
    }

    /// Rewrites the collision entries.
    ///
    /// Takes at most [`MAX_COLLISIONS`] slots; the rest are dropped. Unused
    /// entries are set to [`NO_COLLISION`].
    ///
    /// # Returns
    ///
    /// Number of entries written.
    pub fn set_collisions(&mut self, slots: impl IntoIterator<Item = Slot>) -> usize {
        let entries: &mut [i32] = bytemuck::cast_slice_mut(&mut self.words[COLLISIONS_OFFSET..]);
        let mut written = 0;
        for slot in slots.into_iter().take(MAX_COLLISIONS) {
            entries[written] = i32::try_from(slot.index()).unwrap_or(NO_COLLISION);
            written += 1;
        }
        entries[written..].fill(NO_COLLISION);
        written
    }
}
