//! The frame buffer: everything one handoff moves between the two sides.

use std::collections::HashMap;

use tandem_shared::EntityId;

use super::debug::DebugDrawRecord;
use super::record::{
    BodyRecord, BodyRecordMut, BODY_DATA_SIZE, HEADER_SIZE, HEADER_STATE, HEADER_STEP_DURATION,
    HEADER_STEP_TIMESTAMP, HEADER_SUB_STEPS,
};
use super::roster::Roster;
use crate::error::SyncError;
use crate::memory::Slot;
use crate::sync::BufferState;

/// Sizes fixed when the session starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    /// Body slots in the record block.
    pub max_bodies: u32,
    /// Debug line vertices.
    pub debug_vertex_capacity: u32,
}

impl FrameLayout {
    /// Creates a layout.
    #[must_use]
    pub const fn new(max_bodies: u32, debug_vertex_capacity: u32) -> Self {
        Self {
            max_bodies,
            debug_vertex_capacity,
        }
    }

    /// Words in the header plus record block.
    #[must_use]
    pub const fn word_len(&self) -> usize {
        HEADER_SIZE + self.max_bodies as usize * BODY_DATA_SIZE
    }
}

/// Simulator-written telemetry in the header.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Telemetry {
    /// Duration of the last step in milliseconds.
    pub step_duration_ms: f32,
    /// Seconds since the simulator started when the last step ran.
    pub step_timestamp: f32,
    /// Engine sub-steps taken.
    pub sub_steps: u32,
}

/// Vertex and normal arrays of one soft body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SoftBodyRecord {
    vertices: Vec<f32>,
    normals: Vec<f32>,
}

impl SoftBodyRecord {
    /// Packed `xyz` positions.
    #[inline]
    #[must_use]
    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    /// Packed `xyz` normals.
    #[inline]
    #[must_use]
    pub fn normals(&self) -> &[f32] {
        &self.normals
    }

    /// Mutable access to both arrays for an engine to fill in place.
    pub fn arrays_mut(&mut self) -> (&mut Vec<f32>, &mut Vec<f32>) {
        (&mut self.vertices, &mut self.normals)
    }
}

/// Header, body records, debug draw, soft bodies and roster.
///
/// Exactly one side holds a `&mut FrameBuffer` at a time; the handoff
/// enforces it.
pub struct FrameBuffer {
    layout: FrameLayout,
    /// Header followed by `max_bodies` records.
    words: Box<[u32]>,
    debug: DebugDrawRecord,
    soft_bodies: HashMap<EntityId, SoftBodyRecord>,
    roster: Roster,
}

impl FrameBuffer {
    /// Allocates a zeroed buffer in the `Uninitialized` state.
    #[must_use]
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            layout,
            words: vec![0; layout.word_len()].into_boxed_slice(),
            debug: DebugDrawRecord::new(layout.debug_vertex_capacity),
            soft_bodies: HashMap::new(),
            roster: Roster::default(),
        }
    }

    /// Returns the layout this buffer was built for.
    #[inline]
    #[must_use]
    pub const fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Raw header and record words.
    #[inline]
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    // =========================================================================
    // HEADER
    // =========================================================================

    /// Decodes the state word.
    ///
    /// # Errors
    ///
    /// [`SyncError::CorruptState`] if the word holds no known state.
    pub fn state(&self) -> Result<BufferState, SyncError> {
        BufferState::from_word(self.words[HEADER_STATE])
    }

    /// Writes the state word.
    #[inline]
    pub fn set_state(&mut self, state: BufferState) {
        self.words[HEADER_STATE] = state as u32;
    }

    /// Reads the telemetry fields.
    #[must_use]
    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            step_duration_ms: f32::from_bits(self.words[HEADER_STEP_DURATION]),
            step_timestamp: f32::from_bits(self.words[HEADER_STEP_TIMESTAMP]),
            sub_steps: self.words[HEADER_SUB_STEPS],
        }
    }

    /// Writes the telemetry fields. Simulator only.
    pub fn set_telemetry(&mut self, telemetry: Telemetry) {
        self.words[HEADER_STEP_DURATION] = telemetry.step_duration_ms.to_bits();
        self.words[HEADER_STEP_TIMESTAMP] = telemetry.step_timestamp.to_bits();
        self.words[HEADER_SUB_STEPS] = telemetry.sub_steps;
    }

    // =========================================================================
    // BODY RECORDS
    // =========================================================================

    fn body_range(&self, slot: Slot) -> Option<std::ops::Range<usize>> {
        if slot.index() >= self.layout.max_bodies {
            return None;
        }
        let start = HEADER_SIZE + slot.as_usize() * BODY_DATA_SIZE;
        Some(start..start + BODY_DATA_SIZE)
    }

    /// View of one body record, or None if `slot` is out of range.
    #[must_use]
    pub fn body(&self, slot: Slot) -> Option<BodyRecord<'_>> {
        let range = self.body_range(slot)?;
        Some(BodyRecord::new(&self.words[range]))
    }

    /// Mutable view of one body record, or None if `slot` is out of range.
    pub fn body_mut(&mut self, slot: Slot) -> Option<BodyRecordMut<'_>> {
        let range = self.body_range(slot)?;
        Some(BodyRecordMut::new(&mut self.words[range]))
    }

    // =========================================================================
    // SIDE RECORDS
    // =========================================================================

    /// Debug-draw record.
    #[inline]
    #[must_use]
    pub fn debug(&self) -> &DebugDrawRecord {
        &self.debug
    }

    /// Mutable debug-draw record.
    #[inline]
    pub fn debug_mut(&mut self) -> &mut DebugDrawRecord {
        &mut self.debug
    }

    /// Roster of the snapshot in this buffer.
    #[inline]
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Mutable roster. Simulator only.
    #[inline]
    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    /// Soft-body record for `id`.
    #[must_use]
    pub fn soft_body(&self, id: &EntityId) -> Option<&SoftBodyRecord> {
        self.soft_bodies.get(id)
    }

    /// Soft-body record for `id`, created empty if absent.
    pub fn soft_body_entry(&mut self, id: &EntityId) -> &mut SoftBodyRecord {
        self.soft_bodies.entry(id.clone()).or_default()
    }

    /// Drops soft-body records whose id fails `keep`.
    pub fn retain_soft_bodies(&mut self, mut keep: impl FnMut(&EntityId) -> bool) {
        self.soft_bodies.retain(|id, _| keep(id));
    }

    /// Iterates soft-body records.
    pub fn soft_bodies(&self) -> impl Iterator<Item = (&EntityId, &SoftBodyRecord)> {
        self.soft_bodies.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_shared::{Mat4, Vec3};

    #[test]
    fn test_new_buffer_is_uninitialized() {
        let frame = FrameBuffer::new(FrameLayout::new(4, 8));
        assert_eq!(frame.state(), Ok(BufferState::Uninitialized));
        assert_eq!(frame.words().len(), HEADER_SIZE + 4 * BODY_DATA_SIZE);
        assert_eq!(frame.telemetry(), Telemetry::default());
    }

    #[test]
    fn test_out_of_range_slot() {
        let mut frame = FrameBuffer::new(FrameLayout::new(2, 0));
        assert!(frame.body(Slot::new(1)).is_some());
        assert!(frame.body(Slot::new(2)).is_none());
        assert!(frame.body_mut(Slot::new(2)).is_none());
    }

    #[test]
    fn test_records_do_not_overlap() {
        let mut frame = FrameBuffer::new(FrameLayout::new(3, 0));
        for i in 0..3u32 {
            let mut body = frame.body_mut(Slot::new(i)).unwrap();
            #[allow(clippy::cast_precision_loss)]
            body.set_matrix(&Mat4::from_translation(Vec3::splat(i as f32)));
            body.set_speeds(i as f32, 0.0);
        }

        for i in 0..3u32 {
            let body = frame.body(Slot::new(i)).unwrap();
            #[allow(clippy::cast_precision_loss)]
            let expected = i as f32;
            assert_eq!(body.matrix().w_axis.x, expected);
            assert_eq!(body.linear_speed(), expected);
        }
        assert_eq!(frame.state(), Ok(BufferState::Uninitialized));
    }

    #[test]
    fn test_telemetry_roundtrip() {
        let mut frame = FrameBuffer::new(FrameLayout::new(1, 0));
        let telemetry = Telemetry {
            step_duration_ms: 1.5,
            step_timestamp: 12.25,
            sub_steps: 2,
        };
        frame.set_telemetry(telemetry);
        assert_eq!(frame.telemetry(), telemetry);
    }

    #[test]
    fn test_corrupt_state_word() {
        let mut frame = FrameBuffer::new(FrameLayout::new(1, 0));
        frame.words[HEADER_STATE] = 77;
        assert_eq!(frame.state(), Err(SyncError::CorruptState(77)));
    }

    #[test]
    fn test_soft_body_records() {
        let mut frame = FrameBuffer::new(FrameLayout::new(1, 0));
        let cloth = EntityId::new("cloth");
        {
            let (vertices, normals) = frame.soft_body_entry(&cloth).arrays_mut();
            vertices.extend_from_slice(&[1.0, 2.0, 3.0]);
            normals.extend_from_slice(&[0.0, 1.0, 0.0]);
        }
        assert_eq!(frame.soft_body(&cloth).unwrap().vertices(), &[1.0, 2.0, 3.0]);

        frame.retain_soft_bodies(|_| false);
        assert!(frame.soft_body(&cloth).is_none());
    }
}
