//! Debug-draw record: line segments captured by the engine during a step.

use tandem_shared::Vec3;

/// Receiver for the engine's debug-draw callback.
pub trait DebugSink {
    /// Records one line segment.
    fn draw_line(&mut self, from: Vec3, to: Vec3, color: Vec3);
}

/// Line vertices and colors written during one step.
///
/// Storage is allocated the first time capture is enabled and kept for the
/// rest of the session. `cursor` counts valid vertices; two per segment.
#[derive(Clone, Debug)]
pub struct DebugDrawRecord {
    /// Capture switch.
    enabled: bool,
    /// Valid vertices written so far this step.
    cursor: u32,
    /// Maximum vertices.
    capacity: u32,
    /// Packed `xyz` positions, `capacity * 3` once allocated.
    vertices: Vec<f32>,
    /// Packed `rgb` colors, parallel to `vertices`.
    colors: Vec<f32>,
}

impl DebugDrawRecord {
    /// Creates a disabled record that may hold up to `capacity` vertices.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            enabled: false,
            cursor: 0,
            capacity,
            vertices: Vec::new(),
            colors: Vec::new(),
        }
    }

    /// Returns whether capture is on.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turns capture on or off, allocating storage on first use.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && self.vertices.is_empty() {
            let floats = self.capacity as usize * 3;
            self.vertices = vec![0.0; floats];
            self.colors = vec![0.0; floats];
        }
        self.enabled = enabled;
        if !enabled {
            self.cursor = 0;
        }
    }

    /// Returns the number of valid vertices.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Returns the vertex capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Valid vertex positions.
    #[must_use]
    pub fn vertices(&self) -> &[f32] {
        &self.vertices[..self.cursor as usize * 3]
    }

    /// Valid vertex colors.
    #[must_use]
    pub fn colors(&self) -> &[f32] {
        &self.colors[..self.cursor as usize * 3]
    }

    /// Rewinds the cursor. Storage is kept.
    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    fn push_vertex(&mut self, position: Vec3, color: Vec3) {
        let at = self.cursor as usize * 3;
        self.vertices[at..at + 3].copy_from_slice(&position.to_array());
        self.colors[at..at + 3].copy_from_slice(&color.to_array());
        self.cursor += 1;
    }
}

impl DebugSink for DebugDrawRecord {
    /// Segments arriving while disabled or full are dropped.
    fn draw_line(&mut self, from: Vec3, to: Vec3, color: Vec3) {
        if !self.enabled || self.cursor + 2 > self.capacity {
            return;
        }
        self.push_vertex(from, color);
        self.push_vertex(to, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_record_ignores_lines() {
        let mut record = DebugDrawRecord::new(16);
        record.draw_line(Vec3::ZERO, Vec3::X, Vec3::ONE);
        assert_eq!(record.cursor(), 0);
        assert!(record.vertices().is_empty());
    }

    #[test]
    fn test_lines_fill_parallel_arrays() {
        let mut record = DebugDrawRecord::new(16);
        record.set_enabled(true);
        record.draw_line(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 0.0, 0.0));

        assert_eq!(record.cursor(), 2);
        assert_eq!(record.vertices(), &[0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
        assert_eq!(record.colors(), &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

        record.reset();
        assert_eq!(record.cursor(), 0);
        assert!(record.is_enabled());
    }

    #[test]
    fn test_full_record_drops_segments() {
        let mut record = DebugDrawRecord::new(3);
        record.set_enabled(true);
        record.draw_line(Vec3::ZERO, Vec3::X, Vec3::ONE);
        record.draw_line(Vec3::ZERO, Vec3::Y, Vec3::ONE);
        assert_eq!(record.cursor(), 2);
    }
}
