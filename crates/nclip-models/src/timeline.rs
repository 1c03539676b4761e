//! Absolute placement of segments within the finished video.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A segment's `[start, end)` interval in the final timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelinePlacement {
    pub segment: usize,
    pub start: f64,
    pub end: f64,
}

impl TimelinePlacement {
    pub fn new(segment: usize, start: f64, end: f64) -> Self {
        Self { segment, start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Frame interval `[first, last)` at the given frame rate.
    ///
    /// Both bounds are rounded from the absolute times, so adjacent
    /// placements never share or skip a frame.
    pub fn frame_range(&self, fps: u32) -> (u64, u64) {
        let fps = fps as f64;
        let first = (self.start * fps).round() as u64;
        let last = (self.end * fps).round() as u64;
        (first, last.max(first))
    }

    /// Number of frames this placement occupies at `fps`.
    pub fn frame_count(&self, fps: u32) -> u64 {
        let (first, last) = self.frame_range(fps);
        last - first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_range_contiguous() {
        let a = TimelinePlacement { segment: 0, start: 0.0, end: 4.0 };
        let b = TimelinePlacement { segment: 1, start: 4.0, end: 10.5 };
        assert_eq!(a.frame_range(30), (0, 120));
        assert_eq!(b.frame_range(30), (120, 315));
        assert_eq!(a.frame_range(30).1, b.frame_range(30).0);
        assert_eq!(b.frame_count(30), 195);
    }
}
