use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box of a point buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    /// Find min/max extents of a flat xyz buffer in a single pass.
    ///
    /// Returns `None` for an empty buffer. A trailing partial point is ignored.
    pub fn scan(points: &[f32]) -> Option<Self> {
        let mut chunks = points.chunks_exact(3);
        let first = chunks.next()?;
        let mut min = [first[0], first[1], first[2]];
        let mut max = min;

        for p in chunks {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }

        Some(Self { min, max })
    }

    /// Per-axis size of the box.
    pub fn extent(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// Build from the `minX, minY, minZ, maxX, maxY, maxZ` order used on the wire.
    pub fn from_array(v: [f32; 6]) -> Self {
        Self {
            min: [v[0], v[1], v[2]],
            max: [v[3], v[4], v[5]],
        }
    }

    pub fn to_array(&self) -> [f32; 6] {
        [
            self.min[0], self.min[1], self.min[2], self.max[0], self.max[1], self.max[2],
        ]
    }
}
