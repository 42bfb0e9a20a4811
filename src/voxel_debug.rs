use rustc_hash::FxHashSet;
use tracing::debug;

use crate::grid::VoxelKey;
use crate::voxel_downsample::DownsampleParams;

/// Centers of every voxel that holds at least one point, flat xyz.
///
/// Used to draw the voxel lattice behind a downsample. Centers are emitted in
/// the order their voxels are first hit. When a [`crate::Downsampled`] is at
/// hand, [`crate::Downsampled::voxel_centers`] gives the same set without
/// hashing the points again.
pub fn voxel_centers(points: &[f32], params: &DownsampleParams) -> Vec<f32> {
    let point_count = points.len() / 3;
    if point_count == 0 || !params.is_valid() {
        return Vec::new();
    }

    let inv_voxel_size = 1.0 / params.voxel_size;
    let estimated_voxels = (point_count / 100).clamp(100, 100_000);
    let mut seen: FxHashSet<VoxelKey> =
        FxHashSet::with_capacity_and_hasher(estimated_voxels, Default::default());
    let mut centers = Vec::with_capacity(estimated_voxels * 3);

    for p in points.chunks_exact(3) {
        let key = VoxelKey::from_point(p[0], p[1], p[2], params.origin, inv_voxel_size);
        if seen.insert(key) {
            centers.extend_from_slice(&key.center(params.origin, params.voxel_size));
        }
    }

    debug!(point_count, voxel_count = seen.len(), "voxel centers generated");
    centers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel_downsample::{downsample, Attributes};

    #[test]
    fn test_voxel_centers_dedup() {
        let points = vec![
            0.1, 0.1, 0.1,
            0.9, 0.9, 0.9,
            1.1, 0.1, 0.1,
        ];
        let params = DownsampleParams::new(1.0, [0.0, 0.0, 0.0]);
        let centers = voxel_centers(&points, &params);
        assert_eq!(centers, vec![0.5, 0.5, 0.5, 1.5, 0.5, 0.5]);
    }

    #[test]
    fn test_voxel_centers_offset_origin() {
        let params = DownsampleParams::new(2.0, [-10.0, 0.0, 4.0]);
        let centers = voxel_centers(&[-9.0, 3.0, 3.0], &params);
        // cell (0, 1, -1)
        assert_eq!(centers, vec![-9.0, 3.0, 3.0]);
    }

    #[test]
    fn test_voxel_centers_invalid() {
        let params = DownsampleParams::new(0.0, [0.0, 0.0, 0.0]);
        assert!(voxel_centers(&[1.0, 1.0, 1.0], &params).is_empty());
        let params = DownsampleParams::new(1.0, [0.0, 0.0, 0.0]);
        assert!(voxel_centers(&[], &params).is_empty());
    }

    #[test]
    fn test_matches_downsample_keys() {
        let points = vec![
            0.3, -2.2, 7.0,
            0.4, -2.1, 7.1,
            -5.0, 1.0, 0.0,
        ];
        let params = DownsampleParams::new(0.5, [-6.0, -3.0, -1.0]);
        let from_points = voxel_centers(&points, &params);
        let from_result = downsample(&points, &params, Attributes::none()).voxel_centers();
        assert_eq!(from_points, from_result);
    }
}
