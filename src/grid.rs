//! Uniform spatial grid: cell keys, grid sizing and the flat bucket index.
//!
//! Cells are cubes of `cell_size` anchored at an origin. A point's cell on each
//! axis is `floor((coord - origin) / cell_size)`; flooring (not truncating)
//! keeps points below the origin in their own cells instead of folding them
//! into cell 0.

use serde::{Deserialize, Serialize};

use crate::bounds::Bounds;
use crate::error::{try_filled, Error, Result};

/// Integer cell coordinate along one axis.
///
/// The float-to-int cast saturates: coordinates more than `i32::MAX` cells
/// from the origin all land in the first or last representable cell, and NaN
/// lands in cell 0.
#[inline]
pub fn cell_coord(value: f32, origin: f32, inv_cell_size: f32) -> i32 {
    ((value - origin) * inv_cell_size).floor() as i32
}

/// Identity of one grid cell.
///
/// Hashing uses all three 32-bit coordinates. [`VoxelKey::pack`] produces the
/// 64-bit form (32-bit X, 16-bit Y, 16-bit Z) exchanged with hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelKey {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Key of the cell containing `(x, y, z)`.
    #[inline]
    pub fn from_point(x: f32, y: f32, z: f32, origin: [f32; 3], inv_cell_size: f32) -> Self {
        Self {
            x: cell_coord(x, origin[0], inv_cell_size),
            y: cell_coord(y, origin[1], inv_cell_size),
            z: cell_coord(z, origin[2], inv_cell_size),
        }
    }

    /// Pack into bits 32..64 = X, 16..32 = Y, 0..16 = Z.
    ///
    /// Y and Z keep only their low 16 bits; use [`VoxelKey::fits_packed`] to
    /// check that the packed form is unambiguous.
    #[inline]
    pub fn pack(self) -> u64 {
        ((self.x as u32 as u64) << 32) | ((self.y as u16 as u64) << 16) | (self.z as u16 as u64)
    }

    /// Inverse of [`VoxelKey::pack`], sign-extending the 16-bit fields.
    #[inline]
    pub fn unpack(key: u64) -> Self {
        Self {
            x: (key >> 32) as u32 as i32,
            y: ((key >> 16) & 0xFFFF) as u16 as i16 as i32,
            z: (key & 0xFFFF) as u16 as i16 as i32,
        }
    }

    /// Whether Y and Z survive a round trip through [`VoxelKey::pack`].
    pub fn fits_packed(self) -> bool {
        let range = i16::MIN as i32..=i16::MAX as i32;
        range.contains(&self.y) && range.contains(&self.z)
    }

    /// Center of this cell in world coordinates.
    pub fn center(self, origin: [f32; 3], cell_size: f32) -> [f32; 3] {
        let half = cell_size * 0.5;
        [
            origin[0] + half + self.x as f32 * cell_size,
            origin[1] + half + self.y as f32 * cell_size,
            origin[2] + half + self.z as f32 * cell_size,
        ]
    }
}

/// Number of cells along each axis of a bounded grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridDims {
    /// `floor(extent / cell_size) + 1` cells per axis.
    pub fn from_bounds(bounds: &Bounds, cell_size: f32) -> Result<Self> {
        let inv = 1.0 / cell_size;
        let extent = bounds.extent();
        let mut dims = [0usize; 3];
        for axis in 0..3 {
            let cells = (extent[axis] * inv).floor();
            // Also rejects NaN extents.
            if !(cells >= 0.0 && cells < usize::MAX as f32) {
                return Err(Error::GridTooLarge { dims: [usize::MAX; 3] });
            }
            dims[axis] = (cells as usize)
                .checked_add(1)
                .ok_or(Error::GridTooLarge { dims: [usize::MAX; 3] })?;
        }
        let grid = Self {
            nx: dims[0],
            ny: dims[1],
            nz: dims[2],
        };
        if grid.checked_cell_count().is_none() {
            return Err(Error::GridTooLarge { dims });
        }
        Ok(grid)
    }

    fn checked_cell_count(&self) -> Option<usize> {
        self.nx.checked_mul(self.ny)?.checked_mul(self.nz)
    }

    /// Total number of cells. Validated at construction.
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Linear index of an in-range cell, or `None` outside the grid.
    #[inline]
    pub fn linear(&self, gx: i64, gy: i64, gz: i64) -> Option<usize> {
        if gx < 0 || gy < 0 || gz < 0 {
            return None;
        }
        let (gx, gy, gz) = (gx as usize, gy as usize, gz as usize);
        if gx >= self.nx || gy >= self.ny || gz >= self.nz {
            return None;
        }
        Some(gx + gy * self.nx + gz * self.nx * self.ny)
    }
}

/// Bucket index stored as one flat array plus per-cell offsets.
///
/// Built with a counting sort: count points per cell, prefix-sum the counts
/// into `cell_offsets`, then drop each point index into its cell's slot. The
/// indices of cell `c` are `indices[cell_offsets[c]..cell_offsets[c + 1]]`.
/// All buffers are kept between [`FlatGrid::rebuild`] calls.
#[derive(Debug)]
pub struct FlatGrid {
    origin: [f32; 3],
    cell_size: f32,
    inv_cell_size: f32,
    dims: GridDims,
    cell_offsets: Vec<usize>,
    cursors: Vec<usize>,
    indices: Vec<usize>,
    point_cells: Vec<usize>,
}

const OUTSIDE: usize = usize::MAX;

impl FlatGrid {
    /// Allocate an empty grid covering `bounds` with cubic cells of `cell_size`.
    pub fn new(bounds: &Bounds, cell_size: f32) -> Result<Self> {
        let dims = GridDims::from_bounds(bounds, cell_size)?;
        let (cell_offsets, cursors) = Self::cell_buffers(dims)?;

        Ok(Self {
            origin: bounds.min,
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            dims,
            cell_offsets,
            cursors,
            indices: Vec::new(),
            point_cells: Vec::new(),
        })
    }

    fn cell_buffers(dims: GridDims) -> Result<(Vec<usize>, Vec<usize>)> {
        let cells = dims.cell_count();
        let offsets_len = cells.checked_add(1).ok_or(Error::GridTooLarge {
            dims: [dims.nx, dims.ny, dims.nz],
        })?;
        let cell_offsets = try_filled("grid cell offsets", offsets_len, 0usize)?;
        let cursors = try_filled("grid cell cursors", cells, 0usize)?;
        Ok((cell_offsets, cursors))
    }

    /// Move the grid to cover `bounds`, keeping the cell size.
    ///
    /// The cell buffers are reallocated only when the dimensions change.
    /// Call [`FlatGrid::rebuild`] afterwards.
    pub fn reanchor(&mut self, bounds: &Bounds) -> Result<()> {
        let dims = GridDims::from_bounds(bounds, self.cell_size)?;
        if dims != self.dims {
            let (cell_offsets, cursors) = Self::cell_buffers(dims)?;
            self.cell_offsets = cell_offsets;
            self.cursors = cursors;
            self.dims = dims;
        }
        self.origin = bounds.min;
        Ok(())
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Grid coordinates of a position (may lie outside the grid).
    #[inline]
    pub fn cell_of(&self, x: f32, y: f32, z: f32) -> [i64; 3] {
        [
            cell_coord(x, self.origin[0], self.inv_cell_size) as i64,
            cell_coord(y, self.origin[1], self.inv_cell_size) as i64,
            cell_coord(z, self.origin[2], self.inv_cell_size) as i64,
        ]
    }

    /// Re-bucket every point of `points` (flat xyz).
    ///
    /// Points whose cell falls outside the grid are left out of every bucket.
    pub fn rebuild(&mut self, points: &[f32]) -> Result<()> {
        let point_count = points.len() / 3;
        if self.point_cells.len() != point_count {
            self.point_cells = try_filled("grid point cells", point_count, OUTSIDE)?;
        }

        // Pass 1: count points per cell.
        self.cursors.fill(0);
        for (i, p) in points.chunks_exact(3).enumerate() {
            let [gx, gy, gz] = self.cell_of(p[0], p[1], p[2]);
            let cell = self.dims.linear(gx, gy, gz).unwrap_or(OUTSIDE);
            self.point_cells[i] = cell;
            if cell != OUTSIDE {
                self.cursors[cell] += 1;
            }
        }

        // Prefix sum into start offsets; reuse the counts as write cursors.
        let mut offset = 0;
        for (cell, cursor) in self.cursors.iter_mut().enumerate() {
            self.cell_offsets[cell] = offset;
            offset += *cursor;
            *cursor = self.cell_offsets[cell];
        }
        let cells = self.cursors.len();
        self.cell_offsets[cells] = offset;

        // Pass 2: place indices.
        self.indices.clear();
        self.indices
            .try_reserve_exact(offset)
            .map_err(|_| Error::Allocation {
                what: "grid indices",
                elements: offset,
            })?;
        self.indices.resize(offset, 0);
        for (i, &cell) in self.point_cells.iter().enumerate() {
            if cell != OUTSIDE {
                self.indices[self.cursors[cell]] = i;
                self.cursors[cell] += 1;
            }
        }

        Ok(())
    }

    /// Point indices stored in one cell, by linear index.
    #[inline]
    pub fn bucket(&self, cell: usize) -> &[usize] {
        &self.indices[self.cell_offsets[cell]..self.cell_offsets[cell + 1]]
    }

    /// Visit every point index in the 3x3x3 block of cells around `(x, y, z)`.
    ///
    /// Cells outside the grid are skipped. With `cell_size >= radius` this
    /// visits every point within `radius` of the query.
    pub fn for_each_candidate(&self, x: f32, y: f32, z: f32, mut visit: impl FnMut(usize)) {
        let [gx, gy, gz] = self.cell_of(x, y, z);
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if let Some(cell) = self.dims.linear(gx + dx, gy + dy, gz + dz) {
                        for &j in self.bucket(cell) {
                            visit(j);
                        }
                    }
                }
            }
        }
    }

    /// Visit every point within `radius` of point `i`, excluding `i`.
    ///
    /// `points` must be the buffer passed to the last [`FlatGrid::rebuild`].
    /// Distances are compared squared.
    #[inline]
    pub fn for_each_neighbor(
        &self,
        points: &[f32],
        i: usize,
        radius: f32,
        mut visit: impl FnMut(usize),
    ) {
        let i3 = i * 3;
        let (x, y, z) = (points[i3], points[i3 + 1], points[i3 + 2]);
        let radius_squared = radius * radius;
        self.for_each_candidate(x, y, z, |j| {
            if j == i {
                return;
            }
            let j3 = j * 3;
            let dx = points[j3] - x;
            let dy = points[j3 + 1] - y;
            let dz = points[j3 + 2] - z;
            if dx * dx + dy * dy + dz * dz <= radius_squared {
                visit(j);
            }
        });
    }

    /// Indices of all points within `radius` of point `i`, excluding `i`.
    pub fn neighbors_within(&self, points: &[f32], i: usize, radius: f32) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_neighbor(points, i, radius, |j| out.push(j));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_coord_floors_negative() {
        assert_eq!(cell_coord(-0.5, 0.0, 1.0), -1);
        assert_eq!(cell_coord(-1.0, 0.0, 1.0), -1);
        assert_eq!(cell_coord(-1.01, 0.0, 1.0), -2);
        assert_eq!(cell_coord(0.99, 0.0, 1.0), 0);
        assert_eq!(cell_coord(2.5, 1.0, 2.0), 3);
    }

    #[test]
    fn test_pack_layout() {
        let key = VoxelKey::new(1, 2, 3);
        assert_eq!(key.pack(), (1u64 << 32) | (2 << 16) | 3);
    }

    #[test]
    fn test_pack_negative_does_not_bleed() {
        let key = VoxelKey::new(5, -1, -2);
        let packed = key.pack();
        assert_eq!(packed >> 32, 5);
        assert_eq!(VoxelKey::unpack(packed), key);

        let key = VoxelKey::new(-7, 32767, -32768);
        assert_eq!(VoxelKey::unpack(key.pack()), key);
    }

    #[test]
    fn test_pack_aliases_outside_16_bits() {
        let near = VoxelKey::new(0, 1, 0);
        let far = VoxelKey::new(0, 1 + 65536, 0);
        assert!(near.fits_packed());
        assert!(!far.fits_packed());
        assert_eq!(near.pack(), far.pack());
        assert_ne!(near, far);
    }

    #[test]
    fn test_center() {
        let key = VoxelKey::new(-1, 0, 2);
        let c = key.center([10.0, 0.0, 0.0], 2.0);
        assert_eq!(c, [9.0, 1.0, 5.0]);
    }

    #[test]
    fn test_dims_from_bounds() {
        let bounds = Bounds::from_array([0.0, 0.0, 0.0, 2.5, 0.0, 1.0]);
        let dims = GridDims::from_bounds(&bounds, 1.0).unwrap();
        assert_eq!(dims, GridDims { nx: 3, ny: 1, nz: 2 });
        assert_eq!(dims.cell_count(), 6);
        assert_eq!(dims.linear(2, 0, 1), Some(2 + 3));
        assert_eq!(dims.linear(3, 0, 0), None);
        assert_eq!(dims.linear(-1, 0, 0), None);
    }

    #[test]
    fn test_dims_rejects_nan() {
        let bounds = Bounds::from_array([0.0, 0.0, 0.0, f32::NAN, 1.0, 1.0]);
        assert!(matches!(
            GridDims::from_bounds(&bounds, 1.0),
            Err(Error::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_flat_grid_buckets() {
        let points = vec![
            0.1, 0.1, 0.1,  // cell 0
            1.5, 0.2, 0.0,  // cell 1
            0.3, 0.4, 0.2,  // cell 0
            1.9, 1.9, 0.0,  // cell (1,1,0)
        ];
        let bounds = Bounds::scan(&points).unwrap();
        let mut grid = FlatGrid::new(&bounds, 1.0).unwrap();
        grid.rebuild(&points).unwrap();

        let dims = grid.dims();
        assert_eq!(dims, GridDims { nx: 2, ny: 2, nz: 1 });
        assert_eq!(grid.bucket(0), &[0, 2]);
        assert_eq!(grid.bucket(1), &[1]);
        assert_eq!(grid.bucket(2), &[] as &[usize]);
        assert_eq!(grid.bucket(3), &[3]);
    }

    #[test]
    fn test_flat_grid_rebuild_reuses_buffers() {
        let bounds = Bounds::from_array([0.0, 0.0, 0.0, 3.0, 0.0, 0.0]);
        let mut grid = FlatGrid::new(&bounds, 1.0).unwrap();

        grid.rebuild(&[0.5, 0.0, 0.0, 2.5, 0.0, 0.0]).unwrap();
        assert_eq!(grid.bucket(0), &[0]);
        assert_eq!(grid.bucket(2), &[1]);

        grid.rebuild(&[2.5, 0.0, 0.0, 2.6, 0.0, 0.0]).unwrap();
        assert!(grid.bucket(0).is_empty());
        assert_eq!(grid.bucket(2), &[0, 1]);
    }

    #[test]
    fn test_flat_grid_skips_points_outside() {
        let bounds = Bounds::from_array([0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let mut grid = FlatGrid::new(&bounds, 1.0).unwrap();
        grid.rebuild(&[0.5, 0.5, 0.5, -3.0, 0.5, 0.5]).unwrap();
        let total: usize = (0..grid.dims().cell_count()).map(|c| grid.bucket(c).len()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_neighbors_across_cell_boundary() {
        let points = vec![
            0.95, 0.0, 0.0,
            1.05, 0.0, 0.0,
            3.0, 0.0, 0.0,
        ];
        let bounds = Bounds::scan(&points).unwrap();
        let mut grid = FlatGrid::new(&bounds, 0.5).unwrap();
        grid.rebuild(&points).unwrap();

        assert_eq!(grid.neighbors_within(&points, 0, 0.5), vec![1]);
        assert_eq!(grid.neighbors_within(&points, 1, 0.5), vec![0]);
        assert!(grid.neighbors_within(&points, 2, 0.5).is_empty());
    }

    #[test]
    fn test_cell_coord_saturates_far_from_origin() {
        assert_eq!(cell_coord(1.0e12, 0.0, 1.0), i32::MAX);
        assert_eq!(cell_coord(1.0e13, 0.0, 1.0), i32::MAX);
        assert_eq!(cell_coord(-1.0e12, 0.0, 1.0), i32::MIN);
        assert_eq!(cell_coord(f32::NAN, 0.0, 1.0), 0);
    }

    #[test]
    fn test_reanchor_covers_points_below_old_min() {
        let bounds = Bounds::from_array([0.0, 0.0, 0.0, 2.0, 2.0, 2.0]);
        let mut grid = FlatGrid::new(&bounds, 1.0).unwrap();
        let points = [-0.0001, 0.5, 0.5, 0.4, 0.5, 0.5];

        grid.rebuild(&points).unwrap();
        assert!(grid.neighbors_within(&points, 1, 1.0).is_empty());

        grid.reanchor(&Bounds::scan(&points).unwrap()).unwrap();
        grid.rebuild(&points).unwrap();
        assert_eq!(grid.neighbors_within(&points, 1, 1.0), vec![0]);
        assert_eq!(grid.neighbors_within(&points, 0, 1.0), vec![1]);
    }

    #[test]
    fn test_reanchor_resizes_when_dims_change() {
        let bounds = Bounds::from_array([0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        let mut grid = FlatGrid::new(&bounds, 1.0).unwrap();
        assert_eq!(grid.dims(), GridDims { nx: 2, ny: 1, nz: 1 });

        grid.reanchor(&Bounds::from_array([5.0, 0.0, 0.0, 8.5, 1.0, 0.0])).unwrap();
        assert_eq!(grid.dims(), GridDims { nx: 4, ny: 2, nz: 1 });
        grid.rebuild(&[8.4, 1.0, 0.0]).unwrap();
        assert_eq!(grid.bucket(3 + 4), &[0]);
    }

    #[test]
    fn test_for_each_neighbor_matches_neighbors_within() {
        let points = [0.0, 0.0, 0.0, 0.3, 0.0, 0.0, 0.0, 0.4, 0.0, 2.0, 2.0, 2.0];
        let bounds = Bounds::scan(&points).unwrap();
        let mut grid = FlatGrid::new(&bounds, 0.5).unwrap();
        grid.rebuild(&points).unwrap();

        let mut visited = Vec::new();
        grid.for_each_neighbor(&points, 0, 0.5, |j| visited.push(j));
        visited.sort_unstable();
        assert_eq!(visited, vec![1, 2]);

        let mut within = grid.neighbors_within(&points, 0, 0.5);
        within.sort_unstable();
        assert_eq!(within, visited);
    }
}
