//! Point cloud reduction and regularization.
//!
//! Two operations share one spatial-hash engine:
//!
//! - [`downsample`]: one averaged point per occupied voxel, with optional
//!   color / intensity / classification merging.
//! - [`smooth`]: iterative neighborhood averaging over a uniform grid.
//!
//! Everything works on flat `[x0, y0, z0, x1, y1, z1, ...]` buffers of `f32`.
//! The binaries under `src/bin` and the WASM crate in `frontend/` are thin
//! shims over these functions.

mod bounds;
mod error;
pub mod grid;
pub mod logging;
mod point_cloud_smoothing;
pub mod protocol;
pub mod reduce;
mod voxel_debug;
mod voxel_downsample;

pub use bounds::Bounds;
pub use error::{Error, Result};
pub use grid::{FlatGrid, GridDims, VoxelKey};
pub use point_cloud_smoothing::{smooth, SmoothParams};
pub use voxel_debug::voxel_centers;
pub use voxel_downsample::{
    downsample, Attributes, Capabilities, DownsampleParams, Downsampled,
};
