use pointcloud_tools::{
    downsample, smooth, voxel_centers, Attributes, DownsampleParams, Downsampled, SmoothParams,
    VoxelKey,
};
use wasm_bindgen::prelude::*;

#[macro_use]
mod common;

use common::elapsed_ms;

#[wasm_bindgen]
pub struct PointCloudToolsRust {}

/// Output of a downsample call, read back field by field from JavaScript.
#[wasm_bindgen]
pub struct DownsampleResult {
    inner: Downsampled,
}

#[wasm_bindgen]
impl DownsampleResult {
    /// Number of output points (occupied voxels).
    #[wasm_bindgen(getter)]
    pub fn count(&self) -> usize {
        self.inner.len()
    }

    #[wasm_bindgen(getter)]
    pub fn points(&self) -> Vec<f32> {
        self.inner.points.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn colors(&self) -> Option<Vec<f32>> {
        self.inner.colors.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn intensities(&self) -> Option<Vec<f32>> {
        self.inner.intensities.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn classifications(&self) -> Option<Vec<u8>> {
        self.inner.classifications.clone()
    }

    /// Packed 64-bit voxel key of each output point.
    pub fn voxel_keys(&self) -> Vec<u64> {
        self.inner.packed_keys()
    }

    /// Centers of the occupied voxels, for drawing the debug lattice.
    pub fn voxel_centers(&self) -> Vec<f32> {
        self.inner.voxel_centers()
    }
}

impl Default for PointCloudToolsRust {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl PointCloudToolsRust {
    #[wasm_bindgen(constructor)]
    pub fn new() -> PointCloudToolsRust {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();
        console_log!("Rust WASM: PointCloudToolsRust initialized");
        PointCloudToolsRust {}
    }

    /// Average all points sharing a voxel of `voxel_size`, anchored at the global minimum.
    pub fn voxel_downsample(
        &self,
        points: &[f32],
        voxel_size: f32,
        min_x: f32,
        min_y: f32,
        min_z: f32,
    ) -> Vec<f32> {
        let params = DownsampleParams::new(voxel_size, [min_x, min_y, min_z]);
        downsample(points, &params, Attributes::none()).points
    }

    /// Voxel downsampling with optional colors, intensity and classification.
    /// Pass `undefined` for any attribute to leave it out.
    #[allow(clippy::too_many_arguments)]
    pub fn voxel_downsample_with_attributes(
        &self,
        points: &[f32],
        colors: Option<Vec<f32>>,
        intensities: Option<Vec<f32>>,
        classifications: Option<Vec<u8>>,
        voxel_size: f32,
        min_x: f32,
        min_y: f32,
        min_z: f32,
    ) -> DownsampleResult {
        let start = js_sys::Date::now();
        let params = DownsampleParams::new(voxel_size, [min_x, min_y, min_z]);
        let attributes = Attributes {
            colors: colors.as_deref(),
            intensities: intensities.as_deref(),
            classifications: classifications.as_deref(),
        };
        let inner = downsample(points, &params, attributes);
        console_log!(
            "Rust WASM: downsampled {} points to {} voxels in {:.1} ms",
            points.len() / 3,
            inner.len(),
            elapsed_ms(start)
        );
        DownsampleResult { inner }
    }

    /// Iterative neighborhood smoothing; same point count and order as the input.
    pub fn point_cloud_smooth(
        &self,
        points: &[f32],
        smoothing_radius: f32,
        iterations: u32,
    ) -> Result<Vec<f32>, JsError> {
        let start = js_sys::Date::now();
        let params = SmoothParams::new(smoothing_radius, iterations);
        let smoothed = smooth(points, &params).map_err(|e| JsError::new(&e.to_string()))?;
        console_log!(
            "Rust WASM: smoothed {} points ({} iterations, radius {}) in {:.1} ms",
            points.len() / 3,
            iterations,
            smoothing_radius,
            elapsed_ms(start)
        );
        Ok(smoothed)
    }

    /// Unique voxel centers for rendering wireframe cubes.
    pub fn generate_voxel_centers(
        &self,
        points: &[f32],
        voxel_size: f32,
        min_x: f32,
        min_y: f32,
        min_z: f32,
    ) -> Vec<f32> {
        let params = DownsampleParams::new(voxel_size, [min_x, min_y, min_z]);
        voxel_centers(points, &params)
    }

    /// Center of the voxel behind a packed key from `DownsampleResult::voxel_keys`.
    pub fn voxel_key_center(
        &self,
        key: u64,
        voxel_size: f32,
        min_x: f32,
        min_y: f32,
        min_z: f32,
    ) -> Vec<f32> {
        VoxelKey::unpack(key)
            .center([min_x, min_y, min_z], voxel_size)
            .to_vec()
    }
}
