use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grid::VoxelKey;
use crate::reduce::{MeanReducer, ModeReducer, Reducer};

/// Voxel grid configuration for [`downsample`].
///
/// The origin is supplied by the caller (usually the global minimum of the
/// whole cloud) so that tiles processed separately share one voxel lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownsampleParams {
    pub voxel_size: f32,
    pub origin: [f32; 3],
}

impl DownsampleParams {
    pub fn new(voxel_size: f32, origin: [f32; 3]) -> Self {
        Self { voxel_size, origin }
    }

    /// A non-positive or non-finite voxel size makes the call a no-op.
    pub fn is_valid(&self) -> bool {
        self.voxel_size > 0.0 && self.voxel_size.is_finite()
    }
}

/// Which optional attributes take part in a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub color: bool,
    pub intensity: bool,
    pub classification: bool,
}

impl Capabilities {
    pub const COLOR_FLAG: u32 = 1;
    pub const INTENSITY_FLAG: u32 = 1 << 1;
    pub const CLASSIFICATION_FLAG: u32 = 1 << 2;

    /// Decode the wire flags word (bit0 colors, bit1 intensity, bit2 classification).
    pub fn from_flags(flags: u32) -> Self {
        Self {
            color: flags & Self::COLOR_FLAG != 0,
            intensity: flags & Self::INTENSITY_FLAG != 0,
            classification: flags & Self::CLASSIFICATION_FLAG != 0,
        }
    }

    pub fn to_flags(self) -> u32 {
        let mut flags = 0;
        if self.color {
            flags |= Self::COLOR_FLAG;
        }
        if self.intensity {
            flags |= Self::INTENSITY_FLAG;
        }
        if self.classification {
            flags |= Self::CLASSIFICATION_FLAG;
        }
        flags
    }
}

/// Optional per-point attribute buffers, aligned with the point buffer.
///
/// Colors hold 3 floats per point, intensities 1 float, classifications 1 byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attributes<'a> {
    pub colors: Option<&'a [f32]>,
    pub intensities: Option<&'a [f32]>,
    pub classifications: Option<&'a [u8]>,
}

impl<'a> Attributes<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_colors(mut self, colors: &'a [f32]) -> Self {
        self.colors = Some(colors);
        self
    }

    pub fn with_intensities(mut self, intensities: &'a [f32]) -> Self {
        self.intensities = Some(intensities);
        self
    }

    pub fn with_classifications(mut self, classifications: &'a [u8]) -> Self {
        self.classifications = Some(classifications);
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            color: self.colors.is_some(),
            intensity: self.intensities.is_some(),
            classification: self.classifications.is_some(),
        }
    }

    /// Drop any buffer whose length does not match `point_count`.
    fn resolve(self, point_count: usize) -> Self {
        let colors = self.colors.filter(|c| {
            let ok = c.len() == point_count * 3;
            if !ok {
                warn!(expected = point_count * 3, got = c.len(), "ignoring color buffer");
            }
            ok
        });
        let intensities = self.intensities.filter(|v| {
            let ok = v.len() == point_count;
            if !ok {
                warn!(expected = point_count, got = v.len(), "ignoring intensity buffer");
            }
            ok
        });
        let classifications = self.classifications.filter(|v| {
            let ok = v.len() == point_count;
            if !ok {
                warn!(expected = point_count, got = v.len(), "ignoring classification buffer");
            }
            ok
        });
        Self {
            colors,
            intensities,
            classifications,
        }
    }
}

/// Result of [`downsample`]: one entry per occupied voxel.
///
/// Attribute buffers are `Some` exactly when the attribute took part in the
/// call. `keys[i]` is the voxel that produced output point `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Downsampled {
    pub points: Vec<f32>,
    pub colors: Option<Vec<f32>>,
    pub intensities: Option<Vec<f32>>,
    pub classifications: Option<Vec<u8>>,
    pub keys: Vec<VoxelKey>,
    pub params: DownsampleParams,
}

impl Downsampled {
    fn empty(params: DownsampleParams, caps: Capabilities) -> Self {
        Self {
            points: Vec::new(),
            colors: caps.color.then(Vec::new),
            intensities: caps.intensity.then(Vec::new),
            classifications: caps.classification.then(Vec::new),
            keys: Vec::new(),
            params,
        }
    }

    /// Number of output points (occupied voxels).
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            color: self.colors.is_some(),
            intensity: self.intensities.is_some(),
            classification: self.classifications.is_some(),
        }
    }

    /// Keys in the packed 64-bit form, in output order.
    ///
    /// Cells beyond the 16-bit Y/Z range alias in this form; a warning is
    /// logged when any key does.
    pub fn packed_keys(&self) -> Vec<u64> {
        if let Some(key) = self.keys.iter().find(|key| !key.fits_packed()) {
            warn!(?key, "voxel key exceeds the packed 16-bit range");
        }
        self.keys.iter().map(|key| key.pack()).collect()
    }

    /// Centers of the occupied voxels, flat xyz, in output order.
    pub fn voxel_centers(&self) -> Vec<f32> {
        let mut centers = Vec::with_capacity(self.keys.len() * 3);
        for key in &self.keys {
            centers.extend_from_slice(&key.center(self.params.origin, self.params.voxel_size));
        }
        centers
    }
}

struct VoxelAccumulator {
    count: u32,
    position: MeanReducer<3>,
    color: Option<MeanReducer<3>>,
    intensity: Option<MeanReducer<1>>,
    classification: Option<ModeReducer>,
}

impl VoxelAccumulator {
    fn seed(points: &[f32], attributes: &Attributes<'_>, i: usize) -> Self {
        let i3 = i * 3;
        Self {
            count: 1,
            position: MeanReducer::seed([points[i3], points[i3 + 1], points[i3 + 2]]),
            color: attributes
                .colors
                .map(|c| MeanReducer::seed([c[i3], c[i3 + 1], c[i3 + 2]])),
            intensity: attributes.intensities.map(|v| MeanReducer::seed([v[i]])),
            classification: attributes.classifications.map(|v| ModeReducer::seed(v[i])),
        }
    }

    fn add(&mut self, points: &[f32], attributes: &Attributes<'_>, i: usize) {
        let i3 = i * 3;
        self.count += 1;
        self.position.add([points[i3], points[i3 + 1], points[i3 + 2]]);
        if let (Some(r), Some(c)) = (self.color.as_mut(), attributes.colors) {
            r.add([c[i3], c[i3 + 1], c[i3 + 2]]);
        }
        if let (Some(r), Some(v)) = (self.intensity.as_mut(), attributes.intensities) {
            r.add([v[i]]);
        }
        if let (Some(r), Some(v)) = (self.classification.as_mut(), attributes.classifications) {
            r.add(v[i]);
        }
    }
}

/// Collapse every occupied voxel to the mean of its points.
///
/// Colors and intensities are averaged; classification becomes the most
/// frequent class in the voxel (first seen wins ties). Output follows the
/// order in which voxels were first hit. An invalid voxel size or an empty
/// buffer yields an empty result.
pub fn downsample(points: &[f32], params: &DownsampleParams, attributes: Attributes<'_>) -> Downsampled {
    let point_count = points.len() / 3;
    let attributes = attributes.resolve(point_count);
    let caps = attributes.capabilities();

    if point_count == 0 || !params.is_valid() {
        debug!(point_count, voxel_size = params.voxel_size, "voxel downsample skipped");
        return Downsampled::empty(*params, caps);
    }

    let inv_voxel_size = 1.0 / params.voxel_size;

    // Rough guess of 1% occupancy; the map grows if it is wrong.
    let estimated_voxels = (point_count / 100).clamp(100, 100_000);
    let mut slots: FxHashMap<VoxelKey, usize> =
        FxHashMap::with_capacity_and_hasher(estimated_voxels, Default::default());
    let mut keys: Vec<VoxelKey> = Vec::with_capacity(estimated_voxels);
    let mut voxels: Vec<VoxelAccumulator> = Vec::with_capacity(estimated_voxels);

    for (i, p) in points.chunks_exact(3).enumerate() {
        let key = VoxelKey::from_point(p[0], p[1], p[2], params.origin, inv_voxel_size);
        match slots.get(&key) {
            Some(&slot) => voxels[slot].add(points, &attributes, i),
            None => {
                slots.insert(key, voxels.len());
                keys.push(key);
                voxels.push(VoxelAccumulator::seed(points, &attributes, i));
            }
        }
    }

    let output_count = voxels.len();
    let mut out = Downsampled {
        points: Vec::with_capacity(output_count * 3),
        colors: caps.color.then(|| Vec::with_capacity(output_count * 3)),
        intensities: caps.intensity.then(|| Vec::with_capacity(output_count)),
        classifications: caps.classification.then(|| Vec::with_capacity(output_count)),
        keys,
        params: *params,
    };

    for voxel in &voxels {
        out.points.extend_from_slice(&voxel.position.finish(voxel.count));
        if let (Some(dst), Some(r)) = (out.colors.as_mut(), voxel.color.as_ref()) {
            dst.extend_from_slice(&r.finish(voxel.count));
        }
        if let (Some(dst), Some(r)) = (out.intensities.as_mut(), voxel.intensity.as_ref()) {
            dst.push(r.finish(voxel.count)[0]);
        }
        if let (Some(dst), Some(r)) = (out.classifications.as_mut(), voxel.classification.as_ref()) {
            dst.push(r.finish(voxel.count));
        }
    }

    debug!(point_count, output_count, voxel_size = params.voxel_size, "voxel downsample finished");
    out
}
