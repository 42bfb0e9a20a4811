//! Little-endian binary framing used by the stdin/stdout tools.
//!
//! Downsample request:
//! `[u32 pointCount][f32 voxelSize][f32 minX..maxZ][u32 flags][f32* positions]`
//! `[f32* colors][f32* intensities][u8* classifications]`
//! with flags bit0=colors, bit1=intensity, bit2=classification. The voxel debug
//! request uses the same header without the flags word (32 bytes).
//!
//! Smooth request: `[u32 pointCount][f32 radius][f32 iterations][f32* positions]`.
//!
//! Every response starts with `[u32 count]` followed by the payload in the
//! same section order as the request. A request with nothing to do gets a
//! bare zero count.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::bounds::Bounds;
use crate::error::try_filled;
use crate::point_cloud_smoothing::SmoothParams;
use crate::voxel_downsample::{Capabilities, DownsampleParams, Downsampled};

/// Upper limit on points per request, checked before allocating payload buffers.
pub const MAX_POINTS: usize = 100_000_000;

pub const DOWNSAMPLE_HEADER_LEN: usize = 36;
pub const VOXEL_DEBUG_HEADER_LEN: usize = 32;
pub const SMOOTH_HEADER_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated header: expected {expected} bytes")]
    TruncatedHeader { expected: usize },

    #[error("truncated {section} payload: expected {expected} bytes")]
    TruncatedPayload {
        section: &'static str,
        expected: usize,
    },

    #[error("point count {count} exceeds maximum {max}")]
    TooManyPoints { count: usize, max: usize },

    #[error(transparent)]
    Core(#[from] crate::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[inline]
fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
fn f32_at(buf: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_header<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut header = [0u8; N];
    reader.read_exact(&mut header).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::TruncatedHeader { expected: N },
        _ => ProtocolError::Io(e),
    })?;
    Ok(header)
}

fn read_section<R: Read>(reader: &mut R, section: &'static str, len: usize) -> Result<Vec<u8>> {
    let mut buf = try_filled(section, len, 0u8)?;
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::TruncatedPayload {
            section,
            expected: len,
        },
        _ => ProtocolError::Io(e),
    })?;
    Ok(buf)
}

/// Read `count` little-endian floats.
pub fn read_f32s<R: Read>(reader: &mut R, section: &'static str, count: usize) -> Result<Vec<f32>> {
    let bytes = read_section(reader, section, count * 4)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn check_point_count(count: usize) -> Result<()> {
    if count > MAX_POINTS {
        return Err(ProtocolError::TooManyPoints {
            count,
            max: MAX_POINTS,
        });
    }
    Ok(())
}

/// Header of a downsample or voxel debug request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownsampleHeader {
    pub point_count: usize,
    pub voxel_size: f32,
    pub bounds: Bounds,
    pub capabilities: Capabilities,
}

impl DownsampleHeader {
    /// Read the 36-byte header with the trailing flags word.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let buf = read_header::<R, DOWNSAMPLE_HEADER_LEN>(reader)?;
        let mut header = Self::decode(&buf);
        header.capabilities = Capabilities::from_flags(u32_at(&buf, 32));
        Ok(header)
    }

    /// Read the 32-byte header that has no flags word.
    pub fn read_without_flags<R: Read>(reader: &mut R) -> Result<Self> {
        let buf = read_header::<R, VOXEL_DEBUG_HEADER_LEN>(reader)?;
        Ok(Self::decode(&buf))
    }

    fn decode(buf: &[u8]) -> Self {
        let mut bounds = [0f32; 6];
        for (k, v) in bounds.iter_mut().enumerate() {
            *v = f32_at(buf, 8 + k * 4);
        }
        Self {
            point_count: u32_at(buf, 0) as usize,
            voxel_size: f32_at(buf, 4),
            bounds: Bounds::from_array(bounds),
            capabilities: Capabilities::default(),
        }
    }

    /// Encode; the flags word is written only when `with_flags` is set.
    pub fn write<W: Write>(&self, writer: &mut W, with_flags: bool) -> io::Result<()> {
        writer.write_all(&(self.point_count as u32).to_le_bytes())?;
        writer.write_all(&self.voxel_size.to_le_bytes())?;
        for v in self.bounds.to_array() {
            writer.write_all(&v.to_le_bytes())?;
        }
        if with_flags {
            writer.write_all(&self.capabilities.to_flags().to_le_bytes())?;
        }
        Ok(())
    }

    /// Voxel lattice anchored at the global minimum.
    pub fn params(&self) -> DownsampleParams {
        DownsampleParams::new(self.voxel_size, self.bounds.min)
    }

    /// Zero points or an invalid voxel size: answer with an empty response.
    pub fn is_empty_request(&self) -> bool {
        self.point_count == 0 || !self.params().is_valid()
    }

    /// Read the positions and every flagged attribute section.
    pub fn read_payload<R: Read>(&self, reader: &mut R) -> Result<DownsamplePayload> {
        check_point_count(self.point_count)?;
        let n = self.point_count;
        let points = read_f32s(reader, "positions", n * 3)?;
        let colors = if self.capabilities.color {
            Some(read_f32s(reader, "colors", n * 3)?)
        } else {
            None
        };
        let intensities = if self.capabilities.intensity {
            Some(read_f32s(reader, "intensities", n)?)
        } else {
            None
        };
        let classifications = if self.capabilities.classification {
            Some(read_section(reader, "classifications", n)?)
        } else {
            None
        };
        Ok(DownsamplePayload {
            points,
            colors,
            intensities,
            classifications,
        })
    }
}

/// Decoded body of a downsample request.
#[derive(Debug, Clone, PartialEq)]
pub struct DownsamplePayload {
    pub points: Vec<f32>,
    pub colors: Option<Vec<f32>>,
    pub intensities: Option<Vec<f32>>,
    pub classifications: Option<Vec<u8>>,
}

impl DownsamplePayload {
    pub fn attributes(&self) -> crate::Attributes<'_> {
        crate::Attributes {
            colors: self.colors.as_deref(),
            intensities: self.intensities.as_deref(),
            classifications: self.classifications.as_deref(),
        }
    }
}

/// Header of a smoothing request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothHeader {
    pub point_count: usize,
    pub params: SmoothParams,
}

impl SmoothHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let buf = read_header::<R, SMOOTH_HEADER_LEN>(reader)?;
        // Iterations travel as a float; negative and NaN saturate to zero.
        let iterations = f32_at(&buf, 8) as u32;
        Ok(Self {
            point_count: u32_at(&buf, 0) as usize,
            params: SmoothParams::new(f32_at(&buf, 4), iterations),
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&(self.point_count as u32).to_le_bytes())?;
        writer.write_all(&self.params.radius.to_le_bytes())?;
        writer.write_all(&(self.params.iterations as f32).to_le_bytes())
    }

    pub fn is_empty_request(&self) -> bool {
        self.point_count == 0 || self.params.is_noop()
    }

    pub fn read_points<R: Read>(&self, reader: &mut R) -> Result<Vec<f32>> {
        check_point_count(self.point_count)?;
        read_f32s(reader, "positions", self.point_count * 3)
    }
}

/// Raw little-endian floats with no count prefix.
pub fn write_f32_section<W: Write>(writer: &mut W, values: &[f32]) -> io::Result<()> {
    let bytes: Vec<u8> = values.iter().flat_map(|f| f.to_le_bytes()).collect();
    writer.write_all(&bytes)
}

/// `[u32 0]`: the answer to a request with nothing to do.
pub fn write_empty_response<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&0u32.to_le_bytes())?;
    writer.flush()
}

/// `[u32 count][f32* xyz]` for smoothing and voxel debug results.
pub fn write_points_response<W: Write>(writer: &mut W, points: &[f32]) -> io::Result<()> {
    writer.write_all(&((points.len() / 3) as u32).to_le_bytes())?;
    write_f32_section(writer, points)?;
    writer.flush()
}

/// `[u32 count][positions][colors?][intensities?][classifications?]`.
pub fn write_downsample_response<W: Write>(writer: &mut W, result: &Downsampled) -> io::Result<()> {
    writer.write_all(&(result.len() as u32).to_le_bytes())?;
    write_f32_section(writer, &result.points)?;
    if let Some(colors) = &result.colors {
        write_f32_section(writer, colors)?;
    }
    if let Some(intensities) = &result.intensities {
        write_f32_section(writer, intensities)?;
    }
    if let Some(classifications) = &result.classifications {
        writer.write_all(classifications)?;
    }
    writer.flush()
}
