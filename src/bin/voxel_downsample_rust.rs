use std::io::{self, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use pointcloud_tools::downsample;
use pointcloud_tools::logging::{self, RunReport};
use pointcloud_tools::protocol::{self, DownsampleHeader};
use tracing::debug;

// Input:  [u32 pointCount][f32 voxelSize][f32 minX..maxZ][u32 flags][f32* positions]
//         [optional colors][optional intensities][optional classifications]
// Output: [u32 outputCount][f32* positions][optional colors][optional intensities][optional classifications]

fn main() -> Result<()> {
    logging::init();

    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();

    let header = DownsampleHeader::read(&mut stdin).context("reading downsample header")?;
    debug!(?header, "downsample request");

    if header.is_empty_request() {
        protocol::write_empty_response(&mut stdout).context("writing empty response")?;
        return Ok(());
    }

    let payload = header
        .read_payload(&mut stdin)
        .context("reading downsample payload")?;

    let started = Instant::now();
    let result = downsample(&payload.points, &header.params(), payload.attributes());
    RunReport::new("voxel_downsample_rust", header.point_count, result.len(), started).log();

    protocol::write_downsample_response(&mut stdout, &result).context("writing downsample response")?;
    stdout.flush().context("flushing stdout")?;
    Ok(())
}
