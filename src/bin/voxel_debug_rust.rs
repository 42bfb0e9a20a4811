use std::io::{self, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use pointcloud_tools::logging::{self, RunReport};
use pointcloud_tools::protocol::{self, DownsampleHeader};
use pointcloud_tools::voxel_centers;
use tracing::debug;

// Input:  [u32 pointCount][f32 voxelSize][f32 minX][f32 minY][f32 minZ][f32 maxX][f32 maxY][f32 maxZ][f32* pointData]
// Output: [u32 voxelCount][f32* voxelCenters]

fn main() -> Result<()> {
    logging::init();

    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();

    let header = DownsampleHeader::read_without_flags(&mut stdin).context("reading voxel debug header")?;
    debug!(?header, "voxel debug request");

    if header.is_empty_request() {
        protocol::write_empty_response(&mut stdout).context("writing empty response")?;
        return Ok(());
    }

    let payload = header
        .read_payload(&mut stdin)
        .context("reading voxel debug payload")?;

    let started = Instant::now();
    let centers = voxel_centers(&payload.points, &header.params());
    RunReport::new("voxel_debug_rust", header.point_count, centers.len() / 3, started).log();

    protocol::write_points_response(&mut stdout, &centers).context("writing voxel debug response")?;
    stdout.flush().context("flushing stdout")?;
    Ok(())
}
