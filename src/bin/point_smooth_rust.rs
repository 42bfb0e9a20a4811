use std::io::{self, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use pointcloud_tools::logging::{self, RunReport};
use pointcloud_tools::protocol::{self, SmoothHeader};
use pointcloud_tools::smooth;
use tracing::debug;

// Input:  [u32 pointCount][f32 smoothingRadius][f32 iterations][f32* pointData]
// Output: [u32 pointCount][f32* smoothedPoints]

fn main() -> Result<()> {
    logging::init();

    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();

    let header = SmoothHeader::read(&mut stdin).context("reading smoothing header")?;
    debug!(?header, "smoothing request");

    if header.is_empty_request() {
        protocol::write_empty_response(&mut stdout).context("writing empty response")?;
        return Ok(());
    }

    let points = header
        .read_points(&mut stdin)
        .context("reading smoothing payload")?;

    let started = Instant::now();
    let smoothed = smooth(&points, &header.params).context("smoothing point cloud")?;
    RunReport::new("point_smooth_rust", header.point_count, smoothed.len() / 3, started).log();

    protocol::write_points_response(&mut stdout, &smoothed).context("writing smoothing response")?;
    stdout.flush().context("flushing stdout")?;
    Ok(())
}
