use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bounds::Bounds;
use crate::error::{try_filled, Result};
use crate::grid::FlatGrid;

/// Neighborhood smoothing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothParams {
    pub radius: f32,
    pub iterations: u32,
}

impl SmoothParams {
    pub fn new(radius: f32, iterations: u32) -> Self {
        Self { radius, iterations }
    }

    /// Zero iterations or a non-positive radius leaves the input untouched.
    pub fn is_noop(&self) -> bool {
        self.iterations == 0 || !(self.radius > 0.0 && self.radius.is_finite())
    }
}

/// Iteratively pull each point toward the mean of its neighbors.
///
/// Each iteration buckets the current positions into a grid with cells of
/// `radius`, anchored at their current bounds, then for every point gathers the other points within `radius`
/// (27-cell scan, squared distances). A point with `k > 0` neighbors moves to
/// `(self + sum(neighbors)) / (k + 1)`; a point with none stays put. All
/// reads within an iteration see the previous iteration's positions.
///
/// The output has the same length and ordering as the input. Empty input or
/// a no-op configuration returns the input unchanged; the only error is
/// failing to size or allocate the grid.
pub fn smooth(points: &[f32], params: &SmoothParams) -> Result<Vec<f32>> {
    let point_count = points.len() / 3;
    let points = &points[..point_count * 3];

    let bounds = match Bounds::scan(points) {
        Some(bounds) if !params.is_noop() => bounds,
        _ => {
            debug!(point_count, ?params, "point smoothing skipped");
            return Ok(points.to_vec());
        }
    };

    let radius = params.radius;
    let mut grid = FlatGrid::new(&bounds, radius)?;

    let mut current = points.to_vec();
    let mut next = try_filled("smoothing buffer", points.len(), 0.0f32)?;

    for iteration in 0..params.iterations {
        // Averages can round a hair past the previous extremes.
        if iteration > 0 {
            if let Some(bounds) = Bounds::scan(&current) {
                grid.reanchor(&bounds)?;
            }
        }
        grid.rebuild(&current)?;

        for i in 0..point_count {
            let mut sum = [0.0f32; 3];
            let mut count = 0u32;
            grid.for_each_neighbor(&current, i, radius, |j| {
                let j3 = j * 3;
                sum[0] += current[j3];
                sum[1] += current[j3 + 1];
                sum[2] += current[j3 + 2];
                count += 1;
            });

            let i3 = i * 3;
            for axis in 0..3 {
                let own = current[i3 + axis];
                // The point counts once toward its own average.
                next[i3 + axis] = if count > 0 {
                    (own + sum[axis]) / (count + 1) as f32
                } else {
                    own
                };
            }
        }

        std::mem::swap(&mut current, &mut next);
    }

    debug!(point_count, radius, iterations = params.iterations, "point smoothing finished");
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 0.001, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_smooth_single_point_unchanged() {
        let out = smooth(&[1.0, 1.0, 1.0], &SmoothParams::new(0.5, 5)).unwrap();
        assert_eq!(out, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_smooth_empty() {
        let out = smooth(&[], &SmoothParams::new(1.0, 3)).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_smooth_noop_params() {
        let points = vec![0.0, 0.0, 0.0, 0.1, 0.0, 0.0];
        assert_eq!(smooth(&points, &SmoothParams::new(0.0, 3)).unwrap(), points);
        assert_eq!(smooth(&points, &SmoothParams::new(-1.0, 3)).unwrap(), points);
        assert_eq!(smooth(&points, &SmoothParams::new(1.0, 0)).unwrap(), points);
    }

    #[test]
    fn test_smooth_pair_meets_in_middle() {
        let points = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let out = smooth(&points, &SmoothParams::new(1.5, 1)).unwrap();
        assert_close(&out, &[0.5, 0.0, 0.0, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_smooth_damped_average() {
        // Middle point sees both ends; ends only see the middle.
        let points = vec![
            0.0, 0.0, 0.0,
            1.0, 0.0, 0.0,
            2.0, 0.0, 0.0,
        ];
        let out = smooth(&points, &SmoothParams::new(1.0, 1)).unwrap();
        assert_close(&out, &[0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 1.5, 0.0, 0.0]);
    }

    #[test]
    fn test_smooth_reads_previous_iteration_only() {
        let points = vec![
            0.0, 0.0, 0.0,
            1.0, 0.0, 0.0,
            2.0, 0.0, 0.0,
        ];
        let out = smooth(&points, &SmoothParams::new(1.0, 2)).unwrap();
        // Second pass starts from 0.5, 1.0, 1.5 where everything is in range.
        assert_close(&out, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_smooth_isolated_points_stay() {
        let points = vec![
            0.0, 0.0, 0.0,
            10.0, 10.0, 10.0,
            -10.0, 5.0, 0.0,
        ];
        let out = smooth(&points, &SmoothParams::new(1.0, 4)).unwrap();
        assert_eq!(out, points);
    }

    #[test]
    fn test_smooth_shared_minimum_keeps_neighbors() {
        // Every point shares x = -12.213005; the first pass rounds some
        // averages below it.
        let x = -12.213005f32;
        let points = vec![
            x, 0.0, 0.0,
            x, 0.3, 0.1,
            x, 0.6, 0.0,
            x, 0.2, 0.5,
            x, 0.9, 0.4,
            x, 1.4, 0.2,
        ];
        let radius = 0.9;
        let mut expected = points.clone();
        for _ in 0..3 {
            expected = brute_force_step(&expected, radius);
        }
        let out = smooth(&points, &SmoothParams::new(radius, 3)).unwrap();
        assert_close(&out, &expected);
    }

    fn brute_force_step(points: &[f32], radius: f32) -> Vec<f32> {
        let n = points.len() / 3;
        let mut next = points.to_vec();
        for i in 0..n {
            let mut sum = [0.0f32; 3];
            let mut count = 0;
            for j in (0..n).filter(|&j| j != i) {
                let d: f32 = (0..3).map(|a| (points[j * 3 + a] - points[i * 3 + a]).powi(2)).sum();
                if d <= radius * radius {
                    for a in 0..3 {
                        sum[a] += points[j * 3 + a];
                    }
                    count += 1;
                }
            }
            if count > 0 {
                for a in 0..3 {
                    next[i * 3 + a] = (points[i * 3 + a] + sum[a]) / (count + 1) as f32;
                }
            }
        }
        next
    }

    #[test]
    fn test_smooth_keeps_count() {
        let points: Vec<f32> = (0..300).map(|i| (i as f32 * 0.37).sin() * 3.0).collect();
        let out = smooth(&points, &SmoothParams::new(0.8, 3)).unwrap();
        assert_eq!(out.len(), points.len());
    }
}
