//! Scan builder: converts raw Lidar ranges into a local point cloud.
//!
//! Handles three steps in order: optional angular interpolation for
//! unevenly-sampled devices, velocity compensation (stretching the scan to
//! account for robot motion during the sweep), and point generation with
//! angular spanning.

use slam_types::{CloudPoint, LaserSpec, ObstacleClass, PointCloud, PoseChange};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("range array length {got} does not match scan_size {expected}")]
    ArgumentMismatch { expected: usize, got: usize },
}

/// A long-lived scan builder: owns its point cloud and rewrites it in
/// place on every [`Scan::build`] call.
#[derive(Debug, Clone)]
pub struct Scan {
    laser: LaserSpec,
    span: usize,
    cloud: PointCloud,
}

impl Scan {
    /// Create a scan builder for `laser`, replicating each real ray into
    /// `span` synthetic samples.
    pub fn new(laser: LaserSpec, span: usize) -> Self {
        let span = span.max(1);
        let capacity = Self::capacity(&laser, span);
        Self { laser, span, cloud: PointCloud::with_capacity(capacity) }
    }

    fn capacity(laser: &LaserSpec, span: usize) -> usize {
        laser.scan_size.saturating_sub(2 * laser.detection_margin + 1) * span
    }

    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    pub fn laser_spec(&self) -> &LaserSpec {
        &self.laser
    }

    pub fn span(&self) -> usize {
        self.span
    }

    /// Rebuild the point cloud from a fresh set of ranges.
    ///
    /// `ranges_mm` must have `laser.scan_size` entries; `0` means "no
    /// return". `angles_deg`, if given, must be the same length and
    /// triggers Step A's angular interpolation. `pose_change`, if given,
    /// applies Step B's velocity compensation; when omitted, the scan is
    /// built as if the robot were stationary during the sweep.
    pub fn build(
        &mut self,
        ranges_mm: &[u32],
        angles_deg: Option<&[f64]>,
        pose_change: Option<PoseChange>,
        hole_width_mm: f64,
    ) -> Result<(), ScanError> {
        let size = self.laser.scan_size;
        if ranges_mm.len() != size {
            return Err(ScanError::ArgumentMismatch { expected: size, got: ranges_mm.len() });
        }
        if let Some(angles) = angles_deg {
            if angles.len() != ranges_mm.len() {
                return Err(ScanError::ArgumentMismatch {
                    expected: ranges_mm.len(),
                    got: angles.len(),
                });
            }
        }

        let working_ranges: Vec<f64> = match angles_deg {
            Some(angles) => interpolate(angles, ranges_mm),
            None => ranges_mm.iter().map(|&r| r as f64).collect(),
        };

        let degrees_per_second = (self.laser.scan_rate_hz * 360.0).trunc();
        let (dxy, dtheta) = pose_change
            .map(|pc| (pc.dxy_mm_per_s, pc.dtheta_deg_per_s))
            .unwrap_or((0.0, 0.0));
        let horz = dxy / degrees_per_second;
        let rot = 1.0 + dtheta / degrees_per_second;

        self.cloud.clear();

        let margin = self.laser.detection_margin;
        let hole_half = hole_width_mm / 2.0;
        let detection_angle = self.laser.detection_angle_deg;
        let span = self.span;
        let denom = (size * span) as f64 - 1.0;

        for i in (margin + 1)..size.saturating_sub(margin) {
            let r = working_ranges[i];

            let (distance, class) = if r == 0.0 {
                (self.laser.distance_no_detection_mm, ObstacleClass::NoObstacle)
            } else if r > hole_half {
                (r, ObstacleClass::Obstacle)
            } else {
                continue;
            };

            for j in 0..span {
                let k = (i * span + j) as f64 * detection_angle / denom;
                let angle = (-detection_angle / 2.0 + k * rot).to_radians();
                let x_mm = distance * angle.cos() - k * horz;
                let y_mm = distance * angle.sin();
                self.cloud.push(CloudPoint { x_mm, y_mm, class });
            }
        }

        trace!(
            points = self.cloud.points().len(),
            obstacles = self.cloud.obstacle_len(),
            "scan built"
        );

        Ok(())
    }
}

/// Pair each `(angle, distance)`, stable-sort by angle, then resample by
/// evaluating the sorted table's linear interpolant at abscissa `k` for
/// every output index `k`. Note this treats the output index itself as
/// the interpolation abscissa rather than an evenly-spaced angle.
fn interpolate(angles_deg: &[f64], ranges_mm: &[u32]) -> Vec<f64> {
    let mut pairs: Vec<(f64, f64)> =
        angles_deg.iter().zip(ranges_mm).map(|(&a, &r)| (a, r as f64)).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let xs: Vec<f64> = pairs.iter().map(|&(a, _)| a).collect();
    let ys: Vec<f64> = pairs.iter().map(|&(_, d)| d).collect();

    (0..ranges_mm.len()).map(|k| interp(&xs, &ys, k as f64)).collect()
}

/// Linear interpolation/extrapolation of `ys` over `xs` (ascending),
/// evaluated at `q`. Extrapolates past either end using the nearest
/// segment's slope.
fn interp(xs: &[f64], ys: &[f64], q: f64) -> f64 {
    if xs.len() == 1 {
        return ys[0];
    }

    let last = xs.len() - 1;
    let seg = if q <= xs[0] {
        0
    } else if q >= xs[last] {
        last - 1
    } else {
        xs.windows(2).position(|w| q >= w[0] && q <= w[1]).unwrap_or(last - 1)
    };

    let (x0, x1) = (xs[seg], xs[seg + 1]);
    let (y0, y1) = (ys[seg], ys[seg + 1]);
    let slope = (y1 - y0) / (x1 - x0);
    y0 + slope * (q - x0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn laser(scan_size: usize) -> LaserSpec {
        LaserSpec {
            scan_size,
            scan_rate_hz: 5.0,
            detection_angle_deg: 360.0,
            distance_no_detection_mm: 4000.0,
            detection_margin: 0,
            offset_mm: 0.0,
        }
    }

    #[test]
    fn rejects_range_length_mismatch() {
        let mut scan = Scan::new(laser(10), 1);
        let ranges = vec![1000u32; 5];
        let err = scan.build(&ranges, None, None, 600.0).unwrap_err();
        assert!(matches!(err, ScanError::ArgumentMismatch { expected: 10, got: 5 }));
    }

    #[test]
    fn rejects_angle_length_mismatch() {
        let mut scan = Scan::new(laser(4), 1);
        let ranges = vec![1000u32; 4];
        let angles = vec![0.0, 90.0, 180.0];
        let err = scan.build(&ranges, Some(&angles), None, 600.0).unwrap_err();
        assert!(matches!(err, ScanError::ArgumentMismatch { expected: 4, got: 3 }));
    }

    #[test]
    fn zero_range_means_no_obstacle_at_default_distance() {
        let mut scan = Scan::new(laser(10), 1);
        let mut ranges = vec![2000u32; 10];
        ranges[5] = 0;
        scan.build(&ranges, None, None, 600.0).unwrap();

        let points = scan.cloud().points();
        assert!(points.iter().any(|p| p.class == ObstacleClass::NoObstacle));
        assert_eq!(scan.cloud().obstacle_len(), points.len() - 1);
    }

    #[test]
    fn range_at_exactly_half_hole_width_is_excluded() {
        let mut scan = Scan::new(laser(10), 1);
        let mut ranges = vec![2000u32; 10];
        let margin = 0;
        let target_index = margin + 2;
        ranges[target_index] = 300; // == hole_width/2 for hole_width=600
        scan.build(&ranges, None, None, 600.0).unwrap();

        // loop covers indices 1..10 (9 rays); the one at exactly hole_width/2 is excluded
        assert_eq!(scan.cloud().points().len(), 8);
    }

    #[test]
    fn zero_velocity_matches_omitted_pose_change() {
        let mut a = Scan::new(laser(20), 2);
        let mut b = Scan::new(laser(20), 2);
        let ranges: Vec<u32> = (0..20).map(|i| 1000 + i * 10).collect();

        a.build(&ranges, None, None, 600.0).unwrap();
        b.build(
            &ranges,
            None,
            Some(PoseChange { dxy_mm_per_s: 0.0, dtheta_deg_per_s: 0.0, dt_s: 0.1 }),
            600.0,
        )
        .unwrap();

        assert_eq!(a.cloud().points().len(), b.cloud().points().len());
        for (pa, pb) in a.cloud().points().iter().zip(b.cloud().points()) {
            assert_relative_eq!(pa.x_mm, pb.x_mm, epsilon = 1e-9);
            assert_relative_eq!(pa.y_mm, pb.y_mm, epsilon = 1e-9);
            assert_eq!(pa.class, pb.class);
        }
    }

    #[test]
    fn obstacle_subsequence_matches_main_sequence_obstacles() {
        let mut scan = Scan::new(laser(20), 1);
        let ranges: Vec<u32> = (0..20).map(|i| if i % 5 == 0 { 0 } else { 1500 }).collect();
        scan.build(&ranges, None, None, 600.0).unwrap();

        let obstacle_points: Vec<_> =
            scan.cloud().points().iter().filter(|p| p.class == ObstacleClass::Obstacle).collect();
        assert_eq!(obstacle_points.len(), scan.cloud().obstacle_len());
        for (p, (&ox, &oy)) in obstacle_points
            .iter()
            .zip(scan.cloud().obstacle_x_mm().iter().zip(scan.cloud().obstacle_y_mm()))
        {
            assert_relative_eq!(p.x_mm as f32, ox, epsilon = 1e-3);
            assert_relative_eq!(p.y_mm as f32, oy, epsilon = 1e-3);
        }
    }

    #[test]
    fn interpolation_resamples_by_index_abscissa() {
        let angles = [10.0, 30.0, 20.0, 40.0];
        let ranges = [100u32, 300, 200, 400];

        let resampled = interpolate(&angles, &ranges);

        let mut pairs: Vec<(f64, f64)> =
            angles.iter().zip(ranges.iter()).map(|(&a, &r)| (a, r as f64)).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        let xs: Vec<f64> = pairs.iter().map(|&(a, _)| a).collect();
        let ys: Vec<f64> = pairs.iter().map(|&(_, d)| d).collect();

        for k in 0..4usize {
            assert_relative_eq!(resampled[k], interp(&xs, &ys, k as f64), epsilon = 1e-9);
        }
        assert_eq!(xs, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(ys, vec![100.0, 200.0, 300.0, 400.0]);
    }

    #[test]
    fn interp_extrapolates_past_table_ends() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 10.0, 20.0];
        assert_relative_eq!(interp(&xs, &ys, -1.0), -10.0, epsilon = 1e-9);
        assert_relative_eq!(interp(&xs, &ys, 5.0), 50.0, epsilon = 1e-9);
    }
}
