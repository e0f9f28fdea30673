//! Scan-to-map matching score.

use grid::Grid;
use slam_types::Pose;

/// Score how well `cloud`'s obstacle points line up with `grid` when the
/// robot is assumed to be at `pose`.
///
/// Lower is better: grid cells near `OBSTACLE` (0) score well, cells near
/// `NO_OBSTACLE` score poorly. Returns `-1` when none of the projected
/// points land inside the grid (no overlap to score against).
pub fn score(grid: &Grid, obst_x_mm: &[f32], obst_y_mm: &[f32], pose: Pose) -> i64 {
    let theta = pose.theta_deg.to_radians();
    let (sintheta, costheta) = theta.sin_cos();
    let scale = grid.scale_pixels_per_mm();
    let size = grid.size_pixels() as i64;

    let mut sum: i64 = 0;
    let mut npoints: i64 = 0;

    for (&x, &y) in obst_x_mm.iter().zip(obst_y_mm) {
        let x = x as f64;
        let y = y as f64;

        let xr = costheta * x - sintheta * y;
        let yr = sintheta * x + costheta * y;

        let px = roundup((pose.x_mm + xr) * scale);
        let py = roundup((pose.y_mm + yr) * scale);

        if px >= 0 && px < size && py >= 0 && py < size {
            if let Some(cell) = grid.get(px as usize, py as usize) {
                sum += cell as i64;
                npoints += 1;
            }
        }
    }

    if npoints > 0 {
        sum * 1024 / npoints
    } else {
        -1
    }
}

fn roundup(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use slam_types::PointCloud;

    fn cloud_from(points: &[(f64, f64)]) -> PointCloud {
        let mut cloud = PointCloud::with_capacity(points.len());
        for &(x_mm, y_mm) in points {
            cloud.push(slam_types::CloudPoint {
                x_mm,
                y_mm,
                class: slam_types::ObstacleClass::Obstacle,
            });
        }
        cloud
    }

    #[test]
    fn score_is_negative_one_when_nothing_overlaps_the_grid() {
        let grid = Grid::new(10, 1.0).unwrap();
        let cloud = cloud_from(&[(1_000_000.0, 1_000_000.0)]);
        let pose = Pose::new(500.0, 500.0, 0.0);
        assert_eq!(
            score(&grid, cloud.obstacle_x_mm(), cloud.obstacle_y_mm(), pose),
            -1
        );
    }

    #[test]
    fn score_is_in_expected_range_when_points_overlap() {
        let mut grid = Grid::new(100, 10.0).unwrap();
        let pose = Pose::new(5000.0, 5000.0, 0.0);
        let points = [slam_types::CloudPoint {
            x_mm: 1000.0,
            y_mm: 0.0,
            class: slam_types::ObstacleClass::Obstacle,
        }];
        grid.integrate(&points, pose, 50, 600.0).unwrap();

        let cloud = cloud_from(&[(1000.0, 0.0)]);
        let s = score(&grid, cloud.obstacle_x_mm(), cloud.obstacle_y_mm(), pose);
        assert!((0..=65535 * 1024).contains(&s));
    }

    #[test]
    fn score_is_deterministic_for_identical_inputs() {
        let mut grid = Grid::new(100, 10.0).unwrap();
        let pose = Pose::new(5000.0, 5000.0, 0.0);
        let points = [slam_types::CloudPoint {
            x_mm: 1000.0,
            y_mm: 500.0,
            class: slam_types::ObstacleClass::Obstacle,
        }];
        grid.integrate(&points, pose, 50, 600.0).unwrap();

        let cloud = cloud_from(&[(1000.0, 500.0), (900.0, 400.0)]);
        let a = score(&grid, cloud.obstacle_x_mm(), cloud.obstacle_y_mm(), pose);
        let b = score(&grid, cloud.obstacle_x_mm(), cloud.obstacle_y_mm(), pose);
        assert_eq!(a, b);
    }
}
