//! Scan-to-map scorer and RMHC localizer.
//!
//! [`scorer::score`] answers "how well does this point cloud line up with
//! the map at this pose"; [`rmhc_search`] drives that objective with
//! random-mutation hill climbing to find the best pose near a starting
//! guess. Both are pure functions of (grid, cloud, pose) with no hidden
//! state beyond the caller-supplied [`sampler::NormalSampler`].

pub mod sampler;
pub mod scorer;

pub use sampler::{NormalSampler, Rand8Sampler};
pub use scorer::score;

use grid::Grid;
use slam_types::Pose;
use tracing::{debug, trace};

/// Tuning knobs for one [`rmhc_search`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmhcParams {
    /// Standard deviation of the x/y perturbation, mm.
    pub sigma_xy_mm: f64,
    /// Standard deviation of the theta perturbation, degrees.
    pub sigma_theta_deg: f64,
    /// Maximum non-improving mutations to try before giving up.
    pub max_iter: u32,
}

/// Random-mutation hill climbing search for the best-scoring pose near
/// `start`.
///
/// Perturbs the last-accepted best pose by Gaussian noise drawn from
/// `sampler`, keeping any mutation that improves (lowers) the scan-to-map
/// score. `counter` tracks consecutive non-improving mutations since the
/// last restart; once it exceeds `max_iter / 3` *and* a new best has been
/// found since that restart, the search re-centers on the new best and
/// halves both sigmas (simulated-annealing-style schedule). Returns
/// `start` unchanged when `max_iter == 0`.
pub fn rmhc_search(
    start: Pose,
    grid: &Grid,
    obst_x_mm: &[f32],
    obst_y_mm: &[f32],
    params: RmhcParams,
    sampler: &mut impl NormalSampler,
) -> Pose {
    let RmhcParams { mut sigma_xy_mm, mut sigma_theta_deg, max_iter } = params;

    let mut last_best = start;
    let mut best = start;

    let d0 = score(grid, obst_x_mm, obst_y_mm, start);
    let mut lowest = d0;
    let mut last_lowest = d0;
    let mut counter: u32 = 0;

    while counter < max_iter {
        let current = Pose::new(
            last_best.x_mm + sampler.draw(0.0, sigma_xy_mm),
            last_best.y_mm + sampler.draw(0.0, sigma_xy_mm),
            last_best.theta_deg + sampler.draw(0.0, sigma_theta_deg),
        );

        let d = score(grid, obst_x_mm, obst_y_mm, current);

        if d != -1 && d < lowest {
            lowest = d;
            best = current;
        } else {
            counter += 1;
        }

        if counter > max_iter / 3 && lowest < last_lowest {
            last_best = best;
            last_lowest = lowest;
            counter = 0;
            sigma_xy_mm *= 0.5;
            sigma_theta_deg *= 0.5;
            trace!(sigma_xy_mm, sigma_theta_deg, lowest, "rmhc annealing restart");
        }
    }

    debug!(
        start_x = start.x_mm,
        start_y = start.y_mm,
        best_x = best.x_mm,
        best_y = best.y_mm,
        lowest,
        "rmhc search complete"
    );

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use slam_types::{CloudPoint, ObstacleClass};

    fn make_grid_with_point(pose: Pose, point: CloudPoint) -> Grid {
        let mut grid = Grid::new(200, 20.0).unwrap();
        grid.integrate(&[point], pose, 80, 600.0).unwrap();
        grid
    }

    #[test]
    fn zero_iterations_returns_start_unchanged() {
        let grid = Grid::new(100, 10.0).unwrap();
        let start = Pose::new(5000.0, 5000.0, 12.5);
        let mut sampler = Rand8Sampler::new(42);

        let params = RmhcParams { sigma_xy_mm: 100.0, sigma_theta_deg: 20.0, max_iter: 0 };
        let result = rmhc_search(start, &grid, &[], &[], params, &mut sampler);

        assert_eq!(result, start);
    }

    #[test]
    fn converges_near_a_known_obstacle_and_is_reproducible() {
        let true_pose = Pose::new(5000.0, 5000.0, 0.0);
        let point = CloudPoint { x_mm: 0.0, y_mm: 0.0, class: ObstacleClass::Obstacle };
        let grid = make_grid_with_point(true_pose, point);

        let obst_x = [0.0f32];
        let obst_y = [0.0f32];
        let start = Pose::new(5000.0, 5000.0, 0.0);
        let params = RmhcParams { sigma_xy_mm: 100.0, sigma_theta_deg: 20.0, max_iter: 1000 };

        let mut sampler_a = Rand8Sampler::new(42);
        let result_a = rmhc_search(start, &grid, &obst_x, &obst_y, params, &mut sampler_a);

        let mut sampler_b = Rand8Sampler::new(42);
        let result_b = rmhc_search(start, &grid, &obst_x, &obst_y, params, &mut sampler_b);

        assert_eq!(result_a, result_b);
        assert!((result_a.x_mm - 5000.0).abs() < 100.0);
        assert!((result_a.y_mm - 5000.0).abs() < 100.0);
    }

    #[test]
    fn cloning_a_sampler_reproduces_the_same_search() {
        let true_pose = Pose::new(5000.0, 5000.0, 0.0);
        let point = CloudPoint { x_mm: 0.0, y_mm: 0.0, class: ObstacleClass::Obstacle };
        let grid = make_grid_with_point(true_pose, point);

        let obst_x = [0.0f32];
        let obst_y = [0.0f32];
        let start = Pose::new(5000.0, 5000.0, 0.0);
        let params = RmhcParams { sigma_xy_mm: 100.0, sigma_theta_deg: 20.0, max_iter: 200 };

        let mut original = Rand8Sampler::new(7);
        let mut clone = original.clone();

        let result_original = rmhc_search(start, &grid, &obst_x, &obst_y, params, &mut original);
        let result_clone = rmhc_search(start, &grid, &obst_x, &obst_y, params, &mut clone);

        assert_eq!(result_original, result_clone);
    }

    #[test]
    fn no_overlap_never_improves_over_start() {
        let grid = Grid::new(10, 1.0).unwrap();
        let obst_x = [1_000_000.0f32];
        let obst_y = [1_000_000.0f32];
        let start = Pose::new(500.0, 500.0, 0.0);
        let mut sampler = Rand8Sampler::new(1);

        let params = RmhcParams { sigma_xy_mm: 50.0, sigma_theta_deg: 10.0, max_iter: 50 };
        let result = rmhc_search(start, &grid, &obst_x, &obst_y, params, &mut sampler);

        assert_eq!(result, start);
    }
}
