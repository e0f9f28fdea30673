//! SLAM facade: scan building, RMHC localization, and map integration
//! wired together behind a single `update` call.
//!
//! Owns the grid, two scratch clouds (a wide-span one for mapping, a
//! narrow-span one for scoring — see the workspace design notes on cloud
//! aliasing), the RMHC sampler, and the single current best-estimate
//! pose.

use grid::{Grid, GridError};
use localize::{rmhc_search, NormalSampler, Rand8Sampler, RmhcParams};
use scan::{Scan, ScanError};
use slam_types::{LaserSpec, Pose, PoseChange};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SlamError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Tuning knobs for one [`Slam`] instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlamConfig {
    /// Obstacle thickness used by ray integration, mm.
    pub hole_width_mm: f64,
    /// Exponential-smoothing learning-rate numerator (0..256) passed to
    /// the ray integrator.
    pub quality: u32,
    /// Span factor for the mapping cloud (the scoring cloud always uses
    /// span 1, per the reference's cloud-aliasing design).
    pub mapping_span: usize,
    /// RMHC search parameters.
    pub rmhc: RmhcParams,
    /// Whether to run the RMHC localizer at all. `false` gives the
    /// "deterministic / odometry-only" variant: the predicted pose is
    /// used as-is and only mapping runs.
    pub localize: bool,
    /// Seed for the default `Rand8Sampler` when constructed via
    /// [`Slam::new`].
    pub seed: u64,
}

impl Default for SlamConfig {
    fn default() -> Self {
        Self {
            hole_width_mm: 600.0,
            quality: 50,
            mapping_span: 3,
            rmhc: RmhcParams { sigma_xy_mm: 100.0, sigma_theta_deg: 20.0, max_iter: 1000 },
            localize: true,
            seed: 0,
        }
    }
}

/// Ties the scan builder, RMHC localizer, and occupancy grid together
/// into the single `update` loop described in the core design.
pub struct Slam<S: NormalSampler = Rand8Sampler> {
    laser: LaserSpec,
    config: SlamConfig,
    grid: Grid,
    mapping_scan: Scan,
    scoring_scan: Scan,
    sampler: S,
    current: Pose,
}

impl Slam<Rand8Sampler> {
    /// Construct a facade backed by the default `Rand8Sampler`, seeded
    /// from `config.seed`.
    pub fn new(
        laser: LaserSpec,
        grid_size: usize,
        grid_meters_per_side: f64,
        config: SlamConfig,
    ) -> Result<Self, SlamError> {
        let sampler = Rand8Sampler::new(config.seed);
        Self::with_sampler(laser, grid_size, grid_meters_per_side, config, sampler)
    }
}

impl<S: NormalSampler> Slam<S> {
    /// Construct a facade backed by a caller-supplied sampler
    /// implementation.
    pub fn with_sampler(
        laser: LaserSpec,
        grid_size: usize,
        grid_meters_per_side: f64,
        config: SlamConfig,
        sampler: S,
    ) -> Result<Self, SlamError> {
        let grid = Grid::new(grid_size, grid_meters_per_side)?;
        let start_pose = Pose::new(grid_meters_per_side * 1000.0 / 2.0, grid_meters_per_side * 1000.0 / 2.0, 0.0);

        let mapping_scan = Scan::new(laser, config.mapping_span.max(1));
        let scoring_scan = Scan::new(laser, 1);

        info!(
            grid_size,
            grid_meters_per_side,
            start_x = start_pose.x_mm,
            start_y = start_pose.y_mm,
            "slam initialized"
        );

        Ok(Self { laser, config, grid, mapping_scan, scoring_scan, sampler, current: start_pose })
    }

    /// Current best-estimate pose.
    pub fn pose(&self) -> Pose {
        self.current
    }

    /// Snapshot the occupancy grid into the quantized persistence format
    /// (§6: one byte per cell, the cell's high byte).
    pub fn map_snapshot(&self) -> Vec<u8> {
        self.grid.snapshot()
    }

    /// Restore the occupancy grid from a snapshot produced by
    /// [`Slam::map_snapshot`].
    pub fn map_restore(&mut self, bytes: &[u8]) -> Result<(), GridError> {
        self.grid.restore(bytes)
    }

    /// Process one scan: rebuild the clouds, localize (unless disabled),
    /// integrate into the map, and advance the stored current pose.
    pub fn update(
        &mut self,
        ranges_mm: &[u32],
        pose_change: Option<PoseChange>,
    ) -> Result<Pose, SlamError> {
        self.mapping_scan.build(ranges_mm, None, pose_change, self.config.hole_width_mm)?;
        self.scoring_scan.build(ranges_mm, None, pose_change, self.config.hole_width_mm)?;

        let (dxy_mm, dtheta_deg) = displacement(pose_change);
        // Both terms are offset along the pre-update heading; dtheta_deg folds
        // into theta only after, never into the heading used for the offsets.
        let moved = offset_along_heading(self.current, dxy_mm + self.laser.offset_mm);
        let start_pose = Pose::new(moved.x_mm, moved.y_mm, self.current.theta_deg + dtheta_deg);

        let best_pose = if self.config.localize {
            rmhc_search(
                start_pose,
                &self.grid,
                self.scoring_scan.cloud().obstacle_x_mm(),
                self.scoring_scan.cloud().obstacle_y_mm(),
                self.config.rmhc,
                &mut self.sampler,
            )
        } else {
            start_pose
        };

        self.grid.integrate(
            self.mapping_scan.cloud().points(),
            best_pose,
            self.config.quality,
            self.config.hole_width_mm,
        )?;

        self.current = offset_along_heading(best_pose, -self.laser.offset_mm);

        debug!(
            x = self.current.x_mm,
            y = self.current.y_mm,
            theta = self.current.theta_deg,
            "slam update complete"
        );

        Ok(self.current)
    }
}

/// The `(dxy_mm, dtheta_deg)` a `PoseChange`'s rates cover over its own
/// `dt_s`.
fn displacement(pose_change: Option<PoseChange>) -> (f64, f64) {
    match pose_change {
        Some(pc) => (pc.dxy_mm_per_s * pc.dt_s, pc.dtheta_deg_per_s * pc.dt_s),
        None => (0.0, 0.0),
    }
}

/// Move `pose` by `offset_mm` along its own heading, leaving theta
/// unchanged. A negative `offset_mm` undoes a prior positive offset.
fn offset_along_heading(pose: Pose, offset_mm: f64) -> Pose {
    let theta_rad = pose.theta_deg.to_radians();
    Pose::new(pose.x_mm + offset_mm * theta_rad.cos(), pose.y_mm + offset_mm * theta_rad.sin(), pose.theta_deg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laser() -> LaserSpec {
        LaserSpec {
            scan_size: 360,
            scan_rate_hz: 5.0,
            detection_angle_deg: 360.0,
            distance_no_detection_mm: 4000.0,
            detection_margin: 1,
            offset_mm: 0.0,
        }
    }

    #[test]
    fn new_starts_at_grid_center() {
        let slam = Slam::new(laser(), 100, 10.0, SlamConfig::default()).unwrap();
        assert_eq!(slam.pose(), Pose::new(5000.0, 5000.0, 0.0));
    }

    #[test]
    fn rejects_invalid_grid_dimensions() {
        let err = Slam::new(laser(), 0, 10.0, SlamConfig::default()).unwrap_err();
        assert!(matches!(err, SlamError::Grid(GridError::InvalidDimensions { .. })));

        let err = Slam::new(laser(), 100, 0.0, SlamConfig::default()).unwrap_err();
        assert!(matches!(err, SlamError::Grid(GridError::InvalidDimensions { .. })));

        let err = Slam::new(laser(), 100, -1.0, SlamConfig::default()).unwrap_err();
        assert!(matches!(err, SlamError::Grid(GridError::InvalidDimensions { .. })));
    }

    #[test]
    fn update_with_uniform_ranges_keeps_pose_near_start_and_darkens_map() {
        let mut slam = Slam::new(laser(), 200, 20.0, SlamConfig::default()).unwrap();
        let ranges = vec![3000u32; 360];

        let pose = slam.update(&ranges, None).unwrap();
        assert!((pose.x_mm - 10000.0).abs() < 500.0);
        assert!((pose.y_mm - 10000.0).abs() < 500.0);

        let snapshot = slam.map_snapshot();
        assert!(snapshot.iter().any(|&b| b != 127));
    }

    #[test]
    fn deterministic_variant_skips_localization() {
        let mut config = SlamConfig::default();
        config.localize = false;
        let mut slam = Slam::new(laser(), 200, 20.0, config).unwrap();
        let ranges = vec![3000u32; 360];

        let pose = slam.update(&ranges, None).unwrap();
        assert_eq!(pose, Pose::new(10000.0, 10000.0, 0.0));
    }

    #[test]
    fn map_snapshot_restore_round_trips() {
        let mut slam = Slam::new(laser(), 50, 5.0, SlamConfig::default()).unwrap();
        let ranges = vec![2000u32; 360];
        slam.update(&ranges, None).unwrap();

        let snapshot = slam.map_snapshot();
        slam.map_restore(&snapshot).unwrap();
        assert_eq!(slam.map_snapshot(), snapshot);
    }
}
