//! Shared value types for the SLAM core.

use serde::{Deserialize, Serialize};

/// Pixel value meaning "definitely an obstacle" in a [`Grid`](https://docs.rs/grid) cell.
pub const OBSTACLE: u32 = 0;

/// Pixel value meaning "definitely free space" in a grid cell.
pub const NO_OBSTACLE: u32 = 65500;

/// Robot pose in world coordinates: millimeters and degrees.
///
/// `theta_deg` is measured clockwise from the positive-x (east) axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x_mm: f64,
    pub y_mm: f64,
    pub theta_deg: f64,
}

impl Pose {
    pub fn new(x_mm: f64, y_mm: f64, theta_deg: f64) -> Self {
        Self { x_mm, y_mm, theta_deg }
    }

    /// Pose at the world origin, facing east.
    pub const ORIGIN: Pose = Pose { x_mm: 0.0, y_mm: 0.0, theta_deg: 0.0 };
}

impl Default for Pose {
    fn default() -> Self {
        Self::ORIGIN
    }
}

/// Static configuration of a 2D rangefinder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaserSpec {
    /// Number of rays per scan.
    pub scan_size: usize,
    /// Scan rate in Hz.
    pub scan_rate_hz: f64,
    /// Total detection-angle fan, in degrees.
    pub detection_angle_deg: f64,
    /// Range reported when the device sees "no return", in mm.
    pub distance_no_detection_mm: f64,
    /// Number of rays at each end of the fan to ignore.
    pub detection_margin: usize,
    /// Forward offset of the laser center from the robot's rotation center, in mm.
    pub offset_mm: f64,
}

impl LaserSpec {
    /// Degrees of fan swept per second at this scan rate.
    pub fn degrees_per_second(&self) -> f64 {
        self.scan_rate_hz * 360.0
    }
}

/// A pose change already expressed as per-second rates (a "velocity").
///
/// Produced by a collaborator (e.g. wheel odometry) dividing a raw
/// displacement by its elapsed time; the core never computes `dt` itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseChange {
    /// Linear displacement rate, mm/s.
    pub dxy_mm_per_s: f64,
    /// Angular displacement rate, deg/s.
    pub dtheta_deg_per_s: f64,
    /// Elapsed time this update covers, seconds.
    pub dt_s: f64,
}

/// Whether a built scan point represents sensed obstacle or free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObstacleClass {
    Obstacle,
    NoObstacle,
}

/// A single point in a built scan's local point cloud.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudPoint {
    pub x_mm: f64,
    pub y_mm: f64,
    pub class: ObstacleClass,
}

/// The point cloud produced by a scan builder: an ordered sequence of
/// `(x, y, class)` points, plus a dense obstacle-only projection used by
/// the scan-to-map scorer's tight loop.
///
/// The obstacle arrays are over-allocated by 4 slots (never read by this
/// port's scalar scorer) to mirror the reference's SIMD tail-safety
/// layout; see `grid`/`localize` design notes.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    points: Vec<CloudPoint>,
    obst_x_mm: Vec<f32>,
    obst_y_mm: Vec<f32>,
}

impl PointCloud {
    /// An empty cloud with no preallocated capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty cloud with capacity for `capacity` points (main sequence)
    /// and `capacity + 4` obstacle slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            obst_x_mm: Vec::with_capacity(capacity + 4),
            obst_y_mm: Vec::with_capacity(capacity + 4),
        }
    }

    /// Discard all points while retaining allocated capacity.
    pub fn clear(&mut self) {
        self.points.clear();
        self.obst_x_mm.clear();
        self.obst_y_mm.clear();
    }

    /// Append a point to the main sequence, additionally projecting it
    /// into the dense obstacle arrays when its class is `Obstacle`.
    pub fn push(&mut self, point: CloudPoint) {
        if point.class == ObstacleClass::Obstacle {
            self.obst_x_mm.push(point.x_mm as f32);
            self.obst_y_mm.push(point.y_mm as f32);
        }
        self.points.push(point);
    }

    /// The main sequence, in insertion order.
    pub fn points(&self) -> &[CloudPoint] {
        &self.points
    }

    /// The dense obstacle-only x coordinates (mm), in insertion order.
    pub fn obstacle_x_mm(&self) -> &[f32] {
        &self.obst_x_mm
    }

    /// The dense obstacle-only y coordinates (mm), in insertion order.
    pub fn obstacle_y_mm(&self) -> &[f32] {
        &self.obst_y_mm
    }

    /// Number of obstacle-only points (length of the dense projection).
    pub fn obstacle_len(&self) -> usize {
        self.obst_x_mm.len()
    }
}
