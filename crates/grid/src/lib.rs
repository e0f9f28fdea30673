//! Grayscale occupancy grid and its Bresenham ray-integration update rule.
//!
//! Cells are 16-bit unsigned values in `[OBSTACLE, NO_OBSTACLE]`
//! (`0..=65500`), initialized to the midpoint (maximum uncertainty) and
//! nudged toward a ray's graded profile by exponential smoothing each time
//! a scan is integrated. This mirrors the reference CoreSLAM map, not the
//! log-odds occupancy grids common elsewhere in robotics stacks.

use slam_types::{CloudPoint, ObstacleClass, Pose, NO_OBSTACLE, OBSTACLE};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum GridError {
    #[error("invalid grid dimensions: size_pixels={size_pixels}, size_meters={size_meters}")]
    InvalidDimensions { size_pixels: usize, size_meters: f64 },

    #[error("byte buffer length {got} does not match grid cell count {expected}")]
    ArgumentMismatch { expected: usize, got: usize },

    #[error("ray has zero error gradient; increase hole_width_mm")]
    InsufficientHoleWidth,

    #[error("failed to allocate grid backing store")]
    AllocationFailure,
}

/// Square grayscale occupancy grid.
#[derive(Debug, Clone)]
pub struct Grid {
    cells: Vec<u16>,
    size_pixels: usize,
    size_meters: f64,
    scale_pixels_per_mm: f64,
}

const MIDPOINT: u16 = ((OBSTACLE + NO_OBSTACLE) / 2) as u16;

impl Grid {
    /// Allocate a `size_pixels x size_pixels` grid spanning `size_meters`
    /// meters per side, filled with the maximum-uncertainty midpoint.
    pub fn new(size_pixels: usize, size_meters: f64) -> Result<Self, GridError> {
        if size_pixels == 0 || !(size_meters > 0.0) {
            return Err(GridError::InvalidDimensions { size_pixels, size_meters });
        }
        let cell_count = size_pixels
            .checked_mul(size_pixels)
            .ok_or(GridError::AllocationFailure)?;
        let scale_pixels_per_mm = size_pixels as f64 / (size_meters * 1000.0);
        debug!(size_pixels, size_meters, scale_pixels_per_mm, "grid created");
        Ok(Self {
            cells: vec![MIDPOINT; cell_count],
            size_pixels,
            size_meters,
            scale_pixels_per_mm,
        })
    }

    pub fn size_pixels(&self) -> usize {
        self.size_pixels
    }

    pub fn size_meters(&self) -> f64 {
        self.size_meters
    }

    pub fn scale_pixels_per_mm(&self) -> f64 {
        self.scale_pixels_per_mm
    }

    /// Current value of the cell at `(x, y)`, or `None` if out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.size_pixels || y >= self.size_pixels {
            return None;
        }
        Some(self.cells[y * self.size_pixels + x])
    }

    /// Write `size_pixels^2` bytes into `out`, each the high byte
    /// (`cell >> 8`) of the corresponding cell, in row-major order.
    pub fn snapshot(&self) -> Vec<u8> {
        self.cells.iter().map(|&c| (c >> 8) as u8).collect()
    }

    /// Restore cell values from a byte buffer produced by [`Grid::snapshot`].
    /// Each byte `b` becomes the cell value `b << 8` (the low byte is lost).
    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), GridError> {
        if bytes.len() != self.cells.len() {
            return Err(GridError::ArgumentMismatch { expected: self.cells.len(), got: bytes.len() });
        }
        for (cell, &byte) in self.cells.iter_mut().zip(bytes) {
            *cell = (byte as u16) << 8;
        }
        Ok(())
    }

    /// Integrate every point of a built scan into the grid at `pose`,
    /// writing the graded free/hit/beyond profile along each ray via
    /// Bresenham traversal with exponential smoothing.
    ///
    /// Out-of-bounds rays are silently skipped (not an error); a zero
    /// error-gradient ray (`hole_width_mm` too small) fails the whole call.
    pub fn integrate(
        &mut self,
        points: &[CloudPoint],
        pose: Pose,
        quality: u32,
        hole_width_mm: f64,
    ) -> Result<(), GridError> {
        let theta = pose.theta_deg.to_radians();
        let (sintheta, costheta) = theta.sin_cos();
        let scale = self.scale_pixels_per_mm;

        let x1 = roundup(pose.x_mm * scale);
        let y1 = roundup(pose.y_mm * scale);

        for point in points {
            let x2p = costheta * point.x_mm - sintheta * point.y_mm;
            let y2p = sintheta * point.x_mm + costheta * point.y_mm;

            let xp = roundup((pose.x_mm + x2p) * scale);
            let yp = roundup((pose.y_mm + y2p) * scale);

            let dist = (x2p * x2p + y2p * y2p).sqrt();
            let add = if dist > 0.0 { hole_width_mm / 2.0 / dist } else { 0.0 };

            let x2p_ext = x2p * scale * (1.0 + add);
            let y2p_ext = y2p * scale * (1.0 + add);

            let x2 = roundup(pose.x_mm * scale + x2p_ext);
            let y2 = roundup(pose.y_mm * scale + y2p_ext);

            let (value, q) = match point.class {
                ObstacleClass::Obstacle => (OBSTACLE, quality),
                ObstacleClass::NoObstacle => (NO_OBSTACLE, quality / 4),
            };

            self.laser_ray(x1, y1, x2, y2, xp, yp, value as i64, q as i64)?;
        }

        Ok(())
    }

    fn laser_ray(
        &mut self,
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        xp: i64,
        yp: i64,
        value: i64,
        alpha: i64,
    ) -> Result<(), GridError> {
        let size = self.size_pixels as i64;

        if out_of_bounds(x1, size) || out_of_bounds(y1, size) {
            trace!(x1, y1, "ray pose pixel out of bounds, skipping");
            return Ok(());
        }

        let mut x2c = x2;
        let mut y2c = y2;

        if clip(&mut x2c, &mut y2c, x1, y1, size) {
            return Ok(());
        }
        if clip(&mut y2c, &mut x2c, y1, x1, size) {
            return Ok(());
        }

        let mut dx = (x2 - x1).abs();
        let mut dy = (y2 - y1).abs();
        let mut dxc = (x2c - x1).abs();
        let mut dyc = (y2c - y1).abs();
        let mut incptrx = if x2 > x1 { 1 } else { -1 };
        let mut incptry = if y2 > y1 { size } else { -size };
        let sincv: i64 = if value > NO_OBSTACLE as i64 { 1 } else { -1 };

        let derrorv = if dx > dy {
            (xp - x2).abs()
        } else {
            std::mem::swap(&mut dx, &mut dy);
            std::mem::swap(&mut dxc, &mut dyc);
            std::mem::swap(&mut incptrx, &mut incptry);
            (yp - y2).abs()
        };

        if derrorv == 0 {
            return Err(GridError::InsufficientHoleWidth);
        }

        let mut error = 2 * dyc - dxc;
        let horiz = 2 * dyc;
        let diago = 2 * (dyc - dxc);
        let mut errorv = derrorv / 2;

        let incv = (value - NO_OBSTACLE as i64) / derrorv;
        let incerrorv = value - NO_OBSTACLE as i64 - derrorv * incv;

        let mut idx = y1 * size + x1;
        let mut pixval = NO_OBSTACLE as i64;

        let mut x = 0i64;
        while x <= dxc {
            if x > dx - 2 * derrorv {
                if x <= dx - derrorv {
                    pixval += incv;
                    errorv += incerrorv;
                    if errorv > derrorv {
                        pixval += sincv;
                        errorv -= derrorv;
                    }
                } else {
                    pixval -= incv;
                    errorv -= incerrorv;
                    if errorv < 0 {
                        pixval -= sincv;
                        errorv += derrorv;
                    }
                }
            }

            let cell = &mut self.cells[idx as usize];
            let c = *cell as i64;
            let updated = ((256 - alpha) * c + alpha * pixval) >> 8;
            *cell = updated.clamp(0, 65535) as u16;

            if error > 0 {
                idx += incptry;
                error += diago;
            } else {
                error += horiz;
            }
            idx += incptrx;
            x += 1;
        }

        Ok(())
    }
}

fn roundup(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

fn out_of_bounds(value: i64, bound: i64) -> bool {
    value < 0 || value >= bound
}

/// Cohen-Sutherland-style single-axis clip: if `*xyc` is outside
/// `[0, map_size)`, move it to the boundary and adjust the paired
/// cross-axis value `*yxc` by similar triangles. Returns `true` when the
/// whole segment should be dropped (the axis endpoint equals the start,
/// i.e. a degenerate zero-length segment on this axis).
fn clip(xyc: &mut i64, yxc: &mut i64, xy: i64, yx: i64, map_size: i64) -> bool {
    if *xyc < 0 {
        if *xyc == xy {
            return true;
        }
        *yxc += (*yxc - yx) * (-*xyc) / (*xyc - xy);
        *xyc = 0;
    }

    if *xyc >= map_size {
        if *xyc == xy {
            return true;
        }
        *yxc += (*yxc - yx) * (map_size - 1 - *xyc) / (*xyc - xy);
        *xyc = map_size - 1;
    }

    false
}
