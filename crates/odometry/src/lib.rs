//! Differential-drive wheel odometry.
//!
//! Turns successive wheel-angle samples into the velocity-like
//! [`PoseChange`] the SLAM core consumes. Deliberately standalone: no
//! crate in the SLAM core depends on this one, it only produces the value
//! the core's `update` contract expects on the other end.

use slam_types::PoseChange;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum OdometryError {
    #[error("sample time {t} did not advance past the previous sample time {last_t}")]
    NonMonotonicTime { t: f64, last_t: f64 },
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    t_s: f64,
    theta_l_rad: f64,
    theta_r_rad: f64,
}

/// Converts successive `(t, theta_left, theta_right)` wheel-angle samples
/// into [`PoseChange`]s.
///
/// `wheel_radius_mm` is the driven wheel radius; `half_axle_mm` is half
/// the distance between the left and right wheel contact points. Both are
/// fixed at construction and never change.
#[derive(Debug, Clone)]
pub struct WheelOdometry {
    wheel_radius_mm: f64,
    half_axle_mm: f64,
    last: Option<Sample>,
}

impl WheelOdometry {
    pub fn new(wheel_radius_mm: f64, half_axle_mm: f64) -> Self {
        Self { wheel_radius_mm, half_axle_mm, last: None }
    }

    /// Feed a new wheel-angle sample (radians, monotonically increasing
    /// time in seconds). Returns `Ok(None)` for the first sample fed (no
    /// prior sample to difference against), `Ok(Some(pose_change))` for
    /// every subsequent one.
    pub fn update(
        &mut self,
        t_s: f64,
        theta_l_rad: f64,
        theta_r_rad: f64,
    ) -> Result<Option<PoseChange>, OdometryError> {
        let sample = Sample { t_s, theta_l_rad, theta_r_rad };

        let Some(last) = self.last.replace(sample) else {
            return Ok(None);
        };

        let dt_s = t_s - last.t_s;
        if dt_s <= 0.0 {
            return Err(OdometryError::NonMonotonicTime { t: t_s, last_t: last.t_s });
        }

        let dtheta_l = theta_l_rad - last.theta_l_rad;
        let dtheta_r = theta_r_rad - last.theta_r_rad;

        let dxy_mm = self.wheel_radius_mm * (dtheta_l + dtheta_r);
        let dtheta_rad = (self.wheel_radius_mm / self.half_axle_mm) * (dtheta_r - dtheta_l);

        let pose_change = PoseChange {
            dxy_mm_per_s: dxy_mm / dt_s,
            dtheta_deg_per_s: dtheta_rad.to_degrees() / dt_s,
            dt_s,
        };

        trace!(
            dxy_mm_per_s = pose_change.dxy_mm_per_s,
            dtheta_deg_per_s = pose_change.dtheta_deg_per_s,
            dt_s,
            "wheel odometry sample"
        );

        Ok(Some(pose_change))
    }
}
