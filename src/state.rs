//! Planning-frame state representation and the small set of geometric
//! helpers (wrapping, interpolation) the rest of the crate builds on.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Wrap an angle in radians into `(-pi, pi]`.
pub fn wrap_to_pi(mut a: f64) -> f64 {
    use std::f64::consts::PI;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// A pose in the planning frame: position plus yaw about the z-axis.
///
/// Position is in meters, yaw in radians in `(-pi, pi]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
}

impl State {
    pub fn new(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        State { x, y, z, yaw }
    }

    pub fn xyz(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn point(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }

    pub fn with_xyz(&self, xyz: Vector3<f64>) -> Self {
        State {
            x: xyz.x,
            y: xyz.y,
            z: xyz.z,
            yaw: self.yaw,
        }
    }

    pub fn with_yaw(&self, yaw: f64) -> Self {
        State { yaw: wrap_to_pi(yaw), ..*self }
    }

    /// Euclidean distance between the xyz components of two states.
    pub fn distance_xyz(&self, other: &State) -> f64 {
        (self.xyz() - other.xyz()).norm()
    }
}

/// A `Pose` is the output-facing counterpart of `State`: position and
/// orientation expressed as a unit quaternion about z, ready to be
/// transformed by a `FrameService` into whatever frame the caller wants.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f64; 3],
    /// Quaternion (x, y, z, w), representing a pure yaw rotation.
    pub orientation: [f64; 4],
}

impl Pose {
    pub fn from_state(s: &State) -> Self {
        let half = s.yaw * 0.5;
        Pose {
            position: [s.x, s.y, s.z],
            orientation: [0.0, 0.0, half.sin(), half.cos()],
        }
    }
}

/// A vehicle odometry reading: a `Pose` together with the frame it was
/// expressed in. Mirrors the pairing of pose and source frame carried by a
/// telemetry odometry message, kept separate from `Pose` since an
/// odometry reading also carries twist/covariance fields upstream that
/// this crate never consults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub pose: Pose,
    pub frame_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_to_pi_boundaries() {
        use std::f64::consts::PI;
        assert!((wrap_to_pi(PI) - PI).abs() < 1e-12);
        assert!((wrap_to_pi(-PI) - PI).abs() < 1e-12);
        assert!((wrap_to_pi(3.0 * PI) - PI).abs() < 1e-9);
        assert!((wrap_to_pi(0.0)).abs() < 1e-12);
    }

    #[test]
    fn distance_ignores_yaw() {
        let a = State::new(0.0, 0.0, 0.0, 0.0);
        let b = State::new(3.0, 4.0, 0.0, 1.0);
        assert!((a.distance_xyz(&b) - 5.0).abs() < 1e-12);
    }
}
