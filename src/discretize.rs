//! Path discretization: turns a single tree edge into a sequence of
//! velocity-limited poses in a caller-requested frame.

use crate::collaborators::{FrameService, Transform};
use crate::state::{wrap_to_pi, Pose, State};

/// Interpolate from `start` to `end` at `dt`-spaced steps bounded by
/// `v_max`/`dyaw_max`, transforming each interpolated state into
/// `target_frame` via `frames`.
///
/// Returns an empty sequence if the frame lookup fails; this is the one
/// recoverable failure mode here and is logged at `warn!`.
///
/// Panics if `start` and `end` coincide in both position and yaw — an
/// all-zero edge is a caller error, not a recoverable condition.
pub fn sample_path<F: FrameService>(
    start: &State,
    end: &State,
    target_frame: &str,
    planning_frame: &str,
    dt: f64,
    v_max: f64,
    dyaw_max: f64,
    frames: &F,
) -> Vec<Pose> {
    let transform = match frames.lookup_transform(target_frame, planning_frame) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("sample_path: {}", e);
            return Vec::new();
        }
    };

    emit(start, end, dt, v_max, dyaw_max, &transform)
}

fn emit(start: &State, end: &State, dt: f64, v_max: f64, dyaw_max: f64, transform: &Transform) -> Vec<Pose> {
    let delta = end.xyz() - start.xyz();
    let yaw_direction = wrap_to_pi(end.yaw - start.yaw);

    let disc_lin = dt * v_max / delta.norm();
    let disc_yaw = dt * dyaw_max / yaw_direction.abs();
    let disc = disc_lin.min(disc_yaw);

    assert!(
        disc.is_finite() && disc > 0.0,
        "sample_path called on a zero-length edge (no translation and no rotation)"
    );

    let mut ret = Vec::new();
    let mut it = 0.0f64;
    while it <= 1.0 {
        let pos = start.xyz() * (1.0 - it) + end.xyz() * it;
        let yaw = wrap_to_pi(start.yaw + yaw_direction * it);
        let interpolated = State::new(pos.x, pos.y, pos.z, yaw);
        ret.push(transform.apply_to_state(&interpolated));
        it += disc;
    }
    ret
}
