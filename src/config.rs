//! Planner configuration. A plain, serializable struct; the core never
//! reads environment variables, CLI flags, or files on its own — loading
//! one of these from whatever source a deployment prefers is the
//! orchestrator's job.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A single camera frustum, given as its inward-facing bound normals in
/// body frame. A grid point is inside this frustum iff it is on the
/// inward side of every one of these normals (see `gain::point_in_frustum`).
pub type Frustum = Vec<Vector3<f64>>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    // Workspace AABB.
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: f64,
    pub max_z: f64,

    /// If true, samples are never rejected for leaving the workspace AABB.
    pub soft_bounds: bool,

    /// Robot footprint used for swept-volume collision checks, (bx, by, bz).
    pub bounding_box: Vector3<f64>,

    /// Maximum length of a newly extended edge.
    pub extension_range: f64,

    /// Extra length past the candidate endpoint that must also be
    /// collision-free before an edge is accepted.
    pub d_overshoot: f64,

    /// Half-side of the cube around a pose over which gain is integrated.
    pub gain_range: f64,

    pub ig_unmapped: f64,
    pub ig_occupied: f64,
    pub ig_free: f64,
    pub ig_area: f64,

    /// One entry per camera frustum.
    pub cam_bound_normals: Vec<Frustum>,

    /// Exponential discount (lambda) applied to per-node gain by
    /// cumulative distance from root.
    pub degressive_coeff: f64,

    /// Gain assigned to the root of a fresh tree.
    pub zero_gain: f64,

    /// Vertical sampling half-range in meters; see design notes on the
    /// z-sampling asymmetry. Default 2.0.
    pub z_sample_range: f64,

    /// Step size and velocity limits used when discretizing an emitted edge.
    pub dt: f64,
    pub v_max: f64,
    pub dyaw_max: f64,

    /// If true, use the last committed exact root after the first round
    /// instead of always re-reading the live vehicle pose.
    pub exact_root: bool,

    /// Seconds between throttled log/mesh-incorporation updates.
    pub log_throttle: f64,
    pub inspection_throttle: f64,

    /// Enables on-disk logging of responses, paths, and per-round trees.
    pub log: bool,

    /// Optional cap on sampler retries; `None` means unbounded.
    pub max_sample_retries: Option<u32>,

    /// Name of the planning/navigation frame this agent publishes under;
    /// used to locate this agent's own slot in the peer roster.
    pub navigation_frame: String,
}

impl Config {
    /// Radius of the sampling sphere: the diagonal of the workspace AABB.
    pub fn sample_radius(&self) -> f64 {
        let dx = self.max_x - self.min_x;
        let dy = self.max_y - self.min_y;
        let dz = self.max_z - self.min_z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn from_json(s: &str) -> serde_json::Result<Config> {
        serde_json::from_str(s)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_x: -10.0,
            max_x: 10.0,
            min_y: -10.0,
            max_y: 10.0,
            min_z: -10.0,
            max_z: 10.0,
            soft_bounds: false,
            bounding_box: Vector3::new(0.5, 0.5, 0.3),
            extension_range: 1.0,
            d_overshoot: 0.5,
            gain_range: 3.0,
            ig_unmapped: 1.0,
            ig_occupied: 0.3,
            ig_free: 0.0,
            ig_area: 1.0,
            cam_bound_normals: Vec::new(),
            degressive_coeff: 0.1,
            zero_gain: 0.0,
            z_sample_range: 2.0,
            dt: 0.1,
            v_max: 1.0,
            dyaw_max: 1.0,
            exact_root: true,
            log_throttle: 0.5,
            inspection_throttle: 0.5,
            log: false,
            max_sample_retries: None,
            navigation_frame: "world".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_radius_matches_diagonal() {
        let c = Config::default();
        let expected = ((20.0f64).powi(2) * 3.0).sqrt();
        assert!((c.sample_radius() - expected).abs() < 1e-9);
    }

    #[test]
    fn round_trips_through_json() {
        let c = Config::default();
        let s = serde_json::to_string(&c).unwrap();
        let c2 = Config::from_json(&s).unwrap();
        assert_eq!(c2.min_x, c.min_x);
        assert_eq!(c2.navigation_frame, c.navigation_frame);
    }
}
