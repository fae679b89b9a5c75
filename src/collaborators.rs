//! Interfaces for the external collaborators the planner consults but does
//! not own: the occupancy map, the inspection mesh, the multi-agent
//! collision oracle, and the frame-transform service. Concrete
//! implementations live outside this crate; only the query surface is
//! specified here. The planner treats these as read-only services on its
//! own thread.

use nalgebra::Vector3;

use crate::state::{Pose, State};

/// Classification of a single occupancy cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellStatus {
    Unknown,
    Occupied,
    Free,
}

/// The probabilistic volumetric map. Only the query surface the planner
/// needs is exposed; how cells are stored, fused, or raytraced is the
/// collaborator's business.
pub trait OccupancyMap {
    /// Status of the swept axis-aligned box of size `bbox` translated
    /// from `p0` to `p1`. `Free` means every touched cell is `Free`.
    fn get_line_status_bounding_box(
        &self,
        p0: Vector3<f64>,
        p1: Vector3<f64>,
        bbox: Vector3<f64>,
    ) -> CellStatus;

    /// Status and occupancy probability of a single point.
    fn get_cell_probability_point(&self, v: Vector3<f64>) -> (CellStatus, f64);

    /// Ray cast from `from` to `to`. `stop_at_unknown` controls whether the
    /// cast halts upon entering unknown space; the planner always calls
    /// this with `false`.
    fn get_visibility(&self, from: Vector3<f64>, to: Vector3<f64>, stop_at_unknown: bool) -> CellStatus;

    /// Voxel edge length, used both as the gain-evaluation discretization
    /// step and the coverage-scan step.
    fn get_resolution(&self) -> f64;
}

/// The triangulated mesh of inspection targets. Incorporation of observed
/// views and area bookkeeping is entirely the mesh's concern; the planner
/// only feeds it poses and reads back a scalar inspectable-area estimate.
pub trait Mesh {
    fn set_peer_pose(&mut self, pose: Pose, peer_index: usize);
    fn incorporate_view_from_pose(&mut self, pose: Pose, peer_index: usize);
    /// Inspectable surface area visible from `state`, used as an additive
    /// gain term weighted by `igArea`.
    fn compute_inspectable_area(&self, state: &State) -> f64;
}

/// A `Mesh` that incorporates nothing and reports no inspectable area.
/// Used where a caller has no mesh collaborator wired in, so the gain
/// evaluator's optional area term is simply skipped.
pub struct NoMesh;

impl Mesh for NoMesh {
    fn set_peer_pose(&mut self, _pose: Pose, _peer_index: usize) {}
    fn incorporate_view_from_pose(&mut self, _pose: Pose, _peer_index: usize) {}
    fn compute_inspectable_area(&self, _state: &State) -> f64 {
        0.0
    }
}

/// Oracle answering whether a candidate edge of this agent collides with
/// recently committed edges of other agents.
pub trait PeerCollision {
    fn is_in_collision(
        &self,
        state_a: &State,
        state_b: &State,
        bbox: Vector3<f64>,
        segments: &[&crate::tree::Segment],
    ) -> bool;
}

/// A rigid transform between two named frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f64>,
    /// Quaternion (x, y, z, w).
    pub rotation: [f64; 4],
}

impl Transform {
    pub fn identity() -> Self {
        Transform {
            translation: Vector3::zeros(),
            rotation: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Apply this transform to a pose already expressed in the source
    /// frame, yielding its representation in the target frame. Only yaw
    /// (rotation about z) is composed, matching the planar state space
    /// the rest of the crate works with.
    pub fn apply_to_state(&self, s: &State) -> Pose {
        let p = s.xyz() + self.translation;
        let (qx, qy, qz, qw) = (self.rotation[0], self.rotation[1], self.rotation[2], self.rotation[3]);
        let transform_yaw = qz.atan2(qw) * 2.0;
        let _ = (qx, qy); // planar transforms carry no roll/pitch component
        let yaw = crate::state::wrap_to_pi(s.yaw + transform_yaw);
        Pose::from_state(&State::new(p.x, p.y, p.z, yaw))
    }
}

/// Error returned by a failed frame lookup. Recoverable: callers abort the
/// operation that needed the transform and log a warning.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameLookupError {
    pub target_frame: String,
    pub source_frame: String,
    pub reason: String,
}

impl std::fmt::Display for FrameLookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "could not look up transform {} -> {}: {}",
            self.source_frame, self.target_frame, self.reason
        )
    }
}

impl std::error::Error for FrameLookupError {}

/// The frame-transform service: brings poses into the planning frame and
/// emits paths in whatever frame an orchestrator requests.
pub trait FrameService {
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
    ) -> Result<Transform, FrameLookupError>;
}
