//! Planning Loop / Session: the orchestrator an outer caller drives. Wraps
//! a `PlannerTree` and a peer roster, adopts vehicle/peer poses (throttled
//! mesh incorporation and response logging), and exposes the round
//! lifecycle plus the optional on-disk logging.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::PathBuf;

use chrono::{Datelike, Timelike, Utc};
use nalgebra::Vector3;
use rand::Rng;

use crate::collaborators::{CellStatus, FrameService, Mesh, OccupancyMap, PeerCollision};
use crate::config::Config;
use crate::discretize::sample_path;
use crate::instrumentation::Timer;
use crate::state::{Odometry, Pose, State};
use crate::throttle::Throttle;
use crate::tree::{PeerRoster, PlannerTree, Segment};

/// A planning session for one agent: owns the tree, the peer roster, and
/// the throttle cursors for logging and mesh incorporation.
pub struct Session {
    config: Config,
    tree: PlannerTree,
    peers: PeerRoster,
    log_throttle: Throttle,
    inspection_throttle: Throttle,
    log_dir: Option<PathBuf>,
    response_log: Option<File>,
    path_log: Option<File>,
    last_peer_position: HashMap<String, Vector3<f64>>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let log_throttle = Throttle::new(config.log_throttle);
        let inspection_throttle = Throttle::new(config.inspection_throttle);

        let (log_dir, response_log, path_log) = if config.log {
            Self::open_log_files()
        } else {
            (None, None, None)
        };

        Session {
            config,
            tree: PlannerTree::new(),
            peers: PeerRoster::new(),
            log_throttle,
            inspection_throttle,
            log_dir,
            response_log,
            path_log,
            last_peer_position: HashMap::new(),
        }
    }

    fn open_log_files() -> (Option<PathBuf>, Option<File>, Option<File>) {
        let now = Utc::now();
        let dir_name = format!(
            "{}_{}_{}_{}_{}_{}",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second()
        );
        let dir = PathBuf::from(dir_name);
        if let Err(e) = fs::create_dir_all(&dir) {
            log::warn!("could not create log directory {:?}: {}", dir, e);
            return (None, None, None);
        }
        let response = File::create(dir.join("response.txt"))
            .map_err(|e| log::warn!("could not open response.txt: {}", e))
            .ok();
        let path = File::create(dir.join("path.txt"))
            .map_err(|e| log::warn!("could not open path.txt: {}", e))
            .ok();
        (Some(dir), response, path)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tree(&self) -> &PlannerTree {
        &self.tree
    }

    /// Adopts the latest vehicle pose after transforming it into the
    /// planning frame, with throttled response logging and mesh
    /// incorporation.
    pub fn set_state_from_pose<F: FrameService, M: Mesh>(
        &mut self,
        pose: &Pose,
        source_frame: &str,
        frames: &F,
        mesh: Option<&mut M>,
    ) -> Option<State> {
        let transform = match frames.lookup_transform(&self.config.navigation_frame, source_frame) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("set_state_from_pose: {}", e);
                return None;
            }
        };

        let local = State::new(pose.position[0], pose.position[1], pose.position[2], yaw_of(pose));
        let transformed = transform.apply_to_state(&local);
        let state = State::new(
            transformed.position[0],
            transformed.position[1],
            transformed.position[2],
            yaw_of(&transformed),
        );
        if self.log_throttle.ready() {
            if let Some(f) = self.response_log.as_mut() {
                let line = format!("{},{},{},{}\n", state.x, state.y, state.z, state.yaw);
                if let Err(e) = f.write_all(line.as_bytes()) {
                    log::warn!("could not append to response.txt: {}", e);
                }
            }
        }

        if self.inspection_throttle.ready() {
            if let Some(m) = mesh {
                m.set_peer_pose(transformed, 0);
                m.incorporate_view_from_pose(transformed, 0);
            }
        }

        Some(state)
    }

    /// Odometry-flavored counterpart of `set_state_from_pose`: unwraps the
    /// pose and source frame carried by the odometry payload and adopts it
    /// the same way.
    pub fn set_state_from_odometry<F: FrameService, M: Mesh>(
        &mut self,
        odom: &Odometry,
        frames: &F,
        mesh: Option<&mut M>,
    ) -> Option<State> {
        self.set_state_from_pose(&odom.pose, &odom.frame_id, frames, mesh)
    }

    /// Throttled mesh incorporation of a peer's observed view, plus
    /// recording the peer's pose as a committed edge endpoint for
    /// collision bookkeeping.
    pub fn set_peer_state_from_pose<F: FrameService, M: Mesh>(
        &mut self,
        pose: &Pose,
        source_frame: &str,
        peer_name: &str,
        frames: &F,
        mesh: Option<&mut M>,
    ) {
        let transform = match frames.lookup_transform(&self.config.navigation_frame, source_frame) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("set_peer_state_from_pose: {}", e);
                return;
            }
        };
        let local = State::new(pose.position[0], pose.position[1], pose.position[2], yaw_of(pose));
        let transformed = transform.apply_to_state(&local);

        if self.inspection_throttle.ready() {
            if let Some(m) = mesh {
                let slot = self.peers.slot_for(peer_name);
                m.set_peer_pose(transformed, slot + 1);
                m.incorporate_view_from_pose(transformed, slot + 1);
            }
        }

        let pos = Vector3::new(transformed.position[0], transformed.position[1], transformed.position[2]);
        if let Some(&prev) = self.last_peer_position.get(peer_name) {
            self.peers.push_segment(peer_name, Segment::new(prev, pos));
        }
        self.last_peer_position.insert(peer_name.to_string(), pos);
    }

    /// Resets the tree for a new planning round and replays the memorized
    /// best branch from the previous round.
    pub fn initialize<O: OccupancyMap + Sync, P: PeerCollision>(
        &mut self,
        map: &O,
        peer_collision: &P,
        agent_name: &str,
        live_pose: State,
    ) {
        let config = self.config.clone();
        self.tree
            .initialize(&config, map, &mut self.peers, peer_collision, agent_name, live_pose);
    }

    /// Runs one sample-and-extend step of the tree.
    pub fn iterate<O: OccupancyMap + Sync, P: PeerCollision, R: Rng>(&mut self, map: &O, peer_collision: &P, rng: &mut R) {
        let config = self.config.clone();
        let timer = Timer::default();
        self.tree.iterate(&config, map, &self.peers, peer_collision, rng);
        log::trace!(
            "iterate: round {} iteration {} took {:.3}ms, best_gain {:.3}",
            self.tree.round(),
            self.tree.iterations_this_round(),
            timer.dur_ms(),
            self.tree.best_gain()
        );
    }

    /// Extracts the first edge of the best branch, discretized into a
    /// pose sequence in `target_frame`.
    pub fn get_best_edge<F: FrameService>(&mut self, target_frame: &str, frames: &F) -> Vec<Pose> {
        let (root_state, first_step) = match self.tree.get_best_edge() {
            Some(r) => r,
            None => return Vec::new(),
        };
        let poses = sample_path(
            &root_state,
            &first_step,
            target_frame,
            &self.config.navigation_frame,
            self.config.dt,
            self.config.v_max,
            self.config.dyaw_max,
            frames,
        );
        if let Some(f) = self.path_log.as_mut() {
            for p in &poses {
                let line = format!("{},{},{}\n", p.position[0], p.position[1], p.position[2]);
                if let Err(e) = f.write_all(line.as_bytes()) {
                    log::warn!("could not append to path.txt: {}", e);
                }
            }
        }
        poses
    }

    /// Saves the current round's best branch for replay next round.
    pub fn memorize_best_branch(&mut self) {
        self.tree.memorize_best_branch();
    }

    /// Pops the most recent history entry and returns a discretized path
    /// back to it from the current root.
    pub fn get_path_back_to_previous<F: FrameService>(&mut self, target_frame: &str, frames: &F) -> Vec<Pose> {
        let (root_state, previous) = match self.tree.get_path_back_to_previous() {
            Some(r) => r,
            None => return Vec::new(),
        };
        sample_path(
            &root_state,
            &previous,
            target_frame,
            &self.config.navigation_frame,
            self.config.dt,
            self.config.v_max,
            self.config.dyaw_max,
            frames,
        )
    }

    /// Drops the current tree and resets round bookkeeping.
    pub fn clear(&mut self) {
        self.tree.clear(&self.config);
    }

    /// Percent of workspace voxels whose current map status is not
    /// `Unknown`.
    pub fn coverage<O: OccupancyMap>(&self, map: &O) -> f64 {
        let disc = map.get_resolution();
        if disc <= 0.0 {
            return 0.0;
        }
        let mut covered = 0u64;
        let mut uncovered = 0u64;
        let mut x = self.config.min_x;
        while x < self.config.max_x {
            let mut y = self.config.min_y;
            while y < self.config.max_y {
                let mut z = self.config.min_z;
                while z < self.config.max_z {
                    let (status, _p) = map.get_cell_probability_point(Vector3::new(x, y, z));
                    if status == CellStatus::Unknown {
                        uncovered += 1;
                    } else {
                        covered += 1;
                    }
                    z += disc;
                }
                y += disc;
            }
            x += disc;
        }
        let total = covered + uncovered;
        if total == 0 {
            0.0
        } else {
            (covered as f64 / total as f64) * 100.0
        }
    }

    /// Writes the current round's tree as `tree<round>.txt` under the log
    /// directory. A no-op if logging is disabled.
    pub fn log_round_tree(&self) {
        let dir = match &self.log_dir {
            Some(d) => d,
            None => return,
        };
        let path = dir.join(format!("tree{}.txt", self.tree.round()));
        let mut buf = String::new();
        for (state, gain, parent) in self.tree.log_rows() {
            buf.push_str(&format!("{},{},{},{},{}", state.x, state.y, state.z, state.yaw, gain));
            if let Some((p, pg)) = parent {
                buf.push_str(&format!(",{},{},{},{},{}\n", p.x, p.y, p.z, p.yaw, pg));
            } else {
                buf.push('\n');
            }
        }
        if let Err(e) = fs::write(&path, buf) {
            log::warn!("could not write {:?}: {}", path, e);
        }
    }
}

fn yaw_of(p: &Pose) -> f64 {
    p.orientation[2].atan2(p.orientation[3]) * 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FrameLookupError, NoMesh, Transform};
    use rand::SeedableRng;

    struct FreeMap;
    impl OccupancyMap for FreeMap {
        fn get_line_status_bounding_box(&self, _p0: Vector3<f64>, _p1: Vector3<f64>, _bbox: Vector3<f64>) -> CellStatus {
            CellStatus::Free
        }
        fn get_cell_probability_point(&self, _v: Vector3<f64>) -> (CellStatus, f64) {
            (CellStatus::Unknown, 0.0)
        }
        fn get_visibility(&self, _from: Vector3<f64>, _to: Vector3<f64>, _stop_at_unknown: bool) -> CellStatus {
            CellStatus::Free
        }
        fn get_resolution(&self) -> f64 {
            2.0
        }
    }

    struct AllFreeAfterFirstScan;
    impl OccupancyMap for AllFreeAfterFirstScan {
        fn get_line_status_bounding_box(&self, _p0: Vector3<f64>, _p1: Vector3<f64>, _bbox: Vector3<f64>) -> CellStatus {
            CellStatus::Free
        }
        fn get_cell_probability_point(&self, _v: Vector3<f64>) -> (CellStatus, f64) {
            (CellStatus::Free, 1.0)
        }
        fn get_visibility(&self, _from: Vector3<f64>, _to: Vector3<f64>, _stop_at_unknown: bool) -> CellStatus {
            CellStatus::Free
        }
        fn get_resolution(&self) -> f64 {
            2.0
        }
    }

    struct NeverCollides;
    impl PeerCollision for NeverCollides {
        fn is_in_collision(&self, _a: &State, _b: &State, _bbox: Vector3<f64>, _segments: &[&Segment]) -> bool {
            false
        }
    }

    struct IdentityFrames;
    impl FrameService for IdentityFrames {
        fn lookup_transform(&self, _target: &str, _source: &str) -> Result<Transform, FrameLookupError> {
            Ok(Transform::identity())
        }
    }

    fn test_config() -> Config {
        Config {
            cam_bound_normals: vec![vec![]],
            log: false,
            ..Config::default()
        }
    }

    #[test]
    fn coverage_is_nonnegative_and_bounded() {
        let session = Session::new(test_config());
        let map = FreeMap;
        let c = session.coverage(&map);
        assert!(c >= 0.0 && c <= 100.0);
    }

    #[test]
    fn coverage_is_full_when_map_has_no_unknown_cells() {
        let session = Session::new(test_config());
        let map = AllFreeAfterFirstScan;
        let c = session.coverage(&map);
        assert!((c - 100.0).abs() < 1e-9);
    }

    #[test]
    fn coverage_is_nondecreasing_as_cells_transition_from_unknown() {
        use std::cell::Cell;

        struct ScanningMap {
            scanned: Cell<bool>,
        }
        impl OccupancyMap for ScanningMap {
            fn get_line_status_bounding_box(&self, _p0: Vector3<f64>, _p1: Vector3<f64>, _bbox: Vector3<f64>) -> CellStatus {
                CellStatus::Free
            }
            fn get_cell_probability_point(&self, _v: Vector3<f64>) -> (CellStatus, f64) {
                if self.scanned.get() {
                    (CellStatus::Free, 1.0)
                } else {
                    (CellStatus::Unknown, 0.0)
                }
            }
            fn get_visibility(&self, _from: Vector3<f64>, _to: Vector3<f64>, _stop_at_unknown: bool) -> CellStatus {
                CellStatus::Free
            }
            fn get_resolution(&self) -> f64 {
                2.0
            }
        }

        let session = Session::new(test_config());
        let map = ScanningMap { scanned: Cell::new(false) };

        let before = session.coverage(&map);
        map.scanned.set(true);
        let after = session.coverage(&map);

        assert!(after >= before);
        assert!((before - 0.0).abs() < 1e-9);
        assert!((after - 100.0).abs() < 1e-9);
    }

    #[test]
    fn best_edge_then_back_to_previous_round_trips() {
        let config = test_config();
        let mut session = Session::new(config);
        let map = FreeMap;
        let peer_collision = NeverCollides;
        let frames = IdentityFrames;
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);

        session.initialize(&map, &peer_collision, "self", State::new(0.0, 0.0, 0.0, 0.0));
        for _ in 0..20 {
            session.iterate(&map, &peer_collision, &mut rng);
        }
        let edge = session.get_best_edge("world", &frames);
        assert!(!edge.is_empty());

        let back = session.get_path_back_to_previous("world", &frames);
        assert!(!back.is_empty());

        let empty = session.get_path_back_to_previous("world", &frames);
        assert!(empty.is_empty());
    }

    #[test]
    fn set_state_from_pose_adopts_transformed_state() {
        let config = test_config();
        let mut session = Session::new(config);
        let frames = IdentityFrames;
        let pose = Pose::from_state(&State::new(1.0, 2.0, 3.0, 0.0));
        let mut mesh = NoMesh;
        let adopted = session.set_state_from_pose(&pose, "world", &frames, Some(&mut mesh));
        assert!(adopted.is_some());
        let s = adopted.unwrap();
        assert!((s.x - 1.0).abs() < 1e-9);
        assert!((s.y - 2.0).abs() < 1e-9);
        assert!((s.z - 3.0).abs() < 1e-9);
    }

    #[test]
    fn set_state_from_odometry_adopts_transformed_state() {
        let config = test_config();
        let mut session = Session::new(config);
        let frames = IdentityFrames;
        let odom = Odometry {
            pose: Pose::from_state(&State::new(1.0, 2.0, 3.0, 0.0)),
            frame_id: "world".to_string(),
        };
        let mut mesh = NoMesh;
        let adopted = session.set_state_from_odometry(&odom, &frames, Some(&mut mesh));
        assert!(adopted.is_some());
        let s = adopted.unwrap();
        assert!((s.x - 1.0).abs() < 1e-9);
        assert!((s.y - 2.0).abs() < 1e-9);
        assert!((s.z - 3.0).abs() < 1e-9);
    }
}
