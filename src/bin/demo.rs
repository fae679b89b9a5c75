//! A small CLI harness that drives a `Session` against an in-memory dense
//! voxel map, so the planner can be exercised end to end without any of
//! the out-of-scope collaborators (ROS-style transport, a real volumetric
//! map, mesh inspection) wired in. Mirrors the `planner` binary of the
//! codebase family this crate is drawn from: parse flags with `clap`,
//! install `pretty_env_logger`, then loop rounds logging through `log!`.

extern crate pretty_env_logger;

use clap::{App, Arg};
use log::info;
use nalgebra::Vector3;
use rand::SeedableRng;

use nbv_planner::{CellStatus, Config, FrameLookupError, FrameService, Segment, Session, State, Transform};

/// A dense voxel grid covering the workspace AABB, standing in for the
/// real probabilistic occupancy map this crate treats as an external
/// collaborator. Cells start `Unknown`; `sweep` marks cells within
/// `radius` of a pose `Free`, simulating a sensor observation.
struct DenseVoxelMap {
    min: Vector3<f64>,
    dims: [usize; 3],
    resolution: f64,
    cells: Vec<CellStatus>,
}

impl DenseVoxelMap {
    fn new(config: &Config) -> Self {
        let min = Vector3::new(config.min_x, config.min_y, config.min_z);
        let resolution = 1.0;
        let dims = [
            (((config.max_x - config.min_x) / resolution).ceil() as usize).max(1),
            (((config.max_y - config.min_y) / resolution).ceil() as usize).max(1),
            (((config.max_z - config.min_z) / resolution).ceil() as usize).max(1),
        ];
        let cells = vec![CellStatus::Unknown; dims[0] * dims[1] * dims[2]];
        DenseVoxelMap { min, dims, resolution, cells }
    }

    fn index_of(&self, v: Vector3<f64>) -> Option<usize> {
        let rel = (v - self.min) / self.resolution;
        let ix = rel.x.floor();
        let iy = rel.y.floor();
        let iz = rel.z.floor();
        if ix < 0.0 || iy < 0.0 || iz < 0.0 {
            return None;
        }
        let (ix, iy, iz) = (ix as usize, iy as usize, iz as usize);
        if ix >= self.dims[0] || iy >= self.dims[1] || iz >= self.dims[2] {
            return None;
        }
        Some((ix * self.dims[1] + iy) * self.dims[2] + iz)
    }

    fn status_at(&self, v: Vector3<f64>) -> CellStatus {
        match self.index_of(v) {
            Some(i) => self.cells[i],
            None => CellStatus::Occupied,
        }
    }

    /// Mark every cell within `radius` of `center` as `Free`, simulating a
    /// sensor sweep taken along the emitted path.
    fn sweep(&mut self, center: Vector3<f64>, radius: f64) {
        let mut dx = -radius;
        while dx <= radius {
            let mut dy = -radius;
            while dy <= radius {
                let mut dz = -radius;
                while dz <= radius {
                    let v = center + Vector3::new(dx, dy, dz);
                    if let Some(i) = self.index_of(v) {
                        self.cells[i] = CellStatus::Free;
                    }
                    dz += self.resolution;
                }
                dy += self.resolution;
            }
            dx += self.resolution;
        }
    }

    fn march(&self, from: Vector3<f64>, to: Vector3<f64>, stop_at_unknown: bool) -> CellStatus {
        let delta = to - from;
        let len = delta.norm();
        if len <= 0.0 {
            return self.status_at(from);
        }
        let steps = (len / self.resolution).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let p = from + delta * t;
            match self.status_at(p) {
                CellStatus::Occupied => return CellStatus::Occupied,
                CellStatus::Unknown if stop_at_unknown => return CellStatus::Unknown,
                _ => {}
            }
        }
        CellStatus::Free
    }
}

impl nbv_planner::OccupancyMap for DenseVoxelMap {
    fn get_line_status_bounding_box(&self, p0: Vector3<f64>, p1: Vector3<f64>, bbox: Vector3<f64>) -> CellStatus {
        let delta = p1 - p0;
        let len = delta.norm();
        let steps = ((len / self.resolution).ceil().max(1.0)) as usize;
        let half = bbox * 0.5;
        let mut saw_unknown = false;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let center = p0 + delta * t;
            let mut dz = -half.z;
            while dz <= half.z {
                let mut dy = -half.y;
                while dy <= half.y {
                    let mut dx = -half.x;
                    while dx <= half.x {
                        match self.status_at(center + Vector3::new(dx, dy, dz)) {
                            CellStatus::Occupied => return CellStatus::Occupied,
                            CellStatus::Unknown => saw_unknown = true,
                            CellStatus::Free => {}
                        }
                        dx += self.resolution;
                    }
                    dy += self.resolution;
                }
                dz += self.resolution;
            }
        }
        if saw_unknown {
            CellStatus::Unknown
        } else {
            CellStatus::Free
        }
    }

    fn get_cell_probability_point(&self, v: Vector3<f64>) -> (CellStatus, f64) {
        let s = self.status_at(v);
        let p = match s {
            CellStatus::Unknown => 0.5,
            CellStatus::Free => 0.05,
            CellStatus::Occupied => 0.95,
        };
        (s, p)
    }

    fn get_visibility(&self, from: Vector3<f64>, to: Vector3<f64>, stop_at_unknown: bool) -> CellStatus {
        self.march(from, to, stop_at_unknown)
    }

    fn get_resolution(&self) -> f64 {
        self.resolution
    }
}

/// Never reports a collision; a stand-in for a real multi-agent oracle
/// when the demo is run single-agent.
struct NoPeerCollision;
impl nbv_planner::PeerCollision for NoPeerCollision {
    fn is_in_collision(&self, _a: &State, _b: &State, _bbox: Vector3<f64>, _segments: &[&Segment]) -> bool {
        false
    }
}

/// Only knows the identity transform between a frame and itself.
struct IdentityFrames;
impl FrameService for IdentityFrames {
    fn lookup_transform(&self, target: &str, source: &str) -> Result<Transform, FrameLookupError> {
        if target == source {
            Ok(Transform::identity())
        } else {
            Err(FrameLookupError {
                target_frame: target.to_string(),
                source_frame: source.to_string(),
                reason: "demo harness only knows the identity transform".to_string(),
            })
        }
    }
}

fn main() {
    pretty_env_logger::init();

    let matches = App::new("nbv_demo")
        .about("Drives a next-best-view planning session against an in-memory occupancy map")
        .arg(Arg::with_name("rounds").long("rounds").takes_value(true).default_value("5"))
        .arg(Arg::with_name("iterations").long("iterations").takes_value(true).default_value("300"))
        .arg(Arg::with_name("seed").long("seed").takes_value(true).default_value("1"))
        .get_matches();

    let rounds: u32 = matches.value_of("rounds").unwrap().parse().expect("rounds must be an integer");
    let iterations: u32 = matches.value_of("iterations").unwrap().parse().expect("iterations must be an integer");
    let seed: u64 = matches.value_of("seed").unwrap().parse().expect("seed must be an integer");

    let config = Config {
        cam_bound_normals: vec![vec![]], // omnidirectional frustum for the demo
        log: false,
        ..Config::default()
    };

    let mut map = DenseVoxelMap::new(&config);
    let peer_collision = NoPeerCollision;
    let frames = IdentityFrames;
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut session = Session::new(config.clone());

    let mut live_pose = State::new(0.0, 0.0, 0.0, 0.0);
    map.sweep(live_pose.xyz(), 2.0);

    for round in 0..rounds {
        session.initialize(&map, &peer_collision, "self", live_pose);
        for _ in 0..iterations {
            session.iterate(&map, &peer_collision, &mut rng);
        }

        let poses = session.get_best_edge(&config.navigation_frame, &frames);
        session.memorize_best_branch();

        if let Some(last) = poses.last() {
            live_pose = State::new(last.position[0], last.position[1], last.position[2], 0.0);
            map.sweep(live_pose.xyz(), 2.0);
        }

        info!(
            "round {}: best_gain={:.3} nodes={} edge_poses={} coverage={:.1}%",
            round,
            session.tree().best_gain(),
            session.tree().node_count(),
            poses.len(),
            session.coverage(&map),
        );
    }
}
