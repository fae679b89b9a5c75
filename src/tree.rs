//! The Planner Tree: owns the RRT as an arena of nodes, tracks the
//! best-gain node each round, and carries the best-branch memory and
//! history stack across rounds.

use nalgebra::Vector3;
use zpatial::mazth::line::Line3;

use crate::collaborators::{CellStatus, OccupancyMap, PeerCollision};
use crate::config::Config;
use crate::gain::gain as gain_fn;
use crate::sampler::Sampler;
use crate::spatial_index::SpatialIndex;
use crate::state::State;

/// A committed edge of some agent, used by the peer collision oracle.
/// Backed by the same line-segment representation used elsewhere in this
/// codebase family for segment-vs-obstacle queries.
pub struct Segment {
    pub line: Line3,
}

impl Segment {
    pub fn new(a: Vector3<f64>, b: Vector3<f64>) -> Self {
        Segment {
            line: Line3::init(&[a.x as _, a.y as _, a.z as _], &[b.x as _, b.y as _, b.z as _]),
        }
    }
}

/// One node in the RRT arena.
#[derive(Clone, Debug)]
pub struct Node {
    pub state: State,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub distance: f64,
    pub gain: f64,
}

/// The roster of peer agents this planner tracks committed edges for.
#[derive(Default)]
pub struct PeerRoster {
    /// Agent name (navigation frame) at each slot, parallel to `segments`.
    names: Vec<String>,
    segments: Vec<Vec<Segment>>,
}

impl PeerRoster {
    pub fn new() -> Self {
        PeerRoster::default()
    }

    /// Ensure a named slot exists, returning its index.
    pub fn slot_for(&mut self, name: &str) -> usize {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            return i;
        }
        self.names.push(name.to_string());
        self.segments.push(Vec::new());
        self.names.len() - 1
    }

    /// Clear the segments belonging to `name`, if it has a slot.
    pub fn clear_own_slot(&mut self, name: &str) {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            self.segments[i].clear();
        }
    }

    pub fn push_segment(&mut self, name: &str, seg: Segment) {
        let i = self.slot_for(name);
        self.segments[i].push(seg);
    }

    /// All segments, across every peer, flattened for a collision query.
    pub fn all_segments(&self) -> Vec<&Segment> {
        self.segments.iter().flatten().collect()
    }
}

/// The RRT itself: node arena, spatial index, best-branch memory, and
/// history. One instance per planning agent.
pub struct PlannerTree {
    nodes: Vec<Node>,
    index: SpatialIndex,
    root: Option<usize>,
    best_node: Option<usize>,
    best_gain: f64,
    /// Deepest-to-shallowest states of the previous round's best branch.
    memory: Vec<State>,
    /// LIFO stack of states the best edge was emitted *from*, in previous
    /// rounds.
    history: Vec<State>,
    round: u64,
    iterations_this_round: u64,
    exact_root: Option<State>,
}

impl PlannerTree {
    pub fn new() -> Self {
        PlannerTree {
            nodes: Vec::new(),
            index: SpatialIndex::new(),
            root: None,
            best_node: None,
            best_gain: 0.0,
            memory: Vec::new(),
            history: Vec::new(),
            round: 0,
            iterations_this_round: 0,
            exact_root: None,
        }
    }

    pub fn best_gain(&self) -> f64 {
        self.best_gain
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn iterations_this_round(&self) -> u64 {
        self.iterations_this_round
    }

    fn push_node(&mut self, state: State, parent: Option<usize>, distance: f64, gain: f64) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            state,
            parent,
            children: Vec::new(),
            distance,
            gain,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(idx);
        }
        self.index.insert(state.xyz(), idx);
        idx
    }

    /// Resets the tree to a fresh root and replays the memorized best
    /// branch. `live_pose` is the current vehicle state; `agent_name`
    /// identifies this agent's own slot in `peers`.
    pub fn initialize<O: OccupancyMap + Sync, P: PeerCollision>(
        &mut self,
        config: &Config,
        map: &O,
        peers: &mut PeerRoster,
        peer_collision: &P,
        agent_name: &str,
        live_pose: State,
    ) {
        peers.clear_own_slot(agent_name);

        self.nodes.clear();
        self.index = SpatialIndex::new();
        self.best_node = None;
        self.best_gain = config.zero_gain;

        let root_state = if config.exact_root && self.round > 0 {
            self.exact_root.unwrap_or(live_pose)
        } else {
            live_pose
        };

        let root_idx = self.push_node(root_state, None, 0.0, config.zero_gain);
        self.root = Some(root_idx);
        self.best_node = Some(root_idx);
        self.best_gain = config.zero_gain;

        if self.round <= 0 {
            self.exact_root = Some(root_state);
        }

        // Memory is stored deepest-to-shallowest; replay it shallowest-first
        // (root outward) so each memorized state attaches under its proper
        // predecessor instead of the branch growing in reverse. Re-runs the
        // same collision policy `iterate()` uses; z is forced to the
        // parent's z (planar replay).
        for &memorized in self.memory.clone().iter().rev() {
            let (parent_idx, _d) = match self.index.nearest(memorized.xyz()) {
                Some(r) => r,
                None => continue,
            };
            let parent = self.nodes[parent_idx].clone();

            let mut direction = memorized.xyz() - parent.state.xyz();
            let len = direction.norm();
            if len > config.extension_range {
                direction = direction * (config.extension_range / len);
            }
            let mut candidate_xyz = parent.state.xyz() + direction;
            candidate_xyz.z = parent.state.z;

            if !self.edge_is_valid(config, map, peer_collision, peers, parent.state.xyz(), candidate_xyz, direction) {
                continue;
            }

            let candidate = State::new(candidate_xyz.x, candidate_xyz.y, candidate_xyz.z, memorized.yaw);
            let edge_len = (candidate.xyz() - parent.state.xyz()).norm();
            let distance = parent.distance + edge_len;
            let g = parent.gain + gain_fn(&candidate, config, map, None::<&crate::collaborators::NoMesh>) * (-config.degressive_coeff * distance).exp();

            let idx = self.push_node(candidate, Some(parent_idx), distance, g);
            if g > self.best_gain {
                self.best_gain = g;
                self.best_node = Some(idx);
            }
        }

        self.round += 1;
        self.iterations_this_round = 0;
    }

    fn edge_is_valid<O: OccupancyMap, P: PeerCollision>(
        &self,
        config: &Config,
        map: &O,
        peer_collision: &P,
        peers: &PeerRoster,
        from: Vector3<f64>,
        to: Vector3<f64>,
        direction: Vector3<f64>,
    ) -> bool {
        let len = direction.norm();
        if len <= 0.0 {
            return false;
        }
        let unit = direction / len;
        let overshoot_end = to + unit * config.d_overshoot;

        if map.get_line_status_bounding_box(from, overshoot_end, config.bounding_box) != CellStatus::Free {
            return false;
        }

        let state_a = State::new(from.x, from.y, from.z, 0.0);
        let state_b = State::new(to.x, to.y, to.z, 0.0);
        let flat = peers.all_segments();
        !peer_collision.is_in_collision(&state_a, &state_b, config.bounding_box, &flat)
    }

    /// One sample-and-extend step.
    pub fn iterate<O: OccupancyMap + Sync, P: PeerCollision, R: rand::Rng>(
        &mut self,
        config: &Config,
        map: &O,
        peers: &PeerRoster,
        peer_collision: &P,
        rng: &mut R,
    ) {
        let root_idx = match self.root {
            Some(r) => r,
            None => return,
        };
        if self.index.is_empty() {
            return;
        }

        let new_state = {
            let mut sampler = Sampler::new(config, rng);
            match sampler.sample(self.nodes[root_idx].state.xyz()) {
                Some(s) => s,
                None => return,
            }
        };

        let (parent_idx, _d) = match self.index.nearest(new_state.xyz()) {
            Some(r) => r,
            None => return,
        };
        let parent = self.nodes[parent_idx].clone();

        let mut direction = new_state.xyz() - parent.state.xyz();
        let len = direction.norm();
        if len > config.extension_range {
            direction = direction * (config.extension_range / len);
        }
        let candidate_xyz = parent.state.xyz() + direction;

        if !self.edge_is_valid(config, map, peer_collision, peers, parent.state.xyz(), candidate_xyz, direction) {
            return;
        }

        let yaw = rng.gen_range(-std::f64::consts::PI, std::f64::consts::PI);
        let candidate = State::new(candidate_xyz.x, candidate_xyz.y, candidate_xyz.z, yaw);
        let edge_len = (candidate.xyz() - parent.state.xyz()).norm();
        let distance = parent.distance + edge_len;
        let g = parent.gain + gain_fn(&candidate, config, map, None::<&crate::collaborators::NoMesh>) * (-config.degressive_coeff * distance).exp();

        let idx = self.push_node(candidate, Some(parent_idx), distance, g);
        if g > self.best_gain {
            self.best_gain = g;
            self.best_node = Some(idx);
        }
        self.iterations_this_round += 1;
    }

    /// Walks from `bestNode` to the child of root on its path, pushes the
    /// pre-edge root state onto history, and returns the two endpoints
    /// `(root_state, first_step_state)` for discretization by the caller
    /// (the session owns frame lookups).
    pub fn get_best_edge(&mut self) -> Option<(State, State)> {
        let best = self.best_node?;
        let root = self.root?;
        if best == root {
            return None;
        }

        let mut cur = best;
        loop {
            let parent = self.nodes[cur].parent?;
            if parent == root {
                break;
            }
            cur = parent;
        }
        let first_step = &self.nodes[cur];
        let root_state = self.nodes[root].state;
        let first_step_state = first_step.state;

        self.history.push(root_state);
        self.exact_root = Some(first_step_state);

        Some((root_state, first_step_state))
    }

    /// Walks up from `bestNode`, pushing the current state each step,
    /// while both the current node's parent and that parent's parent
    /// exist — so the walk stops (without pushing) once it reaches root's
    /// direct child, excluding both it and root.
    pub fn memorize_best_branch(&mut self) {
        self.memory.clear();
        let mut cur = match self.best_node {
            Some(b) => b,
            None => return,
        };
        loop {
            let parent = match self.nodes[cur].parent {
                Some(p) => p,
                None => break,
            };
            if self.nodes[parent].parent.is_none() {
                break;
            }
            self.memory.push(self.nodes[cur].state);
            cur = parent;
        }
    }

    /// Pops the most recent history entry. Returns
    /// `(current_root, popped_state)`, or `None` if history is empty.
    pub fn get_path_back_to_previous(&mut self) -> Option<(State, State)> {
        let popped = self.history.pop()?;
        let root = self.root?;
        Some((self.nodes[root].state, popped))
    }

    /// Drops all nodes and resets round bookkeeping.
    pub fn clear(&mut self, config: &Config) {
        self.nodes.clear();
        self.index = SpatialIndex::new();
        self.root = None;
        self.best_node = None;
        self.best_gain = config.zero_gain;
        self.round = 0;
        self.iterations_this_round = 0;
    }

    pub fn root_state(&self) -> Option<State> {
        self.root.map(|r| self.nodes[r].state)
    }

    pub fn best_node_state(&self) -> Option<State> {
        self.best_node.map(|b| self.nodes[b].state)
    }

    /// Per-node rows for the optional per-round tree log:
    /// `(state, gain, parent_state, parent_gain)`.
    pub fn log_rows(&self) -> Vec<(State, f64, Option<(State, f64)>)> {
        self.nodes
            .iter()
            .map(|n| {
                let parent = n.parent.map(|p| (self.nodes[p].state, self.nodes[p].gain));
                (n.state, n.gain, parent)
            })
            .collect()
    }
}

impl Default for PlannerTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CellStatus, PeerCollision};
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
            1.0
        }
    }

    struct OccupiedMap;
    impl OccupancyMap for OccupiedMap {
        fn get_line_status_bounding_box(&self, _p0: Vector3<f64>, _p1: Vector3<f64>, _bbox: Vector3<f64>) -> CellStatus {
            CellStatus::Occupied
        }
        fn get_cell_probability_point(&self, _v: Vector3<f64>) -> (CellStatus, f64) {
            (CellStatus::Unknown, 0.0)
        }
        fn get_visibility(&self, _from: Vector3<f64>, _to: Vector3<f64>, _stop_at_unknown: bool) -> CellStatus {
            CellStatus::Free
        }
        fn get_resolution(&self) -> f64 {
            1.0
        }
    }

    struct NeverCollides;
    impl PeerCollision for NeverCollides {
        fn is_in_collision(&self, _a: &State, _b: &State, _bbox: Vector3<f64>, _segments: &[&Segment]) -> bool {
            false
        }
    }

    fn test_config() -> Config {
        Config {
            cam_bound_normals: vec![vec![]],
            ..Config::default()
        }
    }

    #[test]
    fn empty_workspace_single_iteration_inserts_one_child() {
        let config = test_config();
        let map = FreeMap;
        let peer_collision = NeverCollides;
        let mut peers = PeerRoster::new();
        let mut tree = PlannerTree::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);

        tree.initialize(&config, &map, &mut peers, &peer_collision, "self", State::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(tree.node_count(), 1);

        tree.iterate(&config, &map, &peers, &peer_collision, &mut rng);
        assert_eq!(tree.node_count(), 2);
        assert!(tree.nodes[1].distance <= config.extension_range + 1e-9);
        assert_eq!(tree.best_node, Some(1));
    }

    #[test]
    fn fully_occupied_neighborhood_rejects_every_edge() {
        let config = test_config();
        let map = OccupiedMap;
        let peer_collision = NeverCollides;
        let mut peers = PeerRoster::new();
        let mut tree = PlannerTree::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);

        tree.initialize(&config, &map, &mut peers, &peer_collision, "self", State::new(0.0, 0.0, 0.0, 0.0));
        for _ in 0..1000 {
            tree.iterate(&config, &map, &peers, &peer_collision, &mut rng);
        }
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn clipping_limits_edge_length_to_extension_range() {
        let mut config = test_config();
        config.extension_range = 0.5;
        config.max_x = 100.0;
        config.min_x = -100.0;
        config.max_y = 100.0;
        config.min_y = -100.0;
        let map = FreeMap;
        let peer_collision = NeverCollides;
        let mut peers = PeerRoster::new();
        let mut tree = PlannerTree::new();

        tree.initialize(&config, &map, &mut peers, &peer_collision, "self", State::new(0.0, 0.0, 0.0, 0.0));
        let root_idx = tree.root.unwrap();
        let parent = tree.nodes[root_idx].clone();
        let direction = Vector3::new(5.0, 0.0, 0.0);
        let clipped = direction * (config.extension_range / direction.norm());
        let candidate_xyz = parent.state.xyz() + clipped;
        assert!(tree.edge_is_valid(&config, &map, &peer_collision, &peers, parent.state.xyz(), candidate_xyz, clipped));
        assert!((clipped.norm() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn best_branch_memory_excludes_root_and_its_child() {
        let config = test_config();
        let map = FreeMap;
        let mut tree = PlannerTree::new();
        let root = tree.push_node(State::new(0.0, 0.0, 0.0, 0.0), None, 0.0, 0.0);
        tree.root = Some(root);
        let child = tree.push_node(State::new(1.0, 0.0, 0.0, 0.0), Some(root), 1.0, 1.0);
        let grandchild = tree.push_node(State::new(2.0, 0.0, 0.0, 0.0), Some(child), 2.0, 2.0);
        let great_grandchild = tree.push_node(State::new(3.0, 0.0, 0.0, 0.0), Some(grandchild), 3.0, 3.0);
        tree.best_node = Some(great_grandchild);
        tree.best_gain = 3.0;

        tree.memorize_best_branch();
        assert_eq!(tree.memory.len(), 2);
        assert_eq!(tree.memory[0], tree.nodes[great_grandchild].state);
        assert_eq!(tree.memory[1], tree.nodes[grandchild].state);
        let _ = map;
    }

    #[test]
    fn memorized_branch_replays_into_next_round_before_any_iterate() {
        let config = test_config();
        let map = FreeMap;
        let peer_collision = NeverCollides;
        let mut peers = PeerRoster::new();
        let mut tree = PlannerTree::new();

        let root = tree.push_node(State::new(0.0, 0.0, 0.0, 0.0), None, 0.0, 0.0);
        tree.root = Some(root);
        let child = tree.push_node(State::new(1.0, 0.0, 0.0, 0.0), Some(root), 1.0, 1.0);
        let grandchild = tree.push_node(State::new(2.0, 0.0, 0.0, 0.0), Some(child), 2.0, 2.0);
        let great_grandchild = tree.push_node(State::new(3.0, 0.0, 0.0, 0.0), Some(grandchild), 3.0, 3.0);
        tree.best_node = Some(great_grandchild);
        tree.best_gain = 3.0;
        tree.memorize_best_branch();
        assert_eq!(tree.memory.len(), 2);

        // Round B: initialize() alone (no iterate()) must replay the two
        // memorized states as new nodes off the fresh root.
        tree.initialize(&config, &map, &mut peers, &peer_collision, "self", State::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(tree.node_count(), 3);
        assert!(tree.best_node.is_some());
        assert!(tree.best_gain > config.zero_gain);
    }

    #[test]
    fn history_pops_in_lifo_order() {
        let mut tree = PlannerTree::new();
        let root = tree.push_node(State::new(0.0, 0.0, 0.0, 0.0), None, 0.0, 0.0);
        tree.root = Some(root);
        tree.history.push(State::new(1.0, 0.0, 0.0, 0.0));
        tree.history.push(State::new(2.0, 0.0, 0.0, 0.0));

        let (_, first) = tree.get_path_back_to_previous().unwrap();
        assert_eq!(first, State::new(2.0, 0.0, 0.0, 0.0));
        let (_, second) = tree.get_path_back_to_previous().unwrap();
        assert_eq!(second, State::new(1.0, 0.0, 0.0, 0.0));
        assert!(tree.get_path_back_to_previous().is_none());
    }
}
