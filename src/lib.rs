//! A sampling-based next-best-view exploration planner: grows an RRT
//! rooted at the current vehicle pose, scores candidate viewpoints by
//! information gain against a probabilistic occupancy map, and returns
//! the first edge of the highest-gain branch as the next motion segment.
//!
//! The occupancy map, inspection mesh, multi-agent collision oracle, and
//! frame-transform service are external collaborators: this crate only
//! specifies the query surface it needs from each (see `collaborators`).

pub mod collaborators;
pub mod config;
pub mod discretize;
pub mod gain;
pub mod instrumentation;
pub mod sampler;
pub mod session;
pub mod spatial_index;
pub mod state;
pub mod throttle;
pub mod tree;

pub use collaborators::{CellStatus, FrameLookupError, FrameService, Mesh, NoMesh, OccupancyMap, PeerCollision, Transform};
pub use config::Config;
pub use session::Session;
pub use state::{Odometry, Pose, State};
pub use tree::{PeerRoster, PlannerTree, Segment};
