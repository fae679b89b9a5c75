//! Information-gain evaluation: integrates per-voxel contributions over a
//! cube clipped to the workspace, counting a voxel only if it is inside
//! some camera frustum and not hidden behind nearer occupied space.

use nalgebra::{Rotation3, Vector3};
use rayon::prelude::*;

use crate::collaborators::{CellStatus, Mesh, OccupancyMap};
use crate::config::{Config, Frustum};
use crate::state::State;

const SQRT2: f64 = std::f64::consts::SQRT_2;

fn axis_range(center: f64, half: f64, lo: f64, hi: f64, disc: f64) -> Vec<f64> {
    let start = (center - half).max(lo);
    let end = (center + half).min(hi);
    let mut out = Vec::new();
    if disc <= 0.0 {
        return out;
    }
    let mut v = start;
    while v < end {
        out.push(v);
        v += disc;
    }
    out
}

/// True iff `rel` (a grid point relative to the viewpoint) lies inside at
/// least one camera frustum, after rotating each frustum's inward normals
/// by `yaw` about the z-axis.
pub fn point_in_any_frustum(rel: Vector3<f64>, frusta: &[Frustum], yaw: f64, disc: f64) -> bool {
    let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), yaw);
    let margin = SQRT2 * disc;
    frusta.iter().any(|frustum| {
        frustum.iter().all(|n| {
            let rotated = rot * n;
            let normalized = rotated.normalize();
            rel.dot(&normalized) >= margin
        })
    })
}

/// Information gain of viewing from `state`. `mesh` is optional: when
/// absent, no `ig_area` term is added.
pub fn gain<O: OccupancyMap + Sync, M: Mesh>(
    state: &State,
    config: &Config,
    map: &O,
    mesh: Option<&M>,
) -> f64 {
    let disc = map.get_resolution();
    let origin = state.xyz();
    let range_sq = config.gain_range * config.gain_range;

    let xs = axis_range(state.x, config.gain_range, config.min_x, config.max_x, disc);
    let ys = axis_range(state.y, config.gain_range, config.min_y, config.max_y, disc);
    let zs = axis_range(state.z, config.gain_range, config.min_z, config.max_z, disc);

    let mut grid = Vec::with_capacity(xs.len() * ys.len() * zs.len());
    for &x in &xs {
        for &y in &ys {
            for &z in &zs {
                grid.push(Vector3::new(x, y, z));
            }
        }
    }

    let sum: f64 = grid
        .par_iter()
        .map(|&v| {
            let dir = v - origin;
            if dir.dot(&dir) > range_sq {
                return 0.0;
            }
            if !point_in_any_frustum(dir, &config.cam_bound_normals, state.yaw, disc) {
                return 0.0;
            }
            let (status, _prob) = map.get_cell_probability_point(v);
            if map.get_visibility(origin, v, false) == CellStatus::Occupied {
                return 0.0;
            }
            match status {
                CellStatus::Unknown => config.ig_unmapped,
                CellStatus::Occupied => config.ig_occupied,
                CellStatus::Free => config.ig_free,
            }
        })
        .sum();

    let mut total = sum * disc.powi(3);

    if let Some(m) = mesh {
        total += config.ig_area * m.compute_inspectable_area(state);
    }

    total
}
