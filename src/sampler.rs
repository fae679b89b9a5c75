//! Candidate state sampling: draws points uniformly over a sphere envelope
//! sized to the workspace diagonal (with a fixed, non-scaled vertical
//! half-range — see the design notes on the z-sampling asymmetry),
//! rejecting samples that would leave the workspace AABB unless
//! `soft_bounds` is set.

use nalgebra::Vector3;
use rand::Rng;

use crate::config::Config;
use crate::state::State;

pub struct Sampler<'a, 'b, R: Rng> {
    config: &'a Config,
    rng: &'b mut R,
}

impl<'a, 'b, R: Rng> Sampler<'a, 'b, R> {
    pub fn new(config: &'a Config, rng: &'b mut R) -> Self {
        Sampler { config, rng }
    }

    /// Draw one candidate `(x, y, z)` offset from `root`, respecting the
    /// sphere envelope and (unless soft) the workspace AABB. Yaw is left
    /// at 0.0; it is attached only after a successful collision check, so
    /// callers should ignore it until then.
    ///
    /// Returns `None` if `max_sample_retries` is set and exhausted.
    pub fn sample(&mut self, root: Vector3<f64>) -> Option<State> {
        let radius = self.config.sample_radius();
        let mut attempts: u32 = 0;
        loop {
            if let Some(max) = self.config.max_sample_retries {
                if attempts >= max {
                    return None;
                }
            }
            attempts += 1;

            let ux = self.rng.gen_range(-radius, radius);
            let uy = self.rng.gen_range(-radius, radius);
            let uz = self.rng.gen_range(-self.config.z_sample_range, self.config.z_sample_range);

            if ux * ux + uy * uy + uz * uz > radius * radius {
                continue;
            }

            let cand = root + Vector3::new(ux, uy, uz);

            if !self.config.soft_bounds && !self.within_bounds(cand) {
                continue;
            }

            return Some(State::new(cand.x, cand.y, cand.z, 0.0));
        }
    }

    fn within_bounds(&self, cand: Vector3<f64>) -> bool {
        let bb = self.config.bounding_box;
        cand.x >= self.config.min_x + 0.5 * bb.x
            && cand.x <= self.config.max_x - 0.5 * bb.x
            && cand.y >= self.config.min_y + 0.5 * bb.y
            && cand.y <= self.config.max_y - 0.5 * bb.y
            && cand.z >= self.config.min_z + 0.5 * bb.z
            && cand.z <= self.config.max_z - 0.5 * bb.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn cfg() -> Config {
        Config {
            min_x: -10.0,
            max_x: 10.0,
            min_y: -10.0,
            max_y: 10.0,
            min_z: -10.0,
            max_z: 10.0,
            ..Config::default()
        }
    }

    #[test]
    fn samples_stay_within_workspace_when_hard_bounded() {
        let c = cfg();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let mut sampler = Sampler::new(&c, &mut rng);
        for _ in 0..500 {
            let s = sampler.sample(Vector3::new(0.0, 0.0, 0.0)).unwrap();
            assert!(s.x >= c.min_x + 0.25 && s.x <= c.max_x - 0.25);
            assert!(s.y >= c.min_y + 0.25 && s.y <= c.max_y - 0.25);
            assert!(s.z >= c.min_z + 0.15 && s.z <= c.max_z - 0.15);
        }
    }

    #[test]
    fn samples_stay_within_sphere_envelope() {
        let c = cfg();
        let radius = c.sample_radius();
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);
        let mut sampler = Sampler::new(&c, &mut rng);
        for _ in 0..500 {
            let s = sampler.sample(Vector3::new(0.0, 0.0, 0.0)).unwrap();
            assert!(s.xyz().norm() <= radius + 1e-9);
        }
    }

    #[test]
    fn soft_bounds_disable_aabb_rejection() {
        let mut c = cfg();
        c.soft_bounds = true;
        // An absurdly tight bound that would make hard rejection spin
        // forever; soft bounds must still terminate quickly.
        c.bounding_box = Vector3::new(100.0, 100.0, 100.0);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let mut sampler = Sampler::new(&c, &mut rng);
        assert!(sampler.sample(Vector3::new(0.0, 0.0, 0.0)).is_some());
    }

    #[test]
    fn retry_budget_exhausts_to_none() {
        let mut c = cfg();
        c.bounding_box = Vector3::new(1000.0, 1000.0, 1000.0);
        c.max_sample_retries = Some(10);
        let mut rng = rand::rngs::StdRng::seed_from_u64(4);
        let mut sampler = Sampler::new(&c, &mut rng);
        assert!(sampler.sample(Vector3::new(0.0, 0.0, 0.0)).is_none());
    }
}
