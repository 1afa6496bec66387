use crate::{NEIGHBOR_OFFSETS, NEIGHBOR6_OFFSETS, Topology, TopologyError, neighbor26_offsets};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Which neighbors receive a share during diffusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffusionKernel {
    /// All surrounding patches (8 in the plane, 26 in a volume).
    Neighbors,
    /// Face-sharing patches only (4 in the plane, 6 in a volume).
    Neighbors4,
}

impl DiffusionKernel {
    fn offsets(self, volumetric: bool) -> Vec<(i32, i32, i32)> {
        match (self, volumetric) {
            (DiffusionKernel::Neighbors, false) => NEIGHBOR_OFFSETS.to_vec(),
            (DiffusionKernel::Neighbors4, false) => NEIGHBOR_OFFSETS[..4].to_vec(),
            (DiffusionKernel::Neighbors, true) => neighbor26_offsets(),
            (DiffusionKernel::Neighbors4, true) => NEIGHBOR6_OFFSETS.to_vec(),
        }
    }
}

impl Topology {
    /// Diffuses `values` (one entry per patch, indexed by patch id) in place.
    ///
    /// Every patch hands `rate / k` of its value to each of the `k` kernel
    /// neighbors that exist and keeps the rest. Shares aimed past a
    /// non-wrapping edge stay home, so the total is conserved on every shape.
    /// All contributions are read from the old values into `scratch` before any
    /// value is written, and only patches whose value changed are rewritten.
    /// Returns the number of rewritten patches.
    pub fn diffuse(
        &self,
        values: &mut [f64],
        scratch: &mut Vec<f64>,
        rate: f64,
        kernel: DiffusionKernel,
    ) -> Result<usize, TopologyError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(TopologyError::InvalidConfig(
                "diffusion rate must be within [0, 1]",
            ));
        }
        let count = self.bounds().patch_count();
        if values.len() != count {
            return Err(TopologyError::InvalidConfig(
                "diffusion buffer length must match the patch count",
            ));
        }
        let offsets = kernel.offsets(self.is_3d());
        let share = rate / offsets.len() as f64;
        let row_len = self.bounds().width() as usize;

        scratch.clear();
        scratch.resize(count, 0.0);
        let source: &[f64] = values;
        scratch
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(row, out)| {
                for (column, cell) in out.iter_mut().enumerate() {
                    let index = row * row_len + column;
                    let coord = self.coord_unchecked(index);
                    let own = source[index];
                    let mut next = own;
                    for &(dx, dy, dz) in &offsets {
                        if let Some(neighbor) = self.patch_at_offset(coord, dx, dy, dz) {
                            next -= own * share;
                            next += source[self.index_unchecked(neighbor)] * share;
                        }
                    }
                    *cell = next;
                }
            });

        let mut changed = 0;
        for (value, &next) in values.iter_mut().zip(scratch.iter()) {
            if *value != next {
                *value = next;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use crate::{DiffusionKernel, PatchCoord, Topology, TopologyError, WorldBounds};

    fn seeded_values(count: usize) -> Vec<f64> {
        (0..count).map(|i| ((i * 37) % 11) as f64 * 1.25).collect()
    }

    fn assert_conserved(topology: &Topology, kernel: DiffusionKernel, rate: f64) {
        let mut values = seeded_values(topology.bounds().patch_count());
        let before: f64 = values.iter().sum();
        let mut scratch = Vec::new();
        topology
            .diffuse(&mut values, &mut scratch, rate, kernel)
            .expect("diffuse");
        let after: f64 = values.iter().sum();
        assert!(
            (before - after).abs() < 1e-9,
            "{:?} {kernel:?} rate {rate}: {before} -> {after}",
            topology.kind()
        );
    }

    #[test]
    fn diffusion_conserves_total_on_every_shape() {
        let bounds = WorldBounds::new(-3, 4, -2, 2);
        for (wrap_x, wrap_y) in [(true, true), (true, false), (false, true), (false, false)] {
            let topology = Topology::new(bounds, wrap_x, wrap_y).expect("topology");
            for rate in [0.0, 0.25, 0.5, 1.0] {
                assert_conserved(&topology, DiffusionKernel::Neighbors, rate);
                assert_conserved(&topology, DiffusionKernel::Neighbors4, rate);
            }
        }
        let volume =
            Topology::new(WorldBounds::new_3d(-2, 2, -1, 1, -1, 2), true, true).expect("3d");
        assert_conserved(&volume, DiffusionKernel::Neighbors, 0.6);
        assert_conserved(&volume, DiffusionKernel::Neighbors4, 0.6);
    }

    #[test]
    fn torus_diffusion_mixes_toward_the_neighbor_mean() {
        let topology = Topology::new(WorldBounds::new(-2, 2, -2, 2), true, true).expect("topology");
        let mut values = vec![0.0; 25];
        let centre = topology.patch_index(PatchCoord::new(0, 0)).expect("centre");
        values[centre] = 8.0;
        let mut scratch = Vec::new();
        let changed = topology
            .diffuse(&mut values, &mut scratch, 0.5, DiffusionKernel::Neighbors)
            .expect("diffuse");
        assert_eq!(changed, 9);
        assert!((values[centre] - 4.0).abs() < 1e-12);
        for neighbor in topology.neighbors(PatchCoord::new(0, 0)) {
            let index = topology.patch_index(neighbor).expect("neighbor");
            assert!((values[index] - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn box_corner_keeps_undelivered_shares() {
        let topology = Topology::new(WorldBounds::new(-2, 2, -2, 2), false, false).expect("box");
        let mut values = vec![0.0; 25];
        let corner = topology.patch_index(PatchCoord::new(2, 2)).expect("corner");
        values[corner] = 8.0;
        let mut scratch = Vec::new();
        topology
            .diffuse(&mut values, &mut scratch, 1.0, DiffusionKernel::Neighbors)
            .expect("diffuse");
        assert!((values[corner] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn diffusion_rejects_bad_input() {
        let topology = Topology::new(WorldBounds::new(-1, 1, -1, 1), true, true).expect("topology");
        let mut scratch = Vec::new();
        let mut values = vec![1.0; 9];
        assert!(matches!(
            topology.diffuse(&mut values, &mut scratch, 1.5, DiffusionKernel::Neighbors),
            Err(TopologyError::InvalidConfig(_))
        ));
        let mut short = vec![1.0; 4];
        assert!(
            topology
                .diffuse(&mut short, &mut scratch, 0.5, DiffusionKernel::Neighbors)
                .is_err()
        );
    }
}
