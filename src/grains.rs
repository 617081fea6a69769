//! Per-grain records built once from the grid scan.

use serde::Serialize;

use crate::error::{Result, TexError};
use crate::graph::NeighborGraph;
use crate::orientation::{Euler, Quat};
use crate::voxel_grid::VoxelGrid;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Grain {
    pub id: usize,
    pub phase: usize,
    /// Voxel count times voxel volume.
    pub volume: f64,
    pub surface: bool,
    pub orientation: Quat,
    pub euler: Euler,
    /// ODF bin the current orientation was drawn from; `None` until assigned.
    pub odf_bin: Option<usize>,
}

/// Grains indexed by id; slot 0 is the null grain.
#[derive(Clone, Debug, Serialize)]
pub struct GrainTable {
    grains: Vec<Grain>,
}

impl GrainTable {
    /// `phases[g]` is the phase of grain `g`; `phases[0]` is ignored and a
    /// phase of 0 leaves the grain out of every phase.
    pub fn new(grid: &VoxelGrid, graph: &NeighborGraph, phases: &[usize]) -> Result<Self> {
        let n = graph.num_grains();
        if phases.len() != n + 1 {
            return Err(TexError::MissingPrerequisite(format!(
                "phase array has {} entries, {n} grains need {}",
                phases.len(),
                n + 1
            )));
        }
        if graph.boundary_cells().len() != grid.npoints() {
            return Err(TexError::missing_prerequisite(
                "neighbor graph was built from a different grid",
            ));
        }
        let voxel_volume = grid.voxel_volume();
        let grains = (0..=n)
            .map(|g| Grain {
                id: g,
                phase: if g == 0 { 0 } else { phases[g] },
                volume: graph.voxel_count(g) as f64 * voxel_volume,
                surface: graph.is_surface_grain(g),
                orientation: Quat::identity(),
                euler: Euler::default(),
                odf_bin: None,
            })
            .collect();
        Ok(Self { grains })
    }

    pub fn num_grains(&self) -> usize {
        self.grains.len().saturating_sub(1)
    }

    pub fn get(&self, id: usize) -> Option<&Grain> {
        self.grains.get(id).filter(|g| g.id != 0)
    }

    pub(crate) fn grain(&self, id: usize) -> &Grain {
        &self.grains[id]
    }

    pub(crate) fn grain_mut(&mut self, id: usize) -> &mut Grain {
        &mut self.grains[id]
    }

    /// Real grains, in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Grain> {
        self.grains.iter().skip(1)
    }

    /// Ids of the grains in `phase`.
    pub fn phase_members(&self, phase: usize) -> Vec<usize> {
        self.iter().filter(|g| g.phase == phase).map(|g| g.id).collect()
    }

    /// Volume of the non-surface grains of `phase`.
    pub fn unbiased_volume(&self, phase: usize) -> f64 {
        self.iter()
            .filter(|g| g.phase == phase && !g.surface)
            .map(|g| g.volume)
            .sum()
    }

    pub fn max_phase(&self) -> usize {
        self.iter().map(|g| g.phase).max().unwrap_or(0)
    }

    /// Copy every assigned grain orientation onto the voxels it owns.
    pub fn write_back(&self, grid: &mut VoxelGrid) {
        for index in 0..grid.npoints() {
            let gid = grid.grain_id(index);
            if gid <= 0 {
                continue;
            }
            if let Some(grain) = self.grains.get(gid as usize) {
                if grain.odf_bin.is_some() {
                    grid.set_grain_orientation(index, grain.euler);
                }
            }
        }
    }
}
