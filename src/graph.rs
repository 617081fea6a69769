//! Grain adjacency stored in compressed sparse row form.

use serde::Serialize;

/// Whether the scan that produced a graph ran to completion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ScanStatus {
    Complete,
    Cancelled,
}

/// Adjacency, shared boundary areas and surface flags for every grain.
///
/// Rows are indexed by grain id `0..=num_grains`; row 0 (the null grain) is
/// always empty. Within a row, neighbors are sorted by id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NeighborGraph {
    /// Row offsets: neighbors of grain `g` live in `xadj[g]..xadj[g + 1]`.
    pub(crate) xadj: Vec<usize>,
    pub(crate) adjncy: Vec<usize>,
    pub(crate) areas: Vec<f64>,
    pub(crate) surface: Vec<bool>,
    pub(crate) voxel_counts: Vec<usize>,
    /// Per voxel: number of six-connected neighbors owned by another grain.
    pub(crate) boundary_cells: Vec<u8>,
    pub(crate) status: ScanStatus,
}

impl NeighborGraph {
    /// Number of grains (largest valid grain id).
    pub fn num_grains(&self) -> usize {
        self.xadj.len().saturating_sub(2)
    }

    fn row(&self, grain: usize) -> std::ops::Range<usize> {
        match (self.xadj.get(grain), self.xadj.get(grain + 1)) {
            (Some(&a), Some(&b)) => a..b,
            _ => 0..0,
        }
    }

    /// Neighbor ids of `grain`. Empty for unknown ids.
    pub fn neighbors(&self, grain: usize) -> &[usize] {
        &self.adjncy[self.row(grain)]
    }

    /// Shared boundary areas, parallel to [`NeighborGraph::neighbors`].
    pub fn shared_area(&self, grain: usize) -> &[f64] {
        &self.areas[self.row(grain)]
    }

    /// Area `grain` shares with `other`, as seen from `grain`'s own voxels.
    pub fn shared_area_with(&self, grain: usize, other: usize) -> Option<f64> {
        let row = self.row(grain);
        self.adjncy[row.clone()]
            .binary_search(&other)
            .ok()
            .map(|pos| self.areas[row.start + pos])
    }

    /// `(neighbor, area)` pairs of `grain`.
    pub fn edges(&self, grain: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let row = self.row(grain);
        self.adjncy[row.clone()]
            .iter()
            .copied()
            .zip(self.areas[row].iter().copied())
    }

    pub fn num_neighbors(&self, grain: usize) -> usize {
        self.row(grain).len()
    }

    /// Touches the outer boundary of the grid or a null voxel.
    pub fn is_surface_grain(&self, grain: usize) -> bool {
        self.surface.get(grain).copied().unwrap_or(false)
    }

    /// Number of voxels owned by `grain`.
    pub fn voxel_count(&self, grain: usize) -> usize {
        self.voxel_counts.get(grain).copied().unwrap_or(0)
    }

    pub fn boundary_cells(&self) -> &[u8] {
        &self.boundary_cells
    }

    /// Total stored area of every row, counting each pair from both sides.
    pub fn total_area(&self) -> f64 {
        self.areas.iter().sum()
    }

    pub fn status(&self) -> ScanStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == ScanStatus::Complete
    }
}

/// Helper trait to print a per-grain summary of a graph.
pub trait NeighborGraphPrinter {
    fn print(&self);
}

impl NeighborGraphPrinter for NeighborGraph {
    fn print(&self) {
        for g in 1..=self.num_grains() {
            let surf = if self.is_surface_grain(g) { " (surface)" } else { "" };
            println!("grain {g}{surf}: {} neighbors", self.num_neighbors(g));
            for (n, area) in self.edges(g) {
                println!("    -> {n} area {area:.6}");
            }
        }
    }
}
