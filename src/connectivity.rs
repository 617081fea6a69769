use tracing::{debug, info, warn};

use crate::{
    config::MatchConfig,
    error::{Result, TexError},
    graph::{NeighborGraph, ScanStatus},
    utils::CancelFlag,
    voxel_grid::VoxelGrid,
};

const DEFAULT_NEIGHBOR_CAPACITY: usize = 16;

/// Six-connected directions `(axis, step)`.
const FACE_DIRECTIONS: [(usize, isize); 6] = [(2, -1), (1, -1), (0, -1), (0, 1), (1, 1), (2, 1)];

/// Running face counts of one grain against one neighbor, split by the axis
/// the shared faces are normal to.
#[derive(Copy, Clone, Debug)]
struct FaceTally {
    neighbor: usize,
    faces: [u32; 3],
}

/// Scans a voxel grid once and produces the grain [`NeighborGraph`].
#[derive(Debug, Default)]
pub struct NeighborGraphBuilder {
    num_grains: Option<usize>,
    initial_capacity: Option<usize>,
    cancel: CancelFlag,
    graph: Option<NeighborGraph>,
}

impl NeighborGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder using the tally capacity from `config`.
    pub fn from_config(config: &MatchConfig) -> Self {
        Self::new().with_initial_capacity(config.initial_neighbor_capacity)
    }

    /// Declare the number of grains up front. Grains with no voxels are
    /// allowed; a voxel id above `n` is rejected.
    pub fn with_num_grains(mut self, n: usize) -> Self {
        self.num_grains = Some(n);
        self
    }

    /// Starting capacity of each grain's neighbor tally.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Graph from the last call to [`NeighborGraphBuilder::build`].
    pub fn graph(&self) -> Result<&NeighborGraph> {
        self.graph
            .as_ref()
            .ok_or_else(|| TexError::missing_prerequisite("neighbor graph requested before build"))
    }

    pub fn into_graph(self) -> Result<NeighborGraph> {
        self.graph
            .ok_or_else(|| TexError::missing_prerequisite("neighbor graph requested before build"))
    }

    /// Scan `grid` and store the resulting graph, replacing any earlier one.
    pub fn build(&mut self, grid: &VoxelGrid) -> Result<&NeighborGraph> {
        let graph = self.scan(grid)?;
        Ok(self.graph.insert(graph))
    }

    fn scan(&self, grid: &VoxelGrid) -> Result<NeighborGraph> {
        let (nx, ny, nz) = grid.dimensions();
        if nx == 0 || ny == 0 || nz == 0 || grid.grain_ids().len() != nx * ny * nz {
            return Err(TexError::InvalidInput(format!(
                "voxel grid {nx}x{ny}x{nz} is empty or inconsistent"
            )));
        }
        let max_id = grid.max_grain_id() as usize;
        let num_grains = match self.num_grains {
            Some(n) if max_id > n => {
                return Err(TexError::InvalidInput(format!(
                    "largest grain id {max_id} exceeds the declared {n} grains"
                )))
            }
            Some(n) => n,
            None => max_id,
        };
        let capacity = self.initial_capacity.unwrap_or(DEFAULT_NEIGHBOR_CAPACITY);
        info!(nx, ny, nz, num_grains, "neighbor scan started");

        let dims = [nx, ny, nz];
        let npoints = grid.npoints();
        let mut tallies: Vec<Vec<FaceTally>> =
            (0..=num_grains).map(|_| Vec::with_capacity(capacity)).collect();
        let mut surface = vec![false; num_grains + 1];
        let mut voxel_counts = vec![0usize; num_grains + 1];
        let mut boundary_cells = vec![0u8; npoints];
        let mut status = ScanStatus::Complete;

        'voxels: for index in 0..npoints {
            if self.cancel.is_cancelled() {
                status = ScanStatus::Cancelled;
                break 'voxels;
            }
            let gid = grid.grain_id(index);
            if gid <= 0 {
                continue;
            }
            let g = gid as usize;
            voxel_counts[g] += 1;
            let (i, j, k) = grid.ijk(index);
            let pos = [i, j, k];

            // Outer boundary, ignoring axes only one cell thick.
            if (0..3).any(|a| dims[a] > 1 && (pos[a] == 0 || pos[a] == dims[a] - 1)) {
                surface[g] = true;
            }

            for &(axis, step) in FACE_DIRECTIONS.iter() {
                let Some(p) = pos[axis].checked_add_signed(step) else {
                    continue;
                };
                if p >= dims[axis] {
                    continue;
                }
                let mut npos = pos;
                npos[axis] = p;
                let nid = grid.grain_id(grid.idx(npos[0], npos[1], npos[2]));
                if nid <= 0 {
                    surface[g] = true;
                    continue;
                }
                let n = nid as usize;
                if n == g {
                    continue;
                }
                boundary_cells[index] += 1;
                let row = &mut tallies[g];
                match row.iter_mut().find(|t| t.neighbor == n) {
                    Some(t) => t.faces[axis] += 1,
                    None => {
                        let mut faces = [0; 3];
                        faces[axis] = 1;
                        row.push(FaceTally { neighbor: n, faces });
                    }
                }
            }
        }

        let (dx, dy, dz) = grid.resolution();
        let face_area = [dy * dz, dx * dz, dx * dy];
        let mut xadj = Vec::with_capacity(num_grains + 2);
        let mut adjncy: Vec<usize> = Vec::new();
        let mut areas: Vec<f64> = Vec::new();
        xadj.push(0);
        for (g, row) in tallies.iter_mut().enumerate() {
            if status == ScanStatus::Complete && self.cancel.is_cancelled() {
                status = ScanStatus::Cancelled;
            }
            if status == ScanStatus::Complete {
                row.retain(|t| t.neighbor != 0 && t.neighbor != g);
                row.sort_unstable_by_key(|t| t.neighbor);
                for t in row.iter() {
                    adjncy.push(t.neighbor);
                    areas.push((0..3).map(|a| t.faces[a] as f64 * face_area[a]).sum());
                }
            }
            xadj.push(adjncy.len());
        }

        if status == ScanStatus::Cancelled {
            warn!("neighbor scan cancelled, graph is partial");
        } else {
            debug!(edges = adjncy.len(), "neighbor rows finalized");
            info!(
                num_grains,
                surface_grains = surface.iter().filter(|&&s| s).count(),
                "neighbor scan finished"
            );
        }

        Ok(NeighborGraph {
            xadj,
            adjncy,
            areas,
            surface,
            voxel_counts,
            boundary_cells,
            status,
        })
    }
}

/// Build the neighbor graph of `grid` with default settings.
pub fn find_neighbors(grid: &VoxelGrid) -> Result<NeighborGraph> {
    NeighborGraphBuilder::new().scan(grid)
}
