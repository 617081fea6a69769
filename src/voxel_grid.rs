use crate::error::{Result, TexError};
use crate::orientation::Euler;

/// Regular voxel grid holding one grain id per cell.
///
/// Ids `<= 0` are null (unassigned) cells. Cells are stored i-fastest, the
/// same ordering the neighbor scan walks.
#[derive(Clone, Debug)]
pub struct VoxelGrid {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize, // 2D slabs supported via nz == 1
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    grain_ids: Vec<i32>, // length = nx*ny*nz
    cell_eulers: Vec<Euler>,
}

impl VoxelGrid {
    pub fn new(
        dims: (usize, usize, usize),
        resolution: (f64, f64, f64),
        grain_ids: Vec<i32>,
    ) -> Result<Self> {
        let (nx, ny, nz) = dims;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(TexError::InvalidInput(format!(
                "grid dimensions must be non-zero, got {nx}x{ny}x{nz}"
            )));
        }
        let n = nx * ny * nz;
        if grain_ids.len() != n {
            return Err(TexError::InvalidInput(format!(
                "grain id array has {} entries, grid {nx}x{ny}x{nz} needs {n}",
                grain_ids.len()
            )));
        }
        let (dx, dy, dz) = resolution;
        if !(dx > 0.0 && dy > 0.0 && dz > 0.0) {
            return Err(TexError::InvalidInput(format!(
                "resolution must be positive, got ({dx}, {dy}, {dz})"
            )));
        }
        Ok(Self {
            nx,
            ny,
            nz,
            dx,
            dy,
            dz,
            grain_ids,
            cell_eulers: vec![Euler::default(); n],
        })
    }

    /// Build a grid by evaluating `f(i, j, k)` for every cell.
    pub fn from_fn<F>(dims: (usize, usize, usize), resolution: (f64, f64, f64), mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize, usize) -> i32,
    {
        let (nx, ny, nz) = dims;
        let mut ids = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    ids.push(f(i, j, k));
                }
            }
        }
        Self::new(dims, resolution, ids)
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    #[inline]
    pub fn resolution(&self) -> (f64, f64, f64) {
        (self.dx, self.dy, self.dz)
    }

    #[inline]
    pub fn npoints(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nz);
        (k * self.ny + j) * self.nx + i
    }

    /// Inverse of [`VoxelGrid::idx`].
    #[inline]
    pub fn ijk(&self, index: usize) -> (usize, usize, usize) {
        let i = index % self.nx;
        let j = (index / self.nx) % self.ny;
        let k = index / (self.nx * self.ny);
        (i, j, k)
    }

    /// Volume of a single voxel.
    #[inline]
    pub fn voxel_volume(&self) -> f64 {
        self.dx * self.dy * self.dz
    }

    /// True when exactly one axis has a single layer of cells.
    pub fn is_slab(&self) -> bool {
        [self.nx, self.ny, self.nz].iter().filter(|&&n| n == 1).count() == 1
    }

    #[inline]
    pub fn grain_id(&self, index: usize) -> i32 {
        self.grain_ids[index]
    }

    #[inline]
    pub fn grain_ids(&self) -> &[i32] {
        &self.grain_ids
    }

    /// Largest grain id present, or 0 if every cell is null.
    pub fn max_grain_id(&self) -> i32 {
        self.grain_ids.iter().copied().max().unwrap_or(0).max(0)
    }

    pub fn set_grain_orientation(&mut self, index: usize, euler: Euler) {
        self.cell_eulers[index] = euler;
    }

    #[inline]
    pub fn cell_euler(&self, index: usize) -> Euler {
        self.cell_eulers[index]
    }

    #[inline]
    pub fn cell_eulers(&self) -> &[Euler] {
        &self.cell_eulers
    }
}
