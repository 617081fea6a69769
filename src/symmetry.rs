//! Crystal symmetry classes and the orientation service consumed by the
//! texture matcher.

use std::f64::consts::{FRAC_1_SQRT_2 as R2, FRAC_PI_2, FRAC_PI_4, FRAC_PI_6};

use serde::{Deserialize, Serialize};

use crate::orientation::{homochoric_magnitude, AxisAngle, Euler, Quat, Rodrigues};

const H3: f64 = 0.866_025_403_784_438_6; // sqrt(3) / 2

/// m-3m proper rotations, scalar first.
static CUBIC_SYM: [Quat; 24] = [
    Quat::new(1.0, 0.0, 0.0, 0.0),
    Quat::new(0.0, 1.0, 0.0, 0.0),
    Quat::new(0.0, 0.0, 1.0, 0.0),
    Quat::new(0.0, 0.0, 0.0, 1.0),
    Quat::new(R2, R2, 0.0, 0.0),
    Quat::new(R2, 0.0, R2, 0.0),
    Quat::new(R2, 0.0, 0.0, R2),
    Quat::new(R2, -R2, 0.0, 0.0),
    Quat::new(R2, 0.0, -R2, 0.0),
    Quat::new(R2, 0.0, 0.0, -R2),
    Quat::new(0.0, R2, R2, 0.0),
    Quat::new(0.0, -R2, R2, 0.0),
    Quat::new(0.0, 0.0, R2, R2),
    Quat::new(0.0, 0.0, -R2, R2),
    Quat::new(0.0, R2, 0.0, R2),
    Quat::new(0.0, -R2, 0.0, R2),
    Quat::new(0.5, 0.5, 0.5, 0.5),
    Quat::new(0.5, -0.5, -0.5, -0.5),
    Quat::new(0.5, 0.5, -0.5, 0.5),
    Quat::new(0.5, -0.5, 0.5, -0.5),
    Quat::new(0.5, -0.5, 0.5, 0.5),
    Quat::new(0.5, 0.5, -0.5, -0.5),
    Quat::new(0.5, -0.5, -0.5, 0.5),
    Quat::new(0.5, 0.5, 0.5, -0.5),
];

/// 6/mmm proper rotations, scalar first.
static HEXAGONAL_SYM: [Quat; 12] = [
    Quat::new(1.0, 0.0, 0.0, 0.0),
    Quat::new(H3, 0.0, 0.0, 0.5),
    Quat::new(0.5, 0.0, 0.0, H3),
    Quat::new(0.0, 0.0, 0.0, 1.0),
    Quat::new(-0.5, 0.0, 0.0, H3),
    Quat::new(-H3, 0.0, 0.0, 0.5),
    Quat::new(0.0, 1.0, 0.0, 0.0),
    Quat::new(0.0, H3, 0.5, 0.0),
    Quat::new(0.0, 0.5, H3, 0.0),
    Quat::new(0.0, 0.0, 1.0, 0.0),
    Quat::new(0.0, -0.5, H3, 0.0),
    Quat::new(0.0, -H3, 0.5, 0.0),
];

/// Laue (symmetry) class of a phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaueClass {
    /// m-3m
    Cubic,
    /// 6/mmm
    Hexagonal,
}

impl LaueClass {
    pub fn symmetry_operators(self) -> &'static [Quat] {
        match self {
            LaueClass::Cubic => &CUBIC_SYM,
            LaueClass::Hexagonal => &HEXAGONAL_SYM,
        }
    }

    /// Homochoric bin grid shared by the ODF and MDF of this class.
    pub fn bin_grid(self) -> BinGrid {
        match self {
            LaueClass::Cubic => {
                let d = homochoric_magnitude(FRAC_PI_4);
                BinGrid {
                    half_width: [d, d, d],
                    bins: [18, 18, 18],
                }
            }
            LaueClass::Hexagonal => {
                let d1 = homochoric_magnitude(FRAC_PI_2);
                let d3 = homochoric_magnitude(FRAC_PI_6);
                BinGrid {
                    half_width: [d1, d1, d3],
                    bins: [36, 36, 12],
                }
            }
        }
    }

    /// Fold a misorientation axis into the region used for MDF binning.
    fn reduce_misorientation_axis(self, axis: [f64; 3]) -> [f64; 3] {
        let mut n = [axis[0].abs(), axis[1].abs(), axis[2].abs()];
        if self == LaueClass::Cubic {
            n.sort_by(|a, b| b.total_cmp(a));
        }
        n
    }
}

/// Regular grid over the homochoric cube `[-half_width, half_width]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BinGrid {
    pub half_width: [f64; 3],
    pub bins: [usize; 3],
}

impl BinGrid {
    #[inline]
    pub fn len(&self) -> usize {
        self.bins[0] * self.bins[1] * self.bins[2]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn step(&self, axis: usize) -> f64 {
        2.0 * self.half_width[axis] / self.bins[axis] as f64
    }

    /// Bin holding homochoric point `h`; points outside the cube are clamped
    /// to the nearest edge cell.
    pub fn bin_of(&self, h: [f64; 3]) -> usize {
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            let t = ((h[axis] + self.half_width[axis]) / self.step(axis)).floor();
            let max = (self.bins[axis] - 1) as f64;
            cell[axis] = t.clamp(0.0, max) as usize;
        }
        cell[0] + cell[1] * self.bins[0] + cell[2] * self.bins[0] * self.bins[1]
    }

    /// Homochoric coordinates of the centre of `bin`.
    pub fn center_of(&self, bin: usize) -> [f64; 3] {
        let cell = [
            bin % self.bins[0],
            (bin / self.bins[0]) % self.bins[1],
            bin / (self.bins[0] * self.bins[1]),
        ];
        let mut h = [0.0; 3];
        for axis in 0..3 {
            h[axis] = -self.half_width[axis] + (cell[axis] as f64 + 0.5) * self.step(axis);
        }
        h
    }
}

/// Symmetry-aware bin lookups and orientation conversions.
pub trait OrientationService {
    /// Number of ODF (and MDF) bins for `class`.
    fn bin_count(&self, class: LaueClass) -> usize;

    fn odf_bin_from_rodrigues(&self, class: LaueClass, rod: &Rodrigues) -> usize;

    fn misorientation_bin(&self, class: LaueClass, angle: f64, axis: [f64; 3]) -> usize;

    /// Representative orientation of an ODF bin.
    fn euler_from_odf_bin(&self, class: LaueClass, bin: usize) -> Euler;

    /// Disorientation between two orientations: smallest rotation angle over
    /// every symmetry-equivalent description, and its axis.
    fn misorientation(&self, class: LaueClass, q1: &Quat, q2: &Quat) -> AxisAngle;

    fn euler_to_quaternion(&self, euler: &Euler) -> Quat {
        euler.to_quat()
    }

    fn num_symmetry_operators(&self, class: LaueClass) -> usize;
}

/// Default [`OrientationService`] backed by the tables in this module.
#[derive(Copy, Clone, Debug, Default)]
pub struct LaueOps;

impl OrientationService for LaueOps {
    fn bin_count(&self, class: LaueClass) -> usize {
        class.bin_grid().len()
    }

    fn odf_bin_from_rodrigues(&self, class: LaueClass, rod: &Rodrigues) -> usize {
        class.bin_grid().bin_of(rod.to_homochoric())
    }

    fn misorientation_bin(&self, class: LaueClass, angle: f64, axis: [f64; 3]) -> usize {
        let reduced = AxisAngle {
            axis: class.reduce_misorientation_axis(axis),
            angle,
        };
        class.bin_grid().bin_of(reduced.to_homochoric())
    }

    fn euler_from_odf_bin(&self, class: LaueClass, bin: usize) -> Euler {
        let h = class.bin_grid().center_of(bin);
        AxisAngle::from_homochoric(h).to_quat().to_euler()
    }

    fn misorientation(&self, class: LaueClass, q1: &Quat, q2: &Quat) -> AxisAngle {
        let delta = *q1 * q2.conjugate();
        let mut best = delta.positive();
        for sym in class.symmetry_operators() {
            let candidate = (*sym * delta).positive();
            if candidate.w > best.w {
                best = candidate;
            }
        }
        best.to_axis_angle()
    }

    fn num_symmetry_operators(&self, class: LaueClass) -> usize {
        class.symmetry_operators().len()
    }
}
