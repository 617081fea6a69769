//! Orientation value types and the conversions between them.
//!
//! Quaternions are unit, scalar-first and kept in the northern hemisphere
//! (`w >= 0`). Euler angles are Bunge (ZXZ) triples in radians, wrapped to
//! `[0, 2π)` for `phi1`/`phi2` and `[0, π]` for `Phi`.

use std::f64::consts::PI;
use std::ops::Mul;

use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-12;

/// Homochoric vector: unit axis scaled by `(3/4 (ω - sin ω))^(1/3)`.
pub type Homochoric = [f64; 3];

/// Bunge Euler angles `(phi1, Phi, phi2)` in radians.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Euler {
    pub phi1: f64,
    pub phi: f64,
    pub phi2: f64,
}

impl Euler {
    pub fn new(phi1: f64, phi: f64, phi2: f64) -> Self {
        Self { phi1, phi, phi2 }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.phi1, self.phi, self.phi2]
    }

    pub fn to_quat(self) -> Quat {
        let sigma = 0.5 * (self.phi1 + self.phi2);
        let delta = 0.5 * (self.phi1 - self.phi2);
        let c = (0.5 * self.phi).cos();
        let s = (0.5 * self.phi).sin();
        Quat::new(
            c * sigma.cos(),
            -s * delta.cos(),
            -s * delta.sin(),
            -c * sigma.sin(),
        )
        .positive()
    }

    pub fn to_rodrigues(self) -> Rodrigues {
        self.to_quat().to_axis_angle().to_rodrigues()
    }
}

/// Unit quaternion `w + xi + yj + zk`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quat {
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn norm(self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Same rotation with a non-negative scalar part.
    pub fn positive(self) -> Self {
        if self.w < 0.0 {
            Self::new(-self.w, -self.x, -self.y, -self.z)
        } else {
            self
        }
    }

    pub fn to_euler(self) -> Euler {
        let q = self.positive();
        let (q0, q1, q2, q3) = (q.w, q.x, q.y, q.z);
        let q03 = q0 * q0 + q3 * q3;
        let q12 = q1 * q1 + q2 * q2;
        let chi = (q03 * q12).sqrt();
        let (phi1, phi, phi2) = if chi < EPS {
            if q12 < EPS {
                ((-2.0 * q0 * q3).atan2(q0 * q0 - q3 * q3), 0.0, 0.0)
            } else {
                ((2.0 * q1 * q2).atan2(q1 * q1 - q2 * q2), PI, 0.0)
            }
        } else {
            (
                ((q1 * q3 - q0 * q2) / chi).atan2((-q0 * q1 - q2 * q3) / chi),
                (2.0 * chi).atan2(q03 - q12),
                ((q0 * q2 + q1 * q3) / chi).atan2((q2 * q3 - q0 * q1) / chi),
            )
        };
        Euler::new(wrap_two_pi(phi1), phi, wrap_two_pi(phi2))
    }

    pub fn to_axis_angle(self) -> AxisAngle {
        let q = self.positive();
        let angle = 2.0 * q.w.clamp(-1.0, 1.0).acos();
        let s = (q.x * q.x + q.y * q.y + q.z * q.z).sqrt();
        if s < EPS {
            return AxisAngle::identity();
        }
        AxisAngle {
            axis: [q.x / s, q.y / s, q.z / s],
            angle,
        }
    }
}

/// Hamilton product.
impl Mul for Quat {
    type Output = Quat;

    fn mul(self, rhs: Quat) -> Quat {
        let (a0, a1, a2, a3) = (self.w, self.x, self.y, self.z);
        let (b0, b1, b2, b3) = (rhs.w, rhs.x, rhs.y, rhs.z);
        Quat::new(
            a0 * b0 - a1 * b1 - a2 * b2 - a3 * b3,
            a0 * b1 + a1 * b0 + a2 * b3 - a3 * b2,
            a0 * b2 - a1 * b3 + a2 * b0 + a3 * b1,
            a0 * b3 + a1 * b2 - a2 * b1 + a3 * b0,
        )
    }
}

/// Rotation `angle` (radians, `[0, π]`) about the unit `axis`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisAngle {
    pub axis: [f64; 3],
    pub angle: f64,
}

impl AxisAngle {
    pub fn identity() -> Self {
        Self {
            axis: [0.0, 0.0, 1.0],
            angle: 0.0,
        }
    }

    pub fn to_quat(self) -> Quat {
        let (s, c) = (0.5 * self.angle).sin_cos();
        Quat::new(c, self.axis[0] * s, self.axis[1] * s, self.axis[2] * s).positive()
    }

    pub fn to_rodrigues(self) -> Rodrigues {
        Rodrigues {
            axis: self.axis,
            magnitude: (0.5 * self.angle).tan(),
        }
    }

    pub fn to_homochoric(self) -> Homochoric {
        let m = homochoric_magnitude(self.angle);
        [self.axis[0] * m, self.axis[1] * m, self.axis[2] * m]
    }

    /// Inverse of [`AxisAngle::to_homochoric`].
    pub fn from_homochoric(h: Homochoric) -> Self {
        let m = (h[0] * h[0] + h[1] * h[1] + h[2] * h[2]).sqrt();
        if m < EPS {
            return Self::identity();
        }
        let target = m * m * m;
        let (mut lo, mut hi) = (0.0_f64, PI);
        for _ in 0..64 {
            let mid = 0.5 * (lo + hi);
            if homochoric_volume(mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Self {
            axis: [h[0] / m, h[1] / m, h[2] / m],
            angle: 0.5 * (lo + hi),
        }
    }
}

/// Rodrigues-Frank vector stored as unit axis plus `tan(angle / 2)`, so a
/// 180° rotation stays representable (`magnitude == inf`).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rodrigues {
    pub axis: [f64; 3],
    pub magnitude: f64,
}

impl Rodrigues {
    pub fn to_axis_angle(self) -> AxisAngle {
        if self.magnitude == 0.0 {
            return AxisAngle::identity();
        }
        AxisAngle {
            axis: self.axis,
            angle: 2.0 * self.magnitude.atan(),
        }
    }

    pub fn to_homochoric(self) -> Homochoric {
        self.to_axis_angle().to_homochoric()
    }
}

/// `3/4 (ω - sin ω)`, the cube of the homochoric radius.
#[inline]
fn homochoric_volume(angle: f64) -> f64 {
    0.75 * (angle - angle.sin())
}

/// Homochoric radius for a rotation angle.
#[inline]
pub fn homochoric_magnitude(angle: f64) -> f64 {
    homochoric_volume(angle).cbrt()
}

#[inline]
fn wrap_two_pi(a: f64) -> f64 {
    let r = a.rem_euclid(2.0 * PI);
    if r >= 2.0 * PI {
        0.0
    } else {
        r
    }
}
