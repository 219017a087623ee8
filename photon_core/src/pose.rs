// Copyright 2026 the Photon Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal orientation and pose math for time-warp.
//!
//! This covers exactly what the timing pipeline needs (quaternion product and
//! inverse, quaternion to rotation matrix, identity) without pulling in a full
//! linear-algebra crate. Internally everything is `f64`; the `f32` types at the
//! bottom are the application-facing boundary and convert explicitly.

use core::ops::Mul;
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

/// A 3-component vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    /// X (right).
    pub x: f64,
    /// Y (up).
    pub y: f64,
    /// Z (backwards).
    pub z: f64,
}

impl Vec3 {
    /// The zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A rotation quaternion `w + xi + yj + zk`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quat {
    /// i component.
    pub x: f64,
    /// j component.
    pub y: f64,
    /// k component.
    pub z: f64,
    /// Real component.
    pub w: f64,
}

impl Quat {
    /// The identity rotation.
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Creates a quaternion from its components.
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `radians` around a unit `axis`.
    #[must_use]
    pub fn from_axis_angle(axis: Vec3, radians: f64) -> Self {
        let half = radians * 0.5;
        let (s, c) = (half.sin(), half.cos());
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// Squared norm.
    #[inline]
    #[must_use]
    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Returns this quaternion scaled to unit length, or identity if it is
    /// degenerate.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.length_squared().sqrt();
        if len > 0.0 && len.is_finite() {
            Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
        } else {
            Self::IDENTITY
        }
    }

    /// Inverse of a unit quaternion (its conjugate).
    #[inline]
    #[must_use]
    pub const fn inverted(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }
}

impl Default for Quat {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Quat {
    type Output = Self;

    /// Hamilton product: `self * rhs` applies `rhs` first.
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let (a, b) = (self, rhs);
        Self::new(
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        )
    }
}

/// Orientation plus position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    /// Orientation.
    pub orientation: Quat,
    /// Position in meters.
    pub position: Vec3,
}

impl Pose {
    /// Identity orientation at the origin.
    pub const IDENTITY: Self = Self {
        orientation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    /// Creates a pose.
    #[inline]
    #[must_use]
    pub const fn new(orientation: Quat, position: Vec3) -> Self {
        Self {
            orientation,
            position,
        }
    }
}

/// A row-major 4×4 matrix, indexed `m[row][col]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix4 {
    /// Four rows.
    pub m: [[f64; 4]; 4],
}

impl Matrix4 {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Rotation matrix for a unit quaternion.
    #[must_use]
    pub fn from_quat(q: Quat) -> Self {
        let (ww, xx, yy, zz) = (q.w * q.w, q.x * q.x, q.y * q.y, q.z * q.z);
        Self {
            m: [
                [
                    ww + xx - yy - zz,
                    2.0 * (q.x * q.y - q.w * q.z),
                    2.0 * (q.x * q.z + q.w * q.y),
                    0.0,
                ],
                [
                    2.0 * (q.x * q.y + q.w * q.z),
                    ww - xx + yy - zz,
                    2.0 * (q.y * q.z - q.w * q.x),
                    0.0,
                ],
                [
                    2.0 * (q.x * q.z - q.w * q.y),
                    2.0 * (q.y * q.z + q.w * q.x),
                    ww - xx - yy + zz,
                    0.0,
                ],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Returns the transpose.
    #[must_use]
    pub const fn transposed(self) -> Self {
        let mut out = [[0.0_f64; 4]; 4];
        let mut r = 0;
        while r < 4 {
            let mut c = 0;
            while c < 4 {
                out[c][r] = self.m[r][c];
                c += 1;
            }
            r += 1;
        }
        Self { m: out }
    }

    /// Is every element finite?
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.m.iter().flatten().all(|v| v.is_finite())
    }

    /// Narrows to `f32` for the application boundary.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the application boundary uses f32 matrices"
    )]
    #[must_use]
    pub fn to_f32(self) -> [[f32; 4]; 4] {
        self.m.map(|row| row.map(|v| v as f32))
    }
}

impl Default for Matrix4 {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Matrix4 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let a = &self.m;
        let b = &rhs.m;
        let mut out = [[0.0_f64; 4]; 4];
        let mut r = 0;
        while r < 4 {
            let mut c = 0;
            while c < 4 {
                out[r][c] =
                    a[r][0] * b[0][c] + a[r][1] * b[1][c] + a[r][2] * b[2][c] + a[r][3] * b[3][c];
                c += 1;
            }
            r += 1;
        }
        Self { m: out }
    }
}

// ---------------------------------------------------------------------------
// f32 boundary types
// ---------------------------------------------------------------------------

/// Application-facing single-precision orientation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuatF32 {
    /// i component.
    pub x: f32,
    /// j component.
    pub y: f32,
    /// k component.
    pub z: f32,
    /// Real component.
    pub w: f32,
}

/// Application-facing single-precision pose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseF32 {
    /// Orientation.
    pub orientation: QuatF32,
    /// Position in meters.
    pub position: [f32; 3],
}

impl From<QuatF32> for Quat {
    fn from(q: QuatF32) -> Self {
        Self::new(q.x.into(), q.y.into(), q.z.into(), q.w.into())
    }
}

impl From<Quat> for QuatF32 {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "narrowing to the single-precision boundary type"
    )]
    fn from(q: Quat) -> Self {
        Self {
            x: q.x as f32,
            y: q.y as f32,
            z: q.z as f32,
            w: q.w as f32,
        }
    }
}

impl From<PoseF32> for Pose {
    fn from(p: PoseF32) -> Self {
        let [x, y, z] = p.position.map(f64::from);
        Self::new(p.orientation.into(), Vec3::new(x, y, z))
    }
}

impl From<Pose> for PoseF32 {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "narrowing to the single-precision boundary type"
    )]
    fn from(p: Pose) -> Self {
        Self {
            orientation: p.orientation.into(),
            position: [
                p.position.x as f32,
                p.position.y as f32,
                p.position.z as f32,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f64::consts::FRAC_PI_2;

    const EPS: f64 = 1e-9;

    fn assert_matrix_close(a: &Matrix4, b: &Matrix4) {
        for r in 0..4 {
            for c in 0..4 {
                assert!(
                    (a.m[r][c] - b.m[r][c]).abs() < EPS,
                    "m[{r}][{c}]: {} vs {}",
                    a.m[r][c],
                    b.m[r][c]
                );
            }
        }
    }

    #[test]
    fn identity_quat_gives_identity_matrix() {
        assert_eq!(Matrix4::from_quat(Quat::IDENTITY), Matrix4::IDENTITY);
        assert_eq!(Matrix4::default(), Matrix4::IDENTITY);
    }

    #[test]
    fn quat_times_inverse_is_identity() {
        let q = Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), 0.7);
        let p = q.inverted() * q;
        assert!((p.w - 1.0).abs() < EPS, "real part 1, got {p:?}");
        assert!(p.x.abs() < EPS && p.y.abs() < EPS && p.z.abs() < EPS, "no imaginary part");
    }

    #[test]
    fn yaw_ninety_degrees_matrix() {
        let q = Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), FRAC_PI_2);
        let m = Matrix4::from_quat(q);
        let expected = Matrix4 {
            m: [
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [-1.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        };
        assert_matrix_close(&m, &expected);
    }

    #[test]
    fn quat_product_matches_matrix_product() {
        let a = Quat::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), 0.3);
        let b = Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), -1.1);
        assert_matrix_close(
            &Matrix4::from_quat(a * b),
            &(Matrix4::from_quat(a) * Matrix4::from_quat(b)),
        );
    }

    #[test]
    fn rotation_transpose_is_inverse() {
        let q = Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), 0.4);
        let m = Matrix4::from_quat(q);
        assert_matrix_close(&(m * m.transposed()), &Matrix4::IDENTITY);
    }

    #[test]
    fn normalize_degenerate_is_identity() {
        assert_eq!(Quat::new(0.0, 0.0, 0.0, 0.0).normalized(), Quat::IDENTITY);
        let n = Quat::new(0.0, 0.0, 0.0, 2.0).normalized();
        assert_eq!(n, Quat::IDENTITY, "scaled identity normalizes exactly");
    }

    #[test]
    fn f32_boundary_conversion() {
        let p = Pose::new(Quat::new(0.0, 0.5, 0.0, 0.5), Vec3::new(1.0, -2.0, 0.25));
        let narrow = PoseF32::from(p);
        assert_eq!(narrow.position, [1.0, -2.0, 0.25], "exact in f32");
        assert_eq!(Pose::from(narrow), p, "exactly representable values survive");
    }

    #[test]
    fn non_finite_matrix_detected() {
        let mut m = Matrix4::IDENTITY;
        assert!(m.is_finite(), "identity is finite");
        m.m[2][1] = f64::NAN;
        assert!(!m.is_finite(), "NaN detected");
    }
}
