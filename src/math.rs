//! Matrix helpers for the archive's matrix compaction.
//!
//! A 4×4 matrix is stored either as a rigid transform with uniform scale
//! (rotation quaternion, translation, scale = 8 floats) or as its 16 raw
//! column-major floats. Decomposition is attempted at encode time; the
//! reader tells the forms apart by float count.

use serde::{Deserialize, Serialize};

/// Tolerance used by the decomposability test
pub const EPSILON: f32 = 1e-5;

const SQUARE_EPSILON: f32 = EPSILON * EPSILON;

/// Number of floats in the decomposed form
pub const DECOMPOSED_LEN: usize = 8;

/// Number of floats in the raw form
pub const RAW_LEN: usize = 16;

type Vec3 = [f32; 3];

// =============================================================================
// Matrix4
// =============================================================================

/// Column-major 4×4 matrix (`cols[c][r]`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix4 {
    pub cols: [[f32; 4]; 4],
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix4 {
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn from_cols(cols: [[f32; 4]; 4]) -> Self {
        Self { cols }
    }

    /// Build from 16 column-major floats
    pub fn from_slice(values: &[f32; RAW_LEN]) -> Self {
        let mut cols = [[0.0; 4]; 4];
        for (c, col) in cols.iter_mut().enumerate() {
            col.copy_from_slice(&values[c * 4..c * 4 + 4]);
        }
        Self { cols }
    }

    /// Flatten to 16 column-major floats
    pub fn to_array(&self) -> [f32; RAW_LEN] {
        let mut out = [0.0; RAW_LEN];
        for (c, col) in self.cols.iter().enumerate() {
            out[c * 4..c * 4 + 4].copy_from_slice(col);
        }
        out
    }

    pub fn translation(t: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[3] = [t[0], t[1], t[2], 1.0];
        m
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Component-wise comparison within `tolerance`
    pub fn approx_eq(&self, other: &Matrix4, tolerance: f32) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    fn row(&self, r: usize) -> [f32; 4] {
        [self.cols[0][r], self.cols[1][r], self.cols[2][r], self.cols[3][r]]
    }

    fn upper_col(&self, c: usize) -> Vec3 {
        [self.cols[c][0], self.cols[c][1], self.cols[c][2]]
    }
}

// =============================================================================
// Quat
// =============================================================================

/// Rotation quaternion, stored x, y, z, w
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians around a unit `axis`
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(axis[0] * s, axis[1] * s, axis[2] * s, c)
    }

    pub fn normalize(self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Quaternion of an orthonormal rotation given by its three columns
    fn from_rotation_cols(r: &[Vec3; 3]) -> Self {
        let (m00, m10, m20) = (r[0][0], r[0][1], r[0][2]);
        let (m01, m11, m21) = (r[1][0], r[1][1], r[1][2]);
        let (m02, m12, m22) = (r[2][0], r[2][1], r[2][2]);

        let trace = m00 + m11 + m22;
        let q = if trace > 0.0 {
            let s = 2.0 * (trace + 1.0).sqrt();
            Self::new((m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s, 0.25 * s)
        } else if m00 > m11 && m00 > m22 {
            let s = 2.0 * (1.0 + m00 - m11 - m22).sqrt();
            Self::new(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
        } else if m11 > m22 {
            let s = 2.0 * (1.0 + m11 - m00 - m22).sqrt();
            Self::new((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
        } else {
            let s = 2.0 * (1.0 + m22 - m00 - m11).sqrt();
            Self::new((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
        };
        q.normalize()
    }

    fn to_rotation_cols(self) -> [Vec3; 3] {
        let Quat { x, y, z, w } = self.normalize();
        let (x2, y2, z2) = (x + x, y + y, z + z);
        let (xx, xy, xz) = (x * x2, x * y2, x * z2);
        let (yy, yz, zz) = (y * y2, y * z2, z * z2);
        let (wx, wy, wz) = (w * x2, w * y2, w * z2);
        [
            [1.0 - (yy + zz), xy + wz, xz - wy],
            [xy - wz, 1.0 - (xx + zz), yz + wx],
            [xz + wy, yz - wx, 1.0 - (xx + yy)],
        ]
    }
}

// =============================================================================
// Decomposition
// =============================================================================

/// Split a rigid transform with uniform scale into rotation, translation and
/// scale. Returns `None` for projective, sheared or non-uniformly scaled input.
pub fn decompose(m: &Matrix4) -> Option<(Quat, Vec3, f32)> {
    let last = m.row(3);
    let x = [last[0], last[1], last[2], last[3] - 1.0];
    if dot4(x, x) > SQUARE_EPSILON {
        return None;
    }

    let u = [m.upper_col(0), m.upper_col(1), m.upper_col(2)];

    // Gram-Schmidt
    let r0 = normalize(u[0]);
    let r1 = normalize(sub(u[1], scale(r0, dot(r0, u[1]))));
    let r2 = normalize(sub(
        sub(u[2], scale(r0, dot(r0, u[2]))),
        scale(r1, dot(r1, u[2])),
    ));
    let mut r = [r0, r1, r2];

    if dot(r[0], cross(r[1], r[2])) < 0.0 {
        for col in r.iter_mut() {
            *col = scale(*col, -1.0);
        }
    }

    let shear = [dot(r[0], u[1]), dot(r[0], u[2]), dot(r[1], u[2])];
    if dot(shear, shear) > SQUARE_EPSILON {
        return None;
    }

    let s = [dot(r[0], u[0]), dot(r[1], u[1]), dot(r[2], u[2])];
    if (s[0] - s[1]).abs() > EPSILON || (s[0] - s[2]).abs() > EPSILON {
        return None;
    }

    let t = [m.cols[3][0], m.cols[3][1], m.cols[3][2]];
    Some((Quat::from_rotation_cols(&r), t, s[0]))
}

/// `translation * rotation * uniform_scale`
pub fn recompose(rotation: Quat, translation: Vec3, uniform_scale: f32) -> Matrix4 {
    let r = rotation.to_rotation_cols();
    let mut m = Matrix4::translation(translation);
    for (c, col) in r.iter().enumerate() {
        m.cols[c] = [
            col[0] * uniform_scale,
            col[1] * uniform_scale,
            col[2] * uniform_scale,
            0.0,
        ];
    }
    m
}

// =============================================================================
// Wire encoding
// =============================================================================

/// The two stored forms of a matrix value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatrixEncoding {
    Decomposed {
        rotation: Quat,
        translation: Vec3,
        scale: f32,
    },
    Raw([f32; RAW_LEN]),
}

impl MatrixEncoding {
    /// Pick the compact form when the matrix allows it
    pub fn encode(m: &Matrix4) -> Self {
        match decompose(m) {
            Some((rotation, translation, scale)) => MatrixEncoding::Decomposed {
                rotation,
                translation,
                scale,
            },
            None => MatrixEncoding::Raw(m.to_array()),
        }
    }

    /// Disambiguate by float count. Zero floats is the identity.
    pub fn from_floats(values: &[f32]) -> Option<Self> {
        match values.len() {
            0 => Some(MatrixEncoding::Raw(Matrix4::IDENTITY.to_array())),
            DECOMPOSED_LEN => Some(MatrixEncoding::Decomposed {
                rotation: Quat::new(values[0], values[1], values[2], values[3]),
                translation: [values[4], values[5], values[6]],
                scale: values[7],
            }),
            RAW_LEN => {
                let mut raw = [0.0; RAW_LEN];
                raw.copy_from_slice(values);
                Some(MatrixEncoding::Raw(raw))
            }
            _ => None,
        }
    }

    pub fn to_floats(&self) -> Vec<f32> {
        match self {
            MatrixEncoding::Decomposed {
                rotation,
                translation,
                scale,
            } => vec![
                rotation.x,
                rotation.y,
                rotation.z,
                rotation.w,
                translation[0],
                translation[1],
                translation[2],
                *scale,
            ],
            MatrixEncoding::Raw(raw) => raw.to_vec(),
        }
    }

    pub fn to_matrix(&self) -> Matrix4 {
        match self {
            MatrixEncoding::Decomposed {
                rotation,
                translation,
                scale,
            } => recompose(*rotation, *translation, *scale),
            MatrixEncoding::Raw(raw) => Matrix4::from_slice(raw),
        }
    }
}

// =============================================================================
// Vector helpers
// =============================================================================

fn dot(a: Vec3, b: Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn dot4(a: [f32; 4], b: [f32; 4]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(a: Vec3, s: f32) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn normalize(a: Vec3) -> Vec3 {
    let len = dot(a, a).sqrt();
    if len <= f32::EPSILON {
        return a;
    }
    scale(a, 1.0 / len)
}
