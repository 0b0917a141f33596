//! Per-band spherical-harmonic rotation (Ivanic–Ruedenberg recursion).
//!
//! Band 1 is the 3×3 rotation in ACN axis order (Y, Z, X). Every higher band
//! is derived from band 1 and the band below it, so a single 3×3 update
//! recomputes the whole set.

use crate::order::AmbisonicOrder;
use crate::{Error, Result};

/// Column-major 3×3 rotation.
pub type RotationMatrix3 = [f32; 9];

/// Column-major 4×4 transform.
pub type RotationMatrix4 = [f32; 16];

pub const IDENTITY_MATRIX3: RotationMatrix3 = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Sign applied between a column-major matrix and band 1.
///
/// Flips the Y and X rows (`diag(-1, 1, -1)`). The flip is its own inverse,
/// so the getter applies the same table.
const BAND1_SIGNS: [f64; 9] = [-1.0, 1.0, -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, -1.0];

/// Indices of the upper-left 3×3 block of a column-major 4×4.
const MATRIX4_ROTATION_BLOCK: [usize; 9] = [0, 1, 2, 4, 5, 6, 8, 9, 10];

/// Banded rotation state for orders 1..=order.
///
/// Band `l` holds `(2l+1)²` coefficients stored input-major:
/// `R_l[m][n]` (input `n` feeding output `m`, both in `-l..=l`) lives at
/// `(n + l)(2l + 1) + (m + l)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BandRotation {
    order: AmbisonicOrder,
    bands: Vec<Vec<f64>>,
}

impl BandRotation {
    /// Identity rotation in every band.
    pub fn new(order: AmbisonicOrder) -> Self {
        let mut rotation = Self {
            order,
            bands: (1..=order.value())
                .map(|l| vec![0.0; (2 * l + 1) * (2 * l + 1)])
                .collect(),
        };
        rotation.set_matrix3(&IDENTITY_MATRIX3);
        rotation
    }

    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Replace band 1 from a column-major 3×3 and recompute every higher band.
    pub fn set_matrix3(&mut self, matrix: &RotationMatrix3) {
        for (k, value) in self.bands[0].iter_mut().enumerate() {
            *value = BAND1_SIGNS[k] * f64::from(matrix[k]);
        }
        for l in 2..=self.order.value() {
            self.bands[l - 1] = self.compute_band(l as i32);
        }
    }

    /// Same as [`set_matrix3`](Self::set_matrix3) using the rotation block of a 4×4.
    pub fn set_matrix4(&mut self, matrix: &RotationMatrix4) {
        self.set_matrix3(&MATRIX4_ROTATION_BLOCK.map(|i| matrix[i]));
    }

    /// The column-major 3×3 last applied.
    pub fn matrix3(&self) -> RotationMatrix3 {
        std::array::from_fn(|k| (BAND1_SIGNS[k] * self.bands[0][k]) as f32)
    }

    /// Raw coefficients of band `l` (1-based), input-major.
    pub fn band(&self, l: usize) -> &[f64] {
        &self.bands[l - 1]
    }

    /// `R_l[m][n]`.
    #[inline]
    pub fn get(&self, l: i32, m: i32, n: i32) -> f64 {
        let size = 2 * l + 1;
        self.bands[(l - 1) as usize][((n + l) * size + (m + l)) as usize]
    }

    /// Full `channels × channels` mixing matrix, row-major (output × input).
    ///
    /// Band 0 passes through and bands never mix with each other.
    pub fn mixer_coefficients(&self) -> Vec<f32> {
        let channels = self.order.channel_count();
        let mut coefficients = vec![0.0; channels * channels];
        coefficients[0] = 1.0;

        for l in 1..=self.order.value() as i32 {
            let offset = l * l + l;
            for m in -l..=l {
                for n in -l..=l {
                    let output = (offset + m) as usize;
                    let input = (offset + n) as usize;
                    coefficients[output * channels + input] = self.get(l, m, n) as f32;
                }
            }
        }
        coefficients
    }

    fn compute_band(&self, l: i32) -> Vec<f64> {
        let size = (2 * l + 1) as usize;
        let mut band = vec![0.0; size * size];

        for m in -l..=l {
            for n in -l..=l {
                let (u, v, w) = uvw_coefficients(m, n, l);
                let mut value = 0.0;
                // Zero coefficients mark terms whose indices leave band l-1
                if u != 0.0 {
                    value += u * self.u(m, n, l);
                }
                if v != 0.0 {
                    value += v * self.v(m, n, l);
                }
                if w != 0.0 {
                    value += w * self.w(m, n, l);
                }
                band[(n + l) as usize * size + (m + l) as usize] = value;
            }
        }
        band
    }

    fn p(&self, i: i32, a: i32, b: i32, l: i32) -> f64 {
        if b == l {
            self.get(1, i, 1) * self.get(l - 1, a, l - 1)
                - self.get(1, i, -1) * self.get(l - 1, a, -l + 1)
        } else if b == -l {
            self.get(1, i, 1) * self.get(l - 1, a, -l + 1)
                + self.get(1, i, -1) * self.get(l - 1, a, l - 1)
        } else {
            self.get(1, i, 0) * self.get(l - 1, a, b)
        }
    }

    fn u(&self, m: i32, n: i32, l: i32) -> f64 {
        self.p(0, m, n, l)
    }

    fn v(&self, m: i32, n: i32, l: i32) -> f64 {
        if m == 0 {
            self.p(1, 1, n, l) + self.p(-1, -1, n, l)
        } else if m > 0 {
            let d = kronecker(m, 1);
            self.p(1, m - 1, n, l) * (1.0 + d).sqrt() - self.p(-1, -m + 1, n, l) * (1.0 - d)
        } else {
            let d = kronecker(m, -1);
            self.p(1, m + 1, n, l) * (1.0 - d) + self.p(-1, -m - 1, n, l) * (1.0 + d).sqrt()
        }
    }

    fn w(&self, m: i32, n: i32, l: i32) -> f64 {
        if m > 0 {
            self.p(1, m + 1, n, l) + self.p(-1, -m - 1, n, l)
        } else if m < 0 {
            self.p(1, m - 1, n, l) - self.p(-1, -m + 1, n, l)
        } else {
            0.0
        }
    }
}

#[inline]
fn kronecker(i: i32, j: i32) -> f64 {
    if i == j {
        1.0
    } else {
        0.0
    }
}

fn uvw_coefficients(m: i32, n: i32, l: i32) -> (f64, f64, f64) {
    let d = kronecker(m, 0);
    let (lf, mf, nf) = (f64::from(l), f64::from(m), f64::from(n));
    let abs_m = mf.abs();
    let r = if n.abs() == l {
        1.0 / (2.0 * lf * (2.0 * lf - 1.0))
    } else {
        1.0 / ((lf + nf) * (lf - nf))
    };

    let u = ((lf + mf) * (lf - mf) * r).sqrt();
    let v = 0.5 * (1.0 - 2.0 * d) * ((1.0 + d) * (lf + abs_m - 1.0) * (lf + abs_m) * r).sqrt();
    let w = -0.5 * (1.0 - d) * ((lf - abs_m - 1.0) * (lf - abs_m) * r).sqrt();
    (u, v, w)
}

/// General 4×4 inverse (column-major). Singular input is an error.
pub fn invert_matrix4(a: &RotationMatrix4) -> Result<RotationMatrix4> {
    let a: [f64; 16] = a.map(f64::from);
    let [a00, a01, a02, a03, a10, a11, a12, a13, a20, a21, a22, a23, a30, a31, a32, a33] = a;

    let b00 = a00 * a11 - a01 * a10;
    let b01 = a00 * a12 - a02 * a10;
    let b02 = a00 * a13 - a03 * a10;
    let b03 = a01 * a12 - a02 * a11;
    let b04 = a01 * a13 - a03 * a11;
    let b05 = a02 * a13 - a03 * a12;
    let b06 = a20 * a31 - a21 * a30;
    let b07 = a20 * a32 - a22 * a30;
    let b08 = a20 * a33 - a23 * a30;
    let b09 = a21 * a32 - a22 * a31;
    let b10 = a21 * a33 - a23 * a31;
    let b11 = a22 * a33 - a23 * a32;

    let det = b00 * b11 - b01 * b10 + b02 * b09 + b03 * b08 - b04 * b07 + b05 * b06;
    if det == 0.0 || !det.is_finite() {
        return Err(Error::SingularMatrix);
    }
    let inv = 1.0 / det;

    let out = [
        a11 * b11 - a12 * b10 + a13 * b09,
        a02 * b10 - a01 * b11 - a03 * b09,
        a31 * b05 - a32 * b04 + a33 * b03,
        a22 * b04 - a21 * b05 - a23 * b03,
        a12 * b08 - a10 * b11 - a13 * b07,
        a00 * b11 - a02 * b08 + a03 * b07,
        a32 * b02 - a30 * b05 - a33 * b01,
        a20 * b05 - a22 * b02 + a23 * b01,
        a10 * b10 - a11 * b08 + a13 * b06,
        a01 * b08 - a00 * b10 - a03 * b06,
        a30 * b04 - a31 * b02 + a33 * b00,
        a21 * b02 - a20 * b04 - a23 * b00,
        a11 * b07 - a10 * b09 - a12 * b06,
        a00 * b09 - a01 * b07 + a02 * b06,
        a31 * b01 - a30 * b03 - a32 * b00,
        a20 * b03 - a21 * b01 + a22 * b00,
    ];
    Ok(out.map(|v| (v * inv) as f32))
}

/// Sound-field rotation for a camera (view-to-world) transform: its inverse.
pub fn rotation_from_camera_matrix(camera: &RotationMatrix4) -> Result<RotationMatrix4> {
    invert_matrix4(camera)
}
