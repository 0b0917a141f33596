//! Orientation adapters.
//!
//! Three quaternion types mark where a value sits in the conversion chain:
//!
//! - [`Quaternion`]: raw components, no frame convention.
//! - [`RotationQuaternion`]: normalized, in the producer's frame
//!   (AmbiX: +X front, +Y left, +Z up).
//! - [`EngineQuaternion`]: basis-changed and shimmed for the renderer. It can
//!   only be built by the adapters in this module.

use crate::rotation::RotationMatrix3;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 0.0);

    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    pub fn norm(&self) -> f32 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit-length copy. A zero quaternion stays zero.
    pub fn normalized(&self) -> Self {
        let norm = self.norm();
        if norm == 0.0 {
            return *self;
        }
        Self::new(self.w / norm, self.x / norm, self.y / norm, self.z / norm)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Quaternion) -> Quaternion {
        quaternion_multiply(self, rhs)
    }
}

/// Normalized orientation in the producer's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationQuaternion(Quaternion);

impl RotationQuaternion {
    /// Normalize `q`. Zero-length and non-finite input are rejected.
    pub fn new(q: Quaternion) -> Result<Self> {
        let norm = q.norm();
        if !norm.is_finite() || norm == 0.0 {
            return Err(Error::InvalidQuaternion(format!(
                "cannot normalize ({}, {}, {}, {})",
                q.w, q.x, q.y, q.z
            )));
        }
        Ok(Self(q.normalized()))
    }

    pub fn identity() -> Self {
        Self(Quaternion::IDENTITY)
    }

    pub fn quaternion(&self) -> Quaternion {
        self.0
    }
}

/// Orientation in the renderer's convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineQuaternion(Quaternion);

impl EngineQuaternion {
    pub fn quaternion(&self) -> Quaternion {
        self.0
    }

    pub fn rotation_matrix3(&self) -> RotationMatrix3 {
        quaternion_to_rotation_matrix3(self.0)
    }
}

/// Aligns the renderer's default forward with AmbiX front.
const CONVENTION_SHIM: Quaternion = Quaternion::new(0.0, 0.0, 1.0, 0.0);

pub fn identity_quaternion() -> Quaternion {
    Quaternion::IDENTITY
}

/// Hamilton product `left · right` (apply `right`, then `left`).
pub fn quaternion_multiply(left: Quaternion, right: Quaternion) -> Quaternion {
    Quaternion {
        w: left.w * right.w - left.x * right.x - left.y * right.y - left.z * right.z,
        x: left.w * right.x + left.x * right.w + left.y * right.z - left.z * right.y,
        y: left.w * right.y - left.x * right.z + left.y * right.w + left.z * right.x,
        z: left.w * right.z + left.x * right.y - left.y * right.x + left.z * right.w,
    }
}

/// Rotation of `angle_radians` about an axis that need not be normalized.
///
/// A zero axis gives the identity.
pub fn quaternion_from_axis_angle(x: f32, y: f32, z: f32, angle_radians: f32) -> Quaternion {
    let length = (x * x + y * y + z * z).sqrt();
    if length == 0.0 {
        return Quaternion::IDENTITY;
    }
    let (sin_half, cos_half) = (angle_radians * 0.5).sin_cos();
    Quaternion::new(
        cos_half,
        x / length * sin_half,
        y / length * sin_half,
        z / length * sin_half,
    )
}

#[inline]
pub fn degrees_to_radians(degrees: f32) -> f32 {
    degrees * (std::f32::consts::PI / 180.0)
}

/// AmbiX frame to renderer frame: basis change (w, −y, z, −x), then the
/// 180° convention shim on the left.
pub fn to_engine_quaternion(rotation: RotationQuaternion) -> EngineQuaternion {
    let Quaternion { w, x, y, z } = rotation.0;
    let basis = Quaternion::new(w, -y, z, -x);
    EngineQuaternion(quaternion_multiply(CONVENTION_SHIM, basis))
}

/// UI-level orientation: azimuth about +Z (counter-clockwise positive), then
/// elevation about +Y (positive up), both in degrees and in AmbiX space.
pub fn engine_quaternion_from_azimuth_elevation(
    azimuth_degrees: f32,
    elevation_degrees: f32,
) -> EngineQuaternion {
    let azimuth = quaternion_from_axis_angle(0.0, 0.0, 1.0, degrees_to_radians(azimuth_degrees));
    let elevation =
        quaternion_from_axis_angle(0.0, 1.0, 0.0, degrees_to_radians(elevation_degrees));
    // Unit by construction
    to_engine_quaternion(RotationQuaternion(azimuth * elevation))
}

/// Head trackers that report with X and Y swapped.
pub fn from_websocket_quaternion(q: Quaternion) -> Quaternion {
    Quaternion::new(q.w, q.y, q.x, q.z)
}

pub fn to_webgpu_quaternion(rotation: RotationQuaternion) -> Quaternion {
    let Quaternion { w, x, y, z } = rotation.0;
    Quaternion::new(w, -y, -z, -x)
}

/// Column-major 3×3 in the layout the rotation builder expects.
pub fn quaternion_to_rotation_matrix3(q: Quaternion) -> RotationMatrix3 {
    let Quaternion { w, x, y, z } = q;
    let (xx, yy, zz) = (x * x, y * y, z * z);
    let (xy, xz, yz) = (x * y, x * z, y * z);
    let (wx, wy, wz) = (w * x, w * y, w * z);

    [
        1.0 - 2.0 * (yy + zz),
        2.0 * (xy - wz),
        2.0 * (xz + wy),
        2.0 * (xy + wz),
        1.0 - 2.0 * (xx + zz),
        2.0 * (yz - wx),
        2.0 * (xz - wy),
        2.0 * (yz + wx),
        1.0 - 2.0 * (xx + yy),
    ]
}
