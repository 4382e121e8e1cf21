//! Minimal deterministic vector and quaternion math.
//!
//! Positions live on a sphere, orientations are unit quaternions. Every
//! operation here uses only IEEE-754 arithmetic and `sqrt` -- no
//! transcendental functions -- so results are bit-identical on every target
//! platform. Orientation construction goes through an orthonormal basis and
//! a matrix-to-quaternion conversion instead of axis/angle for the same
//! reason.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Vec3
// ---------------------------------------------------------------------------

/// A 3-component `f64` vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// The zero vector.
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// The world up axis, used as a fallback direction for degenerate inputs.
    pub const UNIT_Y: Vec3 = Vec3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn scale(self, s: f64) -> Vec3 {
        Vec3 {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    /// Unit vector in the same direction, or `None` for (near-)zero input.
    pub fn try_normalized(self) -> Option<Vec3> {
        let len_sq = self.length_squared();
        if len_sq <= f64::EPSILON {
            return None;
        }
        Some(self.scale(1.0 / len_sq.sqrt()))
    }

    /// Unit vector in the same direction, falling back to `UNIT_Y` for
    /// degenerate input.
    pub fn normalized_or_up(self) -> Vec3 {
        self.try_normalized().unwrap_or(Vec3::UNIT_Y)
    }

    /// Component of `self` orthogonal to the unit vector `normal`.
    ///
    /// Used to keep velocities tangent to the sphere surface.
    pub fn reject_onto(self, normal: Vec3) -> Vec3 {
        self.sub(normal.scale(self.dot(normal)))
    }

    /// Linear interpolation: `self` at `t = 0`, `other` at `t = 1`.
    pub fn lerp(self, other: Vec3, t: f64) -> Vec3 {
        self.add(other.sub(self).scale(t))
    }

    pub fn distance(self, other: Vec3) -> f64 {
        self.sub(other).length()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::add(self, rhs)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::sub(self, rhs)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        self.scale(rhs)
    }
}

// ---------------------------------------------------------------------------
// Quat
// ---------------------------------------------------------------------------

/// A unit quaternion (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    /// The identity rotation.
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Orientation looking along `forward` with `up` as the vertical hint.
    ///
    /// Both inputs may be unnormalized; degenerate inputs (zero vectors,
    /// `forward` parallel to `up`) fall back to the identity rotation so a
    /// stalled unit never acquires a garbage orientation.
    pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
        let Some(f) = forward.try_normalized() else {
            return Quat::IDENTITY;
        };
        let Some(right) = up.cross(f).try_normalized() else {
            return Quat::IDENTITY;
        };
        let u = f.cross(right);
        Quat::from_basis(right, u, f)
    }

    /// Convert an orthonormal basis (columns right, up, forward) into a
    /// quaternion via the standard trace-branching conversion. Only `sqrt`
    /// is used, so the result is platform-stable.
    fn from_basis(right: Vec3, up: Vec3, forward: Vec3) -> Quat {
        let (m00, m01, m02) = (right.x, up.x, forward.x);
        let (m10, m11, m12) = (right.y, up.y, forward.y);
        let (m20, m21, m22) = (right.z, up.z, forward.z);

        let trace = m00 + m11 + m22;
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Quat {
                w: 0.25 * s,
                x: (m21 - m12) / s,
                y: (m02 - m20) / s,
                z: (m10 - m01) / s,
            }
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Quat {
                w: (m21 - m12) / s,
                x: 0.25 * s,
                y: (m01 + m10) / s,
                z: (m02 + m20) / s,
            }
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Quat {
                w: (m02 - m20) / s,
                x: (m01 + m10) / s,
                y: 0.25 * s,
                z: (m12 + m21) / s,
            }
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Quat {
                w: (m10 - m01) / s,
                x: (m02 + m20) / s,
                y: (m12 + m21) / s,
                z: 0.25 * s,
            }
        };
        q.normalized()
    }

    /// Renormalize to unit length. Degenerate quaternions collapse to the
    /// identity.
    pub fn normalized(self) -> Quat {
        let len_sq = self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w;
        if len_sq <= f64::EPSILON {
            return Quat::IDENTITY;
        }
        let inv = 1.0 / len_sq.sqrt();
        Quat {
            x: self.x * inv,
            y: self.y * inv,
            z: self.z * inv,
            w: self.w * inv,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
