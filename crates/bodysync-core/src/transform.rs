//! Rigid body transforms and motion classification

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// World-space pose of a rigid body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyTransform {
    /// World position
    pub position: Vec3,
    /// World rotation
    pub rotation: Quat,
}

impl RigidBodyTransform {
    /// The identity pose at the origin
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Create a transform from a position and a rotation
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Create a transform with identity rotation
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Interpolate between two poses
    ///
    /// Position is interpolated linearly, rotation spherically. `t` is
    /// clamped to `[0, 1]`.
    pub fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            position: a.position.lerp(b.position, t),
            rotation: Self::slerp(a.rotation, b.rotation, t),
        }
    }

    /// Spherical interpolation of rotation along the shortest arc
    pub fn slerp(a: Quat, b: Quat, t: f32) -> Quat {
        a.slerp(b, t.clamp(0.0, 1.0)).normalize()
    }

    /// Angle in radians between the rotations of two poses
    pub fn angle_between(&self, other: &Self) -> f32 {
        self.rotation.angle_between(other.rotation)
    }
}

impl Default for RigidBodyTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Angular velocity (axis × radians per second) that rotates `from` into `to`
/// over `dt` seconds, taking the shortest arc
pub fn angular_velocity_between(from: Quat, to: Quat, dt: f32) -> Vec3 {
    if dt <= 0.0 {
        return Vec3::ZERO;
    }
    let mut delta = (to * from.inverse()).normalize();
    if delta.w < 0.0 {
        delta = -delta;
    }
    let (axis, angle) = delta.to_axis_angle();
    if !angle.is_finite() || angle.abs() < f32::EPSILON {
        return Vec3::ZERO;
    }
    axis * (angle / dt)
}

/// How a body moves, as reported by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MotionType {
    /// Simulated by the owner's physics
    #[default]
    Dynamic,
    /// Driven explicitly by the owner (e.g. grabbed); never simulated remotely
    Keyframed,
    /// At rest: zero velocity, frozen pose
    Sleeping,
}

impl MotionType {
    /// Check if the body is at rest
    pub fn is_sleeping(&self) -> bool {
        matches!(self, MotionType::Sleeping)
    }

    /// Check if the owner drives the body explicitly
    pub fn is_keyframed(&self) -> bool {
        matches!(self, MotionType::Keyframed)
    }
}
