//! RigidBodyHandle trait - The boundary to the host physics engine
//!
//! The bridge and the prediction engines never touch a physics world
//! directly; every read and write of body state goes through this trait.

use bodysync_core::{BodyId, RigidBodyTransform, Vec3};

/// Narrow view of one body in the host physics engine
pub trait RigidBodyHandle {
    /// Stable identity, shared by every participant
    fn id(&self) -> BodyId;

    /// Current world pose
    fn transform(&self) -> RigidBodyTransform;

    /// Teleport the body to a world pose
    fn set_transform(&mut self, transform: RigidBodyTransform);

    /// Current linear velocity
    fn linear_velocity(&self) -> Vec3;

    fn set_linear_velocity(&mut self, velocity: Vec3);

    /// Current angular velocity (axis × rad/s)
    fn angular_velocity(&self) -> Vec3;

    fn set_angular_velocity(&mut self, velocity: Vec3);

    /// Whether the body is driven externally instead of simulated
    fn is_kinematic(&self) -> bool;

    fn set_kinematic(&mut self, kinematic: bool);

    /// Closest point on the body's bounding volume to a world point
    ///
    /// Points inside the volume map to themselves.
    fn closest_point(&self, point: Vec3) -> Vec3;

    /// Radius of a sphere around the body's position enclosing its volume
    fn bounding_radius(&self) -> f32;
}
