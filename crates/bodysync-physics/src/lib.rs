//! Bodysync Physics - Fixed-step reconciliation against a physics world
//!
//! This crate connects the snapshot playback of `bodysync-netcode` to a host
//! physics engine through the [`RigidBodyHandle`] trait.
//!
//! ## Architecture
//!
//! ```text
//! PhysicsBridge (owns everything below)
//!  │
//!  ├── BodySet ← local and remote bodies, behind RigidBodyHandle
//!  │
//!  ├── TimeSnapshotManager ← one jitter buffer per remote source
//!  │
//!  └── Prediction (trait)
//!       ├── KeyframedPrediction      remote bodies always kinematic
//!       └── InterpolationPrediction  released around contacts, blended back
//! ```
//!
//! ## Key Components
//!
//! - [`PhysicsBridge`]: Fixed-step driver and outgoing snapshot harvester
//! - [`Prediction`]: Policy deciding how remote bodies move each step
//! - [`RigidBodyHandle`]: The only way this crate touches the physics engine
//!
//! ## Example
//!
//! ```
//! use bodysync_core::{BodyId, BodySyncConfig, RigidBodyTransform, SourceId, Vec3};
//! use bodysync_physics::{PhysicsBridge, RigidBodyHandle};
//!
//! struct Ball {
//!     id: BodyId,
//!     pose: RigidBodyTransform,
//!     velocity: Vec3,
//!     kinematic: bool,
//! }
//!
//! impl RigidBodyHandle for Ball {
//!     fn id(&self) -> BodyId { self.id }
//!     fn transform(&self) -> RigidBodyTransform { self.pose }
//!     fn set_transform(&mut self, pose: RigidBodyTransform) { self.pose = pose; }
//!     fn linear_velocity(&self) -> Vec3 { self.velocity }
//!     fn set_linear_velocity(&mut self, v: Vec3) { self.velocity = v; }
//!     fn angular_velocity(&self) -> Vec3 { Vec3::ZERO }
//!     fn set_angular_velocity(&mut self, _: Vec3) {}
//!     fn is_kinematic(&self) -> bool { self.kinematic }
//!     fn set_kinematic(&mut self, kinematic: bool) { self.kinematic = kinematic; }
//!     fn closest_point(&self, point: Vec3) -> Vec3 {
//!         let offset = point - self.pose.position;
//!         self.pose.position + offset.clamp_length_max(0.5)
//!     }
//!     fn bounding_radius(&self) -> f32 { 0.5 }
//! }
//!
//! let me = SourceId::new(1);
//! let mut bridge = PhysicsBridge::new(me, BodySyncConfig::default())?;
//! bridge.add_rigid_body(
//!     Ball { id: BodyId::new(7), pose: RigidBodyTransform::IDENTITY, velocity: Vec3::X, kinematic: false },
//!     me,
//!     false,
//! );
//!
//! bridge.fixed_update(1.0 / 60.0);
//! // ... host physics step ...
//! let outgoing = bridge.create_snapshot().expect("one local body");
//! assert_eq!(outgoing.len(), 1);
//! # Ok::<(), bodysync_physics::Error>(())
//! ```

mod body;
mod bridge;
mod error;
mod handle;
mod prediction;

pub use body::{BodySet, BridgeBody};
pub use bridge::PhysicsBridge;
pub use error::{Error, Result};
pub use handle::RigidBodyHandle;
pub use prediction::{
    CollisionMonitorInfo, CollisionSwitchInfo, InterpolationPrediction, KeyframedPrediction,
    Prediction,
};
