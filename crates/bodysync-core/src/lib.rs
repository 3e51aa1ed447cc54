//! Bodysync Core - Shared types for networked rigid-body reconciliation
//!
//! This crate provides the value types every other bodysync crate speaks:
//! - Body and source identifiers (`BodyId`, `SourceId`)
//! - Poses and their interpolation (`RigidBodyTransform`)
//! - Motion classification (`MotionType`)
//! - Dated transform bundles sent over the network (`Snapshot`)
//! - Tuning configuration loadable from RON (`BodySyncConfig`)
//!
//! Snapshot timestamps are source-local: each participant stamps snapshots
//! with its own clock and receivers never compare times across sources.

mod config;
mod error;
mod identity;
mod snapshot;
pub mod time;
mod transform;

pub use config::{BodySyncConfig, BridgeConfig, BufferConfig, PredictionConfig};
pub use error::{Error, Result};
pub use identity::{BodyId, SourceId};
pub use snapshot::{Snapshot, SnapshotFlags, TransformInfo};
pub use time::{LocalTime, TIME_EPSILON};
pub use transform::{angular_velocity_between, MotionType, RigidBodyTransform};

// Re-export the math types used in public signatures
pub use glam::{Quat, Vec3};
