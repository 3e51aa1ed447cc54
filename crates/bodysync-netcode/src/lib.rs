//! Bodysync Netcode - Jitter-buffered playback of remote rigid bodies
//!
//! This crate turns irregular snapshot streams into one smooth estimate per
//! remote body per physics step:
//!
//! - **Snapshot buffering**: Store out-of-order snapshots per source, drop duplicates and stale data
//! - **Adaptive playback**: Advance a virtual cursor whose speed follows network health and data availability
//! - **Interpolation**: Blend the snapshots surrounding the cursor, with estimated velocities
//! - **Ownership**: Route every body to the buffer of the source that currently owns it
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   TimeSnapshotManager                        │
//! │  ┌──────────────┐                                            │
//! │  │ SnapshotSender│──▶ inbox ──┐                              │
//! │  └──────────────┘             ▼                              │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────┐  │
//! │  │ SnapshotBuffer │  │ SnapshotBuffer │  │ SnapshotBuffer │  │
//! │  │   (source A)   │  │   (source B)   │  │   (source C)   │  │
//! │  └───────┬────────┘  └───────┬────────┘  └───────┬────────┘  │
//! │          └───────────────────┼───────────────────┘           │
//! │                              ▼                               │
//! │                     CombinedSnapshot                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use bodysync_core::{BodyId, MotionType, RigidBodyTransform, Snapshot, SourceId, TransformInfo};
//! use bodysync_netcode::TimeSnapshotManager;
//!
//! let remote = SourceId::new(7);
//! let crate_body = BodyId::new(1);
//!
//! let mut manager = TimeSnapshotManager::default();
//! manager.register_or_update_rigid_body(crate_body, remote);
//!
//! // Usually called from the network thread.
//! let sender = manager.sender();
//! sender.send(
//!     remote,
//!     Snapshot::at(
//!         0.0,
//!         vec![TransformInfo::new(crate_body, MotionType::Dynamic, RigidBodyTransform::IDENTITY)],
//!     ),
//! );
//!
//! let combined = manager.step(1.0 / 60.0);
//! assert!(combined.contains(crate_body));
//! ```

mod buffer;
mod inbox;
mod manager;
mod stats;

pub use buffer::{BodyCursor, RigidBodyData, SnapshotBuffer};
pub use inbox::SnapshotSender;
pub use manager::{CombinedEntry, CombinedSnapshot, TimeSnapshotManager};
pub use stats::{AvailabilityHistogram, RunningAverage};
