//! Dated bundles of rigid body transforms
//!
//! A [`Snapshot`] is what one participant sends about the bodies it owns at a
//! given point of its local clock. Transforms are kept sorted by body id so
//! that consumers can merge snapshots with body lists in a single pass.

use crate::identity::BodyId;
use crate::time::LocalTime;
use crate::transform::{MotionType, RigidBodyTransform};
use serde::{Deserialize, Serialize};

/// Flags attached to a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SnapshotFlags {
    /// Regular snapshot
    #[default]
    None,
    /// Discard interpolation history and apply this snapshot exactly
    ResetJitterBuffer,
}

/// Transform of a single body inside a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformInfo {
    /// Body this transform belongs to
    pub id: BodyId,
    /// Motion state reported by the owner
    pub motion_type: MotionType,
    /// Pose at the snapshot time
    pub transform: RigidBodyTransform,
}

impl TransformInfo {
    /// Create a new transform entry
    pub fn new(id: BodyId, motion_type: MotionType, transform: RigidBodyTransform) -> Self {
        Self {
            id,
            motion_type,
            transform,
        }
    }
}

/// A dated set of body transforms from one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    time: LocalTime,
    flags: SnapshotFlags,
    transforms: Vec<TransformInfo>,
}

impl Snapshot {
    /// Create a snapshot
    ///
    /// Transforms are sorted by id; when an id appears more than once the
    /// last entry wins.
    pub fn new(time: LocalTime, flags: SnapshotFlags, mut transforms: Vec<TransformInfo>) -> Self {
        // Stable sort keeps insertion order among equal ids, so reversing
        // before dedup keeps the last one.
        transforms.reverse();
        transforms.sort_by_key(|t| t.id);
        transforms.dedup_by_key(|t| t.id);
        Self {
            time,
            flags,
            transforms,
        }
    }

    /// Create a snapshot without flags
    pub fn at(time: LocalTime, transforms: Vec<TransformInfo>) -> Self {
        Self::new(time, SnapshotFlags::None, transforms)
    }

    /// Source-local time of this snapshot
    pub fn time(&self) -> LocalTime {
        self.time
    }

    /// Snapshot flags
    pub fn flags(&self) -> SnapshotFlags {
        self.flags
    }

    /// Check if this snapshot resets the receiver's jitter buffer
    pub fn resets_jitter_buffer(&self) -> bool {
        self.flags == SnapshotFlags::ResetJitterBuffer
    }

    /// Transforms, sorted by body id
    pub fn transforms(&self) -> &[TransformInfo] {
        &self.transforms
    }

    /// Look up the transform of a body
    pub fn get(&self, id: BodyId) -> Option<&TransformInfo> {
        self.transforms
            .binary_search_by_key(&id, |t| t.id)
            .ok()
            .map(|i| &self.transforms[i])
    }

    /// Number of bodies in this snapshot
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if the snapshot carries no transforms
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Check if every body in the snapshot is sleeping
    ///
    /// An empty snapshot counts as all sleeping.
    pub fn all_sleeping(&self) -> bool {
        self.transforms.iter().all(|t| t.motion_type.is_sleeping())
    }
}
