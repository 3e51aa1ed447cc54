//! TimeSnapshotManager - one jitter buffer per source, one merged result
//!
//! The manager owns a [`SnapshotBuffer`] per remote source and an ownership
//! map from body to source. Each physics step it advances every buffer and
//! merges the per-body estimates into a single [`CombinedSnapshot`].
//!
//! Ownership can migrate (a body grabbed by another participant): registering
//! a body under a new source unregisters it from the old buffer, so updates
//! only ever come from the current owner.

use crate::buffer::{BodyCursor, SnapshotBuffer};
use crate::inbox::{SnapshotInbox, SnapshotSender};
use bodysync_core::{
    BodyId, BufferConfig, LocalTime, MotionType, RigidBodyTransform, Snapshot, SourceId, Vec3,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Merged estimate for one body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombinedEntry {
    /// Body this entry belongs to
    pub id: BodyId,
    /// Owner-local time of the estimate
    pub local_time: LocalTime,
    /// Estimated pose
    pub transform: RigidBodyTransform,
    /// Estimated linear velocity
    pub linear_velocity: Vec3,
    /// Estimated angular velocity
    pub angular_velocity: Vec3,
    /// Motion type reported by the owner
    pub motion_type: MotionType,
    /// Whether the estimate was refreshed this step
    pub has_update: bool,
}

/// Per-step merge of every source's estimates, ascending by body id
///
/// Bodies whose owner produced no update this step are absent; callers must
/// hold the previous pose for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedSnapshot {
    entries: Vec<CombinedEntry>,
}

impl CombinedSnapshot {
    /// Look up the estimate of a body
    pub fn get(&self, id: BodyId) -> Option<&CombinedEntry> {
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Check if a body has an estimate this step
    pub fn contains(&self, id: BodyId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate over the entries in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &CombinedEntry> {
        self.entries.iter()
    }

    /// Number of bodies with an estimate
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no body has an estimate
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<CombinedEntry> for CombinedSnapshot {
    /// Collect entries, sorting by id; the last entry of a duplicated id wins
    fn from_iter<I: IntoIterator<Item = CombinedEntry>>(iter: I) -> Self {
        let mut entries: Vec<CombinedEntry> = iter.into_iter().collect();
        entries.reverse();
        entries.sort_by_key(|e| e.id);
        entries.dedup_by_key(|e| e.id);
        Self { entries }
    }
}

/// Owner of all per-source buffers and the body ownership map
#[derive(Debug)]
pub struct TimeSnapshotManager {
    config: BufferConfig,
    buffers: HashMap<SourceId, SnapshotBuffer>,
    owners: BTreeMap<BodyId, SourceId>,
    inbox: SnapshotInbox,
}

impl TimeSnapshotManager {
    /// Create a manager whose buffers use `config`
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            buffers: HashMap::new(),
            owners: BTreeMap::new(),
            inbox: SnapshotInbox::new(),
        }
    }

    fn buffer_mut(&mut self, source: SourceId) -> &mut SnapshotBuffer {
        let config = &self.config;
        self.buffers.entry(source).or_insert_with(|| {
            debug!(%source, "creating snapshot buffer");
            SnapshotBuffer::new(config.clone())
        })
    }

    /// Track `body` as owned by `source`, migrating it from a previous owner
    pub fn register_or_update_rigid_body(&mut self, body: BodyId, source: SourceId) {
        match self.owners.insert(body, source) {
            Some(previous) if previous == source => return,
            Some(previous) => {
                debug!(%body, from = %previous, to = %source, "body ownership migrated");
                if let Some(buffer) = self.buffers.get_mut(&previous) {
                    buffer.unregister_rigid_body(body);
                }
            }
            None => trace!(%body, %source, "body registered"),
        }
        self.buffer_mut(source).register_rigid_body(body);
    }

    /// Stop tracking `body`
    pub fn unregister_rigid_body(&mut self, body: BodyId) {
        if let Some(source) = self.owners.remove(&body) {
            if let Some(buffer) = self.buffers.get_mut(&source) {
                buffer.unregister_rigid_body(body);
            }
            trace!(%body, %source, "body unregistered");
        }
    }

    /// Route a received snapshot to its source buffer
    ///
    /// Returns whether the buffer kept the snapshot.
    pub fn add_snapshot(&mut self, source: SourceId, snapshot: Snapshot) -> bool {
        self.buffer_mut(source).add_snapshot(snapshot)
    }

    /// Create a handle for queuing snapshots from the network thread
    pub fn sender(&self) -> SnapshotSender {
        self.inbox.sender()
    }

    /// Advance every buffer by one physics step and merge the results
    pub fn step(&mut self, timestep: f32) -> CombinedSnapshot {
        for (source, snapshot) in self.inbox.drain() {
            self.add_snapshot(source, snapshot);
        }
        for buffer in self.buffers.values_mut() {
            buffer.step(timestep);
        }

        let mut cursors: HashMap<SourceId, BodyCursor<'_>> = self
            .buffers
            .iter()
            .map(|(source, buffer)| (*source, buffer.cursor()))
            .collect();

        let mut entries = Vec::with_capacity(self.owners.len());
        for (&body, source) in &self.owners {
            let Some(data) = cursors.get_mut(source).and_then(|c| c.find(body)) else {
                continue;
            };
            if !data.updated {
                continue;
            }
            entries.push(CombinedEntry {
                id: body,
                local_time: data.local_time,
                transform: data.transform,
                linear_velocity: data.linear_velocity,
                angular_velocity: data.angular_velocity,
                motion_type: data.motion_type,
                has_update: true,
            });
        }

        CombinedSnapshot { entries }
    }

    /// Current owner of a body
    pub fn owner_of(&self, body: BodyId) -> Option<SourceId> {
        self.owners.get(&body).copied()
    }

    /// Buffer of a source, if one exists
    pub fn buffer(&self, source: SourceId) -> Option<&SnapshotBuffer> {
        self.buffers.get(&source)
    }

    /// Number of sources with a buffer
    pub fn source_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of tracked bodies
    pub fn body_count(&self) -> usize {
        self.owners.len()
    }

    /// Drop a source's buffer and stop tracking the bodies it owns
    ///
    /// Returns whether the source had a buffer.
    pub fn remove_source(&mut self, source: SourceId) -> bool {
        self.owners.retain(|_, owner| *owner != source);
        let removed = self.buffers.remove(&source).is_some();
        if removed {
            debug!(%source, "snapshot source removed");
        }
        removed
    }
}

impl Default for TimeSnapshotManager {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}
