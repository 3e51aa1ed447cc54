//! The bridge's view of every body it drives

use crate::handle::RigidBodyHandle;
use bodysync_core::{BodyId, RigidBodyTransform, SourceId};
use bodysync_netcode::{CombinedEntry, CombinedSnapshot};
use std::collections::BTreeMap;

/// One body known to the bridge
#[derive(Debug)]
pub struct BridgeBody<B> {
    handle: B,
    owner: SourceId,
    /// Explicitly driven by the local participant (e.g. grabbed)
    is_keyframed: bool,
    /// Latest estimate received from the remote owner
    remote_state: Option<CombinedEntry>,
    /// Consecutive outgoing snapshots in which the body did not move
    still_frames: u32,
    /// Pose at the previous outgoing snapshot
    last_sent: Option<RigidBodyTransform>,
}

impl<B: RigidBodyHandle> BridgeBody<B> {
    fn new(handle: B, owner: SourceId, is_keyframed: bool) -> Self {
        Self {
            handle,
            owner,
            is_keyframed,
            remote_state: None,
            still_frames: 0,
            last_sent: None,
        }
    }

    pub fn handle(&self) -> &B {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut B {
        &mut self.handle
    }

    /// Source that currently owns the body
    pub fn owner(&self) -> SourceId {
        self.owner
    }

    /// Whether the local participant drives the body explicitly
    pub fn is_keyframed(&self) -> bool {
        self.is_keyframed
    }

    /// Latest estimate received for a remotely owned body
    pub fn remote_state(&self) -> Option<&CombinedEntry> {
        self.remote_state.as_ref()
    }

    /// Whether the remote owner reports the body as explicitly keyframed
    pub fn is_remote_keyframed(&self) -> bool {
        self.remote_state
            .is_some_and(|state| state.motion_type.is_keyframed())
    }

    /// Consecutive outgoing snapshots without movement
    pub fn still_frames(&self) -> u32 {
        self.still_frames
    }

    pub(crate) fn set_owner(&mut self, owner: SourceId) {
        self.owner = owner;
        self.remote_state = None;
        self.still_frames = 0;
        self.last_sent = None;
    }

    pub(crate) fn set_keyframed(&mut self, keyframed: bool) {
        self.is_keyframed = keyframed;
        self.still_frames = 0;
    }

    pub(crate) fn into_handle(self) -> B {
        self.handle
    }

    /// Update the stillness counter with the pose about to be sent
    pub(crate) fn track_stillness(
        &mut self,
        position_epsilon: f32,
        angle_epsilon: f32,
        velocity_epsilon: f32,
    ) {
        let current = self.handle.transform();
        let still = self.last_sent.is_some_and(|last| {
            last.position.distance(current.position) <= position_epsilon
                && last.angle_between(&current) <= angle_epsilon
        }) && self.handle.linear_velocity().length() <= velocity_epsilon;

        self.still_frames = if still {
            self.still_frames.saturating_add(1)
        } else {
            0
        };
        self.last_sent = Some(current);
    }
}

/// Every body the bridge drives, split by ownership
#[derive(Debug)]
pub struct BodySet<B> {
    local_source: SourceId,
    bodies: BTreeMap<BodyId, BridgeBody<B>>,
}

impl<B: RigidBodyHandle> BodySet<B> {
    /// Create an empty set for the participant `local_source`
    pub fn new(local_source: SourceId) -> Self {
        Self {
            local_source,
            bodies: BTreeMap::new(),
        }
    }

    /// Source id of the local participant
    pub fn local_source(&self) -> SourceId {
        self.local_source
    }

    /// Add a body, returning the handle it replaced
    pub fn insert(&mut self, handle: B, owner: SourceId, is_keyframed: bool) -> Option<B> {
        let id = handle.id();
        self.bodies
            .insert(id, BridgeBody::new(handle, owner, is_keyframed))
            .map(BridgeBody::into_handle)
    }

    /// Remove a body, returning its handle
    pub fn remove(&mut self, id: BodyId) -> Option<B> {
        self.bodies.remove(&id).map(BridgeBody::into_handle)
    }

    pub fn get(&self, id: BodyId) -> Option<&BridgeBody<B>> {
        self.bodies.get(&id)
    }

    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut BridgeBody<B>> {
        self.bodies.get_mut(&id)
    }

    /// Check if a body is owned by the local participant
    pub fn is_local(&self, id: BodyId) -> bool {
        self.bodies
            .get(&id)
            .is_some_and(|b| b.owner == self.local_source)
    }

    /// Check if a body is owned by another participant
    pub fn is_remote(&self, id: BodyId) -> bool {
        self.bodies
            .get(&id)
            .is_some_and(|b| b.owner != self.local_source)
    }

    /// Iterate over locally owned bodies
    pub fn local(&self) -> impl Iterator<Item = &BridgeBody<B>> {
        let local = self.local_source;
        self.bodies.values().filter(move |b| b.owner == local)
    }

    /// Iterate over remotely owned bodies
    pub fn remote(&self) -> impl Iterator<Item = &BridgeBody<B>> {
        let local = self.local_source;
        self.bodies.values().filter(move |b| b.owner != local)
    }

    /// Mutably iterate over locally owned bodies
    pub fn local_mut(&mut self) -> impl Iterator<Item = &mut BridgeBody<B>> {
        let local = self.local_source;
        self.bodies.values_mut().filter(move |b| b.owner == local)
    }

    /// Mutably iterate over remotely owned bodies
    pub fn remote_mut(&mut self) -> impl Iterator<Item = &mut BridgeBody<B>> {
        let local = self.local_source;
        self.bodies.values_mut().filter(move |b| b.owner != local)
    }

    /// Remember the latest remote estimate of every body in `combined`
    pub fn record_remote_states(&mut self, combined: &CombinedSnapshot) {
        let local = self.local_source;
        for entry in combined.iter() {
            if let Some(body) = self.bodies.get_mut(&entry.id) {
                if body.owner != local {
                    body.remote_state = Some(*entry);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}
