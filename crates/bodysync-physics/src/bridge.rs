//! PhysicsBridge - Fixed-step driver between the network and the physics world
//!
//! The bridge owns every body handle, the snapshot manager and the
//! prediction policy. Each fixed step it turns received snapshots into
//! remote body motion; after the host solver has run it harvests the pose of
//! every locally owned body into one outgoing snapshot.
//!
//! ## Step order
//!
//! ```text
//! fixed_update(dt)
//!  ├── TimeSnapshotManager::step   (drain inbox, step buffers, merge)
//!  ├── Prediction::predict_and_apply
//!  └── advance local clock
//! host physics step
//! create_snapshot()                (local bodies → Snapshot)
//! ```

use crate::body::{BodySet, BridgeBody};
use crate::error::{Error, Result};
use crate::handle::RigidBodyHandle;
use crate::prediction::{InterpolationPrediction, Prediction};
use bodysync_core::{
    BodyId, BodySyncConfig, BridgeConfig, LocalTime, MotionType, Snapshot, SnapshotFlags,
    SourceId, TransformInfo,
};
use bodysync_netcode::{SnapshotSender, TimeSnapshotManager};
use tracing::{debug, trace};

/// Fixed-step driver for one participant
#[derive(Debug)]
pub struct PhysicsBridge<B, P = InterpolationPrediction> {
    /// Bodies split into local and remote
    bodies: BodySet<B>,
    /// Per-source jitter buffers
    manager: TimeSnapshotManager,
    /// Policy driving remote bodies
    prediction: P,
    config: BridgeConfig,
    /// Clock stamped on outgoing snapshots
    local_time: LocalTime,
    /// Flag the next outgoing snapshot as a jitter buffer reset
    reset_requested: bool,
}

impl<B: RigidBodyHandle> PhysicsBridge<B, InterpolationPrediction> {
    /// Create a bridge with collision-aware prediction
    pub fn new(local_source: SourceId, config: BodySyncConfig) -> Result<Self> {
        let prediction = InterpolationPrediction::new(config.prediction.clone());
        Self::with_prediction(local_source, config, prediction)
    }
}

impl<B: RigidBodyHandle, P: Prediction> PhysicsBridge<B, P> {
    /// Create a bridge with a custom prediction policy
    pub fn with_prediction(
        local_source: SourceId,
        config: BodySyncConfig,
        prediction: P,
    ) -> Result<Self> {
        config.validate()?;
        debug!(%local_source, "physics bridge created");
        Ok(Self {
            bodies: BodySet::new(local_source),
            manager: TimeSnapshotManager::new(config.buffer),
            prediction,
            config: config.bridge,
            local_time: 0.0,
            reset_requested: false,
        })
    }

    // ========================================================================
    // Body registration
    // ========================================================================

    /// Start driving a body owned by `owner`
    ///
    /// Remote bodies become kinematic; local bodies are kinematic only when
    /// explicitly keyframed. Returns the handle this body replaced, if any.
    pub fn add_rigid_body(
        &mut self,
        mut handle: B,
        owner: SourceId,
        is_keyframed: bool,
    ) -> Option<B> {
        let id = handle.id();
        if owner == self.bodies.local_source() {
            handle.set_kinematic(is_keyframed);
            self.manager.unregister_rigid_body(id);
        } else {
            handle.set_kinematic(true);
            self.manager.register_or_update_rigid_body(id, owner);
        }
        debug!(body = %id, %owner, is_keyframed, "rigid body added");
        self.bodies.insert(handle, owner, is_keyframed)
    }

    /// Stop driving a body, returning its handle
    pub fn remove_rigid_body(&mut self, id: BodyId) -> Option<B> {
        let handle = self.bodies.remove(id)?;
        self.manager.unregister_rigid_body(id);
        debug!(body = %id, "rigid body removed");
        Some(handle)
    }

    /// Move a body to a new owner
    pub fn set_owner(&mut self, id: BodyId, owner: SourceId) -> Result<()> {
        let local_source = self.bodies.local_source();
        let body = self.bodies.get_mut(id).ok_or(Error::UnknownBody(id))?;
        let previous = body.owner();
        if previous == owner {
            return Ok(());
        }

        body.set_owner(owner);
        if owner == local_source {
            let keyframed = body.is_keyframed();
            body.handle_mut().set_kinematic(keyframed);
            self.manager.unregister_rigid_body(id);
        } else {
            body.handle_mut().set_kinematic(true);
            self.manager.register_or_update_rigid_body(id, owner);
        }
        debug!(body = %id, from = %previous, to = %owner, "rigid body ownership changed");
        Ok(())
    }

    /// Mark a body as explicitly driven by the local participant
    ///
    /// Only affects the body while it is locally owned.
    pub fn set_keyframed(&mut self, id: BodyId, keyframed: bool) -> Result<()> {
        let local = self.bodies.is_local(id);
        let body = self.bodies.get_mut(id).ok_or(Error::UnknownBody(id))?;
        body.set_keyframed(keyframed);
        if local {
            body.handle_mut().set_kinematic(keyframed);
        }
        trace!(body = %id, keyframed, "rigid body keyframing changed");
        Ok(())
    }

    // ========================================================================
    // Incoming snapshots
    // ========================================================================

    /// Store a snapshot received from `source`
    pub fn add_snapshot(&mut self, source: SourceId, snapshot: Snapshot) -> bool {
        self.manager.add_snapshot(source, snapshot)
    }

    /// Create a handle for queuing snapshots from the network thread
    pub fn snapshot_sender(&self) -> SnapshotSender {
        self.manager.sender()
    }

    // ========================================================================
    // Fixed step
    // ========================================================================

    /// Drive remote bodies for one fixed step
    ///
    /// Call before the host physics step.
    pub fn fixed_update(&mut self, timestep: f32) {
        let combined = self.manager.step(timestep);
        self.bodies.record_remote_states(&combined);
        self.prediction
            .predict_and_apply(timestep, &combined, &mut self.bodies);
        if timestep.is_finite() && timestep > 0.0 {
            self.local_time += timestep;
        }
    }

    /// Harvest every locally owned body into an outgoing snapshot
    ///
    /// Call once per step after the host physics step. Returns `None` when
    /// no body is locally owned.
    pub fn create_snapshot(&mut self) -> Option<Snapshot> {
        let config = &self.config;
        let mut transforms = Vec::new();
        for body in self.bodies.local_mut() {
            body.track_stillness(
                config.sleep_position_epsilon,
                config.sleep_angle_epsilon,
                config.sleep_velocity_epsilon,
            );
            transforms.push(TransformInfo::new(
                body.handle().id(),
                outgoing_motion_type(body, config),
                body.handle().transform(),
            ));
        }
        if transforms.is_empty() {
            return None;
        }

        let flags = if std::mem::take(&mut self.reset_requested) {
            debug!(time = self.local_time, "sending jitter buffer reset");
            SnapshotFlags::ResetJitterBuffer
        } else {
            SnapshotFlags::None
        };
        Some(Snapshot::new(self.local_time, flags, transforms))
    }

    /// Flag the next outgoing snapshot as a jitter buffer reset
    ///
    /// Used after teleports and ownership changes so receivers apply the
    /// next pose exactly instead of interpolating toward it.
    pub fn request_jitter_reset(&mut self) {
        self.reset_requested = true;
    }

    /// Forget the prediction's collision windows
    pub fn reset_prediction(&mut self) {
        self.prediction.reset();
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn body(&self, id: BodyId) -> Option<&B> {
        self.bodies.get(id).map(BridgeBody::handle)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut B> {
        self.bodies.get_mut(id).map(BridgeBody::handle_mut)
    }

    /// Every body with its ownership bookkeeping
    pub fn bodies(&self) -> &BodySet<B> {
        &self.bodies
    }

    /// Check if the local participant owns a body
    pub fn is_locally_owned(&self, id: BodyId) -> bool {
        self.bodies.is_local(id)
    }

    pub fn local_source(&self) -> SourceId {
        self.bodies.local_source()
    }

    /// Clock stamped on outgoing snapshots
    pub fn local_time(&self) -> LocalTime {
        self.local_time
    }

    pub fn prediction(&self) -> &P {
        &self.prediction
    }

    pub fn prediction_mut(&mut self) -> &mut P {
        &mut self.prediction
    }

    pub fn snapshot_manager(&self) -> &TimeSnapshotManager {
        &self.manager
    }
}

/// Motion type reported to receivers for a locally owned body
fn outgoing_motion_type<B: RigidBodyHandle>(
    body: &BridgeBody<B>,
    config: &BridgeConfig,
) -> MotionType {
    if body.is_keyframed() {
        MotionType::Keyframed
    } else if body.still_frames() >= config.sleep_frame_count {
        MotionType::Sleeping
    } else {
        MotionType::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::testing::TestBody;
    use crate::prediction::KeyframedPrediction;
    use bodysync_core::{Vec3, TIME_EPSILON};

    const ALICE: SourceId = SourceId(1);
    const BOB: SourceId = SourceId(2);
    const BALL: BodyId = BodyId(10);
    const DT: f32 = 0.02;

    fn bridge(local: SourceId) -> PhysicsBridge<TestBody> {
        PhysicsBridge::new(local, BodySyncConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = BodySyncConfig::default();
        config.buffer.histogram_slots = 2;
        let result = PhysicsBridge::<TestBody>::new(ALICE, config);
        assert!(matches!(result, Err(Error::Core(_))));
    }

    #[test]
    fn test_add_sets_kinematic_by_ownership() {
        let mut bridge = bridge(ALICE);
        bridge.add_rigid_body(TestBody::at(1, Vec3::ZERO), ALICE, false);
        bridge.add_rigid_body(TestBody::at(2, Vec3::ZERO), ALICE, true);
        bridge.add_rigid_body(TestBody::at(3, Vec3::ZERO), BOB, false);

        assert!(!bridge.body(BodyId(1)).unwrap().kinematic);
        assert!(bridge.body(BodyId(2)).unwrap().kinematic);
        assert!(bridge.body(BodyId(3)).unwrap().kinematic);
        assert!(bridge.is_locally_owned(BodyId(1)));
        assert!(!bridge.is_locally_owned(BodyId(3)));
        assert_eq!(bridge.snapshot_manager().owner_of(BodyId(3)), Some(BOB));
        assert_eq!(bridge.snapshot_manager().owner_of(BodyId(1)), None);
    }

    #[test]
    fn test_remove_returns_handle() {
        let mut bridge = bridge(ALICE);
        bridge.add_rigid_body(TestBody::at(3, Vec3::ZERO), BOB, false);
        assert_eq!(bridge.remove_rigid_body(BodyId(3)).unwrap().id, BodyId(3));
        assert!(bridge.remove_rigid_body(BodyId(3)).is_none());
        assert_eq!(bridge.snapshot_manager().owner_of(BodyId(3)), None);
    }

    #[test]
    fn test_unknown_body_errors() {
        let mut bridge = bridge(ALICE);
        assert!(matches!(
            bridge.set_owner(BALL, BOB),
            Err(Error::UnknownBody(id)) if id == BALL
        ));
        assert!(bridge.set_keyframed(BALL, true).is_err());
    }

    #[test]
    fn test_ownership_migration() {
        let mut bridge = bridge(ALICE);
        bridge.add_rigid_body(TestBody::at(10, Vec3::ZERO), ALICE, false);

        bridge.set_owner(BALL, BOB).unwrap();
        assert!(!bridge.is_locally_owned(BALL));
        assert!(bridge.body(BALL).unwrap().kinematic);
        assert_eq!(bridge.snapshot_manager().owner_of(BALL), Some(BOB));
        assert!(bridge.create_snapshot().is_none());

        bridge.set_owner(BALL, ALICE).unwrap();
        assert!(bridge.is_locally_owned(BALL));
        assert!(!bridge.body(BALL).unwrap().kinematic);
        assert_eq!(bridge.snapshot_manager().owner_of(BALL), None);
    }

    #[test]
    fn test_outgoing_motion_types() {
        let mut bridge = bridge(ALICE);
        bridge.add_rigid_body(TestBody::at(1, Vec3::ZERO), ALICE, false);
        bridge.add_rigid_body(TestBody::at(2, Vec3::ZERO).moving(Vec3::X), ALICE, false);
        bridge.add_rigid_body(TestBody::at(3, Vec3::ZERO), ALICE, true);
        bridge.add_rigid_body(TestBody::at(4, Vec3::ZERO), BOB, false);

        let mut last = None;
        for _ in 0..=10 {
            bridge.fixed_update(DT);
            bridge.body_mut(BodyId(2)).unwrap().integrate(DT);
            last = bridge.create_snapshot();
        }
        let snapshot = last.unwrap();

        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.get(BodyId(4)).is_none());
        assert_eq!(snapshot.get(BodyId(1)).unwrap().motion_type, MotionType::Sleeping);
        assert_eq!(snapshot.get(BodyId(2)).unwrap().motion_type, MotionType::Dynamic);
        assert_eq!(snapshot.get(BodyId(3)).unwrap().motion_type, MotionType::Keyframed);
        assert!((snapshot.time() - 11.0 * DT).abs() < 1e-4);
    }

    #[test]
    fn test_sleep_needs_consecutive_still_frames() {
        let mut bridge = bridge(ALICE);
        bridge.add_rigid_body(TestBody::at(1, Vec3::ZERO), ALICE, false);

        for _ in 0..10 {
            bridge.fixed_update(DT);
            let snapshot = bridge.create_snapshot().unwrap();
            assert_eq!(snapshot.transforms()[0].motion_type, MotionType::Dynamic);
        }
        bridge.fixed_update(DT);
        let snapshot = bridge.create_snapshot().unwrap();
        assert_eq!(snapshot.transforms()[0].motion_type, MotionType::Sleeping);

        bridge.body_mut(BodyId(1)).unwrap().transform.position = Vec3::Y;
        bridge.fixed_update(DT);
        let snapshot = bridge.create_snapshot().unwrap();
        assert_eq!(snapshot.transforms()[0].motion_type, MotionType::Dynamic);
    }

    #[test]
    fn test_jitter_reset_flags_one_snapshot() {
        let mut bridge = bridge(ALICE);
        bridge.add_rigid_body(TestBody::at(1, Vec3::ZERO), ALICE, false);

        bridge.request_jitter_reset();
        bridge.fixed_update(DT);
        assert!(bridge.create_snapshot().unwrap().resets_jitter_buffer());
        bridge.fixed_update(DT);
        assert!(!bridge.create_snapshot().unwrap().resets_jitter_buffer());
    }

    #[test]
    fn test_sender_feeds_fixed_update() {
        let mut bridge = PhysicsBridge::with_prediction(
            BOB,
            BodySyncConfig::default(),
            KeyframedPrediction,
        )
        .unwrap();
        bridge.add_rigid_body(TestBody::at(10, Vec3::ZERO), ALICE, false);

        let sender = bridge.snapshot_sender();
        sender.send(
            ALICE,
            Snapshot::at(
                0.0,
                vec![TransformInfo::new(
                    BALL,
                    MotionType::Dynamic,
                    bodysync_core::RigidBodyTransform::from_position(Vec3::new(4.0, 0.0, 0.0)),
                )],
            ),
        );
        bridge.fixed_update(DT);

        assert_eq!(bridge.body(BALL).unwrap().transform.position.x, 4.0);
        assert!(bridge.bodies().get(BALL).unwrap().remote_state().is_some());
    }

    #[test]
    fn test_body_added_to_settled_source_keeps_pose() {
        let mut bridge = bridge(BOB);
        bridge.add_rigid_body(TestBody::at(10, Vec3::ZERO), ALICE, false);
        bridge.add_snapshot(
            ALICE,
            Snapshot::at(
                0.0,
                vec![TransformInfo::new(
                    BALL,
                    MotionType::Sleeping,
                    bodysync_core::RigidBodyTransform::from_position(Vec3::X),
                )],
            ),
        );
        for _ in 0..3 {
            bridge.fixed_update(DT);
        }

        let late = BodyId(11);
        bridge.add_rigid_body(TestBody::at(11, Vec3::new(5.0, 0.0, 0.0)), ALICE, false);
        for _ in 0..3 {
            bridge.fixed_update(DT);
            assert_eq!(bridge.body(late).unwrap().transform.position.x, 5.0);
            assert_eq!(bridge.body(BALL).unwrap().transform.position.x, 1.0);
        }
        assert!(bridge.bodies().get(late).unwrap().remote_state().is_none());
    }

    #[test]
    fn test_end_to_end_replication() {
        let mut alice = bridge(ALICE);
        let mut bob = bridge(BOB);
        alice.add_rigid_body(
            TestBody::at(10, Vec3::ZERO).moving(Vec3::new(1.0, 0.0, 0.0)),
            ALICE,
            false,
        );
        bob.add_rigid_body(TestBody::at(10, Vec3::ZERO), ALICE, false);

        let mut bob_positions = Vec::new();
        for _ in 0..50 {
            alice.fixed_update(DT);
            alice.body_mut(BALL).unwrap().integrate(DT);
            if let Some(snapshot) = alice.create_snapshot() {
                bob.add_snapshot(ALICE, snapshot);
            }

            bob.fixed_update(DT);
            bob.body_mut(BALL).unwrap().integrate(DT);
            bob_positions.push(bob.body(BALL).unwrap().transform.position.x);
        }

        let alice_x = alice.body(BALL).unwrap().transform.position.x;
        let bob_ball = bob.body(BALL).unwrap();
        assert!(bob_ball.kinematic);
        assert!(bob_positions.windows(2).all(|w| w[0] <= w[1] + TIME_EPSILON));
        assert!(alice_x - bob_ball.transform.position.x < 0.15);
        assert!((bob_ball.linear_velocity.x - 1.0).abs() < 1e-2);
    }
}
