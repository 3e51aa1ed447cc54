//! Prediction policies for remotely owned bodies
//!
//! A [`Prediction`] runs once per fixed step after the snapshot manager and
//! decides how each remote body is driven:
//!
//! - [`KeyframedPrediction`]: always kinematic, pose taken from the snapshots
//! - [`InterpolationPrediction`]: kinematic until a local body is about to
//!   touch it, then released into local simulation and blended back
//!
//! # Collision window
//!
//! ```text
//!   Keyframed ──contact──▶ Colliding ──start──▶ Interpolating-back ──end──▶ Keyframed
//!       ▲                    │   ▲                    │
//!       │                    │   └──── re-contact ────┘
//!       └──── body moves out of reach and the window elapses ────────────────┘
//! ```
//!
//! The blend ratio rises linearly from 0 at `start_interpolating_back` to 1
//! at `end_interpolating_back`.

use crate::body::{BodySet, BridgeBody};
use crate::handle::RigidBodyHandle;
use bodysync_core::{BodyId, PredictionConfig, Quat, RigidBodyTransform, Vec3};
use bodysync_netcode::{CombinedEntry, CombinedSnapshot};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Policy driving remote bodies from the merged snapshot
pub trait Prediction {
    /// Drive every remote body for one fixed step
    fn predict_and_apply<B: RigidBodyHandle>(
        &mut self,
        timestep: f32,
        combined: &CombinedSnapshot,
        bodies: &mut BodySet<B>,
    );

    /// Forget all cross-step state
    fn reset(&mut self);
}

/// Make a body kinematic and copy the snapshot estimate onto it
///
/// Without an estimate the body holds its pose.
fn drive_keyframed<B: RigidBodyHandle>(handle: &mut B, entry: Option<&CombinedEntry>) {
    if !handle.is_kinematic() {
        handle.set_kinematic(true);
    }
    if let Some(entry) = entry {
        handle.set_transform(entry.transform);
        handle.set_linear_velocity(entry.linear_velocity);
        handle.set_angular_velocity(entry.angular_velocity);
    }
}

/// Remote bodies are driven entirely by the snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyframedPrediction;

impl Prediction for KeyframedPrediction {
    fn predict_and_apply<B: RigidBodyHandle>(
        &mut self,
        _timestep: f32,
        combined: &CombinedSnapshot,
        bodies: &mut BodySet<B>,
    ) {
        for body in bodies.remote_mut() {
            let id = body.handle().id();
            drive_keyframed(body.handle_mut(), combined.get(id));
        }
    }

    fn reset(&mut self) {}
}

/// Collision window bookkeeping of one remote body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionMonitorInfo {
    /// Seconds since the body (re)entered the colliding state
    pub time_from_start_collision: f32,
    /// Contact distance divided by the expanded radius sum, at least 0
    pub relative_distance: f32,
    /// Weight of the keyframed pose in the blend, in `[0, 1]`
    pub keyframed_interpolation_ratio: f32,
}

impl CollisionMonitorInfo {
    /// Field-wise minimum: the most actively colliding observation wins
    pub fn merge(self, other: Self) -> Self {
        Self {
            time_from_start_collision: self
                .time_from_start_collision
                .min(other.time_from_start_collision),
            relative_distance: self.relative_distance.min(other.relative_distance),
            keyframed_interpolation_ratio: self
                .keyframed_interpolation_ratio
                .min(other.keyframed_interpolation_ratio),
        }
    }
}

/// A contact detected during the current step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionSwitchInfo {
    pub rigid_body_id: BodyId,
    /// Pose the body is released from: this step's estimate, else its
    /// current pose
    pub start_position: Vec3,
    pub start_orientation: Quat,
    /// Latest keyframed velocity estimate
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub monitor_info: CollisionMonitorInfo,
    /// Whether the body was kinematic when the contact was detected
    pub is_keyframed: bool,
}

/// Releases remote bodies into local simulation around contacts
#[derive(Debug, Clone, Default)]
pub struct InterpolationPrediction {
    config: PredictionConfig,
    monitor: HashMap<BodyId, CollisionMonitorInfo>,
    contacts: Vec<CollisionSwitchInfo>,
}

impl InterpolationPrediction {
    pub fn new(config: PredictionConfig) -> Self {
        Self {
            config,
            monitor: HashMap::new(),
            contacts: Vec::new(),
        }
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// Collision window state of a remote body, if it is not keyframed
    pub fn monitor_info(&self, id: BodyId) -> Option<&CollisionMonitorInfo> {
        self.monitor.get(&id)
    }

    /// Number of remote bodies currently inside a collision window
    pub fn monitored_count(&self) -> usize {
        self.monitor.len()
    }

    /// Contacts detected during the last step, ascending by remote body id
    pub fn contacts(&self) -> &[CollisionSwitchInfo] {
        &self.contacts
    }

    /// Relative contact distance between a local and a remote body
    ///
    /// Uses the smaller of the current distance and the distance after one
    /// step at current velocities. `None` when out of reach.
    fn relative_distance<B: RigidBodyHandle>(
        &self,
        local: &B,
        remote: &B,
        remote_velocity: Vec3,
        timestep: f32,
    ) -> Option<f32> {
        let reach =
            (local.bounding_radius() + remote.bounding_radius()) * self.config.radius_expansion;
        if reach <= 0.0 {
            return None;
        }

        let local_pos = local.transform().position;
        let remote_pos = remote.transform().position;
        let current = remote
            .closest_point(local_pos)
            .distance(local.closest_point(remote_pos));

        // Volumes are queried at their current pose, then translated.
        let local_step = local.linear_velocity() * timestep;
        let remote_step = remote_velocity * timestep;
        let on_remote = remote.closest_point(local_pos + local_step - remote_step) + remote_step;
        let on_local = local.closest_point(remote_pos + remote_step - local_step) + local_step;
        let projected = on_remote.distance(on_local);

        let distance = current.min(projected);
        (distance < reach).then(|| (distance / reach).max(0.0))
    }

    /// Monitor record of a body triggered this step
    fn triggered_info(
        &self,
        previous: Option<&CollisionMonitorInfo>,
        relative_distance: f32,
        timestep: f32,
    ) -> CollisionMonitorInfo {
        let config = &self.config;
        match previous {
            None => CollisionMonitorInfo {
                time_from_start_collision: 0.0,
                relative_distance,
                keyframed_interpolation_ratio: 0.0,
            },
            Some(p) if p.time_from_start_collision < config.start_interpolating_back => {
                CollisionMonitorInfo {
                    time_from_start_collision: p.time_from_start_collision + timestep,
                    relative_distance,
                    keyframed_interpolation_ratio: p.keyframed_interpolation_ratio,
                }
            }
            Some(p)
                if relative_distance < config.close_relative_distance
                    && p.keyframed_interpolation_ratio > config.committed_ratio =>
            {
                CollisionMonitorInfo {
                    time_from_start_collision: config.end_interpolating_back,
                    relative_distance,
                    keyframed_interpolation_ratio: 1.0,
                }
            }
            // Re-entry: half a step keeps it clear of a second hand-off.
            Some(_) => CollisionMonitorInfo {
                time_from_start_collision: timestep * 0.5,
                relative_distance,
                keyframed_interpolation_ratio: 0.0,
            },
        }
    }

    /// Age a record that was not triggered this step
    ///
    /// Returns `None` once the window has elapsed.
    fn aged_info(
        &self,
        info: &CollisionMonitorInfo,
        timestep: f32,
    ) -> Option<CollisionMonitorInfo> {
        let config = &self.config;
        let time = info.time_from_start_collision + timestep;
        if time >= config.end_interpolating_back {
            return None;
        }
        let mut ratio = info.keyframed_interpolation_ratio;
        if time > config.start_interpolating_back {
            let progress =
                (time - config.start_interpolating_back) / config.interpolation_window();
            ratio = ratio.max(progress.min(1.0));
        }
        Some(CollisionMonitorInfo {
            time_from_start_collision: time,
            relative_distance: info.relative_distance,
            keyframed_interpolation_ratio: ratio,
        })
    }

    /// Find every contact between a local and a remote body
    fn detect_contacts<B: RigidBodyHandle>(
        &self,
        previous: &HashMap<BodyId, CollisionMonitorInfo>,
        timestep: f32,
        combined: &CombinedSnapshot,
        bodies: &BodySet<B>,
    ) -> BTreeMap<BodyId, CollisionSwitchInfo> {
        let mut contacts: BTreeMap<BodyId, CollisionSwitchInfo> = BTreeMap::new();

        for local in bodies.local() {
            for remote in bodies.remote() {
                // Owner-driven bodies are never simulated here.
                if remote.is_remote_keyframed() {
                    continue;
                }
                let handle = remote.handle();
                let id = handle.id();
                let (linear, angular) = keyframed_velocity(remote, combined.get(id));
                let remote_velocity = if handle.is_kinematic() {
                    linear
                } else {
                    handle.linear_velocity()
                };

                let Some(relative_distance) =
                    self.relative_distance(local.handle(), handle, remote_velocity, timestep)
                else {
                    continue;
                };
                let info = self.triggered_info(previous.get(&id), relative_distance, timestep);

                contacts
                    .entry(id)
                    .and_modify(|c| c.monitor_info = c.monitor_info.merge(info))
                    .or_insert_with(|| {
                        let pose = combined
                            .get(id)
                            .map_or_else(|| handle.transform(), |e| e.transform);
                        CollisionSwitchInfo {
                            rigid_body_id: id,
                            start_position: pose.position,
                            start_orientation: pose.rotation,
                            linear_velocity: linear,
                            angular_velocity: angular,
                            monitor_info: info,
                            is_keyframed: handle.is_kinematic(),
                        }
                    });
            }
        }
        contacts
    }

    fn hand_off<B: RigidBodyHandle>(handle: &mut B, contact: &CollisionSwitchInfo) {
        handle.set_kinematic(false);
        handle.set_transform(RigidBodyTransform::new(
            contact.start_position,
            contact.start_orientation,
        ));
        handle.set_linear_velocity(contact.linear_velocity);
        handle.set_angular_velocity(contact.angular_velocity);
        debug!(body = %contact.rigid_body_id, "remote body released to local simulation");
    }

    /// Pull a dynamic body toward its keyframed pose
    fn blend<B: RigidBodyHandle>(
        &self,
        handle: &mut B,
        info: &CollisionMonitorInfo,
        target: Option<&CombinedEntry>,
    ) {
        if handle.is_kinematic() {
            handle.set_kinematic(false);
        }
        let ratio = info.keyframed_interpolation_ratio;
        if ratio <= 0.0 {
            return;
        }

        if let Some(target) = target {
            let current = handle.transform();
            let blended = RigidBodyTransform::lerp(&current, &target.transform, ratio);
            if blended.position.distance(current.position) > self.config.position_epsilon
                || blended.angle_between(&current) > self.config.angle_epsilon
            {
                handle.set_transform(blended);
            }
        }

        if ratio > self.config.damping_ratio_threshold {
            let damping = self.config.velocity_damping;
            handle.set_linear_velocity(handle.linear_velocity() * damping);
            handle.set_angular_velocity(handle.angular_velocity() * damping);
        }
    }
}

/// Latest keyframed velocity estimate of a remote body
fn keyframed_velocity<B: RigidBodyHandle>(
    body: &BridgeBody<B>,
    entry: Option<&CombinedEntry>,
) -> (Vec3, Vec3) {
    match entry.or(body.remote_state()) {
        Some(estimate) => (estimate.linear_velocity, estimate.angular_velocity),
        None => (body.handle().linear_velocity(), body.handle().angular_velocity()),
    }
}

impl Prediction for InterpolationPrediction {
    fn predict_and_apply<B: RigidBodyHandle>(
        &mut self,
        timestep: f32,
        combined: &CombinedSnapshot,
        bodies: &mut BodySet<B>,
    ) {
        if !(timestep.is_finite() && timestep > 0.0) {
            return;
        }
        let half_step = timestep * 0.5;
        let previous = std::mem::take(&mut self.monitor);
        let contacts = self.detect_contacts(&previous, timestep, combined, bodies);

        for (id, contact) in &contacts {
            self.monitor.insert(*id, contact.monitor_info);
        }
        for (id, info) in &previous {
            if self.monitor.contains_key(id) {
                continue;
            }
            let still_remote = bodies
                .get(*id)
                .is_some_and(|b| bodies.is_remote(*id) && !b.is_remote_keyframed());
            if !still_remote {
                continue;
            }
            match self.aged_info(info, timestep) {
                Some(aged) => {
                    self.monitor.insert(*id, aged);
                }
                None => trace!(body = %id, "collision window elapsed"),
            }
        }

        for body in bodies.remote_mut() {
            let id = body.handle().id();
            let entry = combined.get(id);
            match self.monitor.get(&id) {
                None => {
                    if !body.handle().is_kinematic() {
                        debug!(body = %id, "remote body returned to keyframed");
                    }
                    drive_keyframed(body.handle_mut(), entry);
                }
                Some(info) if info.time_from_start_collision < half_step => {
                    if let Some(contact) = contacts.get(&id) {
                        Self::hand_off(body.handle_mut(), contact);
                    }
                }
                Some(info) => {
                    let target = entry.copied().or(body.remote_state().copied());
                    self.blend(body.handle_mut(), info, target.as_ref());
                }
            }
        }

        self.contacts = contacts.into_values().collect();
    }

    fn reset(&mut self) {
        self.monitor.clear();
        self.contacts.clear();
    }
}
