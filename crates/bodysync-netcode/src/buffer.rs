//! Per-source snapshot jitter buffer
//!
//! A [`SnapshotBuffer`] stores the snapshots received from one remote source
//! and replays them through a virtual playback cursor that advances once per
//! physics step. For every registered body it produces the best available
//! estimate at the cursor: an exact snapshot value, an interpolation between
//! the two snapshots surrounding the cursor, or the held previous state.
//!
//! # Playback timeline
//!
//! ```text
//!  consumed            applied        cursor           buffered
//!  ───x────x────x──────────x────────────┼────────x────────x────▶ source time
//!                          │◀── interp ─▶│        │
//!                          t0            t       t1 ... last_snapshot_local_time
//! ```
//!
//! The cursor speed adapts to the network: a health average slows it down
//! when data stops flowing, the buffered lead is capped, and an availability
//! histogram trades a few milliseconds of latency for smoothness.

use crate::stats::{AvailabilityHistogram, RunningAverage};
use bodysync_core::time::{at_or_before, strictly_after, times_equal};
use bodysync_core::{
    angular_velocity_between, BodyId, BufferConfig, LocalTime, MotionType, RigidBodyTransform,
    Snapshot, TransformInfo, Vec3,
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Latest estimate for one registered body
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBodyData {
    /// Body this record belongs to
    pub id: BodyId,
    /// Estimated pose
    pub transform: RigidBodyTransform,
    /// Estimated linear velocity
    pub linear_velocity: Vec3,
    /// Estimated angular velocity (axis × rad/s)
    pub angular_velocity: Vec3,
    /// Last reported motion type
    pub motion_type: MotionType,
    /// Whether the estimate was refreshed during the last step
    pub updated: bool,
    /// Source time the estimate refers to
    pub local_time: LocalTime,
    /// Whether any sample was ever applied
    initialized: bool,
    /// Last exactly applied sample, for finite-difference velocities
    previous_sample: Option<(LocalTime, RigidBodyTransform)>,
}

impl RigidBodyData {
    fn new(id: BodyId) -> Self {
        Self {
            id,
            transform: RigidBodyTransform::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            motion_type: MotionType::Dynamic,
            updated: false,
            local_time: 0.0,
            initialized: false,
            previous_sample: None,
        }
    }

    /// Check if the body ever received data
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn apply_exact(&mut self, time: LocalTime, info: &TransformInfo) {
        let (linear, angular) = match self.previous_sample {
            Some((prev_time, prev)) if time - prev_time > f32::EPSILON => {
                let dt = time - prev_time;
                (
                    (info.transform.position - prev.position) / dt,
                    angular_velocity_between(prev.rotation, info.transform.rotation, dt),
                )
            }
            _ => (Vec3::ZERO, Vec3::ZERO),
        };

        self.set_estimate(time, info.transform, info.motion_type, linear, angular);
        self.previous_sample = Some((time, info.transform));
    }

    fn apply_interpolated(
        &mut self,
        time: LocalTime,
        from: &TransformInfo,
        to: &TransformInfo,
        fraction: f32,
        span: LocalTime,
    ) {
        let transform = RigidBodyTransform::lerp(&from.transform, &to.transform, fraction);
        let linear = (to.transform.position - from.transform.position) / span;
        let angular = angular_velocity_between(from.transform.rotation, to.transform.rotation, span);
        let motion_type = if from.motion_type.is_sleeping() {
            to.motion_type
        } else {
            from.motion_type
        };

        self.set_estimate(time, transform, motion_type, linear, angular);
    }

    fn set_estimate(
        &mut self,
        time: LocalTime,
        transform: RigidBodyTransform,
        motion_type: MotionType,
        linear: Vec3,
        angular: Vec3,
    ) {
        self.transform = transform;
        self.motion_type = motion_type;
        if motion_type.is_sleeping() {
            self.linear_velocity = Vec3::ZERO;
            self.angular_velocity = Vec3::ZERO;
        } else {
            self.linear_velocity = linear;
            self.angular_velocity = angular;
        }
        self.local_time = time;
        self.updated = true;
        self.initialized = true;
    }

    fn hold_sleeping(&mut self, time: LocalTime) {
        self.linear_velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        self.local_time = time;
        self.updated = true;
    }
}

/// Deferred change to the registered body set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAction {
    Register,
    Unregister,
}

/// Forward-only lookup over a buffer's bodies
///
/// Queries in ascending id order walk the body list once. An out-of-order
/// query still answers correctly through a binary search.
#[derive(Debug, Clone)]
pub struct BodyCursor<'a> {
    bodies: &'a [RigidBodyData],
    index: usize,
}

impl<'a> BodyCursor<'a> {
    /// Find the record of a body
    pub fn find(&mut self, id: BodyId) -> Option<&'a RigidBodyData> {
        let bodies = self.bodies;
        if let Some(body) = bodies.get(self.index) {
            if body.id > id {
                return bodies
                    .binary_search_by_key(&id, |b| b.id)
                    .ok()
                    .map(|i| &bodies[i]);
            }
        }
        while self.index < bodies.len() && bodies[self.index].id < id {
            self.index += 1;
        }
        bodies.get(self.index).filter(|b| b.id == id)
    }
}

/// Jitter buffer and playback cursor for a single remote source
#[derive(Debug)]
pub struct SnapshotBuffer {
    config: BufferConfig,
    /// Unconsumed snapshots, ascending by time
    snapshots: Vec<Snapshot>,
    /// Most recent exactly applied snapshot (interpolation start)
    last_applied: Option<Snapshot>,
    /// Time of the most recent applied snapshot; older arrivals are stale
    last_applied_time: Option<LocalTime>,
    /// Registered bodies, ascending by id
    bodies: Vec<RigidBodyData>,
    pending_actions: BTreeMap<BodyId, PendingAction>,
    current_local_time: Option<LocalTime>,
    last_snapshot_local_time: Option<LocalTime>,
    /// `last_snapshot_local_time` as seen by the previous step
    previous_last_snapshot_time: Option<LocalTime>,
    health: RunningAverage,
    network_healthy: bool,
    /// Health crossed back above the threshold during this step
    recovered: bool,
    histogram: AvailabilityHistogram,
    reset_pending: bool,
    /// All bodies were sleeping at the end of the last step
    settled: bool,
    has_update: bool,
}

impl SnapshotBuffer {
    /// Create an empty buffer
    pub fn new(config: BufferConfig) -> Self {
        let health = RunningAverage::new(config.health_samples, 1.0);
        let histogram = AvailabilityHistogram::new(
            config.histogram_slots,
            config.histogram_samples,
            config.histogram_initial,
        );
        Self {
            config,
            snapshots: Vec::new(),
            last_applied: None,
            last_applied_time: None,
            bodies: Vec::new(),
            pending_actions: BTreeMap::new(),
            current_local_time: None,
            last_snapshot_local_time: None,
            previous_last_snapshot_time: None,
            health,
            network_healthy: true,
            recovered: false,
            histogram,
            reset_pending: false,
            settled: false,
            has_update: false,
        }
    }

    /// Store a received snapshot
    ///
    /// Duplicates (same time within epsilon) and snapshots at or before the
    /// last applied time are dropped. Returns whether the snapshot was kept.
    pub fn add_snapshot(&mut self, snapshot: Snapshot) -> bool {
        let time = snapshot.time();
        let eps = self.config.time_epsilon;
        if !time.is_finite() {
            trace!(time, "dropping snapshot with non-finite time");
            return false;
        }

        if snapshot.resets_jitter_buffer() {
            if self.snapshots.iter().any(|s| times_equal(s.time(), time, eps)) {
                trace!(time, "dropping duplicate reset snapshot");
                return false;
            }
            // Anything older than a reset belongs to the previous timeline.
            self.snapshots.retain(|s| strictly_after(s.time(), time, eps));
            self.snapshots.insert(0, snapshot);
            self.last_snapshot_local_time = self.snapshots.last().map(|s| s.time());
            self.last_applied_time = None;
            self.reset_pending = true;
            debug!(time, "jitter buffer reset requested");
            return true;
        }

        if let Some(applied) = self.last_applied_time {
            if at_or_before(time, applied, eps) {
                trace!(time, applied, "dropping stale snapshot");
                return false;
            }
        }
        if self.reset_pending {
            if let Some(first) = self.snapshots.first() {
                if time < first.time() {
                    trace!(time, "dropping snapshot older than pending reset");
                    return false;
                }
            }
        }

        let index = self.snapshots.partition_point(|s| s.time() < time);
        let duplicate = [index.checked_sub(1), Some(index)]
            .into_iter()
            .flatten()
            .filter_map(|i| self.snapshots.get(i))
            .any(|s| times_equal(s.time(), time, eps));
        if duplicate {
            trace!(time, "dropping duplicate snapshot");
            return false;
        }

        self.snapshots.insert(index, snapshot);
        self.last_snapshot_local_time = Some(match self.last_snapshot_local_time {
            Some(last) => last.max(time),
            None => time,
        });
        true
    }

    /// Queue registration of a body for the next step
    pub fn register_rigid_body(&mut self, id: BodyId) {
        self.pending_actions.insert(id, PendingAction::Register);
    }

    /// Queue removal of a body for the next step
    pub fn unregister_rigid_body(&mut self, id: BodyId) {
        self.pending_actions.insert(id, PendingAction::Unregister);
    }

    /// Advance the buffer by one physics step
    ///
    /// Returns whether any body received an update.
    pub fn step(&mut self, timestep: f32) -> bool {
        let timestep = if timestep.is_finite() {
            timestep.max(0.0)
        } else {
            0.0
        };

        self.apply_pending_actions();
        for body in &mut self.bodies {
            body.updated = false;
        }
        self.has_update = false;
        // A body registered since the last step has no sample to hold.
        self.settled &= self.all_sleeping();

        let Some(last) = self.last_snapshot_local_time else {
            return false;
        };

        if self.reset_pending {
            self.apply_reset();
        }

        let first_data = self.previous_last_snapshot_time.is_none();
        let received_update_time = self
            .previous_last_snapshot_time
            .map(|prev| last - prev)
            .unwrap_or(0.0);
        let received_new = first_data || received_update_time != 0.0;
        self.previous_last_snapshot_time = Some(last);

        if self.settled && !received_new && self.snapshots.is_empty() {
            let time = self.current_local_time.unwrap_or(last);
            for body in &mut self.bodies {
                body.hold_sleeping(time);
            }
            self.has_update = true;
            return true;
        }

        self.recovered = false;
        if !first_data {
            self.sample_network_health(received_update_time, timestep);
        }

        let target = match self.current_local_time {
            None => self.snapshots.first().map(|s| s.time()).unwrap_or(last),
            Some(current) => self.next_cursor(current, last, timestep),
        };
        self.current_local_time = Some(target);

        self.apply_snapshots(target);

        for body in &mut self.bodies {
            if !body.updated && body.initialized && body.motion_type.is_sleeping() {
                body.hold_sleeping(target);
            }
        }

        self.settled = self.all_sleeping();
        self.has_update = self.bodies.iter().any(|b| b.updated);
        self.has_update
    }

    /// Every body holds a sleeping sample
    fn all_sleeping(&self) -> bool {
        !self.bodies.is_empty()
            && self
                .bodies
                .iter()
                .all(|b| b.initialized && b.motion_type.is_sleeping())
    }

    fn apply_pending_actions(&mut self) {
        if self.pending_actions.is_empty() {
            return;
        }
        let actions = std::mem::take(&mut self.pending_actions);
        let mut existing = std::mem::take(&mut self.bodies).into_iter().peekable();
        let mut merged = Vec::with_capacity(existing.len() + actions.len());

        for (id, action) in actions {
            while let Some(body) = existing.next_if(|b| b.id < id) {
                merged.push(body);
            }
            let current = existing.next_if(|b| b.id == id);
            match action {
                PendingAction::Register => {
                    merged.push(current.unwrap_or_else(|| RigidBodyData::new(id)));
                }
                PendingAction::Unregister => {
                    if current.is_some() {
                        trace!(body = %id, "body unregistered from snapshot buffer");
                    }
                }
            }
        }
        merged.extend(existing);
        self.bodies = merged;
    }

    fn apply_reset(&mut self) {
        self.reset_pending = false;
        self.last_applied = None;
        self.current_local_time = None;
        self.previous_last_snapshot_time = None;
        self.settled = false;
        self.histogram.reset(self.config.histogram_initial);
        for body in &mut self.bodies {
            body.previous_sample = None;
        }
        debug!("jitter buffer reset applied");
    }

    fn sample_network_health(&mut self, received_update_time: LocalTime, timestep: f32) {
        if timestep <= 0.0 {
            return;
        }
        let sample = (received_update_time / timestep).clamp(0.0, self.config.health_sample_cap);
        self.health.add(sample);

        let healthy = self.health.value() >= self.config.health_threshold;
        if healthy != self.network_healthy {
            self.recovered = healthy;
            debug!(
                health = self.health.value(),
                healthy, "snapshot source network health changed"
            );
        }
        self.network_healthy = healthy;
    }

    /// Choose the next cursor position
    fn next_cursor(&mut self, current: LocalTime, last: LocalTime, timestep: f32) -> LocalTime {
        let mut candidate = current + timestep;

        if !self.network_healthy {
            candidate = current + timestep * self.config.unhealthy_step_ratio;
        } else if last - candidate > self.config.max_buffer_lead {
            let catch_up = last - self.config.max_buffer_lead;
            candidate = if self.recovered {
                catch_up
            } else {
                catch_up.min(current + timestep * self.config.max_catch_up_ratio)
            };
        }

        candidate = self.adjust_rate(candidate, last, timestep);
        candidate.min(last).max(current)
    }

    /// Feed the availability histogram and shift the rate by a sub-step
    fn adjust_rate(&mut self, candidate: LocalTime, last: LocalTime, timestep: f32) -> LocalTime {
        let sub_step = timestep / self.config.sub_steps_per_tick as f32;
        let eps = self.config.time_epsilon;
        self.histogram
            .record(|offset| at_or_before(candidate + offset as f32 * sub_step, last, eps));

        let current = self.histogram.current();
        if current < self.config.slow_down_threshold && self.histogram.slower() >= current {
            self.histogram.shift_slower();
            trace!(availability = current, "slowing playback by one sub-step");
            candidate - sub_step
        } else if self.histogram.faster() > self.config.speed_up_threshold {
            self.histogram.shift_faster();
            trace!(
                availability = self.histogram.current(),
                "speeding playback up by one sub-step"
            );
            candidate + sub_step
        } else {
            candidate
        }
    }

    /// Apply every snapshot up to `target`, then interpolate toward the next
    fn apply_snapshots(&mut self, target: LocalTime) {
        let eps = self.config.time_epsilon;
        let ready = self
            .snapshots
            .partition_point(|s| at_or_before(s.time(), target, eps));

        for snapshot in self.snapshots.drain(..ready) {
            apply_exact(&mut self.bodies, &snapshot);
            self.last_applied_time = Some(snapshot.time());
            self.last_applied = Some(snapshot);
        }

        if let (Some(from), Some(to)) = (&self.last_applied, self.snapshots.first()) {
            if strictly_after(target, from.time(), eps) {
                let span = to.time() - from.time();
                let fraction = (target - from.time()) / span;
                apply_interpolated(&mut self.bodies, from, to, fraction, target);
            }
        }
    }

    /// Whether any body was updated by the last step
    pub fn has_update(&self) -> bool {
        self.has_update
    }

    /// Playback cursor; `None` until playback starts
    pub fn current_local_time(&self) -> Option<LocalTime> {
        self.current_local_time
    }

    /// Newest snapshot time ever received
    pub fn last_snapshot_local_time(&self) -> Option<LocalTime> {
        self.last_snapshot_local_time
    }

    /// Time of the most recently applied snapshot
    pub fn last_applied_time(&self) -> Option<LocalTime> {
        self.last_applied_time
    }

    /// Number of snapshots waiting to be applied
    pub fn pending_snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if the network currently counts as healthy
    pub fn is_network_healthy(&self) -> bool {
        self.network_healthy
    }

    /// Current network health average
    pub fn network_health(&self) -> f32 {
        self.health.value()
    }

    /// Registered bodies, ascending by id
    pub fn rigid_bodies(&self) -> &[RigidBodyData] {
        &self.bodies
    }

    /// Check if a body is registered (pending actions not included)
    pub fn contains(&self, id: BodyId) -> bool {
        self.get(id).is_some()
    }

    /// Look up one body
    pub fn get(&self, id: BodyId) -> Option<&RigidBodyData> {
        self.bodies
            .binary_search_by_key(&id, |b| b.id)
            .ok()
            .map(|i| &self.bodies[i])
    }

    /// Start an ascending-order lookup pass
    pub fn cursor(&self) -> BodyCursor<'_> {
        BodyCursor {
            bodies: &self.bodies,
            index: 0,
        }
    }
}

/// Copy a snapshot's transforms onto the matching bodies
fn apply_exact(bodies: &mut [RigidBodyData], snapshot: &Snapshot) {
    let mut index = 0;
    for info in snapshot.transforms() {
        while index < bodies.len() && bodies[index].id < info.id {
            index += 1;
        }
        match bodies.get_mut(index) {
            Some(body) if body.id == info.id => body.apply_exact(snapshot.time(), info),
            Some(_) => {}
            None => break,
        }
    }
}

/// Blend two snapshots onto the bodies present in both
fn apply_interpolated(
    bodies: &mut [RigidBodyData],
    from: &Snapshot,
    to: &Snapshot,
    fraction: f32,
    time: LocalTime,
) {
    let span = to.time() - from.time();
    let (from_infos, to_infos) = (from.transforms(), to.transforms());
    let (mut fi, mut ti) = (0, 0);

    for body in bodies.iter_mut() {
        while fi < from_infos.len() && from_infos[fi].id < body.id {
            fi += 1;
        }
        while ti < to_infos.len() && to_infos[ti].id < body.id {
            ti += 1;
        }
        let a = from_infos.get(fi).filter(|t| t.id == body.id);
        let b = to_infos.get(ti).filter(|t| t.id == body.id);
        if let (Some(a), Some(b)) = (a, b) {
            body.apply_interpolated(time, a, b, fraction, span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bodysync_core::{Quat, SnapshotFlags};

    const BODY: BodyId = BodyId(1);

    fn snapshot_at(time: f32, x: f32, motion_type: MotionType) -> Snapshot {
        Snapshot::at(
            time,
            vec![TransformInfo::new(
                BODY,
                motion_type,
                RigidBodyTransform::from_position(Vec3::new(x, 0.0, 0.0)),
            )],
        )
    }

    fn buffer_with_body() -> SnapshotBuffer {
        let mut buffer = SnapshotBuffer::new(BufferConfig::default());
        buffer.register_rigid_body(BODY);
        buffer
    }

    #[test]
    fn test_duplicate_suppression() {
        let mut buffer = buffer_with_body();

        assert!(buffer.add_snapshot(snapshot_at(0.5, 0.0, MotionType::Dynamic)));
        assert!(!buffer.add_snapshot(snapshot_at(0.5, 3.0, MotionType::Dynamic)));
        assert!(!buffer.add_snapshot(snapshot_at(0.5004, 3.0, MotionType::Dynamic)));

        assert_eq!(buffer.pending_snapshot_count(), 1);
        assert_eq!(buffer.last_snapshot_local_time(), Some(0.5));
    }

    #[test]
    fn test_no_data_means_no_update() {
        let mut buffer = buffer_with_body();
        assert!(!buffer.step(0.02));
        assert!(!buffer.has_update());
        assert_eq!(buffer.current_local_time(), None);
        assert!(buffer.contains(BODY));
    }

    #[test]
    fn test_end_to_end_playback() {
        let mut buffer = buffer_with_body();
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        buffer.add_snapshot(snapshot_at(0.1, 1.0, MotionType::Dynamic));

        let mut times = Vec::new();
        let mut positions = Vec::new();
        for _ in 0..4 {
            if buffer.step(0.05) {
                let body = buffer.get(BODY).unwrap();
                times.push(body.local_time);
                positions.push(body.transform.position.x);
            }
        }

        assert_eq!(times.len(), 3);
        assert!(times[0].abs() < 1e-4);
        assert!((0.03..=0.05 + 1e-4).contains(&times[1]));
        assert!((0.08..=0.1 + 1e-4).contains(&times[2]));
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!((positions[2] - 1.0).abs() < 1e-5);

        // Cursor stays at the newest data once it is exhausted.
        assert!(buffer.current_local_time().unwrap() <= 0.1 + 1e-4);
        assert!(!buffer.get(BODY).unwrap().updated);
    }

    #[test]
    fn test_interpolation_correctness() {
        let mut buffer = buffer_with_body();
        let rotated = Quat::from_rotation_y(1.0);
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        buffer.add_snapshot(Snapshot::at(
            0.1,
            vec![TransformInfo::new(
                BODY,
                MotionType::Dynamic,
                RigidBodyTransform::new(Vec3::new(2.0, 0.0, 0.0), rotated),
            )],
        ));

        buffer.step(0.05);
        buffer.step(0.05);

        let body = buffer.get(BODY).unwrap();
        assert!(body.updated);
        assert!((body.transform.position - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
        let expected = Quat::IDENTITY.slerp(rotated, 0.5);
        assert!(body.transform.rotation.angle_between(expected) < 1e-3);
        assert!((body.linear_velocity - Vec3::new(20.0, 0.0, 0.0)).length() < 1e-3);
        assert!((body.angular_velocity - Vec3::new(0.0, 10.0, 0.0)).length() < 1e-2);
    }

    #[test]
    fn test_exact_velocity_from_finite_difference() {
        let mut buffer = buffer_with_body();
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        buffer.add_snapshot(snapshot_at(0.05, 0.5, MotionType::Dynamic));

        buffer.step(0.05);
        assert_eq!(buffer.get(BODY).unwrap().linear_velocity, Vec3::ZERO);

        buffer.step(0.05);
        let body = buffer.get(BODY).unwrap();
        assert!((body.transform.position.x - 0.5).abs() < 1e-6);
        assert!((body.linear_velocity.x - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_monotonic_consumption() {
        let mut buffer = buffer_with_body();
        let count = 20;
        // Deterministic shuffle: 7 is coprime with 20.
        let order: Vec<usize> = (0..count).map(|i| (i * 7) % count).collect();

        let mut applied = Vec::new();
        for (n, &i) in order.iter().enumerate() {
            buffer.add_snapshot(snapshot_at(i as f32 * 0.02, i as f32, MotionType::Dynamic));
            if n % 3 == 2 {
                buffer.step(0.02);
                applied.extend(buffer.last_applied_time());
            }
        }
        for _ in 0..60 {
            buffer.step(0.02);
            applied.extend(buffer.last_applied_time());
        }

        assert!(!applied.is_empty());
        assert!(applied.windows(2).all(|w| w[0] <= w[1]));
        assert!((applied.last().unwrap() - 0.38).abs() < 1e-4);
        assert_eq!(buffer.pending_snapshot_count(), 0);
    }

    #[test]
    fn test_stale_snapshot_dropped() {
        let mut buffer = buffer_with_body();
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        buffer.add_snapshot(snapshot_at(0.05, 1.0, MotionType::Dynamic));
        buffer.step(0.05);
        buffer.step(0.05);

        assert_eq!(buffer.last_applied_time(), Some(0.05));
        assert!(!buffer.add_snapshot(snapshot_at(0.02, 9.0, MotionType::Dynamic)));
        assert!(buffer.add_snapshot(snapshot_at(0.1, 2.0, MotionType::Dynamic)));
    }

    #[test]
    fn test_sleeping_shortcut_holds_cursor() {
        let mut buffer = buffer_with_body();
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        buffer.add_snapshot(snapshot_at(0.05, 1.0, MotionType::Sleeping));

        buffer.step(0.05);
        buffer.step(0.05);
        let settled_time = buffer.current_local_time();
        assert_eq!(buffer.get(BODY).unwrap().motion_type, MotionType::Sleeping);

        for _ in 0..10 {
            assert!(buffer.step(0.05));
            assert_eq!(buffer.current_local_time(), settled_time);
            let body = buffer.get(BODY).unwrap();
            assert!(body.updated);
            assert_eq!(body.linear_velocity, Vec3::ZERO);
            assert_eq!(body.transform.position.x, 1.0);
        }
    }

    #[test]
    fn test_sleeping_body_absent_from_snapshot_still_updated() {
        let other = BodyId::new(2);
        let mut buffer = buffer_with_body();
        buffer.register_rigid_body(other);

        buffer.add_snapshot(Snapshot::at(
            0.0,
            vec![
                TransformInfo::new(BODY, MotionType::Sleeping, RigidBodyTransform::IDENTITY),
                TransformInfo::new(other, MotionType::Dynamic, RigidBodyTransform::IDENTITY),
            ],
        ));
        buffer.add_snapshot(Snapshot::at(
            0.05,
            vec![TransformInfo::new(
                other,
                MotionType::Dynamic,
                RigidBodyTransform::from_position(Vec3::X),
            )],
        ));
        buffer.add_snapshot(Snapshot::at(0.1, Vec::new()));

        buffer.step(0.05);
        buffer.step(0.05);
        assert!(buffer.get(BODY).unwrap().updated);
        assert!(buffer.get(other).unwrap().updated);

        buffer.step(0.05);
        assert!(buffer.get(BODY).unwrap().updated);
        assert!(!buffer.get(other).unwrap().updated);
    }

    #[test]
    fn test_future_only_snapshot_holds() {
        let other = BodyId::new(2);
        let mut buffer = buffer_with_body();
        buffer.register_rigid_body(other);
        buffer.add_snapshot(Snapshot::at(
            0.0,
            vec![TransformInfo::new(
                other,
                MotionType::Dynamic,
                RigidBodyTransform::IDENTITY,
            )],
        ));
        buffer.add_snapshot(snapshot_at(0.1, 1.0, MotionType::Dynamic));

        buffer.step(0.05);
        buffer.step(0.05);
        // BODY only exists in the future snapshot: nothing to interpolate from.
        let body = buffer.get(BODY).unwrap();
        assert!(!body.updated);
        assert!(!body.is_initialized());
    }

    #[test]
    fn test_reset_applies_exactly() {
        let mut buffer = buffer_with_body();
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        buffer.add_snapshot(snapshot_at(0.05, 1.0, MotionType::Dynamic));
        buffer.step(0.05);
        buffer.step(0.05);

        let reset = Snapshot::new(
            5.0,
            SnapshotFlags::ResetJitterBuffer,
            vec![TransformInfo::new(
                BODY,
                MotionType::Dynamic,
                RigidBodyTransform::from_position(Vec3::new(10.0, 0.0, 0.0)),
            )],
        );
        assert!(buffer.add_snapshot(reset));
        assert!(buffer.step(0.05));

        let body = buffer.get(BODY).unwrap();
        assert_eq!(buffer.current_local_time(), Some(5.0));
        assert_eq!(body.transform.position.x, 10.0);
        assert_eq!(body.linear_velocity, Vec3::ZERO);
    }

    #[test]
    fn test_pending_actions_last_write_wins() {
        let mut buffer = SnapshotBuffer::new(BufferConfig::default());
        buffer.register_rigid_body(BODY);
        buffer.unregister_rigid_body(BODY);
        buffer.register_rigid_body(BodyId::new(3));
        buffer.register_rigid_body(BodyId::new(2));

        // Nothing changes before the next step.
        assert!(buffer.rigid_bodies().is_empty());

        buffer.step(0.02);
        let ids: Vec<_> = buffer.rigid_bodies().iter().map(|b| b.id.raw()).collect();
        assert_eq!(ids, vec![2, 3]);

        buffer.unregister_rigid_body(BodyId::new(2));
        buffer.step(0.02);
        assert!(!buffer.contains(BodyId::new(2)));
        assert!(buffer.contains(BodyId::new(3)));
    }

    #[test]
    fn test_unknown_ids_ignored() {
        let mut buffer = buffer_with_body();
        buffer.add_snapshot(Snapshot::at(
            0.0,
            vec![TransformInfo::new(
                BodyId::new(99),
                MotionType::Dynamic,
                RigidBodyTransform::IDENTITY,
            )],
        ));

        assert!(!buffer.step(0.02));
        assert!(!buffer.contains(BodyId::new(99)));
    }

    #[test]
    fn test_network_becomes_unhealthy_without_data() {
        let mut buffer = buffer_with_body();
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));

        for _ in 0..40 {
            buffer.step(0.02);
        }
        assert!(!buffer.is_network_healthy());
        assert!(buffer.network_health() < 0.9);

        let mut time = 0.0;
        for _ in 0..200 {
            time += 0.02;
            buffer.add_snapshot(snapshot_at(time, time, MotionType::Dynamic));
            buffer.step(0.02);
        }
        assert!(buffer.is_network_healthy());
        let lead = buffer.last_snapshot_local_time().unwrap()
            - buffer.current_local_time().unwrap();
        assert!(lead <= 0.1 + 1e-3);
    }

    #[test]
    fn test_body_registered_while_settled_is_not_updated() {
        let other = BodyId::new(2);
        let mut buffer = buffer_with_body();
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        buffer.add_snapshot(snapshot_at(0.05, 1.0, MotionType::Sleeping));
        for _ in 0..3 {
            buffer.step(0.05);
        }

        buffer.register_rigid_body(other);
        for _ in 0..3 {
            assert!(buffer.step(0.05));
            let added = buffer.get(other).unwrap();
            assert!(!added.updated);
            assert!(!added.is_initialized());

            let sleeping = buffer.get(BODY).unwrap();
            assert!(sleeping.updated);
            assert_eq!(sleeping.transform.position.x, 1.0);
        }
    }

    /// Histogram and thresholds that never shift the playback rate
    fn steady_rate_config() -> BufferConfig {
        BufferConfig {
            slow_down_threshold: 0.0,
            speed_up_threshold: 1.0,
            ..BufferConfig::default()
        }
    }

    #[test]
    fn test_late_data_slows_playback_by_sub_step() {
        // Single-sample slots: availability reflects the last step only.
        let config = BufferConfig {
            histogram_samples: 1,
            ..BufferConfig::default()
        };
        let mut buffer = SnapshotBuffer::new(config);
        buffer.register_rigid_body(BODY);
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        // Arrives just short of a full step after the first one.
        buffer.add_snapshot(snapshot_at(0.095, 1.0, MotionType::Dynamic));

        buffer.step(0.1);
        assert_eq!(buffer.current_local_time(), Some(0.0));

        buffer.step(0.1);
        assert!(buffer.is_network_healthy());
        let cursor = buffer.current_local_time().unwrap();
        // One sub-step (timestep / 10) short of a full step, not clamped to 0.095.
        assert!((cursor - 0.09).abs() < 1e-5);
    }

    #[test]
    fn test_plentiful_data_speeds_playback_by_sub_step() {
        let config = BufferConfig {
            histogram_samples: 1,
            ..BufferConfig::default()
        };
        let mut buffer = SnapshotBuffer::new(config);
        buffer.register_rigid_body(BODY);
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        buffer.add_snapshot(snapshot_at(0.15, 1.0, MotionType::Dynamic));

        buffer.step(0.1);
        buffer.step(0.1);
        let cursor = buffer.current_local_time().unwrap();
        assert!((cursor - 0.11).abs() < 1e-5);
    }

    #[test]
    fn test_healthy_catch_up_is_rate_limited() {
        let config = steady_rate_config();
        let max_advance = 0.05 * config.max_catch_up_ratio;
        let mut buffer = SnapshotBuffer::new(config);
        buffer.register_rigid_body(BODY);
        for i in 0..=20 {
            let time = i as f32 * 0.05;
            buffer.add_snapshot(snapshot_at(time, time, MotionType::Dynamic));
        }

        buffer.step(0.05);
        let mut cursor = buffer.current_local_time().unwrap();
        assert_eq!(cursor, 0.0);

        for _ in 0..4 {
            buffer.step(0.05);
            assert!(buffer.is_network_healthy());
            let next = buffer.current_local_time().unwrap();
            assert!((next - cursor - max_advance).abs() < 1e-4);
            cursor = next;
        }
        // Still far behind the newest snapshot.
        assert!(1.0 - cursor > 0.1);
    }

    #[test]
    fn test_recovery_jumps_to_lead_limit_once() {
        let dt = 0.02;
        let mut buffer = SnapshotBuffer::new(steady_rate_config());
        buffer.register_rigid_body(BODY);
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        for _ in 0..40 {
            buffer.step(dt);
        }
        assert!(!buffer.is_network_healthy());

        // Bursts of 15 snapshots per step until health returns.
        let mut next = 1;
        let mut burst = |buffer: &mut SnapshotBuffer| {
            for _ in 0..15 {
                let time = next as f32 * dt;
                buffer.add_snapshot(snapshot_at(time, time, MotionType::Dynamic));
                next += 1;
            }
        };

        let mut recovered = false;
        for _ in 0..10 {
            let before = buffer.current_local_time().unwrap();
            burst(&mut buffer);
            buffer.step(dt);
            let cursor = buffer.current_local_time().unwrap();
            if buffer.is_network_healthy() {
                let last = buffer.last_snapshot_local_time().unwrap();
                assert!((cursor - (last - 0.1)).abs() < 1e-4);
                assert!(cursor - before > dt * 2.0 + 0.1);
                recovered = true;
                break;
            }
            // Unhealthy playback creeps just under real time.
            assert!((cursor - before - dt * 0.999).abs() < 1e-5);
        }
        assert!(recovered);

        // Healthy but behind again: limited catch-up, no second jump.
        let before = buffer.current_local_time().unwrap();
        burst(&mut buffer);
        buffer.step(dt);
        assert!(buffer.is_network_healthy());
        let cursor = buffer.current_local_time().unwrap();
        assert!((cursor - before - dt * 2.0).abs() < 1e-4);
        assert!(buffer.last_snapshot_local_time().unwrap() - cursor > 0.1);
    }

    #[test]
    fn test_reset_clears_availability_statistics() {
        let config = BufferConfig {
            histogram_samples: 1,
            ..BufferConfig::default()
        };
        let initial = config.histogram_initial;
        let mut buffer = SnapshotBuffer::new(config);
        buffer.register_rigid_body(BODY);
        buffer.add_snapshot(snapshot_at(0.0, 0.0, MotionType::Dynamic));
        buffer.add_snapshot(snapshot_at(0.095, 1.0, MotionType::Dynamic));
        buffer.step(0.1);
        buffer.step(0.1);
        assert_ne!(buffer.histogram.current(), initial);

        buffer.add_snapshot(Snapshot::new(
            5.0,
            SnapshotFlags::ResetJitterBuffer,
            vec![TransformInfo::new(
                BODY,
                MotionType::Dynamic,
                RigidBodyTransform::IDENTITY,
            )],
        ));
        buffer.step(0.1);

        assert_eq!(buffer.histogram.slower(), initial);
        assert_eq!(buffer.histogram.current(), initial);
        assert_eq!(buffer.histogram.faster(), initial);
    }

    #[test]
    fn test_cursor_find() {
        let mut buffer = SnapshotBuffer::new(BufferConfig::default());
        for id in [1, 3, 5, 7] {
            buffer.register_rigid_body(BodyId::new(id));
        }
        buffer.step(0.02);

        let mut cursor = buffer.cursor();
        assert!(cursor.find(BodyId::new(1)).is_some());
        assert!(cursor.find(BodyId::new(2)).is_none());
        assert!(cursor.find(BodyId::new(5)).is_some());
        // Out-of-order queries still resolve.
        assert!(cursor.find(BodyId::new(3)).is_some());
        assert!(cursor.find(BodyId::new(7)).is_some());
        assert!(cursor.find(BodyId::new(8)).is_none());
    }
}
