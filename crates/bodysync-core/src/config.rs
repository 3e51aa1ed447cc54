//! Tuning configuration for buffering, prediction and the physics bridge
//!
//! Every heuristic constant of the reconciliation engine lives here as a
//! named field. The defaults are empirically tuned values, not derived ones.
//! Configurations can be loaded from RON; missing fields take their default.
//!
//! ```
//! use bodysync_core::BodySyncConfig;
//!
//! let config = BodySyncConfig::from_ron_str("(buffer: (max_buffer_lead: 0.2))").unwrap();
//! assert_eq!(config.buffer.max_buffer_lead, 0.2);
//! assert_eq!(config.prediction.radius_expansion, 1.3);
//! ```

use crate::error::{Error, Result};
use crate::time::{LocalTime, TIME_EPSILON};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BodySyncConfig {
    /// Per-source jitter buffer settings
    pub buffer: BufferConfig,
    /// Collision-aware prediction settings
    pub prediction: PredictionConfig,
    /// Physics bridge settings
    pub bridge: BridgeConfig,
}

impl BodySyncConfig {
    /// Parse a configuration from a RON string and validate it
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    /// Serialize the configuration to pretty RON
    pub fn to_ron_string(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Check every section for out-of-range values
    pub fn validate(&self) -> Result<()> {
        self.buffer.validate()?;
        self.prediction.validate()?;
        self.bridge.validate()
    }
}

/// Settings of the per-source snapshot buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Tolerance for timestamp comparisons
    pub time_epsilon: LocalTime,
    /// Window of the network health moving average, in steps
    pub health_samples: u32,
    /// Health at or above which the network counts as healthy
    pub health_threshold: f32,
    /// Upper bound of a single health sample (received time / timestep)
    pub health_sample_cap: f32,
    /// Fraction of the timestep the playback cursor advances while unhealthy
    pub unhealthy_step_ratio: f32,
    /// Maximum buffered lead between the cursor and the newest snapshot
    pub max_buffer_lead: LocalTime,
    /// Maximum cursor advance per step while catching up, in timesteps
    pub max_catch_up_ratio: f32,
    /// Number of rate-adjustment sub-steps a timestep is divided into
    pub sub_steps_per_tick: u32,
    /// Number of availability histogram slots (odd, centred on the current rate)
    pub histogram_slots: usize,
    /// Window of each histogram slot's moving average, in steps
    pub histogram_samples: u32,
    /// Starting value of every histogram slot
    pub histogram_initial: f32,
    /// Availability below which the output rate slows down
    pub slow_down_threshold: f32,
    /// Availability above which the output rate speeds up
    pub speed_up_threshold: f32,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            time_epsilon: TIME_EPSILON,
            health_samples: 60,
            health_threshold: 0.9,
            health_sample_cap: 10.0,
            unhealthy_step_ratio: 0.999,
            max_buffer_lead: 0.1,
            max_catch_up_ratio: 2.0,
            sub_steps_per_tick: 10,
            histogram_slots: 5,
            histogram_samples: 60,
            histogram_initial: 0.9,
            slow_down_threshold: 0.85,
            speed_up_threshold: 0.95,
        }
    }
}

impl BufferConfig {
    fn validate(&self) -> Result<()> {
        if self.time_epsilon <= 0.0 {
            return Err(invalid("buffer.time_epsilon must be positive"));
        }
        if self.health_samples == 0 || self.histogram_samples == 0 {
            return Err(invalid("buffer sample windows must be at least 1"));
        }
        if self.sub_steps_per_tick == 0 {
            return Err(invalid("buffer.sub_steps_per_tick must be at least 1"));
        }
        if self.histogram_slots < 3 || self.histogram_slots % 2 == 0 {
            return Err(invalid("buffer.histogram_slots must be odd and at least 3"));
        }
        if !(0.0..=1.0).contains(&self.unhealthy_step_ratio) {
            return Err(invalid("buffer.unhealthy_step_ratio must be within [0, 1]"));
        }
        if self.max_buffer_lead <= 0.0 || self.max_catch_up_ratio < 1.0 {
            return Err(invalid(
                "buffer.max_buffer_lead must be positive and max_catch_up_ratio at least 1",
            ));
        }
        if self.slow_down_threshold >= self.speed_up_threshold {
            return Err(invalid(
                "buffer.slow_down_threshold must be below speed_up_threshold",
            ));
        }
        Ok(())
    }
}

/// Settings of the collision-window prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Factor applied to bounding radii when testing for imminent contact
    pub radius_expansion: f32,
    /// Seconds after a collision starts before blending back begins
    pub start_interpolating_back: f32,
    /// Seconds after a collision starts when the body is fully keyframed again
    pub end_interpolating_back: f32,
    /// Relative distance under which a mostly blended body counts as close
    pub close_relative_distance: f32,
    /// Blend ratio above which a close body holds near full keyframing
    pub committed_ratio: f32,
    /// Minimum position change for a blended pose to be written
    pub position_epsilon: f32,
    /// Minimum rotation change (radians) for a blended pose to be written
    pub angle_epsilon: f32,
    /// Blend ratio above which dynamic velocities are damped
    pub damping_ratio_threshold: f32,
    /// Factor applied to velocities each step while damping
    pub velocity_damping: f32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            radius_expansion: 1.3,
            start_interpolating_back: 0.8,
            end_interpolating_back: 2.0,
            close_relative_distance: 0.35,
            committed_ratio: 0.6,
            position_epsilon: 1e-4,
            angle_epsilon: 1e-3,
            damping_ratio_threshold: 0.1,
            velocity_damping: 0.95,
        }
    }
}

impl PredictionConfig {
    fn validate(&self) -> Result<()> {
        if self.radius_expansion <= 0.0 {
            return Err(invalid("prediction.radius_expansion must be positive"));
        }
        if self.start_interpolating_back < 0.0
            || self.end_interpolating_back <= self.start_interpolating_back
        {
            return Err(invalid(
                "prediction interpolation window must satisfy 0 <= start < end",
            ));
        }
        if !(0.0..=1.0).contains(&self.committed_ratio)
            || !(0.0..=1.0).contains(&self.damping_ratio_threshold)
            || !(0.0..=1.0).contains(&self.velocity_damping)
        {
            return Err(invalid("prediction ratios must be within [0, 1]"));
        }
        Ok(())
    }

    /// Length of the blend-back phase in seconds
    pub fn interpolation_window(&self) -> f32 {
        self.end_interpolating_back - self.start_interpolating_back
    }
}

/// Settings of the physics bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Consecutive still steps before a local body is reported sleeping
    pub sleep_frame_count: u32,
    /// Maximum position change per step for a body to count as still
    pub sleep_position_epsilon: f32,
    /// Maximum rotation change (radians) per step for a body to count as still
    pub sleep_angle_epsilon: f32,
    /// Maximum linear speed for a body to count as still
    pub sleep_velocity_epsilon: f32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sleep_frame_count: 10,
            sleep_position_epsilon: 1e-4,
            sleep_angle_epsilon: 1e-3,
            sleep_velocity_epsilon: 1e-3,
        }
    }
}

impl BridgeConfig {
    fn validate(&self) -> Result<()> {
        if self.sleep_frame_count == 0 {
            return Err(invalid("bridge.sleep_frame_count must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidConfig(message.to_string())
}
