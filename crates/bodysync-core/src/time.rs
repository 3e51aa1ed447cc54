//! Source-local timestamps
//!
//! Snapshot times are values of the sending participant's own clock, in
//! seconds. They are only comparable with other times from the same source.

/// A source-local timestamp in seconds
pub type LocalTime = f32;

/// Tolerance used when comparing timestamps (1 ms)
pub const TIME_EPSILON: LocalTime = 0.001;

/// Check if two timestamps are equal within `epsilon`
#[inline]
pub fn times_equal(a: LocalTime, b: LocalTime, epsilon: LocalTime) -> bool {
    (a - b).abs() < epsilon
}

/// Check if `a` is at or before `b`, treating near-equal times as equal
#[inline]
pub fn at_or_before(a: LocalTime, b: LocalTime, epsilon: LocalTime) -> bool {
    a < b + epsilon
}

/// Check if `a` is strictly after `b` by more than `epsilon`
#[inline]
pub fn strictly_after(a: LocalTime, b: LocalTime, epsilon: LocalTime) -> bool {
    a >= b + epsilon
}
