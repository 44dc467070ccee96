// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Interval units used by timed events.
//!
//! Timed events keep their interval as a whole number of microseconds. Callers
//! configure it either from an RTPS [`DurationT`] or from a fractional
//! millisecond count; both paths end up in the same unit.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;
const MICROS_PER_SEC: i64 = 1_000_000;

/// An RTPS duration: whole seconds plus a nanosecond remainder.
///
/// This is the value type protocol QoS settings (heartbeat period, lease
/// duration, announcement period) are expressed in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DurationT {
    /// Whole seconds. May be negative.
    pub seconds: i32,
    /// Nanoseconds past `seconds`.
    #[serde(default)]
    pub nanosec: u32,
}

impl DurationT {
    /// A zero-length duration.
    pub const ZERO: Self = Self::new(0, 0);

    /// The protocol's "infinite" duration.
    pub const INFINITE: Self = Self::new(0x7fff_ffff, 0xffff_ffff);

    /// Creates a duration from its raw parts.
    pub const fn new(seconds: i32, nanosec: u32) -> Self {
        Self { seconds, nanosec }
    }

    /// Creates a duration from a (possibly fractional) number of milliseconds.
    ///
    /// Values beyond the representable range saturate; NaN maps to zero.
    pub fn from_millis_f64(millis: f64) -> Self {
        if millis.is_nan() {
            return Self::ZERO;
        }
        let secs = millis / 1000.0;
        let whole = secs.floor();
        if whole >= i32::MAX as f64 {
            return Self::INFINITE;
        }
        if whole < i32::MIN as f64 {
            return Self::new(i32::MIN, 0);
        }
        let nanosec = ((secs - whole) * NANOS_PER_SEC) as u32;
        Self::new(whole as i32, nanosec.min(999_999_999))
    }

    /// Returns `true` for [`DurationT::INFINITE`].
    pub fn is_infinite(&self) -> bool {
        *self == Self::INFINITE
    }

    /// Total length in whole microseconds; the sub-microsecond part is dropped.
    pub fn to_micros(&self) -> i64 {
        self.seconds as i64 * MICROS_PER_SEC + (self.nanosec / 1000) as i64
    }
}

impl From<Duration> for DurationT {
    fn from(value: Duration) -> Self {
        match i32::try_from(value.as_secs()) {
            Ok(seconds) => Self::new(seconds, value.subsec_nanos()),
            Err(_) => Self::INFINITE,
        }
    }
}

/// Converts an RTPS duration into a timed-event interval.
///
/// Negative durations clamp to zero.
pub fn interval_from_duration(duration: &DurationT) -> Duration {
    Duration::from_micros(duration.to_micros().max(0) as u64)
}

/// Converts a millisecond count into a timed-event interval, truncating to
/// whole microseconds.
///
/// Negative and NaN inputs clamp to zero.
pub fn interval_from_millis(millis: f64) -> Duration {
    // `as` saturates: negatives and NaN become 0, huge values become u64::MAX.
    Duration::from_micros((millis * 1000.0) as u64)
}

/// Whole milliseconds in `duration`, as reported by interval getters.
pub fn duration_to_millis_f64(duration: Duration) -> f64 {
    duration.as_millis() as f64
}

/// Whole milliseconds from `now` until `target`; negative once `target` has passed.
pub fn signed_millis_until(target: Instant, now: Instant) -> f64 {
    if target >= now {
        duration_to_millis_f64(target - now)
    } else {
        -duration_to_millis_f64(now - target)
    }
}
