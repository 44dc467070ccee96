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

//! The rearmable, cancelable timed event.
//!
//! A [`TimedEvent`] is passive: it has no thread and never schedules itself.
//! Protocol threads arm and cancel it; a single dispatcher computes its
//! deadline with [`TimedEvent::update`] and fires it with
//! [`TimedEvent::trigger`].
//!
//! # Synchronization
//!
//! Arming status lives in one atomic word which is never guarded by a lock.
//! The interval and the next trigger time share a mutex that is only held for
//! the narrow reads and writes of those two fields, and never while the
//! callback runs.
//!
//! The state word also carries a cancellation generation, bumped by every
//! [`go_cancel`](TimedEvent::go_cancel). A trigger only rearms when the firing
//! was armed when it began and no cancellation has landed since, so a cancel
//! always stops future firings even if it races with a callback that asks to
//! restart. The in-flight callback itself is never suppressed.
//!
//! # Lifecycle
//!
//! ```text
//!  Inactive --go_ready--> Ready --update--> Waiting --trigger--> Inactive
//!      ^                                       |                    |
//!      |                                       +<--callback: true---+
//!      +------------------go_cancel (from any state)
//! ```

use crate::time::{duration_to_millis_f64, interval_from_duration, interval_from_millis};
use crate::time::{signed_millis_until, DurationT};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// The callback run when a timed event fires.
///
/// Returns `true` to rearm the event for another interval.
pub type EventCallback = Box<dyn Fn() -> bool + Send + Sync + 'static>;

/// Arming status of a [`TimedEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventState {
    /// At rest. No deadline is pending.
    Inactive = 0,
    /// Arming was requested; the dispatcher has not computed a deadline yet.
    Ready = 1,
    /// A deadline is pending.
    Waiting = 2,
}

impl EventState {
    fn from_bits(bits: u32) -> Self {
        match bits & STATE_MASK {
            1 => EventState::Ready,
            2 => EventState::Waiting,
            _ => EventState::Inactive,
        }
    }
}

// Layout of the state word: bits 0..2 hold the `EventState`, the rest is the
// cancellation generation.
const STATE_MASK: u32 = 0b11;
const GENERATION_STEP: u32 = 1 << 2;

#[inline]
fn with_state(word: u32, state: EventState) -> u32 {
    (word & !STATE_MASK) | state as u32
}

#[derive(Debug)]
struct Timing {
    interval: Duration,
    next_trigger_time: Instant,
}

/// A timer driven entirely by external calls.
///
/// Share it through an `Arc`: the protocol component that creates it is the
/// owner, the dispatcher only keeps a `Weak` handle.
///
/// # Example
///
/// ```rust
/// use kairos_core::{EventState, TimedEvent};
/// use std::time::{Duration, Instant};
///
/// let event = TimedEvent::new(Box::new(|| true), Duration::from_millis(100));
/// let t0 = Instant::now();
/// let never = t0 + Duration::from_secs(86_400);
///
/// assert!(event.go_ready());
/// event.update(t0, never);
/// assert_eq!(event.state(), EventState::Waiting);
/// assert_eq!(event.next_trigger_time(), t0 + Duration::from_millis(100));
///
/// event.trigger(t0 + Duration::from_millis(100), never);
/// assert_eq!(event.next_trigger_time(), t0 + Duration::from_millis(200));
/// ```
pub struct TimedEvent {
    state: AtomicU32,
    timing: Mutex<Timing>,
    callback: Option<EventCallback>,
}

impl TimedEvent {
    /// Creates an inactive event that runs `callback` each time it fires.
    ///
    /// The interval is kept with microsecond resolution.
    pub fn new(callback: EventCallback, interval: Duration) -> Self {
        Self::with_callback(Some(callback), interval)
    }

    /// Creates an event without a callback. Triggering it does nothing.
    pub fn inert(interval: Duration) -> Self {
        Self::with_callback(None, interval)
    }

    fn with_callback(callback: Option<EventCallback>, interval: Duration) -> Self {
        Self {
            state: AtomicU32::new(EventState::Inactive as u32),
            timing: Mutex::new(Timing {
                interval: Duration::from_micros(interval.as_micros() as u64),
                next_trigger_time: Instant::now(),
            }),
            callback,
        }
    }

    // The lock only guards plain data, so a poisoned guard is still usable.
    fn timing(&self) -> MutexGuard<'_, Timing> {
        self.timing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current arming status. Only a snapshot: other threads may change it at any time.
    pub fn state(&self) -> EventState {
        EventState::from_bits(self.state.load(Ordering::SeqCst))
    }

    /// Requests arming.
    ///
    /// Moves `Inactive -> Ready` and returns `true`; in any other state it
    /// returns `false` and changes nothing. Among concurrent callers starting
    /// from `Inactive`, exactly one succeeds.
    ///
    /// The dispatcher still has to call [`update`](Self::update) before a
    /// deadline exists.
    pub fn go_ready(&self) -> bool {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                (EventState::from_bits(word) == EventState::Inactive)
                    .then(|| with_state(word, EventState::Ready))
            })
            .is_ok()
    }

    /// Drives the event to `Inactive` from any state.
    ///
    /// Returns `true` if the previous state was not already `Inactive`. Never
    /// blocks. No further self-rearm happens after this returns, but a
    /// trigger already dispatched still runs its callback.
    pub fn go_cancel(&self) -> bool {
        let previous = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                Some(with_state(
                    word.wrapping_add(GENERATION_STEP),
                    EventState::Inactive,
                ))
            })
            .unwrap_or_else(|word| word);
        EventState::from_bits(previous) != EventState::Inactive
    }

    /// Computes the next deadline. Called by the dispatcher.
    ///
    /// From `Ready`, moves to `Waiting` with a deadline of
    /// `current_time + interval`. From any other state the state is left
    /// alone and the event is parked at `cancel_time`.
    pub fn update(&self, current_time: Instant, cancel_time: Instant) {
        let armed = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                (EventState::from_bits(word) == EventState::Ready)
                    .then(|| with_state(word, EventState::Waiting))
            })
            .is_ok();

        let mut timing = self.timing();
        timing.next_trigger_time = if armed {
            deadline(current_time, timing.interval, cancel_time)
        } else {
            cancel_time
        };
    }

    /// Fires the event. Called by the dispatcher once the deadline is due.
    ///
    /// The callback runs regardless of the current state, without the timing
    /// lock held. If it returns `true` and the event was armed for this
    /// firing, the event moves back to `Waiting` with a deadline of
    /// `current_time + interval`. A concurrent `go_ready` or `go_cancel`
    /// during the callback abandons the restart. In every other case the
    /// event is parked at `cancel_time`.
    pub fn trigger(&self, current_time: Instant, cancel_time: Instant) {
        let Some(callback) = &self.callback else {
            return;
        };

        // Waiting -> Inactive. The outcome only decides whether a restart is
        // allowed; the callback runs either way.
        let armed = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                (EventState::from_bits(word) == EventState::Waiting)
                    .then(|| with_state(word, EventState::Inactive))
            })
            .ok()
            .map(|word| with_state(word, EventState::Inactive));

        let restart = callback();

        if restart {
            let rearmed = armed.is_some_and(|expected| {
                self.state
                    .compare_exchange(
                        expected,
                        with_state(expected, EventState::Waiting),
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
            });

            if rearmed {
                let mut timing = self.timing();
                timing.next_trigger_time = deadline(current_time, timing.interval, cancel_time);
                return;
            }
            log::trace!("TimedEvent: restart abandoned, state changed while firing");
        }

        self.timing().next_trigger_time = cancel_time;
    }

    /// Replaces the interval. Takes effect at the next deadline computation.
    ///
    /// Always returns `true`.
    pub fn update_interval(&self, interval: &DurationT) -> bool {
        self.timing().interval = interval_from_duration(interval);
        true
    }

    /// Replaces the interval with a millisecond count, truncated to whole
    /// microseconds. Takes effect at the next deadline computation.
    ///
    /// Always returns `true`.
    pub fn update_interval_millisec(&self, millis: f64) -> bool {
        self.timing().interval = interval_from_millis(millis);
        true
    }

    /// The earliest time at which the dispatcher should call [`trigger`](Self::trigger).
    pub fn next_trigger_time(&self) -> Instant {
        self.timing().next_trigger_time
    }

    /// The current interval.
    pub fn interval(&self) -> Duration {
        self.timing().interval
    }

    /// The current interval in whole milliseconds.
    pub fn interval_millisec(&self) -> f64 {
        duration_to_millis_f64(self.interval())
    }

    /// Whole milliseconds until the next trigger time, negative once overdue.
    pub fn remaining_time_millisec(&self) -> f64 {
        signed_millis_until(self.next_trigger_time(), Instant::now())
    }
}

fn deadline(current_time: Instant, interval: Duration, cancel_time: Instant) -> Instant {
    current_time.checked_add(interval).unwrap_or(cancel_time)
}

impl fmt::Debug for TimedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timing = self.timing();
        f.debug_struct("TimedEvent")
            .field("state", &self.state())
            .field("interval", &timing.interval)
            .field("next_trigger_time", &timing.next_trigger_time)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
