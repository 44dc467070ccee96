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

//! Single-threaded bookkeeping for a set of timed events.
//!
//! The queue never owns the events it drives: owners hold the `Arc`, the
//! queue holds a `Weak`. Entries whose owner is gone are dropped on the next
//! [`poll`](TimerQueue::poll).

use kairos_core::{EventState, TimedEvent};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies an event registered with a [`TimerQueue`] or an
/// [`EventService`](crate::EventService).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub(crate) fn next() -> Self {
        Self(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw identifier.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// What a single [`TimerQueue::poll`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Events whose deadline was recomputed on request of their owner.
    pub updated: usize,
    /// Events that were fired.
    pub triggered: usize,
    /// Entries removed because their owner dropped the event.
    pub dropped: usize,
    /// Earliest pending deadline after the poll, if any event is scheduled.
    pub next_deadline: Option<Instant>,
}

#[derive(Debug)]
struct Slot {
    id: EventId,
    event: Weak<TimedEvent>,
    /// Last deadline read from the event. `None` while unscheduled or parked.
    deadline: Option<Instant>,
}

/// The dispatcher side of the timed-event contract, without a thread.
///
/// Whoever drives the queue must do so from one thread at a time; the queue
/// is the only caller of `update` and `trigger` for its events.
///
/// # Example
///
/// ```rust
/// use kairos_core::TimedEvent;
/// use kairos_service::TimerQueue;
/// use std::sync::Arc;
/// use std::time::{Duration, Instant};
///
/// let mut queue = TimerQueue::new();
/// let event = Arc::new(TimedEvent::new(Box::new(|| true), Duration::from_millis(10)));
/// let id = queue.register(&event);
///
/// assert!(event.go_ready());
/// queue.mark_pending(id);
///
/// let t0 = Instant::now();
/// let outcome = queue.poll(t0, Duration::from_secs(60));
/// assert_eq!(outcome.next_deadline, Some(t0 + Duration::from_millis(10)));
///
/// let outcome = queue.poll(t0 + Duration::from_millis(10), Duration::from_secs(60));
/// assert_eq!(outcome.triggered, 1);
/// ```
#[derive(Debug, Default)]
pub struct TimerQueue {
    slots: Vec<Slot>,
    pending: Vec<EventId>,
}

impl TimerQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event and returns its identifier.
    ///
    /// Registering does not schedule anything. Registering the same event
    /// twice returns the existing identifier.
    pub fn register(&mut self, event: &Arc<TimedEvent>) -> EventId {
        let weak = Arc::downgrade(event);
        if let Some(id) = self.find(&weak) {
            return id;
        }
        let id = EventId::next();
        self.insert(id, weak);
        id
    }

    pub(crate) fn insert(&mut self, id: EventId, event: Weak<TimedEvent>) {
        if self.slots.iter().any(|slot| slot.id == id) {
            log::warn!("TimerQueue: {id} registered twice, ignoring");
            return;
        }
        self.slots.push(Slot {
            id,
            event,
            deadline: None,
        });
        log::debug!("TimerQueue: registered {id} ({} events)", self.slots.len());
    }

    /// Removes an event. Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: EventId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.id != id);
        self.pending.retain(|pending| *pending != id);
        let removed = self.slots.len() != before;
        if removed {
            log::debug!("TimerQueue: unregistered {id}");
        }
        removed
    }

    /// Schedules an `update` of the event on the next poll.
    ///
    /// Returns `false` if the event is not registered.
    pub fn mark_pending(&mut self, id: EventId) -> bool {
        if !self.contains(id) {
            return false;
        }
        if !self.pending.contains(&id) {
            self.pending.push(id);
        }
        true
    }

    /// Schedules an `update` of `event`, registering it first if needed.
    ///
    /// Returns `None` if the owner already dropped the event.
    pub fn notify(&mut self, event: &Weak<TimedEvent>) -> Option<EventId> {
        if event.strong_count() == 0 {
            return None;
        }
        let id = match self.find(event) {
            Some(id) => id,
            None => {
                let id = EventId::next();
                self.insert(id, event.clone());
                id
            }
        };
        self.mark_pending(id);
        Some(id)
    }

    /// Runs one dispatch round at `now`.
    ///
    /// Pending events are updated first, then every event whose deadline is
    /// at or before `now` is triggered, earliest first. Inactive events are
    /// parked at `now + cancel_horizon` and stay unscheduled until their
    /// owner notifies the queue again.
    pub fn poll(&mut self, now: Instant, cancel_horizon: Duration) -> PollOutcome {
        let cancel_time = now
            .checked_add(cancel_horizon)
            .unwrap_or_else(|| now + Duration::from_secs(86_400));
        let mut outcome = PollOutcome::default();

        for id in std::mem::take(&mut self.pending) {
            let Some(slot) = self.slots.iter_mut().find(|slot| slot.id == id) else {
                continue;
            };
            let Some(event) = slot.event.upgrade() else {
                continue;
            };
            event.update(now, cancel_time);
            slot.deadline = scheduled_deadline(&event, cancel_time);
            outcome.updated += 1;
        }

        self.sort();
        for slot in self.slots.iter_mut() {
            match slot.deadline {
                Some(deadline) if deadline <= now => {}
                _ => break,
            }
            let Some(event) = slot.event.upgrade() else {
                slot.deadline = None;
                continue;
            };
            event.trigger(now, cancel_time);
            slot.deadline = scheduled_deadline(&event, cancel_time);
            outcome.triggered += 1;
        }

        outcome.dropped = self.drop_dead();
        self.sort();
        outcome.next_deadline = self.next_deadline();

        if outcome.updated + outcome.triggered + outcome.dropped > 0 {
            log::trace!(
                "TimerQueue: poll updated={} triggered={} dropped={}",
                outcome.updated,
                outcome.triggered,
                outcome.dropped
            );
        }
        outcome
    }

    /// Earliest deadline among scheduled events.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().filter_map(|slot| slot.deadline).min()
    }

    /// Returns `true` if `id` is registered.
    pub fn contains(&self, id: EventId) -> bool {
        self.slots.iter().any(|slot| slot.id == id)
    }

    /// Number of registered events.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no events are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of events waiting for an `update`.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn find(&self, event: &Weak<TimedEvent>) -> Option<EventId> {
        self.slots
            .iter()
            .find(|slot| Weak::ptr_eq(&slot.event, event))
            .map(|slot| slot.id)
    }

    // Scheduled slots first, by deadline.
    fn sort(&mut self) {
        self.slots
            .sort_by_key(|slot| (slot.deadline.is_none(), slot.deadline));
    }

    fn drop_dead(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.event.strong_count() > 0);
        let dropped = before - self.slots.len();
        if dropped > 0 {
            let slots = &self.slots;
            self.pending
                .retain(|id| slots.iter().any(|slot| slot.id == *id));
            log::debug!("TimerQueue: dropped {dropped} events whose owner went away");
        }
        dropped
    }
}

/// The deadline to wait for, or `None` when the event was parked.
fn scheduled_deadline(event: &TimedEvent, cancel_time: Instant) -> Option<Instant> {
    let next = event.next_trigger_time();
    if next == cancel_time && event.state() != EventState::Waiting {
        None
    } else {
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const HORIZON: Duration = Duration::from_secs(3600);
    const MS: Duration = Duration::from_millis(1);

    fn counting_event(interval: Duration, restart: bool) -> (Arc<TimedEvent>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let event = Arc::new(TimedEvent::new(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                restart
            }),
            interval,
        ));
        (event, calls)
    }

    fn arm(queue: &mut TimerQueue, event: &Arc<TimedEvent>) -> EventId {
        let id = queue.register(event);
        assert!(event.go_ready());
        assert!(queue.mark_pending(id));
        id
    }

    #[test]
    fn test_registered_event_is_not_scheduled() {
        let mut queue = TimerQueue::new();
        let (event, calls) = counting_event(10 * MS, true);
        queue.register(&event);

        let t0 = Instant::now();
        let outcome = queue.poll(t0 + 100 * MS, HORIZON);

        assert_eq!(outcome.triggered, 0);
        assert_eq!(outcome.next_deadline, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut queue = TimerQueue::new();
        let (event, _) = counting_event(MS, true);
        let first = queue.register(&event);
        let second = queue.register(&event);
        assert_eq!(first, second);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_periodic_event_fires_each_period() {
        let mut queue = TimerQueue::new();
        let (event, calls) = counting_event(10 * MS, true);
        arm(&mut queue, &event);

        let t0 = Instant::now();
        let outcome = queue.poll(t0, HORIZON);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.next_deadline, Some(t0 + 10 * MS));

        // Not due yet.
        assert_eq!(queue.poll(t0 + 9 * MS, HORIZON).triggered, 0);

        for period in 1..=5u32 {
            let due = t0 + 10 * MS * period;
            let outcome = queue.poll(due, HORIZON);
            assert_eq!(outcome.triggered, 1);
            assert_eq!(outcome.next_deadline, Some(due + 10 * MS));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_declined_restart_parks_the_event() {
        let mut queue = TimerQueue::new();
        let (event, calls) = counting_event(10 * MS, false);
        arm(&mut queue, &event);

        let t0 = Instant::now();
        queue.poll(t0, HORIZON);
        let outcome = queue.poll(t0 + 10 * MS, HORIZON);

        assert_eq!(outcome.triggered, 1);
        assert_eq!(outcome.next_deadline, None);
        assert_eq!(event.next_trigger_time(), t0 + 10 * MS + HORIZON);

        // Parked events stay quiet even past the park horizon.
        let outcome = queue.poll(t0 + 2 * HORIZON, HORIZON);
        assert_eq!(outcome.triggered, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_with_notify_prevents_firing() {
        let mut queue = TimerQueue::new();
        let (event, calls) = counting_event(10 * MS, true);
        let id = arm(&mut queue, &event);

        let t0 = Instant::now();
        queue.poll(t0, HORIZON);

        assert!(event.go_cancel());
        queue.mark_pending(id);
        let outcome = queue.poll(t0 + 20 * MS, HORIZON);

        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.triggered, 0);
        assert_eq!(outcome.next_deadline, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_without_notify_fires_once_more() {
        let mut queue = TimerQueue::new();
        let (event, calls) = counting_event(10 * MS, true);
        arm(&mut queue, &event);

        let t0 = Instant::now();
        queue.poll(t0, HORIZON);

        // The queue still holds the old deadline.
        assert!(event.go_cancel());
        let outcome = queue.poll(t0 + 10 * MS, HORIZON);

        assert_eq!(outcome.triggered, 1);
        assert_eq!(outcome.next_deadline, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(event.state(), EventState::Inactive);
    }

    #[test]
    fn test_due_events_fire_earliest_first() {
        let mut queue = TimerQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let make = |name: &'static str, interval: Duration| {
            let order = Arc::clone(&order);
            Arc::new(TimedEvent::new(
                Box::new(move || {
                    order.lock().unwrap().push(name);
                    false
                }),
                interval,
            ))
        };
        let slow = make("slow", 30 * MS);
        let fast = make("fast", 10 * MS);
        let mid = make("mid", 20 * MS);
        for event in [&slow, &fast, &mid] {
            arm(&mut queue, event);
        }

        let t0 = Instant::now();
        queue.poll(t0, HORIZON);
        let outcome = queue.poll(t0 + 50 * MS, HORIZON);

        assert_eq!(outcome.triggered, 3);
        assert_eq!(*order.lock().unwrap(), vec!["fast", "mid", "slow"]);
    }

    #[test]
    fn test_dropped_owner_is_removed() {
        let mut queue = TimerQueue::new();
        let (event, calls) = counting_event(10 * MS, true);
        arm(&mut queue, &event);
        let t0 = Instant::now();
        queue.poll(t0, HORIZON);

        drop(event);
        let outcome = queue.poll(t0 + 10 * MS, HORIZON);

        assert_eq!(outcome.triggered, 0);
        assert_eq!(outcome.dropped, 1);
        assert!(queue.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unregister_stops_firing() {
        let mut queue = TimerQueue::new();
        let (event, calls) = counting_event(10 * MS, true);
        let id = arm(&mut queue, &event);
        let t0 = Instant::now();
        queue.poll(t0, HORIZON);

        assert!(queue.unregister(id));
        assert!(!queue.unregister(id));
        assert!(!queue.mark_pending(id));
        queue.poll(t0 + 10 * MS, HORIZON);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_notify_registers_unknown_event() {
        let mut queue = TimerQueue::new();
        let (event, _) = counting_event(10 * MS, true);
        assert!(event.go_ready());

        let id = queue.notify(&Arc::downgrade(&event)).expect("event is alive");
        assert!(queue.contains(id));
        assert_eq!(queue.pending_len(), 1);

        // A second notify before the poll is coalesced.
        queue.notify(&Arc::downgrade(&event));
        assert_eq!(queue.pending_len(), 1);

        let t0 = Instant::now();
        let outcome = queue.poll(t0, HORIZON);
        assert_eq!(outcome.updated, 1);
        assert_eq!(event.state(), EventState::Waiting);
    }

    #[test]
    fn test_notify_for_dropped_event_is_ignored() {
        let mut queue = TimerQueue::new();
        let (event, _) = counting_event(MS, true);
        let weak = Arc::downgrade(&event);
        drop(event);
        assert_eq!(queue.notify(&weak), None);
        assert!(queue.is_empty());
    }
}
