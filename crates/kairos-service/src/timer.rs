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

//! Owner-side handle for a timed event driven by an [`EventService`](crate::EventService).

use crate::error::ServiceResult;
use crate::queue::EventId;
use crate::service::EventServiceHandle;
use kairos_core::time::interval_from_millis;
use kairos_core::{DurationT, EventCallback, EventNotifier, TimedEvent};
use std::sync::Arc;

/// A timed event owned by a protocol component.
///
/// Heartbeat, retransmission and announcement timers are built on this:
/// [`restart_timer`](Self::restart_timer) arms the event and
/// [`cancel_timer`](Self::cancel_timer) stops it, each notifying the service
/// only when the event actually changed state. Dropping the timer
/// unregisters it.
pub struct EventTimer {
    event: Arc<TimedEvent>,
    id: EventId,
    service: EventServiceHandle,
}

impl EventTimer {
    /// Creates an inactive timer and registers it with the service.
    pub fn new(
        service: &EventServiceHandle,
        callback: EventCallback,
        interval_millisec: f64,
    ) -> ServiceResult<Self> {
        let event = Arc::new(TimedEvent::new(
            callback,
            interval_from_millis(interval_millisec),
        ));
        let id = service.register(&event)?;
        Ok(Self {
            event,
            id,
            service: service.clone(),
        })
    }

    /// Arms the timer if it is at rest.
    ///
    /// Has no effect while the timer is already armed or waiting.
    pub fn restart_timer(&self) {
        if self.event.go_ready() {
            self.service.notify(&self.event);
        }
    }

    /// Stops the timer.
    ///
    /// A firing the service has already started still runs its callback.
    pub fn cancel_timer(&self) {
        if self.event.go_cancel() {
            self.service.notify(&self.event);
        }
    }

    /// Replaces the interval; the current deadline is kept.
    pub fn update_interval(&self, interval: &DurationT) -> bool {
        self.event.update_interval(interval)
    }

    /// Replaces the interval with a millisecond count; the current deadline is kept.
    pub fn update_interval_millisec(&self, millis: f64) -> bool {
        self.event.update_interval_millisec(millis)
    }

    /// The interval in whole milliseconds.
    pub fn interval_millisec(&self) -> f64 {
        self.event.interval_millisec()
    }

    /// Whole milliseconds until the next firing, negative once overdue.
    pub fn remaining_time_millisec(&self) -> f64 {
        self.event.remaining_time_millisec()
    }

    /// The underlying event.
    pub fn event(&self) -> &Arc<TimedEvent> {
        &self.event
    }

    /// The identifier the service knows this timer by.
    pub fn id(&self) -> EventId {
        self.id
    }
}

impl Drop for EventTimer {
    fn drop(&mut self) {
        self.event.go_cancel();
        if self.service.unregister(self.id).is_err() {
            log::debug!("EventTimer: {} dropped after its service", self.id);
        }
    }
}
