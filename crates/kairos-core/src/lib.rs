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

//! # Kairos Core
//!
//! Foundational crate containing the timed-event primitive that backs the
//! periodic and retry mechanisms of the RTPS stack (heartbeats, retransmission
//! backoff, liveliness expiration, discovery re-announcement).
//!
//! A [`TimedEvent`] never schedules itself. It is driven by an external
//! dispatcher which polls monotonic time and calls
//! [`update`](TimedEvent::update) and [`trigger`](TimedEvent::trigger), while
//! protocol threads arm and cancel it through
//! [`go_ready`](TimedEvent::go_ready) and [`go_cancel`](TimedEvent::go_cancel).

#![warn(missing_docs)]

pub mod notifier;
pub mod time;
pub mod timed_event;

pub use notifier::EventNotifier;
pub use time::DurationT;
pub use timed_event::{EventCallback, EventState, TimedEvent};
