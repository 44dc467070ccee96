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

//! The contract between event owners and the dispatcher that drives them.

use crate::timed_event::TimedEvent;
use std::sync::Arc;

/// Something that drives [`TimedEvent`]s on behalf of their owners.
///
/// Owners call [`notify`](EventNotifier::notify) after a successful
/// [`go_ready`](TimedEvent::go_ready) or [`go_cancel`](TimedEvent::go_cancel).
/// The notifier must then call [`update`](TimedEvent::update) for that event
/// at least once, from the thread that also calls its `trigger`.
///
/// Implementations keep only non-owning references to the events they drive.
pub trait EventNotifier: Send + Sync {
    /// Asks the dispatcher to recompute the deadline of `event`.
    fn notify(&self, event: &Arc<TimedEvent>);
}

impl<N: EventNotifier + ?Sized> EventNotifier for Arc<N> {
    fn notify(&self, event: &Arc<TimedEvent>) {
        (**self).notify(event);
    }
}
