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

//! # Kairos Service
//!
//! A reference dispatcher for [`kairos_core::TimedEvent`]s.
//!
//! [`TimerQueue`] is the single-threaded bookkeeping: it keeps non-owning
//! handles to registered events, runs `update` for events whose owners asked
//! for it, and fires every event whose deadline is due. [`EventService`] runs
//! a queue on a dedicated event thread and feeds it commands over a channel.
//! [`EventTimer`] is what protocol components hold: it owns the event and
//! notifies the service when it is armed or cancelled.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod queue;
pub mod service;
pub mod timer;

pub use config::EventServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use queue::{EventId, PollOutcome, TimerQueue};
pub use service::{EventService, EventServiceHandle};
pub use timer::EventTimer;
