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

//! Errors reported by the event service.

use std::io;
use thiserror::Error;

/// A specialized `Result` type for event service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// An error that can occur while running or talking to the event service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// `start` was called while the event thread is already running.
    #[error("event service is already running")]
    AlreadyRunning,
    /// `stop` was called while the event thread is not running.
    #[error("event service is not running")]
    NotRunning,
    /// The event thread could not be spawned.
    #[error("failed to spawn event thread: {0}")]
    Spawn(#[source] io::Error),
    /// The event thread panicked; its registrations are lost.
    #[error("event thread panicked")]
    ThreadPanicked,
    /// The service that owned the command channel is gone.
    #[error("event service disconnected")]
    Disconnected,
    /// Configuration could not be read.
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] io::Error),
    /// Configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Configuration parsed but holds unusable values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
