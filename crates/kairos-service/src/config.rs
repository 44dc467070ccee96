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

//! Configuration for the event service.

use crate::error::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the [`EventService`](crate::EventService).
///
/// Every field has a default, so a configuration file only needs to name
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventServiceConfig {
    /// Name given to the event thread.
    pub thread_name: String,
    /// How far past "now" inactive events are parked, in milliseconds.
    /// The service treats this instant as "never".
    pub cancel_horizon_ms: u64,
    /// Upper bound on how long the event thread sleeps between polls,
    /// in milliseconds.
    pub max_idle_wait_ms: u64,
}

impl Default for EventServiceConfig {
    fn default() -> Self {
        Self {
            thread_name: "kairos-event".to_string(),
            cancel_horizon_ms: 24 * 60 * 60 * 1000,
            max_idle_wait_ms: 1000,
        }
    }
}

impl EventServiceConfig {
    /// Parses and validates a configuration from JSON.
    pub fn from_json_str(json: &str) -> ServiceResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loading event service config from {}", path.as_ref().display());
        Self::from_json_str(&json)
    }

    /// Rejects values the event thread cannot run with.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.cancel_horizon_ms == 0 {
            return Err(ServiceError::InvalidConfig(
                "cancel_horizon_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_idle_wait_ms == 0 {
            return Err(ServiceError::InvalidConfig(
                "max_idle_wait_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The park horizon as a duration.
    pub fn cancel_horizon(&self) -> Duration {
        Duration::from_millis(self.cancel_horizon_ms)
    }

    /// The idle wait bound as a duration.
    pub fn max_idle_wait(&self) -> Duration {
        Duration::from_millis(self.max_idle_wait_ms)
    }
}
