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

//! Drives a writer-style heartbeat and a bounded retransmission timer through
//! the event service.
//!
//! Usage: `heartbeat [config.json]`. Every field of the configuration is
//! optional:
//!
//! ```json
//! {
//!   "service": { "thread_name": "rtps-events", "max_idle_wait_ms": 500 },
//!   "heartbeat_period": { "seconds": 0, "nanosec": 200000000 },
//!   "retry_period_ms": 75.0,
//!   "max_retries": 5,
//!   "run_for_ms": 2000
//! }
//! ```

use anyhow::{Context, Result};
use kairos_core::DurationT;
use kairos_service::{EventService, EventServiceConfig, EventTimer};
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DemoConfig {
    service: EventServiceConfig,
    heartbeat_period: DurationT,
    retry_period_ms: f64,
    max_retries: u32,
    run_for_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            service: EventServiceConfig::default(),
            heartbeat_period: DurationT::new(0, 200_000_000),
            retry_period_ms: 75.0,
            max_retries: 5,
            run_for_ms: 2000,
        }
    }
}

fn load_config() -> Result<DemoConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(DemoConfig::default());
    };
    let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config: DemoConfig =
        serde_json::from_str(&json).with_context(|| format!("parsing {path}"))?;
    config.service.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    log::info!("Running with {config:?}");

    let mut service = EventService::new(config.service.clone());
    service.start()?;
    let handle = service.handle();

    let heartbeat_count = Arc::new(AtomicU32::new(0));
    let heartbeat = {
        let count = Arc::clone(&heartbeat_count);
        let period = config.heartbeat_period.to_micros() as f64 / 1000.0;
        EventTimer::new(
            &handle,
            Box::new(move || {
                let n = count.fetch_add(1, Ordering::Relaxed) + 1;
                log::info!("HEARTBEAT #{n}");
                true
            }),
            period,
        )?
    };

    let max_retries = config.max_retries;
    let retry = {
        let attempts = AtomicU32::new(0);
        EventTimer::new(
            &handle,
            Box::new(move || {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                log::info!("Retransmission attempt {attempt}/{max_retries}");
                if attempt >= max_retries {
                    log::warn!("Giving up after {attempt} attempts");
                    return false;
                }
                true
            }),
            config.retry_period_ms,
        )?
    };

    heartbeat.restart_timer();
    retry.restart_timer();

    std::thread::sleep(Duration::from_millis(config.run_for_ms / 2));
    log::info!("Heartbeat period halved");
    heartbeat.update_interval(&DurationT::from_millis_f64(
        heartbeat.interval_millisec() / 2.0,
    ));
    std::thread::sleep(Duration::from_millis(config.run_for_ms / 2));

    heartbeat.cancel_timer();
    log::info!(
        "Sent {} heartbeats",
        heartbeat_count.load(Ordering::Relaxed)
    );

    drop(heartbeat);
    drop(retry);
    service.stop()?;
    Ok(())
}
