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

//! The event thread that drives registered timed events.

use crate::config::EventServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::queue::{EventId, TimerQueue};
use flume::{Receiver, RecvTimeoutError, Sender};
use kairos_core::{EventNotifier, TimedEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;

enum Command {
    Register(EventId, Weak<TimedEvent>),
    Unregister(EventId),
    Notify(Weak<TimedEvent>),
    Shutdown,
}

/// A cloneable handle for talking to an [`EventService`].
///
/// Commands sent while the event thread is stopped are queued and applied
/// once it starts.
#[derive(Clone)]
pub struct EventServiceHandle {
    sender: Sender<Command>,
}

impl EventServiceHandle {
    /// Registers an event. The service keeps only a weak reference to it.
    pub fn register(&self, event: &Arc<TimedEvent>) -> ServiceResult<EventId> {
        let id = EventId::next();
        self.send(Command::Register(id, Arc::downgrade(event)))?;
        Ok(id)
    }

    /// Removes a registered event.
    pub fn unregister(&self, id: EventId) -> ServiceResult<()> {
        self.send(Command::Unregister(id))
    }

    fn send(&self, command: Command) -> ServiceResult<()> {
        self.sender
            .send(command)
            .map_err(|_| ServiceError::Disconnected)
    }
}

impl EventNotifier for EventServiceHandle {
    fn notify(&self, event: &Arc<TimedEvent>) {
        if self.send(Command::Notify(Arc::downgrade(event))).is_err() {
            log::warn!("EventService: notify dropped, service is gone");
        }
    }
}

/// Runs a [`TimerQueue`] on a dedicated event thread.
///
/// The thread sleeps until the earliest deadline, a command arrives, or
/// [`max_idle_wait`](EventServiceConfig::max_idle_wait) elapses, whichever
/// comes first. Callbacks run on this thread.
pub struct EventService {
    config: EventServiceConfig,
    sender: Sender<Command>,
    /// The receiver and queue while the thread is stopped.
    parked: Option<(Receiver<Command>, TimerQueue)>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<(Receiver<Command>, TimerQueue)>>,
}

impl EventService {
    /// Creates a stopped service.
    pub fn new(config: EventServiceConfig) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            config,
            sender,
            parked: Some((receiver, TimerQueue::new())),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Returns a handle that can register events and notify the service.
    pub fn handle(&self) -> EventServiceHandle {
        EventServiceHandle {
            sender: self.sender.clone(),
        }
    }

    /// Returns the configuration the service was created with.
    pub fn config(&self) -> &EventServiceConfig {
        &self.config
    }

    /// Returns `true` while the event thread runs.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the event thread.
    pub fn start(&mut self) -> ServiceResult<()> {
        if self.is_running() {
            return Err(ServiceError::AlreadyRunning);
        }
        let (receiver, queue) = self.parked.take().ok_or(ServiceError::Disconnected)?;

        let running = Arc::clone(&self.running);
        let cancel_horizon = self.config.cancel_horizon();
        let max_idle_wait = self.config.max_idle_wait();

        running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                let mut queue = queue;
                log::info!("EventService thread started.");

                loop {
                    let now = Instant::now();
                    let outcome = queue.poll(now, cancel_horizon);
                    let idle_until = now + max_idle_wait;
                    let wake_at = outcome
                        .next_deadline
                        .map_or(idle_until, |deadline| deadline.min(idle_until));

                    let first = match receiver.recv_deadline(wake_at) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    // Apply everything that queued up before polling again.
                    let keep_running = std::iter::once(first)
                        .chain(receiver.try_iter())
                        .all(|command| apply(&mut queue, command));
                    if !keep_running {
                        break;
                    }
                }

                running.store(false, Ordering::SeqCst);
                log::info!("EventService thread stopped ({} events).", queue.len());
                (receiver, queue)
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(ServiceError::Spawn(e))
            }
        }
    }

    /// Stops the event thread and waits for it to finish.
    ///
    /// Registered events are kept; a later [`start`](Self::start) resumes them.
    pub fn stop(&mut self) -> ServiceResult<()> {
        let Some(handle) = self.handle.take() else {
            return Err(ServiceError::NotRunning);
        };
        // The thread holds the receiver, so this only fails if it already exited.
        let _ = self.sender.send(Command::Shutdown);

        match handle.join() {
            Ok(parked) => {
                self.parked = Some(parked);
                Ok(())
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                log::error!("EventService thread panicked; registrations are lost.");
                Err(ServiceError::ThreadPanicked)
            }
        }
    }
}

/// Applies a command to the queue. Returns `false` on shutdown.
fn apply(queue: &mut TimerQueue, command: Command) -> bool {
    match command {
        Command::Register(id, event) => queue.insert(id, event),
        Command::Unregister(id) => {
            queue.unregister(id);
        }
        Command::Notify(event) => {
            if queue.notify(&event).is_none() {
                log::debug!("EventService: notify for a dropped event ignored");
            }
        }
        Command::Shutdown => return false,
    }
    true
}

impl Drop for EventService {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config() -> EventServiceConfig {
        EventServiceConfig {
            thread_name: "kairos-test".to_string(),
            max_idle_wait_ms: 20,
            ..Default::default()
        }
    }

    #[test]
    fn test_event_service_lifecycle() {
        let mut service = EventService::new(fast_config());
        assert!(!service.is_running());

        service.start().unwrap();
        assert!(service.is_running());
        assert!(matches!(service.start(), Err(ServiceError::AlreadyRunning)));

        service.stop().unwrap();
        assert!(!service.is_running());
        assert!(matches!(service.stop(), Err(ServiceError::NotRunning)));
    }

    #[test]
    fn test_registrations_survive_restart() {
        let mut service = EventService::new(fast_config());
        let handle = service.handle();
        let event = Arc::new(TimedEvent::inert(Duration::from_millis(5)));

        // Queued while stopped.
        handle.register(&event).unwrap();
        service.start().unwrap();
        service.stop().unwrap();

        let (_, queue) = service.parked.as_ref().unwrap();
        assert_eq!(queue.len(), 1);

        service.start().unwrap();
        service.stop().unwrap();
        let (_, queue) = service.parked.as_ref().unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_apply_stops_on_shutdown() {
        let mut queue = TimerQueue::new();
        let event = Arc::new(TimedEvent::inert(Duration::from_millis(5)));
        let id = EventId::next();

        assert!(apply(&mut queue, Command::Register(id, Arc::downgrade(&event))));
        assert!(queue.contains(id));
        assert!(apply(&mut queue, Command::Unregister(id)));
        assert!(queue.is_empty());
        assert!(!apply(&mut queue, Command::Shutdown));
    }
}
