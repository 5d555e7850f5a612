//! The event bus: read-only fan-out to observers after a tick commits.
//!
//! RULE: Observers run only after the new state is fully folded and
//! pushed onto history. Nothing they return reaches the engine: errors
//! and panics are caught, logged and counted, never propagated.

use crate::{
    error::{panic_reason, SimResult},
    event::{Event, EventLogEntry},
    store::SimStore,
    types::RunId,
    world::WorldState,
};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A read-only subscriber notified after every committed tick.
pub trait Observer: Send {
    fn name(&self) -> &'static str;

    fn on_tick_committed(&mut self, world: &WorldState, events: &[Event]) -> SimResult<()>;
}

#[derive(Default)]
pub struct EventBus {
    observers: Vec<Box<dyn Observer>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Notify every observer in subscription order. Returns how many failed.
    pub fn publish(&mut self, world: &WorldState, events: &[Event]) -> usize {
        let mut failures = 0;
        for observer in &mut self.observers {
            let name = observer.name();
            let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_tick_committed(world, events)));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => panic_reason(payload),
            };
            failures += 1;
            log::warn!("tick={} observer '{name}' failed: {reason}", world.tick());
        }
        failures
    }
}

/// Persists every committed event to the SQLite event log.
pub struct EventLogObserver {
    run_id: RunId,
    store:  SimStore,
}

impl EventLogObserver {
    pub fn new(run_id: RunId, store: SimStore) -> Self {
        Self { run_id, store }
    }

    pub fn store(&self) -> &SimStore {
        &self.store
    }
}

impl Observer for EventLogObserver {
    fn name(&self) -> &'static str { "event_log" }

    fn on_tick_committed(&mut self, world: &WorldState, events: &[Event]) -> SimResult<()> {
        let entries = events
            .iter()
            .enumerate()
            .map(|(seq, event)| -> SimResult<EventLogEntry> {
                Ok(EventLogEntry {
                    id:         None,
                    run_id:     self.run_id.clone(),
                    tick:       world.tick(),
                    seq:        seq as u32,
                    event_type: event.kind().to_string(),
                    payload:    serde_json::to_string(event)?,
                })
            })
            .collect::<SimResult<Vec<_>>>()?;
        self.store.record_tick(&self.run_id, world.tick(), &entries)
    }
}
