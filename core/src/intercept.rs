//! The interceptor chain: middleware that may block or rewrite events
//! before they are folded into state.
//!
//! RULE: The chain is a single left-to-right pass per event. Whatever
//! interceptor k returns is what interceptor k+1 sees; once an event is
//! blocked no later interceptor sees it. Interceptors get a read-only
//! `WorldContext` of the prior state and have no effect beyond their
//! return value.

use crate::{
    error::{panic_reason, SimError, SimResult},
    event::Event,
    relationship::EdgeType,
    value::{Coefficient, Currency},
    world::WorldContext,
};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptResult {
    Pass,
    Block { reason: String },
    Replace(Event),
}

pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept(&self, event: &Event, ctx: &WorldContext<'_>) -> SimResult<InterceptResult>;
}

/// What an interceptor did to an event, kept for the tick's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InterceptAction {
    Blocked { reason: String },
    Replaced { replacement: Event },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptionRecord {
    pub interceptor: String,
    pub original:    Event,
    pub action:      InterceptAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Surviving events in their original relative order.
    pub events:  Vec<Event>,
    pub records: Vec<InterceptionRecord>,
}

#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Box<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Box<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn push(&mut self, interceptor: Box<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Run every event through the chain. Any interceptor fault, error
    /// or panic, aborts the whole pass.
    pub fn run(&self, events: Vec<Event>, ctx: &WorldContext<'_>) -> SimResult<ChainOutcome> {
        let mut outcome = ChainOutcome::default();

        'events: for event in events {
            let mut current = event;
            for interceptor in &self.interceptors {
                let fault = |reason: String| SimError::InterceptorExecution {
                    interceptor: interceptor.name().to_string(),
                    tick:        ctx.tick() + 1,
                    reason,
                };
                let result = catch_unwind(AssertUnwindSafe(|| interceptor.intercept(&current, ctx)))
                    .map_err(|payload| fault(panic_reason(payload)))?
                    .map_err(|e| fault(e.to_string()))?;

                match result {
                    InterceptResult::Pass => {}
                    InterceptResult::Block { reason } => {
                        log::debug!(
                            "tick={} {} blocked {}: {reason}",
                            ctx.tick() + 1,
                            interceptor.name(),
                            current.kind()
                        );
                        outcome.records.push(InterceptionRecord {
                            interceptor: interceptor.name().to_string(),
                            original:    current,
                            action:      InterceptAction::Blocked { reason },
                        });
                        continue 'events;
                    }
                    InterceptResult::Replace(replacement) => {
                        log::debug!(
                            "tick={} {} replaced {} with {}",
                            ctx.tick() + 1,
                            interceptor.name(),
                            current.kind(),
                            replacement.kind()
                        );
                        outcome.records.push(InterceptionRecord {
                            interceptor: interceptor.name().to_string(),
                            original:    current,
                            action:      InterceptAction::Replaced { replacement: replacement.clone() },
                        });
                        current = replacement;
                    }
                }
            }
            outcome.events.push(current);
        }

        Ok(outcome)
    }
}

// ── Built-in interceptors ──────────────────────────────────────

/// Configurable names for the built-in interceptors, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterceptorKind {
    CounterIntelligence { threshold: Coefficient },
    ExtractionCap { max: Currency },
}

impl InterceptorKind {
    pub fn build(self) -> Box<dyn Interceptor> {
        match self {
            Self::CounterIntelligence { threshold } => Box::new(CounterIntelligence { threshold }),
            Self::ExtractionCap { max }             => Box::new(ExtractionCap { max }),
        }
    }
}

/// Suppresses sparks and uprisings on entities held under a repression
/// edge at least as strong as `threshold`.
pub struct CounterIntelligence {
    pub threshold: Coefficient,
}

impl Interceptor for CounterIntelligence {
    fn name(&self) -> &'static str { "counter_intelligence" }

    fn intercept(&self, event: &Event, ctx: &WorldContext<'_>) -> SimResult<InterceptResult> {
        let entity = match event {
            Event::Spark { entity, .. } | Event::Uprising { entity, .. } => entity,
            _ => return Ok(InterceptResult::Pass),
        };
        let watcher = ctx
            .incoming(entity)
            .find(|r| r.edge_type == EdgeType::Repression && r.strength >= self.threshold);
        Ok(match watcher {
            Some(edge) => InterceptResult::Block {
                reason: format!("{} surveilled by {}", entity, edge.source),
            },
            None => InterceptResult::Pass,
        })
    }
}

/// Caps the amount any single extraction event may move.
pub struct ExtractionCap {
    pub max: Currency,
}

impl Interceptor for ExtractionCap {
    fn name(&self) -> &'static str { "extraction_cap" }

    fn intercept(&self, event: &Event, _ctx: &WorldContext<'_>) -> SimResult<InterceptResult> {
        match event {
            Event::Extraction { tick, source, target, amount } if *amount > self.max => {
                Ok(InterceptResult::Replace(Event::Extraction {
                    tick:   *tick,
                    source: source.clone(),
                    target: target.clone(),
                    amount: self.max,
                }))
            }
            _ => Ok(InterceptResult::Pass),
        }
    }
}
