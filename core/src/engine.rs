//! The tick engine.
//!
//! ONE TICK (fixed, documented, never reordered):
//!   1. Every registered system runs, in registration order, against the
//!      same committed state. Each returns a delta and events.
//!   2. System events are concatenated in registration order, injected
//!      events appended, and the list passes through the interceptor chain.
//!   3. Deltas fold in registration order, then surviving events fold in
//!      order. The result is re-quantized and re-validated.
//!   4. The new state is pushed onto history.
//!   5. Observers are notified; the auto-checkpointer may write.
//!
//! RULES:
//!   - Steps 1–3 are `advance`, a pure function. A fault anywhere in
//!     them rejects the whole tick and the prior state stays current.
//!   - Nothing after step 4 can fail the tick.
//!   - All randomness flows through SystemRng, seeded from the inputs.

use crate::{
    bus::{EventBus, Observer},
    checkpoint::{read_bundle, AutoCheckpointer, CheckpointBundle, CheckpointWriter},
    config::SimConfig,
    error::{panic_reason, GraphConsistencyError, SimError, SimResult},
    event::Event,
    graph::{GraphBuilder, StateDelta},
    history::HistoryStack,
    intercept::{InterceptionRecord, InterceptorChain},
    quantize::{Quantize, Quantizer},
    relationship::{EdgeKey, EdgeType, Relationship},
    rng::SystemRng,
    system::{System, SystemOutput, TickInputs},
    types::Tick,
    value::{Coefficient, Currency, Intensity},
    world::{Economy, WorldState},
};
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::Arc,
};

/// Cohesion an organised entity gains per unit of mobilisation.
const UPRISING_COHESION_GAIN: f64 = 0.5;
/// Alignment shift toward -1 per unit of mobilisation.
const UPRISING_ALIGNMENT_SHIFT: f64 = 0.1;

/// Everything a committed tick produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub world:         WorldState,
    /// Surviving events, as folded.
    pub events:        Vec<Event>,
    /// What the interceptor chain blocked or replaced.
    pub interceptions: Vec<InterceptionRecord>,
}

/// Compute the next state from `current`. Pure and all-or-nothing:
/// identical arguments give a bit-identical outcome, and on error no
/// part of any system's proposal survives.
pub fn advance(
    current:   &WorldState,
    systems:   &[Box<dyn System>],
    chain:     &InterceptorChain,
    inputs:    &TickInputs,
    quantizer: &Quantizer,
) -> SimResult<TickOutcome> {
    let next_tick = current.tick() + 1;
    let mut deltas: Vec<(&'static str, StateDelta)> = Vec::with_capacity(systems.len());
    let mut events: Vec<Event> = Vec::new();

    for system in systems {
        let name = system.name();
        let fault = |reason: String| SimError::SystemExecution {
            system: name.to_string(),
            tick:   next_tick,
            reason,
        };
        let mut rng = SystemRng::derive(inputs.seed, next_tick, name);
        let SystemOutput { delta, events: emitted } =
            catch_unwind(AssertUnwindSafe(|| system.run(current, inputs, &mut rng)))
                .map_err(|payload| fault(panic_reason(payload)))?
                .map_err(|e| fault(e.to_string()))?;

        log::debug!("tick={next_tick} {name}: {} events", emitted.len());
        events.extend(emitted);
        deltas.push((name, delta));
    }
    events.extend(inputs.injected.iter().cloned());

    let chained = chain.run(events, &current.context())?;
    let world = fold(current, next_tick, &deltas, chained.events, quantizer)?;

    Ok(TickOutcome {
        events:        world.events().to_vec(),
        world,
        interceptions: chained.records,
    })
}

fn fold(
    current:   &WorldState,
    tick:      Tick,
    deltas:    &[(&'static str, StateDelta)],
    events:    Vec<Event>,
    quantizer: &Quantizer,
) -> SimResult<WorldState> {
    let mut builder = GraphBuilder::from_graph(current.graph());
    let mut economy = *current.economy();

    for (name, delta) in deltas {
        let fault = |reason: String| SimError::SystemExecution {
            system: name.to_string(),
            tick,
            reason,
        };
        builder.apply_delta(delta).map_err(|e| fault(e.to_string()))?;
        economy.surplus_pool = economy
            .surplus_pool
            .checked_add(delta.pool_credit)
            .and_then(|pool| pool.checked_sub(delta.pool_debit))
            .map_err(|e| fault(e.to_string()))?;
    }

    for event in &events {
        if event.tick() != tick {
            return Err(GraphConsistencyError::StaleEvent {
                kind:       event.kind(),
                event_tick: event.tick(),
                state_tick: tick,
            }
            .into());
        }
        apply_event(&mut builder, &mut economy, event)?;
    }

    let graph = builder.finish()?;
    Ok(WorldState::from_parts(tick, graph, economy, events).quantize_with(quantizer))
}

/// Move up to `amount` of wealth. Returns what actually moved. A payee
/// pushed past the currency bound rejects the tick.
fn transfer(
    builder: &mut GraphBuilder,
    from:    &str,
    to:      &str,
    amount:  Currency,
) -> SimResult<Currency> {
    if builder.entity(to).is_none() {
        return Err(GraphConsistencyError::UnknownEntity(to.to_string()).into());
    }
    let payer = builder.entity_mut(from)?.material_mut()?;
    let moved = amount.min(payer.wealth);
    payer.wealth = payer.wealth.saturating_sub(moved);

    let payee = builder.entity_mut(to)?.material_mut()?;
    payee.wealth = payee.wealth.checked_add(moved)?;
    Ok(moved)
}

fn record_flow(builder: &mut GraphBuilder, key: EdgeKey, moved: Currency) {
    if let Some(edge) = builder.relationship_mut(&key) {
        edge.cumulative_flow = edge.cumulative_flow.saturating_add(moved);
    }
}

fn require(builder: &GraphBuilder, id: &str) -> Result<(), GraphConsistencyError> {
    builder
        .entity(id)
        .map(|_| ())
        .ok_or_else(|| GraphConsistencyError::UnknownEntity(id.to_string()))
}

fn apply_event(
    builder: &mut GraphBuilder,
    economy: &mut Economy,
    event:   &Event,
) -> SimResult<()> {
    match event {
        Event::Extraction { source, target, amount, .. } => {
            let moved = transfer(builder, source, target, *amount)?;
            record_flow(builder, EdgeKey::new(source.as_str(), target.as_str(), EdgeType::Exploitation), moved);
            economy.cumulative_extraction = economy.cumulative_extraction.saturating_add(moved);
        }
        Event::WagePaid { employer, worker, amount, .. } => {
            let moved = transfer(builder, employer, worker, *amount)?;
            record_flow(builder, EdgeKey::new(employer.as_str(), worker.as_str(), EdgeType::Wages), moved);
        }
        Event::RentCollected { tenant, landlord, amount, .. } => {
            let moved = transfer(builder, tenant, landlord, *amount)?;
            record_flow(builder, EdgeKey::new(tenant.as_str(), landlord.as_str(), EdgeType::Tenancy), moved);
        }
        Event::Eviction { tenant, landlord, .. } => {
            require(builder, tenant)?;
            require(builder, landlord)?;
            builder.remove_relationship(&EdgeKey::new(tenant.as_str(), landlord.as_str(), EdgeType::Tenancy));
        }
        Event::Spark { entity, intensity, .. } => {
            let ideology = builder.entity_mut(entity)?.ideological_mut()?;
            ideology.agitation = ideology.agitation.raise(intensity.get());
        }
        Event::ConsciousnessRaised { entity, level, .. } => {
            builder.entity_mut(entity)?.ideological_mut()?.consciousness = *level;
        }
        Event::Uprising { entity, mobilization, .. } => {
            let subject = builder.entity_mut(entity)?;
            let ideology = subject.ideological_mut()?;
            ideology.agitation = Intensity::ZERO;
            ideology.alignment = ideology.alignment.shift(-mobilization.get() * UPRISING_ALIGNMENT_SHIFT);
            if let Some(org) = subject.components.organizational.as_mut() {
                org.cohesion = org.cohesion.raise(mobilization.get() * UPRISING_COHESION_GAIN);
            }
        }
        Event::SolidarityFormed { source, target, strength, .. } => {
            let key = EdgeKey::new(source.as_str(), target.as_str(), EdgeType::Solidarity);
            match builder.relationship_mut(&key) {
                Some(edge) => edge.strength = edge.strength.max(*strength),
                None => builder.upsert_relationship(
                    Relationship::new(source.as_str(), target.as_str(), EdgeType::Solidarity)
                        .with_strength(*strength),
                ),
            }
        }
        Event::Repression { state, target, severity, .. } => {
            require(builder, state)?;
            let subject = builder.entity_mut(target)?;
            let ideology = subject.ideological_mut()?;
            ideology.agitation = ideology.agitation.decay(Coefficient::clamped(severity.get()));
            if let Some(spatial) = subject.components.spatial.as_mut() {
                spatial.heat = spatial.heat.raise(severity.get());
            }
        }
    }
    Ok(())
}

// ── Simulation facade ──────────────────────────────────────────

/// Owns everything needed to run: config, systems, interceptor chain,
/// observers, history and the checkpoint policy.
pub struct Simulation {
    config:         SimConfig,
    quantizer:      Quantizer,
    systems:        Vec<Box<dyn System>>,
    chain:          InterceptorChain,
    bus:            EventBus,
    history:        HistoryStack,
    writer:         Arc<CheckpointWriter>,
    checkpointer:   Option<AutoCheckpointer>,
    rejected_ticks: u64,
}

impl Simulation {
    /// Build with the built-in systems and interceptors the config names.
    pub fn new(config: SimConfig, genesis: WorldState) -> SimResult<Self> {
        let systems = config.systems.iter().map(|kind| kind.build()).collect();
        let chain = InterceptorChain::new(config.interceptors.iter().map(|kind| kind.build()).collect());
        Self::with_parts(config, genesis, systems, chain)
    }

    /// Build with caller-supplied systems and chain. The config's own
    /// system and interceptor lists are kept only as a record.
    pub fn with_parts(
        config:  SimConfig,
        genesis: WorldState,
        systems: Vec<Box<dyn System>>,
        chain:   InterceptorChain,
    ) -> SimResult<Self> {
        config.validate()?;
        genesis.validate()?;
        let quantizer = config.quantizer()?;

        let writer = Arc::new(CheckpointWriter::new(config.checkpoint.dir.clone()));
        let checkpointer = (config.checkpoint.interval > 0).then(|| {
            let mut checkpointer = AutoCheckpointer::new(config.checkpoint.interval, Arc::clone(&writer));
            checkpointer.realign(genesis.tick());
            checkpointer
        });

        log::info!(
            "run {} seed={} systems={:?} interceptors={:?}",
            config.run_id,
            config.seed,
            systems.iter().map(|s| s.name()).collect::<Vec<_>>(),
            chain.names(),
        );

        let history = Self::new_history(&config, genesis.quantize_with(&quantizer));
        Ok(Self {
            config,
            quantizer,
            systems,
            chain,
            bus: EventBus::new(),
            history,
            writer,
            checkpointer,
            rejected_ticks: 0,
        })
    }

    /// Resume from a checkpoint file, using the config stored in it.
    pub fn from_checkpoint(path: &Path) -> SimResult<Self> {
        let bundle = read_bundle(path)?;
        log::info!("resuming run {} from tick {}", bundle.metadata.run_id, bundle.metadata.tick);
        Self::new(bundle.config, bundle.world)
    }

    fn new_history(config: &SimConfig, root: WorldState) -> HistoryStack {
        Self::bounded(config, HistoryStack::new(root))
    }

    fn bounded(config: &SimConfig, stack: HistoryStack) -> HistoryStack {
        match config.history_depth {
            Some(depth) => stack.with_max_depth(depth),
            None => stack,
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer>) {
        self.bus.subscribe(observer);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn current(&self) -> &WorldState {
        self.history.current()
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn checkpointer(&self) -> Option<&AutoCheckpointer> {
        self.checkpointer.as_ref()
    }

    pub fn rejected_ticks(&self) -> u64 {
        self.rejected_ticks
    }

    /// Advance one tick. On error the simulation stays at its last good state.
    pub fn tick(&mut self, inputs: &TickInputs) -> SimResult<TickOutcome> {
        let current = self.history.current_arc();
        let outcome = match advance(&current, &self.systems, &self.chain, inputs, &self.quantizer) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.rejected_ticks += 1;
                log::error!("tick={} rejected: {e}", current.tick() + 1);
                return Err(e);
            }
        };

        self.history = self.history.push(outcome.world.clone());
        let committed = self.history.current_arc();
        log::debug!(
            "tick={} committed: {} events, {} interceptions",
            committed.tick(),
            outcome.events.len(),
            outcome.interceptions.len()
        );

        self.bus.publish(&committed, &outcome.events);
        if let Some(checkpointer) = &mut self.checkpointer {
            checkpointer.on_commit(&committed, &self.config);
        }
        Ok(outcome)
    }

    /// Advance one tick with inputs derived from the config seed.
    pub fn step(&mut self) -> SimResult<TickOutcome> {
        let inputs = TickInputs::seeded(self.config.seed);
        self.tick(&inputs)
    }

    /// Run n ticks in a loop. Stops at the first rejected tick.
    pub fn run_ticks(&mut self, n: u64) -> SimResult<()> {
        for _ in 0..n {
            self.step()?;
        }
        Ok(())
    }

    pub fn undo(&mut self) -> SimResult<&WorldState> {
        self.history = self.history.undo()?;
        self.realign_checkpoints();
        Ok(self.history.current())
    }

    pub fn redo(&mut self) -> SimResult<&WorldState> {
        self.history = self.history.redo()?;
        self.realign_checkpoints();
        Ok(self.history.current())
    }

    fn realign_checkpoints(&mut self) {
        let tick = self.history.current().tick();
        if let Some(checkpointer) = &mut self.checkpointer {
            checkpointer.realign(tick);
        }
    }

    /// Write a checkpoint of the current state now.
    pub fn checkpoint_now(&self, label: &str) -> SimResult<PathBuf> {
        let bundle = CheckpointBundle::new(self.current().clone(), self.config.clone(), label);
        let path = self.writer.write(&bundle)?;
        log::info!("tick={} checkpoint '{label}' written to {}", bundle.world.tick(), path.display());
        Ok(path)
    }

    /// Replace history with a fresh stack rooted at a checkpointed state.
    pub fn restore(&mut self, path: &Path) -> SimResult<&WorldState> {
        let mut bundle = read_bundle(path)?;
        if bundle.config.run_id != self.config.run_id {
            log::warn!(
                "restoring checkpoint from run {} into run {}",
                bundle.config.run_id,
                self.config.run_id
            );
        }
        bundle.world = bundle.world.quantize_with(&self.quantizer);
        self.history = Self::bounded(&self.config, HistoryStack::from_bundle(bundle));
        self.realign_checkpoints();
        Ok(self.history.current())
    }
}
