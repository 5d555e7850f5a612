//! sim-runner: headless runner for the dialectic simulation.
//!
//! Usage:
//!   sim-runner --seed 12345 --ticks 365 --db run.db
//!   sim-runner --config run.json --scenario town.json --checkpoint-dir ckpt --interval 50
//!   sim-runner --resume ckpt/checkpoint-0000000100.json --ticks 100

use anyhow::{Context, Result};
use dialectic_core::{
    bus::EventLogObserver,
    checkpoint::latest_in,
    config::SimConfig,
    engine::Simulation,
    scenario::Scenario,
    store::SimStore,
};
use std::{env, path::Path};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ticks = parse_arg(&args, "--ticks", 100u64);
    let db = flag_value(&args, "--db").unwrap_or(":memory:");

    let mut sim = match flag_value(&args, "--resume") {
        Some(path) => resume(path)?,
        None => fresh(&args)?,
    };

    let run_id = sim.config().run_id.clone();
    let seed = sim.config().seed;

    println!("dialectic sim-runner");
    println!("  run_id:      {run_id}");
    println!("  seed:        {seed}");
    println!("  start tick:  {}", sim.current().tick());
    println!("  ticks:       {ticks}");
    println!("  db:          {db}");
    println!();

    // For :memory: use a shared-cache URI so the observer's connection and
    // the summary reader see the same database.
    let db_effective: String = if db == ":memory:" {
        format!("file:simrun_{}?mode=memory&cache=shared", chrono::Utc::now().timestamp())
    } else {
        db.to_string()
    };
    let store = SimStore::open(&db_effective)?;
    store.migrate()?;
    store.insert_run(&run_id, seed, env!("CARGO_PKG_VERSION"))?;
    let reader = SimStore::open(&db_effective)?;

    sim.add_observer(Box::new(EventLogObserver::new(run_id.clone(), store)));

    let ran = run(&mut sim, ticks);
    print_summary(&sim, &reader, &run_id, ran)?;
    Ok(())
}

fn fresh(args: &[String]) -> Result<Simulation> {
    let mut config = match flag_value(args, "--config") {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default_test(),
    };
    if let Some(seed) = flag_value(args, "--seed") {
        config.seed = seed.parse().with_context(|| format!("invalid --seed {seed}"))?;
    }
    if let Some(dir) = flag_value(args, "--checkpoint-dir") {
        let interval = parse_arg(args, "--interval", config.checkpoint.interval.max(1));
        config = config.with_checkpoints(interval, dir);
    }

    let scenario = match flag_value(args, "--scenario") {
        Some(path) => Scenario::load(path)?,
        None => Scenario::company_town(),
    };
    log::info!("scenario '{}' with {} entities", scenario.name, scenario.entities.len());

    Ok(Simulation::new(config, scenario.genesis()?)?)
}

/// Accepts a checkpoint file or a directory of checkpoints.
fn resume(path: &str) -> Result<Simulation> {
    let path = Path::new(path);
    let file = if path.is_dir() {
        latest_in(path)?.with_context(|| format!("no checkpoints in {}", path.display()))?
    } else {
        path.to_path_buf()
    };
    Ok(Simulation::from_checkpoint(&file)?)
}

/// Run until `ticks` commit or one is rejected. Returns ticks committed.
fn run(sim: &mut Simulation, ticks: u64) -> u64 {
    for done in 0..ticks {
        if let Err(e) = sim.step() {
            eprintln!("stopped after {done} ticks: {e}");
            return done;
        }
    }
    ticks
}

fn print_summary(sim: &Simulation, store: &SimStore, run_id: &str, ran: u64) -> Result<()> {
    let world = sim.current();
    let economy = world.economy();

    println!("=== RUN SUMMARY ===");
    println!("  ticks run:          {ran}");
    println!("  final tick:         {}", world.tick());
    println!("  digest:             {:016x}", world.digest()?);
    println!("  entities:           {}", world.graph().entity_count());
    println!("  relationships:      {}", world.graph().relationship_count());
    println!("  total wealth:       {:.5}", world.graph().total_wealth());
    println!("  surplus pool:       {}", economy.surplus_pool);
    println!("  cum. extraction:    {}", economy.cumulative_extraction);
    println!("  rejected ticks:     {}", sim.rejected_ticks());
    println!("  events logged:      {}", store.event_count(run_id)?);

    println!();
    println!("=== EVENTS BY TYPE ===");
    for kind in ["extraction", "wage_paid", "rent_collected", "eviction", "spark", "uprising", "repression"] {
        println!("  {kind:<16} {}", store.event_count_by_type(run_id, kind)?);
    }

    if let Some(checkpointer) = sim.checkpointer() {
        println!();
        println!("=== CHECKPOINTS ===");
        println!("  interval:  {}", checkpointer.interval());
        println!("  written:   {}", checkpointer.writes());
        println!("  failed:    {}", checkpointer.failures());
        if let Some(last) = checkpointer.last_written() {
            println!("  last:      {}", last.display());
        }
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
