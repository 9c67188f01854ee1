//! Runs the order commander against scripted collaborator outages and prints
//! where each order ended up.

mod scenarios;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use commander_core::{OrderSnapshot, TaskType, User};
use commander_orchestrator::{
    Commander, CommanderConfig, RetryParams, TimeLimits, WorkerPool, WorkerPoolConfig,
};

use crate::scenarios::Scenario;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario to run; all of them when omitted
    #[arg(value_enum)]
    scenario: Option<Scenario>,

    /// Worker threads running the background stages
    #[arg(short, long, default_value = "8", env = "COMMANDER_WORKERS")]
    workers: usize,

    /// Use short retry delays and time budgets instead of COMMANDER_* settings
    #[arg(long)]
    fast: bool,

    /// Seconds to wait for a scenario's background work to finish
    #[arg(long, default_value = "600")]
    settle_secs: u64,
}

#[derive(Serialize)]
struct Report {
    scenario: String,
    settled: bool,
    order: OrderSnapshot,
    payments_taken: usize,
    messages_sent: usize,
    queued_tasks: Vec<TaskType>,
    escalated_orders: usize,
}

fn fast_config() -> CommanderConfig {
    CommanderConfig::default()
        .with_retry(RetryParams::new(1, Duration::from_millis(200)))
        .with_limits(TimeLimits::new(
            Duration::from_secs(10),
            Duration::from_secs(1),
            Duration::from_secs(6),
            Duration::from_secs(5),
            Duration::from_secs(4),
        ))
}

fn run(scenario: Scenario, config: CommanderConfig, args: &Args) -> anyhow::Result<Report> {
    let pool = Arc::new(
        WorkerPool::start(
            WorkerPoolConfig::default()
                .with_name(format!("demo-{}", scenario.name()))
                .with_workers(args.workers),
        )
        .context("starting worker pool")?,
    );

    let stubs = scenario.stubs();
    let commander = Commander::builder(stubs.collaborators(), config)
        .with_spawner(pool.clone())
        .build();

    info!(scenario = %scenario.name(), "running scenario");
    let order = commander.place_order(User::new("Jim", "ABCD"), "book", 10.0);

    let settled = pool.wait_idle(Duration::from_secs(args.settle_secs));
    if !settled {
        warn!(scenario = %scenario.name(), "background work still running, reporting current state");
    }
    pool.shutdown();

    Ok(Report {
        scenario: scenario.name(),
        settled,
        order: order.snapshot(),
        payments_taken: stubs.payment.payments_taken(),
        messages_sent: stubs.messaging.requests().len(),
        queued_tasks: stubs.queue.added_types(),
        escalated_orders: stubs.employee.orders().len(),
    })
}

fn main() -> anyhow::Result<()> {
    commander_observability::init();
    let args = Args::parse();

    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }

    let config = if args.fast {
        fast_config()
    } else {
        CommanderConfig::from_env().context("reading COMMANDER_* settings")?
    };

    let selected: Vec<Scenario> = match args.scenario {
        Some(one) => vec![one],
        None => Scenario::all().to_vec(),
    };

    for scenario in selected {
        let report = run(scenario, config, &args)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
