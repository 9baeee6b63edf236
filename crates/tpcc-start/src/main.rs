use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tpcc_core::{
    Config, Connector, MixConfig, MockBehavior, MockConnector, RunController, RunReport,
    SqliteConnector, TransactionKind,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tpcc-start")]
#[command(about = "TPC-C style load driver - runs the five-transaction mix and checks the constraints")]
struct Args {
    /// Path to configuration file; built-in defaults when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of warehouses
    #[arg(short = 'w', long)]
    warehouses: Option<u32>,

    /// Number of connections, one worker each
    #[arg(short = 'c', long)]
    connections: Option<u32>,

    /// Ramp-up time in seconds
    #[arg(short = 'r', long)]
    rampup: Option<u64>,

    /// Measurement time in seconds
    #[arg(short = 'l', long)]
    measure: Option<u64>,

    /// Report interval in seconds
    #[arg(short = 'i', long)]
    interval: Option<u64>,

    /// Dispatch cycles per worker
    #[arg(short = 't', long)]
    transactions: Option<u64>,

    /// SQLite database file
    #[arg(short = 'f', long)]
    db_file: Option<PathBuf>,

    /// Response time limit for one kind, e.g. `delivery=80` (repeatable)
    #[arg(long = "sla", value_name = "KIND=MS")]
    sla: Vec<String>,

    /// Mix ratio as new_order:payment:order_status:delivery:stock_level
    #[arg(long)]
    mix: Option<String>,

    /// Split warehouses and connections across this many nodes
    #[arg(long)]
    node_count: Option<u32>,

    /// Attempts allowed per transaction
    #[arg(long)]
    retry_budget: Option<u32>,

    /// Seed for all random inputs
    #[arg(long)]
    seed: Option<u64>,

    /// Store backend: sqlite or mock
    #[arg(long, default_value = "sqlite")]
    mode: String,

    /// Directory the JSON report is written to
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &args)?;
    config.validate().context("Invalid configuration")?;
    print_parameters(&config);

    let connector: Arc<dyn Connector> = match args.mode.as_str() {
        "sqlite" => Arc::new(
            SqliteConnector::from_config(&config.store)
                .context("DB file (-f or store.path) is not provided")?,
        ),
        "mock" => Arc::new(MockConnector::new(MockBehavior::AlwaysCommit {
            latency: Duration::from_millis(1),
        })),
        _ => anyhow::bail!("Invalid mode: {}, must be 'sqlite' or 'mock'", args.mode),
    };
    info!("Using store: {}", connector.name());

    // every worker blocks a thread of the blocking pool for the whole run
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.run.connections as usize + 4)
        .build()
        .context("Failed to build runtime")?;

    let controller = RunController::new(config, connector).context("Failed to set up run")?;
    let report = runtime.block_on(controller.run())?;

    print!("\n{report}");
    save_report(&report, &args.output_dir)?;

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) -> Result<()> {
    let run = &mut config.run;
    if let Some(w) = args.warehouses {
        run.warehouses = w;
    }
    if let Some(c) = args.connections {
        run.connections = c;
    }
    if let Some(secs) = args.rampup {
        run.rampup_ms = secs * 1000;
    }
    if let Some(secs) = args.measure {
        run.measure_ms = secs * 1000;
    }
    if let Some(secs) = args.interval {
        run.report_interval_ms = secs * 1000;
    }
    if let Some(t) = args.transactions {
        run.transactions_per_worker = t;
    }
    if let Some(n) = args.node_count {
        run.node_count = n;
    }
    if let Some(budget) = args.retry_budget {
        run.retry_budget = budget;
    }
    if args.seed.is_some() {
        run.seed = args.seed;
    }
    if let Some(path) = &args.db_file {
        config.store.path = Some(path.clone());
    }

    for entry in &args.sla {
        let (kind, ms) = entry
            .split_once('=')
            .with_context(|| format!("Invalid --sla {entry:?}, expected KIND=MS"))?;
        let kind: TransactionKind = kind.trim().parse()?;
        let ms: u64 = ms
            .trim()
            .parse()
            .with_context(|| format!("Invalid response time limit in --sla {entry:?}"))?;
        config.sla.set_limit_ms(kind, ms);
    }
    if let Some(ratio) = &args.mix {
        config.mix = MixConfig::parse_ratio(ratio)?;
    }
    Ok(())
}

fn print_parameters(config: &Config) {
    let run = &config.run;
    println!("<Parameters>");
    println!("  [warehouse]: {}", run.warehouses);
    println!(" [connection]: {}", run.connections);
    println!("     [rampup]: {} (sec.)", run.rampup_ms as f64 / 1000.0);
    println!("    [measure]: {} (sec.)", run.measure_ms as f64 / 1000.0);
    println!("   [interval]: {} (sec.)", run.report_interval_ms as f64 / 1000.0);
    let w = config.mix.weights();
    println!(
        "      [ratio]: {}:{}:{}:{}:{}",
        w[0], w[1], w[2], w[3], w[4]
    );
    if run.node_count > 0 {
        println!("      [nodes]: {}", run.node_count);
    }
    if let Some(path) = &config.store.path {
        println!("         [db]: {}", path.display());
    }
}

fn save_report(report: &RunReport, dir: &Path) -> Result<()> {
    let path = report
        .save_json(dir)
        .with_context(|| format!("Failed to write report to {:?}", dir))?;
    info!("Results written to {}", path.display());
    Ok(())
}
