use anyhow::Context;
use chrono::Local;
use clap::Parser;
use log::{LevelFilter, error, info};
use pushdb_bench::client::connect;
use pushdb_bench::config::PushConfig;
use pushdb_bench::error::BenchError;
use pushdb_bench::harness::{
    DEFAULT_CONCURRENCY, DEFAULT_KEY_LEN, DEFAULT_TOTAL, Harness, HarnessConfig, MIN_KEY_LEN,
    Workload,
};
use pushdb_bench::memory::InMemoryPushService;
use pushdb_bench::model::PushDbModel;
use pushdb_bench::retry::RetryPolicy;
use pushdb_bench::service::RemoteService;
use std::process::ExitCode;
use std::sync::Arc;

// Load generator for the push database procedures.
//
// Usage:
//   pushdb-bench subs ping change           # against PUSH_CONFIG_FILE's db_connect
//   pushdb-bench -c 4 -n 1000 subs ping     # 4 workers, 1000 requests per run
//   pushdb-bench --dry-run subs change      # in-memory procedures, no database

#[derive(Debug, Parser)]
#[command(name = "pushdb-bench", version, about = "Push database benchmark client")]
struct Cli {
    /// Number of concurrent workers.
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY, value_parser = at_least::<1>)]
    concurrency: usize,

    /// Total number of requests per run.
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOTAL, value_parser = at_least::<1>)]
    total: usize,

    /// Length of generated device and subscription ids.
    #[arg(short = 'l', long, default_value_t = DEFAULT_KEY_LEN, value_parser = at_least::<MIN_KEY_LEN>)]
    key_len: usize,

    /// Do not log throughput samples while running.
    #[arg(short = 's', long)]
    silent: bool,

    /// Run against in-memory procedures instead of the database.
    #[arg(long)]
    dry_run: bool,

    /// Workloads to run, in order.
    #[arg(value_enum, required = true)]
    commands: Vec<Workload>,
}

fn at_least<const MIN: usize>(s: &str) -> Result<usize, String> {
    let value: usize = s.parse().map_err(|e| format!("{e}"))?;
    if value < MIN {
        return Err(format!("must be at least {MIN}"));
    }
    Ok(value)
}

fn init_logging(level: LevelFilter) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = if cli.dry_run {
        PushConfig::default()
    } else {
        match PushConfig::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", BenchError::from(e));
                return ExitCode::FAILURE;
            }
        }
    };
    init_logging(config.ews.log.level_filter());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    match rt.block_on(run(cli, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: "Harness", "{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: PushConfig) -> anyhow::Result<()> {
    let service: Arc<dyn RemoteService> = if cli.dry_run {
        info!(target: "Harness", "Dry run: using in-memory procedures");
        Arc::new(InMemoryPushService::new())
    } else {
        let address = &config.ews.server.db_connect;
        connect(address, config.db.connect_options(), &RetryPolicy::default())
            .await
            .context("Database connection failed")?
    };

    let harness = Harness::new(
        PushDbModel::new(service),
        HarnessConfig {
            concurrency: cli.concurrency,
            total: cli.total,
            key_len: cli.key_len,
            silent: cli.silent || config.ews.log.silent,
        },
    );
    for workload in cli.commands {
        harness
            .run(workload)
            .await
            .with_context(|| format!("{workload} run failed"))?;
    }
    Ok(())
}
