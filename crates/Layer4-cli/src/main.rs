//! docpool CLI - Main entry point

mod cli;
mod init;

use clap::{Parser, Subcommand};
use docpool_foundation::{DocpoolConfig, Environment, DOCPOOL_CONFIG_FILE};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// docpool - out-of-process document parsing with an LRU cache
#[derive(Parser, Debug)]
#[command(name = "docpool")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: ./docpool.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a file through the worker pool and print the result as JSON
    Parse(cli::ParseArgs),

    /// Write a default configuration file
    Init {
        /// Where to write the file
        #[arg(long, default_value = DOCPOOL_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the detected environment and effective pool settings
    Env,

    /// Serve parse requests on stdin/stdout (started by the pool)
    #[command(hide = true)]
    Worker,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // worker는 자체 subscriber를 설치하고 tokio 런타임 없이 동작
    if let Command::Worker = args.command {
        docpool_cache::run_standard_worker()?;
        return Ok(());
    }

    // Initialize logging (stdout은 JSON 출력 전용)
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match args.command {
        Command::Init { path, force } => init::init_config(&path, force),
        Command::Env => {
            let config = load_config(args.config.as_ref())?;
            print_env(&config);
            Ok(())
        }
        Command::Parse(parse) => {
            let config = load_config(args.config.as_ref())?;
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(cli::run_parse(config, parse))
        }
        Command::Worker => Ok(()),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<DocpoolConfig> {
    let config = match path {
        Some(path) => DocpoolConfig::load(path)?,
        None => DocpoolConfig::load_or_default(DOCPOOL_CONFIG_FILE)?,
    };
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

fn print_env(config: &DocpoolConfig) {
    let env = Environment::detect();
    let mut config = config.clone();
    config.apply_env(&env);
    let pool = docpool_task::PoolConfig::from_settings(&config, &env);

    println!("{}", env.to_system_info());
    println!("Workers: {}", pool.max_workers);
    println!("Parser timeout: {}s", pool.task_timeout.as_secs());
    println!("Max tasks per worker: {}", pool.max_tasks_per_worker);
    if pool.memory_limit > 0 {
        println!("Worker memory limit: {} MiB", pool.memory_limit / (1024 * 1024));
    } else {
        println!("Worker memory limit: unsupported or disabled");
    }
    println!(
        "Cache: {} entries, bodies up to {} bytes",
        config.cache.cache_size, config.cache.max_cacheable_body_len
    );
}
