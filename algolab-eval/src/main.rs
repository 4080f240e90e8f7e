//! algolab-eval - algorithm evaluation CLI
//!
//! Validates registered algorithms against the annotated corpus, records
//! test runs in the ledger, promotes runs to versions, and serves the
//! classification proxy endpoint.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use algolab_common::config::{default_config_path, load_toml_config, resolve_database_path, TomlConfig};
use algolab_eval::config::resolve_llm_api_key;
use algolab_eval::corpus::SqliteCorpusStore;
use algolab_eval::init::{build_default_registry, build_transport, TransportMode};
use algolab_eval::ledger::{CreateVersionInput, Ledger};
use algolab_eval::registry::AlgorithmRegistry;
use algolab_eval::validation::{HarnessOptions, ValidationHarness, ValidationRun, WriteBackConfig};
use algolab_eval::AppState;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "algolab-eval")]
#[command(about = "Evaluate and version conversational-turn algorithms")]
#[command(version)]
struct Args {
    /// TOML bootstrap file (defaults to ~/.config/algolab/algolab.toml)
    #[arg(long, env = "ALGOLAB_CONFIG")]
    config: Option<PathBuf>,

    /// Database file (overrides ALGOLAB_DATABASE and the TOML setting)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Reach the language model through the proxy endpoint
    #[arg(long)]
    proxy: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered algorithms
    List,
    /// Validate one algorithm against the corpus
    Validate {
        key: String,
        #[arg(long)]
        sample_size: Option<usize>,
        /// Skip writing projections back to the corpus
        #[arg(long)]
        no_write_back: bool,
        /// Record the run in the ledger
        #[arg(long)]
        capture: bool,
        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate several algorithms on the same corpus
    Compare {
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long)]
        sample_size: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run an algorithm on the built-in smoke sentences
    QuickTest { key: String },
    /// Show recorded test runs of an algorithm
    Runs {
        key: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Promote a test run to a version
    Promote {
        run_id: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        changelog: Option<String>,
        /// Make the new version the baseline of its target
        #[arg(long)]
        baseline: bool,
    },
    /// Run the classification proxy endpoint
    Serve {
        #[arg(short, long, default_value = "5780", env = "ALGOLAB_PORT")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let toml_config = load_toml_config(&config_path)?;

    // Log to the configured file when set, stderr otherwise
    let file_layer = match &toml_config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = file_layer
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("algolab_eval={0},algolab_common={0}", toml_config.logging.level))),
        )
        .with(file_layer)
        .with(stderr_layer)
        .init();

    info!("algolab-eval {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));

    let db_path = resolve_database_path(args.database.as_deref(), &toml_config);
    info!("Database: {}", db_path.display());
    let pool = algolab_eval::db::open(&db_path)
        .await
        .context("Failed to open database")?;

    // The proxy server always calls the model directly
    let mode = match (&args.command, args.proxy) {
        (Command::Serve { .. }, _) | (_, false) => TransportMode::Direct,
        (_, true) => TransportMode::Proxy,
    };
    let registry = Arc::new(build_registry(&pool, &toml_config, mode).await?);

    match args.command {
        Command::List => list(&registry),
        Command::Validate {
            key,
            sample_size,
            no_write_back,
            capture,
            seed,
        } => {
            let harness = build_harness(&pool, &registry, &toml_config, !no_write_back, seed);
            let cancel = cancel_on_ctrl_c();
            let run = harness.validate(&key, sample_size, &cancel).await?;
            print_run(&run);
            if capture {
                let test_run = Ledger::new(pool.clone())
                    .capture_version_after_test(&run, &registry)
                    .await?;
                println!("captured test run {}", test_run.run_id);
                if let Some(diff) = &test_run.baseline_diff {
                    println!(
                        "vs baseline {}: accuracy {:+.3}, kappa {:+.3}",
                        test_run.baseline_version_id.as_deref().unwrap_or("?"),
                        diff.accuracy_delta,
                        diff.kappa_delta
                    );
                }
            }
        }
        Command::Compare {
            keys,
            sample_size,
            seed,
        } => {
            let harness = build_harness(&pool, &registry, &toml_config, false, seed);
            let cancel = cancel_on_ctrl_c();
            for run in harness.compare(&keys, sample_size, &cancel).await {
                print_run(&run);
            }
        }
        Command::QuickTest { key } => {
            let harness = build_harness(&pool, &registry, &toml_config, false, None);
            for result in harness.quick_test(&key).await? {
                println!(
                    "{:<24} confidence {:.2}{}",
                    result.prediction,
                    result.confidence,
                    result
                        .fallback_reason
                        .map(|r| format!(" (fallback: {})", r))
                        .unwrap_or_default()
                );
            }
        }
        Command::Runs { key, limit } => {
            for run in Ledger::new(pool.clone()).runs_for_algorithm(&key, limit).await? {
                println!(
                    "{}  {}  v{}  n={}  accuracy {:.3}  kappa {:.3}  {}",
                    run.run_date.format("%Y-%m-%d %H:%M"),
                    run.run_id,
                    run.algorithm_version,
                    run.sample_size,
                    run.metrics.accuracy,
                    run.metrics.kappa,
                    run.outcome
                );
            }
        }
        Command::Promote {
            run_id,
            name,
            description,
            changelog,
            baseline,
        } => {
            let version = Ledger::new(pool.clone())
                .promote_to_version(
                    run_id,
                    CreateVersionInput {
                        version_name: name,
                        description,
                        changelog,
                        is_baseline: baseline,
                        ..Default::default()
                    },
                )
                .await?;
            println!("promoted to {} ({})", version.version_id, version.status);
        }
        Command::Serve { port } => serve(registry, port).await?,
    }

    Ok(())
}

async fn build_registry(
    pool: &SqlitePool,
    toml_config: &TomlConfig,
    mode: TransportMode,
) -> Result<AlgorithmRegistry> {
    let api_key = match mode {
        TransportMode::Direct => resolve_llm_api_key(pool, toml_config)
            .await?
            .map(|(key, _)| key),
        TransportMode::Proxy => None,
    };
    let transport = build_transport(&toml_config.llm, api_key, mode)?;
    Ok(build_default_registry(transport, &toml_config.llm.model))
}

fn build_harness(
    pool: &SqlitePool,
    registry: &Arc<AlgorithmRegistry>,
    toml_config: &TomlConfig,
    write_back: bool,
    seed: Option<u64>,
) -> ValidationHarness {
    let options = HarnessOptions {
        write_back: write_back && toml_config.harness.write_back,
        write_back_config: WriteBackConfig::from(&toml_config.harness),
        seed,
        ..Default::default()
    };
    ValidationHarness::with_options(
        Arc::clone(registry),
        Arc::new(SqliteCorpusStore::new(pool.clone())),
        options,
    )
}

fn list(registry: &AlgorithmRegistry) {
    for descriptor in registry.list() {
        println!(
            "{:<22} {:<3} v{:<8} {}",
            descriptor.key, descriptor.target, descriptor.version, descriptor.display_name
        );
    }
    for (key, valid) in registry.validate_all() {
        if !valid {
            warn!(algorithm = %key, "Configuration check failed");
        }
    }
}

fn print_run(run: &ValidationRun) {
    let m = &run.metrics;
    println!(
        "{} v{} [{}]: n={} accuracy {:.1}% kappa {:.3} macro-F1 {:.3} fallbacks {}{}",
        run.algorithm_key,
        run.algorithm_version,
        run.target,
        run.sample_size(),
        m.accuracy_percent(),
        m.kappa,
        m.macro_f1,
        m.fallback_count,
        if run.cancelled { " (cancelled)" } else { "" }
    );
    for cluster in run.errors.clusters.iter().take(5) {
        println!(
            "  {} -> {}: {}",
            cluster.expected, cluster.predicted, cluster.frequency
        );
    }
    for suggestion in &run.errors.suggestions {
        println!("  hint: {}", suggestion);
    }
    if let Some(report) = &run.write_back {
        println!(
            "  write-back: {} ok, {} failed, {} skipped",
            report.succeeded, report.failed, report.skipped
        );
    }
}

/// Token cancelled on the first Ctrl+C; the harness keeps partial results
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, stopping after the current sample");
            child.cancel();
        }
    });
    token
}

async fn serve(registry: Arc<AlgorithmRegistry>, port: u16) -> Result<()> {
    let app = algolab_eval::build_router(AppState::new(registry));
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
