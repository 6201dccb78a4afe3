//! CLI entry point. Subcommands mirror the teacher's `commands/` split
//! (one `handle_*` per concern): `run` does both ingest and serve in one
//! process (the common deployment), `ingest`/`serve` split them for
//! independent scaling, and `validate-config` fails fast on a bad
//! environment without touching MQTT/Redis/MySQL.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use chrono::Duration as ChronoDuration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fanethub::auth;
use fanethub::batch_writer::{self, BatchWriterConfig};
use fanethub::boundary::{BoundaryConfig, BoundaryTracker};
use fanethub::broadcaster::Broadcaster;
use fanethub::config::{Config, LogFormat};
use fanethub::db::repo;
use fanethub::db::build_pool;
use fanethub::ingest::{IngestSupervisor, Pipeline};
use fanethub::live_store::RedisLiveStore;
use fanethub::log_format::TargetFirstFormat;
use fanethub::metrics as fh_metrics;
use fanethub::model::geo::GeoPoint;
use fanethub::snapshot::SnapshotComposer;
use fanethub::subscription::SubscriptionIndex;
use fanethub::validator::{Validator, ValidatorConfig};
use fanethub::web::{self, AppState};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(name = "fanethub", version, about = "FANET real-time tracking backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs MQTT ingest and the HTTP/WebSocket server in one process.
    Run,
    /// Runs MQTT ingest only, with no HTTP server.
    Ingest,
    /// Runs the HTTP/WebSocket server only, with no MQTT ingest.
    Serve,
    /// Loads and validates configuration, then exits.
    ValidateConfig,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.event_format(TargetFirstFormat).init(),
    }
}

fn build_pipeline(config: &Config, live_store: Arc<dyn fanethub::live_store::LiveStore>, cancel: &CancellationToken) -> Arc<Pipeline> {
    let validator = Arc::new(Validator::new(ValidatorConfig::default()));
    let boundary = Arc::new(BoundaryTracker::new(BoundaryConfig {
        center: GeoPoint::new(config.ogn_center_lat, config.ogn_center_lon),
        outer_radius_km: config.ogn_radius_km,
        tracking_radius_km: config.tracking_radius_km(),
        grace_period: ChronoDuration::from_std(config.boundary_grace_period).unwrap(),
        min_movement_m: config.min_movement_distance_m,
    }));
    let broadcaster = Arc::new(Broadcaster::new());
    let subscriptions = Arc::new(SubscriptionIndex::new(config.geohash_precision));

    let mysql_pool = build_pool(&config.mysql_dsn).expect("failed to build MySQL pool");
    fanethub::db::run_pending_migrations(&mysql_pool).expect("failed to run pending migrations");
    let writer_config = BatchWriterConfig {
        batch_size: config.max_batch_size,
        flush_interval: config.batch_timeout,
    };
    let pilot_writer = batch_writer::spawn(
        "pilot",
        mysql_pool.clone(),
        Arc::new(repo::insert_pilot_batch),
        writer_config,
        cancel.clone(),
    );
    let thermal_writer = batch_writer::spawn(
        "thermal",
        mysql_pool.clone(),
        Arc::new(repo::insert_thermal_batch),
        writer_config,
        cancel.clone(),
    );
    let station_writer = batch_writer::spawn(
        "station",
        mysql_pool,
        Arc::new(repo::insert_station_batch),
        writer_config,
        cancel.clone(),
    );

    spawn_validator_sweep(validator.clone(), cancel.clone());

    Arc::new(Pipeline {
        topic_prefix: config.mqtt_topic_prefix.clone(),
        validator,
        boundary,
        live_store,
        broadcaster,
        subscriptions,
        pilot_writer,
        thermal_writer,
        station_writer,
    })
}

/// Periodically evicts validator state for devices untouched since before
/// a fixed horizon, per §3/§9 ("Validation state outlives eviction and is
/// cleaned by a sweep older than a configured horizon"). The horizon
/// tracks the live store's own Pilot TTL (12h) with margin, since a device
/// whose live record has long expired has no reason to keep its hysteresis
/// state around either.
fn spawn_validator_sweep(validator: Arc<Validator>, cancel: CancellationToken) {
    const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);
    let horizon = ChronoDuration::hours(24);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let before = validator.len();
                    validator.sweep(chrono::Utc::now(), horizon);
                    let evicted = before.saturating_sub(validator.len());
                    if evicted > 0 {
                        tracing::debug!(evicted, "swept stale validator state");
                    }
                }
            }
        }
    });
}

/// Periodically probes the live store and MySQL pool and flips `ready`
/// accordingly, so `/ready` (§6) reflects actual dependency health rather
/// than always reporting up.
fn spawn_readiness_probe(
    pipeline: Arc<Pipeline>,
    mysql_pool: fanethub::db::MysqlPool,
    ready: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    const READY_PROBE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(READY_PROBE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let live_store_ok = pipeline.live_store.ping().await.is_ok();
                    let mysql_pool = mysql_pool.clone();
                    let mysql_ok = tokio::task::spawn_blocking(move || mysql_pool.get().is_ok())
                        .await
                        .unwrap_or(false);
                    let healthy = live_store_ok && mysql_ok;
                    if ready.swap(healthy, Ordering::Relaxed) != healthy {
                        if healthy {
                            info!("dependencies healthy, marking ready");
                        } else {
                            tracing::warn!(live_store_ok, mysql_ok, "dependency check failed, marking not ready");
                        }
                    }
                }
            }
        }
    });
}

async fn run_ingest(config: Config, pipeline: Arc<Pipeline>, cancel: CancellationToken) -> Result<()> {
    let supervisor = IngestSupervisor::new(pipeline, config);
    supervisor.run(cancel).await
}

async fn run_serve(config: Arc<Config>, pipeline: Arc<Pipeline>, cancel: CancellationToken) -> Result<()> {
    let metrics_handle = fh_metrics::init_metrics();
    fh_metrics::initialize_ingest_metrics();
    fh_metrics::initialize_pipeline_metrics();
    tokio::spawn(fh_metrics::process_metrics_task());
    if let Some(debug_port) = config.debug_port {
        tokio::spawn(fh_metrics::start_debug_server(debug_port));
    }

    let mysql_pool = build_pool(&config.mysql_dsn).context("building MySQL pool for HTTP server")?;
    let snapshot_composer = Arc::new(SnapshotComposer::new(
        pipeline.live_store.clone(),
        ChronoDuration::from_std(config.boundary_grace_period).unwrap(),
    ));
    let http_client = reqwest::Client::builder()
        .build()
        .context("building reqwest client")?;

    let ready = Arc::new(AtomicBool::new(false));
    spawn_readiness_probe(pipeline.clone(), mysql_pool.clone(), ready.clone(), cancel.clone());

    let state = AppState {
        config: config.clone(),
        pipeline,
        snapshot_composer,
        mysql_pool,
        http_client,
        auth_cache: auth::build_cache(config.auth_cache_ttl),
        metrics_handle,
        ready,
    };

    let app = web::router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding HTTP listener on {addr}"))?;
    info!(%addr, "fanethub HTTP/WebSocket server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server failed")
}

fn spawn_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal, draining in-flight work");
            cancel.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;

    if matches!(cli.command, Command::ValidateConfig) {
        println!("configuration OK (server_port={})", config.server_port);
        return Ok(());
    }

    init_tracing(&config);
    let config = Arc::new(config);
    let cancel = CancellationToken::new();
    spawn_shutdown_handler(cancel.clone());

    let live_store = Arc::new(
        RedisLiveStore::connect(&config.redis_url)
            .await
            .context("connecting to Redis live store")?,
    );
    let pipeline = build_pipeline(&config, live_store, &cancel);

    match cli.command {
        Command::ValidateConfig => unreachable!(),
        Command::Ingest => run_ingest((*config).clone(), pipeline, cancel).await,
        Command::Serve => run_serve(config, pipeline, cancel).await,
        Command::Run => {
            let ingest_config = (*config).clone();
            let ingest_pipeline = pipeline.clone();
            let ingest_cancel = cancel.clone();
            let ingest_task = tokio::spawn(async move {
                if let Err(err) = run_ingest(ingest_config, ingest_pipeline, ingest_cancel).await {
                    tracing::error!(error = %err, "ingest supervisor exited with error");
                }
            });

            let serve_result = run_serve(config, pipeline, cancel).await;
            let _ = ingest_task.await;
            serve_result
        }
    }
}
