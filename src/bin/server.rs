// Rundown Engine - standalone control-plane process
// Run with: cargo run --bin server -- --config studio.toml

//! # Rundown Engine Server Binary
//!
//! Wires the engine together in one process:
//!
//! ```text
//! main()
//!   ↓ loads
//! EngineSettings (file + RUNDOWN_ENGINE__* env) and the studio configuration
//!   ↓ builds
//! RundownEngine ← ThrottledRundownService ← ActionExecutionService / AutoNextDriver
//!   ↓ feeds
//! IngestChangeReactor ← InMemoryIngest (seeded from --rundown)
//! ```
//!
//! The process runs until Ctrl+C.
//!
//! ## Rust Learning Notes:
//!
//! ### Trait objects at the wiring boundary
//! `main` is the only place that knows concrete types. Everything it hands
//! to a service is an `Arc<dyn Trait>`, so swapping the in-memory ingest for
//! a real newsroom connector only touches this file.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use rundown_engine::engine::{
    AutoNextDriver, CallbackScheduler, FileConfigurationSource, IngestChangeReactor,
};
use rundown_engine::{
    ActionExecutionService, Blueprint, BlueprintTimelineBuilder, Clock, ConfigurationCache,
    EngineEvent, EngineSettings, EventBus, InMemoryIngest, InMemoryStorage, Rundown, RundownEngine,
    RundownService, ShowStyleBlueprint, SystemClock, ThrottledRundownService,
};

/// Rundown control plane for live broadcast automation
#[derive(Parser, Debug)]
#[command(name = "rundown-engine")]
#[command(about = "Live-broadcast rundown control plane", long_about = None)]
struct Args {
    /// Studio and show-style configuration file
    #[arg(short, long, env = "RUNDOWN_ENGINE_STUDIO_CONFIG")]
    config: PathBuf,

    /// Engine settings file; RUNDOWN_ENGINE__* variables override it
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Rundown JSON to ingest at startup
    #[arg(short, long)]
    rundown: Option<PathBuf>,

    /// Log filter, overrides the settings file (RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    if let Err(e) = dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    let args = Args::parse();
    let settings = EngineSettings::load(args.settings.as_deref())?;

    let filter = args.log_level.clone().unwrap_or_else(|| settings.log_filter.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    info!("Starting rundown engine");
    info!(
        throttle_ms = settings.throttle_interval_ms,
        throttle_scope = ?settings.throttle_scope,
        respect_operator_next = settings.respect_operator_next,
        auto_next = settings.auto_next_enabled,
        "Engine settings"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = Arc::new(InMemoryStorage::new());
    let events = EventBus::new(settings.event_capacity);

    let configuration = Arc::new(ConfigurationCache::new(Arc::new(FileConfigurationSource::new(
        &args.config,
    ))));
    let baseline = configuration.get_configuration().await?;
    info!(
        studio_id = %baseline.studio.studio_id,
        show_style_id = %baseline.show_style.show_style_id,
        layers = baseline.studio.mappings.len(),
        "Studio configuration loaded"
    );

    let blueprint: Arc<dyn Blueprint> = Arc::new(ShowStyleBlueprint::new(configuration.clone(), clock.clone()));
    let timeline_builder = Arc::new(BlueprintTimelineBuilder::new(
        configuration.clone(),
        blueprint.clone(),
        clock.clone(),
    ));

    let engine = Arc::new(
        RundownEngine::new(storage.clone(), timeline_builder, events.clone(), clock.clone())
            .with_operator_next_policy(settings.respect_operator_next),
    );
    let live: Arc<dyn RundownService> = Arc::new(
        ThrottledRundownService::new(engine.clone(), clock.clone(), settings.throttle_interval())
            .with_scope(settings.throttle_scope),
    );

    let actions = ActionExecutionService::new(
        live.clone(),
        storage.clone(),
        configuration.clone(),
        blueprint,
        events.clone(),
        clock.clone(),
    );
    let catalog = actions.get_actions().await?;
    info!(count = catalog.len(), "Action catalog ready");

    events.register_callback(|envelope| match &envelope.event {
        EngineEvent::TimelineUpdated { rundown_id, object_count } => {
            info!(rundown_id = %rundown_id, objects = object_count, "Timeline updated")
        }
        EngineEvent::PartTaken { rundown_id, part_id, .. } => {
            info!(rundown_id = %rundown_id, part_id = %part_id, "Part on air")
        }
        other => debug!(event = ?other, "Engine event"),
    });

    let ingest = Arc::new(InMemoryIngest::new());
    let reactor = Arc::new(IngestChangeReactor::new(
        ingest.clone(),
        ingest.clone(),
        ingest.clone(),
        engine.clone(),
    ))
    .spawn();

    let autonext = settings.auto_next_enabled.then(|| {
        Arc::new(AutoNextDriver::new(live.clone(), CallbackScheduler::new(clock.clone()))).spawn(&events)
    });

    if let Some(path) = &args.rundown {
        let text = tokio::fs::read_to_string(path).await?;
        let rundown: Rundown = serde_json::from_str(&text)?;
        info!(rundown_id = %rundown.id, path = %path.display(), "Ingesting startup rundown");
        ingest.upsert_rundown(rundown).await;
    }

    info!("Rundown engine running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    reactor.abort();
    if let Some(task) = autonext {
        task.abort();
    }
    Ok(())
}
