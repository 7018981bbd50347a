mod utils;

pub mod blocking;
pub mod db;
pub mod engine;
pub mod lifecycle;
pub mod models;
pub mod profiles;
pub mod sensing;
pub mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

pub use blocking::{
    BlockingState, BlockingTransition, EngineError, EngineResult, ProofOfPresence, TagVerifier,
};
pub use engine::{BlockingEngine, EngineDeps};
pub use lifecycle::{BackgroundContext, ServiceState};
pub use models::{AppId, Profile, ProfileDraft, ProfileId};
pub use profiles::{InMemoryProfileRepository, ProfileRepository, SqliteProfileRepository};
pub use sensing::{ForegroundSampler, ForegroundSource, InterventionSurface, UsageEventSource};
pub use settings::{EngineSettings, SettingsStore};

use blocking::RejectAllTags;
use db::Database;
use lifecycle::HeadlessBackground;
use sensing::{LoggingInterventionSurface, NullUsageEvents};

const DATA_DIR_ENV: &str = "BLOCKGUARD_DATA_DIR";
const DEBUG_ENV: &str = "BLOCKGUARD_DEBUG";

fn init_logging() {
    let debug_mode = std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let level = if debug_mode {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // RUST_LOG still wins when set.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_local_dir()
        .map(|dir| dir.join("blockguard"))
        .context("no local data directory available; set BLOCKGUARD_DATA_DIR")
}

/// Runs the engine headless until Ctrl-C.
///
/// Platform shims for foreground detection, the intervention surface and
/// tag verification are not available here, so the engine runs with its
/// null collaborators: blocking state is restored and tracked, but nothing
/// is detected or presented.
pub fn run() -> Result<()> {
    init_logging();
    info!("BlockGuard starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(serve())
}

async fn serve() -> Result<()> {
    let app_data_dir = data_dir()?;
    std::fs::create_dir_all(&app_data_dir)
        .with_context(|| format!("failed to create {}", app_data_dir.display()))?;

    let settings_store = SettingsStore::new(app_data_dir.join("settings.json"))?;
    let settings = settings_store.engine();

    let database = Database::new(app_data_dir.join("blockguard.sqlite3"))?;
    info!("Profiles stored at {}", database.path().display());
    let repository = Arc::new(SqliteProfileRepository::open(database).await?);
    let profiles = repository.list_profiles().await?;
    info!("Loaded {} profile(s)", profiles.len());

    let sampler = ForegroundSampler::new(
        Arc::new(NullUsageEvents),
        settings.own_app_id.clone(),
        settings.shell_app_ids.clone(),
        settings.usage_window(),
    );
    let engine = BlockingEngine::new(
        EngineDeps {
            repository,
            foreground: Arc::new(sampler),
            intervention: Arc::new(LoggingInterventionSurface),
            background: Arc::new(HeadlessBackground::default()),
            tag_verifier: Arc::new(RejectAllTags),
        },
        &settings,
    );

    // The process may have been killed while a profile was active.
    let service_state = engine.on_ambiguous_restart().await?;
    info!("Service state after launch: {service_state:?}");

    let mut states = engine.blocking_state();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(err) = signal {
                    warn!("Failed to listen for Ctrl-C: {err}");
                }
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                match state.active_profile_name {
                    Some(name) => info!(
                        "Blocking active: {name} ({} app(s), strict: {})",
                        state.blocked_apps.len(),
                        state.is_strict_mode
                    ),
                    None => info!("Blocking inactive"),
                }
            }
        }
    }

    info!("BlockGuard shutting down...");
    engine.shutdown().await;
    Ok(())
}
