//! The blocking engine as seen by its collaborators.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::watch;

use crate::blocking::{
    BlockingState, BlockingStateStore, BlockingTransition, EngineResult, ProofOfPresence,
    TagVerifier,
};
use crate::lifecycle::{BackgroundContext, LifecycleAdapter, ServiceState};
use crate::models::AppId;
use crate::profiles::ProfileRepository;
use crate::sensing::{EnforcementContext, ForegroundSource, InterventionSurface};
use crate::settings::EngineSettings;

/// External collaborators the engine is wired to.
pub struct EngineDeps {
    pub repository: Arc<dyn ProfileRepository>,
    pub foreground: Arc<dyn ForegroundSource>,
    pub intervention: Arc<dyn InterventionSurface>,
    pub background: Arc<dyn BackgroundContext>,
    pub tag_verifier: Arc<dyn TagVerifier>,
}

pub struct BlockingEngine {
    store: Arc<BlockingStateStore>,
    foreground: Arc<dyn ForegroundSource>,
    lifecycle: LifecycleAdapter,
    tag_verifier: Arc<dyn TagVerifier>,
}

impl BlockingEngine {
    /// Must be called from within a tokio runtime.
    pub fn new(deps: EngineDeps, settings: &EngineSettings) -> Self {
        let store = Arc::new(BlockingStateStore::spawn(
            deps.repository,
            settings.own_app_id.clone(),
            settings.state_sync_timeout(),
        ));
        let ctx = EnforcementContext {
            store: Arc::clone(&store),
            foreground: Arc::clone(&deps.foreground),
            intervention: deps.intervention,
            poll_interval: settings.poll_interval(),
        };

        Self {
            store,
            foreground: deps.foreground,
            lifecycle: LifecycleAdapter::new(ctx, deps.background),
            tag_verifier: deps.tag_verifier,
        }
    }

    pub fn blocking_state(&self) -> watch::Receiver<BlockingState> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> BlockingState {
        self.store.snapshot()
    }

    pub fn is_blocking(&self) -> bool {
        self.store.is_blocking()
    }

    pub fn is_app_blocked(&self, app_id: &str) -> bool {
        self.store.is_app_blocked(app_id)
    }

    /// `None` when nothing user-facing is in front or detection failed.
    pub async fn current_foreground_app(&self) -> Option<AppId> {
        match self.foreground.current_foreground().await {
            Ok(app) => app,
            Err(err) => {
                warn!("Foreground lookup failed: {err:#}");
                None
            }
        }
    }

    pub async fn start_blocking(&self, profile_id: &str) -> EngineResult<()> {
        self.store.start_blocking(profile_id).await?;
        self.lifecycle.on_start_signal().await?;
        Ok(())
    }

    pub async fn stop_blocking(&self, require_proof: bool) -> EngineResult<()> {
        self.store.stop_blocking(require_proof).await?;
        self.lifecycle.on_stop_signal().await;
        Ok(())
    }

    /// Checks a raw tag scan with the tag verifier.
    pub fn verify_tag(&self, raw_scan: &[u8]) -> EngineResult<ProofOfPresence> {
        ProofOfPresence::verify(self.tag_verifier.as_ref(), raw_scan)
    }

    /// Stops blocking regardless of strict mode; the proof is consumed.
    pub async fn stop_blocking_with_proof(&self, _proof: ProofOfPresence) -> EngineResult<()> {
        info!("Stop requested with verified tag");
        self.stop_blocking(false).await
    }

    pub async fn toggle_blocking(&self, profile_id: &str) -> EngineResult<BlockingTransition> {
        let transition = self.store.toggle_blocking(profile_id).await?;
        match transition {
            BlockingTransition::Started => {
                self.lifecycle.on_start_signal().await?;
            }
            BlockingTransition::Stopped => {
                self.lifecycle.on_stop_signal().await;
            }
        }
        Ok(transition)
    }

    pub async fn service_state(&self) -> ServiceState {
        self.lifecycle.state().await
    }

    pub async fn on_start_signal(&self) -> EngineResult<ServiceState> {
        self.lifecycle.on_start_signal().await
    }

    pub async fn on_stop_signal(&self) -> ServiceState {
        self.lifecycle.on_stop_signal().await
    }

    pub async fn on_ambiguous_restart(&self) -> EngineResult<ServiceState> {
        self.lifecycle.on_ambiguous_restart().await
    }

    /// Stops enforcement for process exit. The active profile stays active
    /// and is picked up again by `on_ambiguous_restart` on next launch.
    pub async fn shutdown(&self) {
        self.lifecycle.on_stop_signal().await;
        self.store.shutdown().await;
    }
}
