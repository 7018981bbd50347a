//! Bridges logical start/stop of enforcement to the platform's background
//! execution lifecycle.
//!
//! The platform shim only has to translate its own signals (service start
//! command, stop command, process recreated by the OS) into the three
//! `on_*` calls here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::blocking::{EngineError, EngineResult};
use crate::sensing::{EnforcementContext, EnforcementController, LoopExit};

/// Persistent background execution context (an always-on service with its
/// ongoing notification, or whatever the platform offers).
///
/// Both calls must be idempotent.
pub trait BackgroundContext: Send + Sync {
    fn acquire(&self) -> Result<()>;
    fn release(&self);
}

/// Context for platforms where the process itself is the background context.
#[derive(Default)]
pub struct HeadlessBackground {
    held: AtomicBool,
}

impl HeadlessBackground {
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl BackgroundContext for HeadlessBackground {
    fn acquire(&self) -> Result<()> {
        if !self.held.swap(true, Ordering::SeqCst) {
            debug!("Background context acquired");
        }
        Ok(())
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            debug!("Background context released");
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ServiceState {
    Idle,
    Running,
}

pub struct LifecycleAdapter {
    ctx: EnforcementContext,
    background: Arc<dyn BackgroundContext>,
    controller: Mutex<EnforcementController>,
}

impl LifecycleAdapter {
    pub fn new(ctx: EnforcementContext, background: Arc<dyn BackgroundContext>) -> Self {
        Self {
            ctx,
            background,
            controller: Mutex::new(EnforcementController::new()),
        }
    }

    pub async fn state(&self) -> ServiceState {
        if self.controller.lock().await.is_running() {
            ServiceState::Running
        } else {
            ServiceState::Idle
        }
    }

    /// Acquires the background context and starts a fresh loop. A loop that
    /// is already running is replaced, so each start begins with a clean
    /// debounce marker.
    pub async fn on_start_signal(&self) -> EngineResult<ServiceState> {
        let mut controller = self.controller.lock().await;
        if let Err(err) = controller.stop().await {
            error!("Previous enforcement loop ended abnormally: {err:#}");
        }

        self.background.acquire().map_err(|err| {
            error!("Failed to acquire background context: {err:#}");
            EngineError::Background(err)
        })?;

        let background = Arc::clone(&self.background);
        controller.start(self.ctx.clone(), move |exit| {
            if exit == LoopExit::Deactivated {
                info!("Releasing background context after deactivation");
                background.release();
            }
        });

        info!("Enforcement running");
        Ok(ServiceState::Running)
    }

    pub async fn on_stop_signal(&self) -> ServiceState {
        let mut controller = self.controller.lock().await;
        if let Err(err) = controller.stop().await {
            error!("Enforcement loop ended abnormally: {err:#}");
        }
        self.background.release();
        info!("Enforcement idle");
        ServiceState::Idle
    }

    /// The platform recreated the background context without saying why.
    /// Resume if a profile is still active, otherwise stop the context so it
    /// does not linger.
    pub async fn on_ambiguous_restart(&self) -> EngineResult<ServiceState> {
        if self.ctx.store.is_blocking() {
            info!("Restarted with blocking active; resuming enforcement");
            self.on_start_signal().await
        } else {
            info!("Restarted with no active profile; stopping background context");
            Ok(self.on_stop_signal().await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ProfileRepository;
    use crate::sensing::loop_worker::tests::{
        active_store, RecordingSurface, ScriptedForeground, TICK,
    };
    use tokio::time;

    struct Fixture {
        repo: Arc<crate::profiles::InMemoryProfileRepository>,
        background: Arc<HeadlessBackground>,
        foreground: Arc<ScriptedForeground>,
        surface: Arc<RecordingSurface>,
        adapter: LifecycleAdapter,
    }

    async fn fixture(active: bool) -> Fixture {
        let (repo, store, _) = active_store(&["A"]).await;
        if !active {
            repo.deactivate_all().await.unwrap();
            time::sleep(TICK).await;
        }
        let background = Arc::new(HeadlessBackground::default());
        let foreground = Arc::new(ScriptedForeground::default());
        let surface = Arc::new(RecordingSurface::default());
        let ctx = EnforcementContext {
            store,
            foreground: foreground.clone(),
            intervention: surface.clone(),
            poll_interval: TICK,
        };
        let adapter = LifecycleAdapter::new(ctx, background.clone());
        Fixture {
            repo,
            background,
            foreground,
            surface,
            adapter,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resumes_when_active() {
        let f = fixture(true).await;
        f.foreground.set_tail(Some("A"));

        let state = f.adapter.on_ambiguous_restart().await.unwrap();
        assert_eq!(state, ServiceState::Running);
        assert!(f.background.is_held());

        time::sleep(TICK * 2).await;
        assert_eq!(f.surface.presented(), vec!["A"]);
        assert_eq!(f.adapter.state().await, ServiceState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_self_stops_when_inactive() {
        let f = fixture(false).await;
        f.background.acquire().unwrap();

        let state = f.adapter.on_ambiguous_restart().await.unwrap();
        assert_eq!(state, ServiceState::Idle);
        assert!(!f.background.is_held());
        assert_eq!(f.adapter.state().await, ServiceState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_releases_context() {
        let f = fixture(true).await;
        f.adapter.on_start_signal().await.unwrap();
        assert!(f.background.is_held());

        assert_eq!(f.adapter.on_stop_signal().await, ServiceState::Idle);
        assert!(!f.background.is_held());
        assert_eq!(f.adapter.state().await, ServiceState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_deactivation_releases_context() {
        let f = fixture(true).await;
        f.adapter.on_start_signal().await.unwrap();

        f.repo.deactivate_all().await.unwrap();
        time::sleep(TICK * 3).await;

        assert_eq!(f.adapter.state().await, ServiceState::Idle);
        assert!(!f.background.is_held());
    }

    struct RefusingBackground;

    impl BackgroundContext for RefusingBackground {
        fn acquire(&self) -> Result<()> {
            anyhow::bail!("foreground service start not allowed")
        }

        fn release(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_context_is_reported() {
        let (_repo, store, _) = active_store(&["A"]).await;
        let ctx = EnforcementContext {
            store,
            foreground: Arc::new(ScriptedForeground::default()),
            intervention: Arc::new(RecordingSurface::default()),
            poll_interval: TICK,
        };
        let adapter = LifecycleAdapter::new(ctx, Arc::new(RefusingBackground));

        assert!(matches!(
            adapter.on_start_signal().await,
            Err(EngineError::Background(_))
        ));
        assert_eq!(adapter.state().await, ServiceState::Idle);
    }
}
