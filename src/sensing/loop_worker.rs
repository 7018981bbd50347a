use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blocking::BlockingStateStore;
use crate::models::AppId;

use super::foreground::ForegroundSource;
use super::intervention::InterventionSurface;

// Set to false to silence this module's per-tick logging
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Remembers the app last intervened on, so a blocked app that stays in
/// front triggers the interrupt once rather than on every tick.
#[derive(Debug, Default)]
pub struct Debouncer {
    last_intervened: Option<AppId>,
}

impl Debouncer {
    /// Returns the app to intervene on this tick, if any. Anything other
    /// than a blocked app in front clears the marker.
    pub fn decide(&mut self, foreground: Option<&str>, is_blocked: bool) -> Option<AppId> {
        match foreground {
            Some(app) if is_blocked => {
                if self.last_intervened.as_deref() == Some(app) {
                    None
                } else {
                    Some(app.to_string())
                }
            }
            _ => {
                self.last_intervened = None;
                None
            }
        }
    }

    /// Called once the interrupt was actually dispatched. A failed dispatch
    /// leaves the marker alone so the next tick retries.
    pub fn record_intervention(&mut self, app_id: AppId) {
        self.last_intervened = Some(app_id);
    }

    pub fn last_intervened(&self) -> Option<&str> {
        self.last_intervened.as_deref()
    }
}

/// Everything one loop instance needs.
#[derive(Clone)]
pub struct EnforcementContext {
    pub store: Arc<BlockingStateStore>,
    pub foreground: Arc<dyn ForegroundSource>,
    pub intervention: Arc<dyn InterventionSurface>,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Stopped through its cancellation token.
    Cancelled,
    /// Blocking was turned off after being observed on; the loop ended on
    /// its own.
    Deactivated,
}

/// Runs until cancelled or until blocking turns off. A loop started before
/// the store has observed the activation waits for it first.
pub async fn enforcement_loop(ctx: EnforcementContext, cancel_token: CancellationToken) -> LoopExit {
    if !ctx.store.is_blocking() {
        log_info!("blocking not active yet; waiting for activation");
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("enforcement loop cancelled before activation");
                return LoopExit::Cancelled;
            }
            activated = wait_for_activation(&ctx.store) => {
                if !activated {
                    log_warn!("blocking state stream closed before activation");
                    return LoopExit::Deactivated;
                }
            }
        }
    }

    let mut ticker = time::interval(ctx.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut debouncer = Debouncer::default();
    log_info!("enforcement loop started, polling every {:?}", ctx.poll_interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("enforcement loop shutting down");
                return LoopExit::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        // Checked against the latest snapshot on every tick.
        if !ctx.store.is_blocking() {
            log_info!("blocking no longer active; enforcement loop exiting");
            return LoopExit::Deactivated;
        }

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("enforcement loop shutting down mid-tick");
                return LoopExit::Cancelled;
            }
            outcome = time::timeout(ctx.poll_interval, run_tick(&ctx, &mut debouncer)) => {
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => log_error!("enforcement tick failed: {err:#}"),
                    Err(_) => log_warn!("enforcement tick exceeded {:?}; skipped", ctx.poll_interval),
                }
            }
        }
    }
}

async fn wait_for_activation(store: &BlockingStateStore) -> bool {
    let mut state_rx = store.subscribe();
    let activated = state_rx.wait_for(|state| state.is_active).await.is_ok();
    activated
}

async fn run_tick(ctx: &EnforcementContext, debouncer: &mut Debouncer) -> Result<()> {
    let foreground = ctx.foreground.current_foreground().await?;
    let is_blocked = foreground
        .as_deref()
        .map(|app| ctx.store.is_app_blocked(app))
        .unwrap_or(false);

    if let Some(app) = debouncer.decide(foreground.as_deref(), is_blocked) {
        log_info!("blocked app {app} is in the foreground; presenting intervention");
        if dispatch(ctx.intervention.as_ref(), &app) {
            debouncer.record_intervention(app);
        }
    } else if let Some(app) = debouncer.last_intervened() {
        log_debug!("{app} still in the foreground; intervention already shown");
    }

    Ok(())
}

/// Presents the interrupt; failures and panics are logged, never propagated.
fn dispatch(surface: &dyn InterventionSurface, app_id: &str) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| surface.present(app_id))) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            log_error!("intervention dispatch failed for {app_id}: {err:#}");
            false
        }
        Err(_) => {
            log_error!("intervention surface panicked for {app_id}");
            false
        }
    }
}
