use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::models::{AppId, Profile};
use crate::profiles::ProfileRepository;

use super::error::{EngineError, EngineResult};
use super::gate::StrictModeGate;
use super::state::BlockingState;

/// Which way a toggle went.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BlockingTransition {
    Started,
    Stopped,
}

/// Authoritative holder of [`BlockingState`].
///
/// The only writer is the sync task, which mirrors the repository's
/// active-profile stream. Start and stop requests go to the repository and
/// come back through that stream, so the enforced state can never diverge
/// from the persisted one.
pub struct BlockingStateStore {
    repository: Arc<dyn ProfileRepository>,
    state_rx: watch::Receiver<BlockingState>,
    own_app_id: AppId,
    sync_timeout: Duration,
    cancel_token: CancellationToken,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl BlockingStateStore {
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        repository: Arc<dyn ProfileRepository>,
        own_app_id: impl Into<AppId>,
        sync_timeout: Duration,
    ) -> Self {
        let mut profile_rx = repository.active_profile();
        let initial = BlockingState::from_profile(profile_rx.borrow_and_update().as_ref());
        if initial.is_active {
            info!(
                "Blocking state starts active with profile {:?}",
                initial.active_profile_name
            );
        }

        let (state_tx, state_rx) = watch::channel(initial);
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sync_state(profile_rx, state_tx, cancel_token.clone()));

        Self {
            repository,
            state_rx,
            own_app_id: own_app_id.into(),
            sync_timeout,
            cancel_token,
            sync_task: Mutex::new(Some(handle)),
        }
    }

    /// Live view of the state. `borrow()` yields the current snapshot right
    /// away; `changed()` resolves on the next replacement. Intermediate
    /// values may be skipped, only the latest is kept.
    pub fn subscribe(&self) -> watch::Receiver<BlockingState> {
        let mut rx = self.state_rx.clone();
        rx.borrow_and_update();
        rx
    }

    pub fn snapshot(&self) -> BlockingState {
        self.state_rx.borrow().clone()
    }

    pub fn is_blocking(&self) -> bool {
        self.state_rx.borrow().is_active
    }

    pub fn is_app_blocked(&self, app_id: &str) -> bool {
        self.state_rx.borrow().blocks(app_id, &self.own_app_id)
    }

    pub async fn start_blocking(&self, profile_id: &str) -> EngineResult<()> {
        self.repository
            .activate_profile(profile_id)
            .await
            .map_err(|err| {
                error!("Failed to activate profile {profile_id}: {err:#}");
                EngineError::Repository(err)
            })?;

        self.await_state(|state| state.is_profile_active(profile_id))
            .await;
        info!("Blocking started for profile {profile_id}");
        Ok(())
    }

    pub async fn stop_blocking(&self, require_proof: bool) -> EngineResult<()> {
        let snapshot = self.snapshot();
        if let Err(err) = StrictModeGate::evaluate(require_proof, &snapshot) {
            warn!(
                "Refused to stop strict profile {:?} without proof",
                snapshot.active_profile_name
            );
            return Err(err);
        }

        self.repository.deactivate_all().await.map_err(|err| {
            error!("Failed to deactivate profiles: {err:#}");
            EngineError::Repository(err)
        })?;

        self.await_state(|state| !state.is_active).await;
        info!("Blocking stopped");
        Ok(())
    }

    /// Stops if `profile_id` is the active profile (strict flag decides
    /// whether proof is required), starts it otherwise.
    pub async fn toggle_blocking(&self, profile_id: &str) -> EngineResult<BlockingTransition> {
        let snapshot = self.snapshot();
        if snapshot.is_profile_active(profile_id) {
            self.stop_blocking(snapshot.is_strict_mode).await?;
            Ok(BlockingTransition::Stopped)
        } else {
            self.start_blocking(profile_id).await?;
            Ok(BlockingTransition::Started)
        }
    }

    /// Ends the sync task. The last published snapshot stays readable.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self
            .sync_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!("Blocking state sync task failed to join: {err}");
            }
        }
    }

    /// Waits until the sync task has published a state matching `predicate`.
    async fn await_state<F>(&self, predicate: F)
    where
        F: FnMut(&BlockingState) -> bool,
    {
        let mut rx = self.state_rx.clone();
        match time::timeout(self.sync_timeout, rx.wait_for(predicate)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => warn!("Blocking state stream closed while waiting for sync"),
            Err(_) => warn!(
                "Blocking state did not sync within {:?}; continuing with last snapshot",
                self.sync_timeout
            ),
        };
    }
}

impl Drop for BlockingStateStore {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn sync_state(
    mut profile_rx: watch::Receiver<Option<Profile>>,
    state_tx: watch::Sender<BlockingState>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            changed = profile_rx.changed() => {
                if changed.is_err() {
                    warn!("Profile stream closed; blocking state will no longer update");
                    break;
                }

                let next = BlockingState::from_profile(profile_rx.borrow_and_update().as_ref());
                let summary = describe(&next);
                let replaced = state_tx.send_if_modified(|current| {
                    if *current == next {
                        false
                    } else {
                        *current = next;
                        true
                    }
                });

                if replaced {
                    info!("Blocking state replaced: {summary}");
                } else {
                    debug!("Profile update did not change blocking state");
                }
            }
            _ = cancel_token.cancelled() => {
                debug!("Blocking state sync task shutting down");
                break;
            }
        }
    }
}

fn describe(state: &BlockingState) -> String {
    match &state.active_profile_name {
        Some(name) if state.is_active => format!(
            "active profile '{}' ({} apps, strict={})",
            name,
            state.blocked_apps.len(),
            state.is_strict_mode
        ),
        _ => "inactive".to_string(),
    }
}
