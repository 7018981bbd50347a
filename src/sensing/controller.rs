use anyhow::{Context, Result};
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{enforcement_loop, EnforcementContext, LoopExit};

/// Owns at most one running enforcement loop task.
#[derive(Default)]
pub struct EnforcementController {
    handle: Option<JoinHandle<LoopExit>>,
    cancel_token: Option<CancellationToken>,
}

impl EnforcementController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawns the loop unless one is already running. `on_exit` runs on the
    /// loop task after the loop returns, with the reason it ended.
    ///
    /// Returns `false` when a loop was already running.
    pub fn start<F>(&mut self, ctx: EnforcementContext, on_exit: F) -> bool
    where
        F: FnOnce(LoopExit) + Send + 'static,
    {
        if self.is_running() {
            return false;
        }
        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();
        let handle = tokio::spawn(async move {
            let exit = enforcement_loop(ctx, token_clone).await;
            on_exit(exit);
            exit
        });

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        true
    }

    /// Cancels the loop and waits for its task to end, so no tick can fire
    /// after this returns. The debounce marker dies with the task.
    pub async fn stop(&mut self) -> Result<Option<LoopExit>> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let Some(handle) = self.handle.take() else {
            return Ok(None);
        };

        let exit = handle
            .await
            .context("enforcement loop task failed to join")?;
        match exit {
            LoopExit::Cancelled => info!("Enforcement loop stopped"),
            LoopExit::Deactivated => warn!("Enforcement loop had already exited after deactivation"),
        }
        Ok(Some(exit))
    }
}
