use anyhow::Result;
use log::info;

/// Full-screen interrupt shown over a blocked app.
///
/// Fire-and-forget: an `Err` is logged by the caller and the next tick will
/// try again, nothing else reads the outcome.
pub trait InterventionSurface: Send + Sync {
    fn present(&self, blocked_app_id: &str) -> Result<()>;
}

/// Surface for headless runs; records the intervention in the log only.
pub struct LoggingInterventionSurface;

impl InterventionSurface for LoggingInterventionSurface {
    fn present(&self, blocked_app_id: &str) -> Result<()> {
        info!("Intervention: {blocked_app_id} is blocked by the active profile");
        Ok(())
    }
}
