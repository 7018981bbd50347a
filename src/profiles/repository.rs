use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::models::Profile;

/// Source of truth for which profile is active.
///
/// Implementations guarantee at most one active profile: activating one
/// deactivates any other in the same write.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Live view of the active profile. The current value is readable
    /// immediately through `borrow()`.
    fn active_profile(&self) -> watch::Receiver<Option<Profile>>;

    async fn activate_profile(&self, profile_id: &str) -> Result<()>;

    async fn deactivate_all(&self) -> Result<()>;
}
