use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::{Profile, ProfileDraft, ProfileId};

use super::ProfileRepository;

/// Non-persistent repository with the same single-activation contract as
/// the SQLite one.
pub struct InMemoryProfileRepository {
    profiles: Mutex<HashMap<ProfileId, Profile>>,
    active_tx: watch::Sender<Option<Profile>>,
    unavailable: AtomicBool,
}

impl Default for InMemoryProfileRepository {
    fn default() -> Self {
        let (active_tx, _) = watch::channel(None);
        Self {
            profiles: Mutex::new(HashMap::new()),
            active_tx,
            unavailable: AtomicBool::new(false),
        }
    }
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_profile(&self, draft: ProfileDraft) -> Result<Profile> {
        draft.validate()?;
        let now = Utc::now();
        let profile = Profile {
            id: format!("pr_{}", Uuid::new_v4()),
            name: draft.name,
            blocked_apps: draft.blocked_apps,
            is_strict_mode: draft.is_strict_mode,
            activated_at: None,
            created_at: now,
            updated_at: now,
        };
        self.lock()
            .insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    pub fn get_profile(&self, profile_id: &str) -> Option<Profile> {
        self.lock().get(profile_id).cloned()
    }

    /// Makes every write fail until cleared, to simulate a storage outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProfileId, Profile>> {
        self.profiles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("profile storage unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    fn active_profile(&self) -> watch::Receiver<Option<Profile>> {
        self.active_tx.subscribe()
    }

    async fn activate_profile(&self, profile_id: &str) -> Result<()> {
        self.ensure_available()?;
        let mut profiles = self.lock();
        if !profiles.contains_key(profile_id) {
            return Err(anyhow!("profile {profile_id} not found"));
        }

        let now = Utc::now();
        for profile in profiles.values_mut() {
            profile.activated_at = None;
        }
        let active = profiles.get_mut(profile_id).map(|profile| {
            profile.activated_at = Some(now);
            profile.clone()
        });

        // Published under the lock so subscribers see writes in order.
        self.active_tx.send_replace(active);
        Ok(())
    }

    async fn deactivate_all(&self) -> Result<()> {
        self.ensure_available()?;
        let mut profiles = self.lock();
        for profile in profiles.values_mut() {
            profile.activated_at = None;
        }
        self.active_tx.send_replace(None);
        Ok(())
    }
}
