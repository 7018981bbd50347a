use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::info;
use tokio::sync::watch;

use crate::db::{repositories::profiles, Database};
use crate::models::{Profile, ProfileDraft};

use super::ProfileRepository;

/// Profile repository persisted in SQLite.
///
/// The active-profile stream is republished from the database thread right
/// after each committed activation write, so subscribers observe writes in
/// commit order.
#[derive(Clone)]
pub struct SqliteProfileRepository {
    db: Database,
    active_tx: Arc<watch::Sender<Option<Profile>>>,
}

impl SqliteProfileRepository {
    /// Loads the persisted active profile as the stream's initial value.
    pub async fn open(db: Database) -> Result<Self> {
        let active = db.get_active_profile().await?;
        if let Some(profile) = &active {
            info!(
                "Restored active profile {} ({}) from storage",
                profile.name, profile.id
            );
        }
        let (active_tx, _) = watch::channel(active);
        Ok(Self {
            db,
            active_tx: Arc::new(active_tx),
        })
    }

    pub async fn create_profile(&self, draft: ProfileDraft) -> Result<Profile> {
        self.db.insert_profile(draft).await
    }

    pub async fn get_profile(&self, profile_id: &str) -> Result<Option<Profile>> {
        self.db.get_profile(profile_id.to_string()).await
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.db.list_profiles().await
    }

    pub async fn update_profile(&self, profile_id: &str, draft: ProfileDraft) -> Result<Profile> {
        self.db.update_profile(profile_id.to_string(), draft).await
    }

    pub async fn delete_profile(&self, profile_id: &str) -> Result<()> {
        self.db.delete_profile(profile_id.to_string()).await
    }
}

#[async_trait]
impl ProfileRepository for SqliteProfileRepository {
    fn active_profile(&self) -> watch::Receiver<Option<Profile>> {
        self.active_tx.subscribe()
    }

    async fn activate_profile(&self, profile_id: &str) -> Result<()> {
        let profile_id = profile_id.to_string();
        let active_tx = Arc::clone(&self.active_tx);
        self.db
            .execute(move |conn| {
                let profile = profiles::activate(conn, &profile_id, Utc::now())?;
                active_tx.send_replace(Some(profile));
                Ok(())
            })
            .await
    }

    async fn deactivate_all(&self) -> Result<()> {
        let active_tx = Arc::clone(&self.active_tx);
        self.db
            .execute(move |conn| {
                profiles::deactivate_all(conn)?;
                active_tx.send_replace(None);
                Ok(())
            })
            .await
    }
}
