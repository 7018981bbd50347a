//! `profiles` table queries.
//!
//! The connection-level functions are exposed so callers can compose them
//! with other work inside a single [`Database::execute`] task.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    helpers::{decode_app_set, encode_app_set, parse_datetime, parse_optional_datetime},
    Database,
};
use crate::models::{Profile, ProfileDraft};

const PROFILE_COLUMNS: &str =
    "id, name, blocked_apps, is_strict_mode, activated_at, created_at, updated_at";

struct ProfileRow {
    id: String,
    name: String,
    blocked_apps: String,
    is_strict_mode: bool,
    activated_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row) -> Result<ProfileRow, rusqlite::Error> {
    Ok(ProfileRow {
        id: row.get("id")?,
        name: row.get("name")?,
        blocked_apps: row.get("blocked_apps")?,
        is_strict_mode: row.get("is_strict_mode")?,
        activated_at: row.get("activated_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl TryFrom<ProfileRow> for Profile {
    type Error = anyhow::Error;

    fn try_from(row: ProfileRow) -> Result<Self> {
        Ok(Profile {
            blocked_apps: decode_app_set(&row.blocked_apps)?,
            activated_at: parse_optional_datetime(row.activated_at, "activated_at")?,
            created_at: parse_datetime(&row.created_at, "created_at")?,
            updated_at: parse_datetime(&row.updated_at, "updated_at")?,
            id: row.id,
            name: row.name,
            is_strict_mode: row.is_strict_mode,
        })
    }
}

pub fn find_profile(conn: &Connection, profile_id: &str) -> Result<Option<Profile>> {
    let row = conn
        .query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
            params![profile_id],
            read_row,
        )
        .optional()
        .context("failed to load profile")?;
    row.map(Profile::try_from).transpose()
}

pub fn find_active_profile(conn: &Connection) -> Result<Option<Profile>> {
    let row = conn
        .query_row(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE is_active = 1"),
            [],
            read_row,
        )
        .optional()
        .context("failed to load active profile")?;
    row.map(Profile::try_from).transpose()
}

/// Deactivates every profile and activates `profile_id`, atomically.
/// Returns the newly active profile.
pub fn activate(conn: &mut Connection, profile_id: &str, now: DateTime<Utc>) -> Result<Profile> {
    let tx = conn
        .transaction()
        .context("failed to open activation transaction")?;

    tx.execute(
        "UPDATE profiles SET is_active = 0, activated_at = NULL WHERE is_active = 1",
        [],
    )
    .context("failed to clear active profile")?;

    let updated = tx
        .execute(
            "UPDATE profiles SET is_active = 1, activated_at = ?2 WHERE id = ?1",
            params![profile_id, now.to_rfc3339()],
        )
        .context("failed to activate profile")?;
    if updated == 0 {
        // dropping `tx` rolls the deactivation back
        bail!("profile {profile_id} not found");
    }

    let profile = find_profile(&tx, profile_id)?
        .ok_or_else(|| anyhow!("profile {profile_id} vanished during activation"))?;
    tx.commit().context("failed to commit activation")?;
    Ok(profile)
}

pub fn deactivate_all(conn: &Connection) -> Result<usize> {
    conn.execute(
        "UPDATE profiles SET is_active = 0, activated_at = NULL WHERE is_active = 1",
        [],
    )
    .context("failed to deactivate profiles")
}

fn ensure_not_active(conn: &Connection, profile_id: &str) -> Result<()> {
    let is_active: Option<bool> = conn
        .query_row(
            "SELECT is_active FROM profiles WHERE id = ?1",
            params![profile_id],
            |row| row.get(0),
        )
        .optional()?;
    match is_active {
        None => bail!("profile {profile_id} not found"),
        Some(true) => bail!("profile {profile_id} is active; stop blocking before editing it"),
        Some(false) => Ok(()),
    }
}

impl Database {
    pub async fn insert_profile(&self, draft: ProfileDraft) -> Result<Profile> {
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
        let record = profile.clone();

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO profiles (id, name, blocked_apps, is_strict_mode, is_active, activated_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?6)",
                params![
                    record.id,
                    record.name,
                    encode_app_set(&record.blocked_apps)?,
                    record.is_strict_mode,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert profile")?;
            Ok(())
        })
        .await?;

        Ok(profile)
    }

    pub async fn get_profile(&self, profile_id: String) -> Result<Option<Profile>> {
        self.execute(move |conn| find_profile(conn, &profile_id)).await
    }

    pub async fn get_active_profile(&self) -> Result<Option<Profile>> {
        self.execute(|conn| find_active_profile(conn)).await
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at ASC, name ASC"
            ))?;
            let rows = stmt
                .query_map([], read_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(Profile::try_from).collect()
        })
        .await
    }

    /// Refuses to edit the active profile.
    pub async fn update_profile(&self, profile_id: String, draft: ProfileDraft) -> Result<Profile> {
        draft.validate()?;
        self.execute(move |conn| {
            ensure_not_active(conn, &profile_id)?;
            conn.execute(
                "UPDATE profiles SET name = ?2, blocked_apps = ?3, is_strict_mode = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    profile_id,
                    draft.name,
                    encode_app_set(&draft.blocked_apps)?,
                    draft.is_strict_mode,
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("failed to update profile")?;
            find_profile(conn, &profile_id)?
                .ok_or_else(|| anyhow!("profile {profile_id} not found"))
        })
        .await
    }

    /// Refuses to delete the active profile.
    pub async fn delete_profile(&self, profile_id: String) -> Result<()> {
        self.execute(move |conn| {
            ensure_not_active(conn, &profile_id)?;
            conn.execute("DELETE FROM profiles WHERE id = ?1", params![profile_id])
                .context("failed to delete profile")?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("profiles.sqlite3")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let (_dir, db) = open();
        let created = db
            .insert_profile(ProfileDraft::new("Work", ["com.example.social"], true))
            .await
            .unwrap();

        let listed = db.list_profiles().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert!(listed[0].blocked_apps.contains("com.example.social"));
        assert!(listed[0].is_strict_mode);
        assert!(!listed[0].is_active());
    }

    #[tokio::test]
    async fn test_single_active_row_enforced() {
        let (_dir, db) = open();
        let a = db.insert_profile(ProfileDraft::new("A", ["com.a"], false)).await.unwrap();
        let b = db.insert_profile(ProfileDraft::new("B", ["com.b"], false)).await.unwrap();

        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        db.execute(move |conn| activate(conn, &a_id, Utc::now()).map(|_| ()))
            .await
            .unwrap();
        db.execute(move |conn| activate(conn, &b_id, Utc::now()).map(|_| ()))
            .await
            .unwrap();

        let active = db.get_active_profile().await.unwrap().unwrap();
        assert_eq!(active.id, b.id);

        // the partial unique index rejects a second active row
        let a_id = a.id.clone();
        let forced = db
            .execute(move |conn| {
                conn.execute("UPDATE profiles SET is_active = 1 WHERE id = ?1", params![a_id])?;
                Ok(())
            })
            .await;
        assert!(forced.is_err());
    }

    #[tokio::test]
    async fn test_activate_unknown_rolls_back() {
        let (_dir, db) = open();
        let a = db.insert_profile(ProfileDraft::new("A", ["com.a"], false)).await.unwrap();
        let a_id = a.id.clone();
        db.execute(move |conn| activate(conn, &a_id, Utc::now()).map(|_| ()))
            .await
            .unwrap();

        let result = db
            .execute(|conn| activate(conn, "missing", Utc::now()).map(|_| ()))
            .await;
        assert!(result.is_err());
        let active = db.get_active_profile().await.unwrap().unwrap();
        assert_eq!(active.id, a.id);
    }

    #[tokio::test]
    async fn test_active_profile_cannot_be_edited_or_deleted() {
        let (_dir, db) = open();
        let a = db.insert_profile(ProfileDraft::new("A", ["com.a"], true)).await.unwrap();
        let a_id = a.id.clone();
        db.execute(move |conn| activate(conn, &a_id, Utc::now()).map(|_| ()))
            .await
            .unwrap();

        let edit = ProfileDraft::new("A", ["com.a"], false);
        assert!(db.update_profile(a.id.clone(), edit.clone()).await.is_err());
        assert!(db.delete_profile(a.id.clone()).await.is_err());

        db.execute(|conn| deactivate_all(conn).map(|_| ())).await.unwrap();
        let updated = db.update_profile(a.id.clone(), edit).await.unwrap();
        assert!(!updated.is_strict_mode);
        db.delete_profile(a.id.clone()).await.unwrap();
        assert!(db.get_profile(a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let (_dir, db) = open();
        assert!(db
            .insert_profile(ProfileDraft::new("  ", ["com.a"], false))
            .await
            .is_err());
    }
}
