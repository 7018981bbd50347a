use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Package / bundle identity of an installed application.
pub type AppId = String;

pub type ProfileId = String;

/// A named set of blocked applications plus a strict-mode flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub blocked_apps: BTreeSet<AppId>,
    pub is_strict_mode: bool,
    /// Set while this profile is the active one; `None` otherwise.
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_active(&self) -> bool {
        self.activated_at.is_some()
    }
}

/// User-editable part of a profile, used for create and update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDraft {
    pub name: String,
    pub blocked_apps: BTreeSet<AppId>,
    pub is_strict_mode: bool,
}

impl ProfileDraft {
    pub fn new<I, S>(name: impl Into<String>, blocked_apps: I, is_strict_mode: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AppId>,
    {
        Self {
            name: name.into(),
            blocked_apps: blocked_apps.into_iter().map(Into::into).collect(),
            is_strict_mode,
        }
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("profile name is required");
        }
        if self.blocked_apps.iter().any(|app| app.trim().is_empty()) {
            anyhow::bail!("blocked app ids must not be empty");
        }
        Ok(())
    }
}
