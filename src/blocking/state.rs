use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AppId, Profile, ProfileId};

/// Apps that stay reachable no matter what a profile lists: dialer, phone
/// services, settings and emergency handling.
pub const ESSENTIAL_APPS: &[&str] = &[
    "com.android.dialer",
    "com.google.android.dialer",
    "com.android.phone",
    "com.android.server.telecom",
    "com.android.settings",
    "com.android.emergency",
    "com.google.android.apps.safetyhub",
];

pub fn is_essential_app(app_id: &str) -> bool {
    ESSENTIAL_APPS.contains(&app_id)
}

/// Immutable snapshot of what is currently being enforced.
///
/// Always replaced as a whole value. An inactive state carries no profile,
/// no blocked apps and no strict flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockingState {
    pub is_active: bool,
    pub active_profile_id: Option<ProfileId>,
    pub active_profile_name: Option<String>,
    pub blocked_apps: BTreeSet<AppId>,
    pub is_strict_mode: bool,
    pub active_since: Option<DateTime<Utc>>,
}

impl BlockingState {
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn from_profile(profile: Option<&Profile>) -> Self {
        match profile {
            Some(profile) => Self {
                is_active: true,
                active_profile_id: Some(profile.id.clone()),
                active_profile_name: Some(profile.name.clone()),
                blocked_apps: profile.blocked_apps.clone(),
                is_strict_mode: profile.is_strict_mode,
                active_since: profile.activated_at,
            },
            None => Self::inactive(),
        }
    }

    pub fn is_profile_active(&self, profile_id: &str) -> bool {
        self.active_profile_id.as_deref() == Some(profile_id)
    }

    /// `own_app_id` and the essential apps are never blocked, even when a
    /// profile lists them.
    pub fn blocks(&self, app_id: &str, own_app_id: &str) -> bool {
        if !self.is_active || app_id == own_app_id || is_essential_app(app_id) {
            return false;
        }
        self.blocked_apps.contains(app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWN: &str = "com.blockguard.app";

    fn profile(apps: &[&str], strict: bool) -> Profile {
        let now = Utc::now();
        Profile {
            id: "p1".into(),
            name: "Deep Work".into(),
            blocked_apps: apps.iter().map(|a| a.to_string()).collect(),
            is_strict_mode: strict,
            activated_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_inactive_state_is_empty() {
        let state = BlockingState::from_profile(None);
        assert!(!state.is_active);
        assert!(state.active_profile_id.is_none());
        assert!(state.active_profile_name.is_none());
        assert!(state.blocked_apps.is_empty());
        assert!(!state.is_strict_mode);
        assert!(state.active_since.is_none());
    }

    #[test]
    fn test_state_mirrors_profile() {
        let p = profile(&["com.a", "com.b"], true);
        let state = BlockingState::from_profile(Some(&p));
        assert!(state.is_active);
        assert!(state.is_profile_active("p1"));
        assert_eq!(state.active_profile_name.as_deref(), Some("Deep Work"));
        assert!(state.is_strict_mode);
        assert_eq!(state.active_since, p.activated_at);
    }

    #[test]
    fn test_blocked_decision() {
        let state = BlockingState::from_profile(Some(&profile(&["com.a", "com.b", OWN], false)));
        assert!(state.blocks("com.a", OWN));
        assert!(state.blocks("com.b", OWN));
        assert!(!state.blocks("com.c", OWN));
        // own identity is exempt even though the profile lists it
        assert!(!state.blocks(OWN, OWN));
    }

    #[test]
    fn test_essential_apps_cannot_be_blocked() {
        let state = BlockingState::from_profile(Some(&profile(
            &["com.android.dialer", "com.android.settings", "com.a"],
            true,
        )));
        assert!(!state.blocks("com.android.dialer", OWN));
        assert!(!state.blocks("com.android.settings", OWN));
        assert!(state.blocks("com.a", OWN));
    }

    #[test]
    fn test_nothing_blocked_when_inactive() {
        let mut state = BlockingState::from_profile(Some(&profile(&["com.a"], false)));
        state.is_active = false;
        assert!(!state.blocks("com.a", OWN));
    }
}
