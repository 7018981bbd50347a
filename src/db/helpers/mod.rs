use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::AppId;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn encode_app_set(apps: &BTreeSet<AppId>) -> Result<String> {
    serde_json::to_string(apps).context("failed to encode blocked_apps")
}

pub fn decode_app_set(raw: &str) -> Result<BTreeSet<AppId>> {
    serde_json::from_str(raw).context("failed to parse blocked_apps")
}
