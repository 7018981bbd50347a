//! Foreground detection from the platform's usage-event log.
//!
//! There is no synchronous "which app is in front" query, so the sampler reads
//! a short trailing window of usage events and takes the most recent
//! move-to-foreground transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::models::AppId;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UsageEventKind {
    MovedToForeground,
    MovedToBackground,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub app_id: AppId,
    pub kind: UsageEventKind,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    pub fn foreground(app_id: impl Into<AppId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            app_id: app_id.into(),
            kind: UsageEventKind::MovedToForeground,
            timestamp,
        }
    }
}

/// Platform access to usage events. Calls may block on OS I/O.
pub trait UsageEventSource: Send + Sync {
    /// Whether the usage-stats read permission is currently granted.
    fn has_permission(&self) -> bool;

    /// Events in `[begin, end]`, in the order the platform reports them.
    fn query_events(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UsageEvent>>;
}

/// Source for platforms without a usage-event log.
pub struct NullUsageEvents;

impl UsageEventSource for NullUsageEvents {
    fn has_permission(&self) -> bool {
        false
    }

    fn query_events(&self, _begin: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<UsageEvent>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForegroundSample {
    pub app_id: Option<AppId>,
    pub observed_at: DateTime<Utc>,
}

/// What the enforcement loop polls each tick.
#[async_trait]
pub trait ForegroundSource: Send + Sync {
    async fn current_foreground(&self) -> Result<Option<AppId>>;
}

/// Latest move-to-foreground event by timestamp. Ties go to the event
/// reported last.
pub fn latest_foreground(events: &[UsageEvent]) -> Option<&UsageEvent> {
    let mut latest: Option<&UsageEvent> = None;
    for event in events {
        if event.kind != UsageEventKind::MovedToForeground {
            continue;
        }
        match latest {
            Some(current) if current.timestamp > event.timestamp => {}
            _ => latest = Some(event),
        }
    }
    latest
}

struct SamplerInner {
    source: Arc<dyn UsageEventSource>,
    own_app_id: AppId,
    shell_app_ids: Vec<AppId>,
    window: TimeDelta,
    permission_missing: AtomicBool,
}

#[derive(Clone)]
pub struct ForegroundSampler {
    inner: Arc<SamplerInner>,
}

impl ForegroundSampler {
    pub fn new(
        source: Arc<dyn UsageEventSource>,
        own_app_id: impl Into<AppId>,
        shell_app_ids: Vec<AppId>,
        window: Duration,
    ) -> Self {
        let window = TimeDelta::from_std(window).unwrap_or_else(|_| TimeDelta::seconds(1));
        Self {
            inner: Arc::new(SamplerInner {
                source,
                own_app_id: own_app_id.into(),
                shell_app_ids,
                window,
                permission_missing: AtomicBool::new(false),
            }),
        }
    }

    /// Samples on the blocking pool so platform I/O never runs on an
    /// executor thread.
    pub async fn sample(&self) -> ForegroundSample {
        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || inner.sample_at(Utc::now())).await {
            Ok(sample) => sample,
            Err(err) => {
                log_warn!("foreground sampling worker failed: {err}");
                ForegroundSample {
                    app_id: None,
                    observed_at: Utc::now(),
                }
            }
        }
    }

    /// Synchronous sample for `now`. Never fails: every failure reads as
    /// "no foreground app".
    pub fn sample_at(&self, now: DateTime<Utc>) -> ForegroundSample {
        self.inner.sample_at(now)
    }
}

impl SamplerInner {
    fn sample_at(&self, now: DateTime<Utc>) -> ForegroundSample {
        ForegroundSample {
            app_id: self.lookup(now),
            observed_at: now,
        }
    }

    fn lookup(&self, now: DateTime<Utc>) -> Option<AppId> {
        if !self.source.has_permission() {
            if !self.permission_missing.swap(true, Ordering::SeqCst) {
                log_warn!("usage access permission missing; foreground detection paused");
            } else {
                log_debug!("usage access permission still missing");
            }
            return None;
        }
        if self.permission_missing.swap(false, Ordering::SeqCst) {
            log_info!("usage access permission restored; foreground detection resumed");
        }

        let Some(begin) = now.checked_sub_signed(self.window) else {
            log_warn!("usage window {:?} reaches before the representable range", self.window);
            return None;
        };
        let events = match self.source.query_events(begin, now) {
            Ok(events) => events,
            Err(err) => {
                log_warn!("usage event query failed: {err:#}");
                return None;
            }
        };

        let winner = latest_foreground(&events)?;
        if self.is_filtered(&winner.app_id) {
            return None;
        }
        Some(winner.app_id.clone())
    }

    fn is_filtered(&self, app_id: &str) -> bool {
        app_id == self.own_app_id || self.shell_app_ids.iter().any(|shell| shell == app_id)
    }
}

#[async_trait]
impl ForegroundSource for ForegroundSampler {
    async fn current_foreground(&self) -> Result<Option<AppId>> {
        Ok(self.sample().await.app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const OWN: &str = "com.blockguard.app";
    const SHELL: &str = "com.android.systemui";

    struct FakeEvents {
        permitted: AtomicBool,
        events: Mutex<Result<Vec<UsageEvent>, String>>,
        last_window: Mutex<Option<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl FakeEvents {
        fn new(events: Vec<UsageEvent>) -> Arc<Self> {
            Arc::new(Self {
                permitted: AtomicBool::new(true),
                events: Mutex::new(Ok(events)),
                last_window: Mutex::new(None),
            })
        }
    }

    impl UsageEventSource for FakeEvents {
        fn has_permission(&self) -> bool {
            self.permitted.load(Ordering::SeqCst)
        }

        fn query_events(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UsageEvent>> {
            *self.last_window.lock().unwrap() = Some((begin, end));
            self.events
                .lock()
                .unwrap()
                .clone()
                .map_err(|msg| anyhow::anyhow!(msg))
        }
    }

    fn sampler(source: Arc<FakeEvents>) -> ForegroundSampler {
        ForegroundSampler::new(source, OWN, vec![SHELL.to_string()], Duration::from_secs(1))
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_latest_by_timestamp_not_order() {
        let events = vec![
            UsageEvent::foreground("com.late", at(300)),
            UsageEvent::foreground("com.early", at(100)),
        ];
        assert_eq!(latest_foreground(&events).unwrap().app_id, "com.late");
    }

    #[test]
    fn test_timestamp_tie_goes_to_last_reported() {
        let events = vec![
            UsageEvent::foreground("com.first", at(200)),
            UsageEvent::foreground("com.second", at(200)),
        ];
        assert_eq!(latest_foreground(&events).unwrap().app_id, "com.second");
    }

    #[test]
    fn test_oversized_window_reads_as_none() {
        let source = FakeEvents::new(vec![UsageEvent::foreground("com.a", at(100))]);
        let sampler = ForegroundSampler::new(
            source.clone(),
            OWN,
            Vec::new(),
            Duration::from_secs(1_000_000 * 365 * 86_400),
        );
        assert!(sampler.sample_at(at(1000)).app_id.is_none());
        assert!(source.last_window.lock().unwrap().is_none());
    }

    #[test]
    fn test_ignores_non_foreground_events() {
        let events = vec![
            UsageEvent::foreground("com.a", at(100)),
            UsageEvent {
                app_id: "com.b".into(),
                kind: UsageEventKind::MovedToBackground,
                timestamp: at(200),
            },
            UsageEvent {
                app_id: "com.c".into(),
                kind: UsageEventKind::Other,
                timestamp: at(300),
            },
        ];
        assert_eq!(latest_foreground(&events).unwrap().app_id, "com.a");
        assert!(latest_foreground(&events[1..]).is_none());
    }

    #[test]
    fn test_samples_most_recent_app() {
        let source = FakeEvents::new(vec![
            UsageEvent::foreground("com.a", at(100)),
            UsageEvent::foreground("com.b", at(400)),
        ]);
        let sample = sampler(source.clone()).sample_at(at(1000));
        assert_eq!(sample.app_id.as_deref(), Some("com.b"));
        assert_eq!(sample.observed_at, at(1000));

        let (begin, end) = source.last_window.lock().unwrap().unwrap();
        assert_eq!(end - begin, TimeDelta::seconds(1));
    }

    #[test]
    fn test_own_and_shell_read_as_none() {
        let source = FakeEvents::new(vec![
            UsageEvent::foreground("com.a", at(100)),
            UsageEvent::foreground(OWN, at(200)),
        ]);
        assert!(sampler(source).sample_at(at(1000)).app_id.is_none());

        let source = FakeEvents::new(vec![UsageEvent::foreground(SHELL, at(200))]);
        assert!(sampler(source).sample_at(at(1000)).app_id.is_none());
    }

    #[test]
    fn test_missing_permission_degrades_then_recovers() {
        let source = FakeEvents::new(vec![UsageEvent::foreground("com.a", at(100))]);
        let sampler = sampler(source.clone());

        source.permitted.store(false, Ordering::SeqCst);
        assert!(sampler.sample_at(at(1000)).app_id.is_none());
        assert!(sampler.sample_at(at(1500)).app_id.is_none());

        source.permitted.store(true, Ordering::SeqCst);
        assert_eq!(sampler.sample_at(at(2000)).app_id.as_deref(), Some("com.a"));
    }

    #[test]
    fn test_query_failure_reads_as_none() {
        let source = FakeEvents::new(Vec::new());
        *source.events.lock().unwrap() = Err("binder died".into());
        assert!(sampler(source).sample_at(at(1000)).app_id.is_none());
    }

    #[test]
    fn test_null_source_never_reports_an_app() {
        let sampler = ForegroundSampler::new(
            Arc::new(NullUsageEvents),
            OWN,
            Vec::new(),
            Duration::from_secs(1),
        );
        assert!(sampler.sample_at(Utc::now()).app_id.is_none());
    }

    #[tokio::test]
    async fn test_async_sample_runs_off_executor() {
        let source = FakeEvents::new(vec![UsageEvent::foreground("com.a", Utc::now())]);
        let sampler = ForegroundSampler::new(source, OWN, Vec::new(), Duration::from_secs(5));
        assert_eq!(
            sampler.current_foreground().await.unwrap().as_deref(),
            Some("com.a")
        );
    }
}
