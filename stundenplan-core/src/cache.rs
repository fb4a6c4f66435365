use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::{Classifier, FeedConfig, FeedNormalizer, LessonEvent, Result};

/// Injectable wall clock so cache freshness is testable without real
/// time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Anything that can produce a freshly classified event set. The
/// cache only ever sees this seam, so tests can inject a fake.
#[async_trait]
pub trait TimetableSource: Send + Sync {
    async fn load(&self) -> Result<Vec<LessonEvent>>;
}

/// The production source: remote fetch, snapshot fallback, classify.
pub struct FeedIngestor {
    normalizer: FeedNormalizer,
    classifier: Classifier,
}

impl FeedIngestor {
    pub fn new(config: FeedConfig) -> Self {
        let classifier = Classifier::new(config.timezone, config.skew_hours);
        Self {
            normalizer: FeedNormalizer::new(config),
            classifier,
        }
    }

    pub const fn classifier(&self) -> &Classifier {
        &self.classifier
    }
}

#[async_trait]
impl TimetableSource for FeedIngestor {
    async fn load(&self) -> Result<Vec<LessonEvent>> {
        let table = match self.normalizer.fetch_table().await {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!("remote ingestion failed, falling back to snapshot: {e}");
                self.normalizer.read_snapshot().await?
            }
        };

        let classified = self.classifier.classify(&table)?;
        if !classified.rejected.is_empty() {
            tracing::debug!(
                dropped = classified.rejected.len(),
                "records rejected during classification"
            );
        }
        Ok(classified.events)
    }
}

/// One classified event set with its capture timestamp. Replaced as a
/// whole on refresh, never merged.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub events: Vec<LessonEvent>,
    pub captured_at: DateTime<Utc>,
}

/// Holds the most recent event set and re-ingests once it is older
/// than the freshness window. Refreshes are serialized; while one is
/// in flight, callers holding stale-but-present data are served that
/// data immediately instead of blocking on network I/O.
pub struct TimetableCache<S, C> {
    source: S,
    clock: C,
    freshness: TimeDelta,
    slot: RwLock<Option<Arc<CacheEntry>>>,
    refresh: tokio::sync::Mutex<()>,
}

impl<S: TimetableSource, C: Clock> TimetableCache<S, C> {
    pub fn new(source: S, clock: C, freshness: std::time::Duration) -> Self {
        Self {
            source,
            clock,
            freshness: TimeDelta::from_std(freshness).unwrap_or(TimeDelta::MAX),
            slot: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Current best-effort event set. `None` only while the cache has
    /// never been populated and ingestion keeps failing.
    pub async fn get_events(&self) -> Option<Arc<CacheEntry>> {
        let now = self.clock.now();

        if let Some(entry) = self.snapshot() {
            if now - entry.captured_at < self.freshness {
                return Some(entry);
            }
            // Stale. Refresh only if nobody else already is; a stale
            // value beats blocking on the network.
            match self.refresh.try_lock() {
                Ok(_guard) => {
                    if self.is_fresh() {
                        return self.snapshot();
                    }
                    self.do_refresh().await;
                }
                Err(_) => return Some(entry),
            }
            return self.snapshot();
        }

        // Empty cache: the first fill is worth waiting for.
        let _guard = self.refresh.lock().await;
        if self.snapshot().is_none() {
            self.do_refresh().await;
        }
        self.snapshot()
    }

    fn snapshot(&self) -> Option<Arc<CacheEntry>> {
        self.slot.read().expect("cache lock poisoned").clone()
    }

    fn is_fresh(&self) -> bool {
        self.snapshot()
            .is_some_and(|entry| self.clock.now() - entry.captured_at < self.freshness)
    }

    /// Replace the event set wholesale, or keep the previous one on
    /// failure. Callers must hold the refresh lock.
    async fn do_refresh(&self) {
        match self.source.load().await {
            Ok(events) => {
                let entry = Arc::new(CacheEntry {
                    captured_at: self.clock.now(),
                    events,
                });
                tracing::info!(events = entry.events.len(), "timetable cache refreshed");
                *self.slot.write().expect("cache lock poisoned") = Some(entry);
            }
            Err(e) => {
                tracing::warn!("timetable refresh failed, keeping previous data: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::Error;

    struct FakeClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl FakeClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Utc.with_ymd_and_hms(2025, 9, 1, 6, 0, 0).unwrap()),
            })
        }

        fn advance(&self, secs: i64) {
            let mut now = self.now.lock().unwrap();
            *now += TimeDelta::seconds(secs);
        }
    }

    impl Clock for Arc<FakeClock> {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    struct FakeSource {
        loads: AtomicUsize,
        failing: AtomicBool,
    }

    impl FakeSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TimetableSource for Arc<FakeSource> {
        async fn load(&self) -> Result<Vec<LessonEvent>> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Timeout);
            }
            let start = Utc.with_ymd_and_hms(2025, 9, 1, 7, 15, 0).unwrap();
            Ok(vec![LessonEvent {
                display_summary: format!("Mathematik #{n}"),
                subject: "Mathematik".to_string(),
                original_summary: "M sig 1Mf".to_string(),
                start: start.fixed_offset(),
                end: (start + TimeDelta::minutes(45)).fixed_offset(),
                description: String::new(),
                location: String::new(),
                is_exam: false,
                is_cancelled: false,
                special_note: None,
            }])
        }
    }

    fn cache(
        source: &Arc<FakeSource>,
        clock: &Arc<FakeClock>,
    ) -> TimetableCache<Arc<FakeSource>, Arc<FakeClock>> {
        TimetableCache::new(source.clone(), clock.clone(), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn fresh_window_avoids_reingestion() {
        let source = FakeSource::new();
        let clock = FakeClock::new();
        let cache = cache(&source, &clock);

        // t=0: first call populates the cache.
        let first = cache.get_events().await.unwrap();
        assert_eq!(source.loads(), 1);

        // t=100: served from cache.
        clock.advance(100);
        let second = cache.get_events().await.unwrap();
        assert_eq!(source.loads(), 1);
        assert_eq!(first.events, second.events);

        // t=400: past the freshness window, re-ingests.
        clock.advance(300);
        let third = cache.get_events().await.unwrap();
        assert_eq!(source.loads(), 2);
        assert_eq!(third.events[0].display_summary, "Mathematik #2");
    }

    #[tokio::test]
    async fn failed_refresh_serves_last_known_good() {
        let source = FakeSource::new();
        let clock = FakeClock::new();
        let cache = cache(&source, &clock);

        let first = cache.get_events().await.unwrap();
        assert_eq!(first.events[0].display_summary, "Mathematik #1");

        source.failing.store(true, Ordering::SeqCst);
        clock.advance(400);
        let stale = cache.get_events().await.unwrap();
        assert_eq!(source.loads(), 2);
        assert_eq!(stale.events[0].display_summary, "Mathematik #1");
        assert_eq!(stale.captured_at, first.captured_at);
    }

    #[tokio::test]
    async fn empty_cache_with_failing_source_reports_no_data() {
        let source = FakeSource::new();
        source.failing.store(true, Ordering::SeqCst);
        let clock = FakeClock::new();
        let cache = cache(&source, &clock);

        assert!(cache.get_events().await.is_none());

        // The next call is the natural retry point.
        source.failing.store(false, Ordering::SeqCst);
        assert!(cache.get_events().await.is_some());
        assert_eq!(source.loads(), 2);
    }

    #[tokio::test]
    async fn refresh_replaces_the_set_wholesale() {
        let source = FakeSource::new();
        let clock = FakeClock::new();
        let cache = cache(&source, &clock);

        cache.get_events().await.unwrap();
        clock.advance(400);
        let refreshed = cache.get_events().await.unwrap();

        assert_eq!(refreshed.events.len(), 1);
        assert!(refreshed
            .events
            .iter()
            .all(|e| e.display_summary == "Mathematik #2"));
    }

    #[tokio::test]
    async fn ingestor_falls_back_to_local_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stundenplan.csv");
        std::fs::write(
            &path,
            "Subject,Start Date,Start Time,End Date,End Time,Description,Location\n\
             M sig 1Mf HL3.01,09/01/2025,07:15,09/01/2025,08:00,,\n",
        )
        .unwrap();

        // No URL configured, so the remote path fails and the local
        // snapshot is the only source.
        let config = FeedConfig {
            url: None,
            snapshot_path: path,
            ..FeedConfig::default()
        };
        let events = FeedIngestor::new(config).load().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].display_summary, "Mathematik (HL3.01)");
    }

    #[tokio::test]
    async fn ingestor_without_any_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = FeedConfig {
            url: None,
            snapshot_path: dir.path().join("missing.csv"),
            ..FeedConfig::default()
        };
        assert!(FeedIngestor::new(config).load().await.is_err());
    }

    #[tokio::test]
    async fn stale_reader_is_not_blocked_by_inflight_refresh() {
        let source = FakeSource::new();
        let clock = FakeClock::new();
        let cache = cache(&source, &clock);

        cache.get_events().await.unwrap();
        clock.advance(400);

        // Simulate an in-flight refresh by holding the refresh lock.
        let guard = cache.refresh.lock().await;
        let entry = cache.get_events().await.unwrap();
        drop(guard);

        // Served the stale entry without attempting another load.
        assert_eq!(source.loads(), 1);
        assert_eq!(entry.events[0].display_summary, "Mathematik #1");
    }
}
