//! Region resolver: cached reference table plus hierarchical matching.
//!
//! Lookup flow:  fresh snapshot → (empty or expired) reload from source → linear scan
//!
//! The snapshot is replaced whole on reload. Readers clone the `Arc` and
//! scan outside the lock, so a reload never blocks a scan in progress.

use super::table::TableSource;
use super::types::{Coordinate, RegionQuery, TableError};
use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};

/// Default snapshot lifetime.
pub const DEFAULT_TTL: std::time::Duration = std::time::Duration::from_secs(3600);

struct Snapshot {
    rows: Arc<[Coordinate]>,
    loaded_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Snapshot>,
    last_error: Option<String>,
    /// Bumped by every invalidation; a reload that started under an older
    /// generation returns its rows but does not install them.
    generation: u64,
}

/// Load state of the reference table, for health checks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatus {
    pub regions: usize,
    pub loaded_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl TableStatus {
    pub fn is_healthy(&self) -> bool {
        self.last_error.is_none() && self.regions > 0
    }
}

/// The region resolver with its time-bounded cache.
pub struct RegionResolver {
    source: Box<dyn TableSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cache: RwLock<CacheState>,
}

impl RegionResolver {
    pub fn new(source: impl TableSource + 'static, ttl: std::time::Duration) -> Self {
        Self::with_clock(source, ttl, Arc::new(SystemClock))
    }

    /// Create a resolver with a specific clock (for testing).
    pub fn with_clock(
        source: impl TableSource + 'static,
        ttl: std::time::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source: Box::new(source),
            clock,
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(36_500)),
            cache: RwLock::new(CacheState::default()),
        }
    }

    /// Return the cached table, reloading it when empty or expired.
    pub fn load_table(&self) -> Result<Arc<[Coordinate]>, TableError> {
        let now = self.clock.now();
        if let Some(rows) = self.fresh_rows(now) {
            return Ok(rows);
        }
        self.reload(now)
    }

    /// Find the first row matching `query`. Load failures are logged and
    /// reported as no match; use [`RegionResolver::lookup`] to tell them apart.
    pub fn find_coordinate(&self, query: &RegionQuery) -> Option<Coordinate> {
        self.lookup(query).unwrap_or_default()
    }

    /// Find the first row matching `query`, surfacing load failures.
    pub fn lookup(&self, query: &RegionQuery) -> Result<Option<Coordinate>, TableError> {
        let rows = self.load_table()?;
        let found = rows.iter().find(|row| query.matches(row)).cloned();
        match &found {
            Some(c) => debug!(query = %query, nx = c.nx, ny = c.ny, "region matched"),
            None => debug!(query = %query, "no region match"),
        }
        Ok(found)
    }

    /// Every row in table order; empty if the table cannot be loaded.
    pub fn list_all_regions(&self) -> Vec<Coordinate> {
        self.try_list_all_regions().unwrap_or_default()
    }

    pub fn try_list_all_regions(&self) -> Result<Vec<Coordinate>, TableError> {
        Ok(self.load_table()?.to_vec())
    }

    /// Drop the snapshot; the next lookup reloads.
    pub fn invalidate_cache(&self) {
        let mut state = self.write_state();
        state.snapshot = None;
        state.generation += 1;
        info!(source = %self.source.describe(), "region cache invalidated");
    }

    /// Re-read the source now, ignoring the TTL. On failure the current
    /// snapshot stays in place.
    pub fn refresh(&self) -> Result<Arc<[Coordinate]>, TableError> {
        self.reload(self.clock.now())
    }

    pub fn status(&self) -> TableStatus {
        let state = self.read_state();
        TableStatus {
            regions: state.snapshot.as_ref().map_or(0, |s| s.rows.len()),
            loaded_at: state.snapshot.as_ref().map(|s| s.loaded_at),
            last_error: state.last_error.clone(),
        }
    }

    fn fresh_rows(&self, now: DateTime<Utc>) -> Option<Arc<[Coordinate]>> {
        let state = self.read_state();
        state
            .snapshot
            .as_ref()
            .filter(|s| now.signed_duration_since(s.loaded_at) < self.ttl)
            .map(|s| Arc::clone(&s.rows))
    }

    // Reads happen outside the lock; a failed read keeps whatever snapshot
    // was there before.
    fn reload(&self, now: DateTime<Utc>) -> Result<Arc<[Coordinate]>, TableError> {
        let started = self.read_state().generation;
        match self.source.read() {
            Ok(rows) => {
                let rows: Arc<[Coordinate]> = rows.into();
                info!(source = %self.source.describe(), regions = rows.len(), "region table loaded");
                let mut state = self.write_state();
                if state.generation != started {
                    debug!("cache invalidated during reload; not installing");
                    return Ok(rows);
                }
                state.snapshot = Some(Snapshot {
                    rows: Arc::clone(&rows),
                    loaded_at: now,
                });
                state.last_error = None;
                Ok(rows)
            }
            Err(e) => {
                error!(source = %self.source.describe(), error = %e, "region table load failed");
                self.write_state().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory table that counts reads and can be told to fail.
    pub(crate) struct CountingTable {
        rows: Vec<Coordinate>,
        reads: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    impl CountingTable {
        pub(crate) fn new(rows: Vec<Coordinate>) -> Self {
            Self {
                rows,
                reads: Arc::new(AtomicUsize::new(0)),
                fail: Arc::new(AtomicBool::new(false)),
            }
        }

        pub(crate) fn reads(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.reads)
        }

        pub(crate) fn fail_switch(&self) -> Arc<AtomicBool> {
            Arc::clone(&self.fail)
        }
    }

    impl TableSource for CountingTable {
        fn read(&self) -> Result<Vec<Coordinate>, TableError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(TableError::Empty);
            }
            Ok(self.rows.clone())
        }

        fn describe(&self) -> String {
            "memory".into()
        }
    }

    pub(crate) fn coord(l1: &str, l2: &str, l3: &str, nx: i32, ny: i32) -> Coordinate {
        Coordinate {
            level1: l1.into(),
            level2: l2.into(),
            level3: l3.into(),
            nx,
            ny,
        }
    }

    pub(crate) fn sample_rows() -> Vec<Coordinate> {
        vec![
            coord("서울특별시", "", "", 60, 127),
            coord("서울특별시", "종로구", "", 60, 127),
            coord("서울특별시", "종로구", "청운효자동", 60, 127),
            coord("서울특별시", "강남구", "역삼1동", 61, 125),
            coord("부산광역시", "해운대구", "", 99, 75),
        ]
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 22, 3, 0, 0).unwrap()
    }

    fn resolver_with(rows: Vec<Coordinate>) -> (RegionResolver, Arc<AtomicUsize>, Arc<ManualClock>) {
        let table = CountingTable::new(rows);
        let reads = table.reads();
        let clock = Arc::new(ManualClock::new(start()));
        let resolver = RegionResolver::with_clock(table, DEFAULT_TTL, clock.clone());
        (resolver, reads, clock)
    }

    #[test]
    fn test_single_match() {
        let (resolver, _, _) = resolver_with(vec![
            coord("Seoul", "", "", 60, 127),
            coord("Busan", "", "", 98, 76),
        ]);
        let found = resolver.find_coordinate(&RegionQuery::level1("Seoul")).unwrap();
        assert_eq!((found.nx, found.ny), (60, 127));
    }

    #[test]
    fn test_no_match_is_absence() {
        let (resolver, _, _) = resolver_with(vec![coord("Busan", "", "", 98, 76)]);
        assert!(resolver.find_coordinate(&RegionQuery::level1("Seoul")).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let (resolver, _, _) = resolver_with(vec![
            coord("Seoul", "Jongno", "", 60, 127),
            coord("Seoul", "Gangnam", "", 61, 126),
        ]);
        let found = resolver.find_coordinate(&RegionQuery::level1("Seoul")).unwrap();
        assert_eq!(found.level2, "Jongno");
    }

    #[test]
    fn test_level2_must_match() {
        let (resolver, _, _) = resolver_with(vec![
            coord("X", "Z", "", 1, 1),
            coord("X", "Y", "", 2, 2),
        ]);
        let found = resolver
            .find_coordinate(&RegionQuery::new(Some("X"), Some("Y"), None))
            .unwrap();
        assert_eq!(found.nx, 2);

        let (resolver, _, _) = resolver_with(vec![coord("X", "Z", "", 1, 1)]);
        assert!(resolver
            .find_coordinate(&RegionQuery::new(Some("X"), Some("Y"), None))
            .is_none());
    }

    #[test]
    fn test_hierarchical_match() {
        let (resolver, _, _) = resolver_with(sample_rows());
        let q = RegionQuery::new(Some("서울"), Some("강남구"), Some("역삼"));
        let found = resolver.find_coordinate(&q).unwrap();
        assert_eq!((found.nx, found.ny), (61, 125));

        // Without level3 the district row comes first in table order.
        let q = RegionQuery::new(Some("서울특별시"), Some("종로구"), None);
        assert_eq!(resolver.find_coordinate(&q).unwrap().level3, "");
    }

    #[test]
    fn test_cache_hit_within_ttl() {
        let (resolver, reads, clock) = resolver_with(sample_rows());
        resolver.find_coordinate(&RegionQuery::level1("서울"));
        clock.advance(Duration::minutes(59));
        resolver.find_coordinate(&RegionQuery::level1("부산"));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reload_after_ttl() {
        let (resolver, reads, clock) = resolver_with(sample_rows());
        resolver.find_coordinate(&RegionQuery::level1("서울"));
        clock.advance(Duration::minutes(61));
        resolver.find_coordinate(&RegionQuery::level1("서울"));
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let (resolver, reads, _) = resolver_with(sample_rows());
        resolver.load_table().unwrap();
        resolver.invalidate_cache();
        assert_eq!(resolver.status().regions, 0);
        resolver.load_table().unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_refresh_rereads_within_ttl() {
        let (resolver, reads, _) = resolver_with(sample_rows());
        resolver.load_table().unwrap();
        let rows = resolver.refresh().unwrap();
        assert_eq!(rows.len(), sample_rows().len());
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_refresh_keeps_snapshot() {
        let table = CountingTable::new(sample_rows());
        let fail = table.fail_switch();
        let reads = table.reads();
        let resolver = RegionResolver::new(table, DEFAULT_TTL);

        resolver.load_table().unwrap();
        fail.store(true, Ordering::SeqCst);
        assert!(resolver.refresh().is_err());

        assert_eq!(resolver.status().regions, sample_rows().len());
        let found = resolver.lookup(&RegionQuery::level1("부산")).unwrap();
        assert_eq!(found.map(|c| c.nx), Some(99));
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    /// Source that invalidates the resolver in the middle of its own read.
    struct InvalidatingTable {
        resolver: Arc<std::sync::OnceLock<Arc<RegionResolver>>>,
        fired: AtomicBool,
    }

    impl TableSource for InvalidatingTable {
        fn read(&self) -> Result<Vec<Coordinate>, TableError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                if let Some(resolver) = self.resolver.get() {
                    resolver.invalidate_cache();
                }
            }
            Ok(sample_rows())
        }

        fn describe(&self) -> String {
            "invalidating".into()
        }
    }

    #[test]
    fn test_invalidate_during_reload_wins() {
        let slot = Arc::new(std::sync::OnceLock::new());
        let table = InvalidatingTable {
            resolver: Arc::clone(&slot),
            fired: AtomicBool::new(false),
        };
        let resolver = Arc::new(RegionResolver::new(table, DEFAULT_TTL));
        assert!(slot.set(Arc::clone(&resolver)).is_ok());

        // The read that raced the invalidation still answers its caller.
        assert_eq!(resolver.load_table().unwrap().len(), sample_rows().len());
        assert_eq!(resolver.status().regions, 0);

        resolver.load_table().unwrap();
        assert_eq!(resolver.status().regions, sample_rows().len());
    }

    #[test]
    fn test_concurrent_first_loads_agree() {
        let table = CountingTable::new(sample_rows());
        let reads = table.reads();
        let resolver = RegionResolver::new(table, DEFAULT_TTL);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| resolver.load_table().unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(&*handle.join().unwrap(), sample_rows().as_slice());
            }
        });

        assert_eq!(resolver.status().regions, sample_rows().len());
        assert!(resolver.status().is_healthy());
        assert!((1..=8).contains(&reads.load(Ordering::SeqCst)));
        assert_eq!(resolver.list_all_regions(), sample_rows());
    }

    #[test]
    fn test_load_failure_is_soft_for_find() {
        let table = CountingTable::new(sample_rows());
        table.fail_switch().store(true, Ordering::SeqCst);
        let resolver = RegionResolver::new(table, DEFAULT_TTL);

        assert!(resolver.find_coordinate(&RegionQuery::level1("서울")).is_none());
        assert!(resolver.list_all_regions().is_empty());
        assert!(resolver.lookup(&RegionQuery::level1("서울")).is_err());

        let status = resolver.status();
        assert!(!status.is_healthy());
        assert!(status.last_error.is_some());
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let table = CountingTable::new(sample_rows());
        let fail = table.fail_switch();
        let clock = Arc::new(ManualClock::new(start()));
        let resolver = RegionResolver::with_clock(table, DEFAULT_TTL, clock.clone());

        resolver.load_table().unwrap();
        fail.store(true, Ordering::SeqCst);
        clock.advance(Duration::hours(2));
        assert!(resolver.load_table().is_err());

        let status = resolver.status();
        assert_eq!(status.regions, sample_rows().len());
        assert!(status.last_error.is_some());

        fail.store(false, Ordering::SeqCst);
        resolver.load_table().unwrap();
        assert!(resolver.status().is_healthy());
    }

    #[test]
    fn test_list_all_regions_in_order() {
        let (resolver, _, _) = resolver_with(sample_rows());
        let all = resolver.list_all_regions();
        assert_eq!(all, sample_rows());
    }
}
