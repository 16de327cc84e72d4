//! Fixed-interval driver: fetch, merge, sleep, repeat.
//!
//! ```text
//! Idle → Fetching → Merging → Sleeping → Fetching → …
//! ```
//!
//! Cycles never overlap. A store error ends the loop; fetch failures never do.

use std::{fmt, time::Duration};

use tracing::{debug, info, instrument};

use crate::{
    coordinator::Coordinator,
    error::StoreError,
    registry::TargetRegistry,
    store::{HistoryStore, MergeSummary},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Merging,
    Sleeping,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleState::Idle => "idle",
            CycleState::Fetching => "fetching",
            CycleState::Merging => "merging",
            CycleState::Sleeping => "sleeping",
        };
        f.write_str(s)
    }
}

/// Outcome of one fetch-and-merge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub merge: MergeSummary,
}

#[derive(Debug)]
pub struct Scheduler {
    registry: TargetRegistry,
    coordinator: Coordinator,
    store: HistoryStore,
    interval: Duration,
    state: CycleState,
    cycles: u64,
}

impl Scheduler {
    pub fn new(
        registry: TargetRegistry,
        coordinator: Coordinator,
        store: HistoryStore,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            coordinator,
            store,
            interval,
            state: CycleState::Idle,
            cycles: 0,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Completed cycles so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn transition(&mut self, next: CycleState) {
        debug!("{} -> {}", self.state, next);
        self.state = next;
    }

    /// Fetch every target once and merge the results into the store.
    ///
    /// Ends in [`CycleState::Sleeping`]. Only store errors are returned.
    #[instrument(skip(self), fields(cycle = self.cycles + 1))]
    pub async fn run_once(&mut self) -> Result<CycleReport, StoreError> {
        self.transition(CycleState::Fetching);
        let targets = self.registry.targets();
        let batch = self.coordinator.run_cycle(targets).await;
        let attempted = targets.len();
        let succeeded = batch.len();

        self.transition(CycleState::Merging);
        let merge = self.store.merge_and_persist(batch)?;

        self.transition(CycleState::Sleeping);
        self.cycles += 1;

        let report = CycleReport {
            attempted,
            succeeded,
            failed: attempted - succeeded,
            merge,
        };
        info!(
            "cycle complete: {}/{} targets, {} rows in store",
            report.succeeded, report.attempted, report.merge.written
        );
        Ok(report)
    }

    /// Run cycles forever, sleeping `interval` between them.
    ///
    /// Returns only when a cycle fails to read or rewrite the store.
    pub async fn run_forever(&mut self) -> Result<(), StoreError> {
        self.store.ensure_exists()?;

        loop {
            self.run_once().await?;

            info!(
                "waiting {} minutes for the next round",
                self.interval.as_secs() / 60
            );
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FetchError,
        model::{Observation, Target},
        provider::WeatherProvider,
        retry::{Fetcher, RetryPolicy, tests::observation},
    };
    use async_trait::async_trait;
    use std::sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    };

    /// Every call returns a reading one minute newer than the last.
    #[derive(Debug)]
    struct Ticking {
        next: AtomicI64,
    }

    #[async_trait]
    impl WeatherProvider for Ticking {
        async fn current(&self, target: &Target) -> Result<Observation, FetchError> {
            let ts = self.next.fetch_add(60, Ordering::SeqCst);
            Ok(observation(&target.location, &target.region, ts))
        }
    }

    fn scheduler(store: HistoryStore) -> Scheduler {
        let provider = Arc::new(Ticking { next: AtomicI64::new(1_700_000_000) });
        let fetcher = Fetcher::new(provider, RetryPolicy::default());
        let registry = TargetRegistry::new(vec![
            Target::new("Colorado", "Denver"),
            Target::new("Texas", "Austin"),
        ]);
        Scheduler::new(
            registry,
            Coordinator::new(fetcher, Duration::from_secs(5)),
            store,
            Duration::from_secs(15 * 60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_fetches_merges_and_ends_sleeping() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = scheduler(HistoryStore::new(dir.path().join("h.csv")));
        assert_eq!(scheduler.state(), CycleState::Idle);

        let report = scheduler.run_once().await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.merge.written, 2);
        assert_eq!(scheduler.state(), CycleState::Sleeping);
        assert_eq!(scheduler.cycles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cycles_accumulate_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("h.csv"));
        let mut scheduler = scheduler(store.clone());

        scheduler.run_once().await.unwrap();
        let report = scheduler.run_once().await.unwrap();

        assert_eq!(report.merge.loaded, 2);
        assert_eq!(report.merge.written, 4);
        assert_eq!(store.load().unwrap().observations.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unwritable_store_fails_before_first_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let mut scheduler = scheduler(HistoryStore::new(blocker.join("h.csv")));
        let result = scheduler.run_forever().await;

        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert_eq!(scheduler.cycles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_inside_a_cycle_ends_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the CSV file should be: opening succeeds, reading fails
        let path = dir.path().join("h.csv");
        std::fs::create_dir(&path).unwrap();

        let mut scheduler = scheduler(HistoryStore::new(&path));
        let result = scheduler.run_forever().await;

        assert!(matches!(result, Err(StoreError::Csv { .. })), "got {result:?}");
        assert_eq!(scheduler.state(), CycleState::Merging);
        assert_eq!(scheduler.cycles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rewrite_failure_after_a_good_cycle_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("data");
        let store = HistoryStore::new(parent.join("h.csv"));
        let mut scheduler = scheduler(store);

        scheduler.run_once().await.unwrap();

        // swap the store's directory for a plain file
        std::fs::remove_dir_all(&parent).unwrap();
        std::fs::write(&parent, "").unwrap();

        let result = scheduler.run_once().await;
        assert!(matches!(result, Err(StoreError::Io { .. })), "got {result:?}");
        assert_eq!(scheduler.state(), CycleState::Merging);
        assert_eq!(scheduler.cycles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_full_interval_between_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("h.csv"));
        let mut scheduler = scheduler(store.clone());

        // one cycle issues 2 targets 5s apart, then sleeps 15 minutes
        let deadline = Duration::from_secs(5 + 15 * 60 + 5 + 1);
        let ran = tokio::time::timeout(deadline, scheduler.run_forever()).await;

        assert!(ran.is_err(), "loop should still be running");
        assert_eq!(store.load().unwrap().observations.len(), 4);
    }
}
