use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info_span, instrument, Instrument};

use crate::cache::SnapshotCache;
use crate::lifecycle::{sweep_expired, StatusUpdate};
use crate::store::{DutyStore, Store};
use crate::utils::{Duty, DutyPatch};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub planned: usize,
    pub applied: usize,
    pub failed: usize,
}

/// Periodically closes out duties whose end time has passed.
///
/// Runs once as soon as it is started and then on every interval tick. The
/// sweep is not coordinated with manual status changes; whichever write
/// lands last wins.
pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    duties: SnapshotCache<Duty>,
    interval: Duration,
    task: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn Store>, duties: SnapshotCache<Duty>, interval: Duration) -> Self {
        Self {
            store,
            duties,
            interval,
            task: Arc::new(RwLock::new(None)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn start(&self) -> Result<()> {
        ensure!(!self.interval.is_zero(), "Sweep interval must be greater than zero");

        let mut task = self.task.write().await;
        if task.is_some() {
            return Ok(());
        }

        info!("Starting expiry sweeper with interval {:?}", self.interval);

        let store = Arc::clone(&self.store);
        let duties = self.duties.clone();
        let interval = self.interval;
        *task = Some(tokio::spawn(async move {
            Self::sweep_loop(store, duties, interval)
                .instrument(info_span!(
                    "expiry_sweep",
                    sweep.interval_secs = interval.as_secs(),
                    sweep.cycles = 0_u64,
                ))
                .await
        }));

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if let Some(handle) = self.task.write().await.take() {
            info!("Stopping expiry sweeper");
            handle.abort();
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.task.read().await.is_some()
    }

    /// Sweeps the store's current duties once, outside the timer.
    pub async fn sweep_now(&self) -> SweepReport {
        let handle = self.duties.acquire();
        sweep_once(self.store.as_ref(), &handle.snapshot(), Utc::now()).await
    }

    async fn sweep_loop(store: Arc<dyn Store>, duties: SnapshotCache<Duty>, interval: Duration) {
        let span = tracing::Span::current();
        let handle = duties.acquire();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycle_count = 0_u64;

        loop {
            ticker.tick().await;
            cycle_count += 1;
            span.record("sweep.cycles", cycle_count);

            sweep_once(store.as_ref(), &handle.snapshot(), Utc::now()).await;
        }
    }
}

#[instrument(
    skip_all,
    fields(
        sweep.planned = tracing::field::Empty,
        sweep.failed = tracing::field::Empty,
        sweep.duration_ms = tracing::field::Empty,
    )
)]
pub async fn sweep_once<S>(store: &S, duties: &[Duty], now: DateTime<Utc>) -> SweepReport
where
    S: DutyStore + ?Sized,
{
    let start = Instant::now();
    let span = tracing::Span::current();

    let plan = sweep_expired(duties, now);
    span.record("sweep.planned", plan.len());

    let report = apply_plan(store, &plan).await;

    span.record("sweep.failed", report.failed);
    span.record("sweep.duration_ms", start.elapsed().as_millis() as i64);

    if report.planned > 0 {
        info!(
            "Expiry sweep closed {} of {} lapsed duties",
            report.applied, report.planned
        );
    }

    report
}

/// Issues one status write per update. A failed write is logged and the
/// rest of the plan still runs.
pub async fn apply_plan<S>(store: &S, plan: &[StatusUpdate]) -> SweepReport
where
    S: DutyStore + ?Sized,
{
    let mut report = SweepReport {
        planned: plan.len(),
        ..SweepReport::default()
    };

    for update in plan {
        match store
            .update(&update.duty_id, DutyPatch::status(update.status.clone()))
            .await
        {
            Ok(()) => report.applied += 1,
            Err(e) => {
                error!("Failed to mark duty {} as {}: {}", update.duty_id, update.status, e);
                report.failed += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LiveData;
    use crate::geo::LatLng;
    use crate::store::{Collection, MemoryStore};
    use crate::utils::DutyStatus;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn seed(store: &MemoryStore, id: &str, status: &str, end: DateTime<Utc>) {
        store
            .insert_document(
                Collection::Duties,
                id,
                json!({
                    "officerUids": ["o1"],
                    "type": "naka",
                    "location": { "polygon": [
                        LatLng::new(15.30, 74.12),
                        LatLng::new(15.31, 74.12),
                        LatLng::new(15.31, 74.13)
                    ]},
                    "endTime": end.to_rfc3339(),
                    "status": status,
                }),
            )
            .unwrap();
    }

    fn status_of(store: &MemoryStore, id: &str) -> Option<DutyStatus> {
        store
            .subscribe()
            .borrow()
            .iter()
            .find(|d| d.id == id)
            .and_then(|d| d.status.clone())
    }

    #[tokio::test]
    async fn test_apply_plan_continues_after_failure() {
        let store = MemoryStore::new();
        let past = Utc::now() - ChronoDuration::minutes(10);
        seed(&store, "d1", "incomplete", past);
        seed(&store, "d3", "active", past);

        let plan: Vec<StatusUpdate> = ["d1", "gone", "d3"]
            .iter()
            .map(|id| StatusUpdate {
                duty_id: id.to_string(),
                status: DutyStatus::Completed,
            })
            .collect();

        let report = apply_plan(&store, &plan).await;
        assert_eq!(report, SweepReport { planned: 3, applied: 2, failed: 1 });
        assert_eq!(status_of(&store, "d1"), Some(DutyStatus::Completed));
        assert_eq!(status_of(&store, "d3"), Some(DutyStatus::Completed));
    }

    #[tokio::test]
    async fn test_sweep_once_only_touches_lapsed_duties() {
        let store = MemoryStore::new();
        let now = Utc::now();
        seed(&store, "past", "incomplete", now - ChronoDuration::minutes(1));
        seed(&store, "future", "incomplete", now + ChronoDuration::minutes(30));
        seed(&store, "done", "complete", now - ChronoDuration::hours(3));

        let duties = store.subscribe().borrow().clone();
        let report = sweep_once(&store, &duties, now).await;

        assert_eq!(report, SweepReport { planned: 1, applied: 1, failed: 0 });
        assert_eq!(status_of(&store, "past"), Some(DutyStatus::Completed));
        assert_eq!(status_of(&store, "future"), Some(DutyStatus::Incomplete));
        assert_eq!(status_of(&store, "done"), Some(DutyStatus::Complete));
    }

    #[tokio::test]
    async fn test_sweeper_runs_immediately_and_stops() {
        let store = MemoryStore::new();
        seed(&store, "past", "incomplete", Utc::now() - ChronoDuration::minutes(1));

        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let live = LiveData::new(Arc::clone(&shared));
        let sweeper = ExpirySweeper::new(shared, live.duties.clone(), Duration::from_secs(3600));

        let mut duties = store.subscribe();
        sweeper.start().await.unwrap();
        assert!(sweeper.is_running().await);

        tokio::time::timeout(Duration::from_secs(5), duties.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status_of(&store, "past"), Some(DutyStatus::Completed));

        sweeper.stop().await.unwrap();
        assert!(!sweeper.is_running().await);
    }

    #[tokio::test]
    async fn test_sweep_now_reports() {
        let store = MemoryStore::new();
        seed(&store, "a", "assigned", Utc::now() - ChronoDuration::minutes(1));
        seed(&store, "b", "missed", Utc::now() - ChronoDuration::minutes(1));

        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let live = LiveData::new(Arc::clone(&shared));
        let sweeper = ExpirySweeper::new(shared, live.duties, Duration::from_secs(60));

        let report = sweeper.sweep_now().await;
        assert_eq!(report, SweepReport { planned: 2, applied: 2, failed: 0 });
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let live = LiveData::new(Arc::clone(&store));
        let sweeper = ExpirySweeper::new(store, live.duties, Duration::ZERO);

        assert!(sweeper.start().await.is_err());
        assert!(!sweeper.is_running().await);
    }
}
