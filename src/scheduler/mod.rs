//! Periodic job scheduler.
//!
//! Each registered job owns one spawned task driven by a `tokio::time`
//! interval with `MissedTickBehavior::Skip`: the loop awaits the job body
//! before taking the next tick, so a run longer than the period can never
//! overlap itself, and the ticks it overran are skipped rather than queued.
//! Independent jobs run concurrently on the shared runtime.
//!
//! Run outcomes land in a shared registry; three consecutive failures flip a
//! job to degraded and invoke its escalation hook without stopping the ticks.

use crate::error::{KlaxonError, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Consecutive failures before a job is marked degraded
pub const DEGRADED_AFTER: u32 = 3;

/// Type-erased job body returning the number of records processed
pub type JobBody = Arc<dyn Fn() -> BoxFuture<'static, Result<u64>> + Send + Sync>;

/// Escalation hook invoked once per transition into degraded
pub type DegradedHook = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Outcome of one job run
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Success { records: u64 },
    Failed { error: String },
}

/// Tracked state for one job
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub name: String,
    pub period: Duration,
    pub runs: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub degraded: bool,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_outcome: Option<RunOutcome>,
}

impl JobRecord {
    fn new(name: &str, period: Duration) -> Self {
        Self {
            name: name.to_string(),
            period,
            runs: 0,
            failures: 0,
            consecutive_failures: 0,
            degraded: false,
            last_started: None,
            last_finished: None,
            last_outcome: None,
        }
    }
}

struct JobSpec {
    name: String,
    period: Duration,
    body: JobBody,
    on_degraded: Option<DegradedHook>,
}

/// Shared, read-only view of job state for the ops surface
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl JobRegistry {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, name: &str) -> Option<JobRecord> {
        self.inner.read().await.get(name).cloned()
    }

    pub async fn snapshot(&self) -> Vec<JobRecord> {
        let mut records: Vec<_> = self.inner.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// True when any job is currently degraded
    pub async fn any_degraded(&self) -> bool {
        self.inner.read().await.values().any(|r| r.degraded)
    }
}

/// Periodic job scheduler. Register jobs, then `spawn` with a shutdown
/// receiver; in-flight runs drain on shutdown rather than being aborted.
pub struct Scheduler {
    jobs: Vec<JobSpec>,
    registry: JobRegistry,
    stagger: Duration,
}

impl Scheduler {
    pub fn new(stagger: Duration) -> Self {
        Self {
            jobs: Vec::new(),
            registry: JobRegistry::new(),
            stagger,
        }
    }

    /// Register a job by name, period, and body
    pub fn register<F>(&mut self, name: &str, period: Duration, body: F) -> Result<()>
    where
        F: Fn() -> BoxFuture<'static, Result<u64>> + Send + Sync + 'static,
    {
        self.register_spec(name, period, Arc::new(body), None)
    }

    /// Register a job with an escalation hook, invoked on the transition into
    /// degraded (e.g. to flip the handler's SyncStatus row)
    pub fn register_with_hook<F, H>(
        &mut self,
        name: &str,
        period: Duration,
        body: F,
        on_degraded: H,
    ) -> Result<()>
    where
        F: Fn() -> BoxFuture<'static, Result<u64>> + Send + Sync + 'static,
        H: Fn(String) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.register_spec(name, period, Arc::new(body), Some(Arc::new(on_degraded)))
    }

    fn register_spec(
        &mut self,
        name: &str,
        period: Duration,
        body: JobBody,
        on_degraded: Option<DegradedHook>,
    ) -> Result<()> {
        if self.jobs.iter().any(|j| j.name == name) {
            return Err(KlaxonError::DuplicateJob(name.to_string()));
        }
        self.jobs.push(JobSpec {
            name: name.to_string(),
            period,
            body,
            on_degraded,
        });
        Ok(())
    }

    pub fn registry(&self) -> JobRegistry {
        self.registry.clone()
    }

    /// Spawn one task per registered job. Returns a handle that joins them
    /// all once the shutdown signal has been observed and in-flight runs have
    /// drained.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> SchedulerHandle {
        let registry = self.registry.clone();
        let mut handles = Vec::with_capacity(self.jobs.len());

        for (index, job) in self.jobs.into_iter().enumerate() {
            let start_delay = self.stagger * index as u32;
            handles.push(spawn_job(job, registry.clone(), shutdown.clone(), start_delay));
        }

        info!("Scheduler started {} jobs", handles.len());
        SchedulerHandle { handles, registry }
    }
}

pub struct SchedulerHandle {
    handles: Vec<JoinHandle<()>>,
    registry: JobRegistry,
}

impl SchedulerHandle {
    pub fn registry(&self) -> JobRegistry {
        self.registry.clone()
    }

    /// Wait for every job loop to exit
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Scheduler stopped");
    }
}

fn spawn_job(
    job: JobSpec,
    registry: JobRegistry,
    mut shutdown: watch::Receiver<bool>,
    start_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        {
            let mut jobs = registry.inner.write().await;
            jobs.insert(job.name.clone(), JobRecord::new(&job.name, job.period));
        }

        if !start_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(start_delay) => {}
                _ = shutdown.changed() => {}
            }
        }
        if *shutdown.borrow() {
            info!("Job {} stopped before first run", job.name);
            return;
        }

        let mut ticker = interval(job.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    // A closed channel counts as a shutdown request
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let started = Utc::now();
            {
                let mut jobs = registry.inner.write().await;
                if let Some(record) = jobs.get_mut(&job.name) {
                    record.last_started = Some(started);
                }
            }

            // The in-flight run always completes; shutdown is only observed
            // between runs.
            let outcome = match (job.body)().await {
                Ok(records) => RunOutcome::Success { records },
                Err(e) => RunOutcome::Failed {
                    error: format!("{}: {}", e.category(), e),
                },
            };

            let newly_degraded = {
                let mut jobs = registry.inner.write().await;
                let record = jobs
                    .get_mut(&job.name)
                    .expect("job record exists after registration");
                record.runs += 1;
                record.last_finished = Some(Utc::now());

                let newly_degraded = match &outcome {
                    RunOutcome::Success { .. } => {
                        record.consecutive_failures = 0;
                        record.degraded = false;
                        false
                    }
                    RunOutcome::Failed { error } => {
                        record.failures += 1;
                        record.consecutive_failures += 1;
                        warn!(
                            "Job {} failed (consecutive: {}): {}",
                            job.name, record.consecutive_failures, error
                        );
                        let crossed = record.consecutive_failures == DEGRADED_AFTER;
                        if crossed {
                            record.degraded = true;
                            error!(
                                "Job {} degraded after {} consecutive failures",
                                job.name, DEGRADED_AFTER
                            );
                        }
                        crossed
                    }
                };
                record.last_outcome = Some(outcome);
                newly_degraded
            };

            if newly_degraded {
                if let Some(ref hook) = job.on_degraded {
                    hook(job.name.clone()).await;
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        info!("Job {} stopped", job.name);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_skips_ticks_instead_of_queueing() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut scheduler = Scheduler::new(Duration::ZERO);

        let body_counter = Arc::clone(&counter);
        scheduler
            .register("slow", Duration::from_millis(50), move || {
                let counter = Arc::clone(&body_counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    // Body takes more than two periods
                    tokio::time::sleep(Duration::from_millis(120)).await;
                    Ok(0)
                })
            })
            .unwrap();

        let (tx, rx) = shutdown_channel();
        let handle = scheduler.spawn(rx);

        tokio::time::sleep(Duration::from_millis(480)).await;
        tx.send(true).unwrap();
        handle.join().await;

        // Runs start at 0, 150, 300, 450ms (skipped ticks are dropped).
        // Back-to-back queued ticks would give ~10 runs.
        let runs = counter.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected at least 2 runs, got {runs}");
        assert!(runs <= 5, "expected skipped ticks, got {runs} runs");
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_degrade_job_and_fire_hook() {
        let mut scheduler = Scheduler::new(Duration::ZERO);
        let hook_count = Arc::new(AtomicU32::new(0));

        let hook_counter = Arc::clone(&hook_count);
        scheduler
            .register_with_hook(
                "flaky",
                Duration::from_millis(10),
                || {
                    Box::pin(async {
                        Err(KlaxonError::SourceUnavailable("down".to_string()))
                    })
                },
                move |_name| {
                    let counter = Arc::clone(&hook_counter);
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                },
            )
            .unwrap();

        let (tx, rx) = shutdown_channel();
        let registry = {
            let handle = scheduler.spawn(rx);
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(true).unwrap();
            let registry = handle.registry();
            handle.join().await;
            registry
        };

        let record = registry.get("flaky").await.unwrap();
        assert!(record.degraded);
        assert!(record.consecutive_failures >= DEGRADED_AFTER);
        // Hook fires exactly once, on the transition
        assert_eq!(hook_count.load(Ordering::SeqCst), 1);
        assert!(registry.any_degraded().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_streak() {
        let mut scheduler = Scheduler::new(Duration::ZERO);
        let attempts = Arc::new(AtomicU32::new(0));

        let body_attempts = Arc::clone(&attempts);
        scheduler
            .register("recovering", Duration::from_millis(10), move || {
                let attempts = Arc::clone(&body_attempts);
                Box::pin(async move {
                    // Fail twice, then succeed
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(KlaxonError::SourceUnavailable("blip".to_string()))
                    } else {
                        Ok(7)
                    }
                })
            })
            .unwrap();

        let (tx, rx) = shutdown_channel();
        let handle = scheduler.spawn(rx);
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        let registry = handle.registry();
        handle.join().await;

        let record = registry.get("recovering").await.unwrap();
        assert!(!record.degraded);
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.failures, 2);
        assert!(matches!(
            record.last_outcome,
            Some(RunOutcome::Success { records: 7 })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let mut scheduler = Scheduler::new(Duration::ZERO);
        scheduler
            .register("job", Duration::from_secs(1), || Box::pin(async { Ok(0) }))
            .unwrap();

        let result =
            scheduler.register("job", Duration::from_secs(1), || Box::pin(async { Ok(0) }));
        assert!(matches!(result, Err(KlaxonError::DuplicateJob(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_in_flight_run() {
        let finished = Arc::new(AtomicU32::new(0));
        let mut scheduler = Scheduler::new(Duration::ZERO);

        let body_finished = Arc::clone(&finished);
        scheduler
            .register("drainer", Duration::from_millis(10), move || {
                let finished = Arc::clone(&body_finished);
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(0)
                })
            })
            .unwrap();

        let (tx, rx) = shutdown_channel();
        let handle = scheduler.spawn(rx);

        // Let the first run start, then signal shutdown mid-run
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        handle.join().await;

        // The in-flight run completed rather than being aborted
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
