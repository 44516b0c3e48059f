//! Interval-based job dispatch for the sync pipeline.
//!
//! Each registered job runs on its own timer. A tick that arrives while the
//! previous invocation of the same job is still in flight is dropped, not
//! queued. Job errors, timeouts, and panics are logged and isolated from the
//! other jobs and from the dispatch loop itself.

use crate::error::Result;
use crate::observability;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

type BoxedJobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobFn = Arc<dyn Fn() -> BoxedJobFuture + Send + Sync>;

struct JobEntry {
    name: String,
    interval: Duration,
    job: JobFn,
    in_flight: Arc<AtomicBool>,
}

/// Releases the in-flight marker even when the job panics.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    jobs: Vec<JobEntry>,
    job_timeout: Duration,
    shutdown_grace: Duration,
}

impl Scheduler {
    pub fn new(job_timeout: Duration, shutdown_grace: Duration) -> Self {
        Self {
            jobs: Vec::new(),
            job_timeout,
            shutdown_grace,
        }
    }

    pub fn register<F, Fut>(&mut self, name: &str, interval: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.jobs.push(JobEntry {
            name: name.to_string(),
            interval,
            job: Arc::new(move || Box::pin(job()) as BoxedJobFuture),
            in_flight: Arc::new(AtomicBool::new(false)),
        });
    }

    /// Dispatches registered jobs until the shutdown signal fires, then
    /// waits up to the grace period for in-flight work before abandoning it.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let flags: Vec<Arc<AtomicBool>> = self.jobs.iter().map(|j| j.in_flight.clone()).collect();
        let job_timeout = self.job_timeout;

        let mut loops = Vec::new();
        for entry in self.jobs {
            let mut rx = shutdown.clone();
            loops.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(entry.interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                info!(job = %entry.name, interval_secs = entry.interval.as_secs_f64(), "job registered");
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if entry.in_flight.swap(true, Ordering::SeqCst) {
                                observability::scheduler::tick_skipped(&entry.name);
                                warn!(job = %entry.name, "previous run still in flight, tick dropped");
                                continue;
                            }
                            let guard = InFlightGuard(entry.in_flight.clone());
                            let name = entry.name.clone();
                            let fut = (entry.job)();
                            tokio::spawn(async move {
                                let _guard = guard;
                                let started = Instant::now();
                                // Extra spawn so a panicking job surfaces as a
                                // JoinError instead of tearing anything down.
                                let handle = tokio::spawn(async move {
                                    tokio::time::timeout(job_timeout, fut).await
                                });
                                match handle.await {
                                    Ok(Ok(Ok(()))) => {
                                        observability::scheduler::job_success(
                                            &name,
                                            started.elapsed().as_secs_f64(),
                                        );
                                    }
                                    Ok(Ok(Err(e))) => {
                                        observability::scheduler::job_error(&name);
                                        error!(job = %name, "job failed: {e}");
                                    }
                                    Ok(Err(_)) => {
                                        observability::scheduler::job_error(&name);
                                        error!(job = %name, "job timed out");
                                    }
                                    Err(join_err) => {
                                        observability::scheduler::job_error(&name);
                                        error!(job = %name, "job panicked: {join_err}");
                                    }
                                }
                            });
                        }
                        _ = rx.changed() => {
                            info!(job = %entry.name, "stopping dispatch");
                            break;
                        }
                    }
                }
            }));
        }

        let _ = shutdown.changed().await;
        for handle in loops {
            let _ = handle.await;
        }

        // Bounded grace period for whatever is still running; side effects of
        // abandoned jobs stand, consistent with the retryable moderation state.
        let deadline = Instant::now() + self.shutdown_grace;
        while flags.iter().any(|f| f.load(Ordering::SeqCst)) {
            if Instant::now() >= deadline {
                warn!("shutdown grace period elapsed, abandoning in-flight jobs");
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        info!("scheduler stopped cleanly");
    }
}
