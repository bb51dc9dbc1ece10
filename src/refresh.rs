//! Pre-Refresh Scheduler
//!
//! Reloads values shortly before they expire, on a bounded pool of worker
//! threads, so request threads never wait for a background refresh.
//!
//! ```text
//!            submit(key, task)
//!                   │
//!        ┌──────────▼──────────┐   key already in flight
//!        │  in-flight map      │──────────────────────────▶ Deduplicated
//!        │  (insert-if-absent) │
//!        └──────────┬──────────┘
//!                   │ try_send
//!        ┌──────────▼──────────┐   ok
//!        │ bounded job queue   │──────────────────────────▶ Scheduled
//!        └──────────┬──────────┘
//!                   │ full
//!        workers < max_workers? ── yes ─▶ spawn extra worker ─▶ Scheduled
//!                   │ no
//!                   ▼
//!        run on the caller's thread ─────────────────────────▶ CallerRuns
//! ```
//!
//! Core workers live until shutdown. Extra workers exit after sitting idle
//! for `keep_alive`. A finished job (success, error or panic) removes its
//! in-flight entry only if the entry still belongs to it, so a job
//! resubmitted after `cancel` is never unregistered by its predecessor.
//!
//! Cancellation is cooperative: queued jobs are skipped, running jobs see
//! [`RefreshContext::is_cancelled`] flip to `true`.

use crate::clock::deadline_after;
use crate::config::PreRefreshConfig;
use crate::error::{LoaderError, Result};
use crate::metrics::{CacheMetrics, RefreshStats};
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use core::time::Duration;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[cfg(feature = "hashbrown")]
use hashbrown::HashMap;
#[cfg(not(feature = "hashbrown"))]
use std::collections::HashMap;

/// Result of a refresh task.
pub type RefreshResult = core::result::Result<(), LoaderError>;

type Task = Box<dyn FnOnce(&RefreshContext) -> RefreshResult + Send>;

/// How a submit was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued or handed to a new worker.
    Scheduled,
    /// A job for the key is already in flight. Nothing was queued.
    Deduplicated,
    /// The pool was saturated and the job ran on the submitting thread.
    CallerRuns,
    /// The scheduler is shut down.
    Rejected,
}

/// How a read that needs pre-refresh is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum RefreshMode {
    /// Report a miss so the normal miss path reloads in the foreground.
    #[default]
    Sync,
    /// Serve the current value and reload in the background.
    Async,
}

#[derive(Debug, Default)]
struct JobToken {
    cancelled: AtomicBool,
}

/// Handle passed to a running refresh task.
#[derive(Debug)]
pub struct RefreshContext {
    key: String,
    token: Arc<JobToken>,
}

impl RefreshContext {
    /// Key being refreshed.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `true` once the job has been cancelled. Long tasks should
    /// check this between steps and return early.
    pub fn is_cancelled(&self) -> bool {
        self.token.cancelled.load(Ordering::Acquire)
    }
}

struct Job {
    key: String,
    token: Arc<JobToken>,
    task: Task,
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    deduplicated: AtomicU64,
    caller_runs: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

struct Shared {
    config: PreRefreshConfig,
    in_flight: Mutex<HashMap<String, Arc<JobToken>>>,
    receiver: Receiver<Job>,
    workers: AtomicUsize,
    next_worker_id: AtomicUsize,
    counters: Counters,
}

impl Shared {
    fn run(&self, job: Job) {
        let Job { key, token, task } = job;
        if token.cancelled.load(Ordering::Acquire) {
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "skipping cancelled pre-refresh");
            self.finish(&key, &token);
            return;
        }

        let ctx = RefreshContext {
            key,
            token: Arc::clone(&token),
        };
        match catch_unwind(AssertUnwindSafe(|| task(&ctx))) {
            Ok(Ok(())) if ctx.is_cancelled() => {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Ok(())) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(key = %ctx.key, "pre-refresh completed");
            }
            Ok(Err(e)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(key = %ctx.key, error = %e, "pre-refresh failed");
            }
            Err(_) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(key = %ctx.key, "pre-refresh task panicked");
            }
        }
        self.finish(&ctx.key, &token);
    }

    fn finish(&self, key: &str, token: &Arc<JobToken>) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(key).is_some_and(|t| Arc::ptr_eq(t, token)) {
            in_flight.remove(key);
        }
    }

    fn worker_loop(self: Arc<Self>, first: Option<Job>, core: bool) {
        if let Some(job) = first {
            self.run(job);
        }
        loop {
            let job = if core {
                self.receiver.recv().ok()
            } else {
                match self.receiver.recv_timeout(self.config.keep_alive()) {
                    Ok(job) => Some(job),
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
                }
            };
            match job {
                Some(job) => self.run(job),
                None => break,
            }
        }
        self.workers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bounded, deduplicating background refresh pool.
///
/// # Examples
///
/// ```
/// use cache_shield::config::PreRefreshConfig;
/// use cache_shield::refresh::{PreRefreshScheduler, SubmitOutcome};
///
/// let scheduler = PreRefreshScheduler::new(PreRefreshConfig::default()).unwrap();
/// let outcome = scheduler.submit("users::1", |_ctx| Ok(()));
/// assert_ne!(outcome, SubmitOutcome::Rejected);
/// scheduler.shutdown();
/// assert_eq!(scheduler.submit("users::1", |_ctx| Ok(())), SubmitOutcome::Rejected);
/// ```
pub struct PreRefreshScheduler {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    accepting: AtomicBool,
}

impl PreRefreshScheduler {
    /// Validates the configuration and starts the core workers.
    pub fn new(config: PreRefreshConfig) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = crossbeam_channel::bounded(config.queue_capacity());
        let scheduler = Self {
            shared: Arc::new(Shared {
                config,
                in_flight: Mutex::new(HashMap::new()),
                receiver,
                workers: AtomicUsize::new(0),
                next_worker_id: AtomicUsize::new(0),
                counters: Counters::default(),
            }),
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
        };
        for _ in 0..config.core_workers() {
            scheduler.shared.workers.fetch_add(1, Ordering::AcqRel);
            if let Err(e) = scheduler.spawn_worker(None, true) {
                scheduler.shared.workers.fetch_sub(1, Ordering::AcqRel);
                return Err(e.into());
            }
        }
        Ok(scheduler)
    }

    fn spawn_worker(&self, first: Option<Job>, core: bool) -> std::io::Result<()> {
        let id = self.shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(format!("pre-refresh-{id}"))
            .spawn(move || shared.worker_loop(first, core))?;
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// Reserves a worker slot below `max_workers`.
    fn reserve_extra_worker(&self) -> bool {
        let max = self.shared.config.max_workers();
        self.shared
            .workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    /// Submits a refresh for `key` unless one is already in flight.
    pub fn submit<F>(&self, key: &str, task: F) -> SubmitOutcome
    where
        F: FnOnce(&RefreshContext) -> RefreshResult + Send + 'static,
    {
        if !self.accepting.load(Ordering::Acquire) {
            self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return SubmitOutcome::Rejected;
        }

        let token = {
            let mut in_flight = self.shared.in_flight.lock();
            if in_flight.contains_key(key) {
                drop(in_flight);
                self.shared.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "pre-refresh already in flight");
                return SubmitOutcome::Deduplicated;
            }
            let token = Arc::new(JobToken::default());
            in_flight.insert(key.to_string(), Arc::clone(&token));
            token
        };

        let job = Job {
            key: key.to_string(),
            token,
            task: Box::new(task),
        };

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.try_send(job),
            None => Err(TrySendError::Disconnected(job)),
        };
        let job = match sent {
            Ok(()) => {
                self.shared.counters.scheduled.fetch_add(1, Ordering::Relaxed);
                return SubmitOutcome::Scheduled;
            }
            Err(TrySendError::Disconnected(job)) => {
                self.shared.finish(&job.key, &job.token);
                self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return SubmitOutcome::Rejected;
            }
            Err(TrySendError::Full(job)) => job,
        };

        if self.reserve_extra_worker() {
            let key = job.key.clone();
            let token = Arc::clone(&job.token);
            match self.spawn_worker(Some(job), false) {
                Ok(()) => {
                    self.shared.counters.scheduled.fetch_add(1, Ordering::Relaxed);
                    return SubmitOutcome::Scheduled;
                }
                Err(e) => {
                    self.shared.workers.fetch_sub(1, Ordering::AcqRel);
                    warn!(key = %key, error = %e, "failed to spawn extra pre-refresh worker");
                    self.shared.finish(&key, &token);
                    self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    return SubmitOutcome::Rejected;
                }
            }
        }

        self.shared.counters.caller_runs.fetch_add(1, Ordering::Relaxed);
        debug!(key = %job.key, "pre-refresh pool saturated, running on caller thread");
        self.shared.run(job);
        SubmitOutcome::CallerRuns
    }

    /// Cancels the in-flight job for `key`. Returns `true` if one existed.
    pub fn cancel(&self, key: &str) -> bool {
        match self.shared.in_flight.lock().remove(key) {
            Some(token) => {
                token.cancelled.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Cancels every in-flight job whose key satisfies `matches`. Returns
    /// the number cancelled.
    pub fn cancel_matching(&self, matches: impl Fn(&str) -> bool) -> usize {
        let mut in_flight = self.shared.in_flight.lock();
        let mut cancelled = 0;
        in_flight.retain(|key, token| {
            if matches(key) {
                token.cancelled.store(true, Ordering::Release);
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    /// Returns `true` if a job for `key` is in flight.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.shared.in_flight.lock().contains_key(key)
    }

    /// Jobs queued or running.
    pub fn active_count(&self) -> usize {
        self.shared.in_flight.lock().len()
    }

    /// Returns `true` until [`shutdown`](Self::shutdown) is called.
    pub fn is_running(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Snapshot of the scheduler counters.
    pub fn stats(&self) -> RefreshStats {
        let c = &self.shared.counters;
        RefreshStats {
            active: self.active_count(),
            workers: self.shared.workers.load(Ordering::Acquire),
            scheduled: c.scheduled.load(Ordering::Relaxed),
            deduplicated: c.deduplicated.load(Ordering::Relaxed),
            caller_runs: c.caller_runs.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting work, waits up to the configured shutdown timeout for
    /// queued jobs to drain, then cancels whatever is left. Idempotent.
    pub fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }
        self.sender.lock().take();

        let deadline = deadline_after(self.shared.config.shutdown_timeout());
        while self.shared.workers.load(Ordering::Acquire) > 0 && deadline.map_or(true, |d| Instant::now() < d) {
            thread::sleep(Duration::from_millis(5));
        }

        let remaining = self.shared.workers.load(Ordering::Acquire);
        if remaining == 0 {
            for handle in self.handles.lock().drain(..) {
                let _ = handle.join();
            }
            info!("pre-refresh scheduler stopped");
            return;
        }

        let abandoned: Vec<Arc<JobToken>> = self.shared.in_flight.lock().drain().map(|(_, t)| t).collect();
        for token in &abandoned {
            token.cancelled.store(true, Ordering::Release);
        }
        let mut discarded = 0;
        while let Ok(job) = self.shared.receiver.try_recv() {
            self.shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            drop(job);
            discarded += 1;
        }
        warn!(
            workers = remaining,
            cancelled = abandoned.len(),
            discarded,
            "pre-refresh drain timed out, remaining jobs cancelled"
        );
        self.handles.lock().clear();
    }
}

impl Drop for PreRefreshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl CacheMetrics for PreRefreshScheduler {
    fn metrics(&self) -> BTreeMap<String, f64> {
        self.stats().to_btreemap()
    }

    fn component_name(&self) -> &'static str {
        "PreRefreshScheduler"
    }
}

impl fmt::Debug for PreRefreshScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreRefreshScheduler")
            .field("config", &self.shared.config)
            .field("active", &self.active_count())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_duplicate_submit_runs_once() {
        let scheduler = PreRefreshScheduler::new(PreRefreshConfig::default()).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = bounded::<()>(0);

        let counter = Arc::clone(&runs);
        let first = scheduler.submit("k", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = release_rx.recv();
            Ok(())
        });
        let counter = Arc::clone(&runs);
        let second = scheduler.submit("k", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(first, SubmitOutcome::Scheduled);
        assert_eq!(second, SubmitOutcome::Deduplicated);
        drop(release_tx);
        wait_until(|| scheduler.active_count() == 0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.stats().deduplicated, 1);
    }

    #[test]
    fn test_key_can_be_resubmitted_after_completion() {
        let scheduler = PreRefreshScheduler::new(PreRefreshConfig::default()).unwrap();
        assert_eq!(scheduler.submit("k", |_| Ok(())), SubmitOutcome::Scheduled);
        wait_until(|| scheduler.active_count() == 0);
        assert_eq!(scheduler.submit("k", |_| Ok(())), SubmitOutcome::Scheduled);
        wait_until(|| scheduler.stats().completed == 2);
    }

    #[test]
    fn test_saturation_runs_on_caller() {
        let config = PreRefreshConfig::new(1, 1).with_queue_capacity(1);
        let scheduler = PreRefreshScheduler::new(config).unwrap();
        let (started_tx, started_rx) = bounded::<()>(1);
        let (release_tx, release_rx) = bounded::<()>(0);

        scheduler.submit("busy", move |_| {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            Ok(())
        });
        started_rx.recv().unwrap();
        assert_eq!(scheduler.submit("queued", |_| Ok(())), SubmitOutcome::Scheduled);

        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&ran_on);
        let outcome = scheduler.submit("overflow", move |_| {
            *slot.lock() = Some(thread::current().id());
            Ok(())
        });
        assert_eq!(outcome, SubmitOutcome::CallerRuns);
        assert_eq!(*ran_on.lock(), Some(caller));

        drop(release_tx);
        wait_until(|| scheduler.active_count() == 0);
        assert_eq!(scheduler.stats().caller_runs, 1);
    }

    #[test]
    fn test_full_queue_spawns_extra_worker() {
        let config = PreRefreshConfig::new(1, 2).with_queue_capacity(1);
        let scheduler = PreRefreshScheduler::new(config).unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);

        scheduler.submit("busy", move |_| {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            Ok(())
        });
        started_rx.recv().unwrap();
        assert_eq!(scheduler.submit("queued", |_| Ok(())), SubmitOutcome::Scheduled);
        assert_eq!(scheduler.submit("extra", |_| Ok(())), SubmitOutcome::Scheduled);
        assert_eq!(scheduler.stats().workers, 2);

        drop(release_tx);
        wait_until(|| scheduler.active_count() == 0);
    }

    #[test]
    fn test_cancel_flags_running_job() {
        let scheduler = PreRefreshScheduler::new(PreRefreshConfig::default()).unwrap();
        let (started_tx, started_rx) = bounded::<()>(1);
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&saw_cancel);

        scheduler.submit("k", move |ctx| {
            let _ = started_tx.send(());
            while !ctx.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        started_rx.recv().unwrap();
        assert!(scheduler.cancel("k"));
        assert!(!scheduler.cancel("k"));
        wait_until(|| saw_cancel.load(Ordering::SeqCst));
        wait_until(|| scheduler.stats().cancelled == 1);
    }

    #[test]
    fn test_cancel_matching_by_prefix() {
        let config = PreRefreshConfig::new(1, 1).with_queue_capacity(10);
        let scheduler = PreRefreshScheduler::new(config).unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);
        scheduler.submit("other::block", move |_| {
            let _ = release_rx.recv();
            Ok(())
        });
        scheduler.submit("users::1", |_| Ok(()));
        scheduler.submit("users::2", |_| Ok(()));

        assert_eq!(scheduler.cancel_matching(|k| k.starts_with("users::")), 2);
        assert!(scheduler.is_in_flight("other::block"));
        assert!(!scheduler.is_in_flight("users::1"));

        drop(release_tx);
        wait_until(|| scheduler.active_count() == 0);
        wait_until(|| scheduler.stats().cancelled == 2);
    }

    #[test]
    fn test_failures_and_panics_release_the_key() {
        let scheduler = PreRefreshScheduler::new(PreRefreshConfig::default()).unwrap();
        scheduler.submit("err", |_| Err("boom".into()));
        scheduler.submit("panic", |_| panic!("refresh exploded"));
        wait_until(|| scheduler.stats().failed == 2);
        wait_until(|| scheduler.active_count() == 0);
        assert_eq!(scheduler.submit("err", |_| Ok(())), SubmitOutcome::Scheduled);
    }

    #[test]
    fn test_shutdown_is_idempotent_and_rejects() {
        let scheduler = PreRefreshScheduler::new(PreRefreshConfig::default()).unwrap();
        scheduler.shutdown();
        scheduler.shutdown();
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.submit("k", |_| Ok(())), SubmitOutcome::Rejected);
        assert_eq!(scheduler.stats().workers, 0);
    }

    #[test]
    fn test_shutdown_timeout_cancels_stuck_jobs() {
        let config = PreRefreshConfig::new(1, 1).with_shutdown_timeout(Duration::from_secs(0));
        let scheduler = PreRefreshScheduler::new(config).unwrap();
        let (started_tx, started_rx) = bounded::<()>(1);
        scheduler.submit("stuck", move |ctx| {
            let _ = started_tx.send(());
            while !ctx.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        });
        started_rx.recv().unwrap();
        scheduler.submit("queued", |_| Ok(()));
        scheduler.shutdown();
        assert_eq!(scheduler.active_count(), 0);
        wait_until(|| scheduler.stats().workers == 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(PreRefreshScheduler::new(PreRefreshConfig::new(3, 1)).is_err());
    }
}
