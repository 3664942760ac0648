//! Poll task scheduling
//!
//! One [`PollScheduler`] per device owns a tokio task for each enabled
//! [`PollKind`]. A task sleeps for its interval, or until it is triggered,
//! and then runs one poll. Every run is followed by a full interval, so a
//! triggered run resets the window instead of shifting the old schedule.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adcp_api::{CommandExecutor, PowerState};
use adcp_state::DeviceCache;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PollerConfig;
use crate::error::{PollerError, PollerResult};
use crate::poll::{self, PollKind, PollReport};

// ============================================================================
// PollingTask - one periodic poll
// ============================================================================

#[derive(Debug, Default)]
struct TaskCounters {
    polls: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
    triggered: AtomicU64,
}

impl TaskCounters {
    fn record(&self, report: &PollReport) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(report.errors as u64, Ordering::Relaxed);
        if report.skipped {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug)]
struct PollingTask {
    kind: PollKind,
    interval: Duration,
    trigger: Arc<Notify>,
    counters: Arc<TaskCounters>,
    started_at: Instant,
    task_handle: JoinHandle<()>,
}

impl PollingTask {
    fn start(shared: Arc<Shared>, kind: PollKind, interval: Duration) -> Self {
        let trigger = Arc::new(Notify::new());
        let counters = Arc::new(TaskCounters::default());

        let task_trigger = Arc::clone(&trigger);
        let task_counters = Arc::clone(&counters);
        let task_handle = tokio::spawn(async move {
            Self::polling_loop(shared, kind, interval, task_trigger, task_counters).await;
        });

        Self {
            kind,
            interval,
            trigger,
            counters,
            started_at: Instant::now(),
            task_handle,
        }
    }

    async fn polling_loop(
        shared: Arc<Shared>,
        kind: PollKind,
        interval: Duration,
        trigger: Arc<Notify>,
        counters: Arc<TaskCounters>,
    ) {
        debug!(device = %shared.cache.id(), %kind, ?interval, "poll task started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = trigger.notified() => {
                    counters.triggered.fetch_add(1, Ordering::Relaxed);
                    debug!(device = %shared.cache.id(), %kind, "triggered poll");
                }
            }

            let report = shared.run(kind).await;
            counters.record(&report);
        }
    }

    fn stats(&self) -> PollingTaskStats {
        PollingTaskStats {
            kind: self.kind,
            interval: self.interval,
            uptime: self.started_at.elapsed(),
            poll_count: self.counters.polls.load(Ordering::Relaxed),
            error_count: self.counters.errors.load(Ordering::Relaxed),
            skipped_count: self.counters.skipped.load(Ordering::Relaxed),
            triggered_count: self.counters.triggered.load(Ordering::Relaxed),
            is_running: !self.task_handle.is_finished(),
        }
    }
}

/// Statistics for a poll task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingTaskStats {
    pub kind: PollKind,
    pub interval: Duration,
    pub uptime: Duration,
    pub poll_count: u64,
    pub error_count: u64,
    pub skipped_count: u64,
    pub triggered_count: u64,
    pub is_running: bool,
}

// ============================================================================
// PollScheduler - all poll tasks of a device
// ============================================================================

struct Shared {
    executor: Arc<dyn CommandExecutor>,
    cache: DeviceCache,
    config: PollerConfig,
    tasks: Mutex<HashMap<PollKind, PollingTask>>,
    /// Single runs of disabled kinds
    oneshots: Mutex<Vec<JoinHandle<()>>>,
    suspended: AtomicBool,
}

impl Shared {
    /// Run one poll and react to a power flip it observed
    async fn run(self: &Arc<Self>, kind: PollKind) -> PollReport {
        if !self.cache.is_attached() {
            debug!(device = %self.cache.id(), %kind, "device removed, skipping poll");
            return PollReport::default();
        }
        let report = poll::poll(kind, self.executor.as_ref(), &self.cache).await;
        if report.errors > 0 {
            debug!(device = %self.cache.id(), %kind, errors = report.errors, "poll finished with errors");
        }
        if let Some((_, after)) = report.power_transition {
            self.trigger(PollKind::Health);
            // Settings only answer while the projector is on
            if after == PowerState::On {
                self.trigger(PollKind::Options);
            }
        }
        report
    }

    fn trigger(self: &Arc<Self>, kind: PollKind) {
        if self.suspended.load(Ordering::Relaxed) {
            debug!(device = %self.cache.id(), %kind, "scheduler suspended, ignoring trigger");
            return;
        }

        if let Some(task) = self.tasks.lock().get(&kind) {
            task.trigger.notify_one();
            return;
        }

        // Disabled kinds still run on demand. The flag is read again under the
        // lock so a concurrent shutdown either sees this run or prevents it.
        let mut oneshots = self.oneshots.lock();
        if self.suspended.load(Ordering::Relaxed) {
            return;
        }
        oneshots.retain(|handle| !handle.is_finished());
        let shared = Arc::clone(self);
        oneshots.push(tokio::spawn(async move {
            shared.run(kind).await;
        }));
    }

    fn spawn_tasks(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        for kind in PollKind::ALL {
            let interval = self.config.interval(kind);
            if interval.is_zero() || tasks.contains_key(&kind) {
                continue;
            }
            tasks.insert(kind, PollingTask::start(Arc::clone(self), kind, interval));
        }
    }

    fn abort_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut handles: Vec<_> = self
            .tasks
            .lock()
            .drain()
            .map(|(_, task)| task.task_handle)
            .collect();
        handles.append(&mut self.oneshots.lock());
        for handle in &handles {
            handle.abort();
        }
        handles
    }
}

/// Schedules the poll tasks of one device
///
/// # Example
///
/// ```rust,ignore
/// let scheduler = PollScheduler::new(session, cache.device(&id), PollerConfig::default())?;
/// scheduler.start();
///
/// // After a power command
/// scheduler.power_changed();
/// ```
pub struct PollScheduler {
    shared: Arc<Shared>,
    created_at: Instant,
}

impl PollScheduler {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        cache: DeviceCache,
        config: PollerConfig,
    ) -> PollerResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                executor,
                cache,
                config,
                tasks: Mutex::new(HashMap::new()),
                oneshots: Mutex::new(Vec::new()),
                suspended: AtomicBool::new(false),
            }),
            created_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &PollerConfig {
        &self.shared.config
    }

    /// Spawn a task for every kind with a non-zero interval
    ///
    /// Tasks that are already running are kept. The first run of a new task
    /// happens one full interval from now.
    pub fn start(&self) {
        self.shared.suspended.store(false, Ordering::Relaxed);
        self.shared.spawn_tasks();
        info!(
            device = %self.shared.cache.id(),
            tasks = self.active_kinds().len(),
            "polling started"
        );
    }

    /// Stop all tasks, single runs included; triggers are ignored until
    /// [`resume`](Self::resume)
    pub fn suspend(&self) {
        self.shared.suspended.store(true, Ordering::Relaxed);
        let aborted = self.shared.abort_tasks();
        debug!(device = %self.shared.cache.id(), tasks = aborted.len(), "polling suspended");
    }

    /// Recreate the tasks from a fresh tick; missed runs are not replayed
    pub fn resume(&self) {
        self.start();
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.suspended.load(Ordering::Relaxed)
    }

    /// Run `kind` out of cycle
    ///
    /// A running task polls right away and then waits a full interval. For a
    /// disabled kind a single run is spawned.
    pub fn trigger(&self, kind: PollKind) {
        self.shared.trigger(kind);
    }

    /// Report a power on/off transition caused outside the poller
    pub fn power_changed(&self) {
        self.trigger(PollKind::Health);
        self.trigger(PollKind::Attributes);
    }

    /// Run one poll of `kind` inline and wait for it
    pub async fn poll_now(&self, kind: PollKind) -> PollReport {
        self.shared.run(kind).await
    }

    /// Capability probe of the attributes that need one
    pub async fn probe(&self) -> PollReport {
        poll::probe(self.shared.executor.as_ref(), &self.shared.cache).await
    }

    pub async fn read_identity(&self) -> PollReport {
        poll::read_identity(self.shared.executor.as_ref(), &self.shared.cache).await
    }

    /// Query everything once, regardless of power state
    pub async fn refresh(&self) -> PollReport {
        poll::refresh(self.shared.executor.as_ref(), &self.shared.cache).await
    }

    pub fn is_polling(&self, kind: PollKind) -> bool {
        self.shared.tasks.lock().contains_key(&kind)
    }

    pub fn active_kinds(&self) -> Vec<PollKind> {
        let mut kinds: Vec<_> = self.shared.tasks.lock().keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut task_stats: Vec<_> = self
            .shared
            .tasks
            .lock()
            .values()
            .map(PollingTask::stats)
            .collect();
        task_stats.sort_by_key(|stats| stats.kind);

        SchedulerStats {
            device: self.shared.cache.id().to_string(),
            suspended: self.is_suspended(),
            uptime: self.created_at.elapsed(),
            task_stats,
        }
    }

    /// Stop all tasks and single runs, and wait for them to finish
    pub async fn shutdown(&self) -> PollerResult<()> {
        self.shared.suspended.store(true, Ordering::Relaxed);
        for handle in self.shared.abort_tasks() {
            match handle.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    warn!(device = %self.shared.cache.id(), error = %err, "poll task failed");
                    return Err(PollerError::TaskJoin(err.to_string()));
                }
            }
        }
        debug!(device = %self.shared.cache.id(), "polling shut down");
        Ok(())
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        // Tasks hold the shared state, abort them so it can be freed
        self.shared.suspended.store(true, Ordering::Relaxed);
        self.shared.abort_tasks();
    }
}

impl fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollScheduler")
            .field("device", self.shared.cache.id())
            .field("config", &self.shared.config)
            .field("active", &self.active_kinds())
            .finish()
    }
}

/// Statistics for the poll scheduler of one device
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub device: String,
    pub suspended: bool,
    pub uptime: Duration,
    pub task_stats: Vec<PollingTaskStats>,
}

impl SchedulerStats {
    pub fn total_polls(&self) -> u64 {
        self.task_stats.iter().map(|s| s.poll_count).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.task_stats.iter().map(|s| s.error_count).sum()
    }
}

impl fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Poll Scheduler Stats for {}:", self.device)?;
        writeln!(f, "  Active tasks: {}", self.task_stats.len())?;
        writeln!(f, "  Suspended: {}", self.suspended)?;
        writeln!(f, "  Uptime: {:?}", self.uptime)?;
        writeln!(f, "  Polls: {} ({} errors)", self.total_polls(), self.total_errors())?;

        if !self.task_stats.is_empty() {
            writeln!(f, "  Task details:")?;
            for stat in &self.task_stats {
                writeln!(
                    f,
                    "    {}: interval {:?}, polls: {}, errors: {}, skipped: {}, triggered: {}",
                    stat.kind,
                    stat.interval,
                    stat.poll_count,
                    stat.error_count,
                    stat.skipped_count,
                    stat.triggered_count
                )?;
            }
        }

        Ok(())
    }
}
