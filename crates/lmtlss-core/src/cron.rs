//! Cron Autonomics: a single-threaded cooperative `TimerWheel` driving the
//! five periodic autonomics jobs. This crate never spawns a thread or owns
//! a runtime — the host process calls [`TimerWheel::tick`] from its own
//! event loop, and each due job runs inline on the caller's stack.

use crate::archive::{ArchiveStore, Event};
use crate::config::{CapsuleConfig, CronConfig, DecayConfig};
use crate::error::{ArchiveError, LatticeError};
use crate::lattice::node::NodeStatus;
use crate::lattice::weight::{capsule_promotion, decay};
use crate::lattice::LatticeStore;
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{instrument, warn};

/// The five autonomics jobs, in the fixed order spec.md assigns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Heartbeat,
    GoalCheck,
    ScraperTick,
    Reflection,
    Maintenance,
}

impl JobKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::GoalCheck => "goal_check",
            Self::ScraperTick => "scraper_tick",
            Self::Reflection => "reflection",
            Self::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A periodic job: its cadence, last-run timestamp, and a re-entrancy guard
/// that refuses to fire while the previous tick of the same job is still
/// "running" (held open by the caller via [`JobGuard`]).
struct Job {
    kind: JobKind,
    period: chrono::Duration,
    last_run: Option<DateTime<Utc>>,
    running: AtomicBool,
}

impl Job {
    fn periodic(kind: JobKind, period_secs: u64) -> Self {
        Self {
            kind,
            period: chrono::Duration::seconds(i64::try_from(period_secs).unwrap_or(i64::MAX)),
            last_run: None,
            running: AtomicBool::new(false),
        }
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now - last >= self.period,
        }
    }
}

/// Maintenance runs once per day at a fixed wall-clock hour (UTC), not on a
/// fixed-period cadence, since it should land at a predictable quiet hour
/// regardless of when the process started.
struct DailyJob {
    kind: JobKind,
    hour_utc: u32,
    last_run_date: Option<chrono::NaiveDate>,
    running: AtomicBool,
}

impl DailyJob {
    fn new(kind: JobKind, hour_utc: u32) -> Self {
        Self {
            kind,
            hour_utc,
            last_run_date: None,
            running: AtomicBool::new(false),
        }
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        if now.hour() < self.hour_utc {
            return false;
        }
        self.last_run_date != Some(now.date_naive())
    }
}

/// RAII guard held by the caller while a job's callback runs; releases the
/// job's re-entrancy flag on drop so a job that panics or errors does not
/// wedge itself permanently.
pub struct JobGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// The due jobs for one `tick`, in fixed order: heartbeat, goal_check,
/// scraper_tick, reflection, maintenance.
pub struct DueJobs {
    kinds: Vec<JobKind>,
}

impl DueJobs {
    #[must_use]
    pub fn kinds(&self) -> &[JobKind] {
        &self.kinds
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Owns the five job descriptors and their re-entrancy guards. Holds no
/// thread, no runtime, no clock of its own — every state transition is
/// driven by an externally-supplied `now`.
pub struct TimerWheel {
    heartbeat: Job,
    goal_check: Job,
    scraper_tick: Job,
    reflection: Job,
    maintenance: DailyJob,
}

impl TimerWheel {
    #[must_use]
    pub fn new(config: &CronConfig) -> Self {
        Self {
            heartbeat: Job::periodic(JobKind::Heartbeat, config.heartbeat_secs),
            goal_check: Job::periodic(JobKind::GoalCheck, config.goal_check_secs),
            scraper_tick: Job::periodic(JobKind::ScraperTick, config.scraper_secs),
            reflection: Job::periodic(JobKind::Reflection, config.reflection_secs),
            maintenance: DailyJob::new(JobKind::Maintenance, config.daily_maintenance_hour_utc),
        }
    }

    /// Report which jobs are due at `now`, skipping any job whose previous
    /// tick is still marked running.
    #[must_use]
    pub fn due(&self, now: DateTime<Utc>) -> DueJobs {
        let mut kinds = Vec::with_capacity(5);
        for job in [&self.heartbeat, &self.goal_check, &self.scraper_tick, &self.reflection] {
            if job.is_due(now) && !job.running.load(Ordering::SeqCst) {
                kinds.push(job.kind);
            }
        }
        if self.maintenance.is_due(now) && !self.maintenance.running.load(Ordering::SeqCst) {
            kinds.push(self.maintenance.kind);
        }
        DueJobs { kinds }
    }

    /// Mark `kind` as running, returning a guard the caller holds for the
    /// duration of the job's callback. Returns `None` if the job is already
    /// running (the caller asked for a guard it should not have — a bug in
    /// the caller's loop, not a recoverable condition, so it is surfaced as
    /// `None` rather than silently double-firing).
    pub fn begin(&self, kind: JobKind) -> Option<JobGuard<'_>> {
        let flag = self.flag_for(kind);
        if flag.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(JobGuard { flag })
    }

    /// Record that `kind` completed at `now`, advancing its cadence clock.
    pub fn complete(&mut self, kind: JobKind, now: DateTime<Utc>) {
        match kind {
            JobKind::Heartbeat => self.heartbeat.last_run = Some(now),
            JobKind::GoalCheck => self.goal_check.last_run = Some(now),
            JobKind::ScraperTick => self.scraper_tick.last_run = Some(now),
            JobKind::Reflection => self.reflection.last_run = Some(now),
            JobKind::Maintenance => self.maintenance.last_run_date = Some(now.date_naive()),
        }
    }

    fn flag_for(&self, kind: JobKind) -> &AtomicBool {
        match kind {
            JobKind::Heartbeat => &self.heartbeat.running,
            JobKind::GoalCheck => &self.goal_check.running,
            JobKind::ScraperTick => &self.scraper_tick.running,
            JobKind::Reflection => &self.reflection.running,
            JobKind::Maintenance => &self.maintenance.running,
        }
    }

    /// Drive one tick: for every job due at `now` that is not already
    /// running, acquire its guard, invoke `callback`, record completion,
    /// and release the guard — whether or not `callback` returned an error.
    /// A callback error is logged via `tracing::warn!` and does not stop
    /// the other due jobs in this tick, matching the autonomics cadence's
    /// best-effort nature (spec.md §5).
    #[instrument(skip(self, callback))]
    pub fn tick<E: std::fmt::Display>(
        &mut self,
        now: DateTime<Utc>,
        mut callback: impl FnMut(JobKind, DateTime<Utc>) -> Result<(), E>,
    ) -> Vec<JobKind> {
        let due = self.due(now);
        let mut ran = Vec::with_capacity(due.kinds().len());
        for kind in due.kinds() {
            let kind = *kind;
            let Some(guard) = self.begin(kind) else {
                continue;
            };
            if let Err(err) = callback(kind, now) {
                warn!(job = %kind, error = %err, "autonomics job failed");
            }
            drop(guard);
            self.complete(kind, now);
            ran.push(kind);
        }
        ran
    }
}

/// Parse `"HH:MM"` into an hour-of-day in `[0, 23]`, used when the daily
/// maintenance hour is configured as a wall-clock string rather than a bare
/// integer. Not currently wired into [`CronConfig`] (which stores the hour
/// directly as `u32`) but kept for collaborators that surface the config as
/// a time-of-day string in their own UI layer.
#[must_use]
pub fn parse_hour_utc(raw: &str) -> Option<u32> {
    let time = NaiveTime::parse_from_str(raw, "%H:%M").ok()?;
    Some(time.hour())
}

/// Append the `heartbeat` event: the built-in action of the Heartbeat job
/// (spec.md §4.K). Callers invoke this from their `TimerWheel::tick`
/// callback when `kind == JobKind::Heartbeat`.
///
/// # Errors
///
/// Returns an [`ArchiveError`] if the append fails.
pub fn record_heartbeat(archive: &mut ArchiveStore, agent_id: &str, now: DateTime<Utc>) -> Result<Event, ArchiveError> {
    archive.append_event(
        None,
        now,
        &crate::id::new_session_key(agent_id),
        "heartbeat",
        agent_id,
        None,
        None,
        None,
        json!({}),
    )
}

#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Lattice(#[from] LatticeError),
}

/// Outcome of one [`run_maintenance`] call.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub promoted_node_ids: Vec<String>,
    pub decayed_node_count: usize,
    pub capsule: String,
}

/// The built-in action of the daily Maintenance job (spec.md §4.K): promote
/// every provisional node whose weight now satisfies
/// [`capsule_promotion`](crate::lattice::weight::capsule_promotion), apply
/// global decay to every remaining active node, run `optimize()` on both
/// stores, and regenerate the Capsule (optionally persisting it to
/// `capsule_path`).
///
/// # Errors
///
/// Returns a [`MaintenanceError`] if either store fails.
#[instrument(skip(archive, lattice, decay_config, capsule_config, capsule_path))]
pub fn run_maintenance(
    archive: &mut ArchiveStore,
    lattice: &LatticeStore,
    decay_config: &DecayConfig,
    capsule_config: &CapsuleConfig,
    now: DateTime<Utc>,
    capsule_path: Option<&Path>,
) -> Result<MaintenanceReport, MaintenanceError> {
    let mut promoted_node_ids = Vec::new();
    for node in lattice.get_nodes_by_status(NodeStatus::Provisional)? {
        if capsule_promotion(node.weight) {
            lattice.update_status(&node.node_id, NodeStatus::Active, now)?;
            promoted_node_ids.push(node.node_id);
        }
    }

    let mut decayed_node_count = 0usize;
    for node in lattice.get_nodes_by_status(NodeStatus::Active)? {
        let updated_at = DateTime::parse_from_rfc3339(&node.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);
        #[allow(clippy::cast_precision_loss)]
        let dt_hours = (now - updated_at).num_seconds().max(0) as f64 / 3600.0;
        if dt_hours <= 0.0 {
            continue;
        }
        let decayed = decay(node.weight, dt_hours, decay_config.lambda_salience, decay_config.lambda_arousal);
        lattice.update_node_weight(&node.node_id, decayed, now)?;
        decayed_node_count += 1;
    }

    archive.optimize()?;
    lattice.optimize()?;

    let capsule = crate::capsule::build_capsule(lattice, capsule_config, now)?;
    if let Some(path) = capsule_path {
        std::fs::write(path, &capsule).map_err(|e| MaintenanceError::Archive(ArchiveError::WriteFailed {
            reason: e.to_string(),
        }))?;
    }

    Ok(MaintenanceReport {
        promoted_node_ids,
        decayed_node_count,
        capsule,
    })
}
