//! Recurring organization runs.
//!
//! The [`Scheduler`] keeps an ordered list of [`ScheduleTrigger`]s (fixed
//! intervals and daily times of day) and polls them from a single loop. It
//! runs once right away, then sleeps in short ticks and fires every trigger
//! whose next-due time has passed. A failed or crashed run is logged and the
//! loop keeps going; only a [`StopHandle`] ends it.

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;
use crate::file_organizer::{OrganizerEngine, RunSummary};
use chrono::{DateTime, Days, Local, NaiveTime, TimeDelta, TimeZone};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Longest accepted interval between two runs.
const MAX_INTERVAL: Duration = Duration::from_secs(3650 * 24 * 3600);

/// Default pause between two checks of the trigger list.
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

/// Default pause after a run that crashed.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(300);

/// When a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Every `Duration`, counted from the end of the previous run.
    Interval(Duration),
    /// Once a day at a wall-clock time.
    DailyAt(NaiveTime),
}

impl TriggerKind {
    /// Computes the next due time after `now`.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        match self {
            TriggerKind::Interval(interval) => {
                let delta = TimeDelta::from_std(*interval).unwrap_or(TimeDelta::days(3650));
                now.clone() + delta
            }
            TriggerKind::DailyAt(at) => next_daily_occurrence(now, *at),
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Interval(interval) => {
                let secs = interval.as_secs();
                if secs % 3600 == 0 {
                    write!(f, "every {} h", secs / 3600)
                } else if secs % 60 == 0 {
                    write!(f, "every {} min", secs / 60)
                } else {
                    write!(f, "every {:?}", interval)
                }
            }
            TriggerKind::DailyAt(at) => write!(f, "daily at {}", at.format("%H:%M")),
        }
    }
}

/// Returns the first occurrence of `at` strictly after `now`.
///
/// A time that has already passed today rolls over to tomorrow. Days on which
/// `at` does not exist locally (DST gaps) are skipped.
pub fn next_daily_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut date = now.date_naive();
    for _ in 0..8 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest()
            && candidate > *now
        {
            return candidate;
        }
        match date.checked_add_days(Days::new(1)) {
            Some(next) => date = next,
            None => break,
        }
    }
    now.clone() + TimeDelta::days(1)
}

/// Parses a `HH:MM` time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ScheduleError::InvalidTime(value.to_string()))
}

/// A scheduling rule with its firing bookkeeping.
#[derive(Debug, Clone)]
pub struct ScheduleTrigger {
    kind: TriggerKind,
    last_fired: Option<DateTime<Local>>,
    next_due: DateTime<Local>,
}

impl ScheduleTrigger {
    /// A trigger firing every `interval`.
    pub fn every(interval: Duration, now: DateTime<Local>) -> Result<Self, ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }
        if interval > MAX_INTERVAL {
            return Err(ScheduleError::IntervalOutOfRange(interval));
        }
        Ok(Self::new(TriggerKind::Interval(interval), now))
    }

    /// A trigger firing every day at `at`.
    pub fn daily_at(at: NaiveTime, now: DateTime<Local>) -> Self {
        Self::new(TriggerKind::DailyAt(at), now)
    }

    fn new(kind: TriggerKind, now: DateTime<Local>) -> Self {
        Self {
            kind,
            last_fired: None,
            next_due: kind.next_after(&now),
        }
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    pub fn last_fired(&self) -> Option<DateTime<Local>> {
        self.last_fired
    }

    pub fn next_due(&self) -> DateTime<Local> {
        self.next_due
    }

    pub fn is_due(&self, now: &DateTime<Local>) -> bool {
        *now >= self.next_due
    }

    /// Records a firing that completed at `now` and computes the next due time.
    pub fn mark_fired(&mut self, now: DateTime<Local>) {
        self.last_fired = Some(now);
        self.next_due = self.kind.next_after(&now);
    }

    /// Recomputes the next due time from `now` without recording a firing.
    pub fn reschedule(&mut self, now: DateTime<Local>) {
        self.next_due = self.kind.next_after(&now);
    }
}

/// Anything the scheduler can fire against a directory.
pub trait Organizer: Send + Sync {
    fn organize(&self, directory: &Path) -> RunSummary;
}

impl Organizer for OrganizerEngine {
    fn organize(&self, directory: &Path) -> RunSummary {
        OrganizerEngine::organize(self, directory)
    }
}

/// Lifecycle of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not started yet.
    Idle,
    /// Sleeping until the next tick.
    Waiting,
    /// Running an organization pass.
    Firing,
    /// Stopped for good.
    Stopped,
}

/// Counters accumulated by [`Scheduler::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Runs started, including the initial one.
    pub runs: usize,
    /// Runs that could not start (e.g. the directory is missing).
    pub fatal_runs: usize,
    /// Runs that crashed.
    pub panicked_runs: usize,
    /// Files moved across all runs.
    pub files_moved: usize,
    /// Files that failed to move across all runs.
    pub files_failed: usize,
}

/// Cloneable stop signal for a running scheduler.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the scheduler to stop. A run in progress finishes first.
    pub fn stop(&self) {
        let (stopped, wakeup) = &*self.inner;
        *stopped.lock().unwrap_or_else(|p| p.into_inner()) = true;
        wakeup.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleeps for up to `timeout`, waking early on [`stop`](Self::stop).
    /// Returns true if the handle is stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (stopped, wakeup) = &*self.inner;
        let guard = stopped.lock().unwrap_or_else(|p| p.into_inner());
        let (guard, _) = wakeup
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(|p| p.into_inner());
        *guard
    }
}

/// Runs organization passes on a schedule.
pub struct Scheduler<E: Organizer = OrganizerEngine> {
    engine: Arc<E>,
    directory: PathBuf,
    triggers: Vec<ScheduleTrigger>,
    tick: Duration,
    backoff: Duration,
    state: SchedulerState,
    stop: StopHandle,
}

impl<E: Organizer> Scheduler<E> {
    /// Creates a scheduler for `directory` with no triggers.
    pub fn new(engine: Arc<E>, directory: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            directory: directory.into(),
            triggers: Vec::new(),
            tick: DEFAULT_TICK,
            backoff: DEFAULT_BACKOFF,
            state: SchedulerState::Idle,
            stop: StopHandle::new(),
        }
    }

    /// Creates a scheduler with the triggers, tick and backoff of `config`.
    pub fn from_config(
        engine: Arc<E>,
        directory: impl Into<PathBuf>,
        config: &ScheduleConfig,
    ) -> Result<Self, ScheduleError> {
        let now = Local::now();
        let mut scheduler = Self::new(engine, directory)
            .with_tick(config.tick())
            .with_backoff(config.backoff());
        if let Some(interval) = config.interval() {
            scheduler.add_trigger(ScheduleTrigger::every(interval, now)?);
        }
        for time in &config.daily_at {
            scheduler.add_trigger(ScheduleTrigger::daily_at(parse_time_of_day(time)?, now));
        }
        Ok(scheduler)
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn add_trigger(&mut self, trigger: ScheduleTrigger) {
        self.triggers.push(trigger);
    }

    pub fn triggers(&self) -> &[ScheduleTrigger] {
        &self.triggers
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Returns a handle that stops [`run`](Self::run) from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs until the stop handle fires.
    ///
    /// Fires once immediately, then polls the triggers every tick.
    pub fn run(&mut self) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        tracing::info!(
            directory = %self.directory.display(),
            triggers = self.triggers.len(),
            "Scheduler started"
        );

        let now = Local::now();
        for trigger in &mut self.triggers {
            trigger.reschedule(now);
        }

        self.fire("startup", &mut stats);

        while !self.stop.is_stopped() {
            self.state = SchedulerState::Waiting;
            if self.stop.wait_timeout(self.tick) {
                break;
            }

            let now = Local::now();
            for index in 0..self.triggers.len() {
                if self.stop.is_stopped() {
                    break;
                }
                if !self.triggers[index].is_due(&now) {
                    continue;
                }
                let label = self.triggers[index].kind().to_string();
                self.fire(&label, &mut stats);
                let trigger = &mut self.triggers[index];
                trigger.mark_fired(Local::now());
                tracing::debug!(
                    trigger = %label,
                    next_due = %trigger.next_due().format("%Y-%m-%d %H:%M:%S"),
                    "Trigger rescheduled"
                );
            }
        }

        self.state = SchedulerState::Stopped;
        tracing::info!(
            runs = stats.runs,
            fatal_runs = stats.fatal_runs,
            panicked_runs = stats.panicked_runs,
            "Scheduler stopped"
        );
        stats
    }

    /// Runs one organization pass, isolating its failures from the loop.
    fn fire(&mut self, trigger: &str, stats: &mut SchedulerStats) {
        self.state = SchedulerState::Firing;
        stats.runs += 1;
        tracing::info!(
            directory = %self.directory.display(),
            trigger,
            "Starting scheduled organization"
        );

        let engine = Arc::clone(&self.engine);
        let directory = self.directory.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| engine.organize(&directory))) {
            Ok(summary) if summary.is_fatal() => {
                stats.fatal_runs += 1;
                tracing::error!(
                    directory = %self.directory.display(),
                    error = summary.fatal_error.as_deref().unwrap_or_default(),
                    "Scheduled organization failed"
                );
            }
            Ok(summary) => {
                stats.files_moved += summary.moved;
                stats.files_failed += summary.failed;
                tracing::info!(
                    moved = summary.moved,
                    failed = summary.failed,
                    "Scheduled organization completed"
                );
            }
            Err(payload) => {
                stats.panicked_runs += 1;
                tracing::error!(
                    directory = %self.directory.display(),
                    error = %panic_message(payload.as_ref()),
                    backoff_secs = self.backoff.as_secs(),
                    "Scheduled organization crashed, backing off"
                );
                self.stop.wait_timeout(self.backoff);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompiledFilters;
    use crate::file_category::CategoryRegistry;
    use chrono::{NaiveDate, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::TempDir;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .expect("valid test date")
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("valid test time")
    }

    fn engine() -> Arc<OrganizerEngine> {
        Arc::new(OrganizerEngine::new(
            Arc::new(CategoryRegistry::new()),
            CompiledFilters::default(),
        ))
    }

    /// Stops `handle` after `delay` from a helper thread.
    fn stop_after(handle: StopHandle, delay: Duration) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            thread::sleep(delay);
            handle.stop();
        })
    }

    #[test]
    fn test_daily_time_already_passed_is_due_tomorrow() {
        let now = utc(2024, 3, 10, 9, 30);
        let next = next_daily_occurrence(&now, time(2, 0));
        assert_eq!(next, utc(2024, 3, 11, 2, 0));
    }

    #[test]
    fn test_daily_time_later_today_is_due_today() {
        let now = utc(2024, 3, 10, 1, 15);
        let next = next_daily_occurrence(&now, time(2, 0));
        assert_eq!(next, utc(2024, 3, 10, 2, 0));
    }

    #[test]
    fn test_daily_time_equal_to_now_rolls_over() {
        let now = utc(2024, 12, 31, 2, 0);
        let next = next_daily_occurrence(&now, time(2, 0));
        assert_eq!(next, utc(2025, 1, 1, 2, 0));
    }

    #[test]
    fn test_interval_next_due() {
        let now = utc(2024, 3, 10, 23, 0);
        let kind = TriggerKind::Interval(Duration::from_secs(2 * 3600));
        assert_eq!(kind.next_after(&now), utc(2024, 3, 11, 1, 0));
    }

    #[test]
    fn test_trigger_validation() {
        assert_eq!(
            ScheduleTrigger::every(Duration::ZERO, Local::now()).err(),
            Some(ScheduleError::ZeroInterval)
        );
        assert!(matches!(
            ScheduleTrigger::every(Duration::from_secs(u64::MAX), Local::now()),
            Err(ScheduleError::IntervalOutOfRange(_))
        ));
        assert_eq!(parse_time_of_day("02:00"), Ok(time(2, 0)));
        assert_eq!(parse_time_of_day(" 14:30 "), Ok(time(14, 30)));
        assert!(matches!(
            parse_time_of_day("25:00"),
            Err(ScheduleError::InvalidTime(_))
        ));
        assert!(parse_time_of_day("noon").is_err());
    }

    #[test]
    fn test_mark_fired_recomputes_next_due() {
        let now = Local::now();
        let mut trigger =
            ScheduleTrigger::every(Duration::from_secs(3600), now).expect("valid interval");
        assert!(!trigger.is_due(&now));
        assert!(trigger.last_fired().is_none());

        let later = now + TimeDelta::hours(2);
        assert!(trigger.is_due(&later));
        trigger.mark_fired(later);
        assert_eq!(trigger.last_fired(), Some(later));
        assert_eq!(trigger.next_due(), later + TimeDelta::hours(1));
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(
            TriggerKind::Interval(Duration::from_secs(24 * 3600)).to_string(),
            "every 24 h"
        );
        assert_eq!(
            TriggerKind::Interval(Duration::from_secs(90)).to_string(),
            "every 90s"
        );
        assert_eq!(TriggerKind::DailyAt(time(2, 0)).to_string(), "daily at 02:00");
    }

    #[test]
    fn test_from_config_builds_triggers() {
        let config = ScheduleConfig {
            interval_hours: 6,
            daily_at: vec!["02:00".to_string(), "18:45".to_string()],
            tick_seconds: 1,
            backoff_seconds: 1,
        };
        let scheduler =
            Scheduler::from_config(engine(), "/tmp", &config).expect("valid schedule config");

        let kinds: Vec<_> = scheduler.triggers().iter().map(|t| t.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                TriggerKind::Interval(Duration::from_secs(6 * 3600)),
                TriggerKind::DailyAt(time(2, 0)),
                TriggerKind::DailyAt(time(18, 45)),
            ]
        );
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_from_config_rejects_bad_time() {
        let config = ScheduleConfig {
            daily_at: vec!["2am".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            Scheduler::from_config(engine(), "/tmp", &config),
            Err(ScheduleError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_runs_immediately_on_start() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs_write(temp_dir.path(), "photo.jpg");

        let mut scheduler = Scheduler::new(engine(), temp_dir.path());
        scheduler.stop_handle().stop();
        let stats = scheduler.run();

        assert_eq!(stats.runs, 1);
        assert_eq!(stats.files_moved, 1);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(temp_dir.path().join("Imagenes/photo.jpg").is_file());
    }

    #[test]
    fn test_interval_trigger_fires_repeatedly() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut scheduler =
            Scheduler::new(engine(), temp_dir.path()).with_tick(Duration::from_millis(5));
        scheduler.add_trigger(
            ScheduleTrigger::every(Duration::from_millis(20), Local::now())
                .expect("valid interval"),
        );

        let stopper = stop_after(scheduler.stop_handle(), Duration::from_millis(300));
        let stats = scheduler.run();
        stopper.join().expect("stopper thread panicked");

        assert!(stats.runs >= 3, "expected repeated runs, got {:?}", stats);
        assert_eq!(stats.fatal_runs, 0);
    }

    #[test]
    fn test_missing_directory_does_not_stop_scheduler() {
        let mut scheduler = Scheduler::new(engine(), "/non/existent/path")
            .with_tick(Duration::from_millis(5));
        scheduler.add_trigger(
            ScheduleTrigger::every(Duration::from_millis(20), Local::now())
                .expect("valid interval"),
        );

        let stopper = stop_after(scheduler.stop_handle(), Duration::from_millis(300));
        let stats = scheduler.run();
        stopper.join().expect("stopper thread panicked");

        assert!(stats.runs >= 2, "expected repeated runs, got {:?}", stats);
        assert_eq!(stats.fatal_runs, stats.runs);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    struct FlakyOrganizer {
        calls: AtomicUsize,
    }

    impl Organizer for FlakyOrganizer {
        fn organize(&self, directory: &Path) -> RunSummary {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("simulated crash");
            }
            RunSummary::new(directory, false)
        }
    }

    #[test]
    fn test_crashed_run_backs_off_and_continues() {
        let organizer = Arc::new(FlakyOrganizer {
            calls: AtomicUsize::new(0),
        });
        let mut scheduler = Scheduler::new(Arc::clone(&organizer), "/unused")
            .with_tick(Duration::from_millis(5))
            .with_backoff(Duration::from_millis(10));
        scheduler.add_trigger(
            ScheduleTrigger::every(Duration::from_millis(20), Local::now())
                .expect("valid interval"),
        );

        let stopper = stop_after(scheduler.stop_handle(), Duration::from_millis(300));
        let stats = scheduler.run();
        stopper.join().expect("stopper thread panicked");

        assert_eq!(stats.panicked_runs, 1);
        assert!(stats.runs >= 2, "expected the loop to keep going, got {:?}", stats);
        assert!(organizer.calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_stop_wakes_waiting_scheduler() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut scheduler =
            Scheduler::new(engine(), temp_dir.path()).with_tick(Duration::from_secs(3600));

        let stopper = stop_after(scheduler.stop_handle(), Duration::from_millis(50));
        let started = std::time::Instant::now();
        let stats = scheduler.run();
        stopper.join().expect("stopper thread panicked");

        assert_eq!(stats.runs, 1);
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn test_stop_handle_wait_timeout() {
        let handle = StopHandle::new();
        assert!(!handle.wait_timeout(Duration::from_millis(1)));
        handle.clone().stop();
        assert!(handle.is_stopped());
        assert!(handle.wait_timeout(Duration::from_secs(3600)));
    }

    fn fs_write(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), name).expect("Failed to write test file");
    }
}
