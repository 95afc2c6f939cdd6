//! Sweep: periodic self-healing scan over a trailing time window.
//!
//! `scan` is the body shared by the scheduler and the BatchFixer. It never
//! stops on a per-record failure: every candidate ends up counted in
//! exactly one bucket of the `SweepSummary`.
//!
//! SweepScheduler: Idle → Scanning → Idle, one scan at a time. A stop
//! signal is only observed between ticks; the scan in flight finishes
//! first.

use crate::{
    corrector::{Correction, CorrectionReason, Corrector},
    error::{ReconError, ReconResult},
    types::{short_id, Application},
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    NotApplicable,
    AlreadyCorrect,
    Corrected,
    SourceNotReady,
    LookupFailed,
    WriteFailed,
    /// Explicit id that does not exist.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub application_id: String,
    pub kind: OutcomeKind,
    pub correction: Option<Correction>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub window_start: Option<DateTime<Utc>>,
    pub candidates: usize,
    pub applicable: usize,
    pub not_applicable: usize,
    pub already_correct: usize,
    pub corrected: usize,
    pub source_not_ready: usize,
    pub lookup_failed: usize,
    pub write_failed: usize,
    pub missing: usize,
    pub outcomes: Vec<RecordOutcome>,
}

impl SweepSummary {
    pub fn failed(&self) -> usize {
        self.lookup_failed + self.write_failed
    }

    fn record_correction(&mut self, correction: Correction) {
        let kind = match correction.reason {
            CorrectionReason::NotApplicable => OutcomeKind::NotApplicable,
            CorrectionReason::SourceNotReady => OutcomeKind::SourceNotReady,
            CorrectionReason::AlreadyCorrect | CorrectionReason::ConcurrentlyCorrected => {
                OutcomeKind::AlreadyCorrect
            }
            CorrectionReason::Corrected => OutcomeKind::Corrected,
        };
        self.bump(kind);
        self.outcomes.push(RecordOutcome {
            application_id: correction.application_id.clone(),
            kind,
            correction: Some(correction),
            error: None,
        });
    }

    fn record_error(&mut self, application_id: &str, err: &ReconError) {
        let kind = match err {
            ReconError::Write { .. } => OutcomeKind::WriteFailed,
            ReconError::ApplicationNotFound { .. } => OutcomeKind::Missing,
            _ => OutcomeKind::LookupFailed,
        };
        log::warn!("sweep: {} {kind:?}: {err}", short_id(application_id));
        self.bump(kind);
        self.outcomes.push(RecordOutcome {
            application_id: application_id.to_string(),
            kind,
            correction: None,
            error: Some(err.to_string()),
        });
    }

    fn bump(&mut self, kind: OutcomeKind) {
        self.candidates += 1;
        match kind {
            OutcomeKind::NotApplicable => self.not_applicable += 1,
            OutcomeKind::Missing => self.missing += 1,
            OutcomeKind::AlreadyCorrect => {
                self.applicable += 1;
                self.already_correct += 1;
            }
            OutcomeKind::Corrected => {
                self.applicable += 1;
                self.corrected += 1;
            }
            OutcomeKind::SourceNotReady => {
                self.applicable += 1;
                self.source_not_ready += 1;
            }
            OutcomeKind::LookupFailed => {
                self.applicable += 1;
                self.lookup_failed += 1;
            }
            OutcomeKind::WriteFailed => {
                self.applicable += 1;
                self.write_failed += 1;
            }
        }
    }

    pub fn log(&self) {
        log::info!(
            "sweep: candidates={} applicable={} already_correct={} corrected={} \
             source_not_ready={} lookup_failed={} write_failed={} missing={}",
            self.candidates,
            self.applicable,
            self.already_correct,
            self.corrected,
            self.source_not_ready,
            self.lookup_failed,
            self.write_failed,
            self.missing,
        );
    }
}

/// Apply the Corrector to each candidate in order.
pub fn scan(corrector: &Corrector, candidates: &[Application]) -> SweepSummary {
    let mut summary = SweepSummary::default();
    for app in candidates {
        match corrector.apply(app) {
            Ok(correction) => summary.record_correction(correction),
            Err(e) => summary.record_error(&app.id, &e),
        }
    }
    summary
}

/// Like `scan`, but re-reads each id first. Unknown ids count as missing.
pub fn scan_ids(corrector: &Corrector, ids: &[String]) -> SweepSummary {
    let mut summary = SweepSummary::default();
    for id in ids {
        match corrector.apply_by_id(id) {
            Ok(correction) => summary.record_correction(correction),
            Err(e) => summary.record_error(id, &e),
        }
    }
    summary
}

/// Start of the trailing window ending at `now`. A window reaching past
/// the representable date range is an error, never a panic.
pub fn window_start(now: DateTime<Utc>, window: TimeDelta) -> ReconResult<DateTime<Utc>> {
    now.checked_sub_signed(window).ok_or_else(|| {
        ReconError::Config(format!("window of {window} reaches past the supported date range"))
    })
}

/// Look-back of `hours`, checked against the date range ending at `now`.
pub fn hours_back_start(now: DateTime<Utc>, hours: u32) -> ReconResult<DateTime<Utc>> {
    let window = TimeDelta::try_hours(i64::from(hours))
        .ok_or_else(|| ReconError::Config(format!("{hours} hours is out of range")))?;
    window_start(now, window)
}

/// One sweep over the trailing window ending now.
pub struct Sweeper {
    corrector: Corrector,
    window: TimeDelta,
}

impl Sweeper {
    pub fn new(corrector: Corrector, window: TimeDelta) -> Self {
        Self { corrector, window }
    }

    pub fn corrector(&self) -> &Corrector {
        &self.corrector
    }

    /// Fails only if the window is out of range or the candidate query
    /// itself fails.
    pub fn sweep_once(&self) -> ReconResult<SweepSummary> {
        self.sweep_window(self.window)
    }

    pub fn sweep_window(&self, window: TimeDelta) -> ReconResult<SweepSummary> {
        self.sweep_since(window_start(self.corrector.clock().now(), window)?)
    }

    pub fn sweep_since(&self, since: DateTime<Utc>) -> ReconResult<SweepSummary> {
        let candidates = self.corrector.store().recent_candidates(since)?;
        log::debug!("sweep: {} candidates since {since}", candidates.len());
        let mut summary = scan(&self.corrector, &candidates);
        summary.window_start = Some(since);
        Ok(summary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scanning,
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerReport {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub total_corrected: usize,
    pub last: Option<SweepSummary>,
}

pub struct SweepScheduler {
    sweeper: Arc<Sweeper>,
    interval: Duration,
    state: watch::Sender<SchedulerState>,
}

impl SweepScheduler {
    pub fn new(sweeper: Sweeper, interval: Duration) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            sweeper: Arc::new(sweeper),
            interval,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Loop until `shutdown` turns true or its sender is dropped.
    /// The first tick fires immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> SchedulerReport {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = SchedulerReport::default();

        log::info!("scheduler: started (interval={:?})", self.interval);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            self.state.send_replace(SchedulerState::Scanning);
            let sweeper = Arc::clone(&self.sweeper);
            let result = tokio::task::spawn_blocking(move || sweeper.sweep_once()).await;
            self.state.send_replace(SchedulerState::Idle);

            match result {
                Ok(Ok(summary)) => {
                    summary.log();
                    report.ticks += 1;
                    report.total_corrected += summary.corrected;
                    report.last = Some(summary);
                }
                Ok(Err(e)) => {
                    log::warn!("scheduler: tick failed, retrying next interval: {e}");
                    report.failed_ticks += 1;
                }
                Err(e) => {
                    log::error!("scheduler: sweep task panicked: {e}");
                    report.failed_ticks += 1;
                }
            }
        }

        self.state.send_replace(SchedulerState::Stopped);
        log::info!(
            "scheduler: stopped after {} ticks ({} failed)",
            report.ticks,
            report.failed_ticks
        );
        report
    }
}
