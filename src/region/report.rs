//! Resolution Report
//!
//! Everything one `resolve` call did: the states it passed through, each change
//! attempt with its outcome, and the final measurement.

use super::signal::LocationSignal;
use super::strategy::{AttemptOutcome, ChangeAttempt, StrategyMethod};
use serde::Serialize;
use std::time::Duration;

/// Progress of a single `resolve` call. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResolveState {
    Initial,
    CookieApplied,
    ParamApplied,
    UiRetrying {
        /// Zero-based UI attempt index
        attempt: u32,
    },
    FinalForcedNav,
    Verified {
        success: bool,
        /// Set when this is the measurement after the forced navigation
        final_check: bool,
    },
}

impl ResolveState {
    fn rank(&self) -> (u8, u32) {
        match self {
            ResolveState::Initial => (0, 0),
            ResolveState::CookieApplied => (1, 0),
            ResolveState::ParamApplied => (2, 0),
            ResolveState::UiRetrying { attempt } => (3, *attempt),
            ResolveState::FinalForcedNav => (4, 0),
            ResolveState::Verified { .. } => (5, 0),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResolveState::Verified { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    /// Target region code
    pub target: String,

    pub max_retries: u32,

    /// When resolution started (RFC 3339)
    pub started_at: String,

    /// Final verdict
    pub success: bool,

    /// Signal that confirmed the region, when one did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<LocationSignal>,

    /// States visited, in order
    pub states: Vec<ResolveState>,

    pub attempts: Vec<ChangeAttempt>,

    pub succeeded: usize,
    pub failed: usize,
    pub indeterminate: usize,

    pub total_duration: Duration,
}

impl ResolutionReport {
    pub fn new(target: String, max_retries: u32) -> Self {
        Self {
            target,
            max_retries,
            started_at: chrono::Utc::now().to_rfc3339(),
            success: false,
            matched: None,
            states: vec![ResolveState::Initial],
            attempts: Vec::new(),
            succeeded: 0,
            failed: 0,
            indeterminate: 0,
            total_duration: Duration::ZERO,
        }
    }

    /// Move to `next`; anything that is not strictly forward is dropped
    pub fn advance(&mut self, next: ResolveState) {
        let current = self.state();
        if next.rank() <= current.rank() || current.is_terminal() {
            log::warn!("Ignoring backward transition {:?} -> {:?}", current, next);
            return;
        }
        log::debug!("Resolution state {:?} -> {:?}", current, next);
        self.states.push(next);
    }

    /// Add an attempt and update counters
    pub fn add_attempt(&mut self, attempt: ChangeAttempt) {
        match attempt.outcome {
            AttemptOutcome::Succeeded => self.succeeded += 1,
            AttemptOutcome::Failed => self.failed += 1,
            AttemptOutcome::Indeterminate => self.indeterminate += 1,
        }
        self.attempts.push(attempt);
    }

    /// Enter the terminal state with the final measurement
    pub fn finish(&mut self, success: bool, matched: Option<LocationSignal>, final_check: bool, elapsed: Duration) {
        self.advance(ResolveState::Verified {
            success,
            final_check,
        });
        self.success = success;
        self.matched = matched;
        self.total_duration = elapsed;
    }

    pub fn state(&self) -> ResolveState {
        self.states
            .last()
            .copied()
            .unwrap_or(ResolveState::Initial)
    }

    pub fn attempts_for(&self, method: StrategyMethod) -> impl Iterator<Item = &ChangeAttempt> {
        self.attempts.iter().filter(move |a| a.method == method)
    }

    /// Number of UI attempts made
    pub fn ui_attempts(&self) -> usize {
        self.attempts_for(StrategyMethod::UiSelect).count()
    }

    /// Whether the last-resort navigation ran
    pub fn used_forced_navigation(&self) -> bool {
        self.states.contains(&ResolveState::FinalForcedNav)
    }
}
