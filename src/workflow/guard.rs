//! ResetGuard - detects progress silently dropping back to step 0

use crate::models::{Step, WorkflowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// What the guard does once it sees an anomalous reset
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GuardMode {
    /// Refuse the transition and restore the prior state
    #[default]
    Strict,
    /// Record the anomaly and accept the transition
    LogOnly,
}

/// Why the observed step changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionCause {
    SessionStart,
    Advance,
    Retreat,
    ExplicitReset,
    StoreSync,
}

impl TransitionCause {
    /// Causes that are allowed to land on step 0
    fn may_reach_start(self) -> bool {
        matches!(
            self,
            TransitionCause::SessionStart | TransitionCause::Retreat | TransitionCause::ExplicitReset
        )
    }
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionCause::SessionStart => "session-start",
            TransitionCause::Advance => "advance",
            TransitionCause::Retreat => "retreat",
            TransitionCause::ExplicitReset => "explicit-reset",
            TransitionCause::StoreSync => "store-sync",
        };
        f.write_str(name)
    }
}

/// One detected anomalous reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnomalyRecord {
    /// Step the session was at before the drop
    pub from: Step,
    pub cause: TransitionCause,
    pub observed_at: DateTime<Utc>,
    /// Whether strict mode refused the transition
    pub reverted: bool,
}

/// Guard decision for one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Accept,
    /// Anomaly recorded, transition accepted (log-only mode)
    Flagged(AnomalyRecord),
    /// Anomaly recorded, caller must restore the prior state (strict mode)
    Revert(AnomalyRecord),
}

/// Watches every observed `activeStep` for unexplained drops to 0
#[derive(Debug, Clone)]
pub struct ResetGuard {
    mode: GuardMode,
    last_observed: Option<(Step, u32)>,
    anomalies: Vec<AnomalyRecord>,
}

impl ResetGuard {
    pub fn new(mode: GuardMode) -> Self {
        Self {
            mode,
            last_observed: None,
            anomalies: Vec::new(),
        }
    }

    /// Compare the newly observed state with the previous observation.
    ///
    /// A drop from step > 0 to step 0 is legitimate only through an explicit
    /// reset, a single-step retreat, or a record whose reset epoch advanced.
    /// A synced drop from step 1 is another context's single-step retreat.
    pub fn observe(&mut self, state: &WorkflowState, cause: TransitionCause) -> GuardVerdict {
        let next = (state.active_step, state.reset_epoch);

        let anomalous_from = match self.last_observed {
            Some((from, epoch))
                if from > Step::Motivations
                    && next.0 == Step::Upload
                    && next.1 <= epoch
                    && !cause.may_reach_start() =>
            {
                Some(from)
            }
            _ => None,
        };

        let Some(from) = anomalous_from else {
            debug!(step = next.0.index(), epoch = next.1, %cause, "guard observed transition");
            self.last_observed = Some(next);
            return GuardVerdict::Accept;
        };

        let record = AnomalyRecord {
            from,
            cause,
            observed_at: Utc::now(),
            reverted: self.mode == GuardMode::Strict,
        };
        self.anomalies.push(record.clone());

        match self.mode {
            GuardMode::Strict => {
                warn!(from = from.index(), %cause, "anomalous reset refused, restoring prior state");
                GuardVerdict::Revert(record)
            }
            GuardMode::LogOnly => {
                warn!(from = from.index(), %cause, "anomalous reset detected");
                self.last_observed = Some(next);
                GuardVerdict::Flagged(record)
            }
        }
    }

    pub fn anomalies(&self) -> &[AnomalyRecord] {
        &self.anomalies
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies.len()
    }
}
