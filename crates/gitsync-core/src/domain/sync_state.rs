//! Coordinator state machine and per-phase outcomes
//!
//! [`SyncState`] is the single piece of mutable scheduling state owned by the
//! sync coordinator. All transitions go through [`SyncState::accept_request`]
//! and [`SyncState::complete_run`]; nothing else mutates it.
//!
//! ```text
//!            request                 request
//!   Idle ─────────────→ Syncing ─────────────→ SyncingWithPending
//!    ↑                    │  ↑                        │
//!    └────── complete ────┘  └──────── complete ──────┘
//! ```

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// SyncState
// ============================================================================

/// Scheduling state of the sync coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No pipeline run in flight
    #[default]
    Idle,
    /// Exactly one pipeline run in flight, nothing queued
    Syncing,
    /// A run is in flight and at least one request arrived meanwhile
    SyncingWithPending,
}

/// What the coordinator should do after recording a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// The state was idle; start a pipeline run now
    Start,
    /// A run is already in flight; the request was folded into the pending slot
    Coalesced,
}

/// What the coordinator should do after a run finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionDecision {
    /// A request arrived during the run; run again after the cooldown
    RunPending,
    /// Nothing pending; the coordinator is idle
    Stop,
}

impl SyncState {
    /// Returns a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            SyncState::Idle => "Idle",
            SyncState::Syncing => "Syncing",
            SyncState::SyncingWithPending => "SyncingWithPending",
        }
    }

    /// Returns true while a pipeline run is in flight
    pub fn is_busy(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }

    /// Records an accepted sync request
    pub fn accept_request(&mut self) -> RequestDecision {
        match self {
            SyncState::Idle => {
                *self = SyncState::Syncing;
                RequestDecision::Start
            }
            SyncState::Syncing | SyncState::SyncingWithPending => {
                *self = SyncState::SyncingWithPending;
                RequestDecision::Coalesced
            }
        }
    }

    /// Records the end of the in-flight run
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` when no run was in flight.
    pub fn complete_run(&mut self) -> Result<CompletionDecision, DomainError> {
        match self {
            SyncState::Idle => Err(DomainError::InvalidState {
                from: self.name().to_string(),
                to: SyncState::Idle.name().to_string(),
            }),
            SyncState::Syncing => {
                *self = SyncState::Idle;
                Ok(CompletionDecision::Stop)
            }
            SyncState::SyncingWithPending => {
                *self = SyncState::Syncing;
                Ok(CompletionDecision::RunPending)
            }
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// SyncOutcome
// ============================================================================

/// Tri-state result of one pipeline phase, or of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Nothing to do
    NotRequired,
    /// The phase changed local or remote state
    Performed,
    /// The phase could not complete
    Failed,
}

impl SyncOutcome {
    /// Combines two phase outcomes into the outcome of a run
    ///
    /// Failed wins over everything, then Performed, then NotRequired.
    pub fn combine(self, other: SyncOutcome) -> SyncOutcome {
        match (self, other) {
            (SyncOutcome::Failed, _) | (_, SyncOutcome::Failed) => SyncOutcome::Failed,
            (SyncOutcome::Performed, _) | (_, SyncOutcome::Performed) => SyncOutcome::Performed,
            _ => SyncOutcome::NotRequired,
        }
    }

    pub fn is_performed(&self) -> bool {
        matches!(self, SyncOutcome::Performed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed)
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncOutcome::NotRequired => "not_required",
            SyncOutcome::Performed => "performed",
            SyncOutcome::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}
