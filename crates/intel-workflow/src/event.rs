//! Workflow states and progress events

use intel_core::StageName;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// States of the analysis pipeline
///
/// Each working state corresponds to one stage: Collecting covers the
/// provider fan-out plus the Reader stage, the rest map one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    /// Session created, not yet started
    Created,
    /// Gathering evidence and running the Reader stage
    Collecting,
    /// Running the Analyst stage
    Analyzing,
    /// Running the Strategist stage
    Strategizing,
    /// Running the Formatter stage
    Formatting,
    /// All stages succeeded
    Complete,
    /// The pipeline could not continue
    Failed,
    /// The report was produced via a degraded Formatter
    PartiallyComplete,
}

impl WorkflowState {
    /// The stage executed while in this state, if any
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::Collecting => Some(StageName::Reader),
            Self::Analyzing => Some(StageName::Analyst),
            Self::Strategizing => Some(StageName::Strategist),
            Self::Formatting => Some(StageName::Formatter),
            _ => None,
        }
    }

    /// Whether this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::PartiallyComplete)
    }
}

/// Progress events broadcast while a session runs
///
/// Emitted on a `tokio::sync::broadcast` channel; sending never blocks and
/// dropped events (no subscriber, lagging subscriber) never stall the
/// pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    /// A stage began executing
    StageEntered { session_id: Uuid, stage: StageName },
    /// A stage produced a fully valid artifact
    StageCompleted { session_id: Uuid, stage: StageName },
    /// A stage produced a best-effort artifact with a recorded defect
    StageDegraded {
        session_id: Uuid,
        stage: StageName,
        defect: String,
    },
    /// A stage failed after exhausting its retries
    StageFailed {
        session_id: Uuid,
        stage: StageName,
        reason: String,
    },
    /// The session finished with a full report
    Completed { session_id: Uuid },
    /// The session finished with a degraded report
    PartiallyCompleted { session_id: Uuid },
    /// The session could not finish
    Failed { session_id: Uuid, reason: String },
}

impl WorkflowEvent {
    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::StageEntered { session_id, .. }
            | Self::StageCompleted { session_id, .. }
            | Self::StageDegraded { session_id, .. }
            | Self::StageFailed { session_id, .. }
            | Self::Completed { session_id }
            | Self::PartiallyCompleted { session_id }
            | Self::Failed { session_id, .. } => *session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_states_map_to_stages() {
        assert_eq!(WorkflowState::Collecting.stage(), Some(StageName::Reader));
        assert_eq!(WorkflowState::Analyzing.stage(), Some(StageName::Analyst));
        assert_eq!(
            WorkflowState::Strategizing.stage(),
            Some(StageName::Strategist)
        );
        assert_eq!(WorkflowState::Formatting.stage(), Some(StageName::Formatter));
        assert_eq!(WorkflowState::Created.stage(), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(WorkflowState::Complete.is_terminal());
        assert!(WorkflowState::Failed.is_terminal());
        assert!(WorkflowState::PartiallyComplete.is_terminal());
        assert!(!WorkflowState::Collecting.is_terminal());
    }
}
