//! Analysis session: the unit of work owned by the orchestrator

use crate::artifact::{ArtifactStatus, StageArtifact, StageName};
use crate::error::{IntelError, Result};
use crate::evidence::Evidence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an analysis session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    /// Formatter degraded but produced a usable payload
    Partial,
    Complete,
    Failed,
}

impl SessionStatus {
    /// Terminal sessions are immutable
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Partial | SessionStatus::Complete | SessionStatus::Failed
        )
    }
}

/// One market-intelligence analysis run
///
/// Owned exclusively by the orchestrator while running; handed to the
/// session store on completion or terminal failure, after which it is
/// immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub id: Uuid,
    pub query: String,
    pub market_domain: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    /// Evidence collected during the Collecting state, failures included
    pub evidence: Vec<Evidence>,
    /// Stage artifacts in pipeline order; every artifact produced before a
    /// failure point is retained
    pub artifacts: Vec<StageArtifact>,
    /// Final report markdown, set once the Formatter completes
    pub report: Option<String>,
    /// Human-readable reason recorded on failure or degradation
    pub failure_reason: Option<String>,
}

impl AnalysisSession {
    /// Create a new pending session, validating query and domain
    pub fn new(query: impl Into<String>, market_domain: impl Into<String>) -> Result<Self> {
        let query = query.into().trim().to_string();
        let market_domain = market_domain.into().trim().to_string();

        if query.len() < 5 {
            return Err(IntelError::InvalidInput(
                "query must be at least 5 characters long".to_string(),
            ));
        }
        if market_domain.is_empty()
            || !market_domain
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-')
        {
            return Err(IntelError::InvalidInput(
                "market domain must contain only letters, numbers, spaces, or hyphens".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            query,
            market_domain,
            created_at: Utc::now(),
            status: SessionStatus::Pending,
            evidence: Vec::new(),
            artifacts: Vec::new(),
            report: None,
            failure_reason: None,
        })
    }

    /// Find the artifact for a given stage
    pub fn artifact(&self, stage: StageName) -> Option<&StageArtifact> {
        self.artifacts.iter().find(|a| a.stage == stage)
    }

    /// Whether all four stage artifacts exist in a non-failed state
    pub fn all_stages_usable(&self) -> bool {
        StageName::ALL
            .iter()
            .all(|s| self.artifact(*s).is_some_and(StageArtifact::is_usable))
    }

    /// Whether any artifact or evidence entry is marked failed
    pub fn has_recorded_failure(&self) -> bool {
        self.artifacts
            .iter()
            .any(|a| a.status == ArtifactStatus::Failed)
            || self.evidence.iter().any(|e| !e.is_ok())
    }
}
