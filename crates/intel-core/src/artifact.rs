//! Stage artifacts: the structured output of each pipeline stage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One reasoning stage of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Collects and condenses raw evidence
    Reader,
    /// Extracts market trends and opportunities
    Analyst,
    /// Derives strategic recommendations
    Strategist,
    /// Renders the final markdown report
    Formatter,
}

impl StageName {
    /// All stages in pipeline order
    pub const ALL: [StageName; 4] = [
        StageName::Reader,
        StageName::Analyst,
        StageName::Strategist,
        StageName::Formatter,
    ];

    /// Stable lowercase identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Reader => "reader",
            StageName::Analyst => "analyst",
            StageName::Strategist => "strategist",
            StageName::Formatter => "formatter",
        }
    }

    /// The stage whose artifact this stage consumes, if any
    pub fn upstream(&self) -> Option<StageName> {
        match self {
            StageName::Reader => None,
            StageName::Analyst => Some(StageName::Reader),
            StageName::Strategist => Some(StageName::Analyst),
            StageName::Formatter => Some(StageName::Strategist),
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A market trend identified by the Analyst stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketTrend {
    pub name: String,
    pub description: String,
    /// Estimated impact: High / Medium / Low
    #[serde(default)]
    pub impact: Option<String>,
    /// Short-term / Medium-term / Long-term
    #[serde(default)]
    pub timeframe: Option<String>,
}

/// A market opportunity identified by the Analyst stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub target_segment: Option<String>,
    /// Estimated potential: High / Medium / Low
    #[serde(default)]
    pub potential: Option<String>,
}

/// A strategic recommendation produced by the Strategist stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    /// High / Medium / Low
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub expected_outcome: Option<String>,
}

/// Stage-specific output payload
///
/// A tagged variant per stage rather than trait objects: the four stages
/// share one executor lifecycle but produce structurally distinct data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    /// Reader output: condensed view of the collected evidence
    Collection {
        key_themes: Vec<String>,
        market_signals: Vec<String>,
        summary: String,
        source_count: usize,
    },
    /// Analyst output
    Analysis {
        trends: Vec<MarketTrend>,
        opportunities: Vec<Opportunity>,
    },
    /// Strategist output
    Strategy {
        recommendations: Vec<Recommendation>,
    },
    /// Formatter output: the final report
    Report {
        markdown: String,
    },
}

impl StagePayload {
    /// The stage this payload belongs to
    pub fn stage(&self) -> StageName {
        match self {
            StagePayload::Collection { .. } => StageName::Reader,
            StagePayload::Analysis { .. } => StageName::Analyst,
            StagePayload::Strategy { .. } => StageName::Strategist,
            StagePayload::Report { .. } => StageName::Formatter,
        }
    }
}

/// Outcome status of one stage execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// Valid payload on a clean run
    Succeeded,
    /// Best-effort partial payload with recorded defects
    Degraded,
    /// No usable payload
    Failed,
}

/// The structured output of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageArtifact {
    /// Unique id, used to key context fragments
    pub id: Uuid,
    /// Which stage produced this artifact
    pub stage: StageName,
    /// Stage output; absent only for failed artifacts
    pub payload: Option<StagePayload>,
    /// Succeeded, degraded, or failed
    pub status: ArtifactStatus,
    /// Number of invocation attempts it took to produce this artifact
    pub attempts: u32,
    /// Recorded defects (schema violations, fallback reasons)
    pub defects: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl StageArtifact {
    /// A clean artifact
    pub fn succeeded(stage: StageName, payload: StagePayload, attempts: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage,
            payload: Some(payload),
            status: ArtifactStatus::Succeeded,
            attempts,
            defects: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// A best-effort artifact with a recorded defect
    pub fn degraded(
        stage: StageName,
        payload: StagePayload,
        attempts: u32,
        defect: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage,
            payload: Some(payload),
            status: ArtifactStatus::Degraded,
            attempts,
            defects: vec![defect.into()],
            created_at: Utc::now(),
        }
    }

    /// A failed artifact with the failure reason recorded
    pub fn failed(stage: StageName, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage,
            payload: None,
            status: ArtifactStatus::Failed,
            attempts,
            defects: vec![reason.into()],
            created_at: Utc::now(),
        }
    }

    /// Whether downstream stages may consume this artifact
    pub fn is_usable(&self) -> bool {
        self.status != ArtifactStatus::Failed && self.payload.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(StageName::Reader.upstream(), None);
        assert_eq!(StageName::Analyst.upstream(), Some(StageName::Reader));
        assert_eq!(StageName::Strategist.upstream(), Some(StageName::Analyst));
        assert_eq!(StageName::Formatter.upstream(), Some(StageName::Strategist));
    }

    #[test]
    fn test_degraded_artifact_is_usable() {
        let artifact = StageArtifact::degraded(
            StageName::Analyst,
            StagePayload::Analysis {
                trends: vec![],
                opportunities: vec![],
            },
            3,
            "missing opportunities field",
        );

        assert!(artifact.is_usable());
        assert_eq!(artifact.status, ArtifactStatus::Degraded);
        assert_eq!(artifact.defects.len(), 1);
    }

    #[test]
    fn test_failed_artifact_is_not_usable() {
        let artifact = StageArtifact::failed(StageName::Reader, 4, "transport error");
        assert!(!artifact.is_usable());
        assert!(artifact.payload.is_none());
    }

    #[test]
    fn test_payload_serialization_roundtrip() {
        let payload = StagePayload::Analysis {
            trends: vec![MarketTrend {
                name: "Digital Transformation".to_string(),
                description: "Accelerated adoption of digital technologies".to_string(),
                impact: Some("High".to_string()),
                timeframe: Some("Medium-term".to_string()),
            }],
            opportunities: vec![],
        };

        let json = serde_json::to_string(&payload).expect("serialize");
        let back: StagePayload = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.stage(), StageName::Analyst);
    }
}
