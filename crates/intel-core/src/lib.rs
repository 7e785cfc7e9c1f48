//! Core data model for intel-rs
//!
//! This crate defines the types shared across the workflow engine: analysis
//! sessions, evidence collected from data providers, stage artifacts, the
//! error taxonomy, configuration, and the common retry policy.

pub mod artifact;
pub mod config;
pub mod error;
pub mod evidence;
pub mod retry;
pub mod session;

pub use artifact::{
    ArtifactStatus, MarketTrend, Opportunity, Recommendation, StageArtifact, StageName,
    StagePayload,
};
pub use config::{DegradationToggles, IntelConfig, IntelConfigBuilder};
pub use error::{IntelError, Result};
pub use evidence::{Evidence, EvidenceOutcome, EvidenceSet};
pub use retry::RetryPolicy;
pub use session::{AnalysisSession, SessionStatus};
