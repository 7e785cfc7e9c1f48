//! Workflow orchestration for intel-rs
//!
//! Drives the four-stage analysis pipeline (Reader, Analyst, Strategist,
//! Formatter) as a state machine over an [`intel_core::AnalysisSession`]:
//!
//! - [`StageExecutor`] gives every stage the same lifecycle: validate
//!   input, invoke the model, validate output, emit an artifact, with
//!   corrective retries and per-stage degradation fallbacks
//! - [`WorkflowOrchestrator`] sequences the stages, enforces the
//!   data-dependency invariants, emits progress events, and persists the
//!   session at every terminal state

pub mod event;
pub mod executor;
pub mod orchestrator;
pub mod stage;

pub use event::{WorkflowEvent, WorkflowState};
pub use executor::StageExecutor;
pub use orchestrator::{CancellationHandle, WorkflowOrchestrator};
