//! Per-stage prompts, validation, and payload parsing
//!
//! The four stages share one lifecycle (see [`crate::executor`]) and differ
//! only in the strategy implemented here: what upstream data they require,
//! what they ask the model, and what schema the answer must satisfy.

use intel_core::{
    AnalysisSession, MarketTrend, Opportunity, Recommendation, StageName, StagePayload,
};
use intel_llm::{CompletionRequest, Message};
use serde::Deserialize;

const EVIDENCE_EXCERPT_LEN: usize = 500;
const MAX_EVIDENCE_ITEMS: usize = 20;

/// Check that the stage's upstream data exists and is usable
///
/// Fails fast before any model call is spent. A degraded upstream artifact
/// counts as usable.
pub(crate) fn validate_input(stage: StageName, session: &AnalysisSession) -> Result<(), String> {
    match stage {
        StageName::Reader => {
            if session.evidence.iter().any(|e| e.is_ok()) {
                Ok(())
            } else {
                Err("no successful evidence to read".to_string())
            }
        }
        StageName::Analyst => match upstream_payload(session, StageName::Reader) {
            Some(StagePayload::Collection { summary, key_themes, .. })
                if !summary.trim().is_empty() || !key_themes.is_empty() =>
            {
                Ok(())
            }
            Some(StagePayload::Collection { .. }) => {
                Err("collection artifact has no themes or summary".to_string())
            }
            _ => Err("missing collection artifact".to_string()),
        },
        StageName::Strategist => match upstream_payload(session, StageName::Analyst) {
            Some(StagePayload::Analysis { trends, .. }) if !trends.is_empty() => Ok(()),
            Some(StagePayload::Analysis { .. }) => Err("analysis artifact has no trends".to_string()),
            _ => Err("missing analysis artifact".to_string()),
        },
        StageName::Formatter => match upstream_payload(session, StageName::Strategist) {
            Some(StagePayload::Strategy { .. }) => Ok(()),
            _ => Err("missing strategy artifact".to_string()),
        },
    }
}

/// Build the stage's completion request
///
/// A corrective instruction from a failed schema check is appended to the
/// prompt so the model can repair its previous answer.
pub(crate) fn build_request(
    stage: StageName,
    session: &AnalysisSession,
    model: &str,
    max_tokens: usize,
    temperature: f32,
    corrective: Option<&str>,
) -> CompletionRequest {
    let mut prompt = match stage {
        StageName::Reader => reader_prompt(session),
        StageName::Analyst => analyst_prompt(session),
        StageName::Strategist => strategist_prompt(session),
        StageName::Formatter => formatter_prompt(session),
    };

    if let Some(defect) = corrective {
        prompt.push_str(&format!(
            "\n\nYour previous answer was rejected: {defect}. \
             Produce a corrected answer that fixes exactly this problem."
        ));
    }

    CompletionRequest::builder(model)
        .system(system_prompt(stage))
        .add_message(Message::user(prompt))
        .max_tokens(max_tokens)
        .temperature(temperature)
        .json_response(stage != StageName::Formatter)
        .build()
}

/// Parse and strictly validate the model's answer
///
/// Errors carry the defect description fed back as the corrective
/// instruction on the next attempt.
pub(crate) fn parse_output(
    stage: StageName,
    text: &str,
    session: &AnalysisSession,
) -> Result<StagePayload, String> {
    match stage {
        StageName::Reader => {
            let raw: RawCollection = parse_json(text)?;
            if raw.summary.trim().is_empty() {
                return Err("the summary field must be a non-empty string".to_string());
            }
            if raw.key_themes.is_empty() {
                return Err("the key_themes array must contain at least one theme".to_string());
            }
            Ok(StagePayload::Collection {
                key_themes: raw.key_themes,
                market_signals: raw.market_signals,
                summary: raw.summary,
                source_count: session.evidence.iter().filter(|e| e.is_ok()).count(),
            })
        }
        StageName::Analyst => {
            let raw: RawAnalysis = parse_json(text)?;
            let Some(opportunities) = raw.opportunities else {
                return Err("the opportunities field is required".to_string());
            };
            if raw.trends.is_empty() {
                return Err("the trends array must contain at least one trend".to_string());
            }
            Ok(StagePayload::Analysis {
                trends: raw.trends.into_iter().map(RawTrend::into_trend).collect(),
                opportunities: opportunities
                    .into_iter()
                    .map(RawOpportunity::into_opportunity)
                    .collect(),
            })
        }
        StageName::Strategist => {
            let raw: RawStrategy = parse_json(text)?;
            if raw.recommendations.is_empty() {
                return Err(
                    "the recommendations array must contain at least one recommendation"
                        .to_string(),
                );
            }
            Ok(StagePayload::Strategy {
                recommendations: raw
                    .recommendations
                    .into_iter()
                    .map(RawRecommendation::into_recommendation)
                    .collect(),
            })
        }
        StageName::Formatter => {
            let markdown = strip_code_fences(text).trim().to_string();
            if markdown.is_empty() {
                return Err("the report must not be empty".to_string());
            }
            Ok(StagePayload::Report { markdown })
        }
    }
}

/// Best-effort payload from a schema-invalid answer
///
/// Missing fields default to empty; a completely unparseable answer yields
/// an empty-but-well-formed payload so degradation always has something to
/// emit.
pub(crate) fn salvage_output(
    stage: StageName,
    text: &str,
    session: &AnalysisSession,
) -> StagePayload {
    match stage {
        StageName::Reader => {
            let raw: RawCollection = parse_json(text).unwrap_or_default();
            StagePayload::Collection {
                key_themes: raw.key_themes,
                market_signals: raw.market_signals,
                summary: raw.summary,
                source_count: session.evidence.iter().filter(|e| e.is_ok()).count(),
            }
        }
        StageName::Analyst => {
            let raw: RawAnalysis = parse_json(text).unwrap_or_default();
            StagePayload::Analysis {
                trends: raw.trends.into_iter().map(RawTrend::into_trend).collect(),
                opportunities: raw
                    .opportunities
                    .unwrap_or_default()
                    .into_iter()
                    .map(RawOpportunity::into_opportunity)
                    .collect(),
            }
        }
        StageName::Strategist => {
            let raw: RawStrategy = parse_json(text).unwrap_or_default();
            StagePayload::Strategy {
                recommendations: raw
                    .recommendations
                    .into_iter()
                    .map(RawRecommendation::into_recommendation)
                    .collect(),
            }
        }
        StageName::Formatter => fallback_report(session),
    }
}

/// Minimal templated report built from whatever upstream artifacts exist
///
/// Used when the Formatter model call fails outright; the pipeline prefers
/// a plain but complete report over a failed session.
pub(crate) fn fallback_report(session: &AnalysisSession) -> StagePayload {
    let mut markdown = format!(
        "# Market Intelligence Report: {}\n\n## Executive Summary\n\
         Analysis of **{}** in the {} sector.\n",
        session.market_domain, session.query, session.market_domain
    );

    if let Some(StagePayload::Collection { summary, key_themes, .. }) =
        upstream_payload(session, StageName::Reader)
    {
        if !summary.trim().is_empty() {
            markdown.push_str(&format!("\n{summary}\n"));
        }
        if !key_themes.is_empty() {
            markdown.push_str("\n## Key Themes\n");
            for theme in key_themes {
                markdown.push_str(&format!("- {theme}\n"));
            }
        }
    }

    if let Some(StagePayload::Analysis { trends, opportunities }) =
        upstream_payload(session, StageName::Analyst)
    {
        if !trends.is_empty() {
            markdown.push_str("\n## Market Trends Analysis\n");
            for trend in trends {
                markdown.push_str(&format!("- **{}**: {}\n", trend.name, trend.description));
            }
        }
        if !opportunities.is_empty() {
            markdown.push_str("\n## Strategic Opportunities\n");
            for opp in opportunities {
                markdown.push_str(&format!("- **{}**: {}\n", opp.name, opp.description));
            }
        }
    }

    if let Some(StagePayload::Strategy { recommendations }) =
        upstream_payload(session, StageName::Strategist)
    {
        if !recommendations.is_empty() {
            markdown.push_str("\n## Strategic Recommendations\n");
            for rec in recommendations {
                markdown.push_str(&format!("- **{}**: {}\n", rec.title, rec.description));
            }
        }
    }

    StagePayload::Report { markdown }
}

fn upstream_payload(session: &AnalysisSession, stage: StageName) -> Option<&StagePayload> {
    session.artifact(stage).and_then(|a| a.payload.as_ref())
}

/// Serialized payload of the stage's direct upstream, empty when absent
fn upstream_json(session: &AnalysisSession, stage: StageName) -> String {
    stage
        .upstream()
        .and_then(|u| upstream_payload(session, u))
        .and_then(|p| serde_json::to_string_pretty(p).ok())
        .unwrap_or_default()
}

fn system_prompt(stage: StageName) -> &'static str {
    match stage {
        StageName::Reader => {
            "You are a market research reader. You distill raw collected \
             sources into themes and signals. Answer with a single JSON object."
        }
        StageName::Analyst => {
            "You are a market analyst. You extract trends and opportunities \
             from collected research. Answer with a single JSON object."
        }
        StageName::Strategist => {
            "You are a market strategist. You turn analysis into actionable \
             recommendations. Answer with a single JSON object."
        }
        StageName::Formatter => {
            "You are a report writer. You produce clear, well-structured \
             markdown reports. Answer with markdown only, no JSON."
        }
    }
}

fn reader_prompt(session: &AnalysisSession) -> String {
    let mut digest = String::new();
    for evidence in session
        .evidence
        .iter()
        .filter(|e| e.is_ok())
        .take(MAX_EVIDENCE_ITEMS)
    {
        let excerpt: String = evidence.content.chars().take(EVIDENCE_EXCERPT_LEN).collect();
        digest.push_str(&format!("[{}] {} - {}\n", evidence.provider, evidence.title, excerpt));
    }

    format!(
        "Analyze the following collected data about \"{}\" in the {} market.\n\n\
         Return a JSON object with:\n\
         - key_themes: array of main themes found (non-empty)\n\
         - market_signals: array of important market signals or indicators\n\
         - summary: brief summary of the collected content (non-empty)\n\n\
         Data:\n{}",
        session.query, session.market_domain, digest
    )
}

fn analyst_prompt(session: &AnalysisSession) -> String {
    let collection = upstream_json(session, StageName::Analyst);

    format!(
        "Identify market trends and opportunities for \"{}\" in the {} sector \
         based on the collected research below.\n\n\
         Return a JSON object with:\n\
         - trends: array of {{\"name\", \"description\", \"impact\", \"timeframe\"}} (non-empty)\n\
         - opportunities: array of {{\"name\", \"description\", \"target_segment\", \"potential\"}}\n\n\
         Research:\n{}",
        session.query, session.market_domain, collection
    )
}

fn strategist_prompt(session: &AnalysisSession) -> String {
    let analysis = upstream_json(session, StageName::Strategist);

    format!(
        "Develop strategic recommendations for \"{}\" in the {} sector from \
         the analysis below.\n\n\
         Return a JSON object with:\n\
         - recommendations: array of {{\"title\", \"description\", \"priority\", \
         \"expected_outcome\"}} (non-empty)\n\n\
         Analysis:\n{}",
        session.query, session.market_domain, analysis
    )
}

fn formatter_prompt(session: &AnalysisSession) -> String {
    let analysis = upstream_payload(session, StageName::Analyst)
        .and_then(|p| serde_json::to_string_pretty(p).ok())
        .unwrap_or_default();
    let strategy = upstream_json(session, StageName::Formatter);

    format!(
        "Write a market intelligence report in markdown for \"{}\" in the {} \
         sector. Use these sections: Executive Summary, Market Trends Analysis, \
         Strategic Opportunities, Strategic Recommendations.\n\n\
         Analysis:\n{}\n\nRecommendations:\n{}",
        session.query, session.market_domain, analysis, strategy
    )
}

/// Parse a JSON answer, tolerating a markdown code fence around it
fn parse_json<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, String> {
    serde_json::from_str(strip_code_fences(text))
        .map_err(|e| format!("the answer is not valid JSON: {e}"))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

// Permissive wire shapes: every field optional so salvage can work with
// whatever the model managed to produce.

#[derive(Debug, Default, Deserialize)]
struct RawCollection {
    #[serde(default)]
    key_themes: Vec<String>,
    #[serde(default)]
    market_signals: Vec<String>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    trends: Vec<RawTrend>,
    opportunities: Option<Vec<RawOpportunity>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTrend {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    timeframe: Option<String>,
}

impl RawTrend {
    fn into_trend(self) -> MarketTrend {
        MarketTrend {
            name: self.name,
            description: self.description,
            impact: self.impact,
            timeframe: self.timeframe,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawOpportunity {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    target_segment: Option<String>,
    #[serde(default)]
    potential: Option<String>,
}

impl RawOpportunity {
    fn into_opportunity(self) -> Opportunity {
        Opportunity {
            name: self.name,
            description: self.description,
            target_segment: self.target_segment,
            potential: self.potential,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawStrategy {
    #[serde(default)]
    recommendations: Vec<RawRecommendation>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRecommendation {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    expected_outcome: Option<String>,
}

impl RawRecommendation {
    fn into_recommendation(self) -> Recommendation {
        Recommendation {
            title: self.title,
            description: self.description,
            priority: self.priority,
            expected_outcome: self.expected_outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intel_core::{Evidence, StageArtifact};

    fn session_with_evidence() -> AnalysisSession {
        let mut session = AnalysisSession::new("ai trends in healthcare", "Healthcare").unwrap();
        session
            .evidence
            .push(Evidence::ok("search", "AI diagnostics", "hospitals adopt ML triage"));
        session
    }

    fn with_collection(mut session: AnalysisSession) -> AnalysisSession {
        session.artifacts.push(StageArtifact::succeeded(
            StageName::Reader,
            StagePayload::Collection {
                key_themes: vec!["AI diagnostics".to_string()],
                market_signals: vec![],
                summary: "ML adoption is accelerating".to_string(),
                source_count: 1,
            },
            1,
        ));
        session
    }

    #[test]
    fn test_reader_input_requires_evidence() {
        let empty = AnalysisSession::new("ai trends in healthcare", "Healthcare").unwrap();
        assert!(validate_input(StageName::Reader, &empty).is_err());
        assert!(validate_input(StageName::Reader, &session_with_evidence()).is_ok());
    }

    #[test]
    fn test_analyst_input_requires_collection() {
        let session = session_with_evidence();
        assert!(validate_input(StageName::Analyst, &session).is_err());
        assert!(validate_input(StageName::Analyst, &with_collection(session)).is_ok());
    }

    #[test]
    fn test_analyst_prompt_embeds_upstream_collection() {
        let session = with_collection(session_with_evidence());
        let prompt = analyst_prompt(&session);
        assert!(prompt.contains("ML adoption is accelerating"));
        assert!(prompt.contains("AI diagnostics"));
    }

    #[test]
    fn test_analyst_prompt_without_collection_leaves_research_empty() {
        let prompt = analyst_prompt(&session_with_evidence());
        assert!(prompt.ends_with("Research:\n"));
    }

    #[test]
    fn test_reader_output_parsed() {
        let session = session_with_evidence();
        let text = r#"{"key_themes": ["triage"], "market_signals": ["funding up"], "summary": "ok"}"#;
        let payload = parse_output(StageName::Reader, text, &session).unwrap();
        match payload {
            StagePayload::Collection { key_themes, source_count, .. } => {
                assert_eq!(key_themes, vec!["triage".to_string()]);
                assert_eq!(source_count, 1);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_reader_output_rejects_empty_summary() {
        let session = session_with_evidence();
        let text = r#"{"key_themes": ["t"], "market_signals": [], "summary": "  "}"#;
        assert!(parse_output(StageName::Reader, text, &session).is_err());
    }

    #[test]
    fn test_analyst_output_requires_opportunities_field() {
        let session = session_with_evidence();
        let text = r#"{"trends": [{"name": "t", "description": "d"}]}"#;
        let err = parse_output(StageName::Analyst, text, &session).unwrap_err();
        assert!(err.contains("opportunities"));
    }

    #[test]
    fn test_analyst_output_requires_nonempty_trends() {
        let session = session_with_evidence();
        let text = r#"{"trends": [], "opportunities": []}"#;
        assert!(parse_output(StageName::Analyst, text, &session).is_err());
    }

    #[test]
    fn test_analyst_output_parsed() {
        let session = session_with_evidence();
        let text = r#"{
            "trends": [{"name": "t", "description": "d", "impact": "High"}],
            "opportunities": [{"name": "o", "description": "d2"}]
        }"#;
        match parse_output(StageName::Analyst, text, &session).unwrap() {
            StagePayload::Analysis { trends, opportunities } => {
                assert_eq!(trends[0].impact.as_deref(), Some("High"));
                assert_eq!(opportunities.len(), 1);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_code_fences_stripped() {
        let session = session_with_evidence();
        let text = "```json\n{\"trends\": [{\"name\": \"t\", \"description\": \"d\"}], \"opportunities\": []}\n```";
        assert!(parse_output(StageName::Analyst, text, &session).is_ok());
    }

    #[test]
    fn test_salvage_tolerates_missing_fields() {
        let session = session_with_evidence();
        let text = r#"{"trends": [{"name": "t", "description": "d"}]}"#;
        match salvage_output(StageName::Analyst, text, &session) {
            StagePayload::Analysis { trends, opportunities } => {
                assert_eq!(trends.len(), 1);
                assert!(opportunities.is_empty());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_salvage_tolerates_garbage() {
        let session = session_with_evidence();
        match salvage_output(StageName::Analyst, "not json at all", &session) {
            StagePayload::Analysis { trends, opportunities } => {
                assert!(trends.is_empty());
                assert!(opportunities.is_empty());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_fallback_report_includes_upstream_sections() {
        let mut session = with_collection(session_with_evidence());
        session.artifacts.push(StageArtifact::succeeded(
            StageName::Analyst,
            StagePayload::Analysis {
                trends: vec![MarketTrend {
                    name: "AI triage".to_string(),
                    description: "growing fast".to_string(),
                    impact: None,
                    timeframe: None,
                }],
                opportunities: vec![],
            },
            1,
        ));

        match fallback_report(&session) {
            StagePayload::Report { markdown } => {
                assert!(markdown.contains("# Market Intelligence Report: Healthcare"));
                assert!(markdown.contains("## Market Trends Analysis"));
                assert!(markdown.contains("AI triage"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_formatter_output_is_markdown_passthrough() {
        let session = session_with_evidence();
        let payload = parse_output(StageName::Formatter, "# Report\n\nbody", &session).unwrap();
        assert!(matches!(payload, StagePayload::Report { .. }));
        assert!(parse_output(StageName::Formatter, "   ", &session).is_err());
    }
}
