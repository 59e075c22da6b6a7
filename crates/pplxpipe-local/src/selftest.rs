//! Reachability probe: one regular query and one deep-research query.
//!
//! A deep-research probe that ends in clarifying questions still counts as reachable.

use pplxpipe_core::{AskProvider, CitationMode, Error, ModelPreset, QueryRequest};
use serde::Serialize;

pub const REGULAR_QUERY: &str = "What is 2+2? Reply in one short sentence.";
pub const DEEP_RESEARCH_QUERY: &str =
    "Give a concise overview of quantum computing in one paragraph.";
const PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub name: &'static str,
    pub ok: bool,
    /// Answer preview / reachability note when `ok`, error message otherwise.
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

fn preview(answer: &str) -> String {
    answer.chars().take(PREVIEW_CHARS).collect()
}

pub async fn probe<P: AskProvider + ?Sized>(
    provider: &P,
    name: &'static str,
    model: ModelPreset,
    query: &str,
) -> ProbeReport {
    let mut q = QueryRequest::new(query);
    q.model = model;
    q.citation_mode = CitationMode::Clean;
    match provider.execute(&q).await {
        Ok(r) => ProbeReport {
            name,
            ok: true,
            detail: format!("answer: {}", preview(&r.answer)),
            error_code: None,
        },
        Err(Error::ClarifyingQuestions { .. }) if model == ModelPreset::DeepResearch => ProbeReport {
            name,
            ok: true,
            detail: "deep_research reachable (clarifying questions requested)".to_string(),
            error_code: None,
        },
        Err(e) => {
            tracing::warn!(probe = name, code = e.code(), "self-test probe failed");
            ProbeReport {
                name,
                ok: false,
                detail: e.to_string(),
                error_code: Some(e.code()),
            }
        }
    }
}

/// Run both probes in order (regular first).
pub async fn run_self_test<P: AskProvider + ?Sized>(provider: &P) -> Vec<ProbeReport> {
    vec![
        probe(provider, "regular_search", ModelPreset::Best, REGULAR_QUERY).await,
        probe(
            provider,
            "deep_research",
            ModelPreset::DeepResearch,
            DEEP_RESEARCH_QUERY,
        )
        .await,
    ]
}

pub fn all_passed(reports: &[ProbeReport]) -> bool {
    !reports.is_empty() && reports.iter().all(|r| r.ok)
}
