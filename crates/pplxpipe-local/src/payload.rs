//! Mapping of caller options onto the web UI's ask request.

use pplxpipe_core::{
    ModelPreset, QueryRequest, Result, SearchFocus, SourceFocus, StreamRequest, TimeRange,
};
use serde::Serialize;
use std::collections::BTreeMap;

pub const ASK_PATH: &str = "/rest/sse/perplexity_ask";
pub const WEBUI_VERSION: &str = "2.18";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub identifier: &'static str,
    pub mode: &'static str,
}

const DEFAULT_MODEL: ModelSpec = ModelSpec {
    identifier: "pplx_pro",
    mode: "copilot",
};

const MODELS: &[(ModelPreset, ModelSpec)] = &[
    (ModelPreset::Best, DEFAULT_MODEL),
    (ModelPreset::DeepResearch, ModelSpec { identifier: "pplx_alpha", mode: "copilot" }),
    (ModelPreset::Labs, ModelSpec { identifier: "pplx_beta", mode: "copilot" }),
    (ModelPreset::Sonar, ModelSpec { identifier: "experimental", mode: "copilot" }),
    (ModelPreset::Gpt5, ModelSpec { identifier: "gpt5", mode: "copilot" }),
    (ModelPreset::ClaudeSonnet, ModelSpec { identifier: "claude45sonnet", mode: "copilot" }),
    (ModelPreset::GeminiPro, ModelSpec { identifier: "gemini30pro", mode: "copilot" }),
    (ModelPreset::Grok, ModelSpec { identifier: "grok4", mode: "copilot" }),
];

const SOURCES: &[(SourceFocus, &str)] = &[
    (SourceFocus::Web, "web"),
    (SourceFocus::Academic, "scholar"),
    (SourceFocus::Social, "social"),
    (SourceFocus::Finance, "edgar"),
];

const SEARCH_FOCUS: &[(SearchFocus, &str)] = &[
    (SearchFocus::Web, "internet"),
    (SearchFocus::Writing, "writing"),
];

/// `None` means "no recency filter".
const RECENCY: &[(TimeRange, Option<&str>)] = &[
    (TimeRange::All, None),
    (TimeRange::Today, Some("DAY")),
    (TimeRange::Week, Some("WEEK")),
    (TimeRange::Month, Some("MONTH")),
    (TimeRange::Year, Some("YEAR")),
];

fn lookup<K: PartialEq, V: Copy>(table: &[(K, V)], key: &K, fallback: V) -> V {
    table
        .iter()
        .find(|(k, _)| k == key)
        .map_or(fallback, |(_, v)| *v)
}

pub fn model_spec(m: ModelPreset) -> ModelSpec {
    lookup(MODELS, &m, DEFAULT_MODEL)
}

pub fn source_code(s: SourceFocus) -> &'static str {
    lookup(SOURCES, &s, "web")
}

pub fn search_focus_code(f: SearchFocus) -> &'static str {
    lookup(SEARCH_FOCUS, &f, "internet")
}

pub fn recency_code(t: TimeRange) -> Option<&'static str> {
    lookup(RECENCY, &t, None)
}

#[derive(Debug, Clone, Serialize)]
pub struct AskPayload {
    pub params: AskParams,
    pub query_str: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskParams {
    pub attachments: Vec<String>,
    pub language: String,
    pub timezone: Option<String>,
    pub client_coordinates: Option<serde_json::Value>,
    pub sources: Vec<String>,
    pub model_preference: String,
    pub mode: String,
    pub search_focus: String,
    pub search_recency_filter: Option<String>,
    pub is_incognito: bool,
    pub use_schematized_api: bool,
    pub local_search_enabled: bool,
    pub prompt_source: String,
    pub send_back_text_in_streaming_api: bool,
    pub version: String,

    /// Follow-up marker plus the thread being continued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_backend_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_write_token: Option<String>,
}

pub fn build_payload(q: &QueryRequest) -> AskPayload {
    let model = model_spec(q.model);
    let follow_up = q.conversation_id().map(str::to_string);
    AskPayload {
        params: AskParams {
            attachments: Vec::new(),
            language: q.language.clone(),
            timezone: None,
            client_coordinates: None,
            sources: q
                .source_focus()
                .into_iter()
                .map(|s| source_code(s).to_string())
                .collect(),
            model_preference: model.identifier.to_string(),
            mode: model.mode.to_string(),
            search_focus: search_focus_code(q.search_focus).to_string(),
            search_recency_filter: recency_code(q.time_range).map(str::to_string),
            is_incognito: !q.save_to_library,
            use_schematized_api: false,
            local_search_enabled: false,
            prompt_source: "user".to_string(),
            send_back_text_in_streaming_api: true,
            version: WEBUI_VERSION.to_string(),
            query_source: follow_up.as_ref().map(|_| "followup".to_string()),
            read_write_token: q.continuation_token().map(str::to_string),
            last_backend_uuid: follow_up,
        },
        query_str: q.query.clone(),
    }
}

/// Validate `q` and wrap its payload as a transport request.
pub fn build_stream_request(q: &QueryRequest) -> Result<StreamRequest> {
    q.validate()?;
    let body = serde_json::to_value(build_payload(q)).map_err(|e| {
        pplxpipe_core::Error::InvalidRequest(format!("payload serialization failed: {e}"))
    })?;
    Ok(StreamRequest {
        method: "POST".to_string(),
        path: ASK_PATH.to_string(),
        headers: BTreeMap::new(),
        body,
        query: q.query.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(q: &QueryRequest) -> serde_json::Value {
        serde_json::to_value(build_payload(q)).unwrap()
    }

    #[test]
    fn defaults_match_web_ui_request_shape() {
        let v = body(&QueryRequest::new("What is 2+2?"));
        assert_eq!(v["query_str"], "What is 2+2?");
        let p = &v["params"];
        assert_eq!(p["model_preference"], "pplx_pro");
        assert_eq!(p["mode"], "copilot");
        assert_eq!(p["sources"], serde_json::json!(["web"]));
        assert_eq!(p["search_focus"], "internet");
        assert!(p["search_recency_filter"].is_null());
        assert!(p["timezone"].is_null());
        assert_eq!(p["language"], "en-US");
        assert_eq!(p["is_incognito"], true);
        assert_eq!(p["send_back_text_in_streaming_api"], true);
        assert_eq!(p["version"], WEBUI_VERSION);
        assert!(p.get("query_source").is_none());
        assert!(p.get("last_backend_uuid").is_none());
        assert!(p.get("read_write_token").is_none());
    }

    #[test]
    fn unknown_model_uses_best_preset() {
        let q: QueryRequest = serde_json::from_value(serde_json::json!({
            "query": "q",
            "model": "unknown_value"
        }))
        .unwrap();
        let v = body(&q);
        assert_eq!(v["params"]["model_preference"], "pplx_pro");
        assert_eq!(v["params"]["mode"], "copilot");
    }

    #[test]
    fn every_option_has_a_table_entry() {
        for m in ModelPreset::ALL {
            assert!(MODELS.iter().any(|(k, _)| k == m), "missing model {m}");
        }
        for s in SourceFocus::ALL {
            assert!(SOURCES.iter().any(|(k, _)| k == s), "missing source {s}");
        }
        for f in SearchFocus::ALL {
            assert!(SEARCH_FOCUS.iter().any(|(k, _)| k == f), "missing focus {f}");
        }
        for t in TimeRange::ALL {
            assert!(RECENCY.iter().any(|(k, _)| k == t), "missing range {t}");
        }
    }

    #[test]
    fn options_map_to_backend_codes() {
        let mut q = QueryRequest::new("q");
        q.model = ModelPreset::DeepResearch;
        q.source_focus = vec![SourceFocus::Academic, SourceFocus::Finance];
        q.search_focus = SearchFocus::Writing;
        q.time_range = TimeRange::Week;
        q.language = "de-DE".to_string();
        q.save_to_library = true;
        let p = body(&q)["params"].clone();
        assert_eq!(p["model_preference"], "pplx_alpha");
        assert_eq!(p["sources"], serde_json::json!(["scholar", "edgar"]));
        assert_eq!(p["search_focus"], "writing");
        assert_eq!(p["search_recency_filter"], "WEEK");
        assert_eq!(p["language"], "de-DE");
        assert_eq!(p["is_incognito"], false);
    }

    #[test]
    fn follow_up_carries_identifier_and_token() {
        let mut q = QueryRequest::new("and in 1900?");
        q.conversation_id = Some("backend-uuid".to_string());
        q.continuation_token = Some("rw-token".to_string());
        let p = body(&q)["params"].clone();
        assert_eq!(p["query_source"], "followup");
        assert_eq!(p["last_backend_uuid"], "backend-uuid");
        assert_eq!(p["read_write_token"], "rw-token");
    }

    #[test]
    fn follow_up_without_token_omits_token() {
        let mut q = QueryRequest::new("q");
        q.conversation_id = Some("backend-uuid".to_string());
        let p = body(&q)["params"].clone();
        assert_eq!(p["last_backend_uuid"], "backend-uuid");
        assert!(p.get("read_write_token").is_none());
    }

    #[test]
    fn token_without_identifier_is_not_a_follow_up() {
        let mut q = QueryRequest::new("q");
        q.continuation_token = Some("rw-token".to_string());
        let p = body(&q)["params"].clone();
        assert!(p.get("query_source").is_none());
        assert!(p.get("read_write_token").is_none());
    }

    #[test]
    fn stream_request_rejects_blank_query() {
        let err = build_stream_request(&QueryRequest::new("   ")).unwrap_err();
        assert_eq!(err.code(), "invalid_request");
        let req = build_stream_request(&QueryRequest::new("ok")).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, ASK_PATH);
        assert_eq!(req.body["query_str"], "ok");
    }
}
