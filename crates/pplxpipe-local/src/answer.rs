//! Interpretation of the embedded `text` document of an event.
//!
//! Direct answers arrive as a bare object. Multi-step modes (deep research) arrive as an array of
//! step records, one of which is either the `FINAL` answer or a request for clarification.

use crate::json::{self, FieldExt, Object};
use pplxpipe_core::Source;
use serde_json::Value;

pub const STEP_CLARIFYING_QUESTIONS: &str = "RESEARCH_CLARIFYING_QUESTIONS";
pub const STEP_FINAL: &str = "FINAL";

/// The two document shapes the backend sends, kept apart on purpose.
#[derive(Debug, Clone, PartialEq)]
pub enum TextPayload {
    Steps(Vec<Value>),
    Record(Object),
    Unrecognized,
}

impl TextPayload {
    pub fn parse(text: &str) -> Self {
        match json::parse(text) {
            Some(Value::Array(steps)) => TextPayload::Steps(steps),
            Some(Value::Object(record)) => TextPayload::Record(record),
            _ => TextPayload::Unrecognized,
        }
    }
}

/// Answer fields of one record, normalized. Emptiness is judged by the accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerRecord {
    pub title: Option<String>,
    pub answer: Option<String>,
    pub chunks: Vec<String>,
    pub sources: Vec<Source>,
}

impl AnswerRecord {
    pub fn from_object(o: &Object) -> Self {
        let title = o
            .non_empty_str_field("thread_title")
            .or_else(|| o.non_empty_str_field("title"))
            .map(str::to_string);
        Self {
            title,
            answer: o.str_field("answer").map(str::to_string),
            chunks: o.list_field("chunks").map(|c| json::string_list(c)).unwrap_or_default(),
            sources: normalize_sources(o),
        }
    }
}

/// Normalize the result list (`web_results`, else `sources`).
///
/// Every entry keeps its position so that `[n]` still addresses entry `n - 1`: bare strings are
/// read as URLs and unusable entries become empty sources.
pub fn normalize_sources(o: &Object) -> Vec<Source> {
    let Some(items) = o.list_field("web_results").or_else(|| o.list_field("sources")) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(r) => Source {
                title: r
                    .non_empty_str_field("name")
                    .or_else(|| r.non_empty_str_field("title"))
                    .map(str::to_string),
                snippet: r.non_empty_str_field("snippet").map(str::to_string),
                url: r.non_empty_str_field("url").map(str::to_string),
            },
            Value::String(url) if !url.trim().is_empty() => Source {
                url: Some(url.clone()),
                ..Source::default()
            },
            _ => Source::default(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// The backend needs clarification. May be empty; still terminal.
    Clarifying(Vec<String>),
    Answer(AnswerRecord),
    Nothing,
}

pub fn extract(text: &str) -> Extracted {
    match TextPayload::parse(text) {
        TextPayload::Steps(steps) => extract_from_steps(&steps),
        TextPayload::Record(record) => Extracted::Answer(AnswerRecord::from_object(&record)),
        TextPayload::Unrecognized => Extracted::Nothing,
    }
}

fn extract_from_steps(steps: &[Value]) -> Extracted {
    let mut final_record = None;
    for step in steps.iter().filter_map(Value::as_object) {
        match step.str_field("step_type") {
            Some(STEP_CLARIFYING_QUESTIONS) => {
                return Extracted::Clarifying(clarifying_questions(step.get("content")));
            }
            Some(STEP_FINAL) => {
                if let Some(record) = final_answer_object(step.get("content")) {
                    final_record = Some(AnswerRecord::from_object(&record));
                }
            }
            _ => {}
        }
    }
    final_record.map_or(Extracted::Nothing, Extracted::Answer)
}

fn clarifying_questions(content: Option<&Value>) -> Vec<String> {
    match content {
        Some(Value::Object(c)) => {
            for key in ["questions", "clarifying_questions"] {
                let listed = c.list_field(key).map(|l| json::string_list(l)).unwrap_or_default();
                if !listed.is_empty() {
                    return listed;
                }
            }
            c.values()
                .filter_map(Value::as_str)
                .filter(|s| s.contains('?'))
                .map(str::to_string)
                .collect()
        }
        Some(Value::Array(items)) => json::string_list(items),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// The record carried by a `FINAL` step. Its `answer` may itself be an encoded record.
fn final_answer_object(content: Option<&Value>) -> Option<Object> {
    let content = match content? {
        Value::Object(c) => c.clone(),
        Value::String(s) => json::parse_object(s)?,
        _ => return None,
    };
    if let Some(inner) = content.str_field("answer") {
        if inner.trim_start().starts_with('{') {
            if let Some(nested) = json::parse_object(inner) {
                return Some(nested);
            }
            tracing::debug!("FINAL answer looked like JSON but did not parse; using raw content");
        }
    }
    Some(content)
}
