use pplxpipe_core::{AskResult, Error};
use serde_json::{json, Value};

pub(crate) const SCHEMA_VERSION: u64 = 1;

pub(crate) fn error_hint(code: &str) -> Option<&'static str> {
    match code {
        "not_configured" => Some(
            "Set PPLXPIPE_SESSION_TOKEN (or PERPLEXITY_SESSION_TOKEN) to the value of the __Secure-next-auth.session-token cookie.",
        ),
        "clarifying_questions" => Some(
            "The backend needs a narrower query. Answer the questions and ask again, optionally passing the returned conversation_id/continuation_token.",
        ),
        "empty_answer" => Some(
            "The stream ended without answer text (possibly at the deadline). Retry, or raise PPLXPIPE_TIMEOUT_MS / --timeout-ms.",
        ),
        "transport" => Some(
            "Opening or reading the stream failed. A 401/403 usually means the session token expired.",
        ),
        "invalid_request" => Some("Pass a non-empty query."),
        _ => None,
    }
}

pub(crate) fn ok(kind: &str, result: &AskResult) -> Value {
    json!({
        "schema_version": SCHEMA_VERSION,
        "kind": kind,
        "ok": true,
        "result": result,
    })
}

pub(crate) fn err(kind: &str, e: &Error) -> Value {
    let mut error = json!({
        "code": e.code(),
        "message": e.to_string(),
    });
    if let Some(q) = e.questions() {
        error["questions"] = json!(q);
    }
    if let Some(h) = error_hint(e.code()) {
        error["hint"] = json!(h);
    }
    json!({
        "schema_version": SCHEMA_VERSION,
        "kind": kind,
        "ok": false,
        "error": error,
    })
}

/// Plain-text rendering of a result: answer, then numbered sources.
pub(crate) fn text(result: &AskResult) -> String {
    let mut out = String::new();
    if let Some(t) = &result.title {
        out.push_str(&format!("# {t}\n\n"));
    }
    out.push_str(result.answer.trim_end());
    out.push('\n');
    if !result.sources.is_empty() {
        out.push_str("\nSources:\n");
        for (i, s) in result.sources.iter().enumerate() {
            let title = s.title.as_deref().unwrap_or("(untitled)");
            match s.url.as_deref() {
                Some(u) => out.push_str(&format!("[{}] {title} <{u}>\n", i + 1)),
                None => out.push_str(&format!("[{}] {title}\n", i + 1)),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pplxpipe_core::Source;

    #[test]
    fn clarifying_error_carries_questions_and_hint() {
        let v = err(
            "ask",
            &Error::ClarifyingQuestions {
                questions: vec!["Which year?".to_string()],
            },
        );
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["code"], "clarifying_questions");
        assert_eq!(v["error"]["questions"], json!(["Which year?"]));
        assert!(v["error"]["hint"].is_string());
    }

    #[test]
    fn other_errors_have_no_questions() {
        let v = err("ask", &Error::EmptyAnswer { frames: 2 });
        assert_eq!(v["error"]["code"], "empty_answer");
        assert!(v["error"].get("questions").is_none());
    }

    #[test]
    fn text_lists_sources_by_citation_number() {
        let r = AskResult {
            title: Some("Capital".to_string()),
            answer: "Paris.".to_string(),
            chunks: vec![],
            sources: vec![
                Source {
                    title: Some("Wiki".to_string()),
                    snippet: None,
                    url: Some("https://w".to_string()),
                },
                Source::default(),
            ],
            conversation_id: None,
            continuation_token: None,
        };
        let t = text(&r);
        assert!(t.starts_with("# Capital\n\nParis.\n"));
        assert!(t.contains("[1] Wiki <https://w>\n"));
        assert!(t.contains("[2] (untitled)\n"));
    }
}
