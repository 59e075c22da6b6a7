use once_cell::sync::Lazy;
use pplxpipe_core::{CitationMode, Source};
use regex::{Captures, Regex};

static CITATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d{1,2})\]").expect("invalid citation regex"));

/// Render `[n]` citation markers in `text` according to `mode`.
///
/// `markdown` links a marker to `sources[n - 1].url`; a marker that is out of range or points at
/// a source without a URL stays verbatim. `clean` repeats until no marker is left, so removing
/// `[1]` from `[[1]2]` does not leave `[2]` behind.
pub fn resolve(text: &str, mode: CitationMode, sources: &[Source]) -> String {
    match mode {
        CitationMode::Default => text.to_string(),
        CitationMode::Clean => strip_markers(text),
        CitationMode::Markdown => CITATION_RE
            .replace_all(text, |caps: &Captures<'_>| {
                let whole = &caps[0];
                match source_url(&caps[1], sources) {
                    Some(url) => format!("{whole}({url})"),
                    None => whole.to_string(),
                }
            })
            .into_owned(),
    }
}

fn strip_markers(text: &str) -> String {
    let mut out = text.to_string();
    // Each pass shortens the text, so this terminates.
    while CITATION_RE.is_match(&out) {
        out = CITATION_RE.replace_all(&out, "").into_owned();
    }
    out
}

fn source_url<'a>(number: &str, sources: &'a [Source]) -> Option<&'a str> {
    let n: usize = number.parse().ok()?;
    let idx = n.checked_sub(1)?;
    sources
        .get(idx)?
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
}
