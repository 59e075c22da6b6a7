//! Folding decoded events into a single answer.
//!
//! State only moves forward: identifiers and the title are last-writer-wins over non-empty values,
//! while `answer`, `chunks` and `sources` are replaced wholesale by later non-empty updates (never
//! merged). Citations are resolved against the source list current at the time of the update.

use crate::answer::{self, AnswerRecord, Extracted};
use crate::citations;
use crate::event::RawEvent;
use crate::frame::Frame;
use futures_util::{Stream, StreamExt};
use pplxpipe_core::{AskResult, CitationMode, Error, QueryRequest, Result, Source};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    pub title: Option<String>,
    pub conversation_id: Option<String>,
    pub continuation_token: Option<String>,
    pub answer: Option<String>,
    pub chunks: Vec<String>,
    pub sources: Vec<Source>,
}

impl StreamState {
    /// Empty state, seeded with the caller's continuation pair (if any).
    pub fn seeded(q: &QueryRequest) -> Self {
        Self {
            conversation_id: q.conversation_id().map(str::to_string),
            continuation_token: q.continuation_token().map(str::to_string),
            ..Self::default()
        }
    }
}

fn set_if_non_empty(slot: &mut Option<String>, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
        *slot = Some(v.to_string());
    }
}

#[derive(Debug)]
pub struct Accumulator {
    state: StreamState,
    mode: CitationMode,
    events: usize,
}

impl Accumulator {
    pub fn new(q: &QueryRequest) -> Self {
        Self {
            state: StreamState::seeded(q),
            mode: q.citation_mode,
            events: 0,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn events_seen(&self) -> usize {
        self.events
    }

    pub fn apply_frame(&mut self, frame: &Frame) -> Result<()> {
        self.apply(&RawEvent::from_frame(frame))
    }

    /// Fold one event. Fails (and must not be fed further) on a clarifying-questions signal.
    pub fn apply(&mut self, ev: &RawEvent) -> Result<()> {
        self.events += 1;
        let st = &mut self.state;
        set_if_non_empty(&mut st.conversation_id, ev.conversation_id.as_deref());
        set_if_non_empty(&mut st.continuation_token, ev.continuation_token.as_deref());
        set_if_non_empty(&mut st.title, ev.title.as_deref());

        let Some(text) = ev.text.as_deref() else {
            return Ok(());
        };
        match answer::extract(text) {
            Extracted::Clarifying(questions) => {
                tracing::info!(
                    event = self.events,
                    questions = questions.len(),
                    "backend requested clarification"
                );
                Err(Error::ClarifyingQuestions { questions })
            }
            Extracted::Answer(record) => {
                self.apply_record(record);
                Ok(())
            }
            Extracted::Nothing => Ok(()),
        }
    }

    fn apply_record(&mut self, record: AnswerRecord) {
        let mode = self.mode;
        let st = &mut self.state;
        set_if_non_empty(&mut st.title, record.title.as_deref());
        if !record.sources.is_empty() {
            st.sources = record.sources;
        }
        if let Some(a) = record.answer.as_deref().filter(|a| !a.trim().is_empty()) {
            st.answer = Some(citations::resolve(a, mode, &st.sources));
        }
        if !record.chunks.is_empty() {
            st.chunks = record
                .chunks
                .iter()
                .map(|c| citations::resolve(c, mode, &st.sources))
                .collect();
        }
        tracing::debug!(
            event = self.events,
            answer_chars = st.answer.as_ref().map_or(0, |a| a.len()),
            chunks = st.chunks.len(),
            sources = st.sources.len(),
            "applied answer record"
        );
    }

    /// Build the final result from the terminal state.
    pub fn finish(self) -> Result<AskResult> {
        let frames = self.events;
        let StreamState {
            title,
            conversation_id,
            continuation_token,
            answer,
            chunks,
            sources,
        } = self.state;
        let answer = match answer {
            Some(a) => a,
            None => chunks.last().cloned().ok_or(Error::EmptyAnswer { frames })?,
        };
        Ok(AskResult {
            title,
            answer,
            chunks,
            sources,
            conversation_id,
            continuation_token,
        })
    }
}

/// Drive `frames` through `acc` until the stream ends or a terminal condition is hit.
///
/// On a clarifying-questions signal or a transport error no further frames are pulled.
pub async fn fold_frames<S>(mut frames: S, mut acc: Accumulator) -> Result<AskResult>
where
    S: Stream<Item = Result<Frame>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        acc.apply_frame(&frame?)?;
    }
    tracing::debug!(events = acc.events_seen(), "stream consumed; finalizing");
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn frame(v: serde_json::Value) -> Frame {
        v.as_object().cloned().unwrap()
    }

    fn text_event(doc: serde_json::Value) -> RawEvent {
        RawEvent {
            text: Some(doc.to_string()),
            ..RawEvent::default()
        }
    }

    fn query(mode: CitationMode) -> QueryRequest {
        let mut q = QueryRequest::new("q");
        q.citation_mode = mode;
        q
    }

    #[tokio::test]
    async fn direct_answer_scenario() {
        let frames = vec![
            frame(json!({"text": r#"{"answer":"Paris is the capital.","web_results":[{"name":"Wiki","url":"https://en.wikipedia.org/Paris"}]}"#})),
            frame(json!({"status": "COMPLETED", "final": true})),
        ];
        let out = fold_frames(
            stream::iter(frames.into_iter().map(Ok)),
            Accumulator::new(&query(CitationMode::Clean)),
        )
        .await
        .unwrap();
        assert_eq!(out.answer, "Paris is the capital.");
        assert_eq!(
            out.sources,
            vec![Source {
                title: Some("Wiki".to_string()),
                snippet: None,
                url: Some("https://en.wikipedia.org/Paris".to_string()),
            }]
        );
    }

    #[test]
    fn identifiers_are_last_writer_wins_and_never_cleared() {
        let mut q = query(CitationMode::Clean);
        q.conversation_id = Some("seed-uuid".to_string());
        q.continuation_token = Some("seed-token".to_string());
        let mut acc = Accumulator::new(&q);
        assert_eq!(acc.state().conversation_id.as_deref(), Some("seed-uuid"));

        acc.apply(&RawEvent {
            conversation_id: Some("uuid-2".to_string()),
            title: Some("First".to_string()),
            ..RawEvent::default()
        })
        .unwrap();
        acc.apply(&RawEvent {
            conversation_id: Some("".to_string()),
            continuation_token: Some("  ".to_string()),
            title: None,
            text: None,
        })
        .unwrap();
        let st = acc.state();
        assert_eq!(st.conversation_id.as_deref(), Some("uuid-2"));
        assert_eq!(st.continuation_token.as_deref(), Some("seed-token"));
        assert_eq!(st.title.as_deref(), Some("First"));
    }

    #[test]
    fn later_empty_updates_do_not_revert_answer_or_sources() {
        let mut acc = Accumulator::new(&query(CitationMode::Markdown));
        acc.apply(&text_event(json!({
            "answer": "A[1]",
            "chunks": ["A", "A[1]"],
            "web_results": [{"url": "https://a"}]
        })))
        .unwrap();
        acc.apply(&text_event(json!({"answer": "", "chunks": [], "web_results": []})))
            .unwrap();
        acc.apply(&text_event(json!({"answer": "   "}))).unwrap();
        let st = acc.state();
        assert_eq!(st.answer.as_deref(), Some("A[1](https://a)"));
        assert_eq!(st.chunks, vec!["A".to_string(), "A[1](https://a)".to_string()]);
        assert_eq!(st.sources.len(), 1);
    }

    #[test]
    fn chunks_and_sources_are_replaced_not_merged() {
        let mut acc = Accumulator::new(&query(CitationMode::Markdown));
        acc.apply(&text_event(json!({
            "chunks": ["one[1]", "two[2]"],
            "web_results": [{"url": "https://1"}, {"url": "https://2"}]
        })))
        .unwrap();
        acc.apply(&text_event(json!({
            "chunks": ["three[2]"],
            "web_results": [{"url": "https://new-1"}]
        })))
        .unwrap();
        let st = acc.state();
        assert_eq!(st.sources.len(), 1);
        // [2] is now out of range against the current list.
        assert_eq!(st.chunks, vec!["three[2]".to_string()]);
    }

    #[test]
    fn answer_citations_resolve_against_sources_from_the_same_record() {
        let mut acc = Accumulator::new(&query(CitationMode::Markdown));
        acc.apply(&text_event(json!({"web_results": [{"url": "https://old"}]})))
            .unwrap();
        acc.apply(&text_event(json!({
            "answer": "X[1]",
            "web_results": [{"url": "https://new"}]
        })))
        .unwrap();
        assert_eq!(acc.state().answer.as_deref(), Some("X[1](https://new)"));
    }

    #[test]
    fn record_title_overrides_event_title() {
        let mut acc = Accumulator::new(&query(CitationMode::Clean));
        acc.apply(&RawEvent {
            title: Some("event title".to_string()),
            text: Some(json!({"title": "record title"}).to_string()),
            ..RawEvent::default()
        })
        .unwrap();
        assert_eq!(acc.state().title.as_deref(), Some("record title"));
    }

    #[test]
    fn final_answer_falls_back_to_last_chunk() {
        let mut acc = Accumulator::new(&query(CitationMode::Clean));
        acc.apply(&text_event(json!({"chunks": ["partial", "complete[1]"]})))
            .unwrap();
        let out = acc.finish().unwrap();
        assert_eq!(out.answer, "complete");
        assert_eq!(out.chunks.len(), 2);
    }

    #[test]
    fn no_answer_and_no_chunks_is_empty_answer() {
        let mut acc = Accumulator::new(&query(CitationMode::Clean));
        acc.apply(&RawEvent {
            conversation_id: Some("u".to_string()),
            text: Some("not json".to_string()),
            ..RawEvent::default()
        })
        .unwrap();
        assert!(matches!(acc.finish(), Err(Error::EmptyAnswer { frames: 1 })));
    }

    #[tokio::test]
    async fn empty_stream_is_empty_answer() {
        let frames = stream::iter(Vec::<Result<Frame>>::new());
        let err = fold_frames(frames, Accumulator::new(&query(CitationMode::Clean)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "empty_answer");
        assert_eq!(err.to_string(), "no SSE events returned");
    }

    #[tokio::test]
    async fn clarifying_questions_stop_consumption() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let frames = vec![
            frame(json!({"backend_uuid": "u-1"})),
            frame(json!({"text": r#"[{"step_type":"RESEARCH_CLARIFYING_QUESTIONS","content":{"questions":["Which year?"]}}]"#})),
            frame(json!({"text": r#"{"answer":"should never be read"}"#})),
            frame(json!({"text": r#"{"answer":"nor this"}"#})),
        ];
        let counter = pulled.clone();
        let frames = stream::iter(frames).map(move |f| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(f)
        });
        let err = fold_frames(frames, Accumulator::new(&query(CitationMode::Clean)))
            .await
            .unwrap_err();
        assert_eq!(err.questions(), Some(&["Which year?".to_string()][..]));
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_clarifying_list_still_aborts() {
        let mut acc = Accumulator::new(&query(CitationMode::Clean));
        acc.apply(&text_event(json!({"answer": "earlier answer"}))).unwrap();
        let err = acc
            .apply(&text_event(json!([
                {"step_type": "RESEARCH_CLARIFYING_QUESTIONS", "content": {}}
            ])))
            .unwrap_err();
        assert!(matches!(err, Error::ClarifyingQuestions { ref questions } if questions.is_empty()));
    }

    #[tokio::test]
    async fn transport_error_mid_stream_propagates() {
        let frames = stream::iter(vec![
            Ok(frame(json!({"text": r#"{"answer":"partial"}"#}))),
            Err(Error::Transport("connection reset".to_string())),
        ]);
        let err = fold_frames(frames, Accumulator::new(&query(CitationMode::Clean)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "transport");
    }

    #[test]
    fn deep_research_final_step_is_accumulated() {
        let nested = json!({
            "answer": "Qubits[1] superpose.",
            "web_results": [{"name": "Q", "url": "https://q"}]
        })
        .to_string();
        let mut acc = Accumulator::new(&query(CitationMode::Markdown));
        acc.apply(&RawEvent {
            conversation_id: Some("b".to_string()),
            continuation_token: Some("rw".to_string()),
            title: Some("Quantum".to_string()),
            text: Some(
                json!([
                    {"step_type": "SEARCH_WEB", "content": {}},
                    {"step_type": "FINAL", "content": {"answer": nested}}
                ])
                .to_string(),
            ),
        })
        .unwrap();
        let out = acc.finish().unwrap();
        assert_eq!(out.answer, "Qubits[1](https://q) superpose.");
        assert_eq!(out.title.as_deref(), Some("Quantum"));
        assert_eq!(out.conversation_id.as_deref(), Some("b"));
        assert_eq!(out.continuation_token.as_deref(), Some("rw"));
    }
}
