use crate::accumulator::{self, Accumulator};
use crate::frame;
use crate::payload;
use crate::transport::WebUiTransport;
use pplxpipe_core::{AskProvider, AskResult, QueryRequest, Result, StreamTransport};
use std::time::Instant;

/// Runs one exchange per call: build payload, open stream, decode, fold.
#[derive(Debug, Clone)]
pub struct WebUiClient<T> {
    transport: T,
}

impl WebUiClient<WebUiTransport> {
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(WebUiTransport::from_env()?))
    }
}

impl<T: StreamTransport> WebUiClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn execute(&self, q: &QueryRequest) -> Result<AskResult> {
        let req = payload::build_stream_request(q)?;
        let t0 = Instant::now();
        tracing::info!(
            model = %q.model,
            follow_up = q.is_follow_up(),
            citation_mode = %q.citation_mode,
            "starting exchange"
        );
        let bytes = self.transport.open(&req).await?;
        let result = accumulator::fold_frames(frame::decode_frames(bytes), Accumulator::new(q)).await;
        match &result {
            Ok(r) => tracing::info!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                answer_chars = r.answer.len(),
                sources = r.sources.len(),
                "exchange complete"
            ),
            Err(e) => tracing::info!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                code = e.code(),
                "exchange failed"
            ),
        }
        result
    }
}

#[async_trait::async_trait]
impl<T: StreamTransport> AskProvider for WebUiClient<T> {
    fn name(&self) -> &'static str {
        "perplexity_webui"
    }

    async fn execute(&self, q: &QueryRequest) -> Result<AskResult> {
        WebUiClient::execute(self, q).await
    }
}
