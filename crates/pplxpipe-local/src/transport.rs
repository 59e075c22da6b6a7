//! reqwest-backed `StreamTransport` for the Perplexity web UI.
//!
//! Each exchange gets one deadline. Running out of time while opening is a transport failure;
//! running out while reading simply ends the byte stream so whatever arrived is still folded.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use pplxpipe_core::{ByteStream, Error, Result, StreamRequest, StreamTransport};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_BASE_URL: &str = "https://www.perplexity.ai";
pub const INIT_PATH: &str = "/search/new";
pub const SESSION_COOKIE: &str = "__Secure-next-auth.session-token";
pub const DEFAULT_TIMEOUT_MS: u64 = 90_000;
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 600_000;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn session_token_from_env() -> Option<String> {
    env("PPLXPIPE_SESSION_TOKEN").or_else(|| env("PERPLEXITY_SESSION_TOKEN"))
}

pub fn base_url_from_env() -> String {
    env("PPLXPIPE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Exchange deadline from milliseconds, clamped to `MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS`.
pub fn clamp_timeout(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS))
}

pub fn timeout_from_env() -> Duration {
    clamp_timeout(
        env("PPLXPIPE_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS),
    )
}

#[derive(Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub session_token: String,
    /// Deadline for one whole exchange (init + ask + streaming).
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session_token: session_token.into(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self> {
        let token = session_token_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing PPLXPIPE_SESSION_TOKEN (or PERPLEXITY_SESSION_TOKEN)".to_string(),
            )
        })?;
        Ok(Self::new(base_url_from_env(), token).with_timeout(timeout_from_env()))
    }
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the session token.
        f.debug_struct("TransportConfig")
            .field("base_url", &self.base_url)
            .field("session_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct WebUiTransport {
    client: reqwest::Client,
    config: TransportConfig,
    headers: HeaderMap,
}

impl WebUiTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        let headers = Self::browser_headers(&config)?;
        Ok(Self {
            client,
            config,
            headers,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(TransportConfig::from_env()?)
    }

    fn browser_headers(config: &TransportConfig) -> Result<HeaderMap> {
        let base = config.base_url.trim_end_matches('/');
        let value = |v: String| {
            HeaderValue::from_str(&v)
                .map_err(|_| Error::NotConfigured("header value has invalid characters".to_string()))
        };
        let mut h = HeaderMap::new();
        h.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream, application/json"),
        );
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h.insert(header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        h.insert(header::ORIGIN, value(base.to_string())?);
        h.insert(header::REFERER, value(format!("{base}/"))?);
        let mut cookie = value(format!("{SESSION_COOKIE}={}", config.session_token))?;
        cookie.set_sensitive(true);
        h.insert(header::COOKIE, cookie);
        Ok(h)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn apply_extra_headers(
        mut rb: reqwest::RequestBuilder,
        headers: &BTreeMap<String, String>,
    ) -> reqwest::RequestBuilder {
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                // The session cookie is owned by the transport.
                if name == header::COOKIE {
                    continue;
                }
                rb = rb.header(name, value);
            }
        }
        rb
    }

    async fn send_before(
        rb: reqwest::RequestBuilder,
        deadline: Instant,
        what: &str,
    ) -> Result<reqwest::Response> {
        let resp = tokio::time::timeout_at(deadline, rb.send())
            .await
            .map_err(|_| Error::Transport(format!("{what} request timed out")))?
            .map_err(|e| Error::Transport(format!("{what} request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "{what} request failed ({})",
                status.as_u16()
            )));
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl StreamTransport for WebUiTransport {
    async fn open(&self, req: &StreamRequest) -> Result<ByteStream> {
        let deadline = Instant::now() + self.config.timeout;

        // The web UI expects the thread to be opened from the search page first.
        let init = self
            .client
            .get(self.url(INIT_PATH))
            .headers(self.headers.clone())
            .query(&[("q", req.query.as_str())]);
        Self::send_before(init, deadline, "init").await?;
        tracing::debug!("init request ok");

        let method = reqwest::Method::from_bytes(req.method.as_bytes())
            .map_err(|_| Error::InvalidRequest(format!("bad method {:?}", req.method)))?;
        let ask = self
            .client
            .request(method, self.url(&req.path))
            .headers(self.headers.clone());
        let ask = Self::apply_extra_headers(ask, &req.headers).json(&req.body);
        let resp = Self::send_before(ask, deadline, "ask").await?;
        tracing::info!(status = resp.status().as_u16(), "ask stream opened");

        Ok(until_deadline(resp.bytes_stream().boxed(), deadline))
    }
}

/// Forward body chunks until the stream ends or `deadline` passes (which also just ends it).
fn until_deadline(
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    deadline: Instant,
) -> ByteStream {
    stream::unfold(Some(body), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout_at(deadline, body.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(e))) => Some((Err(Error::Transport(e.to_string())), None)),
            Ok(None) => None,
            Err(_) => {
                tracing::warn!("exchange deadline reached; ending stream with partial data");
                None
            }
        }
    })
    .boxed()
}
