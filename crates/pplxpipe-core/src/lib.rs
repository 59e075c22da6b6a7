use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The backend wants the query narrowed down before it will answer.
    #[error("clarifying questions required ({} question(s))", .questions.len())]
    ClarifyingQuestions { questions: Vec<String> },
    /// The stream ended without ever producing answer text. `frames` counts the decoded frames.
    #[error("{}", empty_answer_message(.frames))]
    EmptyAnswer { frames: usize },
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Stable machine-readable code (safe to branch on; messages are not).
    pub fn code(&self) -> &'static str {
        match self {
            Error::ClarifyingQuestions { .. } => "clarifying_questions",
            Error::EmptyAnswer { .. } => "empty_answer",
            Error::Transport(_) => "transport",
            Error::NotConfigured(_) => "not_configured",
            Error::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn questions(&self) -> Option<&[String]> {
        match self {
            Error::ClarifyingQuestions { questions } => Some(questions),
            _ => None,
        }
    }
}

fn empty_answer_message(frames: &usize) -> &'static str {
    if *frames == 0 {
        "no SSE events returned"
    } else {
        "no answer text detected in stream"
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Closed option sets that parse leniently: unknown names fall back to `Default`.
macro_rules! lenient_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
        default = $default:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            /// Strict parse (case-insensitive, surrounding whitespace ignored).
            pub fn parse(s: &str) -> Option<Self> {
                let s = s.trim().to_ascii_lowercase();
                match s.as_str() {
                    $( $text => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Lenient parse: unknown names map to the default entry.
            pub fn from_name(s: &str) -> Self {
                Self::parse(s).unwrap_or_else(|| {
                    tracing::warn!(
                        kind = stringify!($name),
                        value = s,
                        fallback = $name::$default.as_str(),
                        "unknown option value; using default"
                    );
                    $name::$default
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from_name(&s)
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.as_str().to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

lenient_enum! {
    /// Model preset; each maps to a backend model identifier and mode.
    pub enum ModelPreset {
        Best => "best",
        DeepResearch => "deep_research",
        Labs => "labs",
        Sonar => "sonar",
        Gpt5 => "gpt5",
        ClaudeSonnet => "claude_sonnet",
        GeminiPro => "gemini_pro",
        Grok => "grok",
    }
    default = Best;
}

lenient_enum! {
    pub enum SourceFocus {
        Web => "web",
        Academic => "academic",
        Social => "social",
        Finance => "finance",
    }
    default = Web;
}

lenient_enum! {
    pub enum SearchFocus {
        Web => "web",
        Writing => "writing",
    }
    default = Web;
}

lenient_enum! {
    pub enum TimeRange {
        All => "all",
        Today => "today",
        Week => "week",
        Month => "month",
        Year => "year",
    }
    default = All;
}

lenient_enum! {
    /// How inline `[n]` citation markers are rendered in answer text.
    pub enum CitationMode {
        /// Pass text through unchanged.
        Default => "default",
        /// Rewrite markers as markdown links to the cited source.
        Markdown => "markdown",
        /// Delete markers.
        Clean => "clean",
    }
    default = Clean;
}

fn default_source_focus() -> Vec<SourceFocus> {
    vec![SourceFocus::Web]
}

fn default_language() -> String {
    "en-US".to_string()
}

/// Caller intent for one exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub model: ModelPreset,
    #[serde(default = "default_source_focus")]
    pub source_focus: Vec<SourceFocus>,
    #[serde(default)]
    pub search_focus: SearchFocus,
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub citation_mode: CitationMode,
    /// Persist the thread in the account library. `false` means incognito.
    #[serde(default)]
    pub save_to_library: bool,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            model: ModelPreset::default(),
            source_focus: default_source_focus(),
            search_focus: SearchFocus::default(),
            time_range: TimeRange::default(),
            language: default_language(),
            citation_mode: CitationMode::default(),
            save_to_library: false,
            conversation_id: None,
            continuation_token: None,
        }
    }

    /// Conversation identifier, if one was supplied and is non-blank.
    pub fn conversation_id(&self) -> Option<&str> {
        non_blank(self.conversation_id.as_deref())
    }

    /// Continuation token; only meaningful alongside a conversation identifier.
    pub fn continuation_token(&self) -> Option<&str> {
        self.conversation_id()?;
        non_blank(self.continuation_token.as_deref())
    }

    pub fn is_follow_up(&self) -> bool {
        self.conversation_id().is_some()
    }

    /// Source focus with duplicates removed (first occurrence wins); empty means `{web}`.
    pub fn source_focus(&self) -> Vec<SourceFocus> {
        let mut out: Vec<SourceFocus> = Vec::new();
        for s in &self.source_focus {
            if !out.contains(s) {
                out.push(*s);
            }
        }
        if out.is_empty() {
            out = default_source_focus();
        }
        out
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::InvalidRequest("query must not be empty".to_string()));
        }
        Ok(())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

/// One retrieved reference. Citation `[n]` points at index `n - 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub url: Option<String>,
}

/// Final, citation-resolved outcome of one exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResult {
    pub title: Option<String>,
    pub answer: String,
    pub chunks: Vec<String>,
    pub sources: Vec<Source>,
    pub conversation_id: Option<String>,
    pub continuation_token: Option<String>,
}

/// A streaming request as handed to a transport.
///
/// `path` is relative to the transport's base URL; the transport supplies the host and any
/// session/auth headers. `query` is the caller's free text (transports may use it for warm-up).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
    pub query: String,
}

pub type ByteStream = futures_util::stream::BoxStream<'static, Result<bytes::Bytes>>;

/// "Open a streaming request" capability. Errors here (and items of the returned stream) are
/// transport failures; a transport that hits its deadline should simply end the stream.
#[async_trait::async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, req: &StreamRequest) -> Result<ByteStream>;
}

#[async_trait::async_trait]
pub trait AskProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, q: &QueryRequest) -> Result<AskResult>;
}
