use anyhow::Result;
use clap::{Parser, Subcommand};
use pplxpipe_core::{
    CitationMode, Error, ModelPreset, QueryRequest, SearchFocus, SourceFocus, TimeRange,
};
use pplxpipe_local::{selftest, transport, TransportConfig, WebUiClient, WebUiTransport};
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod envelope;

#[derive(Parser, Debug)]
#[command(name = "pplxpipe")]
#[command(about = "Ask the Perplexity web UI and get a citation-resolved answer (json)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one exchange and print the result.
    Ask(AskCmd),
    /// Probe regular search and deep research with fixed queries.
    SelfTest(SelfTestCmd),
    /// Diagnose configuration (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct AskCmd {
    /// Free-text query.
    query: String,
    /// Model preset (best, deep_research, labs, sonar, gpt5, claude_sonnet, gemini_pro, grok).
    #[arg(long, default_value = "best")]
    model: String,
    /// Source focus; comma-separated subset of web,academic,social,finance.
    #[arg(long, default_value = "web", value_delimiter = ',')]
    source_focus: Vec<String>,
    /// Search focus: web|writing
    #[arg(long, default_value = "web")]
    search_focus: String,
    /// Recency filter: all|today|week|month|year
    #[arg(long, default_value = "all")]
    time_range: String,
    #[arg(long, default_value = "en-US")]
    language: String,
    /// Citation rendering: default|markdown|clean
    #[arg(long, default_value = "clean")]
    citation_mode: String,
    /// Save the thread to the account library (otherwise incognito).
    #[arg(long, action = clap::ArgAction::SetTrue)]
    save_to_library: bool,
    /// Continue a previous thread (`conversation_id` from an earlier result).
    #[arg(long)]
    conversation_id: Option<String>,
    /// Continuation token from the same earlier result.
    #[arg(long)]
    continuation_token: Option<String>,
    /// Exchange deadline in ms, clamped to 1000..=600000 (default: PPLXPIPE_TIMEOUT_MS or 90000).
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

impl AskCmd {
    fn to_query(&self) -> QueryRequest {
        QueryRequest {
            query: self.query.clone(),
            model: ModelPreset::from_name(&self.model),
            source_focus: self
                .source_focus
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(SourceFocus::from_name)
                .collect(),
            search_focus: SearchFocus::from_name(&self.search_focus),
            time_range: TimeRange::from_name(&self.time_range),
            language: self.language.clone(),
            citation_mode: CitationMode::from_name(&self.citation_mode),
            save_to_library: self.save_to_library,
            conversation_id: self.conversation_id.clone(),
            continuation_token: self.continuation_token.clone(),
        }
    }
}

#[derive(clap::Args, Debug)]
struct SelfTestCmd {
    /// Per-probe deadline in ms, clamped to 1000..=600000 (default: PPLXPIPE_TIMEOUT_MS or 90000).
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Opt-in `KEY=VALUE` loader. Existing process env always wins; values are never logged.
///
/// Runs before tracing is installed (the file may set `RUST_LOG`), so an unreadable path is
/// returned for the caller to report.
fn load_env_file() -> Option<String> {
    let p = std::env::var("PPLXPIPE_ENV_FILE").ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return Some(p.to_string());
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
    None
}

fn init_tracing() {
    // stderr only: stdout carries the JSON output.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init();
}

fn client_with_timeout(timeout_ms: Option<u64>) -> pplxpipe_core::Result<WebUiClient<WebUiTransport>> {
    let mut cfg = TransportConfig::from_env()?;
    if let Some(ms) = timeout_ms {
        cfg = cfg.with_timeout(transport::clamp_timeout(ms));
    }
    Ok(WebUiClient::new(WebUiTransport::new(cfg)?))
}

async fn run_ask(args: AskCmd) -> ExitCode {
    let q = args.to_query();
    let outcome = match client_with_timeout(args.timeout_ms) {
        Ok(client) => client.execute(&q).await,
        Err(e) => Err(e),
    };
    let text_output = args.output.eq_ignore_ascii_case("text");
    match outcome {
        Ok(r) => {
            if text_output {
                print!("{}", envelope::text(&r));
            } else {
                println!("{}", envelope::ok("ask", &r));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure("ask", &e, text_output);
            ExitCode::FAILURE
        }
    }
}

fn report_failure(kind: &str, e: &Error, text_output: bool) {
    if !text_output {
        println!("{}", envelope::err(kind, e));
        return;
    }
    eprintln!("pplxpipe: {e}");
    if let Some(qs) = e.questions() {
        for q in qs {
            eprintln!("  - {q}");
        }
    }
    if let Some(h) = envelope::error_hint(e.code()) {
        eprintln!("hint: {h}");
    }
}

async fn run_self_test(args: SelfTestCmd) -> ExitCode {
    let client = match client_with_timeout(args.timeout_ms) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("pplxpipe: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Running Perplexity WebUI self-test...");
    let reports = selftest::run_self_test(&client).await;
    for r in &reports {
        if r.ok {
            println!("PASS {}: {}", r.name, r.detail);
        } else {
            eprintln!("FAIL {}: {}", r.name, r.detail);
        }
    }
    if selftest::all_passed(&reports) {
        println!("Self-test passed. Both regular search and deep research are reachable.");
        ExitCode::SUCCESS
    } else {
        eprintln!("Self-test failed. Check token validity and Perplexity availability.");
        ExitCode::FAILURE
    }
}

fn run_doctor(args: DoctorCmd) {
    fn has_env(k: &str) -> bool {
        std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
    }

    // Env presence only; never print values.
    let token_configured = transport::session_token_from_env().is_some();
    let v = serde_json::json!({
        "schema_version": envelope::SCHEMA_VERSION,
        "kind": "doctor",
        "ok": true,
        "name": "pplxpipe",
        "version": env!("CARGO_PKG_VERSION"),
        "configured": {
            "session_token": token_configured,
            "base_url_override": has_env("PPLXPIPE_BASE_URL"),
            "env_file": has_env("PPLXPIPE_ENV_FILE"),
        },
        "base_url": transport::base_url_from_env(),
        "timeout_ms": transport::timeout_from_env().as_millis() as u64,
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("pplxpipe {}", env!("CARGO_PKG_VERSION"));
            println!("session_token: {}", if token_configured { "set" } else { "missing" });
            println!("base_url: {}", v["base_url"].as_str().unwrap_or_default());
            println!("timeout_ms: {}", v["timeout_ms"]);
        }
        _ => println!("{v}"),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let unreadable_env_file = load_env_file();
    init_tracing();
    if let Some(path) = unreadable_env_file {
        tracing::warn!(path = %path, "PPLXPIPE_ENV_FILE could not be read");
    }

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Ask(args) => run_ask(args).await,
        Commands::SelfTest(args) => run_self_test(args).await,
        Commands::Doctor(args) => {
            run_doctor(args);
            ExitCode::SUCCESS
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": envelope::SCHEMA_VERSION,
                "kind": "version",
                "ok": true,
                "name": "pplxpipe",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("pplxpipe {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
            ExitCode::SUCCESS
        }
    };
    Ok(code)
}
