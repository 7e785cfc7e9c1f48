//! Command-line interface for intel-rs
//!
//! # Usage
//!
//! ```bash
//! # Pipeline and assistant models
//! export GROQ_API_KEY="..."
//!
//! # Data providers (any subset; missing keys disable that provider)
//! export TAVILY_API_KEY="..."
//! export NEWSDATA_API_KEY="..."
//! export FIRECRAWL_API_KEY="..."
//!
//! intel analyze "AI trends in healthcare" --domain Healthcare --follow-up
//! intel ask "What is driving telehealth adoption?"
//! ```
//!
//! Finished analyses are persisted to `intel_sessions.json` (override with
//! `INTEL_DATA_FILE`); `ask` reopens them to ground its answers.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use intel_assistant::AssistantSession;
use intel_core::{IntelConfig, RetryPolicy, SessionStatus};
use intel_llm::{GroqConfig, GroqProvider};
use intel_sources::{
    DataProvider, DataSourceAggregator, NewsFeedProvider, ResponseCache, WebScrapeProvider,
    WebSearchProvider,
};
use intel_store::{
    ContextRetriever, HashEmbedder, JsonFileSessionStore, RetrievalScope, SessionFilter,
    SessionStorage,
};
use intel_workflow::{StageExecutor, WorkflowEvent, WorkflowOrchestrator, WorkflowState};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

const NEWS_RATE_LIMIT_PER_MINUTE: u32 = 30;
const DEFAULT_DATA_FILE: &str = "intel_sessions.json";

#[derive(Parser, Debug)]
#[command(name = "intel")]
#[command(about = "Market intelligence pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full analysis pipeline for a query
    Analyze {
        /// The research question
        query: String,

        /// Target market domain, e.g. "Healthcare"
        #[arg(long)]
        domain: String,

        /// Drop into a question-and-answer loop after the report
        #[arg(long)]
        follow_up: bool,
    },

    /// Ask a one-off question without running the pipeline
    Ask {
        /// The question
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    intel_utils::init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze {
            query,
            domain,
            follow_up,
        } => analyze(&query, &domain, follow_up).await,
        Command::Ask { question } => ask(&question).await,
    }
}

async fn analyze(query: &str, domain: &str, follow_up: bool) -> anyhow::Result<()> {
    let config = IntelConfig::default();
    let completions = completion_provider(&config)?;
    let providers = build_providers(&config)?;

    let aggregator = Arc::new(DataSourceAggregator::new(
        providers,
        config.provider_timeout,
        RetryPolicy {
            max_retries: config.max_retries,
            initial_backoff: config.retry_backoff_base,
            ..RetryPolicy::default()
        },
    ));
    let executor = StageExecutor::new(completions.clone(), config.clone());
    let store = Arc::new(JsonFileSessionStore::open(data_path())?);
    let retriever = Arc::new(ContextRetriever::new(
        Arc::new(HashEmbedder::default()),
        config.fragment_chunk_size,
        config.similarity_threshold,
    ));

    let orchestrator = WorkflowOrchestrator::new(
        aggregator,
        executor,
        store,
        retriever.clone(),
        config.clone(),
    );

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let done = matches!(
                event,
                WorkflowEvent::Completed { .. }
                    | WorkflowEvent::PartiallyCompleted { .. }
                    | WorkflowEvent::Failed { .. }
            );
            print_event(&event);
            if done {
                break;
            }
        }
    });

    let session = orchestrator.run(query, domain).await?;
    let _ = printer.await;

    match WorkflowOrchestrator::state_of(&session) {
        WorkflowState::Complete | WorkflowState::PartiallyComplete => {
            if let Some(report) = &session.report {
                println!("\n{report}");
            }
        }
        _ => {
            let reason = session
                .failure_reason
                .unwrap_or_else(|| "unknown".to_string());
            bail!("analysis failed: {reason}");
        }
    }

    if follow_up {
        let assistant = AssistantSession::new(
            completions,
            retriever,
            config,
            RetrievalScope::Session(session.id),
        );
        question_loop(assistant).await?;
    }
    Ok(())
}

async fn ask(question: &str) -> anyhow::Result<()> {
    let config = IntelConfig::default();
    let completions = completion_provider(&config)?;
    let retriever = Arc::new(ContextRetriever::new(
        Arc::new(HashEmbedder::default()),
        config.fragment_chunk_size,
        config.similarity_threshold,
    ));

    // Rebuild the fragment index from previously stored analyses so the
    // answer can be grounded in them
    let store = JsonFileSessionStore::open(data_path())?;
    let mut indexed = 0usize;
    for session in store.list(&SessionFilter::default()).await? {
        if matches!(
            session.status,
            SessionStatus::Complete | SessionStatus::Partial
        ) {
            retriever.index(&session).await;
            indexed += 1;
        }
    }
    if indexed == 0 {
        println!("No stored analyses found; answering from general knowledge.");
    }

    let mut assistant =
        AssistantSession::new(completions, retriever, config, RetrievalScope::AllSessions);
    let answer = assistant.ask(question).await?;
    println!("{answer}");
    Ok(())
}

/// Where sessions are persisted between runs
fn data_path() -> PathBuf {
    env::var("INTEL_DATA_FILE").map_or_else(|_| PathBuf::from(DEFAULT_DATA_FILE), PathBuf::from)
}

/// Build the completion provider with the configured request timeout
fn completion_provider(config: &IntelConfig) -> anyhow::Result<Arc<GroqProvider>> {
    let groq = GroqConfig::from_env()
        .context("completion provider configuration")?
        .with_timeout(config.request_timeout.as_secs());
    Ok(Arc::new(GroqProvider::with_config(groq)?))
}

/// Construct one provider per enabled id whose API key is present
fn build_providers(config: &IntelConfig) -> anyhow::Result<Vec<Arc<dyn DataProvider>>> {
    let cache = ResponseCache::default();
    let mut providers: Vec<Arc<dyn DataProvider>> = Vec::new();

    for id in &config.enabled_providers {
        let key_var = match id.as_str() {
            "search" => "TAVILY_API_KEY",
            "news_feed" => "NEWSDATA_API_KEY",
            "web_scrape" => "FIRECRAWL_API_KEY",
            other => {
                warn!("Unknown provider id {other}, skipping");
                continue;
            }
        };
        let Ok(key) = env::var(key_var) else {
            warn!("{key_var} not set, disabling provider {id}");
            continue;
        };

        let provider: Arc<dyn DataProvider> = match id.as_str() {
            "search" => Arc::new(WebSearchProvider::new(key, cache.clone())?),
            "news_feed" => Arc::new(NewsFeedProvider::new(key, NEWS_RATE_LIMIT_PER_MINUTE)?),
            _ => Arc::new(WebScrapeProvider::new(key)?),
        };
        providers.push(provider);
    }

    if providers.is_empty() {
        bail!(
            "no data providers configured; set at least one of \
             TAVILY_API_KEY, NEWSDATA_API_KEY, FIRECRAWL_API_KEY"
        );
    }
    Ok(providers)
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::StageEntered { stage, .. } => println!("-> {stage} started"),
        WorkflowEvent::StageCompleted { stage, .. } => println!("   {stage} completed"),
        WorkflowEvent::StageDegraded { stage, defect, .. } => {
            println!("   {stage} degraded: {defect}");
        }
        WorkflowEvent::StageFailed { stage, reason, .. } => {
            println!("   {stage} failed: {reason}");
        }
        WorkflowEvent::Completed { .. } => println!("analysis complete"),
        WorkflowEvent::PartiallyCompleted { .. } => {
            println!("analysis complete with degraded sections");
        }
        WorkflowEvent::Failed { reason, .. } => println!("analysis failed: {reason}"),
    }
}

async fn question_loop(mut assistant: AssistantSession) -> anyhow::Result<()> {
    println!("\nAsk follow-up questions about this report. Type 'exit' to quit.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {e}");
                continue;
            }
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") {
            break;
        }

        match assistant.ask(input).await {
            Ok(answer) => println!("{answer}\n"),
            Err(e) => eprintln!("Error: {e}\n"),
        }
    }
    Ok(())
}
