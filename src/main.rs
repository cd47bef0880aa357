//! LegalGenius - legal question answering over a document corpus
//!
//! An LLM agent loop that researches a question with sandboxed, read-only
//! search tools and answers from what it finds. Served over HTTP, or run
//! once from the command line with `legalgenius ask "<question>"`.

mod agent;
mod api;
mod config;
mod dispatch;
mod error;
mod events;
mod llm;
mod sandbox;
mod search;
mod session_log;
mod system_prompt;
mod tools;

use agent::AgentLoop;
use api::{create_router, AppState};
use clap::{Parser, Subcommand};
use config::AppConfig;
use dispatch::Dispatcher;
use events::{frame, ChannelSink};
use llm::{LlmConfig, ModelRegistry};
use sandbox::Sandbox;
use session_log::SessionLog;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tools::{IndexClient, ToolContext, ToolRegistry};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "legalgenius", version, about = "Legal question answering over a document corpus")]
struct Cli {
    /// Serve the HTTP API when no command is given
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one question and print its trace as `data:` frames
    Ask {
        /// The question; several words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
}

impl Command {
    fn question(&self) -> String {
        match self {
            Command::Ask { question } => question.join(" "),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging (stderr, so one-shot frames on stdout stay clean)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "legalgenius=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = AppConfig::from_env()?;

    // Fail fast on a provider without credentials
    let llm_registry = Arc::new(ModelRegistry::new(LlmConfig::from_env()?)?);
    tracing::info!(
        provider = %llm_registry.provider(),
        model = %llm_registry.default_model_id(),
        "LLM provider ready"
    );

    let dispatcher = build_dispatcher(&config)?;

    let sessions = match &config.session_log_dir {
        Some(dir) => Some(SessionLog::open(dir).await?),
        None => {
            tracing::info!("Session trace persistence disabled");
            None
        }
    };

    match cli.command {
        Some(command) => {
            let question = command.question();
            if question.trim().is_empty() {
                eprintln!("usage: legalgenius ask \"<question>\"");
                return Ok(ExitCode::from(2));
            }
            ask_once(&config, &llm_registry, dispatcher, sessions, &question).await
        }
        None => {
            serve(&config, llm_registry, dispatcher, sessions).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_dispatcher(config: &AppConfig) -> Result<Dispatcher, Box<dyn std::error::Error>> {
    let sandbox = Sandbox::new(
        &config.doc_root,
        &config.allowed_extensions,
        config.default_glob.clone(),
    )?;
    tracing::info!(
        root = %config.doc_root.display(),
        extensions = ?config.allowed_extensions,
        "Document sandbox ready"
    );

    let index = match &config.index {
        Some(index) => {
            tracing::info!(url = %index.url, indices = ?index.indices, "External index enabled");
            Some(Arc::new(IndexClient::new(
                &index.url,
                &index.indices,
                index.timeout,
            )?))
        }
        None => None,
    };

    let registry = Arc::new(ToolRegistry::standard(index.is_some()));
    let ctx = ToolContext::new(Arc::new(sandbox), index);
    Ok(Dispatcher::new(registry, ctx, config.tool_timeout))
}

/// Run one loop and print its trace as `data:` frames
async fn ask_once(
    config: &AppConfig,
    llm_registry: &ModelRegistry,
    dispatcher: Dispatcher,
    sessions: Option<SessionLog>,
    question: &str,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut agent = AgentLoop::new(config.agent.clone(), llm_registry.default(), dispatcher);
    if let Some(sessions) = sessions {
        let sink = sessions.sink(agent.session_id()).await?;
        agent = agent.with_sink(Arc::new(sink));
    }

    let (tx, mut rx) = mpsc::channel(64);
    let cancel = agent.cancel_token();
    let agent = agent.with_sink(Arc::new(ChannelSink::new(tx, cancel.clone())));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let question = question.to_string();
    let run = tokio::spawn(async move { agent.run(&question).await });

    while let Some(event) = rx.recv().await {
        print!("{}", frame(&event)?);
    }
    let report = run.await?;

    Ok(if report.outcome.completes() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn serve(
    config: &AppConfig,
    llm_registry: Arc<ModelRegistry>,
    dispatcher: Dispatcher,
    sessions: Option<SessionLog>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(
        llm_registry,
        dispatcher,
        config.agent.clone(),
        sessions,
        config.batch_concurrency,
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("LegalGenius server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
