use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::prelude::*;

use lead_assist::api::{ApiState, api_routes};
use lead_assist::channels::{ChannelManager, CliChannel, TelegramChannel, WebChatChannel};
use lead_assist::config::BotConfig;
use lead_assist::conversation::{Engine, QuestionSet};
use lead_assist::crm::{Bitrix24Notifier, LeadNotifier, LogNotifier};
use lead_assist::llm::create_assistant;
use lead_assist::runtime::{Runtime, RuntimeDeps};
use lead_assist::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export OPENAI_API_KEY=sk-... (or set LEAD_ASSIST_LLM_BACKEND=anthropic)");
        std::process::exit(1);
    });

    let _log_guard = init_tracing(&config);

    eprintln!("Lead Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({})", config.llm.model, config.llm.backend);
    eprintln!("   Database: {}", config.database_url);

    // ── Conversation ────────────────────────────────────────────────────
    let questions = match &config.questions_path {
        Some(path) => QuestionSet::load(path)
            .with_context(|| format!("loading questions from {}", path.display()))?,
        None => QuestionSet::default(),
    };
    eprintln!("   Questions: {}", questions.len());
    let engine = Engine::new(Arc::new(questions), config.payment_url.clone());

    // ── Collaborators ───────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::open(&config.database_url)
            .await
            .with_context(|| format!("opening database at {}", config.database_url))?,
    );
    let assistant = create_assistant(&config.llm).context("creating assistant")?;

    let notifier: Arc<dyn LeadNotifier> = match &config.bitrix24_webhook {
        Some(webhook) => Arc::new(Bitrix24Notifier::new(webhook.clone())),
        None => Arc::new(LogNotifier),
    };
    eprintln!("   Lead notifier: {}", notifier.name());

    // ── Channels ────────────────────────────────────────────────────────
    let channels = Arc::new(ChannelManager::new());

    let mut app = api_routes(ApiState {
        sessions: db.clone(),
        answers: db.clone(),
        channels: Arc::clone(&channels),
    });

    if config.web_chat_enabled {
        let web = Arc::new(WebChatChannel::new());
        app = app.merge(web.router());
        channels.add(web).await;
        eprintln!("   Web chat: ws://0.0.0.0:{}/ws/chat", config.port);
    }

    if let Some(telegram) = &config.telegram {
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if telegram.allowed_users.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                telegram.allowed_users.join(", ")
            }
        );
        channels
            .add(Arc::new(TelegramChannel::new(
                telegram.bot_token.clone(),
                telegram.allowed_users.clone(),
            )))
            .await;
    }

    if config.cli_enabled {
        channels.add(Arc::new(CliChannel::new())).await;
    }

    eprintln!("   Channels: {}\n", channels.names().await.join(", "));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    let app = app.layer(CorsLayer::permissive());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server stopped");
        }
    });
    tracing::info!(port = config.port, "HTTP server started");

    // ── Runtime ─────────────────────────────────────────────────────────
    let runtime = Runtime::new(
        RuntimeDeps {
            engine,
            store: db.clone(),
            sink: db,
            notifier,
            assistant,
            channels: Arc::clone(&channels),
        },
        config.lane_idle_timeout,
    );
    let streams = channels.start_all().await;

    tokio::select! {
        _ = runtime.run(streams) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    channels.shutdown_all().await;
    Ok(())
}

/// Console logging plus, when configured, a daily rolling log file. The
/// returned guard flushes the file writer on drop.
fn init_tracing(config: &BotConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let mut guard = None;
    let file_layer = config.log_dir.as_ref().map(|log_dir| {
        let file_appender = tracing_appender::rolling::daily(log_dir, "lead-assist.log");
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);
        tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(env_filter.clone())
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
