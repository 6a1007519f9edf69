use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use inbox_declutter::agent::{AgentBuilder, ChatService, LlmRunner, SessionStore};
use inbox_declutter::api::chat_routes;
use inbox_declutter::config::AppConfig;
use inbox_declutter::mailbox::{GmailConfig, GmailMailbox};
use inbox_declutter::rules::RuleStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv = dotenvy::dotenv();

    let config = AppConfig::from_env()?;

    // Initialize tracing; the guard flushes the file writer on exit.
    let (file_layer, _log_guard) = match &config.server.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-declutter.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    eprintln!("📥 Inbox Declutter v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.agent.model);
    eprintln!("   Rules: {}", config.agent.rules_path.display());
    eprintln!("   Tool providers: {}", config.agent.mcp_config_path.display());

    let rules = Arc::new(RuleStore::load(config.agent.rules_path.clone()));
    let mailbox = Arc::new(GmailMailbox::new(GmailConfig::new(
        config.agent.gmail_token_path.clone(),
    )));
    let builder = AgentBuilder::new(config.agent.clone(), rules, mailbox);

    let runner = LlmRunner::new(Arc::new(SessionStore::default()));
    let service = Arc::new(ChatService::new(
        Arc::new(builder),
        Arc::new(runner),
        config.server.session_id.clone(),
    ));

    let addr = config.server.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    eprintln!("   Chat API: http://{}/chat", listener.local_addr()?);
    eprintln!("   Agent is built on the first request.\n");
    tracing::info!(%addr, "Listening");

    axum::serve(listener, chat_routes(service))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
