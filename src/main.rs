// ABOUTME: Main entry point for the command-and-control daemon
// ABOUTME: Initializes logging, config, repositories, dispatch engine and management handlers

mod config;
mod plugins;

use anyhow::Result;
use clap::Parser;
use config::Config;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wrangle_core::auth::ChatAuthenticator;
use wrangle_core::engine::{DispatchEngine, EngineConfig};
use wrangle_core::i18n::MessageCatalog;
use wrangle_core::management::ManagementService;
use wrangle_core::memory::{MemoryChatRepository, MemoryClientRepository, MemoryLogRepository};
use wrangle_core::middleware::MiddlewareRegistry;
use wrangle_core::notify::ChatNotifier;
use wrangle_core::registry::PluginRegistry;
use wrangle_core::repository::{ChatRepository, ClientRepository, LogRepository};
use wrangle_core::subscription::SubscriptionStore;
use wrangle_core::transport::{InProcessTransport, Transport};

#[derive(Parser, Debug)]
#[command(name = "wrangle", about = "Chat-driven command-and-control daemon")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    tracing::info!(
        plugins = ?config.plugins.enabled,
        strict_middleware = config.server.strict_middleware,
        timeout_secs = config.server.execution_timeout_secs,
        "Configuration loaded"
    );

    // Storage and messaging
    let transport: Arc<dyn Transport> = Arc::new(InProcessTransport::new());
    let chats: Arc<dyn ChatRepository> = Arc::new(MemoryChatRepository::with_default_language(
        config.i18n.default_language.clone(),
    ));
    let clients: Arc<dyn ClientRepository> = Arc::new(MemoryClientRepository::new());
    let logs: Arc<dyn LogRepository> = Arc::new(MemoryLogRepository::new());

    // Localization
    let mut catalog =
        MessageCatalog::new().with_default_language(config.i18n.default_language.clone());
    if let Some(dir) = &config.i18n.translations_dir {
        catalog.load_dir(std::path::Path::new(dir))?;
        tracing::info!(dir = %dir, "Loaded translations");
    }
    let catalog = Arc::new(catalog);

    let notifier = Arc::new(ChatNotifier::new(
        Arc::clone(&transport),
        Arc::clone(&chats),
        catalog,
    ));

    // Plugins and middleware
    let plugin_registry = Arc::new(PluginRegistry::new());
    plugin_registry.load_plugins(&plugins::builtin_loader(), &config.plugins.enabled);

    let middleware_registry = if config.server.strict_middleware {
        Arc::new(MiddlewareRegistry::strict())
    } else {
        Arc::new(MiddlewareRegistry::new())
    };
    middleware_registry.register("audit", Arc::new(plugins::AuditMiddleware));

    // Dispatch pipelines
    let engine = Arc::new(DispatchEngine::new(
        Arc::clone(&plugin_registry),
        Arc::clone(&middleware_registry),
        Arc::clone(&logs),
        Arc::clone(&transport),
        Arc::clone(&notifier),
        EngineConfig {
            execution_timeout: config.execution_timeout(),
            correlation_ttl: config.correlation_ttl(),
        },
    ));
    engine.attach().await?;

    // Management handlers
    let subscriptions = Arc::new(SubscriptionStore::new(Arc::clone(&clients)));
    let auth = ChatAuthenticator::with_token_ttl(Arc::clone(&chats), config.auth_token_ttl());
    let management = Arc::new(ManagementService::new(
        Arc::clone(&chats),
        Arc::clone(&clients),
        subscriptions,
        auth,
        Arc::clone(&transport),
        notifier,
        config.server.client_secret.clone(),
    ));
    management.attach().await?;

    tracing::info!(plugins = plugin_registry.len(), "Daemon running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
