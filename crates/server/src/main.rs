//! Vernissage-rs server entry point.

use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vernissage_common::Config;
use vernissage_federation::{
    ActivityDelivery, ActivityDispatcher, ApClient, DispatcherDeps, InboxState, MemoryStore,
    RemoteActorResolver, SignatureVerifier, VerifierSettings, inbox_router,
};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn federation_router(config: &Config) -> anyhow::Result<Router> {
    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(ApClient::from_config(config)?);
    let resolver = Arc::new(RemoteActorResolver::from_config(
        store.clone(),
        client.clone(),
        &config.federation,
    ));

    let dispatcher = ActivityDispatcher::new(DispatcherDeps {
        actors: resolver.clone(),
        graph: store.clone(),
        content: store.clone(),
        media: client.clone(),
        fetcher: client.clone(),
    })
    .with_delivery(ActivityDelivery::new(client));

    let verifier = SignatureVerifier::new(resolver, VerifierSettings::from(&config.federation));
    let state = InboxState::new(verifier, dispatcher)
        .with_require_signatures(config.federation.require_signatures);

    Ok(inbox_router(state))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vernissage=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting vernissage-rs server...");

    let config = Config::load()?;

    let mut app = Router::new();
    if config.federation.enabled {
        if !config.federation.require_signatures {
            warn!("Inbound signatures are not enforced");
        }
        app = app.merge(federation_router(&config)?);
        info!(instance = %config.federation.instance_name, "Federation inbox enabled");
    } else {
        info!("Federation is disabled");
    }
    let app = app.layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
