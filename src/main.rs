use std::sync::Arc;

use sprout_api::{
    api::{create_router, AppState, RecommendationLimits},
    config::Config,
    db::{create_pool, create_redis_client, PostgresStore, RedisContextStore},
    services::{
        providers::UserContextStore, Collaborators, ContextUpdater, HttpNarrativeClient,
        NarrativeClient, RecommendationEngine, TemplateNarrativeClient,
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sprout_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    let redis_client = create_redis_client(&config.redis_url)?;
    tracing::info!("Connected to Postgres and Redis");

    let narrative: Arc<dyn NarrativeClient> = if config.narrative_api_url.trim().is_empty() {
        tracing::warn!("NARRATIVE_API_URL is empty, using template narratives");
        Arc::new(TemplateNarrativeClient)
    } else {
        Arc::new(HttpNarrativeClient::new(
            config.narrative_api_url.clone(),
            config.narrative_api_key.clone(),
        ))
    };

    let store = Arc::new(PostgresStore::new(pool));
    let engine = RecommendationEngine::new(
        Collaborators::shared(store, narrative),
        config.engine_settings(),
    );

    let contexts: Arc<dyn UserContextStore> = Arc::new(RedisContextStore::new(redis_client));
    let (updater, updater_handle) = ContextUpdater::spawn(contexts.clone());

    let limits = RecommendationLimits {
        default: config.default_recommendations,
        max: config.max_recommendations,
    };
    let app = create_router(AppState::new(engine, updater, contexts, limits));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    updater_handle.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
