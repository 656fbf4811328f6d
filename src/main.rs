//! Gavel Back binary entrypoint wiring the REST API, the cache, the durable store and the
//! judgment workers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gavel_back::{
    cache::{CacheStore, MemoryCache, NoopCache, RoomCache},
    config::{AppConfig, CacheBackend},
    dao::debate_store::{DebateStore, MemoryDebateStore},
    routes,
    services::{
        judge::{Judge, StaticJudge},
        judgment_pool::JudgmentPool,
        judgment_service::JudgmentRunner,
    },
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = build_store().await?;
    let cache = RoomCache::new(build_cache(config.cache.backend).await, config.cache.ttl);
    let judge = build_judge()?;

    let runner = JudgmentRunner::new(
        store.clone(),
        cache.clone(),
        judge,
        config.judgment.timeout,
    );
    let pool = JudgmentPool::spawn(
        config.judgment.workers,
        config.judgment.queue_capacity,
        Arc::new(runner),
    );
    info!(
        workers = config.judgment.workers,
        queue_capacity = config.judgment.queue_capacity,
        "judgment pool started"
    );

    let app_state = AppState::new(store, cache, pool, config);
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    app_state.judgments().shutdown().await;
    Ok(())
}

/// MongoDB when `MONGO_URI` is set, the in-memory store otherwise.
#[cfg(feature = "mongo-store")]
async fn build_store() -> anyhow::Result<Arc<dyn DebateStore>> {
    use gavel_back::dao::debate_store::mongodb::{MongoConfig, MongoDebateStore};

    if env::var("MONGO_URI").is_err() {
        warn!("MONGO_URI not set; using the in-memory store");
        return Ok(Arc::new(MemoryDebateStore::new()));
    }

    let config = MongoConfig::from_env()
        .await
        .context("reading MongoDB configuration")?;
    let store = MongoDebateStore::connect(config)
        .await
        .context("connecting to MongoDB")?;
    info!("connected to MongoDB");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "mongo-store"))]
async fn build_store() -> anyhow::Result<Arc<dyn DebateStore>> {
    warn!("built without MongoDB support; using the in-memory store");
    Ok(Arc::new(MemoryDebateStore::new()))
}

async fn build_cache(backend: CacheBackend) -> Arc<dyn CacheStore> {
    match backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::None => Arc::new(NoopCache),
        CacheBackend::Redis => connect_redis().await,
    }
}

#[cfg(feature = "redis-cache")]
async fn connect_redis() -> Arc<dyn CacheStore> {
    use gavel_back::cache::redis::RedisCache;

    let url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
    match RedisCache::connect(&url).await {
        Ok(cache) => {
            info!("connected to Redis");
            Arc::new(cache)
        }
        Err(err) => {
            warn!(error = %err, "Redis unavailable; falling back to the in-memory cache");
            Arc::new(MemoryCache::new())
        }
    }
}

#[cfg(not(feature = "redis-cache"))]
async fn connect_redis() -> Arc<dyn CacheStore> {
    warn!("built without Redis support; falling back to the in-memory cache");
    Arc::new(MemoryCache::new())
}

/// OpenAI when an API key is configured, the deterministic judge otherwise.
#[cfg(feature = "openai-judge")]
fn build_judge() -> anyhow::Result<Arc<dyn Judge>> {
    use gavel_back::services::judge::openai::{OpenAiConfig, OpenAiJudge};

    match OpenAiConfig::from_env() {
        Some(config) => {
            let judge = OpenAiJudge::new(config).context("building OpenAI judge")?;
            info!("using the OpenAI judge");
            Ok(Arc::new(judge))
        }
        None => {
            warn!("OPENAI_API_KEY not set; using the static judge");
            Ok(Arc::new(StaticJudge))
        }
    }
}

#[cfg(not(feature = "openai-judge"))]
fn build_judge() -> anyhow::Result<Arc<dyn Judge>> {
    info!("using the static judge");
    Ok(Arc::new(StaticJudge))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
