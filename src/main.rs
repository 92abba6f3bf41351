use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use learning_progress::{
    config::Config,
    db,
    engine::{EngineSettings, LearningEngine},
    notify::{LogNotifier, NotificationSink, WebhookNotifier},
    routes,
    store::{MemoryStore, PgStore, ProgressStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "learning_progress=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn ProgressStore> = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, config.db_max_connections).await?;
            db::migrate(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, state is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let notifier: Arc<dyn NotificationSink> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.as_str())?),
        None => Arc::new(LogNotifier),
    };

    let settings = EngineSettings {
        quiz_unlock_video_pct: config.quiz_unlock_video_pct,
    };
    let engine = Arc::new(LearningEngine::new(store, notifier, settings));

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(engine))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
