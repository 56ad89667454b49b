use std::sync::Arc;

use axum::Router;
use revision_core::{ActivityObserver, Publisher, Settings};
use revision_server::activity::{spawn_activity_sink, ActivitySink};
use revision_server::database::ServerDatabase;
use revision_server::{api, AppState};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("revision_server=debug,tower_http=debug")
        .init();

    let settings = Settings::from_env();

    let (activity_tx, activity_rx) = tokio::sync::mpsc::channel(256);
    spawn_activity_sink(activity_rx);
    let activity = ActivitySink::new(activity_tx);
    let activity_observer: Arc<dyn ActivityObserver> = Arc::new(activity.clone());

    let db = Arc::new(
        ServerDatabase::new(&settings.database_url, settings.max_connections)
            .await?
            .with_observer(activity_observer.clone()),
    );

    let app_state = Arc::new(AppState {
        db: db.clone(),
        activity: Some(activity),
        settings: Arc::new(settings.clone()),
    });

    if !settings.scheduler.collections.is_empty() {
        let mut stacks = Vec::with_capacity(settings.scheduler.collections.len());
        for collection in &settings.scheduler.collections {
            stacks.push(db.stack(collection).await?);
        }
        let publisher = Publisher::new(stacks, settings.scheduler.clone(), Some(activity_observer));
        tokio::spawn(publisher.run(|| chrono::Utc::now().timestamp()));
    } else {
        tracing::warn!("no SCHEDULER_COLLECTIONS configured; publisher will not run");
    }

    let app = Router::new()
        .merge(api::router(app_state))
        .route("/health", axum::routing::get(|| async { "OK" }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    tracing::info!("starting revision server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
