use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::api::routes::{due, get_card, post_event, summary, testable, track, AppState};
use flashgate_core::CardStateRepository;

pub fn router(repo: Arc<dyn CardStateRepository>) -> Router {
    let state = Arc::new(AppState { repo });

    Router::new()
        .route("/users/:user/decks/:deck/track", post(track))
        .route("/users/:user/summary", get(summary))
        .route("/users/:user/due", get(due))
        .route("/users/:user/testable", get(testable))
        .route("/users/:user/cards/:card", get(get_card))
        .route("/users/:user/cards/:card/events", post(post_event))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(repo: Arc<dyn CardStateRepository>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(repo);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "api listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
