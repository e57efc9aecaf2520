use axum::{
    extract::State,
    response::Html,
    routing::get,
    Json, Router,
};

use crate::relay::StatsSnapshot;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Bundled chat client.
const INDEX_HTML: &str = include_str!("../static/index.html");

/// GET /: the static chat page.
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /stats: relay outcome counters and the current registry size.
async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot: StatsSnapshot = state.relay.stats();
    Json(serde_json::json!({
        "connections": state.relay.registry().len(),
        "counters": snapshot,
    }))
}

/// Build the full axum Router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat", get(ws_handler::ws_upgrade))
        .route("/stats", get(stats))
        .with_state(state)
}
