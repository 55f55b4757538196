use axum::response::Html;

const PLAYER_PAGE: &str = include_str!("../../../static/index.html");

/// Minimal hls.js test page that plays streams through `/proxy`.
pub async fn serve_player() -> Html<&'static str> {
    Html(PLAYER_PAGE)
}
