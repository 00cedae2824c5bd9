pub mod activity;
pub mod exports;
pub mod settings;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/settings", settings::router())
        .nest("/exports", exports::router())
        .nest("/activity-log", activity::router())
}
