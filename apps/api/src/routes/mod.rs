mod files;
mod public;
mod shares;

use axum::Router;
use crate::auth::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(shares::router())
        .merge(files::router())
        .merge(public::router())
}
