/// API routes and handlers
pub mod auth;
pub mod comments;
pub mod media;
pub mod middleware;
pub mod posts;
pub mod users;

use crate::{config::ServerConfig, context::AppContext};
use axum::Router;

/// Build API routes; mounted under the configured prefix
pub fn routes(config: &ServerConfig) -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(users::routes())
        .merge(posts::routes())
        .merge(comments::routes())
        .merge(media::routes(config.media.max_request_size))
}
