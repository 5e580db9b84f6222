//! The route table: public group, authenticated group, health, and the
//! WebSocket upgrade.

pub mod danmu;
pub mod health;
pub mod interaction;
pub mod live;
pub mod message;
pub mod recommend;
pub mod social;
pub mod user;
pub mod video;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;

use crate::hub::server as ws;
use crate::middleware::{access_log, auth, cors, recovery};
use crate::AppState;

/// Assemble the full router with the middleware stack applied.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .merge(user::public_router())
        .merge(video::public_router())
        .merge(interaction::public_router())
        .merge(danmu::public_router())
        .merge(live::public_router());

    let authenticated = Router::new()
        .merge(user::auth_router())
        .merge(social::router())
        .merge(interaction::auth_router())
        .merge(message::router())
        .merge(live::auth_router())
        .merge(danmu::auth_router())
        .merge(recommend::router())
        .layer(from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .merge(health::router())
        .merge(ws::router())
        .nest("/api", public.nest("/auth", authenticated))
        .layer(from_fn(cors::handle))
        .layer(from_fn(access_log::handle))
        .layer(CatchPanicLayer::custom(recovery::handle_panic))
        .with_state(state)
}
