use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod cart;
pub mod doc;
pub mod events;
pub mod health;
pub mod orders;
pub mod params;
pub mod profile;
pub mod restaurant;
pub mod restaurants;
pub mod rider;
pub mod ws;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/profile", profile::router())
        .nest("/restaurants", restaurants::router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/restaurant", restaurant::router())
        .nest("/rider", rider::router())
        .nest("/events", events::router())
        .nest("/ws", ws::router())
}
