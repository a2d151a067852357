//! Catch-up cursor over the order-event outbox. A client that reconnects
//! replays everything it missed instead of waiting for the next fetch.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    middleware::auth::AuthUser,
    notify::rooms_for_user,
    outbox::{self, StoredEvent},
    response::{ApiResponse, Meta},
    routes::params::EventsQuery,
    state::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct EventList {
    pub items: Vec<StoredEvent>,
    /// Pass this as `after` on the next call.
    pub cursor: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_events))
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(
        ("after" = Option<i64>, Query, description = "Return events with seq greater than this"),
        ("limit" = Option<i64>, Query, description = "Max rows, default 100, cap 500")
    ),
    responses(
        (status = 200, description = "Room-scoped events newer than the cursor", body = ApiResponse<EventList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<EventsQuery>,
) -> AppResult<Json<ApiResponse<EventList>>> {
    let rooms = rooms_for_user(&state.pool, &user).await?;
    let after = query.after.unwrap_or(0);
    let items = outbox::events_after(&state.pool, &rooms, after, query.limit.unwrap_or(100)).await?;

    let cursor = items.last().map(|e| e.seq).unwrap_or(after);
    Ok(Json(ApiResponse::success(
        "Events",
        EventList { items, cursor },
        Some(Meta::empty()),
    )))
}
