//! Rider workflow: browse open deliveries, claim, pickup, deliver.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::OrderList,
    error::AppResult,
    middleware::auth::AuthUser,
    models::Order,
    response::ApiResponse,
    routes::params::{OrderListQuery, Pagination},
    services::rider_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/deliveries", get(list_my_deliveries))
        .route("/deliveries/open", get(list_open_deliveries))
        .route("/deliveries/{id}/claim", post(claim_delivery))
        .route("/deliveries/{id}/pickup", post(mark_picked_up))
        .route("/deliveries/{id}/deliver", post(mark_delivered))
}

#[utoipa::path(
    get,
    path = "/api/rider/deliveries/open",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Unassigned deliveries up for claiming", body = ApiResponse<OrderList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn list_open_deliveries(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = rider_service::list_open_deliveries(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/rider/deliveries/{id}/claim",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Delivery assigned to this rider", body = ApiResponse<Order>),
        (status = 409, description = "Claimed by another rider or not claimable"),
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn claim_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = rider_service::claim_delivery(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/rider/deliveries/{id}/pickup",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order out for delivery", body = ApiResponse<Order>),
        (status = 409, description = "Not ready for pickup"),
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn mark_picked_up(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = rider_service::mark_picked_up(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/rider/deliveries/{id}/deliver",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Delivered", body = ApiResponse<Order>),
        (status = 409, description = "Not out for delivery"),
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn mark_delivered(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = rider_service::mark_delivered(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/rider/deliveries",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
        (status = 200, description = "This rider's deliveries", body = ApiResponse<OrderList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn list_my_deliveries(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = rider_service::list_my_deliveries(&state, &user, query).await?;
    Ok(Json(resp))
}
