use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{
        CheckoutRequest, CheckoutResponse, MessageRequest, OrderList, OrderWithItems,
        ReviewRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Order, Review},
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/checkout", post(checkout))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", post(cancel_order))
        .route("/{id}/review", post(review_order))
        .route("/{id}/messages", post(send_message))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
        (status = 200, description = "Current customer's orders", body = ApiResponse<OrderList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "One order per restaurant in the cart", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Empty cart or invalid line"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<CheckoutResponse>>> {
    let resp = order_service::checkout(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items, visible to its participants", body = ApiResponse<OrderWithItems>),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Cancelled", body = ApiResponse<Order>),
        (status = 409, description = "No longer cancellable"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = order_service::cancel_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/review",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Review recorded", body = ApiResponse<Review>),
        (status = 400, description = "Order not delivered or bad rating"),
        (status = 409, description = "Already reviewed"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn review_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> AppResult<Json<ApiResponse<Review>>> {
    let resp = order_service::review_order(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/messages",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = MessageRequest,
    responses(
        (status = 200, description = "Message relayed to the order's other parties", body = ApiResponse<serde_json::Value>),
        (status = 403, description = "Not a participant"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MessageRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = order_service::send_message(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
