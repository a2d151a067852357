//! Restaurant dashboard: profile, menu CRUD, incoming orders and the
//! accept/reject/ready lifecycle steps.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::{
        menu::{CreateMenuItemRequest, MenuItemList, UpdateMenuItemRequest},
        orders::OrderList,
        restaurants::UpsertRestaurantRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{MenuItem, Order, Restaurant},
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::restaurant_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(upsert_profile))
        .route("/menu", get(list_menu).post(create_menu_item))
        .route("/menu/{id}", put(update_menu_item))
        .route("/menu/{id}", delete(delete_menu_item))
        .route("/orders", get(list_orders))
        .route("/orders/{id}/accept", post(accept_order))
        .route("/orders/{id}/reject", post(reject_order))
        .route("/orders/{id}/ready", post(mark_ready))
}

#[utoipa::path(
    get,
    path = "/api/restaurant/profile",
    responses(
        (status = 200, description = "Own restaurant profile", body = ApiResponse<Restaurant>),
        (status = 400, description = "No profile yet"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurant dashboard"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Restaurant>>> {
    let resp = restaurant_service::get_own_restaurant(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/restaurant/profile",
    request_body = UpsertRestaurantRequest,
    responses(
        (status = 200, description = "Create or update the restaurant profile", body = ApiResponse<Restaurant>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurant dashboard"
)]
pub async fn upsert_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpsertRestaurantRequest>,
) -> AppResult<Json<ApiResponse<Restaurant>>> {
    let resp = restaurant_service::upsert_restaurant(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/restaurant/menu",
    responses(
        (status = 200, description = "Full menu, including unavailable items", body = ApiResponse<MenuItemList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurant dashboard"
)]
pub async fn list_menu(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<MenuItemList>>> {
    let resp = restaurant_service::list_menu(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/restaurant/menu",
    request_body = CreateMenuItemRequest,
    responses(
        (status = 200, description = "Menu item created", body = ApiResponse<MenuItem>),
        (status = 400, description = "Bad request"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurant dashboard"
)]
pub async fn create_menu_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateMenuItemRequest>,
) -> AppResult<Json<ApiResponse<MenuItem>>> {
    let resp = restaurant_service::create_menu_item(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/restaurant/menu/{id}",
    params(("id" = Uuid, Path, description = "Menu item ID")),
    request_body = UpdateMenuItemRequest,
    responses(
        (status = 200, description = "Menu item updated", body = ApiResponse<MenuItem>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurant dashboard"
)]
pub async fn update_menu_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMenuItemRequest>,
) -> AppResult<Json<ApiResponse<MenuItem>>> {
    let resp = restaurant_service::update_menu_item(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/restaurant/menu/{id}",
    params(("id" = Uuid, Path, description = "Menu item ID")),
    responses(
        (status = 200, description = "Menu item taken off the menu", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurant dashboard"
)]
pub async fn delete_menu_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = restaurant_service::delete_menu_item(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/restaurant/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
        (status = 200, description = "Orders for the own restaurant", body = ApiResponse<OrderList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurant dashboard"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = restaurant_service::list_incoming_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/restaurant/orders/{id}/accept",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order moved to preparing", body = ApiResponse<Order>),
        (status = 409, description = "Not pending anymore"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurant dashboard"
)]
pub async fn accept_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = restaurant_service::accept_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/restaurant/orders/{id}/reject",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order rejected", body = ApiResponse<Order>),
        (status = 409, description = "Not pending anymore"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurant dashboard"
)]
pub async fn reject_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = restaurant_service::reject_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/restaurant/orders/{id}/ready",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order ready for pickup", body = ApiResponse<Order>),
        (status = 409, description = "Not preparing"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurant dashboard"
)]
pub async fn mark_ready(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = restaurant_service::mark_ready(&state, &user, id).await?;
    Ok(Json(resp))
}
