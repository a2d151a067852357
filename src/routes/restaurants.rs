//! Public browse surface used by the customer app.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{
        orders::ReviewList,
        restaurants::{RestaurantList, RestaurantWithMenu},
    },
    error::AppResult,
    response::ApiResponse,
    routes::params::{Pagination, RestaurantQuery},
    services::restaurant_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_restaurants))
        .route("/{id}", get(get_restaurant))
        .route("/{id}/reviews", get(list_reviews))
}

#[utoipa::path(
    get,
    path = "/api/restaurants",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("q" = Option<String>, Query, description = "Search name/description"),
        ("open_only" = Option<bool>, Query, description = "Only restaurants currently open"),
        ("sort_by" = Option<String>, Query, description = "Sort key: created_at, name"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
        (status = 200, description = "Browse restaurants", body = ApiResponse<RestaurantList>)
    ),
    tag = "Restaurants"
)]
pub async fn list_restaurants(
    State(state): State<AppState>,
    Query(query): Query<RestaurantQuery>,
) -> AppResult<Json<ApiResponse<RestaurantList>>> {
    let resp = restaurant_service::list_restaurants(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/restaurants/{id}",
    params(("id" = Uuid, Path, description = "Restaurant ID")),
    responses(
        (status = 200, description = "Restaurant with its available menu", body = ApiResponse<RestaurantWithMenu>),
        (status = 404, description = "Not Found")
    ),
    tag = "Restaurants"
)]
pub async fn get_restaurant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<RestaurantWithMenu>>> {
    let resp = restaurant_service::get_restaurant_with_menu(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/restaurants/{id}/reviews",
    params(
        ("id" = Uuid, Path, description = "Restaurant ID"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Reviews for a restaurant", body = ApiResponse<ReviewList>)
    ),
    tag = "Restaurants"
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ReviewList>>> {
    let resp = restaurant_service::list_restaurant_reviews(&state, id, pagination).await?;
    Ok(Json(resp))
}
