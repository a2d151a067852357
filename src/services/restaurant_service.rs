use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::{
        menu::{CreateMenuItemRequest, MenuItemList, UpdateMenuItemRequest},
        orders::{OrderList, ReviewList},
        restaurants::{RestaurantList, RestaurantWithMenu, UpsertRestaurantRequest},
    },
    entity::{
        menu_items::{ActiveModel as MenuItemActive, Column as MenuCol, Entity as MenuItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        restaurants::{
            ActiveModel as RestaurantActive, Column as RestaurantCol, Entity as Restaurants,
            Model as RestaurantModel,
        },
        reviews::{Column as ReviewCol, Entity as Reviews},
    },
    error::{AppError, AppResult},
    events::{OrderEvent, Room},
    lifecycle::{OrderStatus, ensure_transition},
    middleware::auth::{AuthUser, ensure_restaurant},
    models::{MenuItem, Order, Restaurant, Review},
    outbox::queue_event,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, RestaurantQuery, RestaurantSortBy, SortOrder},
    services::order_service::{
        load_for_update, order_from_entity, status_rooms, status_updated_event,
    },
    state::AppState,
};

// ---- public browse surface ----

pub async fn list_restaurants(
    state: &AppState,
    query: RestaurantQuery,
) -> AppResult<ApiResponse<RestaurantList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(RestaurantCol::Name).ilike(pattern.clone()))
                .add(Expr::col(RestaurantCol::Description).ilike(pattern)),
        );
    }

    if query.open_only.unwrap_or(false) {
        condition = condition.add(RestaurantCol::IsOpen.eq(true));
    }

    let sort_by = query.sort_by.unwrap_or(RestaurantSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        RestaurantSortBy::CreatedAt => RestaurantCol::CreatedAt,
        RestaurantSortBy::Name => RestaurantCol::Name,
    };

    let mut finder = Restaurants::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(restaurant_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Restaurants",
        RestaurantList { items },
        Some(meta),
    ))
}

pub async fn get_restaurant_with_menu(
    state: &AppState,
    id: Uuid,
) -> AppResult<ApiResponse<RestaurantWithMenu>> {
    let restaurant = Restaurants::find_by_id(id).one(&state.orm).await?;
    let restaurant = match restaurant {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };

    let menu = MenuItems::find()
        .filter(MenuCol::RestaurantId.eq(restaurant.id))
        .filter(MenuCol::Available.eq(true))
        .order_by_asc(MenuCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(menu_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Restaurant",
        RestaurantWithMenu {
            restaurant: restaurant_from_entity(restaurant),
            menu,
        },
        None,
    ))
}

pub async fn list_restaurant_reviews(
    state: &AppState,
    id: Uuid,
    pagination: crate::routes::params::Pagination,
) -> AppResult<ApiResponse<ReviewList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Reviews::find().filter(ReviewCol::RestaurantId.eq(id));
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .order_by_desc(ReviewCol::CreatedAt)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(review_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Reviews", ReviewList { items }, Some(meta)))
}

// ---- dashboard: profile ----

pub async fn get_own_restaurant(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<Restaurant>> {
    let restaurant = own_restaurant(state, user).await?;
    Ok(ApiResponse::success(
        "Restaurant profile",
        restaurant_from_entity(restaurant),
        None,
    ))
}

/// Create or replace the restaurant profile attached to this account.
pub async fn upsert_restaurant(
    state: &AppState,
    user: &AuthUser,
    payload: UpsertRestaurantRequest,
) -> AppResult<ApiResponse<Restaurant>> {
    ensure_restaurant(user)?;
    let existing = Restaurants::find()
        .filter(RestaurantCol::OwnerId.eq(user.user_id))
        .one(&state.orm)
        .await?;

    let restaurant = match existing {
        Some(model) => {
            let mut active: RestaurantActive = model.into();
            active.name = Set(payload.name);
            active.description = Set(payload.description);
            active.address = Set(payload.address);
            active.latitude = Set(payload.latitude);
            active.longitude = Set(payload.longitude);
            if let Some(is_open) = payload.is_open {
                active.is_open = Set(is_open);
            }
            active.update(&state.orm).await?
        }
        None => {
            RestaurantActive {
                id: Set(Uuid::new_v4()),
                owner_id: Set(user.user_id),
                name: Set(payload.name),
                description: Set(payload.description),
                address: Set(payload.address),
                latitude: Set(payload.latitude),
                longitude: Set(payload.longitude),
                is_open: Set(payload.is_open.unwrap_or(true)),
                created_at: NotSet,
            }
            .insert(&state.orm)
            .await?
        }
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "restaurant_upsert",
        Some("restaurants"),
        Some(serde_json::json!({ "restaurant_id": restaurant.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Restaurant saved",
        restaurant_from_entity(restaurant),
        Some(Meta::empty()),
    ))
}

// ---- dashboard: menu CRUD ----

pub async fn list_menu(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<MenuItemList>> {
    let restaurant = own_restaurant(state, user).await?;
    let items = MenuItems::find()
        .filter(MenuCol::RestaurantId.eq(restaurant.id))
        .order_by_asc(MenuCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(menu_item_from_entity)
        .collect();
    Ok(ApiResponse::success("Menu", MenuItemList { items }, None))
}

pub async fn create_menu_item(
    state: &AppState,
    user: &AuthUser,
    payload: CreateMenuItemRequest,
) -> AppResult<ApiResponse<MenuItem>> {
    let restaurant = own_restaurant(state, user).await?;
    if payload.price < 0 {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }

    let item = MenuItemActive {
        id: Set(Uuid::new_v4()),
        restaurant_id: Set(restaurant.id),
        name: Set(payload.name),
        description: Set(payload.description),
        price: Set(payload.price),
        available: Set(payload.available.unwrap_or(true)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "menu_item_create",
        Some("menu_items"),
        Some(serde_json::json!({ "menu_item_id": item.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Menu item created",
        menu_item_from_entity(item),
        Some(Meta::empty()),
    ))
}

pub async fn update_menu_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateMenuItemRequest,
) -> AppResult<ApiResponse<MenuItem>> {
    let restaurant = own_restaurant(state, user).await?;
    let existing = MenuItems::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(item) if item.restaurant_id == restaurant.id => item,
        Some(_) => return Err(AppError::Forbidden),
        None => return Err(AppError::NotFound),
    };

    let mut active: MenuItemActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        if price < 0 {
            return Err(AppError::BadRequest("price must not be negative".into()));
        }
        active.price = Set(price);
    }
    if let Some(available) = payload.available {
        active.available = Set(available);
    }
    let item = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Menu item updated",
        menu_item_from_entity(item),
        Some(Meta::empty()),
    ))
}

pub async fn delete_menu_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let restaurant = own_restaurant(state, user).await?;
    let existing = MenuItems::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(item) if item.restaurant_id == restaurant.id => item,
        Some(_) => return Err(AppError::Forbidden),
        None => return Err(AppError::NotFound),
    };

    // Keep history intact for past orders; just take it off the menu.
    let mut active: MenuItemActive = existing.into();
    active.available = Set(false);
    active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Menu item removed",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

// ---- dashboard: incoming orders ----

pub async fn list_incoming_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let restaurant = own_restaurant(state, user).await?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all().add(OrderCol::RestaurantId.eq(restaurant.id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

/// Accept: pending -> preparing. Notifies the customer and puts the
/// delivery up for grabs in the shared riders room.
pub async fn accept_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let restaurant = own_restaurant(state, user).await?;
    let txn = state.orm.begin().await?;

    let order = load_for_update(&txn, id).await?;
    if order.restaurant_id != restaurant.id {
        return Err(AppError::Forbidden);
    }
    ensure_transition(&order.status, OrderStatus::Preparing)?;

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Preparing.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    queue_event(&txn, order.id, &status_rooms(&order), &status_updated_event(&order)).await?;
    queue_event(
        &txn,
        order.id,
        &[Room::Riders],
        &OrderEvent::NewDelivery {
            order_id: order.id,
            restaurant_id: order.restaurant_id,
            dropoff_addr: order.dropoff_addr.clone(),
        },
    )
    .await?;

    txn.commit().await?;

    audit_transition(state, user, order.id, "order_accept").await;
    Ok(ApiResponse::success(
        "Order accepted",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

/// Reject: pending -> restaurant_rejected.
pub async fn reject_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let restaurant = own_restaurant(state, user).await?;
    let txn = state.orm.begin().await?;

    let order = load_for_update(&txn, id).await?;
    if order.restaurant_id != restaurant.id {
        return Err(AppError::Forbidden);
    }
    ensure_transition(&order.status, OrderStatus::RestaurantRejected)?;

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::RestaurantRejected.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    queue_event(&txn, order.id, &status_rooms(&order), &status_updated_event(&order)).await?;
    txn.commit().await?;

    audit_transition(state, user, order.id, "order_reject").await;
    Ok(ApiResponse::success(
        "Order rejected",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

/// Kitchen done: preparing -> ready_for_pickup.
pub async fn mark_ready(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let restaurant = own_restaurant(state, user).await?;
    let txn = state.orm.begin().await?;

    let order = load_for_update(&txn, id).await?;
    if order.restaurant_id != restaurant.id {
        return Err(AppError::Forbidden);
    }
    ensure_transition(&order.status, OrderStatus::ReadyForPickup)?;

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::ReadyForPickup.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    queue_event(&txn, order.id, &status_rooms(&order), &status_updated_event(&order)).await?;
    txn.commit().await?;

    audit_transition(state, user, order.id, "order_ready").await;
    Ok(ApiResponse::success(
        "Order ready for pickup",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

async fn audit_transition(state: &AppState, user: &AuthUser, order_id: Uuid, action: &str) {
    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        action,
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }
}

pub(crate) async fn own_restaurant(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<RestaurantModel> {
    ensure_restaurant(user)?;
    let restaurant = Restaurants::find()
        .filter(RestaurantCol::OwnerId.eq(user.user_id))
        .one(&state.orm)
        .await?;
    match restaurant {
        Some(r) => Ok(r),
        None => Err(AppError::BadRequest(
            "restaurant account has no restaurant profile".into(),
        )),
    }
}

pub(crate) fn restaurant_from_entity(model: RestaurantModel) -> Restaurant {
    Restaurant {
        id: model.id,
        owner_id: model.owner_id,
        name: model.name,
        description: model.description,
        address: model.address,
        latitude: model.latitude,
        longitude: model.longitude,
        is_open: model.is_open,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

pub(crate) fn menu_item_from_entity(model: crate::entity::menu_items::Model) -> MenuItem {
    MenuItem {
        id: model.id,
        restaurant_id: model.restaurant_id,
        name: model.name,
        description: model.description,
        price: model.price,
        available: model.available,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn review_from_entity(model: crate::entity::reviews::Model) -> Review {
    Review {
        id: model.id,
        order_id: model.order_id,
        customer_id: model.customer_id,
        restaurant_id: model.restaurant_id,
        rating: model.rating,
        comment: model.comment,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
