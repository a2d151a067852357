use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{
        CheckoutRequest, CheckoutResponse, MessageRequest, OrderList, OrderWithItems,
        ReviewRequest,
    },
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        menu_items::Entity as MenuItems,
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        restaurants::{Column as RestaurantCol, Entity as Restaurants},
        reviews::{ActiveModel as ReviewActive, Column as ReviewCol, Entity as Reviews},
    },
    error::{AppError, AppResult},
    events::{OrderEvent, Room},
    lifecycle::{OrderStatus, Role, ensure_transition},
    middleware::auth::{AuthUser, ensure_customer},
    models::{Order, OrderItem, Review},
    outbox::queue_event,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Split the cart into one order per restaurant, write the orders and their
/// `new_order` outbox rows in one transaction, then clear the cart.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    ensure_customer(user)?;
    if payload.dropoff_addr.trim().is_empty() {
        return Err(AppError::BadRequest("dropoff address is required".into()));
    }

    let txn = state.orm.begin().await?;

    let rows = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .find_also_related(MenuItems)
        .all(&txn)
        .await?;

    if rows.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    // Group cart lines by restaurant; each group becomes its own order.
    let mut by_restaurant: BTreeMap<Uuid, Vec<(i32, crate::entity::menu_items::Model)>> =
        BTreeMap::new();
    for (cart_item, menu_item) in rows {
        let menu_item = menu_item.ok_or_else(|| {
            AppError::BadRequest("cart references a removed menu item".into())
        })?;
        if !menu_item.available {
            return Err(AppError::BadRequest(format!(
                "menu item {} is no longer available",
                menu_item.name
            )));
        }
        if cart_item.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        by_restaurant
            .entry(menu_item.restaurant_id)
            .or_default()
            .push((cart_item.quantity, menu_item));
    }

    let mut orders: Vec<OrderWithItems> = Vec::new();

    for (restaurant_id, lines) in by_restaurant {
        let total_amount: i64 = lines
            .iter()
            .map(|(quantity, item)| item.price * (*quantity as i64))
            .sum();

        let order = OrderActive {
            id: Set(Uuid::new_v4()),
            customer_id: Set(user.user_id),
            restaurant_id: Set(restaurant_id),
            rider_id: Set(None),
            status: Set(OrderStatus::PendingRestaurantAcceptance.as_str().into()),
            total_amount: Set(total_amount),
            dropoff_addr: Set(payload.dropoff_addr.clone()),
            dropoff_latitude: Set(payload.dropoff_latitude),
            dropoff_longitude: Set(payload.dropoff_longitude),
            created_at: NotSet,
            updated_at: NotSet,
            delivered_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let mut items: Vec<OrderItem> = Vec::new();
        for (quantity, menu_item) in lines {
            let item = OrderItemActive {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                menu_item_id: Set(menu_item.id),
                quantity: Set(quantity),
                price: Set(menu_item.price),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?;
            items.push(order_item_from_entity(item));
        }

        queue_event(
            &txn,
            order.id,
            &[Room::Restaurant(restaurant_id)],
            &OrderEvent::NewOrder {
                order_id: order.id,
                restaurant_id,
                customer_id: user.user_id,
                total_amount,
            },
        )
        .await?;

        orders.push(OrderWithItems {
            order: order_from_entity(order),
            items,
        });
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({
            "order_ids": orders.iter().map(|o| o.order.id).collect::<Vec<_>>()
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Checkout success",
        CheckoutResponse { orders },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_customer(user)?;
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::CustomerId.eq(user.user_id));
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

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };
    ensure_participant(state, user, &order).await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Customer cancellation, allowed only before the restaurant accepts.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    ensure_customer(user)?;
    let txn = state.orm.begin().await?;

    let order = load_for_update(&txn, id).await?;
    if order.customer_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    ensure_transition(&order.status, OrderStatus::Cancelled)?;

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    queue_event(&txn, order.id, &status_rooms(&order), &status_updated_event(&order)).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

pub async fn review_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: ReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    ensure_customer(user)?;
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".into()));
    }

    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };
    if order.customer_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    if order.status != OrderStatus::Delivered.as_str() {
        return Err(AppError::BadRequest(
            "only delivered orders can be reviewed".into(),
        ));
    }

    let existing = Reviews::find()
        .filter(ReviewCol::OrderId.eq(order.id))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("order already reviewed".into()));
    }

    let review = ReviewActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        customer_id: Set(user.user_id),
        restaurant_id: Set(order.restaurant_id),
        rating: Set(payload.rating),
        comment: Set(payload.comment),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "review_create",
        Some("reviews"),
        Some(serde_json::json!({ "order_id": order.id, "rating": review.rating })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Review recorded",
        review_from_entity(review),
        Some(Meta::empty()),
    ))
}

/// Relay an order-scoped message to the other parties of the order.
pub async fn send_message(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: MessageRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    if payload.body.trim().is_empty() {
        return Err(AppError::BadRequest("message body is empty".into()));
    }

    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };
    ensure_participant(state, user, &order).await?;

    // Everyone on the order except the sender's own room.
    let own = match user.role {
        Role::Customer => Room::Customer(user.user_id),
        Role::Rider => Room::Rider(user.user_id),
        Role::Restaurant => Room::Restaurant(order.restaurant_id),
    };
    let rooms: Vec<Room> = status_rooms(&order).into_iter().filter(|r| *r != own).collect();

    let seq = queue_event(
        &state.orm,
        order.id,
        &rooms,
        &OrderEvent::ReceiveMessage {
            order_id: order.id,
            from_role: user.role,
            body: payload.body,
        },
    )
    .await?;

    Ok(ApiResponse::success(
        "Message queued",
        serde_json::json!({ "seq": seq }),
        Some(Meta::empty()),
    ))
}

/// Row-lock an order for a status transition.
pub(crate) async fn load_for_update(
    txn: &sea_orm::DatabaseTransaction,
    id: Uuid,
) -> AppResult<OrderModel> {
    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?;
    match order {
        Some(o) => Ok(o),
        None => Err(AppError::NotFound),
    }
}

/// Rooms that follow an order's status: its customer and restaurant, plus
/// the assigned rider once there is one.
pub(crate) fn status_rooms(order: &OrderModel) -> Vec<Room> {
    let mut rooms = vec![
        Room::Customer(order.customer_id),
        Room::Restaurant(order.restaurant_id),
    ];
    if let Some(rider_id) = order.rider_id {
        rooms.push(Room::Rider(rider_id));
    }
    rooms
}

pub(crate) fn status_updated_event(order: &OrderModel) -> OrderEvent {
    OrderEvent::OrderStatusUpdated {
        order_id: order.id,
        // Stored strings only ever come from OrderStatus::as_str.
        status: order.status.parse().unwrap_or(OrderStatus::PendingRestaurantAcceptance),
        rider_id: order.rider_id,
    }
}

/// Only the order's customer, its restaurant's owner, or its assigned rider
/// may read or message it.
pub(crate) async fn ensure_participant(
    state: &AppState,
    user: &AuthUser,
    order: &OrderModel,
) -> AppResult<()> {
    match user.role {
        Role::Customer if order.customer_id == user.user_id => Ok(()),
        Role::Rider if order.rider_id == Some(user.user_id) => Ok(()),
        Role::Restaurant => {
            let restaurant = Restaurants::find()
                .filter(RestaurantCol::OwnerId.eq(user.user_id))
                .one(&state.orm)
                .await?;
            match restaurant {
                Some(r) if r.id == order.restaurant_id => Ok(()),
                _ => Err(AppError::Forbidden),
            }
        }
        _ => Err(AppError::Forbidden),
    }
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        customer_id: model.customer_id,
        restaurant_id: model.restaurant_id,
        rider_id: model.rider_id,
        status: model.status,
        total_amount: model.total_amount,
        dropoff_addr: model.dropoff_addr,
        dropoff_latitude: model.dropoff_latitude,
        dropoff_longitude: model.dropoff_longitude,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
        delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
    }
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        menu_item_id: model.menu_item_id,
        quantity: model.quantity,
        price: model.price,
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
