use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::OrderList,
    entity::orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
    error::{AppError, AppResult},
    events::{OrderEvent, Room},
    lifecycle::{OrderStatus, ensure_transition},
    middleware::auth::{AuthUser, ensure_rider},
    models::Order,
    outbox::queue_event,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, Pagination, SortOrder},
    services::order_service::{
        load_for_update, order_from_entity, status_rooms, status_updated_event,
    },
    state::AppState,
};

const CLAIMABLE: [&str; 2] = ["preparing", "ready_for_pickup"];

/// Unassigned accepted orders any rider may claim.
pub async fn list_open_deliveries(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_rider(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Orders::find()
        .filter(OrderCol::RiderId.is_null())
        .filter(OrderCol::Status.is_in(CLAIMABLE))
        .order_by_asc(OrderCol::CreatedAt);

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
    Ok(ApiResponse::success(
        "Open deliveries",
        OrderList { items },
        Some(meta),
    ))
}

/// Claim a delivery. The single conditional UPDATE is the whole race guard:
/// of N concurrent riders exactly one sees rows_affected == 1, everyone else
/// gets Conflict and the `order_accepted` broadcast.
pub async fn claim_delivery(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    ensure_rider(user)?;
    let txn = state.orm.begin().await?;

    let result = Orders::update_many()
        .col_expr(OrderCol::RiderId, Expr::value(Some(user.user_id)))
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(id))
                .add(OrderCol::RiderId.is_null())
                .add(OrderCol::Status.is_in(CLAIMABLE)),
        )
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        let order = Orders::find_by_id(id).one(&txn).await?;
        return match order {
            None => Err(AppError::NotFound),
            Some(o) if o.rider_id.is_some() => {
                Err(AppError::Conflict("delivery already claimed by another rider".into()))
            }
            Some(o) => Err(AppError::Conflict(format!(
                "order status is {}, not claimable",
                o.status
            ))),
        };
    }

    let order = Orders::find_by_id(id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    // The riders room carries the claim so the losers see it was taken.
    queue_event(
        &txn,
        order.id,
        &[
            Room::Customer(order.customer_id),
            Room::Restaurant(order.restaurant_id),
            Room::Riders,
        ],
        &OrderEvent::OrderAccepted {
            order_id: order.id,
            rider_id: user.user_id,
        },
    )
    .await?;

    txn.commit().await?;

    audit_delivery(state, user, order.id, "delivery_claim").await;
    Ok(ApiResponse::success(
        "Delivery claimed",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

/// ready_for_pickup -> out_for_delivery, by the assigned rider only.
pub async fn mark_picked_up(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    ensure_rider(user)?;
    let txn = state.orm.begin().await?;

    let order = load_for_update(&txn, id).await?;
    if order.rider_id != Some(user.user_id) {
        return Err(AppError::Forbidden);
    }
    ensure_transition(&order.status, OrderStatus::OutForDelivery)?;

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::OutForDelivery.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    queue_event(&txn, order.id, &status_rooms(&order), &status_updated_event(&order)).await?;
    txn.commit().await?;

    audit_delivery(state, user, order.id, "delivery_pickup").await;
    Ok(ApiResponse::success(
        "Out for delivery",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

/// out_for_delivery -> delivered; stamps delivered_at.
pub async fn mark_delivered(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    ensure_rider(user)?;
    let txn = state.orm.begin().await?;

    let order = load_for_update(&txn, id).await?;
    if order.rider_id != Some(user.user_id) {
        return Err(AppError::Forbidden);
    }
    ensure_transition(&order.status, OrderStatus::Delivered)?;

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Delivered.as_str().into());
    active.updated_at = Set(now.into());
    active.delivered_at = Set(Some(now.into()));
    let order = active.update(&txn).await?;

    queue_event(&txn, order.id, &status_rooms(&order), &status_updated_event(&order)).await?;
    txn.commit().await?;

    audit_delivery(state, user, order.id, "delivery_complete").await;
    Ok(ApiResponse::success(
        "Delivered",
        order_from_entity(order),
        Some(Meta::empty()),
    ))
}

/// The rider's own assignment history.
pub async fn list_my_deliveries(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_rider(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all().add(OrderCol::RiderId.eq(user.user_id));
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
    Ok(ApiResponse::success(
        "Deliveries",
        OrderList { items },
        Some(meta),
    ))
}

async fn audit_delivery(state: &AppState, user: &AuthUser, order_id: Uuid, action: &str) {
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
