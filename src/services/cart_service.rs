use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::cart::{AddToCartRequest, CartItemDto, CartList},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::MenuItem,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
};

#[derive(FromRow)]
struct CartWithMenuRow {
    cart_id: Uuid,
    quantity: i32,
    menu_item_id: Uuid,
    restaurant_id: Uuid,
    name: String,
    description: Option<String>,
    price: i64,
    available: bool,
    created_at: DateTime<Utc>,
}

pub async fn list_cart(
    pool: &DbPool,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let rows = sqlx::query_as::<_, CartWithMenuRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity,
               m.id AS menu_item_id, m.restaurant_id, m.name, m.description,
               m.price, m.available, m.created_at
        FROM cart_items ci
        JOIN menu_items m ON m.id = ci.menu_item_id
        WHERE ci.user_id = $1
        ORDER BY ci.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(pool)
        .await?;

    let items = rows
        .into_iter()
        .map(|row| CartItemDto {
            id: row.cart_id,
            menu_item: MenuItem {
                id: row.menu_item_id,
                restaurant_id: row.restaurant_id,
                name: row.name,
                description: row.description,
                price: row.price,
                available: row.available,
                created_at: row.created_at,
            },
            quantity: row.quantity,
        })
        .collect();

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", CartList { items }, Some(meta)))
}

pub async fn add_to_cart(
    pool: &DbPool,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<crate::models::CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let menu_item: Option<(bool,)> =
        sqlx::query_as("SELECT available FROM menu_items WHERE id = $1")
            .bind(payload.menu_item_id)
            .fetch_optional(pool)
            .await?;
    match menu_item {
        None => return Err(AppError::BadRequest("menu item not found".to_string())),
        Some((false,)) => {
            return Err(AppError::BadRequest(
                "menu item is currently unavailable".to_string(),
            ));
        }
        Some((true,)) => {}
    }

    let cart_item: crate::models::CartItem = sqlx::query_as(
        r#"
        INSERT INTO cart_items (user_id, menu_item_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, menu_item_id)
        DO UPDATE SET quantity = EXCLUDED.quantity
        RETURNING *
        "#,
    )
    .bind(user.user_id)
    .bind(payload.menu_item_id)
    .bind(payload.quantity)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "menu_item_id": payload.menu_item_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", cart_item, None))
}

pub async fn remove_from_cart(
    pool: &DbPool,
    user: &AuthUser,
    menu_item_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM cart_items WHERE menu_item_id = $1 AND user_id = $2")
        .bind(menu_item_id)
        .bind(user.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "menu_item_id": menu_item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
