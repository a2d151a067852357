//! Transactional outbox for order notifications.
//!
//! Mutation handlers call [`queue_event`] on the same transaction that
//! commits the order change, so a crash between commit and emit loses
//! nothing: the dispatcher picks the row up on the next poll. Rows stay
//! around after publishing and back the `/api/events` catch-up cursor.

use std::time::Duration;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ConnectionTrait, Set};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entity::order_events::ActiveModel as OrderEventActive,
    error::{AppError, AppResult},
    events::{EventEnvelope, OrderEvent, Room},
    notify::NotificationHub,
};

const BATCH_SIZE: i64 = 50;

/// Insert an outbox row on the caller's transaction. Returns the cursor
/// assigned to the event.
pub async fn queue_event<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    rooms: &[Room],
    event: &OrderEvent,
) -> AppResult<i64> {
    let payload = serde_json::to_value(event)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("event encode failed: {e}")))?;
    let rooms = serde_json::to_value(rooms)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("room encode failed: {e}")))?;

    let row = OrderEventActive {
        seq: NotSet,
        order_id: Set(order_id),
        event: Set(event.name().to_string()),
        rooms: Set(rooms),
        payload: Set(payload),
        attempts: Set(0),
        last_error: Set(None),
        next_attempt_at: Set(Utc::now().into()),
        published_at: Set(None),
        created_at: NotSet,
    }
    .insert(conn)
    .await?;

    Ok(row.seq)
}

#[derive(Debug, FromRow)]
struct OutboxRow {
    seq: i64,
    rooms: Value,
    payload: Value,
}

fn decode_row(row: &OutboxRow) -> anyhow::Result<EventEnvelope> {
    let rooms: Vec<Room> = serde_json::from_value(row.rooms.clone())?;
    let event: OrderEvent = serde_json::from_value(row.payload.clone())?;
    Ok(EventEnvelope {
        seq: row.seq,
        rooms,
        event,
    })
}

/// Publish one batch of pending rows. Rows that fail to decode are retried
/// with exponential backoff rather than wedging the queue.
pub async fn dispatch_batch(pool: &DbPool, hub: &NotificationHub) -> AppResult<usize> {
    let mut txn = pool.begin().await?;

    let rows: Vec<OutboxRow> = sqlx::query_as(
        r#"
        SELECT seq, rooms, payload
        FROM order_events
        WHERE published_at IS NULL AND next_attempt_at <= now()
        ORDER BY seq
        LIMIT $1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(BATCH_SIZE)
    .fetch_all(&mut *txn)
    .await?;

    let mut published = 0usize;
    for row in rows {
        match decode_row(&row) {
            Ok(envelope) => {
                let receivers = hub.publish(envelope);
                tracing::debug!(seq = row.seq, receivers, "order event published");
                sqlx::query("UPDATE order_events SET published_at = now() WHERE seq = $1")
                    .bind(row.seq)
                    .execute(&mut *txn)
                    .await?;
                published += 1;
            }
            Err(err) => {
                tracing::warn!(seq = row.seq, error = %err, "undecodable outbox row, backing off");
                sqlx::query(
                    r#"
                    UPDATE order_events
                    SET attempts = attempts + 1,
                        last_error = $2,
                        next_attempt_at = now() + interval '1 second' * least(60, power(2, attempts))
                    WHERE seq = $1
                    "#,
                )
                .bind(row.seq)
                .bind(err.to_string())
                .execute(&mut *txn)
                .await?;
            }
        }
    }

    txn.commit().await?;
    Ok(published)
}

/// Background dispatcher loop.
pub fn spawn_dispatcher(
    pool: DbPool,
    hub: NotificationHub,
    poll_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(err) = dispatch_batch(&pool, &hub).await {
                tracing::warn!(error = %err, "outbox dispatch failed");
            }
        }
    })
}

/// A persisted event as served by the reconciliation endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct StoredEvent {
    pub seq: i64,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub payload: Value,
}

/// Events newer than `after` addressed to any of the caller's rooms.
pub async fn events_after(
    pool: &DbPool,
    rooms: &[Room],
    after: i64,
    limit: i64,
) -> AppResult<Vec<StoredEvent>> {
    let room_names: Vec<String> = rooms.iter().map(Room::to_string).collect();
    let rows: Vec<(i64, Value)> = sqlx::query_as(
        r#"
        SELECT seq, payload
        FROM order_events
        WHERE seq > $1 AND rooms ?| $2
        ORDER BY seq
        LIMIT $3
        "#,
    )
    .bind(after)
    .bind(&room_names)
    .bind(limit.clamp(1, 500))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(seq, payload)| StoredEvent { seq, payload })
        .collect())
}
