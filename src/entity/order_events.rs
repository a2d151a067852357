use sea_orm::entity::prelude::*;
use serde_json::Value;

/// Outbox row for reliable event delivery: written in the same transaction
/// as the order mutation it announces, published by the dispatcher task.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "order_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub seq: i64,
    pub order_id: Uuid,
    pub event: String,
    pub rooms: Value,
    pub payload: Value,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTimeWithTimeZone,
    pub published_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
