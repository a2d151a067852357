//! In-process fan-out of order events. A single broadcast channel carries
//! every dispatched envelope; each websocket task filters by its own room
//! set. Delivery to connected sockets is fire-and-forget; the outbox rows
//! remain queryable through `/api/events` for catch-up.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::{AppError, AppResult},
    events::{EventEnvelope, Room},
    lifecycle::Role,
    middleware::auth::AuthUser,
};

#[derive(Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<EventEnvelope>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers. Returns how many received it;
    /// zero simply means nobody is connected right now.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.tx.send(envelope).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

/// Derive the room set a user is entitled to from its verified claims.
/// There is no client-supplied room name anywhere: a restaurant account maps
/// to the room of the restaurant it owns, a rider additionally sits in the
/// shared `riders` room.
pub async fn rooms_for_user(pool: &DbPool, user: &AuthUser) -> AppResult<Vec<Room>> {
    match user.role {
        Role::Customer => Ok(vec![Room::Customer(user.user_id)]),
        Role::Rider => Ok(vec![Room::Rider(user.user_id), Room::Riders]),
        Role::Restaurant => {
            let restaurant: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM restaurants WHERE owner_id = $1")
                    .bind(user.user_id)
                    .fetch_optional(pool)
                    .await?;
            match restaurant {
                Some((id,)) => Ok(vec![Room::Restaurant(id)]),
                None => Err(AppError::BadRequest(
                    "restaurant account has no restaurant profile".into(),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::OrderEvent;

    fn envelope(seq: i64, rooms: Vec<Room>) -> EventEnvelope {
        EventEnvelope {
            seq,
            rooms,
            event: OrderEvent::OrderAccepted {
                order_id: Uuid::new_v4(),
                rider_id: Uuid::new_v4(),
            },
        }
    }

    #[tokio::test]
    async fn subscriber_sees_only_its_rooms() {
        let hub = NotificationHub::new(8);
        let mut rx = hub.subscribe();
        let mine = Room::Restaurant(Uuid::new_v4());
        let other = Room::Restaurant(Uuid::new_v4());

        hub.publish(envelope(1, vec![other]));
        hub.publish(envelope(2, vec![mine]));

        let my_rooms = [mine];
        let mut seen = Vec::new();
        while let Ok(env) = rx.try_recv() {
            if env.addressed_to_any(&my_rooms) {
                seen.push(env.seq);
            }
        }
        assert_eq!(seen, vec![2]);
    }

    #[tokio::test]
    async fn riders_room_reaches_every_rider() {
        let hub = NotificationHub::new(8);
        let mut rx_a = hub.subscribe();
        let mut rx_b = hub.subscribe();
        let rooms_a = [Room::Rider(Uuid::new_v4()), Room::Riders];
        let rooms_b = [Room::Rider(Uuid::new_v4()), Room::Riders];

        hub.publish(envelope(9, vec![Room::Riders]));

        assert!(rx_a.try_recv().unwrap().addressed_to_any(&rooms_a));
        assert!(rx_b.try_recv().unwrap().addressed_to_any(&rooms_b));
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let hub = NotificationHub::new(8);
        assert_eq!(hub.publish(envelope(1, vec![Room::Riders])), 0);
    }
}
