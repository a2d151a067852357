//! Typed notification schema. The wire event names (`new_order`,
//! `order_status_updated`, `order_accepted`, `new_delivery`,
//! `receive_message`) and the room naming (`customer_<id>`, `restaurant_<id>`,
//! `rider_<id>`, `riders`) are the public contract the three frontend roles
//! subscribe to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, de};
use uuid::Uuid;

use crate::lifecycle::{OrderStatus, Role};

/// A broadcast group. Rendered as its string name on the wire and in the
/// `order_events.rooms` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Customer(Uuid),
    Restaurant(Uuid),
    Rider(Uuid),
    /// Shared room every connected rider is placed in.
    Riders,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Customer(id) => write!(f, "customer_{id}"),
            Room::Restaurant(id) => write!(f, "restaurant_{id}"),
            Room::Rider(id) => write!(f, "rider_{id}"),
            Room::Riders => f.write_str("riders"),
        }
    }
}

impl FromStr for Room {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "riders" {
            return Ok(Room::Riders);
        }
        let parse = |prefix: &str| -> Option<Uuid> {
            s.strip_prefix(prefix).and_then(|id| Uuid::parse_str(id).ok())
        };
        if let Some(id) = parse("customer_") {
            return Ok(Room::Customer(id));
        }
        if let Some(id) = parse("restaurant_") {
            return Ok(Room::Restaurant(id));
        }
        if let Some(id) = parse("rider_") {
            return Ok(Room::Rider(id));
        }
        Err(format!("not a room name: {s}"))
    }
}

impl Serialize for Room {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Room {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Room::from_str(&s).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OrderEvent {
    /// A checkout produced an order for this restaurant.
    NewOrder {
        order_id: Uuid,
        restaurant_id: Uuid,
        customer_id: Uuid,
        total_amount: i64,
    },
    OrderStatusUpdated {
        order_id: Uuid,
        status: OrderStatus,
        rider_id: Option<Uuid>,
    },
    /// A rider won the claim race for this order.
    OrderAccepted {
        order_id: Uuid,
        rider_id: Uuid,
    },
    /// An accepted order is up for grabs by any connected rider.
    NewDelivery {
        order_id: Uuid,
        restaurant_id: Uuid,
        dropoff_addr: String,
    },
    ReceiveMessage {
        order_id: Uuid,
        from_role: Role,
        body: String,
    },
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::NewOrder { .. } => "new_order",
            OrderEvent::OrderStatusUpdated { .. } => "order_status_updated",
            OrderEvent::OrderAccepted { .. } => "order_accepted",
            OrderEvent::NewDelivery { .. } => "new_delivery",
            OrderEvent::ReceiveMessage { .. } => "receive_message",
        }
    }
}

/// One dispatched outbox row: the event plus its cursor and target rooms.
/// Clients receive this serialized as `{"seq": .., "event": .., "data": ..}`;
/// the room list stays server-side.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub seq: i64,
    #[serde(skip)]
    pub rooms: Vec<Room>,
    #[serde(flatten)]
    pub event: OrderEvent,
}

impl EventEnvelope {
    pub fn addressed_to_any(&self, rooms: &[Room]) -> bool {
        self.rooms.iter().any(|r| rooms.contains(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_wire_tags() {
        let event = OrderEvent::OrderAccepted {
            order_id: Uuid::new_v4(),
            rider_id: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert!(json["data"]["order_id"].is_string());
    }

    #[test]
    fn room_names_round_trip() {
        let id = Uuid::new_v4();
        for room in [Room::Customer(id), Room::Restaurant(id), Room::Rider(id), Room::Riders] {
            assert_eq!(room.to_string().parse::<Room>().unwrap(), room);
        }
        assert!("restaurant_42".parse::<Room>().is_err());
    }

    #[test]
    fn envelope_flattens_event_and_skips_rooms() {
        let envelope = EventEnvelope {
            seq: 7,
            rooms: vec![Room::Riders],
            event: OrderEvent::NewDelivery {
                order_id: Uuid::new_v4(),
                restaurant_id: Uuid::new_v4(),
                dropoff_addr: "221B Baker St".into(),
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["event"], "new_delivery");
        assert!(json.get("rooms").is_none());
    }
}
