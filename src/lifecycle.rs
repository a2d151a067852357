//! Canonical order lifecycle. Every status mutation in the server goes
//! through [`OrderStatus::can_transition_to`]; handlers never write a raw
//! status string that this table does not allow.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Restaurant,
    Rider,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Restaurant => "restaurant",
            Role::Rider => "rider",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "restaurant" => Ok(Role::Restaurant),
            "rider" => Ok(Role::Rider),
            other => Err(AppError::BadRequest(format!("unknown role: {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingRestaurantAcceptance,
    Preparing,
    ReadyForPickup,
    OutForDelivery,
    Delivered,
    RestaurantRejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingRestaurantAcceptance => "pending_restaurant_acceptance",
            OrderStatus::Preparing => "preparing",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::RestaurantRejected => "restaurant_rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::RestaurantRejected | OrderStatus::Cancelled
        )
    }

    /// Statuses during which an unassigned order may be claimed by a rider.
    pub fn is_claimable(&self) -> bool {
        matches!(self, OrderStatus::Preparing | OrderStatus::ReadyForPickup)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (PendingRestaurantAcceptance, Preparing)
                | (PendingRestaurantAcceptance, RestaurantRejected)
                | (PendingRestaurantAcceptance, Cancelled)
                | (Preparing, ReadyForPickup)
                | (ReadyForPickup, OutForDelivery)
                | (OutForDelivery, Delivered)
        )
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_restaurant_acceptance" => Ok(OrderStatus::PendingRestaurantAcceptance),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready_for_pickup" => Ok(OrderStatus::ReadyForPickup),
            "out_for_delivery" => Ok(OrderStatus::OutForDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            "restaurant_rejected" => Ok(OrderStatus::RestaurantRejected),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(AppError::BadRequest(format!("unknown order status: {other}"))),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a stored status string and check the edge to `next`, mapping an
/// illegal edge to `Conflict` so a racing or out-of-order request gets a 409.
pub fn ensure_transition(current: &str, next: OrderStatus) -> Result<OrderStatus, AppError> {
    let current = OrderStatus::from_str(current)?;
    if !current.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "order status is {current}, cannot move to {next}"
        )));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 7] = [
        OrderStatus::PendingRestaurantAcceptance,
        OrderStatus::Preparing,
        OrderStatus::ReadyForPickup,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::RestaurantRejected,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn happy_path_edges_are_legal() {
        use OrderStatus::*;
        for (from, to) in [
            (PendingRestaurantAcceptance, Preparing),
            (Preparing, ReadyForPickup),
            (ReadyForPickup, OutForDelivery),
            (OutForDelivery, Delivered),
        ] {
            assert!(from.can_transition_to(to), "{from} -> {to} should be legal");
        }
    }

    #[test]
    fn branches_only_from_pending() {
        use OrderStatus::*;
        assert!(PendingRestaurantAcceptance.can_transition_to(RestaurantRejected));
        assert!(PendingRestaurantAcceptance.can_transition_to(Cancelled));
        assert!(!Preparing.can_transition_to(Cancelled));
        assert!(!ReadyForPickup.can_transition_to(RestaurantRejected));
    }

    #[test]
    fn delivered_cannot_be_reached_from_pending() {
        // The original handlers allowed this; the table closes it.
        assert!(!OrderStatus::PendingRestaurantAcceptance.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in ALL.into_iter().filter(OrderStatus::is_terminal) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} escaped terminal");
            }
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in ALL {
            assert_eq!(OrderStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(OrderStatus::from_str("shipped").is_err());
    }

    #[test]
    fn ensure_transition_maps_illegal_edge_to_conflict() {
        let err = ensure_transition("delivered", OrderStatus::Preparing).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let ok = ensure_transition("preparing", OrderStatus::ReadyForPickup).unwrap();
        assert_eq!(ok, OrderStatus::ReadyForPickup);
    }
}
