use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Order, OrderItem, Review};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub dropoff_addr: String,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

/// Checkout produces one order per restaurant present in the cart.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub orders: Vec<OrderWithItems>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewList {
    pub items: Vec<Review>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MessageRequest {
    pub body: String,
}
