use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{MenuItem, Restaurant};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertRestaurantRequest {
    pub name: String,
    pub description: Option<String>,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_open: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RestaurantList {
    pub items: Vec<Restaurant>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RestaurantWithMenu {
    pub restaurant: Restaurant,
    pub menu: Vec<MenuItem>,
}
