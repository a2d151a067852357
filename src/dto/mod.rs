pub mod auth;
pub mod cart;
pub mod menu;
pub mod orders;
pub mod restaurants;
