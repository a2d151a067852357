use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest},
        cart::{AddToCartRequest, CartItemDto, CartList},
        menu::{CreateMenuItemRequest, MenuItemList, UpdateMenuItemRequest},
        orders::{
            CheckoutRequest, CheckoutResponse, MessageRequest, OrderList, OrderWithItems,
            ReviewList, ReviewRequest,
        },
        restaurants::{RestaurantList, RestaurantWithMenu, UpsertRestaurantRequest},
    },
    lifecycle::{OrderStatus, Role},
    models::{CartItem, MenuItem, Order, OrderItem, Restaurant, Review, User},
    outbox::StoredEvent,
    response::{ApiResponse, Meta},
    routes::{auth, cart, events, health, orders, params, profile, restaurant, restaurants, rider, ws},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        profile::get_profile,
        profile::update_profile,
        restaurants::list_restaurants,
        restaurants::get_restaurant,
        restaurants::list_reviews,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        orders::cancel_order,
        orders::review_order,
        orders::send_message,
        restaurant::get_profile,
        restaurant::upsert_profile,
        restaurant::list_menu,
        restaurant::create_menu_item,
        restaurant::update_menu_item,
        restaurant::delete_menu_item,
        restaurant::list_orders,
        restaurant::accept_order,
        restaurant::reject_order,
        restaurant::mark_ready,
        rider::list_open_deliveries,
        rider::claim_delivery,
        rider::mark_picked_up,
        rider::mark_delivered,
        rider::list_my_deliveries,
        events::list_events,
        ws::ws_upgrade
    ),
    components(
        schemas(
            User,
            Restaurant,
            MenuItem,
            CartItem,
            Order,
            OrderItem,
            Review,
            OrderStatus,
            Role,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateProfileRequest,
            AddToCartRequest,
            CartItemDto,
            CartList,
            CreateMenuItemRequest,
            UpdateMenuItemRequest,
            MenuItemList,
            CheckoutRequest,
            CheckoutResponse,
            MessageRequest,
            OrderList,
            OrderWithItems,
            ReviewRequest,
            ReviewList,
            UpsertRestaurantRequest,
            RestaurantList,
            RestaurantWithMenu,
            StoredEvent,
            events::EventList,
            ws::WsParams,
            params::Pagination,
            params::RestaurantQuery,
            params::OrderListQuery,
            params::EventsQuery,
            Meta,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<CheckoutResponse>,
            ApiResponse<RestaurantList>,
            ApiResponse<RestaurantWithMenu>,
            ApiResponse<MenuItemList>,
            ApiResponse<CartList>,
            ApiResponse<ReviewList>,
            ApiResponse<events::EventList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Profile", description = "Account profile"),
        (name = "Restaurants", description = "Public restaurant browsing"),
        (name = "Cart", description = "Customer cart"),
        (name = "Orders", description = "Customer orders"),
        (name = "Restaurant dashboard", description = "Restaurant-side management"),
        (name = "Rider", description = "Rider delivery workflow"),
        (name = "Events", description = "Realtime socket and catch-up cursor"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
