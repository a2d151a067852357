use axum_delivery_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        cart::AddToCartRequest,
        menu::CreateMenuItemRequest,
        orders::{CheckoutRequest, ReviewRequest},
        restaurants::UpsertRestaurantRequest,
    },
    entity::users::ActiveModel as UserActive,
    error::AppError,
    lifecycle::Role,
    middleware::auth::AuthUser,
    notify::{NotificationHub, rooms_for_user},
    outbox::{dispatch_batch, events_after},
    services::{cart_service, order_service, restaurant_service, rider_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

// Full order lifecycle: cart -> checkout -> accept -> claim (with a losing
// rider) -> ready -> pickup -> delivered -> review, checking the outbox and
// the event catch-up cursor along the way.
#[tokio::test]
async fn order_lifecycle_with_claim_race() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let customer = auth(create_user(&state, "customer", "customer@example.com").await?, Role::Customer);
    let owner = auth(create_user(&state, "restaurant", "owner@example.com").await?, Role::Restaurant);
    let rider = auth(create_user(&state, "rider", "rider@example.com").await?, Role::Rider);
    let rival = auth(create_user(&state, "rider", "rival@example.com").await?, Role::Rider);

    // Restaurant profile and one menu item.
    let restaurant = restaurant_service::upsert_restaurant(
        &state,
        &owner,
        UpsertRestaurantRequest {
            name: "Test Diner".into(),
            description: None,
            address: "1 Test Street".into(),
            latitude: -6.2,
            longitude: 106.8,
            is_open: Some(true),
        },
    )
    .await?
    .data
    .unwrap();

    let burger = restaurant_service::create_menu_item(
        &state,
        &owner,
        CreateMenuItemRequest {
            name: "Burger".into(),
            description: None,
            price: 45_000,
            available: Some(true),
        },
    )
    .await?
    .data
    .unwrap();

    // Cart and checkout.
    cart_service::add_to_cart(
        &state.pool,
        &customer,
        AddToCartRequest {
            menu_item_id: burger.id,
            quantity: 2,
        },
    )
    .await?;

    let checkout = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest {
            dropoff_addr: "Somewhere".into(),
            dropoff_latitude: -6.3,
            dropoff_longitude: 106.9,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(checkout.orders.len(), 1);
    let order = &checkout.orders[0].order;
    assert_eq!(order.status, "pending_restaurant_acceptance");
    assert_eq!(order.total_amount, 90_000);
    assert_eq!(checkout.orders[0].items.len(), 1);

    // Checkout queued a new_order row addressed to the restaurant room.
    assert_eq!(count_events(&state, "new_order").await?, 1);

    // Accept: pending -> preparing, plus a riders-room new_delivery row.
    let accepted = restaurant_service::accept_order(&state, &owner, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(accepted.status, "preparing");
    assert_eq!(count_events(&state, "new_delivery").await?, 1);

    // Two riders race for the claim; exactly one wins.
    let claimed = rider_service::claim_delivery(&state, &rider, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(claimed.rider_id, Some(rider.user_id));

    let lost = rider_service::claim_delivery(&state, &rival, order.id).await;
    assert!(
        matches!(lost, Err(AppError::Conflict(_))),
        "second claim should conflict, got {lost:?}"
    );

    // Kitchen done, rider picks up and delivers.
    let ready = restaurant_service::mark_ready(&state, &owner, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(ready.status, "ready_for_pickup");

    // The losing rider cannot drive someone else's delivery.
    let not_yours = rider_service::mark_picked_up(&state, &rival, order.id).await;
    assert!(matches!(not_yours, Err(AppError::Forbidden)));

    let picked_up = rider_service::mark_picked_up(&state, &rider, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(picked_up.status, "out_for_delivery");

    let delivered = rider_service::mark_delivered(&state, &rider, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(delivered.status, "delivered");
    assert!(delivered.delivered_at.is_some());

    // One review per delivered order.
    let review = order_service::review_order(
        &state,
        &customer,
        order.id,
        ReviewRequest {
            rating: 5,
            comment: Some("great".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(review.restaurant_id, restaurant.id);

    let again = order_service::review_order(
        &state,
        &customer,
        order.id,
        ReviewRequest {
            rating: 4,
            comment: None,
        },
    )
    .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    // The dispatcher publishes every queued row; a subscriber in the
    // customer's room sees the status updates.
    let mut rx = state.hub.subscribe();
    let published = dispatch_batch(&state.pool, &state.hub).await?;
    assert!(published >= 5, "expected queued events, published {published}");

    let customer_rooms = rooms_for_user(&state.pool, &customer).await?;
    let mut seen_for_customer = 0;
    while let Ok(envelope) = rx.try_recv() {
        if envelope.addressed_to_any(&customer_rooms) {
            seen_for_customer += 1;
        }
    }
    assert!(seen_for_customer >= 4, "customer room missed events");

    // Catch-up cursor: the customer replays the history, a stranger sees
    // nothing, and a cursor past the end is empty.
    let replay = events_after(&state.pool, &customer_rooms, 0, 100).await?;
    assert!(!replay.is_empty());
    let last_seq = replay.last().map(|e| e.seq).unwrap_or(0);
    assert!(events_after(&state.pool, &customer_rooms, last_seq, 100).await?.is_empty());

    let stranger = auth(create_user(&state, "customer", "stranger@example.com").await?, Role::Customer);
    let stranger_rooms = rooms_for_user(&state.pool, &stranger).await?;
    assert!(events_after(&state.pool, &stranger_rooms, 0, 100).await?.is_empty());

    // Second order exercises the cancel and reject branches.
    cart_service::add_to_cart(
        &state.pool,
        &customer,
        AddToCartRequest {
            menu_item_id: burger.id,
            quantity: 1,
        },
    )
    .await?;
    let second = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest {
            dropoff_addr: "Elsewhere".into(),
            dropoff_latitude: -6.3,
            dropoff_longitude: 106.9,
        },
    )
    .await?
    .data
    .unwrap();
    let second_id = second.orders[0].order.id;

    let cancelled = order_service::cancel_order(&state, &customer, second_id)
        .await?
        .data
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");

    // Terminal: the restaurant can no longer accept it.
    let too_late = restaurant_service::accept_order(&state, &owner, second_id).await;
    assert!(matches!(too_late, Err(AppError::Conflict(_))));

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    let pool = create_pool(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_events, order_items, reviews, orders, cart_items, menu_items, restaurants, audit_logs, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool,
        orm,
        hub: NotificationHub::default(),
    })
}

fn auth(user_id: Uuid, role: Role) -> AuthUser {
    AuthUser { user_id, role }
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        name: Set(email.split('@').next().unwrap_or("user").to_string()),
        phone: Set(None),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn count_events(state: &AppState, name: &str) -> anyhow::Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT count(*) FROM order_events WHERE event = $1")
            .bind(name)
            .fetch_one(&state.pool)
            .await?;
    Ok(count)
}
