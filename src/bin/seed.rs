use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_delivery_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let pool = create_pool(&config.database_url).await?;

    let customer_id =
        ensure_user(&pool, "customer@example.com", "customer123", "Casey Customer", "customer")
            .await?;
    let owner_id =
        ensure_user(&pool, "owner@example.com", "owner123", "Olive Owner", "restaurant").await?;
    let rider_id =
        ensure_user(&pool, "rider@example.com", "rider123", "Riley Rider", "rider").await?;

    let restaurant_id = ensure_restaurant(&pool, owner_id).await?;
    seed_menu(&pool, restaurant_id).await?;

    println!(
        "Seed completed. Customer: {customer_id}, Owner: {owner_id}, Rider: {rider_id}, Restaurant: {restaurant_id}"
    );
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    name: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, role) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(role)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn ensure_restaurant(pool: &sqlx::PgPool, owner_id: Uuid) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM restaurants WHERE owner_id = $1")
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO restaurants (id, owner_id, name, description, address, latitude, longitude)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind("Demo Diner")
    .bind("Seeded demo restaurant")
    .bind("1 Demo Street")
    .bind(23.7808875_f64)
    .bind(90.2792371_f64)
    .execute(pool)
    .await?;
    Ok(id)
}

async fn seed_menu(pool: &sqlx::PgPool, restaurant_id: Uuid) -> anyhow::Result<()> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM menu_items WHERE restaurant_id = $1")
        .bind(restaurant_id)
        .fetch_one(pool)
        .await?;
    if count.0 > 0 {
        return Ok(());
    }

    for (name, price) in [("Beef Burger", 45_000_i64), ("Fries", 12_000), ("Iced Tea", 8_000)] {
        sqlx::query(
            "INSERT INTO menu_items (id, restaurant_id, name, price) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(restaurant_id)
        .bind(name)
        .bind(price)
        .execute(pool)
        .await?;
    }
    Ok(())
}
