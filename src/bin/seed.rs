use rust_decimal::Decimal;
use storefront_api::{
    config::AppConfig,
    db::{DbPool, create_pool, orm_from_pool, run_migrations},
    services::auth_service::hash_password,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront_api=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let pool = create_pool(&config.database_url, 2).await?;
    // Ensure migrations are applied.
    run_migrations(&orm_from_pool(&pool)).await?;

    let admin_id = ensure_admin(&pool, "admin", "admin@example.com", "admin123").await?;
    let user_id = ensure_user(&pool, "Ferris", "Crab", "user@example.com", "user1234").await?;
    seed_catalog(&pool).await?;

    tracing::info!(admin_id, user_id, "seed completed");
    Ok(())
}

async fn ensure_admin(
    pool: &DbPool,
    username: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<i64> {
    let password_hash = hash_password(password).await?;
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO admins (username, email, password_hash)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET username = EXCLUDED.username
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .fetch_one(pool)
    .await?;

    tracing::info!(email, "ensured admin");
    Ok(id)
}

async fn ensure_user(
    pool: &DbPool,
    first_name: &str,
    last_name: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<i64> {
    let password_hash = hash_password(password).await?;
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET first_name = EXCLUDED.first_name
        RETURNING id
        "#,
    )
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(password_hash)
    .fetch_one(pool)
    .await?;

    tracing::info!(email, "ensured user");
    Ok(id)
}

/// (category, product, price in cents, [(size, color, stock)])
type SeedProduct = (
    &'static str,
    &'static str,
    i64,
    &'static [(&'static str, &'static str, i32)],
);

async fn seed_catalog(pool: &DbPool) -> anyhow::Result<()> {
    let products: [SeedProduct; 4] = [
        (
            "Apparel",
            "Axum Hoodie",
            5499,
            &[("M", "Black", 20), ("L", "Black", 15), ("L", "Orange", 5)],
        ),
        ("Apparel", "Ferris T-Shirt", 2499, &[("S", "White", 30), ("M", "White", 30)]),
        ("Accessories", "Ferris Mug", 1299, &[("One Size", "White", 100)]),
        ("Accessories", "Rust Sticker Pack", 499, &[("One Size", "Mixed", 200)]),
    ];

    for (category, name, cents, variations) in products {
        let (category_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO categories (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(category)
        .fetch_one(pool)
        .await?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM products WHERE name = $1 AND category_id = $2")
                .bind(name)
                .bind(category_id)
                .fetch_optional(pool)
                .await?;
        if existing.is_some() {
            continue;
        }

        let mut tx = pool.begin().await?;
        let (product_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO products (category_id, name, price, description)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(category_id)
        .bind(name)
        .bind(Decimal::new(cents, 2))
        .bind(format!("{name} from the demo catalog"))
        .fetch_one(&mut *tx)
        .await?;

        for &(size, color, stock) in variations {
            sqlx::query(
                "INSERT INTO product_variation (product_id, size, color, stock) VALUES ($1, $2, $3, $4)",
            )
            .bind(product_id)
            .bind(size)
            .bind(color)
            .bind(stock)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
    }

    tracing::info!("seeded catalog");
    Ok(())
}
