//! Connectivity tests for the shared pool builder.
//!
//! These need a reachable PostgreSQL instance (DATABASE_URL) and are ignored
//! by default.

use db_pool::{create_pool, DbConfig};

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_create_pool_and_query() {
    let config = DbConfig::from_env("db-pool-test").expect("DATABASE_URL must be set");
    let pool = create_pool(config).await.expect("pool creation failed");

    let row: (i32,) = sqlx::query_as("SELECT 1")
        .fetch_one(&pool)
        .await
        .expect("probe query failed");
    assert_eq!(row.0, 1);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_pool_respects_max_connections() {
    let mut config = DbConfig::from_env("db-pool-test").expect("DATABASE_URL must be set");
    config.max_connections = 2;
    config.min_connections = 1;
    let pool = create_pool(config).await.expect("pool creation failed");

    // Hold both connections; a third acquire must wait rather than exceed max
    let c1 = pool.acquire().await.expect("first acquire");
    let c2 = pool.acquire().await.expect("second acquire");
    assert_eq!(pool.size(), 2);

    drop(c1);
    drop(c2);
}
