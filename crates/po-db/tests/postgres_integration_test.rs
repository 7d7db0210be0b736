//! Requires a live Postgres reachable at `DATABASE_URL`; skips otherwise,
//! matching the teacher's `durable` crate's integration test gating.

use po_db::{Gateway, TransactionOptions};
use po_types::Settings;

fn database_available() -> bool {
    std::env::var("DATABASE_URL").is_ok()
}

#[tokio::test]
async fn client_returns_a_ready_pool_after_warmup() {
    if !database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let settings = Settings::from_env();
    let gateway = Gateway::connect(&settings).await.expect("connect");
    let pool = gateway.client().await.expect("client");
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await.expect("probe");
    assert_eq!(row.0, 1);
}

#[tokio::test]
async fn transaction_rolls_back_on_error() {
    if !database_available() {
        eprintln!("skipping: DATABASE_URL not set");
        return;
    }
    let settings = Settings::from_env();
    let gateway = Gateway::connect(&settings).await.expect("connect");

    let result: Result<(), _> = gateway
        .transaction(TransactionOptions::default(), |tx| {
            Box::pin(async move {
                sqlx::query("SELECT 1").execute(&mut **tx).await?;
                Err(sqlx::Error::RowNotFound)
            })
        })
        .await;

    assert!(result.is_err());
}
