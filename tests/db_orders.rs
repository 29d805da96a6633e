//! Postgres repository behaviour. Run with `DATABASE_URL` set and `--ignored`.

use dishdash::application::repos::{
    OrderQueryFilter, OrderSort, OrdersRepo, OrdersWriteRepo, RepoError, UpdateOrderStatusParams,
};
use dishdash::domain::types::OrderStatus;
use dishdash::infra::db::PostgresRepositories;
use sqlx::PgPool;

async fn insert_order(pool: &PgPool, customer_id: i64, email: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO orders (customer_id, customer_email) VALUES ($1, $2) RETURNING id",
    )
    .bind(customer_id)
    .bind(email)
    .fetch_one(pool)
    .await
    .expect("insert order")
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn versioned_update_detects_conflicts(pool: PgPool) {
    let id = insert_order(&pool, 7, "alice@example.com").await;
    let repos = PostgresRepositories::new(pool);

    let current = repos
        .find_by_id(id)
        .await
        .expect("find")
        .expect("order exists");
    assert_eq!(current.status, OrderStatus::OrderPlaced);
    assert_eq!(current.version, 1);

    let updated = repos
        .update_order_status(UpdateOrderStatusParams {
            id,
            expected_version: 1,
            status: OrderStatus::OrderConfirmed,
            paid: false,
            cancel_reason: None,
        })
        .await
        .expect("first write");
    assert_eq!(updated.version, 2);
    assert_eq!(updated.status, OrderStatus::OrderConfirmed);

    let stale = repos
        .update_order_status(UpdateOrderStatusParams {
            id,
            expected_version: 1,
            status: OrderStatus::OrderProcessing,
            paid: false,
            cancel_reason: None,
        })
        .await
        .expect_err("stale version");
    assert!(matches!(stale, RepoError::Conflict { expected_version: 1, .. }));

    let missing = repos
        .update_order_status(UpdateOrderStatusParams {
            id: id + 1000,
            expected_version: 1,
            status: OrderStatus::OrderConfirmed,
            paid: false,
            cancel_reason: None,
        })
        .await
        .expect_err("missing row");
    assert!(matches!(missing, RepoError::NotFound));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn check_constraints_surface_as_integrity_errors(pool: PgPool) {
    let id = insert_order(&pool, 7, "alice@example.com").await;
    let repos = PostgresRepositories::new(pool);

    let err = repos
        .update_order_status(UpdateOrderStatusParams {
            id,
            expected_version: 1,
            status: OrderStatus::Cancelled,
            paid: false,
            cancel_reason: None,
        })
        .await
        .expect_err("cancel without reason");
    assert!(matches!(err, RepoError::Integrity { .. }), "{err:?}");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn listing_filters_pages_and_counts(pool: PgPool) {
    let first = insert_order(&pool, 7, "alice@example.com").await;
    let second = insert_order(&pool, 7, "ALICE.work@example.com").await;
    insert_order(&pool, 8, "bob@example.com").await;
    let repos = PostgresRepositories::new(pool);

    let page = repos
        .list_orders(&OrderQueryFilter {
            customer_id: Some(7),
            sort: OrderSort::OldestFirst,
            per_page: 1,
            ..Default::default()
        })
        .await
        .expect("list");
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, first);

    let searched = repos
        .list_orders(&OrderQueryFilter {
            search: Some("alice.work".to_string()),
            ..Default::default()
        })
        .await
        .expect("search");
    assert_eq!(searched.total, 1);
    assert_eq!(searched.items[0].id, second);

    let counts = repos.count_by_status().await.expect("counts");
    assert_eq!(counts.len(), OrderStatus::ALL.len());
    assert_eq!(counts[0].status, OrderStatus::OrderPlaced);
    assert_eq!(counts[0].count, 3);
    assert!(counts[1..].iter().all(|c| c.count == 0));

    let statuses = repos.list_statuses().await.expect("statuses");
    let labels: Vec<_> = statuses.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels[0], "Order Placed");
    assert_eq!(labels[5], "Cancelled");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn search_treats_wildcards_literally(pool: PgPool) {
    let literal = insert_order(&pool, 7, "a_b@example.com").await;
    insert_order(&pool, 8, "axb@example.com").await;
    insert_order(&pool, 9, "half%off@example.com").await;
    let repos = PostgresRepositories::new(pool);

    let underscore = repos
        .list_orders(&OrderQueryFilter {
            search: Some("a_b".to_string()),
            ..Default::default()
        })
        .await
        .expect("search");
    assert_eq!(underscore.total, 1);
    assert_eq!(underscore.items[0].id, literal);

    let percent = repos
        .list_orders(&OrderQueryFilter {
            search: Some("%off".to_string()),
            ..Default::default()
        })
        .await
        .expect("search");
    assert_eq!(percent.total, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn health_check_succeeds(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    repos.health_check().await.expect("healthy");
}
