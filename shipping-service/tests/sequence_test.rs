mod common;

use chrono::{NaiveDate, Utc};
use common::{item, shipping_order, TestContext};
use rust_decimal_macros::dec;
use shipping_service::models::ShippingOrder;
use shipping_service::services::store::{StoreError, StoreResult, HUMAN_NUMBER_CONSTRAINT};
use shipping_service::services::SequenceAllocator;
use shipping_service::ShippingError;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn generated_numbers_follow_date_and_sequence() {
    let ctx = TestContext::new();
    ctx.receive(&ctx.amoxicillin, 100, dec!(1), 1).await;

    let first = ctx
        .services
        .orders
        .create(shipping_order(vec![item("AMOX500", 1, dec!(2))]))
        .await
        .unwrap();
    let second = ctx
        .services
        .orders
        .create(shipping_order(vec![item("AMOX500", 1, dec!(2))]))
        .await
        .unwrap();

    let prefix = format!("SO{}-", Utc::now().date_naive().format("%Y%m%d"));
    assert_eq!(first.order.human_number, format!("{}001", prefix));
    assert_eq!(second.order.human_number, format!("{}002", prefix));
    assert_eq!(second.order.order_number, second.order.human_number);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_creation_yields_distinct_numbers() {
    const N: usize = 16;
    let ctx = Arc::new(TestContext::new());
    ctx.receive(&ctx.amoxicillin, 1_000, dec!(1), 1).await;

    let mut handles = Vec::with_capacity(N);
    for _ in 0..N {
        let orders = ctx.services.orders.clone();
        handles.push(tokio::spawn(async move {
            orders
                .create(shipping_order(vec![item("AMOX500", 1, dec!(2))]))
                .await
        }));
    }

    let mut numbers = HashSet::new();
    for handle in handles {
        let outcome = handle.await.expect("task panicked").expect("create order");
        numbers.insert(outcome.order.human_number);
    }

    assert_eq!(numbers.len(), N);
    let prefix = format!("SO{}-", Utc::now().date_naive().format("%Y%m%d"));
    for n in 1..=N {
        assert!(numbers.contains(&format!("{}{:03}", prefix, n)));
    }
}

#[tokio::test]
async fn candidate_number_collision_is_reported_not_suffixed() {
    let ctx = TestContext::new();
    ctx.receive(&ctx.amoxicillin, 10, dec!(1), 1).await;

    let mut request = shipping_order(vec![item("AMOX500", 1, dec!(2))]);
    request.order_number = Some("so-100".to_string());
    let created = ctx.services.orders.create(request.clone()).await.unwrap();
    assert_eq!(created.order.human_number, "SO-100");

    request.order_number = Some("  SO-100 ".to_string());
    let err = ctx.services.orders.create(request).await.unwrap_err();
    assert!(matches!(err, ShippingError::DuplicateOrderNumber(n) if n == "SO-100"));
}

#[tokio::test]
async fn number_of_deleted_order_can_be_reused() {
    let ctx = TestContext::new();
    ctx.receive(&ctx.amoxicillin, 10, dec!(1), 1).await;

    let mut request = shipping_order(vec![item("AMOX500", 1, dec!(2))]);
    request.order_number = Some("SO-200".to_string());
    let original = ctx.services.orders.create(request.clone()).await.unwrap();
    ctx.services.orders.delete(original.order.id).await.unwrap();

    let reused = ctx.services.orders.create(request).await.unwrap();

    assert_eq!(reused.order.human_number, "SO-200");
    assert_eq!(reused.order.order_number, "SO-200-1");
    assert_ne!(reused.order.id, original.order.id);
}

#[tokio::test]
async fn allocation_gives_up_after_max_attempts() {
    let ctx = TestContext::new();
    let allocator = SequenceAllocator::new(ctx.store.clone(), "SO", 3);
    let day = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
    let mut tried = Vec::new();

    let result: Result<ShippingOrder, ShippingError> = allocator
        .reserve_on(day, None, |number| {
            tried.push(number.human_number.clone());
            async move {
                StoreResult::<ShippingOrder>::Err(StoreError::unique(HUMAN_NUMBER_CONSTRAINT))
            }
        })
        .await;

    assert!(matches!(result, Err(ShippingError::SequenceExhausted(3))));
    assert_eq!(
        tried,
        vec!["SO20260115-001", "SO20260115-002", "SO20260115-003"]
    );
}

#[tokio::test]
async fn blank_candidate_is_rejected() {
    let ctx = TestContext::new();
    let mut request = shipping_order(vec![item("AMOX500", 1, dec!(2))]);
    request.order_number = Some("   ".to_string());

    let err = ctx.services.orders.create(request).await.unwrap_err();
    assert!(matches!(err, ShippingError::Validation(_)));
}
