mod common;

use chrono::Utc;
use common::{days_before_now, TestContext};
use futures::TryStreamExt;
use rust_decimal_macros::dec;
use shipping_service::models::{LedgerEntry, MovementKind};
use shipping_service::services::{AppendOutcome, MovementRequest};
use shipping_service::ShippingError;
use uuid::Uuid;

fn outbound(product: Uuid, order: Uuid, quantity: i64) -> LedgerEntry {
    LedgerEntry::new(
        product,
        -quantity,
        MovementKind::OutboundShipment,
        dec!(2),
        Utc::now(),
    )
    .with_source(order, "SO-1")
}

#[tokio::test]
async fn repeated_outbound_append_is_already_recorded() {
    let ctx = TestContext::new();
    ctx.receive(&ctx.amoxicillin, 10, dec!(1), 1).await;
    let order = Uuid::new_v4();

    let first = ctx
        .services
        .inventory
        .append(outbound(ctx.amoxicillin.id, order, 4))
        .await
        .unwrap();
    let second = ctx
        .services
        .inventory
        .append(outbound(ctx.amoxicillin.id, order, 4))
        .await
        .unwrap();

    assert!(first.is_new());
    assert!(matches!(second, AppendOutcome::AlreadyRecorded(ref e) if e.id == first.entry().id));
    assert_eq!(ctx.on_hand(&ctx.amoxicillin).await, 6);
}

#[tokio::test]
async fn outbound_append_with_other_quantity_conflicts() {
    let ctx = TestContext::new();
    let order = Uuid::new_v4();

    ctx.services
        .inventory
        .append(outbound(ctx.amoxicillin.id, order, 4))
        .await
        .unwrap();
    let err = ctx
        .services
        .inventory
        .append(outbound(ctx.amoxicillin.id, order, 5))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ShippingError::LedgerWriteConflict { order_id, kind: MovementKind::OutboundShipment, .. }
            if order_id == order
    ));
    assert_eq!(ctx.on_hand(&ctx.amoxicillin).await, -4);
}

#[tokio::test]
async fn record_movement_refuses_outbound_kinds() {
    let ctx = TestContext::new();

    let err = ctx
        .services
        .inventory
        .record_movement(MovementRequest {
            product_ref: ctx.amoxicillin.id,
            kind: MovementKind::OutboundSale,
            signed_quantity: -2,
            unit_amount: dec!(1),
            occurred_at: None,
            note: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ShippingError::Validation(_)));
    assert_eq!(ctx.on_hand(&ctx.amoxicillin).await, 0);
}

#[tokio::test]
async fn record_movement_validates_quantity_and_product() {
    let ctx = TestContext::new();
    let zero_adjustment = MovementRequest {
        product_ref: ctx.amoxicillin.id,
        kind: MovementKind::Adjustment,
        signed_quantity: 0,
        unit_amount: dec!(1),
        occurred_at: None,
        note: None,
    };
    let err = ctx
        .services
        .inventory
        .record_movement(zero_adjustment.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ShippingError::Validation(_)));

    let unknown = MovementRequest {
        product_ref: Uuid::new_v4(),
        signed_quantity: 3,
        kind: MovementKind::Inbound,
        ..zero_adjustment
    };
    let err = ctx
        .services
        .inventory
        .record_movement(unknown)
        .await
        .unwrap_err();
    assert!(matches!(err, ShippingError::ProductNotFound(_)));
}

#[tokio::test]
async fn record_movement_rejects_out_of_range_amounts() {
    let ctx = TestContext::new();
    let too_many = MovementRequest {
        product_ref: ctx.amoxicillin.id,
        kind: MovementKind::Adjustment,
        signed_quantity: i64::MIN,
        unit_amount: dec!(1),
        occurred_at: None,
        note: None,
    };
    let err = ctx
        .services
        .inventory
        .record_movement(too_many.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ShippingError::Validation(_)));

    let too_costly = MovementRequest {
        kind: MovementKind::Inbound,
        signed_quantity: 1_000_000_000,
        unit_amount: dec!(100000000000000000000),
        ..too_many
    };
    let err = ctx
        .services
        .inventory
        .record_movement(too_costly)
        .await
        .unwrap_err();
    assert!(matches!(err, ShippingError::Validation(_)));
    assert_eq!(ctx.on_hand(&ctx.amoxicillin).await, 0);
}

#[tokio::test]
async fn negative_adjustment_reduces_on_hand() {
    let ctx = TestContext::new();
    ctx.receive(&ctx.paracetamol, 20, dec!(0.5), 2).await;

    let entry = ctx
        .services
        .inventory
        .record_movement(MovementRequest {
            product_ref: ctx.paracetamol.id,
            kind: MovementKind::Adjustment,
            signed_quantity: -3,
            unit_amount: dec!(0.5),
            occurred_at: None,
            note: Some("broken blister".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(entry.total_amount, dec!(1.5));
    assert_eq!(entry.note.as_deref(), Some("broken blister"));
    assert_eq!(ctx.on_hand(&ctx.paracetamol).await, 17);
}

#[tokio::test]
async fn product_ledger_pages_in_time_order() {
    let ctx = TestContext::new();
    for days_ago in [5, 1, 3, 2, 4] {
        ctx.receive(&ctx.amoxicillin, days_ago, dec!(1), days_ago).await;
    }

    let first = ctx
        .services
        .inventory
        .list_by_product(ctx.amoxicillin.id, None, None, Some(2))
        .await
        .unwrap();
    let second = ctx
        .services
        .inventory
        .list_by_product(ctx.amoxicillin.id, None, first.next_cursor, Some(2))
        .await
        .unwrap();
    let third = ctx
        .services
        .inventory
        .list_by_product(ctx.amoxicillin.id, None, second.next_cursor, Some(2))
        .await
        .unwrap();

    let quantities: Vec<i64> = first
        .entries
        .iter()
        .chain(&second.entries)
        .chain(&third.entries)
        .map(|e| e.signed_quantity)
        .collect();
    assert_eq!(quantities, vec![5, 4, 3, 2, 1]);
    assert!(third.next_cursor.is_none());
}

#[tokio::test]
async fn stream_walks_every_page_and_resumes_from_cursor() {
    let ctx = TestContext::new();
    for days_ago in (1..=7).rev() {
        ctx.receive(&ctx.amoxicillin, 1, dec!(1), days_ago).await;
    }

    // Page size in the test config is 3, so seven entries span three pages.
    let all: Vec<LedgerEntry> = ctx
        .services
        .inventory
        .stream_by_product(ctx.amoxicillin.id, None, None)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(all.len(), 7);
    assert!(all.windows(2).all(|w| w[0].cursor() < w[1].cursor()));

    let resumed: Vec<LedgerEntry> = ctx
        .services
        .inventory
        .stream_by_product(ctx.amoxicillin.id, None, Some(all[3].cursor()))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(resumed, all[4..].to_vec());
}

#[tokio::test]
async fn kind_filter_limits_listing() {
    let ctx = TestContext::new();
    ctx.receive(&ctx.amoxicillin, 5, dec!(1), 3).await;
    ctx.services
        .inventory
        .record_movement(MovementRequest {
            product_ref: ctx.amoxicillin.id,
            kind: MovementKind::Adjustment,
            signed_quantity: -1,
            unit_amount: dec!(1),
            occurred_at: Some(days_before_now(2)),
            note: None,
        })
        .await
        .unwrap();

    let page = ctx
        .services
        .inventory
        .list_by_product(ctx.amoxicillin.id, Some(MovementKind::Adjustment), None, None)
        .await
        .unwrap();

    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].signed_quantity, -1);
}
