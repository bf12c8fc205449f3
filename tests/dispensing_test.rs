mod common;

use common::{date, seed_facility, seed_lot, seed_product, setup};
use pharmstock::{
    entities::stock_movement::{self, Entity as StockMovement},
    errors::ServiceError,
    events::Event,
    services::dispensing::{DispenseLine, DispenseRequest},
    services::lots,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

fn request(facility_id: i64, lines: Vec<DispenseLine>) -> DispenseRequest {
    DispenseRequest {
        facility_id,
        dispense_id: Uuid::new_v4(),
        movement_date: date(2025, 3, 10),
        reference_number: Some("DSP-1001".to_string()),
        dispensed_by: Some(Uuid::new_v4()),
        lines,
    }
}

fn line(product_id: i64, quantity: Decimal) -> DispenseLine {
    DispenseLine {
        line_id: Some(Uuid::new_v4()),
        product_id,
        quantity,
    }
}

#[tokio::test]
async fn dispense_writes_one_issued_movement_per_consumed_lot() {
    let mut app = setup().await;
    let db = app.db.as_ref();
    let facility = seed_facility(db, "HC-01").await;
    let product = seed_product(db, "AMOX-500").await;
    seed_lot(db, facility.id, product.id, "A", dec!(5), Some(date(2025, 1, 31))).await;
    seed_lot(db, facility.id, product.id, "B", dec!(10), Some(date(2025, 6, 30))).await;

    let req = request(facility.id, vec![line(product.id, dec!(8))]);
    let dispense_id = req.dispense_id;
    let outcome = app.state.dispensing.dispense(req).await.unwrap();

    assert_eq!(outcome.total_issued, dec!(8));
    assert_eq!(outcome.movement_count, 2);

    let movements = StockMovement::find()
        .filter(stock_movement::Column::SourceId.eq(dispense_id))
        .all(db)
        .await
        .unwrap();
    assert_eq!(movements.len(), 2);
    for movement in &movements {
        assert_eq!(movement.movement_type, "ISSUED");
        assert_eq!(movement.source_type, "DISPENSE");
        assert_eq!(movement.received_quantity, Decimal::ZERO);
    }
    // Ledger carries per-lot batch attribution.
    let by_batch: Vec<(Option<String>, Decimal)> = movements
        .iter()
        .map(|m| (m.batch_number.clone(), m.issued_quantity))
        .collect();
    assert!(by_batch.contains(&(Some("A".to_string()), dec!(5))));
    assert!(by_batch.contains(&(Some("B".to_string()), dec!(3))));

    match app.events.recv().await {
        Some(Event::DispenseCompleted { total_issued, .. }) => {
            assert_eq!(total_issued, dec!(8));
        }
        other => panic!("expected DispenseCompleted, got {:?}", other),
    }
}

#[tokio::test]
async fn bulk_dispense_uses_moh_source_attribution() {
    let mut app = setup().await;
    let db = app.db.as_ref();
    let facility = seed_facility(db, "WH-01").await;
    let product = seed_product(db, "AMOX-500").await;
    seed_lot(db, facility.id, product.id, "A", dec!(100), None).await;

    let req = request(facility.id, vec![line(product.id, dec!(40))]);
    let dispense_id = req.dispense_id;
    app.state.dispensing.dispense_bulk(req).await.unwrap();

    let movements = StockMovement::find()
        .filter(stock_movement::Column::SourceId.eq(dispense_id))
        .all(db)
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].source_type, "MOH_DISPENSE");
    assert_eq!(movements[0].issued_quantity, dec!(40));

    assert!(matches!(
        app.events.recv().await,
        Some(Event::BulkDispenseCompleted { .. })
    ));
}

#[tokio::test]
async fn insufficient_line_halts_the_whole_batch() {
    let app = setup().await;
    let db = app.db.as_ref();
    let facility = seed_facility(db, "HC-01").await;
    let amox = seed_product(db, "AMOX-500").await;
    let para = seed_product(db, "PARA-250").await;
    seed_lot(db, facility.id, amox.id, "A", dec!(50), None).await;
    seed_lot(db, facility.id, para.id, "P", dec!(3), None).await;

    let err = app
        .state
        .dispensing
        .dispense(request(
            facility.id,
            vec![line(amox.id, dec!(10)), line(para.id, dec!(5))],
        ))
        .await
        .unwrap_err();

    match err {
        ServiceError::InsufficientStock(shortfall) => {
            assert_eq!(shortfall.shortages.len(), 1);
            assert_eq!(shortfall.shortages[0].product_id, para.id);
            assert_eq!(shortfall.shortages[0].requested, dec!(5));
            assert_eq!(shortfall.shortages[0].missing, dec!(2));
        }
        other => panic!("expected InsufficientStock, got {:?}", other),
    }

    // The satisfiable line must not have been committed either.
    assert_eq!(
        lots::total_quantity(db, facility.id, amox.id).await.unwrap(),
        dec!(50)
    );
    assert_eq!(
        lots::total_quantity(db, facility.id, para.id).await.unwrap(),
        dec!(3)
    );
    let movements = StockMovement::find().all(db).await.unwrap();
    assert!(movements.is_empty(), "no movement may survive the rollback");
}

#[tokio::test]
async fn shortage_report_covers_every_short_line() {
    let app = setup().await;
    let db = app.db.as_ref();
    let facility = seed_facility(db, "HC-01").await;
    let amox = seed_product(db, "AMOX-500").await;
    let para = seed_product(db, "PARA-250").await;
    let zinc = seed_product(db, "ZINC-20").await;
    seed_lot(db, facility.id, amox.id, "A", dec!(2), None).await;
    seed_lot(db, facility.id, zinc.id, "Z", dec!(30), None).await;

    let err = app
        .state
        .dispensing
        .dispense(request(
            facility.id,
            vec![
                line(amox.id, dec!(10)),
                line(para.id, dec!(4)),
                line(zinc.id, dec!(6)),
            ],
        ))
        .await
        .unwrap_err();

    match err {
        ServiceError::InsufficientStock(shortfall) => {
            assert_eq!(shortfall.shortages.len(), 2);
            let missing: Vec<(i64, Decimal)> = shortfall
                .shortages
                .iter()
                .map(|s| (s.product_id, s.missing))
                .collect();
            assert!(missing.contains(&(amox.id, dec!(8))));
            assert!(missing.contains(&(para.id, dec!(4))));
        }
        other => panic!("expected InsufficientStock, got {:?}", other),
    }
}

#[tokio::test]
async fn empty_line_list_is_rejected() {
    let app = setup().await;
    let db = app.db.as_ref();
    let facility = seed_facility(db, "HC-01").await;

    let err = app
        .state
        .dispensing
        .dispense(request(facility.id, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn zero_quantity_line_dispenses_nothing() {
    let mut app = setup().await;
    let db = app.db.as_ref();
    let facility = seed_facility(db, "HC-01").await;
    let product = seed_product(db, "AMOX-500").await;
    seed_lot(db, facility.id, product.id, "A", dec!(5), None).await;

    let outcome = app
        .state
        .dispensing
        .dispense(request(facility.id, vec![line(product.id, Decimal::ZERO)]))
        .await
        .unwrap();

    assert_eq!(outcome.total_issued, Decimal::ZERO);
    assert_eq!(outcome.movement_count, 0);
    assert_eq!(
        lots::total_quantity(db, facility.id, product.id).await.unwrap(),
        dec!(5)
    );
    assert!(app.events.recv().await.is_some());
}
