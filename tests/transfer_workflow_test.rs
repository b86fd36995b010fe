mod common;

use assert_matches::assert_matches;
use common::{create_payload, operator, TestApp};
use kirim_barang::{
    entities::{HistoryAction, Location, TransferStatus},
    errors::ServiceError,
    services::transfers::filters::{Direction, StatusFilter, TransferFilter},
};

#[tokio::test]
async fn same_location_request_is_refused() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, Some("R1")).await;

    let result = app
        .service()
        .create_request(
            create_payload(Some(Location::A), Location::A, "BRK-001", 2),
            &operator(Location::A),
        )
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn non_positive_request_quantity_is_invalid() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, None).await;

    for quantity in [0, -3] {
        let result = app
            .service()
            .create_request(
                create_payload(Some(Location::A), Location::B, "BRK-001", quantity),
                &operator(Location::A),
            )
            .await;
        assert_matches!(result, Err(ServiceError::InvalidQuantity(_)));
    }
}

#[tokio::test]
async fn unknown_part_without_snapshot_is_not_found() {
    let app = TestApp::new().await;

    let result = app
        .service()
        .create_request(
            create_payload(Some(Location::A), Location::B, "NOPE-1", 1),
            &operator(Location::A),
        )
        .await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn full_lifecycle_moves_the_latest_quantity() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 25, Some("R1")).await;
    app.seed(Location::B, "BRK-001", 3, Some("S9")).await;
    let svc = app.service();
    let a = operator(Location::A);
    let b = operator(Location::B);

    let created = app.raise(Location::A, Location::B, "BRK-001", 10).await;
    assert_eq!(created.status, TransferStatus::Pending);
    assert_eq!(created.display_name, "Item BRK-001");

    let approved = svc.approve(created.id, &a, Some(8)).await.unwrap();
    assert_eq!(approved.status, TransferStatus::Approved);
    assert_eq!(approved.approved_quantity, Some(8));
    assert_eq!(app.stock(Location::A, "BRK-001").await, 25);

    let sent = svc.send(created.id, &a, None).await.unwrap();
    assert_eq!(sent.sent_quantity, Some(8));
    assert_eq!(app.stock(Location::A, "BRK-001").await, 17);
    assert_eq!(app.stock(Location::B, "BRK-001").await, 3);

    let received = svc.receive(created.id, &b).await.unwrap();
    assert_eq!(received.status, TransferStatus::Received);
    assert_eq!(received.received_by.as_deref(), Some("budi"));
    assert_eq!(app.stock(Location::A, "BRK-001").await, 17);
    assert_eq!(app.stock(Location::B, "BRK-001").await, 11);

    // Terminal: nothing else applies
    assert_matches!(
        svc.reject(created.id, &b, "late").await,
        Err(ServiceError::Conflict(_))
    );
    assert_matches!(svc.receive(created.id, &b).await, Err(ServiceError::Conflict(_)));
}

#[tokio::test]
async fn receive_creates_missing_ledger_row_from_snapshot() {
    let app = TestApp::new().await;
    app.seed(Location::A, "CLT-77", 5, Some("R2")).await;
    let svc = app.service();

    let req = app.raise(Location::A, Location::B, "CLT-77", 4).await;
    svc.approve(req.id, &operator(Location::A), None).await.unwrap();
    svc.send(req.id, &operator(Location::A), None).await.unwrap();
    svc.receive(req.id, &operator(Location::B)).await.unwrap();

    let row = svc
        .ledger()
        .find(&*app.state.db, Location::B, "CLT-77")
        .await
        .unwrap()
        .expect("row created at receiving location");
    assert_eq!(row.quantity, 4);
    assert_eq!(row.name, "Item CLT-77");
    assert_eq!(row.brand.as_deref(), Some("Aspira"));
}

#[tokio::test]
async fn reject_after_approve_leaves_ledgers_alone() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, None).await;
    app.seed(Location::B, "BRK-001", 2, None).await;
    let svc = app.service();
    let a = operator(Location::A);

    let req = app.raise(Location::A, Location::B, "BRK-001", 4).await;
    svc.approve(req.id, &a, None).await.unwrap();
    let rejected = svc.reject(req.id, &a, "wrong part").await.unwrap();

    assert_eq!(rejected.status, TransferStatus::Rejected);
    assert_eq!(rejected.reject_reason.as_deref(), Some("wrong part"));
    assert_eq!(rejected.compensated_quantity, None);
    assert_eq!(app.stock(Location::A, "BRK-001").await, 10);
    assert_eq!(app.stock(Location::B, "BRK-001").await, 2);
}

#[tokio::test]
async fn reject_after_send_credits_the_sender() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, None).await;
    let svc = app.service();
    let a = operator(Location::A);
    let b = operator(Location::B);

    let req = app.raise(Location::A, Location::B, "BRK-001", 6).await;
    svc.approve(req.id, &a, None).await.unwrap();
    svc.send(req.id, &a, Some(5)).await.unwrap();
    assert_eq!(app.stock(Location::A, "BRK-001").await, 5);

    // Only the receiving side may refuse goods in transit
    assert_matches!(
        svc.reject(req.id, &a, "changed my mind").await,
        Err(ServiceError::Unauthorized(_))
    );

    let rejected = svc.reject(req.id, &b, "damaged in transit").await.unwrap();
    assert_eq!(rejected.status, TransferStatus::Rejected);
    assert_eq!(rejected.compensated_quantity, Some(5));
    assert_eq!(app.stock(Location::A, "BRK-001").await, 10);
    assert_eq!(app.stock(Location::B, "BRK-001").await, 0);
}

#[tokio::test]
async fn non_positive_overrides_leave_status_unchanged() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, None).await;
    let svc = app.service();
    let a = operator(Location::A);

    let req = app.raise(Location::A, Location::B, "BRK-001", 4).await;
    for quantity in [0, -1] {
        assert_matches!(
            svc.approve(req.id, &a, Some(quantity)).await,
            Err(ServiceError::InvalidQuantity(_))
        );
    }
    assert_eq!(svc.get(req.id).await.unwrap().status, TransferStatus::Pending);

    svc.approve(req.id, &a, None).await.unwrap();
    assert_matches!(
        svc.send(req.id, &a, Some(0)).await,
        Err(ServiceError::InvalidQuantity(_))
    );
    let current = svc.get(req.id).await.unwrap();
    assert_eq!(current.status, TransferStatus::Approved);
    assert_eq!(current.sent_quantity, None);
    assert_eq!(app.stock(Location::A, "BRK-001").await, 10);
}

#[tokio::test]
async fn insufficient_stock_keeps_request_approved() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 3, None).await;
    let svc = app.service();
    let a = operator(Location::A);

    let req = app.raise(Location::A, Location::B, "BRK-001", 2).await;
    svc.approve(req.id, &a, None).await.unwrap();

    assert_matches!(
        svc.send(req.id, &a, Some(9)).await,
        Err(ServiceError::LedgerError(_))
    );
    let current = svc.get(req.id).await.unwrap();
    assert_eq!(current.status, TransferStatus::Approved);
    assert_eq!(current.sent_at, None);
    assert_eq!(app.stock(Location::A, "BRK-001").await, 3);
}

#[tokio::test]
async fn negative_stock_allowed_when_configured() {
    let app = TestApp::with_config(|cfg| cfg.allow_negative_stock = true).await;
    app.seed(Location::A, "BRK-001", 1, None).await;
    let svc = app.service();
    let a = operator(Location::A);

    let req = app.raise(Location::A, Location::B, "BRK-001", 4).await;
    svc.approve(req.id, &a, None).await.unwrap();
    svc.send(req.id, &a, None).await.unwrap();

    assert_eq!(app.stock(Location::A, "BRK-001").await, -3);
}

#[tokio::test]
async fn delete_only_while_pending_and_only_by_receiver() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, None).await;
    let svc = app.service();
    let a = operator(Location::A);
    let b = operator(Location::B);

    let approved = app.raise(Location::A, Location::B, "BRK-001", 1).await;
    svc.approve(approved.id, &a, None).await.unwrap();
    assert_matches!(svc.delete(approved.id, &b).await, Err(ServiceError::Conflict(_)));
    assert!(svc.get(approved.id).await.is_ok());

    let pending = app.raise(Location::A, Location::B, "BRK-001", 1).await;
    assert_matches!(svc.delete(pending.id, &a).await, Err(ServiceError::Unauthorized(_)));
    svc.delete(pending.id, &b).await.unwrap();
    assert_matches!(svc.get(pending.id).await, Err(ServiceError::NotFound(_)));
    assert_eq!(app.stock(Location::A, "BRK-001").await, 10);
}

#[tokio::test]
async fn history_records_each_transition_and_survives_delete() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, None).await;
    let svc = app.service();
    let a = operator(Location::A);
    let b = operator(Location::B);

    let req = app.raise(Location::A, Location::B, "BRK-001", 3).await;
    svc.approve(req.id, &a, None).await.unwrap();
    svc.send(req.id, &a, None).await.unwrap();
    svc.receive(req.id, &b).await.unwrap();
    // Refused transitions leave no trace
    let _ = svc.receive(req.id, &b).await;

    let actions: Vec<HistoryAction> = svc
        .history(req.id)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::Created,
            HistoryAction::Approved,
            HistoryAction::Sent,
            HistoryAction::Received,
        ]
    );

    let doomed = app.raise(Location::A, Location::B, "BRK-001", 1).await;
    svc.update_part_number(doomed.id, &a, "BRK-002").await.unwrap();
    svc.delete(doomed.id, &b).await.unwrap();
    let history = svc.history(doomed.id).await.unwrap();
    let actions: Vec<HistoryAction> = history.iter().map(|h| h.action).collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::Created,
            HistoryAction::PartNumberChanged,
            HistoryAction::Deleted,
        ]
    );
    assert_eq!(history[2].actor, "budi");
}

#[tokio::test]
async fn part_number_edit_only_while_pending() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, None).await;
    let svc = app.service();
    let a = operator(Location::A);

    let req = app.raise(Location::A, Location::B, "BRK-001", 1).await;
    let edited = svc.update_part_number(req.id, &a, " BRK-009 ").await.unwrap();
    assert_eq!(edited.part_number, "BRK-009");
    assert_matches!(
        svc.update_part_number(req.id, &a, "BRK-009").await,
        Err(ServiceError::ValidationError(_))
    );

    svc.approve(req.id, &a, None).await.unwrap();
    assert_matches!(
        svc.update_part_number(req.id, &a, "BRK-010").await,
        Err(ServiceError::Conflict(_))
    );
}

#[tokio::test]
async fn listing_filters_by_direction_status_and_search() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, Some("R1")).await;
    app.seed(Location::A, "FLT-200", 10, Some("R2")).await;
    app.seed(Location::B, "CLT-300", 10, Some("S1")).await;
    let svc = app.service();

    let brake = app.raise(Location::A, Location::B, "BRK-001", 1).await;
    let filter_req = app.raise(Location::A, Location::B, "FLT-200", 1).await;
    let clutch = app.raise(Location::B, Location::A, "CLT-300", 1).await;
    svc.approve(filter_req.id, &operator(Location::A), None)
        .await
        .unwrap();

    let outgoing = svc
        .list_requests(
            Location::A,
            &TransferFilter {
                direction: Direction::Outgoing,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let mut ids: Vec<_> = outgoing.iter().map(|r| r.id).collect();
    ids.sort();
    let mut expected = vec![brake.id, filter_req.id];
    expected.sort();
    assert_eq!(ids, expected);

    let incoming = svc
        .list_requests(
            Location::A,
            &TransferFilter {
                direction: Direction::Incoming,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].id, clutch.id);

    let approved = svc
        .list_requests(
            Location::A,
            &TransferFilter {
                status: StatusFilter::Approved,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, filter_req.id);

    let searched = svc
        .list_requests(
            Location::B,
            &TransferFilter {
                search: Some("brk".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].id, brake.id);
}

#[tokio::test]
async fn annotated_listing_carries_both_ledgers() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, Some("R1")).await;
    app.seed(Location::B, "BRK-001", 4, None).await;

    app.raise(Location::A, Location::B, "BRK-001", 2).await;
    let rows = app
        .service()
        .list_annotated(Location::B, &TransferFilter::default())
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].stock.a, 10);
    assert_eq!(rows[0].stock.b, 4);
    assert_eq!(rows[0].sender_shelf, "R1");
}

#[tokio::test]
async fn in_transit_sums_sent_quantities_per_part() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 20, None).await;
    app.seed(Location::A, "FLT-200", 20, None).await;
    let svc = app.service();
    let a = operator(Location::A);

    for (part, qty) in [("BRK-001", 3), ("BRK-001", 4), ("FLT-200", 2)] {
        let req = app.raise(Location::A, Location::B, part, qty).await;
        svc.approve(req.id, &a, None).await.unwrap();
        svc.send(req.id, &a, None).await.unwrap();
    }
    // Approved but not sent does not count
    let pending = app.raise(Location::A, Location::B, "FLT-200", 9).await;
    svc.approve(pending.id, &a, None).await.unwrap();

    let lines = svc.in_transit_summary(Location::A).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].part_number, "BRK-001");
    assert_eq!(lines[0].quantity, 7);
    assert_eq!(lines[0].requests, 2);
    assert_eq!(lines[1].part_number, "FLT-200");
    assert_eq!(lines[1].quantity, 2);

    assert!(svc.in_transit_summary(Location::B).await.unwrap().is_empty());
}

#[tokio::test]
async fn candidate_search_matches_any_catalog_field() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, Some("R1")).await;
    app.seed(Location::A, "FLT-200", 0, None).await;
    app.seed(Location::B, "BRK-777", 5, None).await;
    let svc = app.service();

    let by_part = svc.search_candidates("brk", Location::A).await.unwrap();
    assert_eq!(by_part.len(), 1);
    assert_eq!(by_part[0].part_number, "BRK-001");
    assert_eq!(by_part[0].shelf_code.as_deref(), Some("R1"));

    let by_application = svc.search_candidates("vario", Location::A).await.unwrap();
    assert_eq!(by_application.len(), 2);

    assert!(svc.search_candidates("  ", Location::A).await.unwrap().is_empty());
    assert!(svc.search_candidates("100%", Location::A).await.unwrap().is_empty());
}
