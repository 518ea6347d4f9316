use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use wallet_ledger::adapters::{HttpOrderGateway, InMemoryLedgerStore};
use wallet_ledger::domain::{
    Destination, OrderPaymentStatus, TransactionSource, TransactionStatus, TransactionType,
    TransferRequest,
};
use wallet_ledger::ports::{OrderGateway, OrderGatewayError};
use wallet_ledger::services::{
    CacheInvalidator, RetryPolicy, StatusSynchronizer, TransactionProcessor,
};

#[tokio::test]
async fn test_pushes_payment_status_as_json() {
    let mut server = mockito::Server::new_async().await;
    let order_id = Uuid::new_v4();

    let mock = server
        .mock("PUT", format!("/orders/{}/payment-status", order_id).as_str())
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({ "payment_status": "PAID" })))
        .with_status(204)
        .create_async()
        .await;

    let gateway = HttpOrderGateway::new(server.url());
    gateway
        .set_order_payment_status(order_id, OrderPaymentStatus::Paid)
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_unknown_order_maps_to_not_found() {
    let mut server = mockito::Server::new_async().await;
    let order_id = Uuid::new_v4();

    let _mock = server
        .mock("PUT", format!("/orders/{}/payment-status", order_id).as_str())
        .with_status(404)
        .create_async()
        .await;

    let result = HttpOrderGateway::new(server.url())
        .set_order_payment_status(order_id, OrderPaymentStatus::Failed)
        .await;

    assert!(matches!(result, Err(OrderGatewayError::OrderNotFound(id)) if id == order_id));
}

#[tokio::test]
async fn test_circuit_breaker_opens_after_failures() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("PUT", Matcher::Regex(r"^/orders/.*/payment-status$".into()))
        .with_status(500)
        .expect(3)
        .create_async()
        .await;

    let gateway = HttpOrderGateway::with_circuit_breaker(server.url(), 3, 30);

    for _ in 0..3 {
        let result = gateway
            .set_order_payment_status(Uuid::new_v4(), OrderPaymentStatus::Paid)
            .await;
        assert!(matches!(result, Err(OrderGatewayError::UnexpectedStatus(500))));
    }

    let result = gateway
        .set_order_payment_status(Uuid::new_v4(), OrderPaymentStatus::Paid)
        .await;
    assert!(matches!(result, Err(OrderGatewayError::CircuitBreakerOpen(_))));
    assert_eq!(gateway.circuit_state(), "open");
}

#[tokio::test]
async fn test_completed_purchase_marks_order_paid_over_http() {
    let mut server = mockito::Server::new_async().await;
    let order_id = Uuid::new_v4();

    let mock = server
        .mock("PUT", format!("/orders/{}/payment-status", order_id).as_str())
        .match_body(Matcher::Json(json!({ "payment_status": "PAID" })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let store = InMemoryLedgerStore::new();
    let buyer = store.seed_wallet(Uuid::new_v4(), "20.00".parse().unwrap()).await;
    let seller = store.seed_wallet(Uuid::new_v4(), "0.00".parse().unwrap()).await;

    let processor = TransactionProcessor::new(
        Arc::new(store.clone()),
        CacheInvalidator::disabled(),
        RetryPolicy::default(),
    );
    let outcome = processor
        .create_transaction(
            TransferRequest::new(
                buyer.user_id,
                TransactionType::Purchase,
                "20.00".parse().unwrap(),
                TransactionSource::Wallet,
            )
            .from_wallet(buyer.id)
            .to(Destination::User(seller.user_id))
            .with_status(TransactionStatus::Pending),
        )
        .await
        .unwrap();

    let sync = StatusSynchronizer::new(
        Arc::new(store.clone()),
        Some(Arc::new(HttpOrderGateway::new(server.url())) as Arc<dyn OrderGateway>),
    );
    for _ in 0..2 {
        sync.update_transaction_status(outcome.transaction.id, TransactionStatus::Completed, Some(order_id))
            .await
            .unwrap();
    }

    mock.assert_async().await;
}
