//! Integration test: LNURL-withdraw callback settlement over HTTP.

use serde_json::json;
use tapcharge_core::{Invoice, InvoiceId, PaymentStatus};
use tapcharge_integration_tests::{regular_request, terminal, test_policy, MockServices, ScriptedCard};

fn invoice(id: &str) -> Invoice {
    Invoice::new(InvoiceId::new(id), 1_500, "SAT", vec![], "lnbc15u1pregular").expect("valid invoice")
}

#[tokio::test]
async fn test_ok_callback_reaches_done_once() {
    let services = MockServices::start().await.unwrap();
    let card = ScriptedCard::new(vec![regular_request(services.withdraw_url())], 0);
    let t = terminal(&services, card, test_policy()).unwrap();
    let inv = invoice("reg-1");

    let snapshot = t.orchestrator.pay(&inv).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Done);

    let done_count = t
        .observer
        .snapshots
        .lock()
        .unwrap()
        .iter()
        .filter(|s| s.status == PaymentStatus::Done)
        .count();
    assert_eq!(done_count, 1);
    assert_eq!(*t.orders.paid.lock().unwrap(), vec![(inv.id.clone(), true)]);

    // The service got the challenge and the payment request
    let queries = services.withdraw_queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].get("k1").map(String::as_str), Some("k1-regular"));
    assert_eq!(queries[0].get("pr").map(String::as_str), Some("lnbc15u1pregular"));
}

#[tokio::test]
async fn test_not_found_is_error_with_status() {
    let services = MockServices::start().await.unwrap();
    let card = ScriptedCard::new(vec![regular_request(services.missing_url())], 0);
    let t = terminal(&services, card, test_policy()).unwrap();

    let snapshot = t.orchestrator.pay(&invoice("reg-2")).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Error);
    assert!(snapshot.error_message.unwrap().contains("404"));
    assert!(t.orders.paid.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_error_body_is_rejected_despite_success_status() {
    let services = MockServices::start().await.unwrap();
    services.set_withdraw_reply(200, json!({ "status": "ERROR", "reason": "withdraw link used" }));
    let card = ScriptedCard::new(vec![regular_request(services.withdraw_url())], 0);
    let t = terminal(&services, card, test_policy()).unwrap();

    let snapshot = t.orchestrator.pay(&invoice("reg-3")).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Error);
    assert!(snapshot.error_message.unwrap().contains("withdraw link used"));
}

#[tokio::test]
async fn test_unsupported_tag_never_calls_out() {
    let services = MockServices::start().await.unwrap();
    let mut request = regular_request(services.withdraw_url());
    request.tag = "channelRequest".into();
    let card = ScriptedCard::new(vec![request], 0);
    let t = terminal(&services, card, test_policy()).unwrap();

    let snapshot = t.orchestrator.pay(&invoice("reg-4")).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Error);
    assert!(services.withdraw_queries().is_empty());
    assert_eq!(services.transfer_posts(), 0);
}

#[tokio::test]
async fn test_error_then_retry_succeeds() {
    let services = MockServices::start().await.unwrap();
    services.set_withdraw_reply(500, json!({ "status": "ERROR", "reason": "busy" }));
    let card = ScriptedCard::new(
        vec![
            regular_request(services.withdraw_url()),
            regular_request(services.withdraw_url()),
        ],
        0,
    );
    let t = terminal(&services, card, test_policy()).unwrap();
    let inv = invoice("reg-5");

    let first = t.orchestrator.pay(&inv).await.unwrap();
    assert_eq!(first.status, PaymentStatus::Error);

    services.set_withdraw_reply(200, json!({ "status": "OK" }));
    let second = t.orchestrator.pay(&inv).await.unwrap();
    assert_eq!(second.status, PaymentStatus::Done);
    assert_eq!(services.withdraw_queries().len(), 2);
}
