//! Integration test: internal ledger transfer confirmed through the relay.

use std::sync::atomic::Ordering;
use tapcharge_core::{Invoice, InvoiceId, PaymentStatus};
use tapcharge_integration_tests::{
    closed_endpoint, extended_request, terminal, test_policy, LedgerMode, MockServices,
    ScriptedCard, LEDGER_IDENTITY, MERCHANT_IDENTITY,
};
use tapcharge_relay::ConfirmationCategory;
use tapcharge_terminal::TerminalError;

/// 1_500 sats, 1_500_000 msats on the ledger.
fn invoice(id: &str) -> Invoice {
    Invoice::new(InvoiceId::new(id), 1_500, "MXN", vec![], "lnbc15u1pinternal").expect("valid invoice")
}

#[tokio::test]
async fn test_ok_record_reaches_done() {
    let services = MockServices::start().await.unwrap();
    let card = ScriptedCard::new(vec![extended_request(services.transfer_url())], 0);
    let t = terminal(&services, card, test_policy()).unwrap();
    let inv = invoice("int-1");

    let snapshot = t.orchestrator.pay(&inv).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Done);
    assert!(!snapshot.indeterminate);

    let transfers = services.transfers();
    assert_eq!(transfers.len(), 1);
    let assertion = &transfers[0];
    assert_eq!(assertion.amount().unwrap(), 1_500_000);
    assert_eq!(assertion.destination(), Some(MERCHANT_IDENTITY));
    assert_eq!(assertion.k1(), Some("k1-extended"));
    assert_eq!(snapshot.correlation_id, Some(assertion.correlation_id()));
    assert_eq!(*t.orders.paid.lock().unwrap(), vec![(inv.id.clone(), true)]);
}

#[tokio::test]
async fn test_error_record_reason_shown_verbatim() {
    let services = MockServices::start().await.unwrap();
    services.set_ledger_mode(LedgerMode::Reject(vec!["insufficient funds".into()]));
    let card = ScriptedCard::new(vec![extended_request(services.transfer_url())], 0);
    let t = terminal(&services, card, test_policy()).unwrap();
    let inv = invoice("int-2");

    let snapshot = t.orchestrator.pay(&inv).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Error);
    assert_eq!(snapshot.error_message.as_deref(), Some("insufficient funds"));
    assert_eq!(snapshot.reasons, vec!["insufficient funds".to_string()]);
    assert_eq!(*t.orders.paid.lock().unwrap(), vec![(inv.id.clone(), false)]);
}

#[tokio::test]
async fn test_several_reasons_joined() {
    let services = MockServices::start().await.unwrap();
    services.set_ledger_mode(LedgerMode::Reject(vec![
        "card disabled".into(),
        "limit exceeded".into(),
    ]));
    let card = ScriptedCard::new(vec![extended_request(services.transfer_url())], 0);
    let t = terminal(&services, card, test_policy()).unwrap();

    let snapshot = t.orchestrator.pay(&invoice("int-3")).await.unwrap();
    assert_eq!(
        snapshot.error_message.as_deref(),
        Some("card disabled; limit exceeded")
    );
}

#[tokio::test]
async fn test_unreadable_error_record() {
    let services = MockServices::start().await.unwrap();
    services.set_ledger_mode(LedgerMode::Script {
        author: LEDGER_IDENTITY.into(),
        records: vec![(ConfirmationCategory::Error, "<html>oops</html>".into())],
    });
    let card = ScriptedCard::new(vec![extended_request(services.transfer_url())], 0);
    let t = terminal(&services, card, test_policy()).unwrap();

    let snapshot = t.orchestrator.pay(&invoice("int-4")).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Error);
    assert_eq!(
        snapshot.error_message.as_deref(),
        Some("could not read confirmation event")
    );
}

#[tokio::test]
async fn test_first_record_wins_over_later_duplicate() {
    let services = MockServices::start().await.unwrap();
    services.set_ledger_mode(LedgerMode::Script {
        author: LEDGER_IDENTITY.into(),
        records: vec![
            (
                ConfirmationCategory::Error,
                r#"{"messages":["card blocked"]}"#.into(),
            ),
            (ConfirmationCategory::Ok, String::new()),
        ],
    });
    let card = ScriptedCard::new(vec![extended_request(services.transfer_url())], 0);
    let t = terminal(&services, card, test_policy()).unwrap();
    let inv = invoice("int-5");

    let snapshot = t.orchestrator.pay(&inv).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Error);
    assert_eq!(snapshot.error_message.as_deref(), Some("card blocked"));
    assert_eq!(*t.orders.paid.lock().unwrap(), vec![(inv.id.clone(), false)]);
}

#[tokio::test]
async fn test_untrusted_author_is_not_a_confirmation() {
    let services = MockServices::start().await.unwrap();
    services.set_ledger_mode(LedgerMode::Script {
        author: "impostor".into(),
        records: vec![(ConfirmationCategory::Ok, String::new())],
    });
    let card = ScriptedCard::new(vec![extended_request(services.transfer_url())], 0);
    let t = terminal(&services, card, test_policy()).unwrap();

    let snapshot = t.orchestrator.pay(&invoice("int-6")).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::AwaitingCallback);
    assert!(snapshot.indeterminate);
    assert!(t.orders.paid.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_submission_failure_with_funds_is_indeterminate() {
    let services = MockServices::start().await.unwrap();
    let endpoint = closed_endpoint().await.unwrap();
    let card = ScriptedCard::new(vec![extended_request(endpoint)], 2_000_000);
    let t = terminal(&services, card.clone(), test_policy()).unwrap();
    let inv = invoice("int-7");

    let snapshot = t.orchestrator.pay(&inv).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::AwaitingCallback);
    assert!(snapshot.indeterminate);
    assert!(snapshot.error_message.is_some());
    assert_eq!(card.balance_reads.load(Ordering::SeqCst), 1);
    assert!(t.orders.paid.lock().unwrap().is_empty());

    // Resubmission is refused while the transfer is unconfirmed
    assert!(matches!(
        t.orchestrator.pay(&inv).await,
        Err(TerminalError::AttemptInProgress(_))
    ));
    assert!(t.orchestrator.pending_transfer(&inv.id).is_some());
}

#[tokio::test]
async fn test_submission_failure_without_funds_is_error() {
    let services = MockServices::start().await.unwrap();
    let endpoint = closed_endpoint().await.unwrap();
    let card = ScriptedCard::new(vec![extended_request(endpoint)], 1_000);
    let t = terminal(&services, card, test_policy()).unwrap();
    let inv = invoice("int-8");

    let snapshot = t.orchestrator.pay(&inv).await.unwrap();
    assert_eq!(snapshot.status, PaymentStatus::Error);
    assert_eq!(snapshot.error_message.as_deref(), Some("insufficient balance"));
    assert!(t.orchestrator.pending_transfer(&inv.id).is_none());
    assert_eq!(*t.orders.paid.lock().unwrap(), vec![(inv.id.clone(), false)]);
}
