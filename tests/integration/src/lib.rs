//! Fixtures shared by the integration tests.
//!
//! [`MockServices`] runs a local axum server that plays both the LNURL
//! withdraw service and the ledger's transfer endpoint. The ledger answers
//! accepted transfers on an [`InMemoryRelay`], the way the real ledger
//! publishes confirmation records to its relays.

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tapcharge_core::{
    CardHandle, ConfirmationPolicy, InvoiceId, PaymentSnapshot, ScanErrorReason, ScanMode,
    WithdrawRequest,
};
use tapcharge_crypto::KeyPair;
use tapcharge_relay::{ConfirmationCategory, InMemoryRelay, RelayEvent};
use tapcharge_settlement::{CardClient, CardInfo, ScanError, SettlementError, TransferAssertion};
use tapcharge_terminal::{
    HttpConfig, LoggingConfig, OrderSink, PaymentContext, PaymentOrchestrator, StatusObserver,
    TerminalError,
};

pub const LEDGER_IDENTITY: &str = "ledger-identity";
pub const MERCHANT_IDENTITY: &str = "merchant-identity";
pub const CARD_HOLDER: &str = "card-holder";

/// How the mock ledger answers a verified transfer.
#[derive(Debug, Clone)]
pub enum LedgerMode {
    /// Publish an `internal-transaction-ok` record.
    Confirm,
    /// Publish an `internal-transaction-error` record with these messages.
    Reject(Vec<String>),
    /// Accept the transfer but publish nothing.
    Silent,
    /// Publish these records in order, signed by `author`.
    Script {
        author: String,
        records: Vec<(ConfirmationCategory, String)>,
    },
}

struct ServiceState {
    relay: Arc<InMemoryRelay>,
    mode: Mutex<LedgerMode>,
    withdraw_reply: Mutex<(u16, Value)>,
    withdraw_queries: Mutex<Vec<HashMap<String, String>>>,
    transfers: Mutex<Vec<TransferAssertion>>,
    transfer_posts: AtomicUsize,
}

/// Local withdraw service and ledger.
pub struct MockServices {
    addr: SocketAddr,
    state: Arc<ServiceState>,
    pub relay: Arc<InMemoryRelay>,
}

impl MockServices {
    pub async fn start() -> anyhow::Result<Self> {
        let relay = Arc::new(InMemoryRelay::new());
        let state = Arc::new(ServiceState {
            relay: relay.clone(),
            mode: Mutex::new(LedgerMode::Confirm),
            withdraw_reply: Mutex::new((200, json!({ "status": "OK" }))),
            withdraw_queries: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            transfer_posts: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/lnurlw/callback", get(withdraw_callback))
            .route("/ledger/transfer", post(ledger_transfer))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "mock services stopped");
            }
        });

        Ok(Self { addr, state, relay })
    }

    pub fn withdraw_url(&self) -> String {
        format!("http://{}/lnurlw/callback", self.addr)
    }

    pub fn transfer_url(&self) -> String {
        format!("http://{}/ledger/transfer", self.addr)
    }

    /// A path the server does not route, answered with 404.
    pub fn missing_url(&self) -> String {
        format!("http://{}/lnurlw/gone", self.addr)
    }

    pub fn set_withdraw_reply(&self, http_status: u16, body: Value) {
        *self.state.withdraw_reply.lock().unwrap() = (http_status, body);
    }

    pub fn set_ledger_mode(&self, mode: LedgerMode) {
        *self.state.mode.lock().unwrap() = mode;
    }

    pub fn withdraw_queries(&self) -> Vec<HashMap<String, String>> {
        self.state.withdraw_queries.lock().unwrap().clone()
    }

    /// Verified transfers received.
    pub fn transfers(&self) -> Vec<TransferAssertion> {
        self.state.transfers.lock().unwrap().clone()
    }

    /// Every POST to the transfer endpoint, verified or not.
    pub fn transfer_posts(&self) -> usize {
        self.state.transfer_posts.load(Ordering::SeqCst)
    }

    /// Publish a ledger record for `correlation_id` directly on the relay.
    pub fn publish(&self, correlation_id: &str, category: ConfirmationCategory, content: &str) {
        self.relay.publish(RelayEvent::confirmation(
            LEDGER_IDENTITY,
            correlation_id,
            category,
            content,
        ));
    }
}

async fn withdraw_callback(
    State(state): State<Arc<ServiceState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.withdraw_queries.lock().unwrap().push(params);
    let (status, body) = state.withdraw_reply.lock().unwrap().clone();
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(body),
    )
}

async fn ledger_transfer(
    State(state): State<Arc<ServiceState>>,
    Json(assertion): Json<TransferAssertion>,
) -> (StatusCode, Json<Value>) {
    state.transfer_posts.fetch_add(1, Ordering::SeqCst);
    if let Err(e) = assertion.verify() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "ERROR", "reason": e.to_string() })),
        );
    }

    let correlation_id = assertion.correlation_id();
    state.transfers.lock().unwrap().push(assertion);

    let mode = state.mode.lock().unwrap().clone();
    let (author, records) = match mode {
        LedgerMode::Confirm => (
            LEDGER_IDENTITY.to_string(),
            vec![(ConfirmationCategory::Ok, String::new())],
        ),
        LedgerMode::Reject(messages) => (
            LEDGER_IDENTITY.to_string(),
            vec![(
                ConfirmationCategory::Error,
                json!({ "messages": messages }).to_string(),
            )],
        ),
        LedgerMode::Silent => (LEDGER_IDENTITY.to_string(), Vec::new()),
        LedgerMode::Script { author, records } => (author, records),
    };
    for (category, content) in records {
        state.relay.publish(RelayEvent::confirmation(
            author.clone(),
            correlation_id.clone(),
            category,
            content,
        ));
    }

    (StatusCode::OK, Json(json!({ "status": "OK" })))
}

/// URL of a port nobody listens on.
pub async fn closed_endpoint() -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}/ledger/transfer"))
}

/// Card reader that hands out scripted withdraw requests.
pub struct ScriptedCard {
    requests: Mutex<VecDeque<WithdrawRequest>>,
    scan_delay: Duration,
    pub balance: u64,
    pub scans: AtomicUsize,
    pub balance_reads: AtomicUsize,
}

impl ScriptedCard {
    pub fn new(requests: Vec<WithdrawRequest>, balance: u64) -> Arc<Self> {
        Self::with_delay(requests, balance, Duration::ZERO)
    }

    pub fn with_delay(requests: Vec<WithdrawRequest>, balance: u64, scan_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(requests.into()),
            scan_delay,
            balance,
            scans: AtomicUsize::new(0),
            balance_reads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CardClient for ScriptedCard {
    async fn scan(&self, _mode: ScanMode) -> Result<WithdrawRequest, ScanError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.scan_delay).await;
        let next = self.requests.lock().unwrap().pop_front();
        next.ok_or_else(|| ScanError::new(ScanErrorReason::Timeout, "no card presented"))
    }

    async fn stop(&self) {}

    async fn card_info(&self, _card: &CardHandle) -> Result<Option<CardInfo>, SettlementError> {
        Ok(Some(CardInfo {
            holder: CARD_HOLDER.into(),
        }))
    }

    async fn balance(&self, identity: &str) -> Result<u64, SettlementError> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        if identity != CARD_HOLDER {
            return Err(SettlementError::Card(format!("unknown holder {identity}")));
        }
        Ok(self.balance)
    }
}

/// Order collaborator recording every write.
#[derive(Default)]
pub struct RecordingOrders {
    pub paid: Mutex<Vec<(InvoiceId, bool)>>,
    pub printed: Mutex<Vec<InvoiceId>>,
}

#[async_trait]
impl OrderSink for RecordingOrders {
    async fn set_paid(&self, invoice: &InvoiceId, paid: bool) -> Result<(), TerminalError> {
        self.paid.lock().unwrap().push((invoice.clone(), paid));
        Ok(())
    }

    async fn set_printed(&self, invoice: &InvoiceId, _printed: bool) -> Result<(), TerminalError> {
        self.printed.lock().unwrap().push(invoice.clone());
        Ok(())
    }
}

/// Observer keeping every published snapshot.
#[derive(Default)]
pub struct RecordingObserver {
    pub snapshots: Mutex<Vec<PaymentSnapshot>>,
}

impl StatusObserver for RecordingObserver {
    fn on_status(&self, snapshot: &PaymentSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}

/// Short window and a single quick recheck.
pub fn test_policy() -> ConfirmationPolicy {
    ConfirmationPolicy {
        window_ms: 300,
        recheck_attempts: 1,
        initial_backoff_ms: 20,
        backoff_multiplier: 2,
    }
}

pub struct Terminal {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub orders: Arc<RecordingOrders>,
    pub observer: Arc<RecordingObserver>,
}

/// Orchestrator wired to `services` through the real HTTP channel.
pub fn terminal(
    services: &MockServices,
    card: Arc<ScriptedCard>,
    policy: ConfirmationPolicy,
) -> anyhow::Result<Terminal> {
    let _ = tapcharge_terminal::init_logging(&LoggingConfig {
        level: "info".into(),
        format: "text".into(),
    });

    let context = PaymentContext::new(
        KeyPair::generate(),
        services.relay.clone(),
        MERCHANT_IDENTITY,
        LEDGER_IDENTITY,
        vec!["wss://relay.test".into()],
        policy,
    );
    let orders = Arc::new(RecordingOrders::default());
    let observer = Arc::new(RecordingObserver::default());
    let orchestrator = PaymentOrchestrator::with_http(
        context,
        &HttpConfig { timeout_ms: 2_000 },
        card,
        orders.clone(),
        observer.clone(),
    )?;
    Ok(Terminal {
        orchestrator: Arc::new(orchestrator),
        orders,
        observer,
    })
}

pub fn regular_request(callback: String) -> WithdrawRequest {
    WithdrawRequest::new(
        callback,
        "k1-regular",
        "withdrawRequest",
        CardHandle("lnurlw://card.test/1".into()),
    )
}

pub fn extended_request(callback: String) -> WithdrawRequest {
    WithdrawRequest::new(
        callback,
        "k1-extended",
        "laWallet:withdrawRequest",
        CardHandle("lnurlw://card.test/1".into()),
    )
}
