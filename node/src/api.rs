//! # REST + JSON-RPC + WebSocket API
//!
//! Builds the axum router that exposes the ledger over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                | Description                        |
//! |--------|-------------------------------------|------------------------------------|
//! | GET    | `/health`                           | Liveness probe                     |
//! | GET    | `/status`                           | Ledger summary                     |
//! | POST   | `/rpc`                              | JSON-RPC 2.0 gateway               |
//! | GET    | `/ws`                               | Live audit events                  |
//! | POST   | `/transactions`                     | Submit a transaction hash          |
//! | GET    | `/transactions/:hash`               | Full record                        |
//! | GET    | `/transactions/:hash/status`        | Status, `NOT_FOUND` when absent    |
//! | GET    | `/transactions/:hash/held`          | Held flag and reason               |
//! | GET    | `/transactions/:hash/events`        | Audit events for one hash          |
//! | POST   | `/transactions/:hash/verification`  | Relayer verification               |
//! | POST   | `/transactions/:hash/hold`          | Relayer hold                       |
//! | POST   | `/transactions/:hash/release`       | Owner release of a held record     |
//! | POST   | `/transactions/:hash/complete`      | Owner completion                   |
//! | POST   | `/admin/owner`                      | Transfer ownership                 |
//! | POST   | `/admin/relayers`                   | Grant or revoke a relayer          |
//! | GET    | `/relayers/:address`                | Relayer check                      |
//! | GET    | `/events`                           | Paged audit log                    |
//! | POST   | `/screen`                           | Submit and apply risk screening    |
//!
//! Mutating requests name their `caller` in the body.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use guard_contracts::{ErrorKind, Ledger, LedgerError, LedgerResult, LedgerSummary};
use guard_protocol::audit::AuditEvent;
use guard_protocol::config::{DEFAULT_EVENT_PAGE_SIZE, EVENT_CHANNEL_CAPACITY};
use guard_protocol::crypto::derive_tx_hash;
use guard_protocol::{Address, Transaction, TransactionStatus, TxHash};

use crate::config::ScreeningConfig;
use crate::metrics::SharedMetrics;
use crate::screening::{self, Assessment, RiskLevel, ScreenOutcome};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The ledger itself.
    pub ledger: Arc<Ledger>,
    /// Every committed audit event, for WebSocket subscribers.
    pub event_tx: broadcast::Sender<AuditEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
    /// Screening policy for `/screen`.
    pub screening: Arc<ScreeningConfig>,
    /// Identity `/screen` acts as.
    pub screening_relayer: Address,
}

impl AppState {
    /// Wires the ledger's commit hook to a fresh broadcast channel and wraps
    /// everything for sharing.
    pub fn new(
        version: String,
        mut ledger: Ledger,
        metrics: SharedMetrics,
        screening: ScreeningConfig,
        screening_relayer: Address,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let sink = event_tx.clone();
        ledger.on_commit(move |event| {
            // No subscribers is not an error.
            let _ = sink.send(event.clone());
        });

        Self {
            version,
            ledger: Arc::new(ledger),
            event_tx,
            metrics,
            screening: Arc::new(screening),
            screening_relayer,
        }
    }

    /// Runs a mutating ledger call off the async runtime (it may flush to
    /// disk) and records its outcome.
    async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Ledger) -> LedgerResult<T> + Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        let metrics = Arc::clone(&self.metrics);
        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let result = f(&ledger);
            metrics.observe(op, &result, started.elapsed());
            result
        })
        .await
        .map_err(|e| ApiError::Internal(format!("ledger task failed: {e}")))?
        .map_err(ApiError::from)
    }

    /// Runs a read off the async runtime. Reads share the ledger lock with
    /// writers, which hold it across the storage flush.
    async fn read<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Ledger) -> T + Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || f(&ledger))
            .await
            .map_err(|e| ApiError::Internal(format!("ledger task failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured RPC port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/transactions", post(submit_handler))
        .route("/transactions/:hash", get(transaction_handler))
        .route("/transactions/:hash/status", get(tx_status_handler))
        .route("/transactions/:hash/held", get(held_handler))
        .route("/transactions/:hash/events", get(tx_events_handler))
        .route("/transactions/:hash/verification", post(verification_handler))
        .route("/transactions/:hash/hold", post(hold_handler))
        .route("/transactions/:hash/release", post(release_handler))
        .route("/transactions/:hash/complete", post(complete_handler))
        .route("/admin/owner", post(transfer_ownership_handler))
        .route("/admin/relayers", post(set_relayer_handler))
        .route("/relayers/:address", get(relayer_handler))
        .route("/events", get(events_handler))
        .route("/screen", post(screen_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    /// The ledger refused the operation.
    Ledger(LedgerError),
    /// The request itself is malformed (bad hash, bad amount, missing field).
    BadRequest(String),
    /// The node failed, not the request.
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Ledger(e) => match e.kind() {
                ErrorKind::Authorization => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Duplicate | ErrorKind::InvalidState => StatusCode::CONFLICT,
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Storage | ErrorKind::Integrity => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Ledger(e) => e.kind().as_str(),
            ApiError::BadRequest(_) => ErrorKind::Validation.as_str(),
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn rpc_code(&self) -> i32 {
        match self {
            ApiError::Ledger(e) => match e.kind() {
                ErrorKind::NotFound => -32001,
                ErrorKind::Duplicate => -32002,
                ErrorKind::Authorization => -32003,
                ErrorKind::InvalidState => -32004,
                ErrorKind::Validation => -32602,
                ErrorKind::Storage | ErrorKind::Integrity => -32603,
            },
            ApiError::BadRequest(_) => -32602,
            ApiError::Internal(_) => -32603,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Ledger(e) => e.to_string(),
            ApiError::BadRequest(msg) => format!("invalid request: {msg}"),
            ApiError::Internal(msg) => format!("internal error: {msg}"),
        }
    }

    fn into_rpc(self) -> JsonRpcError {
        JsonRpcError {
            code: self.rpc_code(),
            message: self.message(),
            data: Some(serde_json::json!({ "kind": self.code() })),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.message(), "request failed");
        }
        let body = ErrorResponse {
            error: self.message(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable error code, e.g. `AUTHORIZATION_ERROR`.
    pub code: String,
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Named method parameters.
    pub params: Option<serde_json::Value>,
    /// Request identifier. Echoed back in the response.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

/// Body of `POST /transactions`. Either `tx_hash` or `reference` names the
/// transaction; with `reference` the hash is derived from
/// `(reference, sender, amount)`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    pub sender: String,
    /// Signed so that negative amounts reach validation instead of failing
    /// deserialization.
    pub amount: i128,
}

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub caller: String,
    pub verified: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    pub caller: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub caller: String,
    pub approved: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub caller: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferOwnershipRequest {
    pub caller: String,
    pub new_owner: String,
}

#[derive(Debug, Deserialize)]
pub struct SetRelayerRequest {
    pub caller: String,
    pub relayer: String,
    pub authorized: bool,
}

/// Body of `POST /screen`: a classifier verdict for a new transaction.
#[derive(Debug, Deserialize)]
pub struct ScreenRequest {
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    pub sender: String,
    pub amount: i128,
    /// Takes precedence over `risk_score`.
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Query string of `GET /events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: Option<u64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// JSON-RPC params for calls on one transaction: the REST body plus the hash.
#[derive(Debug, Deserialize)]
struct OnHash<T> {
    tx_hash: String,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Deserialize)]
struct HashParam {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
struct AddressParam {
    address: String,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    #[serde(flatten)]
    pub ledger: LedgerSummary,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// A transaction record as returned by the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub tx_hash: TxHash,
    pub sender: Address,
    pub amount: u64,
    pub status: TransactionStatus,
    pub reason: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            tx_hash: tx.tx_hash,
            sender: tx.sender,
            amount: tx.amount,
            status: tx.status.into(),
            reason: tx.reason,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

/// Response of every successful mutating call.
#[derive(Debug, Serialize, Deserialize)]
pub struct MutationResponse {
    /// Status the call left the record in, absent for roster changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,
    /// The audit event the call produced.
    pub event: AuditEvent,
}

impl From<AuditEvent> for MutationResponse {
    fn from(event: AuditEvent) -> Self {
        Self {
            status: event.kind.resulting_status().map(TransactionStatus::from),
            event,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusView {
    pub tx_hash: TxHash,
    pub status: TransactionStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeldView {
    pub tx_hash: TxHash,
    pub held: bool,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelayerView {
    pub address: Address,
    pub authorized: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsPage {
    pub events: Vec<AuditEvent>,
    /// Sequence number to pass as `since` for the next page.
    pub next: u64,
}

// ---------------------------------------------------------------------------
// Input parsing
// ---------------------------------------------------------------------------

fn parse_hash(raw: &str) -> Result<TxHash, ApiError> {
    raw.parse::<TxHash>()
        .map_err(|e| ApiError::BadRequest(format!("tx_hash: {e}")))
}

fn parse_amount(raw: i128) -> Result<u64, ApiError> {
    if raw <= 0 {
        return Err(LedgerError::Validation("amount must be greater than zero".into()).into());
    }
    u64::try_from(raw).map_err(|_| ApiError::BadRequest("amount out of range".into()))
}

/// The hash a submission names, given directly or derived from a reference.
fn resolve_hash(
    tx_hash: Option<&str>,
    reference: Option<&str>,
    sender: &Address,
    amount: u64,
) -> Result<TxHash, ApiError> {
    match (tx_hash, reference) {
        (Some(hash), _) => parse_hash(hash),
        (None, Some(reference)) => Ok(derive_tx_hash(reference, sender, amount)),
        (None, None) => Err(ApiError::BadRequest(
            "one of tx_hash or reference is required".into(),
        )),
    }
}

fn rpc_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T, ApiError> {
    let params = params.unwrap_or(serde_json::Value::Object(Default::default()));
    serde_json::from_value(params).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}

// ---------------------------------------------------------------------------
// Operations shared by REST and JSON-RPC
// ---------------------------------------------------------------------------

async fn submit(state: &AppState, req: SubmitRequest) -> Result<MutationResponse, ApiError> {
    let sender = Address::new(req.sender);
    let amount = parse_amount(req.amount)?;
    let tx_hash = resolve_hash(
        req.tx_hash.as_deref(),
        req.reference.as_deref(),
        &sender,
        amount,
    )?;
    let event = state
        .call("submit_tx_hash", move |l| l.submit_tx_hash(tx_hash, sender, amount))
        .await?;
    Ok(MutationResponse::from(event))
}

async fn set_verification(
    state: &AppState,
    tx_hash: TxHash,
    req: VerificationRequest,
) -> Result<MutationResponse, ApiError> {
    let caller = Address::new(req.caller);
    let event = state
        .call("set_verification", move |l| {
            l.set_verification(&caller, tx_hash, req.verified, req.reason)
        })
        .await?;
    Ok(MutationResponse::from(event))
}

async fn hold(state: &AppState, tx_hash: TxHash, req: HoldRequest) -> Result<MutationResponse, ApiError> {
    let caller = Address::new(req.caller);
    let event = state
        .call("hold_transaction", move |l| {
            l.hold_transaction(&caller, tx_hash, req.reason)
        })
        .await?;
    Ok(MutationResponse::from(event))
}

async fn release(
    state: &AppState,
    tx_hash: TxHash,
    req: ReleaseRequest,
) -> Result<MutationResponse, ApiError> {
    let caller = Address::new(req.caller);
    let event = state
        .call("release_held_transaction", move |l| {
            l.release_held_transaction(&caller, tx_hash, req.approved, req.reason)
        })
        .await?;
    Ok(MutationResponse::from(event))
}

async fn complete(
    state: &AppState,
    tx_hash: TxHash,
    req: CompleteRequest,
) -> Result<MutationResponse, ApiError> {
    let caller = Address::new(req.caller);
    let event = state
        .call("complete_transaction", move |l| {
            l.complete_transaction(&caller, tx_hash)
        })
        .await?;
    Ok(MutationResponse::from(event))
}

async fn transfer_ownership(
    state: &AppState,
    req: TransferOwnershipRequest,
) -> Result<MutationResponse, ApiError> {
    let caller = Address::new(req.caller);
    let new_owner = Address::new(req.new_owner);
    let event = state
        .call("transfer_ownership", move |l| {
            l.transfer_ownership(&caller, new_owner)
        })
        .await?;
    Ok(MutationResponse::from(event))
}

async fn set_relayer(state: &AppState, req: SetRelayerRequest) -> Result<MutationResponse, ApiError> {
    let caller = Address::new(req.caller);
    let relayer = Address::new(req.relayer);
    let event = state
        .call("set_relayer", move |l| {
            l.set_relayer(&caller, relayer, req.authorized)
        })
        .await?;
    Ok(MutationResponse::from(event))
}

async fn events_page(state: &AppState, query: EventsQuery) -> Result<EventsPage, ApiError> {
    let since = query.since.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_PAGE_SIZE);
    let events = state.read(move |l| l.events_since(since, limit)).await?;
    let next = events.last().map_or(since, |e| e.seq + 1);
    Ok(EventsPage { events, next })
}

async fn transaction(state: &AppState, tx_hash: TxHash) -> Result<TransactionResponse, ApiError> {
    state
        .read(move |l| l.get_transaction(&tx_hash))
        .await?
        .map(TransactionResponse::from)
        .ok_or(ApiError::Ledger(LedgerError::NotFound(tx_hash)))
}

async fn status_view(state: &AppState, tx_hash: TxHash) -> Result<StatusView, ApiError> {
    let status = state
        .read(move |l| l.get_transaction_status(&tx_hash))
        .await?;
    Ok(StatusView { tx_hash, status })
}

async fn held_view(state: &AppState, tx_hash: TxHash) -> Result<HeldView, ApiError> {
    let (held, reason) = state.read(move |l| l.is_held(&tx_hash)).await?;
    Ok(HeldView {
        tx_hash,
        held,
        reason,
    })
}

async fn relayer_view(state: &AppState, address: Address) -> Result<RelayerView, ApiError> {
    let who = address.clone();
    let authorized = state
        .read(move |l| l.is_authorized_relayer(&who))
        .await?;
    Ok(RelayerView {
        address,
        authorized,
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — ledger summary.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let ledger = state.read(|l| l.summary()).await?;
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        ledger,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `POST /transactions` — submit a new transaction hash.
async fn submit_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = submit(&state, req).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// `GET /transactions/:hash` — the full record, 404 when absent.
async fn transaction_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let tx_hash = parse_hash(&hash)?;
    transaction(&state, tx_hash).await.map(Json)
}

/// `GET /transactions/:hash/status` — never 404; absence is `NOT_FOUND`.
async fn tx_status_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<StatusView>, ApiError> {
    let tx_hash = parse_hash(&hash)?;
    status_view(&state, tx_hash).await.map(Json)
}

/// `GET /transactions/:hash/held`
async fn held_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<HeldView>, ApiError> {
    let tx_hash = parse_hash(&hash)?;
    held_view(&state, tx_hash).await.map(Json)
}

/// `GET /transactions/:hash/events`
async fn tx_events_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    let tx_hash = parse_hash(&hash)?;
    state.read(move |l| l.events_for(&tx_hash)).await.map(Json)
}

async fn verification_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<VerificationRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let tx_hash = parse_hash(&hash)?;
    set_verification(&state, tx_hash, req).await.map(Json)
}

async fn hold_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<HoldRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let tx_hash = parse_hash(&hash)?;
    hold(&state, tx_hash, req).await.map(Json)
}

async fn release_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let tx_hash = parse_hash(&hash)?;
    release(&state, tx_hash, req).await.map(Json)
}

async fn complete_handler(
    Path(hash): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let tx_hash = parse_hash(&hash)?;
    complete(&state, tx_hash, req).await.map(Json)
}

async fn transfer_ownership_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferOwnershipRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    transfer_ownership(&state, req).await.map(Json)
}

async fn set_relayer_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRelayerRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    set_relayer(&state, req).await.map(Json)
}

/// `GET /relayers/:address`
async fn relayer_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RelayerView>, ApiError> {
    relayer_view(&state, Address::new(address)).await.map(Json)
}

/// `GET /events?since=&limit=`
async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsPage>, ApiError> {
    events_page(&state, query).await.map(Json)
}

/// `POST /screen` — submit, then hold or clear according to the risk level.
async fn screen_handler(
    State(state): State<AppState>,
    Json(req): Json<ScreenRequest>,
) -> Result<Json<ScreenOutcome>, ApiError> {
    let sender = Address::new(req.sender);
    let amount = parse_amount(req.amount)?;
    let tx_hash = resolve_hash(
        req.tx_hash.as_deref(),
        req.reference.as_deref(),
        &sender,
        amount,
    )?;
    let level = match (req.risk_level, req.risk_score) {
        (Some(level), _) => level,
        (None, Some(score)) => RiskLevel::from_score(score).ok_or_else(|| {
            ApiError::BadRequest(format!("risk_score {score} is outside [0, 1]"))
        })?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "one of risk_level or risk_score is required".into(),
            ))
        }
    };

    let config = Arc::clone(&state.screening);
    let relayer = state.screening_relayer.clone();
    let assessment = Assessment {
        level,
        explanation: req.explanation,
    };
    let outcome = state
        .call("screen", move |l| {
            screening::screen(l, &config, &relayer, tx_hash, sender, amount, assessment)
        })
        .await?;
    Ok(Json(outcome))
}

/// `POST /rpc` — JSON-RPC 2.0 gateway.
///
/// Routes method calls to the same operations as the REST endpoints.
/// Unknown methods return error code -32601 (Method not found).
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError {
                code: -32600,
                message: "Invalid Request: jsonrpc must be \"2.0\"".into(),
                data: None,
            }),
            id: req.id,
        });
    }

    let (result, error) = match dispatch(&state, &req.method, req.params).await {
        Ok(value) => (Some(value), None),
        Err(RpcFailure::UnknownMethod) => (
            None,
            Some(JsonRpcError {
                code: -32601,
                message: format!("Method not found: {}", req.method),
                data: None,
            }),
        ),
        Err(RpcFailure::Api(e)) => (None, Some(e.into_rpc())),
    };

    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

enum RpcFailure {
    UnknownMethod,
    Api(ApiError),
}

impl From<ApiError> for RpcFailure {
    fn from(e: ApiError) -> Self {
        RpcFailure::Api(e)
    }
}

async fn dispatch(
    state: &AppState,
    method: &str,
    params: Option<serde_json::Value>,
) -> Result<serde_json::Value, RpcFailure> {
    let value = match method {
        "guard_submitTxHash" => to_value(submit(state, rpc_params(params)?).await?)?,
        "guard_setVerification" => {
            let p: OnHash<VerificationRequest> = rpc_params(params)?;
            to_value(set_verification(state, parse_hash(&p.tx_hash)?, p.body).await?)?
        }
        "guard_holdTransaction" => {
            let p: OnHash<HoldRequest> = rpc_params(params)?;
            to_value(hold(state, parse_hash(&p.tx_hash)?, p.body).await?)?
        }
        "guard_releaseHeldTransaction" => {
            let p: OnHash<ReleaseRequest> = rpc_params(params)?;
            to_value(release(state, parse_hash(&p.tx_hash)?, p.body).await?)?
        }
        "guard_completeTransaction" => {
            let p: OnHash<CompleteRequest> = rpc_params(params)?;
            to_value(complete(state, parse_hash(&p.tx_hash)?, p.body).await?)?
        }
        "guard_transferOwnership" => to_value(transfer_ownership(state, rpc_params(params)?).await?)?,
        "guard_setRelayer" => to_value(set_relayer(state, rpc_params(params)?).await?)?,
        "guard_isAuthorizedRelayer" => {
            let p: AddressParam = rpc_params(params)?;
            serde_json::json!(relayer_view(state, Address::new(p.address)).await?.authorized)
        }
        "guard_isHeld" => {
            let p: HashParam = rpc_params(params)?;
            to_value(held_view(state, parse_hash(&p.tx_hash)?).await?)?
        }
        "guard_getTransactionStatus" => {
            let p: HashParam = rpc_params(params)?;
            serde_json::json!(status_view(state, parse_hash(&p.tx_hash)?).await?.status)
        }
        "guard_getTransaction" => {
            let p: HashParam = rpc_params(params)?;
            to_value(transaction(state, parse_hash(&p.tx_hash)?).await?)?
        }
        "guard_getEvents" => {
            let query: EventsQuery = rpc_params(params)?;
            to_value(events_page(state, query).await?)?
        }
        _ => return Err(RpcFailure::UnknownMethod),
    };
    Ok(value)
}

/// `GET /ws` — WebSocket upgrade for live audit events.
///
/// Clients receive each committed [`AuditEvent`] as a JSON text message, in
/// sequence order. The connection is push-only; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
