use crate::transport::HttpTransport;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use powchain_core::{
    AmountResponse, ChainResponse, HealthResponse, Ledger, StatusResponse, TransactionRequest,
    TransactionsResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

pub type SharedLedger = Arc<Ledger<HttpTransport>>;

type Status = (StatusCode, Json<StatusResponse>);

#[derive(Deserialize)]
struct AmountQuery {
    blockchain_address: Option<String>,
}

pub fn router(ledger: SharedLedger) -> Router {
    Router::new()
        .route("/", get(get_chain))
        .route("/chain", get(get_chain))
        .route(
            "/transactions",
            get(list_transactions)
                .post(create_transaction)
                .put(relay_transaction)
                .delete(clear_transactions),
        )
        .route("/mine", get(mine))
        .route("/mine/start", get(start_mining))
        .route("/amount", get(amount))
        .route("/consensus", put(consensus))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(ledger)
}

fn success(code: StatusCode) -> Status {
    (code, Json(StatusResponse::success()))
}

fn fail(code: StatusCode) -> Status {
    (code, Json(StatusResponse::fail()))
}

async fn health(State(ledger): State<SharedLedger>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        node_id: ledger.node_id().to_string(),
    })
}

async fn get_chain(State(ledger): State<SharedLedger>) -> Json<ChainResponse> {
    Json(ChainResponse {
        chain: ledger.chain().await,
    })
}

async fn list_transactions(State(ledger): State<SharedLedger>) -> Json<TransactionsResponse> {
    let transactions = ledger.transaction_pool().await;
    Json(TransactionsResponse {
        length: transactions.len(),
        transactions,
    })
}

async fn create_transaction(
    State(ledger): State<SharedLedger>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Status {
    let Ok(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST);
    };
    match ledger.create_transaction(request).await {
        Ok(()) => success(StatusCode::CREATED),
        Err(_) => fail(StatusCode::BAD_REQUEST),
    }
}

/// Intake from a neighbor; accepted transactions are not relayed further.
async fn relay_transaction(
    State(ledger): State<SharedLedger>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> Status {
    let Ok(Json(request)) = payload else {
        return fail(StatusCode::BAD_REQUEST);
    };
    match ledger.accept_relayed(request).await {
        Ok(()) => success(StatusCode::OK),
        Err(_) => fail(StatusCode::BAD_REQUEST),
    }
}

async fn clear_transactions(State(ledger): State<SharedLedger>) -> Status {
    ledger.clear_pool().await;
    success(StatusCode::OK)
}

async fn mine(State(ledger): State<SharedLedger>) -> Status {
    match ledger.mine().await {
        Ok(_) => success(StatusCode::OK),
        Err(e) => {
            error!(error = %e, "mining failed");
            fail(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn start_mining(State(ledger): State<SharedLedger>) -> Status {
    if !ledger.start_mining().await {
        debug!("mining loop already running");
    }
    success(StatusCode::OK)
}

async fn amount(
    State(ledger): State<SharedLedger>,
    Query(query): Query<AmountQuery>,
) -> Result<Json<AmountResponse>, Status> {
    let address = query
        .blockchain_address
        .ok_or_else(|| fail(StatusCode::BAD_REQUEST))?;
    Ok(Json(AmountResponse {
        amount: ledger.total_amount(&address).await,
    }))
}

/// A neighbor grew its chain. Reconcile in the background so the caller
/// is not held up by our own fetches.
async fn consensus(State(ledger): State<SharedLedger>) -> Status {
    tokio::spawn(async move {
        ledger.resolve_conflicts().await;
    });
    success(StatusCode::OK)
}
