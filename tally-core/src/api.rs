//! HTTP transport
//!
//! Thin axum layer over the services. Account-scoped routes sit behind
//! `require_owner`, which runs the access guard before any handler (or body
//! extractor) sees the request. Store calls go to the blocking pool and are
//! bounded by the configured store timeout.
//!
//! Balances can only be funded by an operator (`tally account deposit`);
//! there is no HTTP route that adds money.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::domain::result::Error;
use crate::domain::{Account, AccountUpdate, BalanceReceipt, TransferIntent};
use crate::services::{bearer_token, AccessGuard, LedgerService, LoginGrant};

/// Header older clients send the bare token in
pub const LEGACY_TOKEN_HEADER: &str = "x-jwt-token";

const ACCESS_DENIED: &str = "access denied";

#[derive(Clone)]
pub struct ServiceState {
    pub ledger: Arc<LedgerService>,
    pub guard: Arc<AccessGuard>,
    pub store_timeout: Duration,
}

impl ServiceState {
    /// Run a store-touching call on the blocking pool, bounded by the timeout
    ///
    /// On timeout the caller gets `StorageUnavailable`; the blocking call
    /// itself keeps running until it commits or rolls back.
    async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> crate::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.store_timeout, task).await {
            Ok(Ok(result)) => result.map_err(ApiError::from),
            Ok(Err(join_error)) => {
                error!("store task failed: {}", join_error);
                Err(ApiError::internal())
            }
            Err(_) => Err(Error::unavailable(format!(
                "store call exceeded {}ms",
                self.store_timeout.as_millis()
            ))
            .into()),
        }
    }
}

/// Account the guard admitted for this request
#[derive(Debug, Clone)]
pub struct AuthorizedAccount(pub Account);

pub fn build_router(state: ServiceState) -> Router {
    let guarded = Router::new()
        .route(
            "/accounts/:id",
            get(get_account).patch(update_account).delete(delete_account),
        )
        .route("/accounts/:id/transfer", post(transfer))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_owner));

    Router::new()
        .route("/health", get(health))
        .route("/accounts", get(list_accounts).post(create_account))
        .route("/login", post(login))
        .merge(guarded)
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Core(#[from] Error),
}

impl ApiError {
    fn internal() -> Self {
        Self::Http {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
        }
    }

    fn forbidden() -> Self {
        Self::Http {
            status: StatusCode::FORBIDDEN,
            message: ACCESS_DENIED.to_string(),
        }
    }

    /// Behind the guard a missing account must look like any other refusal
    fn guarded(self) -> Self {
        match self {
            ApiError::Core(Error::NotFound(_)) => Self::forbidden(),
            other => other,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // serde's message names fields and types; keep it out of the response
        debug!("rejected request body: {}", rejection.body_text());
        Error::validation("invalid request body").into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Http { status, message } => (status, message),
            ApiError::Core(err) => match err {
                Error::Validation(message) => (StatusCode::BAD_REQUEST, message),
                Error::Authentication(_) | Error::Authorization(_) => {
                    (StatusCode::FORBIDDEN, ACCESS_DENIED.to_string())
                }
                Error::NotFound(_) => (StatusCode::NOT_FOUND, "not found".to_string()),
                Error::InsufficientFunds => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "insufficient funds".to_string(),
                ),
                Error::StorageUnavailable(detail) => {
                    error!("storage unavailable: {}", detail);
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "storage unavailable, retry later".to_string(),
                    )
                }
                other => {
                    error!("request failed: {}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal error".to_string(),
                    )
                }
            },
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// `Json` whose rejections render as `{"error": ...}` like every other failure
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct ApiJson<T>(T);

/// Guard middleware for `/accounts/:id/...`
async fn require_owner(
    State(state): State<ServiceState>,
    Path(params): Path<HashMap<String, String>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };
    let authorization = header(axum::http::header::AUTHORIZATION.as_str());
    let legacy = header(LEGACY_TOKEN_HEADER);
    let bearer = bearer_token(authorization.as_deref(), legacy.as_deref()).map(str::to_owned);
    let raw_id = params.get("id").cloned().unwrap_or_default();

    let guard = Arc::clone(&state.guard);
    let account = state
        .run(move || guard.authorize(bearer.as_deref(), &raw_id))
        .await?;

    request.extensions_mut().insert(AuthorizedAccount(account));
    Ok(next.run(request).await)
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "tally",
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccountRequest {
    first_name: String,
    last_name: String,
    password: String,
}

async fn create_account(
    State(state): State<ServiceState>,
    ApiJson(body): ApiJson<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let ledger = Arc::clone(&state.ledger);
    let account = state
        .run(move || ledger.create_account(&body.first_name, &body.last_name, &body.password))
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn list_accounts(State(state): State<ServiceState>) -> Result<Json<Vec<Account>>, ApiError> {
    let ledger = Arc::clone(&state.ledger);
    Ok(Json(state.run(move || ledger.list_accounts()).await?))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    number: i64,
    password: String,
}

async fn login(
    State(state): State<ServiceState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<LoginGrant>, ApiError> {
    let guard = Arc::clone(&state.guard);
    let grant = state
        .run(move || guard.login(body.number, &body.password))
        .await?;
    Ok(Json(grant))
}

async fn get_account(
    Extension(AuthorizedAccount(account)): Extension<AuthorizedAccount>,
) -> Json<Account> {
    Json(account)
}

async fn update_account(
    State(state): State<ServiceState>,
    Extension(AuthorizedAccount(account)): Extension<AuthorizedAccount>,
    ApiJson(update): ApiJson<AccountUpdate>,
) -> Result<Json<Account>, ApiError> {
    let ledger = Arc::clone(&state.ledger);
    let updated = state
        .run(move || ledger.update_account(account.id, &update))
        .await
        .map_err(ApiError::guarded)?;
    Ok(Json(updated))
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: i64,
}

async fn delete_account(
    State(state): State<ServiceState>,
    Extension(AuthorizedAccount(account)): Extension<AuthorizedAccount>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let ledger = Arc::clone(&state.ledger);
    let id = account.id;
    state
        .run(move || ledger.delete_account(id))
        .await
        .map_err(ApiError::guarded)?;
    Ok(Json(DeleteResponse { deleted: id }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest {
    to_account_number: i64,
    amount: i64,
}

async fn transfer(
    State(state): State<ServiceState>,
    Extension(AuthorizedAccount(account)): Extension<AuthorizedAccount>,
    ApiJson(body): ApiJson<TransferRequest>,
) -> Result<Json<BalanceReceipt>, ApiError> {
    let intent = TransferIntent {
        source_account_id: account.id,
        destination_account_number: body.to_account_number,
        amount: body.amount,
    };
    let ledger = Arc::clone(&state.ledger);
    let receipt = state
        .run(move || ledger.transfer(intent))
        .await
        .map_err(ApiError::guarded)?;
    Ok(Json(receipt))
}
