use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vendedor_agent::{MessageOrchestrator, MessageOutcome};
use vendedor_core::catalog::Catalog;
use vendedor_core::domain::cart::Cart;
use vendedor_core::domain::customer::{CustomerId, CustomerProfile};
use vendedor_core::domain::product::Product;
use vendedor_core::rate_limit::RateLimiter;
use vendedor_db::{carts, CartSummary, CustomerStats, RepositoryError};
use vendedor_transport::{
    ConnectionSupervisor, OutboundContent, OutboundSender, SupervisorError, SupervisorStatus,
};

use crate::bootstrap::Application;
use crate::tasks::{abandoned_cart_reports_at, AbandonedCartReport};

const ACTIVE_WINDOW_HOURS: i64 = 24;

#[derive(Clone)]
pub struct ApiState {
    orchestrator: Arc<MessageOrchestrator>,
    supervisor: Arc<ConnectionSupervisor>,
    rate_limiter: Arc<RateLimiter>,
    catalog: Arc<Catalog>,
    abandoned_cart_threshold: chrono::Duration,
    started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn from_application(app: &Application) -> Self {
        Self {
            orchestrator: Arc::clone(&app.orchestrator),
            supervisor: Arc::clone(&app.supervisor),
            rate_limiter: Arc::clone(&app.rate_limiter),
            catalog: Arc::new(Catalog::default()),
            abandoned_cart_threshold: app.config.engagement.abandoned_cart_threshold(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("chat connection is not open")]
    NotConnected,
    #[error("chat transport failed: {0}")]
    Transport(String),
    #[error("storage is unavailable")]
    Storage(#[from] RepositoryError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl From<SupervisorError> for ApiError {
    fn from(error: SupervisorError) -> Self {
        match error {
            SupervisorError::NotConnected | SupervisorError::SessionInvalidated => {
                Self::NotConnected
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(source) => {
                error!(
                    event_name = "api.storage.failed",
                    correlation_id = "api",
                    error = %source,
                    "request failed on storage"
                );
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/profile/{customer_id}", get(profile))
        .route("/cart/{customer_id}", get(cart))
        .route("/abandoned-carts", get(abandoned_carts))
        .route("/send-message", post(send_message))
        .route("/simulate-message", post(simulate_message))
        .with_state(state)
}

/// Serves the API until `cancel` fires.
pub async fn spawn(
    bind_address: &str,
    port: u16,
    state: ApiState,
    cancel: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.api.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "ops api started"
    );

    Ok(tokio::spawn(async move {
        let served = axum::serve(listener, router(state))
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await;
        if let Err(error) = served {
            error!(
                event_name = "system.api.error",
                correlation_id = "bootstrap",
                error = %error,
                "ops api terminated unexpectedly"
            );
        }
    }))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: HealthCheck,
    pub connection: HealthCheck,
    pub checked_at: String,
}

pub async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let storage = match state.orchestrator.conversations().all_customers().await {
        Ok(customers) => HealthCheck {
            status: "ready",
            detail: format!("{} conversations stored", customers.len()),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("storage read failed: {error}") }
        }
    };
    let supervisor = state.supervisor.status();
    let connection = HealthCheck {
        status: if supervisor.connected { "ready" } else { "degraded" },
        detail: format!("{:?}", supervisor.state),
    };
    let ready = storage.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        storage,
        connection,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub connection: SupervisorStatus,
    pub active_customers: usize,
    pub rate_limited_senders: usize,
    pub uptime_secs: i64,
}

async fn status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, ApiError> {
    let active = state.orchestrator.conversations().active_customers(ACTIVE_WINDOW_HOURS).await?;
    Ok(Json(StatusResponse {
        connection: state.supervisor.status(),
        active_customers: active.len(),
        rate_limited_senders: state.rate_limiter.tracked_senders(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    }))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProfileResponse {
    pub customer_id: CustomerId,
    pub profile: CustomerProfile,
    pub stats: CustomerStats,
    pub suggestions: Vec<Product>,
}

async fn profile(
    State(state): State<ApiState>,
    Path(customer_id): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let customer_id = CustomerId::new(customer_id);
    let conversations = state.orchestrator.conversations();
    let Some(context) = conversations.load(&customer_id).await? else {
        return Err(ApiError::NotFound(format!("no conversation for `{customer_id}`")));
    };
    let stats = conversations
        .customer_stats(&customer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no conversation for `{customer_id}`")))?;
    let suggestions =
        state.catalog.suggestions_for(context.profile.segment).into_iter().cloned().collect();

    Ok(Json(ProfileResponse { customer_id, profile: context.profile, stats, suggestions }))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartResponse {
    pub cart: Cart,
    pub summary: CartSummary,
    pub rendered: String,
}

async fn cart(
    State(state): State<ApiState>,
    Path(customer_id): Path<String>,
) -> Json<CartResponse> {
    let customer_id = CustomerId::new(customer_id);
    let manager = state.orchestrator.carts();
    let cart = manager.get_cart(&customer_id).await;
    let summary = manager.summary(&customer_id).await;
    let rendered = carts::render(&cart);
    Json(CartResponse { cart, summary, rendered })
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AbandonedQuery {
    pub hours: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AbandonedCartsResponse {
    pub threshold_hours: i64,
    pub carts: Vec<AbandonedCartReport>,
}

async fn abandoned_carts(
    State(state): State<ApiState>,
    Query(query): Query<AbandonedQuery>,
) -> Result<Json<AbandonedCartsResponse>, ApiError> {
    let threshold = query
        .hours
        .map(|hours| chrono::Duration::hours(i64::from(hours)))
        .unwrap_or(state.abandoned_cart_threshold);
    let carts = abandoned_cart_reports_at(&state.orchestrator, threshold, Utc::now()).await?;
    Ok(Json(AbandonedCartsResponse { threshold_hours: threshold.num_hours(), carts }))
}

#[derive(Clone, Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendMessageResponse {
    pub message_id: String,
}

async fn send_message(
    State(state): State<ApiState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let (to, text) = required_pair(&request.to, &request.text, "to")?;
    let correlation_id = uuid::Uuid::new_v4().to_string();
    info!(
        event_name = "api.message.send_requested",
        correlation_id = %correlation_id,
        customer_id = %to,
        "operator message requested"
    );

    let sent = state.supervisor.send_message(&to, OutboundContent::Text(text), None).await;
    match sent {
        Ok(message_ref) => Ok(Json(SendMessageResponse { message_id: message_ref.0 })),
        Err(error) => {
            warn!(
                event_name = "api.message.send_failed",
                correlation_id = %correlation_id,
                customer_id = %to,
                error = %error,
                "operator message not sent"
            );
            Err(error.into())
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SimulateRequest {
    pub from: String,
    pub text: String,
}

async fn simulate_message(
    State(state): State<ApiState>,
    Json(request): Json<SimulateRequest>,
) -> Result<Json<MessageOutcome>, ApiError> {
    let (from, text) = required_pair(&request.from, &request.text, "from")?;
    Ok(Json(state.orchestrator.simulate(&from, &text).await))
}

fn required_pair(
    customer: &str,
    text: &str,
    customer_field: &str,
) -> Result<(CustomerId, String), ApiError> {
    let customer = customer.trim();
    if customer.is_empty() {
        return Err(ApiError::BadRequest(format!("`{customer_field}` is required")));
    }
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest("`text` is required".to_owned()));
    }
    Ok((CustomerId::new(customer), text.to_owned()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;
    use vendedor_core::config::{AppConfig, StorageBackend};
    use vendedor_core::domain::cart::NewCartItem;
    use vendedor_core::domain::customer::CustomerId;
    use vendedor_core::domain::product::ProductId;
    use vendedor_transport::InboundHandler;

    use super::{router, ApiState};
    use crate::bootstrap::{bootstrap_with_config, Application};

    async fn app() -> Application {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        bootstrap_with_config(config).await.expect("bootstrap")
    }

    fn routes(app: &Application) -> Router {
        router(ApiState::from_application(app))
    }

    async fn call(routes: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = routes.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn health_is_ready_with_storage_and_reports_connection() {
        let app = app().await;
        let (status, body) = call(routes(&app), get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["storage"]["status"], "ready");
        assert_eq!(body["connection"]["status"], "degraded");
    }

    #[tokio::test]
    async fn health_degrades_when_database_is_closed() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.database_url = "sqlite::memory:".to_owned();
        config.storage.max_connections = 1;
        let app = bootstrap_with_config(config).await.expect("bootstrap");
        app.db_pool.as_ref().expect("pool").close().await;

        let (status, body) = call(routes(&app), get("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["storage"]["status"], "degraded");
    }

    #[tokio::test]
    async fn simulated_message_builds_a_profile() {
        let app = app().await;
        let (status, body) = call(
            routes(&app),
            post(
                "/simulate-message",
                json!({ "from": "5511988", "text": "Preciso de bíblias para a igreja" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "replied");

        let (status, body) = call(routes(&app), get("/profile/5511988")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["segment"], "pastor");
        assert_eq!(body["stats"]["total_messages"], 2);
        assert_eq!(body["suggestions"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found_and_blank_input_is_rejected() {
        let app = app().await;
        let (status, body) = call(routes(&app), get("/profile/ninguem")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap_or_default().contains("ninguem"));

        let (status, _) =
            call(routes(&app), post("/simulate-message", json!({ "from": "5511", "text": "  " })))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cart_and_abandoned_listing_follow_the_store() {
        let app = app().await;
        let customer = CustomerId::new("5511977");
        let item = NewCartItem {
            id: ProductId("kit-natal".to_owned()),
            name: "Kit Natal".to_owned(),
            price: Decimal::new(78, 0),
            quantity: 1,
            category: "kits".to_owned(),
            size: None,
        };
        app.orchestrator
            .carts()
            .add_item_at(&customer, item, Utc::now() - chrono::Duration::hours(5))
            .await
            .expect("add item");

        let (status, body) = call(routes(&app), get("/cart/5511977")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["item_count"], 1);
        assert!(body["rendered"].as_str().unwrap_or_default().contains("Kit Natal"));

        let (_, body) = call(routes(&app), get("/abandoned-carts")).await;
        assert_eq!(body["threshold_hours"], 2);
        assert_eq!(body["carts"][0]["customer_id"], "5511977");
        assert_eq!(body["carts"][0]["offer"]["discount_pct"], 15);

        let (_, body) = call(routes(&app), get("/abandoned-carts?hours=6")).await;
        assert_eq!(body["carts"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn send_message_requires_an_open_connection() {
        let app = app().await;
        let request = || post("/send-message", json!({ "to": "5511966", "text": "Paz!" }));

        let (status, body) = call(routes(&app), request()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "chat connection is not open");

        let cancel = CancellationToken::new();
        let supervisor = Arc::clone(&app.supervisor);
        let handler: Arc<dyn InboundHandler> = app.orchestrator.clone();
        let running = {
            let cancel = cancel.clone();
            tokio::spawn(async move { supervisor.run(handler, cancel).await })
        };
        for _ in 0..100 {
            if app.supervisor.status().connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let (status, body) = call(routes(&app), request()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message_id"], "noop");

        let (_, body) = call(routes(&app), get("/status")).await;
        assert_eq!(body["connection"]["connected"], true);

        cancel.cancel();
        running.await.expect("join").expect("supervisor stops cleanly");
    }
}
