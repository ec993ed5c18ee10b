//! Small payments API with the audit pipeline attached.
//!
//! ```text
//! MONAY_LOG_FORMAT=compact cargo run -p monay-audit-http --example audited_server
//! curl -X POST localhost:3000/api/payments \
//!     -H 'content-type: application/json' -H 'x-user-id: usr_1' \
//!     -d '{"amount": 50, "cardToken": "tok_abc"}'
//! ```
//!
//! `MONAY_AUDIT_CONFIG` points at an optional YAML config and
//! `MONAY_AUDIT_FILE` switches the sink from tracing output to a JSON Lines
//! file.

use anyhow::Context as _;
use axum::{
    extract::{Json, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use monay_audit_http::{
    ActionAuditLayer, ActionOptions, AuditConfig, AuditIdentity, AuditLayer, AuditSeverity,
    AuditSink, ComplianceAnnotations, ComplianceAuditLayer, JsonLinesSink, SecurityAuditLayer,
    TracingSink,
};
use monay_common_log::{info, LogConfig};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    monay_common_log::init(LogConfig::from_env())?;

    let config = match std::env::var("MONAY_AUDIT_CONFIG") {
        Ok(path) => AuditConfig::load(&path).with_context(|| format!("loading {path}"))?,
        Err(_) => AuditConfig::default(),
    }
    .apply_env()?;

    let sink: Arc<dyn AuditSink> = match std::env::var("MONAY_AUDIT_FILE") {
        Ok(path) => Arc::new(JsonLinesSink::open(path).await?),
        Err(_) => Arc::new(TracingSink::new()),
    };

    let audit = AuditLayer::spawn(sink, config);
    let emitter = audit.emitter().clone();

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/users", post(create_user))
        .route("/api/payments", post(create_payment))
        .route(
            "/api/kyc/verify",
            post(verify_kyc).layer(ComplianceAuditLayer::new(emitter.clone(), "kyc-verification")),
        )
        .route(
            "/api/auth/login",
            post(login).layer(
                SecurityAuditLayer::new(emitter.clone(), "login-attempt")
                    .with_severity(AuditSeverity::Warning),
            ),
        )
        .route(
            "/api/keys/rotate",
            post(rotate_key).layer(ActionAuditLayer::new(
                emitter,
                ActionOptions::new("API_KEY_ROTATE")
                    .resource("api_keys")
                    .severity(AuditSeverity::Security)
                    .capture_response(true),
            )),
        )
        .layer(audit)
        .layer(middleware::from_fn(identify))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Audited server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Stand-in for real authentication: trusts `x-user-id` / `x-tenant-id`.
async fn identify(mut req: Request, next: Next) -> Response {
    let identity = {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        AuditIdentity {
            user_id: header("x-user-id"),
            tenant_id: header("x-tenant-id"),
            session_id: header("x-session-id"),
        }
    };
    req.extensions_mut().insert(identity);
    next.run(req).await
}

async fn create_user(Json(body): Json<Value>) -> impl IntoResponse {
    (StatusCode::CREATED, Json(json!({"id": "usr_2", "email": body["email"]})))
}

async fn create_payment(Json(body): Json<Value>) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(json!({"id": "pay_1", "amount": body["amount"], "status": "pending"})),
    )
}

async fn verify_kyc(Json(body): Json<Value>) -> Response {
    let risk = if body.get("ssn").is_some() { 10.0 } else { 65.0 };
    let mut response = Json(json!({"verified": risk < 50.0})).into_response();
    response.extensions_mut().insert(ComplianceAnnotations {
        regulations: vec!["BSA".to_string(), "KYC".to_string()],
        risk_score: Some(risk),
        ..Default::default()
    });
    response
}

async fn login(Json(body): Json<Value>) -> StatusCode {
    if body["password"] == "correct horse" {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    }
}

async fn rotate_key() -> Json<Value> {
    Json(json!({"id": "key_2", "apiKey": "sk_live_rotated"}))
}
