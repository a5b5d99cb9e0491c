//! HTTP transport.
//!
//! A single endpoint path accepts GET, POST, DELETE, and OPTIONS; a health
//! path reports status and the open-session count. Admission control (host
//! allow-list, origin allow-list, bearer auth) runs before session handling;
//! TTL pruning runs on every inbound request before dispatch.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::config::{HttpConfig, SessionMode};
use crate::server::{dispatch_message, is_initialize, rpc_codes, SessionManager, ToolRegistry};

pub const SESSION_HEADER: &str = "mcp-session-id";

const LOOPBACK_HOSTS: [&str; 3] = ["127.0.0.1", "localhost", "[::1]"];

/// Shared state behind the router.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub sessions: Arc<SessionManager>,
    pub config: Arc<HttpConfig>,
}

/// Build the router for the configured endpoint and health paths.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(&state.config.endpoint_path, any(mcp_handler))
        .route(&state.config.health_path, get(health_handler))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unhandled exceptions become the uniform 500 envelope; stack traces never
/// cross the wire.
fn panic_response(
    _err: Box<dyn std::any::Any + Send + 'static>,
) -> axum::http::Response<axum::body::Body> {
    tracing::error!("handler panicked");
    let body = json!({
        "jsonrpc": "2.0",
        "error": { "code": rpc_codes::INTERNAL_ERROR, "message": "Internal server error" },
        "id": null,
    })
    .to_string();
    axum::http::Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(body))
        .unwrap_or_default()
}

/// Serve until ctrl-c, then close all sessions.
pub async fn run_http(state: AppState) -> anyhow::Result<()> {
    let address = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, endpoint = %state.config.endpoint_path, "http transport listening");

    let sessions = state.sessions.clone();
    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    sessions.close_all();
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let payload = json!({
        "status": "ok",
        "open_sessions": state.sessions.len(),
        "version": env!("CARGO_PKG_VERSION"),
    });
    json_response(StatusCode::OK, &payload, &HeaderMap::new(), &state.config)
}

async fn mcp_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let config = &state.config;

    // Host allow-list: loopback defaults apply when unset and the bind
    // address is loopback.
    if !host_allowed(&headers, config) {
        return plain_error(StatusCode::FORBIDDEN, "Forbidden: host not allowed", &headers, config);
    }
    if !origin_allowed(&headers, config) {
        return plain_error(
            StatusCode::FORBIDDEN,
            "Forbidden: origin not allowed",
            &headers,
            config,
        );
    }

    if method == Method::OPTIONS {
        // Preflights skip the auth check.
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors(response.headers_mut(), &headers, config);
        return response;
    }

    if !authorized(&headers, config) {
        return plain_error(
            StatusCode::UNAUTHORIZED,
            "Unauthorized: missing or invalid bearer token",
            &headers,
            config,
        );
    }

    let now = Instant::now();
    if config.session_mode == SessionMode::Stateful {
        // Prune expired sessions before any dispatch.
        state.sessions.prune(now);
    }

    if method == Method::POST {
        handle_post(&state, &headers, body, now).await
    } else if method == Method::DELETE {
        handle_delete(&state, &headers, now)
    } else if method == Method::GET {
        plain_error(
            StatusCode::METHOD_NOT_ALLOWED,
            "GET requires an event stream, which this server does not provide",
            &headers,
            config,
        )
    } else {
        plain_error(
            StatusCode::METHOD_NOT_ALLOWED,
            "Unsupported method",
            &headers,
            config,
        )
    }
}

async fn handle_post(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
    now: Instant,
) -> Response {
    let config = &state.config;

    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(_) => {
            let payload = crate::server::rpc_error(
                Value::Null,
                rpc_codes::INVALID_REQUEST,
                "Invalid JSON body",
            );
            return json_response(StatusCode::BAD_REQUEST, &payload, headers, config);
        }
    };

    let mut assigned_session: Option<String> = None;
    if config.session_mode == SessionMode::Stateful {
        match session_id_of(headers) {
            Some(session_id) => {
                if !state.sessions.touch(&session_id, now) {
                    let payload = crate::server::rpc_error(
                        Value::Null,
                        rpc_codes::SESSION_NOT_FOUND,
                        "Session not found",
                    );
                    return json_response(StatusCode::NOT_FOUND, &payload, headers, config);
                }
            }
            None => {
                // A request without a session id must be an initialization.
                if !is_initialize(&message) {
                    let payload = crate::server::rpc_error(
                        Value::Null,
                        rpc_codes::INVALID_REQUEST,
                        "Missing Mcp-Session-Id header",
                    );
                    return json_response(StatusCode::BAD_REQUEST, &payload, headers, config);
                }
                let session = state.sessions.create(now);
                tracing::info!(session_id = %session.session_id, "session created");
                assigned_session = Some(session.session_id);
            }
        }
    }

    let response_body = dispatch_message(&state.registry, &message).await;
    let mut response = match response_body {
        Some(payload) => json_response(StatusCode::OK, &payload, headers, config),
        None => {
            let mut response = StatusCode::ACCEPTED.into_response();
            apply_cors(response.headers_mut(), headers, config);
            response
        }
    };

    if let Some(session_id) = assigned_session {
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    response
}

fn handle_delete(state: &AppState, headers: &HeaderMap, _now: Instant) -> Response {
    let config = &state.config;
    if config.session_mode == SessionMode::Stateless {
        let mut response = StatusCode::OK.into_response();
        apply_cors(response.headers_mut(), headers, config);
        return response;
    }

    match session_id_of(headers) {
        Some(session_id) => {
            if !state.sessions.remove(&session_id) {
                let payload = crate::server::rpc_error(
                    Value::Null,
                    rpc_codes::SESSION_NOT_FOUND,
                    "Session not found",
                );
                return json_response(StatusCode::NOT_FOUND, &payload, headers, config);
            }
            tracing::info!(%session_id, "session closed by client");
            let mut response = StatusCode::OK.into_response();
            apply_cors(response.headers_mut(), headers, config);
            response
        }
        None => plain_error(
            StatusCode::BAD_REQUEST,
            "Missing Mcp-Session-Id header",
            headers,
            config,
        ),
    }
}

fn session_id_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn authorized(headers: &HeaderMap, config: &HttpConfig) -> bool {
    let Some(api_key) = &config.api_key else {
        return true;
    };
    let expected = format!("Bearer {api_key}");
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected)
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 keeps its brackets; everything else drops the port.
    if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        host.split(':').next().unwrap_or(host)
    }
}

fn bind_is_loopback(config: &HttpConfig) -> bool {
    LOOPBACK_HOSTS.contains(&config.host.as_str()) || config.host == "::1"
}

fn host_allowed(headers: &HeaderMap, config: &HttpConfig) -> bool {
    let Some(host) = headers.get(header::HOST).and_then(|value| value.to_str().ok()) else {
        // HTTP/2 carries the authority pseudo-header instead.
        return true;
    };
    let host = strip_port(host);

    if config.allowed_hosts.is_empty() {
        if bind_is_loopback(config) {
            return LOOPBACK_HOSTS.contains(&host);
        }
        return true;
    }
    config
        .allowed_hosts
        .iter()
        .any(|allowed| strip_port(allowed) == host)
}

fn origin_allowed(headers: &HeaderMap, config: &HttpConfig) -> bool {
    let Some(origin) = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
    else {
        return true;
    };

    if config.allowed_origins.is_empty() {
        if bind_is_loopback(config) {
            return origin_host(origin)
                .map(|host| LOOPBACK_HOSTS.contains(&host.as_str()))
                .unwrap_or(false);
        }
        return true;
    }
    config
        .allowed_origins
        .iter()
        .any(|allowed| allowed == origin)
}

fn origin_host(origin: &str) -> Option<String> {
    let rest = origin.split("://").nth(1)?;
    Some(strip_port(rest).to_string())
}

/// CORS headers are attached only when an `Origin` was supplied; `Vary:
/// Origin` is always set.
fn apply_cors(out: &mut HeaderMap, request_headers: &HeaderMap, _config: &HttpConfig) {
    out.insert(header::VARY, HeaderValue::from_static("Origin"));
    let Some(origin) = request_headers.get(header::ORIGIN).cloned() else {
        return;
    };
    out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    out.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    out.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type, authorization, mcp-session-id"),
    );
    out.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("mcp-session-id"),
    );
}

fn json_response(
    status: StatusCode,
    payload: &Value,
    request_headers: &HeaderMap,
    config: &HttpConfig,
) -> Response {
    let body = payload.to_string();
    let mut response = (status, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    apply_cors(response.headers_mut(), request_headers, config);
    response
}

fn plain_error(
    status: StatusCode,
    message: &str,
    request_headers: &HeaderMap,
    config: &HttpConfig,
) -> Response {
    let payload = json!({ "error": message });
    json_response(status, &payload, request_headers, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(hosts: Vec<String>, origins: Vec<String>) -> HttpConfig {
        HttpConfig {
            allowed_hosts: hosts,
            allowed_origins: origins,
            ..HttpConfig::default()
        }
    }

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_loopback_host_default() {
        let config = config_with(vec![], vec![]);
        assert!(host_allowed(
            &headers_with(&[("host", "127.0.0.1:3000")]),
            &config
        ));
        assert!(host_allowed(&headers_with(&[("host", "localhost")]), &config));
        assert!(!host_allowed(
            &headers_with(&[("host", "evil.example.org")]),
            &config
        ));
    }

    #[test]
    fn test_explicit_host_allowlist() {
        let config = config_with(vec!["api.example.org".to_string()], vec![]);
        assert!(host_allowed(
            &headers_with(&[("host", "api.example.org:443")]),
            &config
        ));
        assert!(!host_allowed(
            &headers_with(&[("host", "127.0.0.1")]),
            &config
        ));
    }

    #[test]
    fn test_origin_rules() {
        let config = config_with(vec![], vec![]);
        // No origin header: allowed.
        assert!(origin_allowed(&HeaderMap::new(), &config));
        // Loopback origin under loopback defaults: allowed.
        assert!(origin_allowed(
            &headers_with(&[("origin", "http://localhost:5173")]),
            &config
        ));
        assert!(!origin_allowed(
            &headers_with(&[("origin", "https://evil.example.org")]),
            &config
        ));

        let config = config_with(vec![], vec!["https://app.example.org".to_string()]);
        assert!(origin_allowed(
            &headers_with(&[("origin", "https://app.example.org")]),
            &config
        ));
        assert!(!origin_allowed(
            &headers_with(&[("origin", "https://other.example.org")]),
            &config
        ));
    }

    #[test]
    fn test_bearer_auth() {
        let mut config = config_with(vec![], vec![]);
        config.api_key = Some("secret".to_string());

        assert!(authorized(
            &headers_with(&[("authorization", "Bearer secret")]),
            &config
        ));
        assert!(!authorized(
            &headers_with(&[("authorization", "Bearer wrong")]),
            &config
        ));
        assert!(!authorized(&HeaderMap::new(), &config));

        config.api_key = None;
        assert!(authorized(&HeaderMap::new(), &config));
    }

    #[test]
    fn test_cors_only_with_origin() {
        let config = config_with(vec![], vec![]);
        let mut out = HeaderMap::new();
        apply_cors(&mut out, &HeaderMap::new(), &config);
        assert_eq!(out.get(header::VARY).unwrap(), "Origin");
        assert!(out.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

        let mut out = HeaderMap::new();
        apply_cors(
            &mut out,
            &headers_with(&[("origin", "http://localhost:5173")]),
            &config,
        );
        assert_eq!(
            out.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5173"
        );
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("localhost:3000"), "localhost");
        assert_eq!(strip_port("127.0.0.1"), "127.0.0.1");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }
}
