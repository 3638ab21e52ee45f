//! Routes and the authorization gate

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;

use tg_core::types::{Caller, SessionKey, TargetId};

use super::socket::serve_terminal;
use crate::state::Gateway;

/// Authorization result handed from the gate to the upgrade handler
#[derive(Debug, Clone)]
pub struct TerminalGrant {
    pub caller: Caller,
    pub target: TargetId,
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Build the gateway router
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/terminal/:target_id", get(terminal_upgrade))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&gateway),
            authorize_terminal,
        ))
        .with_state(gateway)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "code": status.as_u16(),
            "message": message,
        })),
    )
        .into_response()
}

/// Bearer token from the `Authorization` header, or the `token` query
/// parameter for browsers that cannot set headers on a WebSocket
fn bearer_token(headers: &HeaderMap, query: TokenQuery) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .or(query.token)
}

/// Reject the request before any upgrade or connection attempt unless the
/// caller may open a terminal on the target
async fn authorize_terminal(
    State(gateway): State<Arc<Gateway>>,
    Path(raw_target): Path<String>,
    query: Option<Query<TokenQuery>>,
    mut request: Request,
    next: Next,
) -> Response {
    let target = match raw_target.parse::<TargetId>() {
        Ok(target) => target,
        Err(_) => {
            tracing::debug!("Rejecting terminal request for invalid target '{}'", raw_target);
            return error_response(StatusCode::BAD_REQUEST, "invalid target id");
        }
    };

    let query = query.map(|Query(q)| q).unwrap_or_default();
    let caller = bearer_token(request.headers(), query)
        .and_then(|token| gateway.access().identify(&token));

    let caller = match caller {
        Some(caller) if gateway.access().may_open_terminal(&caller, target) => caller,
        Some(caller) => {
            tracing::warn!(
                "User {} denied terminal access to target {}",
                caller.user_id,
                target
            );
            return error_response(StatusCode::UNAUTHORIZED, "access denied");
        }
        None => {
            tracing::warn!("Unauthenticated terminal request for target {}", target);
            return error_response(StatusCode::UNAUTHORIZED, "access denied");
        }
    };

    request
        .extensions_mut()
        .insert(TerminalGrant { caller, target });
    next.run(request).await
}

async fn terminal_upgrade(
    State(gateway): State<Arc<Gateway>>,
    Extension(grant): Extension<TerminalGrant>,
    ws: WebSocketUpgrade,
) -> Response {
    let session = SessionKey::new();
    tracing::info!(
        "Session {}: user {} opening terminal on target {}",
        session,
        grant.caller.user_id,
        grant.target
    );

    ws.on_upgrade(move |socket| serve_terminal(gateway, socket, session, grant.target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    use tg_core::config::{AccessConfig, CallerEntry, GatewayConfig};
    use tg_core::types::Role;

    use crate::access::TokenAccessPolicy;
    use crate::directory::MemoryDirectory;
    use crate::testing::ScriptedConnector;

    fn app() -> Router {
        let access = TokenAccessPolicy::new(&AccessConfig {
            callers: vec![CallerEntry {
                token_sha256: CallerEntry::hash_token("user-token"),
                user_id: 2,
                role: Role::User,
                targets: vec![7],
            }],
        });
        let (connector, _remotes) = ScriptedConnector::new();
        let gateway = Gateway::new(
            GatewayConfig::default(),
            Arc::new(MemoryDirectory::new()),
            Arc::new(connector),
            Arc::new(access),
        );
        router(Arc::new(gateway))
    }

    async fn status_of(uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (status, body) = status_of("/terminal/7", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401);
        assert_eq!(body["message"], "access denied");
    }

    #[tokio::test]
    async fn test_wrong_target_is_unauthorized() {
        let (status, _) = status_of("/terminal/8", Some("user-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = status_of("/terminal/7", Some("forged")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_non_numeric_target_is_bad_request() {
        let (status, body) = status_of("/terminal/abc", Some("user-token")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }

    #[tokio::test]
    async fn test_authorized_request_reaches_upgrade() {
        // A plain GET passes the gate and is then refused by the upgrade
        // extractor, not by the gate
        let (status, _) = status_of("/terminal/7?token=user-token", None).await;
        assert_ne!(status, StatusCode::UNAUTHORIZED);
        assert!(status.is_client_error());
    }

    #[test]
    fn test_header_token_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        let query = TokenQuery {
            token: Some("xyz".into()),
        };
        assert_eq!(bearer_token(&headers, query).as_deref(), Some("abc"));

        let query = TokenQuery {
            token: Some("xyz".into()),
        };
        assert_eq!(bearer_token(&HeaderMap::new(), query).as_deref(), Some("xyz"));
    }
}
