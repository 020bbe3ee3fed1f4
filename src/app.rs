use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, expenses};

pub fn build_app(state: AppState) -> Router {
    let import_max_bytes = state.config.import_max_bytes;
    Router::new()
        .merge(auth::router())
        .merge(expenses::router(import_max_bytes))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;
    use crate::db::{MemoryStore, Store};

    fn app() -> (Router, MemoryStore) {
        let (state, store) = AppState::fake();
        (build_app(state), store)
    }

    fn app_with(config: AppConfig) -> (Router, MemoryStore) {
        let (state, store) = AppState::fake_with(config);
        (build_app(state), store)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Registers, verifies and logs in; returns the bearer token.
    async fn signed_in(app: &Router, store: &MemoryStore) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"username": "sam", "email": "sam@example.com", "password": "password123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));

        let token = store
            .find_user_by_email("sam@example.com")
            .await
            .unwrap()
            .unwrap()
            .verification_token
            .unwrap();
        let (_, body) = call(app, Method::GET, &format!("/auth/verify?token={token}"), None, None).await;
        assert_eq!(body["success"], json!(true));

        let (_, body) = call(
            app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "sam@example.com", "password": "password123"})),
        )
        .await;
        assert_eq!(body["message"], json!("Login successful"));
        assert_eq!(body["token"]["type"], json!("bearer"));
        body["token"]["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app();
        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_validation_failure_is_422() {
        let (app, store) = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"username": "sam", "email": "nope", "password": "short"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Validation failed"));
        let fields: Vec<&str> = body["error"]["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["email", "password"]);
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn malformed_json_is_400_envelope() {
        let (app, _) = app();
        let req = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_200_failure() {
        let (app, store) = app();
        let payload = json!({"username": "sam", "email": "sam@example.com", "password": "password123"});
        call(&app, Method::POST, "/auth/register", None, Some(payload.clone())).await;
        let (status, body) = call(&app, Method::POST, "/auth/register", None, Some(payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Registration failed"));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn expenses_require_bearer_token() {
        let (app, _) = app();
        let (status, body) = call(&app, Method::GET, "/expenses", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], json!(false));

        let (status, _) = call(&app, Method::GET, "/expenses", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expense_lifecycle_over_http() {
        let (app, store) = app();
        let token = signed_in(&app, &store).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/expenses",
            Some(&token),
            Some(json!({"description": "coffee", "amount": 4.5, "category": "food"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], json!("Expenses added successfully"));
        assert_eq!(body["data"]["description"], json!("coffee"));
        assert_eq!(body["data"]["amount"], json!(4.5));
        assert_eq!(body["data"]["category"], json!("food"));
        let id = body["data"]["id"].as_i64().unwrap();

        let (_, body) = call(&app, Method::GET, "/expenses", Some(&token), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = call(
            &app,
            Method::PUT,
            &format!("/expenses/{id}"),
            Some(&token),
            Some(json!({"category": "drinks"})),
        )
        .await;
        assert_eq!(body["data"]["category"], json!("drinks"));

        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/expenses/{}", id + 1),
            Some(&token),
            Some(json!({"category": "drinks"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Expenses not found"));

        let (_, body) = call(&app, Method::DELETE, &format!("/expenses/{id}"), Some(&token), None).await;
        assert_eq!(body["message"], json!("Expenses removed successfully"));

        let (_, body) = call(&app, Method::GET, &format!("/expenses/{id}"), Some(&token), None).await;
        assert_eq!(body["message"], json!("Expenses not found"));
    }

    #[tokio::test]
    async fn expense_validation_is_422() {
        let (app, store) = app();
        let token = signed_in(&app, &store).await;
        let (status, body) = call(
            &app,
            Method::POST,
            "/expenses",
            Some(&token),
            Some(json!({"description": "", "amount": "lots"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["errors"].as_array().unwrap().len(), 3);
        assert_eq!(store.expense_count().await, 0);
    }

    #[tokio::test]
    async fn csv_import_over_http() {
        let (app, store) = app();
        let token = signed_in(&app, &store).await;
        let req = Request::post("/expenses/import")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from("description,amount,category\ncoffee,4.5,food\nbus,2,transport\n"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["imported"], json!(2));
        assert_eq!(store.expense_count().await, 2);
    }

    #[tokio::test]
    async fn me_returns_profile() {
        let (app, store) = app();
        let token = signed_in(&app, &store).await;
        let (status, body) = call(&app, Method::GET, "/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], json!("sam@example.com"));
        assert_eq!(body["data"]["is_verified"], json!(true));
        assert!(body["data"].get("password").is_none());
    }

    #[tokio::test]
    async fn non_numeric_expense_id_is_400_envelope() {
        let (app, store) = app();
        let token = signed_in(&app, &store).await;
        for method in [Method::GET, Method::DELETE] {
            let (status, body) = call(&app, method, "/expenses/abc", Some(&token), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["success"], json!(false));
            assert_eq!(body["message"], json!("Invalid path parameter"));
        }
        let (status, body) = call(
            &app,
            Method::PUT,
            "/expenses/abc",
            Some(&token),
            Some(json!({"category": "drinks"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn oversized_import_is_413_envelope() {
        let mut config = AppConfig::for_tests();
        config.import_max_bytes = 64;
        let (app, store) = app_with(config);
        let token = signed_in(&app, &store).await;

        let mut csv = String::from("description,amount,category\n");
        for i in 0..20 {
            csv.push_str(&format!("coffee {i},4.5,food\n"));
        }
        let req = Request::post("/expenses/import")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(csv))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], json!(false));
        assert_eq!(store.expense_count().await, 0);
    }

    #[tokio::test]
    async fn create_with_store_down_is_a_200_failure_not_422() {
        let (app, store) = app();
        let token = signed_in(&app, &store).await;
        store.set_unavailable(true);
        let (status, body) = call(
            &app,
            Method::POST,
            "/expenses",
            Some(&token),
            Some(json!({"description": "coffee", "amount": 4.5, "category": "food"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Failed to add expenses"));
        assert!(body["error"].as_str().unwrap().contains("database unavailable"));
    }
}
