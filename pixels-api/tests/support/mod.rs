//! Router harness over the in-memory stores.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header::AUTHORIZATION, Method, Request, Response};
use axum::Router;
use pixels_api::{create_api_router, generate_jwt_token, ApiConfig, AppState, AuthConfig, JwtSecret};
use pixels_core::Identity;
use pixels_test_utils::fixtures;
use pixels_test_utils::{InMemoryFastStore, InMemoryHistoryStore};
use tower::ServiceExt;

pub const SECRET: &str = "pixels-http-test-secret-0123456789abcdef";

/// Small board, quick cold start, default limits.
pub fn test_config() -> ApiConfig {
    ApiConfig {
        board: fixtures::small_board(),
        cold_start_wait: Duration::from_millis(200),
        ..Default::default()
    }
}

pub struct Harness {
    pub app: Router,
    pub history: Arc<InMemoryHistoryStore>,
    pub fast: Arc<InMemoryFastStore>,
    pub auth: Arc<AuthConfig>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ApiConfig) -> Self {
        let (history, fast) = fixtures::stores();
        let auth = AuthConfig::new(JwtSecret::new(SECRET.to_string()).unwrap());
        let state = AppState::new(history.clone(), fast.clone(), auth, config);
        let auth = state.auth.clone();
        let app = create_api_router(state).unwrap();
        Self {
            app,
            history,
            fast,
            auth,
        }
    }

    pub fn bearer(&self, identity: Identity) -> String {
        format!(
            "Bearer {}",
            generate_jwt_token(&self.auth, identity, 3600).unwrap()
        )
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, identity: Option<Identity>) -> Response<Body> {
        self.send(self.request(Method::GET, uri, identity, Body::empty()))
            .await
    }

    pub async fn head(&self, uri: &str, identity: Option<Identity>) -> Response<Body> {
        self.send(self.request(Method::HEAD, uri, identity, Body::empty()))
            .await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        identity: Option<Identity>,
        body: serde_json::Value,
    ) -> Response<Body> {
        let mut request = self.request(Method::POST, uri, identity, Body::from(body.to_string()));
        request.headers_mut().insert(
            "content-type",
            "application/json".parse().unwrap(),
        );
        self.send(request).await
    }

    fn request(
        &self,
        method: Method,
        uri: &str,
        identity: Option<Identity>,
        body: Body,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(identity) = identity {
            builder = builder.header(AUTHORIZATION, self.bearer(identity));
        }
        builder.body(body).unwrap()
    }
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
