//! Bearer-token identity.
//!
//! [`identity_middleware`] runs on every route. A request without an
//! `Authorization` header passes through anonymously; a request with a
//! header that does not verify is rejected with 401. Verified callers get
//! their [`Identity`] inserted into the request extensions, where the rate
//! limit gate and the extractors below pick it up.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use pixels_core::Identity;

use crate::auth::{validate_jwt_token, AuthConfig};
use crate::error::ApiError;

pub async fn identity_middleware(
    State(auth): State<Arc<AuthConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(header) = request.headers().get(AUTHORIZATION) {
        let value = header
            .to_str()
            .map_err(|_| ApiError::invalid_token("Authorization header is not valid text"))?;
        let token = value.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::invalid_token("Authorization header must use the Bearer scheme")
        })?;
        let claims = validate_jwt_token(&auth, token.trim())?;
        request.extensions_mut().insert(claims.identity());
    }

    Ok(next.run(request).await)
}

/// A verified caller. Rejects anonymous requests with 401.
#[derive(Debug, Clone, Copy)]
pub struct AuthIdentity(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .copied()
            .map(AuthIdentity)
            .ok_or_else(|| {
                ApiError::unauthorized(
                    "No token provided. Send one as 'Authorization: Bearer <token>'",
                )
            })
    }
}

/// A verified caller with moderation rights: 401 when anonymous, 403 when
/// the token is not privileged.
#[derive(Debug, Clone, Copy)]
pub struct ModeratorIdentity(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ModeratorIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthIdentity(identity) = AuthIdentity::from_request_parts(parts, state).await?;
        if !identity.privileged {
            return Err(ApiError::forbidden("Moderator access required"));
        }
        Ok(ModeratorIdentity(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_jwt_token, JwtSecret};
    use crate::error::ErrorCode;
    use axum::{body::Body, http::StatusCode, middleware::from_fn_with_state, routing::get, Router};
    use tower::ServiceExt;

    fn auth() -> Arc<AuthConfig> {
        Arc::new(AuthConfig::new(
            JwtSecret::new("identity-test-secret-0123456789abcdef".to_string()).unwrap(),
        ))
    }

    fn app(auth: Arc<AuthConfig>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|AuthIdentity(identity): AuthIdentity| async move {
                    identity.user_id.0.to_string()
                }),
            )
            .route(
                "/mod",
                get(|ModeratorIdentity(_): ModeratorIdentity| async { "ok" }),
            )
            .route("/open", get(|| async { "open" }))
            .layer(from_fn_with_state(auth, identity_middleware))
    }

    async fn status(app: Router, uri: &str, token: Option<&str>) -> StatusCode {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, token);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_anonymous_passes_unprotected_route() {
        assert_eq!(status(app(auth()), "/open", None).await, StatusCode::OK);
        assert_eq!(
            status(app(auth()), "/whoami", None).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_bad_token_rejected_everywhere() {
        assert_eq!(
            status(app(auth()), "/open", Some("Bearer nope")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status(app(auth()), "/open", Some("Basic abc")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_moderator_route_checks_privilege() {
        let auth = auth();
        let user = format!(
            "Bearer {}",
            generate_jwt_token(&auth, Identity::user(5), 600).unwrap()
        );
        let moderator = format!(
            "Bearer {}",
            generate_jwt_token(&auth, Identity::moderator(6), 600).unwrap()
        );

        assert_eq!(
            status(app(auth.clone()), "/whoami", Some(&user)).await,
            StatusCode::OK
        );
        assert_eq!(
            status(app(auth.clone()), "/mod", Some(&user)).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(app(auth), "/mod", Some(&moderator)).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_missing_identity_error_code() {
        let mut parts = Request::builder()
            .uri("/")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let err = AuthIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }
}
