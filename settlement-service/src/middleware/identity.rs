//! Caller identity extracted from headers set by the trusted front-end.
//!
//! `X-User-ID` is required. `X-User-Role` defaults to `staff`. The view flags
//! (`X-Can-View-All`, `X-Can-View-Own`) default from the role when absent:
//! admins see everything, distributors see their own invoices.

use crate::models::{AccessScope, Role};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";
pub const CAN_VIEW_ALL_HEADER: &str = "X-Can-View-All";
pub const CAN_VIEW_OWN_HEADER: &str = "X-Can-View-Own";

/// The access scope of the calling user.
#[derive(Debug, Clone)]
pub struct Caller(pub AccessScope);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn flag(headers: &HeaderMap, name: &str) -> Result<Option<bool>, AppError> {
    match header(headers, name) {
        None => Ok(None),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Invalid {} header value '{}'",
                name,
                other
            ))),
        },
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(&parts.headers, USER_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header"))
        })?;
        let actor_id = Uuid::parse_str(user_id).map_err(|_| {
            AppError::Unauthorized(anyhow::anyhow!("X-User-ID must be a UUID"))
        })?;

        let role = header(&parts.headers, USER_ROLE_HEADER)
            .map(|r| Role::from_string(&r.trim().to_ascii_lowercase()))
            .unwrap_or(Role::Staff);

        let can_view_all =
            flag(&parts.headers, CAN_VIEW_ALL_HEADER)?.unwrap_or(role == Role::Admin);
        let can_view_own = flag(&parts.headers, CAN_VIEW_OWN_HEADER)?
            .unwrap_or(matches!(role, Role::Admin | Role::Distributor));

        tracing::Span::current().record("user_id", user_id);

        Ok(Caller(AccessScope::new(
            actor_id,
            role,
            can_view_all,
            can_view_own,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> Result<Caller, AppError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        let result = extract(Request::builder()).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_role_defaults_view_flags() {
        let actor = Uuid::new_v4();
        let Caller(scope) = extract(
            Request::builder()
                .header(USER_ID_HEADER, actor.to_string())
                .header(USER_ROLE_HEADER, "Distributor"),
        )
        .await
        .unwrap();

        assert_eq!(scope, AccessScope::distributor(actor));
    }

    #[tokio::test]
    async fn test_explicit_flags_override_role() {
        let actor = Uuid::new_v4();
        let Caller(scope) = extract(
            Request::builder()
                .header(USER_ID_HEADER, actor.to_string())
                .header(USER_ROLE_HEADER, "staff")
                .header(CAN_VIEW_ALL_HEADER, "true"),
        )
        .await
        .unwrap();

        assert!(scope.can_view_all);
        assert!(!scope.can_view_own);
        assert_eq!(scope.role, Role::Staff);
    }

    #[tokio::test]
    async fn test_malformed_flag_is_rejected() {
        let result = extract(
            Request::builder()
                .header(USER_ID_HEADER, Uuid::new_v4().to_string())
                .header(CAN_VIEW_OWN_HEADER, "sometimes"),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
