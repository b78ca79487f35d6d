//! Handlers behind the auth gate.
//!
//! Both read the [`AuthenticatedIdentity`] the gate attached to the request.

use crate::auth::{AuthenticatedIdentity, ProfileClaims};
use crate::handlers::ApiResponse;
use axum::{Extension, Json};
use serde::Serialize;
use tracing::instrument;

/// Profile fields taken from the caller's token.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileData {
    /// Token subject.
    pub user_id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivateData {
    pub secret: &'static str,
}

/// Handler for GET /api/private/profile
///
/// ## Response
///
/// ```json
/// {
///   "status": "success",
///   "message": "User profile",
///   "data": { "user_id": "auth0|abc", "email": "a@b.com", "name": "Ada" }
/// }
/// ```
#[instrument(skip_all, name = "api.handlers.profile")]
pub async fn get_profile(
    Extension(identity): Extension<AuthenticatedIdentity<ProfileClaims>>,
) -> Json<ApiResponse<ProfileData>> {
    tracing::debug!(target: "api.handlers.profile", "Returning profile claims");

    let AuthenticatedIdentity { registered, custom } = identity;

    Json(ApiResponse::success(
        "User profile",
        Some(ProfileData {
            user_id: registered.sub.unwrap_or_default(),
            email: custom.email,
            name: custom.name,
        }),
    ))
}

/// Handler for GET /api/private/data
#[instrument(skip_all, name = "api.handlers.data")]
pub async fn get_private_data(
    Extension(_identity): Extension<AuthenticatedIdentity<ProfileClaims>>,
) -> Json<ApiResponse<PrivateData>> {
    Json(ApiResponse::success(
        "Sensitive data",
        Some(PrivateData {
            secret: "This information is only available to authenticated users",
        }),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::RegisteredClaims;

    fn identity() -> AuthenticatedIdentity<ProfileClaims> {
        AuthenticatedIdentity {
            registered: RegisteredClaims {
                sub: Some("auth0|user-1".to_string()),
                ..Default::default()
            },
            custom: ProfileClaims {
                email: "a@b.com".to_string(),
                name: "Ada".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_profile_returns_identity_fields() {
        let Json(response) = get_profile(Extension(identity())).await;
        let data = response.data.unwrap();

        assert_eq!(response.status, "success");
        assert_eq!(data.user_id, "auth0|user-1");
        assert_eq!(data.email, "a@b.com");
        assert_eq!(data.name, "Ada");
    }

    #[tokio::test]
    async fn test_profile_without_subject() {
        let mut identity = identity();
        identity.registered.sub = None;

        let Json(response) = get_profile(Extension(identity)).await;
        assert_eq!(response.data.unwrap().user_id, "");
    }

    #[tokio::test]
    async fn test_private_data() {
        let Json(response) = get_private_data(Extension(identity())).await;
        let json = serde_json::to_string(&response).unwrap();

        assert!(json.contains("\"status\":\"success\""));
        assert!(json.contains("authenticated users"));
    }
}
