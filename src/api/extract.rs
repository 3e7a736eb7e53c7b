//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::UserId;
use crate::error::GatewayError;

/// Header carrying the caller's user id, set by the upstream identity
/// provider.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
///
/// Authentication happens upstream; this extractor only reads the user id
/// the identity provider forwarded. A missing or malformed header rejects
/// the request with `401 Unauthorized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| unauthorized("header is missing"))?
            .to_str()
            .map_err(|_| unauthorized("is not valid text"))?;
        let id = uuid::Uuid::parse_str(raw.trim()).map_err(|_| unauthorized("is not a valid id"))?;
        Ok(Self(UserId::from_uuid(id)))
    }
}

fn unauthorized(problem: &str) -> GatewayError {
    GatewayError::Unauthorized(format!("{USER_ID_HEADER} {problem}"))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<CurrentUser, GatewayError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let Ok(request) = builder.body(()) else {
            panic!("request build failed");
        };
        let (mut parts, ()) = request.into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_the_forwarded_user_id() {
        let id = uuid::Uuid::new_v4();
        let Ok(CurrentUser(user)) = extract(Some(&id.to_string())).await else {
            panic!("extraction failed");
        };
        assert_eq!(*user.as_uuid(), id);
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_unauthorized() {
        for header in [None, Some("not-a-uuid"), Some("")] {
            assert!(matches!(
                extract(header).await,
                Err(GatewayError::Unauthorized(_))
            ));
        }
    }
}
