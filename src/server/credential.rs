use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::AppState;
use super::response::ApiError;
use crate::budget::Credential;

/// Hosting credential supplied by the caller.
///
/// `Authorization: Bearer <token>` (or GitHub's `token <token>`) selects an
/// authenticated budget; no header means the anonymous one.
pub struct HostingCredential(pub Credential);

fn parse_authorization(header: Option<&str>) -> Result<Credential, ApiError> {
    let Some(header) = header else {
        return Ok(Credential::anonymous());
    };

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("token "))
        .ok_or_else(|| ApiError::unauthorized("Invalid authorization scheme"))?
        .trim();

    if token.is_empty() {
        return Err(ApiError::unauthorized("Empty token"));
    }
    Ok(Credential::token(token))
}

impl FromRequestParts<Arc<AppState>> for HostingCredential {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|h| h.to_str())
            .transpose()
            .map_err(|_| ApiError::unauthorized("Invalid authorization header"))?;

        parse_authorization(header).map(HostingCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authorization() {
        assert!(!parse_authorization(None).unwrap().is_authenticated());

        let bearer = parse_authorization(Some("Bearer ghp_abc")).unwrap();
        assert_eq!(bearer.secret(), Some("ghp_abc"));

        let legacy = parse_authorization(Some("token ghp_abc")).unwrap();
        assert_eq!(legacy.hash(), bearer.hash());

        assert!(parse_authorization(Some("Basic eDp5")).is_err());
        assert!(parse_authorization(Some("Bearer   ")).is_err());
    }
}
