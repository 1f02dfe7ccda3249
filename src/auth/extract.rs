//! Request extractors resolving the caller from a bearer token.
//!
//! The token is read from `Authorization: Bearer ...`, falling back to a
//! `token` query parameter for clients such as `EventSource` that cannot
//! set headers.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::{header, request::Parts},
};
use serde::Deserialize;
use tracing::debug;

use super::token::{AuthError, Principal, TokenIssuer};
use crate::routers::error::ApiError;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if from_header.is_some() {
        return from_header;
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

/// Rejects the request with 401 unless a valid token is present.
#[derive(Debug, Clone)]
pub struct RequiredUser(pub Principal);

/// `None` when the token is missing or invalid.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<Principal>);

impl<S> FromRequestParts<S> for RequiredUser
where
    S: Send + Sync,
    Arc<TokenIssuer>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let issuer = Arc::<TokenIssuer>::from_ref(state);
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let principal = issuer.verify(&token)?;
        Ok(RequiredUser(principal))
    }
}

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
    Arc<TokenIssuer>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(OptionalUser(None));
        };
        let issuer = Arc::<TokenIssuer>::from_ref(state);
        match issuer.verify(&token) {
            Ok(principal) => Ok(OptionalUser(Some(principal))),
            Err(e) => {
                debug!(error = %e, "Ignoring invalid optional token");
                Ok(OptionalUser(None))
            }
        }
    }
}
