use axum::{extract::State, Json};

use crate::{
    auth::{IssuedToken, Principal, RequiredUser},
    routers::error::ApiError,
    server::AppState,
};

/// `POST /auth/anonymous`: a fresh anonymous identity and its token.
pub async fn anonymous_login(State(state): State<AppState>) -> Result<Json<IssuedToken>, ApiError> {
    let issued = state
        .context
        .token_issuer
        .issue_anonymous()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(issued))
}

/// `GET /auth/me`
pub async fn current_user(RequiredUser(user): RequiredUser) -> Json<Principal> {
    Json(user)
}
