use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::auth::{AppState, AuthError};

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
}

/// Resolve the caller with the configured resolver or reject the request.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user_id = state.resolver.resolve(req.headers()).await?;
    req.extensions_mut().insert(Identity { user_id });
    Ok(next.run(req).await)
}
