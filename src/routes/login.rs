use actix_web::{web, HttpRequest, HttpResponse};
use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::auth::{basic_auth, validate_creds, AuthenticatedUser};
use crate::models::{Role, User};
use crate::session::TypedSession;
use crate::storage::Storage;

/// The signed-in user together with their effective role.
#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(flatten)]
    pub user: User,
    pub role: Role,
}

async fn current_user(
    user_id: String,
    storage: &dyn Storage,
) -> Result<Option<CurrentUser>, ApiError> {
    let Some(user) = storage.get_user(user_id.clone()).await? else {
        return Ok(None);
    };
    let role = storage
        .get_user_role(user_id)
        .await?
        .map(|r| r.role)
        .unwrap_or_default();
    Ok(Some(CurrentUser { user, role }))
}

#[tracing::instrument(
    name = "Logging in",
    skip(request, session, storage),
    fields(username = tracing::field::Empty, user_id = tracing::field::Empty)
)]
pub async fn login(
    request: HttpRequest,
    session: TypedSession,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let credentials = basic_auth(request.headers())?;
    tracing::Span::current().record("username", credentials.username.as_str());

    let user_id = validate_creds(credentials, storage.get_ref()).await?;
    tracing::Span::current().record("user_id", user_id.as_str());

    session.renew();
    session
        .insert_user_id(&user_id)
        .context("Failed to store the user id in the session")?;

    let user = current_user(user_id, storage.get_ref())
        .await?
        .context("Credentials matched a user that no longer exists")?;
    Ok(HttpResponse::Ok().json(user))
}

#[tracing::instrument(name = "Logging out", skip(session))]
pub async fn log_out(session: TypedSession) -> HttpResponse {
    session.log_out();
    HttpResponse::NoContent().finish()
}

#[tracing::instrument(name = "Fetching the current user", skip(storage), fields(user_id = %user.id))]
pub async fn auth_user(
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let current = current_user(user.id, storage.get_ref())
        .await?
        .ok_or(ApiError::Authentication)?;
    Ok(HttpResponse::Ok().json(current))
}
