use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::auth::AuthenticatedUser;
use crate::models::{require_text, NewUserRole, Role, ValidationError};
use crate::storage::Storage;

/// Complete role record for a user. Omitted optional fields are cleared.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleForm {
    pub user_id: Option<String>,
    pub role: Option<Role>,
    pub rut: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl TryFrom<UserRoleForm> for NewUserRole {
    type Error = ValidationError;

    fn try_from(form: UserRoleForm) -> Result<Self, Self::Error> {
        Ok(NewUserRole {
            user_id: require_text("userId", form.user_id)?,
            role: form.role.unwrap_or_default(),
            rut: form.rut,
            phone: form.phone,
            address: form.address,
            birth_date: form.birth_date,
        })
    }
}

#[tracing::instrument(name = "Fetching a user's role", skip(storage), fields(user_id = %user.id))]
pub async fn get_user_role(
    id: web::Path<String>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let role = storage
        .get_user_role(id.clone())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Role for user {id}")))?;
    Ok(HttpResponse::Ok().json(role))
}

#[tracing::instrument(
    name = "Assigning a role",
    skip(form, storage),
    fields(user_id = %user.id, role = ?form.role)
)]
pub async fn set_user_role(
    form: web::Json<UserRoleForm>,
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    user.require_admin()?;
    let role: NewUserRole = form.into_inner().try_into()?;
    let role = storage.set_user_role(role).await?;
    Ok(HttpResponse::Ok().json(role))
}

#[tracing::instrument(name = "Listing users", skip(storage), fields(user_id = %user.id))]
pub async fn list_users(
    user: AuthenticatedUser,
    storage: web::Data<dyn Storage>,
) -> Result<HttpResponse, ApiError> {
    user.require_staff()?;
    let users = storage.list_users().await?;
    Ok(HttpResponse::Ok().json(users))
}
