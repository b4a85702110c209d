use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use anyhow::Context;
use futures::future::LocalBoxFuture;

use crate::models::Role;
use crate::routes::ApiError;
use crate::session::TypedSession;
use crate::storage::Storage;

/// Whether handlers check the caller's role or only that a session exists.
#[derive(Debug, Clone, Copy)]
pub struct RolePolicy {
    pub enforce: bool,
}

/// The caller behind the current session, with the role stored for them.
/// Users without a role row are patients.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub role: Role,
    enforce_roles: bool,
}

impl AuthenticatedUser {
    pub fn new(id: impl Into<String>, role: Role, policy: RolePolicy) -> Self {
        Self {
            id: id.into(),
            role,
            enforce_roles: policy.enforce,
        }
    }

    pub fn require_staff(&self) -> Result<(), ApiError> {
        if !self.enforce_roles || self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Staff access required".into()))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if !self.enforce_roles || self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin access required".into()))
        }
    }

    /// Patients may only touch records that belong to them.
    pub fn require_self_or_staff(&self, owner_id: &str) -> Result<(), ApiError> {
        if !self.enforce_roles || self.role.is_staff() || self.id == owner_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Records of other patients are not accessible".into(),
            ))
        }
    }

    /// The patient filter a listing should actually use. Patients always see
    /// their own records regardless of what they asked for.
    pub fn patient_scope(&self, requested: Option<String>) -> Option<String> {
        if self.enforce_roles && !self.role.is_staff() {
            Some(self.id.clone())
        } else {
            requested
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let session = TypedSession::from_http_request(req);
        let storage = req.app_data::<web::Data<dyn Storage>>().cloned();
        let policy = req
            .app_data::<web::Data<RolePolicy>>()
            .map(|p| ***p)
            .unwrap_or(RolePolicy { enforce: true });

        Box::pin(async move {
            let user_id = session
                .get_user_id()
                .map_err(|e| anyhow::anyhow!("Failed to read the session: {e}"))?
                .ok_or(ApiError::Authentication)?;
            let storage = storage.context("Storage is not registered as app data")?;
            let role = storage
                .get_user_role(user_id.clone())
                .await
                .context("Failed to look up the caller's role")?
                .map(|r| r.role)
                .unwrap_or_default();
            tracing::Span::current().record("user_id", tracing::field::display(&user_id));
            Ok(AuthenticatedUser::new(user_id, role, policy))
        })
    }
}
