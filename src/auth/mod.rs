mod credentials;
mod user;

pub use credentials::{basic_auth, compute_password_hash, validate_creds, AuthError, Credentials};
pub use user::{AuthenticatedUser, RolePolicy};
