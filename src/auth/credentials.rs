use actix_web::http::header::HeaderMap;
use anyhow::Context;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use base64::Engine;
use secrecy::{ExposeSecret, Secret};

use crate::storage::Storage;
use crate::telemetry::spawn_blocking_with_tracing;

pub struct Credentials {
    pub username: String,
    pub password: Secret<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication failed")]
    InvalidCredentials(#[source] anyhow::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

pub fn basic_auth(headers: &HeaderMap) -> Result<Credentials, AuthError> {
    let auth_header = headers
        .get("Authorization")
        .context("Missing Authorization header")
        .map_err(AuthError::InvalidCredentials)?
        .to_str()
        .context("Failed to parse Authorization header")
        .map_err(AuthError::InvalidCredentials)?;
    let base64 = auth_header
        .strip_prefix("Basic ")
        .context("Invalid Authorization header")
        .map_err(AuthError::InvalidCredentials)?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(base64)
        .context("Failed to decode base64")
        .map_err(AuthError::InvalidCredentials)?;
    let decoded_credentials = String::from_utf8(decoded)
        .context("Invalid UTF-8")
        .map_err(AuthError::InvalidCredentials)?;

    // username:password, the password may itself contain ':'
    let mut creds = decoded_credentials.splitn(2, ':');
    let username = creds
        .next()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AuthError::InvalidCredentials(anyhow::anyhow!("Missing username in Basic Auth")))?
        .to_string();
    let password = creds
        .next()
        .ok_or_else(|| AuthError::InvalidCredentials(anyhow::anyhow!("Missing password in Basic Auth")))?
        .to_string();
    Ok(Credentials {
        username,
        password: Secret::new(password),
    })
}

#[tracing::instrument(name = "Validate credentials", skip(credentials, storage))]
pub async fn validate_creds(
    credentials: Credentials,
    storage: &dyn Storage,
) -> Result<String, AuthError> {
    let mut user_id = None;
    // Unknown users still pay for a full hash check so timing does not leak
    // which emails are registered.
    let mut expected_password_hash = Secret::new(
        "$argon2id$v=19$m=15000,t=2,p=1$\
        gZiV/M1gPc22ElAH/Jh1Hw$\
        CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno"
            .to_string(),
    );

    if let Some((stored_user_id, stored_password_hash)) = storage
        .get_stored_credentials(credentials.username.clone())
        .await
        .context("Failed to query stored credentials")?
    {
        user_id = Some(stored_user_id);
        expected_password_hash = stored_password_hash;
    }

    // Hashing takes long enough to stall the executor.
    spawn_blocking_with_tracing(move || {
        verify_password_hash(expected_password_hash, credentials.password)
    })
    .await
    .context("Failed to spawn a blocking task")??;

    user_id
        .ok_or_else(|| anyhow::anyhow!("Unknown username"))
        .map_err(AuthError::InvalidCredentials)
}

#[tracing::instrument(
    name = "Verify password hash",
    skip(expected_password_hash, password_candidate)
)]
fn verify_password_hash(
    expected_password_hash: Secret<String>,
    password_candidate: Secret<String>,
) -> Result<(), AuthError> {
    let expected_password_hash = PasswordHash::new(expected_password_hash.expose_secret())
        .map_err(|e| anyhow::anyhow!("Failed to parse hash in PHC string format: {e}"))?;

    Argon2::default()
        .verify_password(
            password_candidate.expose_secret().as_bytes(),
            &expected_password_hash,
        )
        .map_err(|e| AuthError::InvalidCredentials(anyhow::anyhow!("Invalid password: {e}")))
}

/// Argon2id PHC string for `password`, with the same cost parameters the
/// fallback hash in `validate_creds` uses.
pub fn compute_password_hash(password: Secret<String>) -> Result<Secret<String>, anyhow::Error> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let params = Params::new(15000, 2, 1, None)
        .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {e}"))?;
    let password_hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?
        .to_string();
    Ok(Secret::new(password_hash))
}
