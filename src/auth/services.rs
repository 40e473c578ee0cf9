use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    dto::RegisterRequest,
    jwt::JwtKeys,
    password::{burn_verification, hash_password, verify_password},
    repo::UserStore,
    repo_types::{DuplicateUser, User},
};
use crate::error::AppError;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

/// Normalizes and checks a registration payload.
fn validate_registration(mut req: RegisterRequest) -> Result<RegisterRequest, AppError> {
    req.username = req.username.trim().to_string();
    req.email = req.email.trim().to_lowercase();

    let len = req.username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AppError::validation(format!(
            "Username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"
        )));
    }
    if !is_valid_email(&req.email) {
        return Err(AppError::validation("Invalid email"));
    }
    if req.password.chars().count() < PASSWORD_MIN_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {PASSWORD_MIN_LEN} characters"
        )));
    }
    Ok(req)
}

/// Creates a user. Username and email must both be unused.
pub async fn register(users: &dyn UserStore, req: RegisterRequest) -> Result<User, AppError> {
    let req = validate_registration(req)?;

    if users.find_by_username(&req.username).await?.is_some() {
        warn!(username = %req.username, "username already registered");
        return Err(AppError::Conflict(DuplicateUser::Username.to_string()));
    }
    if users.find_by_email(&req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::Conflict(DuplicateUser::Email.to_string()));
    }

    let hash = hash_password(&req.password)?;
    let user = users
        .create(&req.username, &req.email, &hash)
        .await
        .map_err(|e| match e.downcast_ref::<DuplicateUser>() {
            Some(dup) => AppError::Conflict(dup.to_string()),
            None => AppError::Internal(e),
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Looks `identifier` up as a username, then as an email, and checks the
/// password. `None` covers both an unknown identifier and a wrong password.
pub async fn authenticate(
    users: &dyn UserStore,
    identifier: &str,
    password: &str,
) -> anyhow::Result<Option<User>> {
    let identifier = identifier.trim();
    let user = match users.find_by_username(identifier).await? {
        Some(u) => Some(u),
        None => users.find_by_email(&identifier.to_lowercase()).await?,
    };

    let Some(user) = user else {
        burn_verification(password);
        warn!("login with unknown identifier");
        return Ok(None);
    };

    if !verify_password(password, &user.password_hash) {
        warn!(user_id = %user.id, "login with invalid password");
        return Ok(None);
    }
    Ok(Some(user))
}

/// Maps a bearer token to a live user. All failures look the same to the caller.
pub async fn resolve(users: &dyn UserStore, keys: &JwtKeys, token: &str) -> Result<User, AppError> {
    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        AppError::credentials()
    })?;

    match users.find_by_username(&claims.sub).await? {
        Some(user) => Ok(user),
        None => {
            warn!(subject = %claims.sub, "token subject no longer exists");
            Err(AppError::credentials())
        }
    }
}
