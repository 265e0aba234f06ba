use tracing::{error, info, warn};

use super::dto::{
    ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest,
    UpdatePasswordRequest,
};
use super::reset::ResetTokens;
use super::validation::{
    check_email, check_name, check_password, check_password_confirm, check_phone,
    check_signup_role, collect, non_blank, normalize_email,
};
use crate::{
    clock::Clock,
    error::AppError,
    mail::Email,
    state::AppState,
    users::repo_types::{NewUser, User},
};

pub async fn signup(state: &AppState, req: SignupRequest) -> Result<(User, String), AppError> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    let phone = non_blank(req.phone);
    let role = check_signup_role(req.role.as_deref());

    collect([
        check_name(&name),
        check_email(&email),
        check_phone(phone.as_deref()),
        check_password(&req.password),
        check_password_confirm(&req.password, &req.password_confirm),
        role.clone().map(|_| ()),
    ])?;
    let role = role.unwrap_or_default();

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::DuplicateEmail);
    }

    let password_hash = state.hasher.hash_async(req.password).await?;
    let user = state
        .users
        .create(NewUser {
            name,
            email,
            phone,
            role,
            password_hash,
        })
        .await?;

    let token = state.jwt.issue(user.id)?;
    info!(user_id = %user.id, email = %user.email, role = %user.role, "user signed up");
    Ok((user, token))
}

/// Unknown email and wrong password produce the same error after the same
/// amount of hashing work.
pub async fn login(state: &AppState, req: LoginRequest) -> Result<(User, String), AppError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "Please provide email and password".into(),
        ));
    }

    let found = state.users.find_with_password_by_email(&email).await?;
    let digest = match &found {
        Some(u) => u.password_hash.clone(),
        None => state.hasher.decoy_hash(),
    };
    let matches = state.hasher.verify_async(req.password, digest).await?;

    let user = match found {
        Some(u) if matches => u.user,
        Some(u) => {
            warn!(email = %email, user_id = %u.user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }
        None => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    let token = state.jwt.issue(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, token))
}

pub async fn forgot_password(state: &AppState, req: ForgotPasswordRequest) -> Result<(), AppError> {
    let email = normalize_email(&req.email);
    collect([check_email(&email)])?;

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or(AppError::UserNotFound)?;

    let token = state.resets.generate(state.clock.now());
    state
        .users
        .set_reset_token(user.id, Some(token.pending.clone()))
        .await?;

    let reset_url = format!(
        "{}/api/v1/resetPassword/{}",
        state.config.public_url, token.raw
    );
    let message = Email {
        to: user.email.clone(),
        subject: format!(
            "Your password reset token (valid for {} min)",
            state.config.reset.ttl_minutes
        ),
        body: format!(
            "Forgot your password? Submit a PATCH request with your new password and \
             passwordConfirm to: {reset_url}\n\
             If you didn't forget your password, please ignore this email!"
        ),
    };

    if let Err(e) = state.mailer.send(message).await {
        error!(error = %e, user_id = %user.id, "password reset email failed");
        // The user never received the token, so it must not stay redeemable.
        if let Err(e) = state.users.set_reset_token(user.id, None).await {
            error!(error = %e, user_id = %user.id, "clearing reset token failed");
        }
        return Err(AppError::EmailDeliveryFailed);
    }

    info!(user_id = %user.id, "password reset token sent");
    Ok(())
}

pub async fn reset_password(
    state: &AppState,
    raw_token: &str,
    req: ResetPasswordRequest,
) -> Result<(User, String), AppError> {
    let token_hash = ResetTokens::digest(raw_token);
    let user = state
        .users
        .find_by_reset_token(&token_hash)
        .await?
        .ok_or(AppError::InvalidOrExpiredToken)?;

    let valid = match (&user.password_reset_token, user.password_reset_expires) {
        (Some(hash), Some(expires)) => {
            ResetTokens::verify(raw_token, hash, expires, state.clock.now())
        }
        _ => false,
    };
    if !valid {
        warn!(user_id = %user.id, "expired password reset token presented");
        state.users.set_reset_token(user.id, None).await?;
        return Err(AppError::InvalidOrExpiredToken);
    }

    collect([
        check_password(&req.password),
        check_password_confirm(&req.password, &req.password_confirm),
    ])?;

    let password_hash = state.hasher.hash_async(req.password).await?;
    // Concurrent redemptions race here; only one finds the token still set.
    let now = state.clock.now();
    let user = state
        .users
        .redeem_reset_token(&token_hash, now, &password_hash, now)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %user.id, "password reset token redeemed concurrently or expired");
            AppError::InvalidOrExpiredToken
        })?;

    let token = state.jwt.issue(user.id)?;
    info!(user_id = %user.id, "password reset completed");
    Ok((user, token))
}

pub async fn update_password(
    state: &AppState,
    user: &User,
    req: UpdatePasswordRequest,
) -> Result<(User, String), AppError> {
    let current = state
        .users
        .find_with_password_by_id(user.id)
        .await?
        .ok_or(AppError::SessionUserGone)?;

    let matches = state
        .hasher
        .verify_async(req.password_current, current.password_hash)
        .await?;
    if !matches {
        warn!(user_id = %user.id, "update password with wrong current password");
        return Err(AppError::WrongCurrentPassword);
    }

    collect([
        check_password(&req.password),
        check_password_confirm(&req.password, &req.password_confirm),
    ])?;

    let password_hash = state.hasher.hash_async(req.password).await?;
    let now = state.clock.now();
    let user = state
        .users
        .set_password(user.id, &password_hash, now)
        .await?;

    let token = state.jwt.issue(user.id)?;
    info!(user_id = %user.id, "password updated");
    Ok((user, token))
}
