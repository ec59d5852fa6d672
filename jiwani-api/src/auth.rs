use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use jiwani_core::identity::{
    generate_token, hash_password, validate_email, validate_name, validate_password, validate_username,
    verify_password,
};
use jiwani_core::member::{Member, MemberToken, NewMember, Role, TokenPurpose};
use jiwani_core::CoreError;
use jiwani_shared::Masked;

use crate::error::AppError;
use crate::mailer::OutgoingMail;
use crate::middleware::issue_token;
use crate::state::AppState;

const VERIFY_TOKEN_HOURS: i64 = 24;
const RESET_TOKEN_HOURS: i64 = 1;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: Masked<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email or username.
    pub identifier: String,
    pub password: Masked<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub member: Member,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetConfirmRequest {
    pub token: String,
    pub password: Masked<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify", get(verify_email))
        .route("/auth/login", post(login))
        .route("/auth/password-reset", post(request_password_reset))
        .route("/auth/password-reset/confirm", post(reset_password))
}

async fn hash_blocking(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AppError::InternalServerError(format!("hashing task failed: {}", e)))?
        .map_err(AppError::from)
}

async fn issue_mailed_token(
    state: &AppState,
    member: &Member,
    purpose: TokenPurpose,
    hours: i64,
) -> Result<(), AppError> {
    let token = MemberToken {
        token: generate_token(),
        member_id: member.id,
        purpose,
        expires_at: Utc::now() + Duration::hours(hours),
    };
    state.member_repo.issue_token(&token).await?;

    let mail = match purpose {
        TokenPurpose::VerifyEmail => OutgoingMail {
            to: member.email.clone(),
            subject: "Verify your email".to_string(),
            body: format!(
                "Hi {},\n\nConfirm your email within {} hours:\n{}/api/auth/verify?token={}\n",
                member.name, hours, state.public_url, token.token
            ),
        },
        TokenPurpose::ResetPassword => OutgoingMail {
            to: member.email.clone(),
            subject: "Reset your password".to_string(),
            body: format!(
                "Hi {},\n\nUse this token within {} hour(s) to choose a new password:\n{}\n",
                member.name, hours, token.token
            ),
        },
    };

    // Delivery failures are logged; the token stays valid for a retry
    if let Err(e) = state.mailer.send(mail).await {
        tracing::error!("Failed to send {} mail to member {}: {}", purpose.as_str(), member.id, e);
    }
    Ok(())
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Member>), AppError> {
    let email = req.email.trim().to_lowercase();
    validate_name(&req.name)?;
    validate_username(&req.username)?;
    validate_email(&email)?;
    validate_password(req.password.expose())?;

    let password_hash = hash_blocking(req.password.into_inner(), state.auth.bcrypt_cost).await?;

    let member = state
        .member_repo
        .create_member(&NewMember {
            name: req.name.trim().to_string(),
            username: req.username,
            email,
            password_hash,
            role: Role::Member,
        })
        .await?;

    tracing::info!("Registered member {}", member.id);
    issue_mailed_token(&state, &member, TokenPurpose::VerifyEmail, VERIFY_TOKEN_HOURS).await?;

    Ok((StatusCode::CREATED, Json(member)))
}

/// GET /api/auth/verify?token=
async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let member_id = state
        .member_repo
        .consume_token(&query.token, TokenPurpose::VerifyEmail, Utc::now())
        .await?
        .ok_or_else(|| AppError::ValidationError("invalid or expired token".to_string()))?;

    state.member_repo.set_email_verified(member_id).await?;
    tracing::info!("Member {} verified their email", member_id);

    Ok(Json(serde_json::json!({ "verified": true })))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let invalid = || AppError::AuthenticationError("invalid credentials".to_string());

    let member = state.member_repo.find_by_login(req.identifier.trim()).await?.ok_or_else(invalid)?;

    let hash = member.password_hash.clone();
    let password = req.password.into_inner();
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::InternalServerError(format!("verify task failed: {}", e)))?;
    if !matches {
        return Err(invalid());
    }

    if !member.email_verified {
        return Err(AppError::AuthorizationError("email address not verified".to_string()));
    }

    let token = issue_token(&state.auth, &member)?;
    Ok(Json(LoginResponse { token, member }))
}

/// POST /api/auth/password-reset
/// Always accepted so callers cannot probe for registered addresses.
async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Result<StatusCode, AppError> {
    let email = req.email.trim().to_lowercase();
    match state.member_repo.find_by_login(&email).await? {
        Some(member) if member.email == email => {
            issue_mailed_token(&state, &member, TokenPurpose::ResetPassword, RESET_TOKEN_HOURS).await?;
        }
        _ => tracing::debug!("Password reset requested for unknown address"),
    }
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/auth/password-reset/confirm
async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetConfirmRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_password(req.password.expose())?;

    // Hash before touching the token so a hashing failure leaves it usable
    let password_hash = hash_blocking(req.password.into_inner(), state.auth.bcrypt_cost).await?;

    let member_id = state
        .member_repo
        .reset_password(&req.token, &password_hash, Utc::now())
        .await?
        .ok_or_else(|| CoreError::validation("invalid or expired token"))?;

    tracing::info!("Member {} reset their password", member_id);

    Ok(Json(serde_json::json!({ "reset": true })))
}
