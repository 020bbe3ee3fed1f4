use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            LoginRequest, PublicUser, RegisterRequest, ResendVerificationRequest, VerifyQuery,
        },
        jwt::AuthUser,
        services::UserService,
        validators::{validate_login, validate_register},
    },
    envelope::{ApiRejection, Envelope},
    state::AppState,
    validation::{email_field, string_field, ValidationErrors},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify", get(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/me", get(get_me))
}

#[instrument(skip(users, body))]
pub async fn register(
    State(users): State<UserService>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Envelope<()>, ApiRejection> {
    let Json(req) = body?;
    let payload = validate_register(&req)?;
    Ok(users.register(payload).await)
}

#[instrument(skip(users, body))]
pub async fn login(
    State(users): State<UserService>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Envelope<()>, ApiRejection> {
    let Json(req) = body?;
    let payload = validate_login(&req)?;
    Ok(users.login(payload).await)
}

#[instrument(skip(users, query))]
pub async fn verify_email(
    State(users): State<UserService>,
    Query(query): Query<VerifyQuery>,
) -> Result<Envelope<()>, ApiRejection> {
    let mut errors = ValidationErrors::new();
    let token = string_field(&mut errors, "token", query.token.as_deref(), 1, 255);
    let token = errors.finish(token)?.unwrap_or_default();
    Ok(users.verify_email(&token).await)
}

#[instrument(skip(users, body))]
pub async fn resend_verification(
    State(users): State<UserService>,
    body: Result<Json<ResendVerificationRequest>, JsonRejection>,
) -> Result<Envelope<()>, ApiRejection> {
    let Json(req) = body?;
    let mut errors = ValidationErrors::new();
    let email = email_field(&mut errors, "email", req.email.as_deref());
    let email = errors.finish(email)?.unwrap_or_default();
    Ok(users.resend_verification(&email).await)
}

#[instrument(skip(users))]
pub async fn get_me(
    State(users): State<UserService>,
    AuthUser(user_id): AuthUser,
) -> Envelope<PublicUser> {
    users.me(user_id).await
}
