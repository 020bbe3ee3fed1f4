use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{LoginPayload, PublicUser, RegisterPayload},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo_types::{NewUser, User},
    },
    db::{with_transaction, Store},
    envelope::Envelope,
    error::ServiceError,
    mail::Notifier,
    state::AppState,
};

const RESEND_MESSAGE: &str =
    "If the account exists and is not verified yet, a new verification email has been sent";

/// Registration, email verification and login.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
    keys: Arc<JwtKeys>,
    notifier: Arc<Notifier>,
}

impl FromRef<AppState> for UserService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone(), state.keys.clone(), state.notifier.clone())
    }
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, keys: Arc<JwtKeys>, notifier: Arc<Notifier>) -> Self {
        Self {
            store,
            keys,
            notifier,
        }
    }

    #[cfg(test)]
    pub fn shares_handles_with(&self, state: &AppState) -> bool {
        Arc::ptr_eq(&self.keys, &state.keys) && Arc::ptr_eq(&self.notifier, &state.notifier)
    }

    #[instrument(skip(self, payload), fields(email = %payload.email))]
    pub async fn register(&self, payload: RegisterPayload) -> Envelope<()> {
        let user = match self.try_register(payload).await {
            Ok(user) => user,
            Err(e) => return e.into_envelope("Registration failed"),
        };
        info!(user_id = user.id, "user registered");

        // The row is committed at this point; delivery problems are reported
        // but never undo the registration.
        if let Some(token) = user.verification_token.as_deref() {
            self.send_verification(&user.email, token).await;
        }
        Envelope::done("User registered successfully. Please verify your email.")
    }

    async fn try_register(&self, payload: RegisterPayload) -> Result<User, ServiceError> {
        let password_hash = hash_password(payload.password).await?;
        let new_user = NewUser {
            username: payload.username,
            email: payload.email,
            password_hash,
            verification_token: Uuid::new_v4().to_string(),
        };
        with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move { Ok::<_, ServiceError>(tx.insert_user(new_user).await?) })
        })
        .await
    }

    #[instrument(skip(self, token))]
    pub async fn verify_email(&self, token: &str) -> Envelope<()> {
        let token = token.to_string();
        let verified = with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let user = tx
                    .find_user_by_token(&token)
                    .await?
                    .ok_or(ServiceError::Rejected("Invalid or expired token"))?;
                Ok::<_, ServiceError>(tx.mark_verified(user.id).await?)
            })
        })
        .await;

        match verified {
            Ok(user) => {
                info!(user_id = user.id, "email verified");
                Envelope::done("Email verified successfully")
            }
            Err(e) => e.into_envelope("Email verification failed"),
        }
    }

    /// Issues a fresh token to an unverified account and mails it again.
    #[instrument(skip(self))]
    pub async fn resend_verification(&self, email: &str) -> Envelope<()> {
        let email = email.to_string();
        let token = Uuid::new_v4().to_string();
        let target = with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                match tx.find_user_by_email(&email).await? {
                    Some(user) if !user.is_verified => {
                        tx.set_verification_token(user.id, &token).await?;
                        Ok::<_, ServiceError>(Some((user.email, token)))
                    }
                    _ => Ok::<_, ServiceError>(None),
                }
            })
        })
        .await;

        match target {
            Ok(Some((email, token))) => {
                self.send_verification(&email, &token).await;
                Envelope::done(RESEND_MESSAGE)
            }
            Ok(None) => Envelope::done(RESEND_MESSAGE),
            Err(e) => e.into_envelope("Failed to resend verification email"),
        }
    }

    #[instrument(skip(self, payload), fields(email = %payload.email))]
    pub async fn login(&self, payload: LoginPayload) -> Envelope<()> {
        match self.try_login(payload).await {
            Ok((user_id, token)) => {
                info!(user_id, "user logged in");
                Envelope::done("Login successful").with_token(token)
            }
            Err(e) => e.into_envelope("Login failed"),
        }
    }

    async fn try_login(
        &self,
        payload: LoginPayload,
    ) -> Result<(i64, crate::auth::dto::IssuedToken), ServiceError> {
        let user = self
            .store
            .find_user_by_email(&payload.email)
            .await?
            .ok_or(ServiceError::Rejected("Invalid credentials"))?;

        if !user.is_verified {
            return Err(ServiceError::Rejected(
                "Please verify your email before logging in",
            ));
        }

        if !verify_password(payload.password, user.password.clone()).await? {
            return Err(ServiceError::Rejected("Invalid credentials"));
        }

        let token = self.keys.sign(user.id)?;
        Ok((user.id, token))
    }

    pub async fn me(&self, user_id: i64) -> Envelope<PublicUser> {
        match self.store.find_user_by_id(user_id).await {
            Ok(Some(user)) => Envelope::ok("User fetched successfully", user.into()),
            Ok(None) => ServiceError::NotFound("User not found").into_envelope(""),
            Err(e) => ServiceError::from(e).into_envelope("Failed to fetch user"),
        }
    }

    async fn send_verification(&self, to: &str, token: &str) {
        let email = self.notifier.verification_email(to, token);
        if let Err(e) = self.notifier.deliver(&email).await {
            warn!(error = %e, to, "verification email not delivered");
        }
    }
}
