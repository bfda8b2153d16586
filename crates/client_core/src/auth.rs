//! Sign-in, sign-up, password reset and sign-out against the third-party
//! identity provider and the storefront account API.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::Session,
    protocol::{CreateUserResponse, NewUser, UserRecord},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    account_store::AccountStore,
    forms::{validate_registration, RegistrationForm, ValidationError},
    session_gate::{resume_path, ReturnTo},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUser {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
}

/// Error reported by the identity provider, e.g. `auth/wrong-password`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFailure {
    pub code: String,
    pub message: String,
}

impl IdentityFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<IdentityUser, IdentityFailure>;
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityUser, IdentityFailure>;
    async fn send_email_verification(&self, user: &IdentityUser) -> Result<(), IdentityFailure>;
    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityFailure>;
}

/// Account endpoints of the storefront API used by the auth flows.
#[async_trait]
pub trait AccountApi: Send + Sync {
    async fn create_jwt(&self, email: &str) -> Result<Option<String>>;
    async fn get_user(&self, email: &str) -> Result<Option<UserRecord>>;
    async fn create_user(&self, user: &NewUser) -> Result<CreateUserResponse>;
    async fn logout(&self) -> Result<()>;
}

/// Looks up the session of whoever holds the current API token.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>>;
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials. Please check your email and password.")]
    InvalidCredentials,
    #[error("User not found. Please sign up.")]
    UserNotFound,
    #[error("Please verify your email to proceed.")]
    EmailNotVerified,
    #[error("Error sending verification email.")]
    VerificationEmailFailed,
    #[error("The email address {0} is already registered.")]
    EmailAlreadyInUse(String),
    #[error("Registration failed: {0}")]
    Rejected(String),
    #[error("JWT token generation failed.")]
    TokenUnavailable,
    #[error("User not found.")]
    AccountRecordMissing,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Login error: {0:#}")]
    Api(anyhow::Error),
}

impl AuthError {
    /// Errors the customer can fix by editing what they typed.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::UserNotFound
                | Self::EmailAlreadyInUse(_)
                | Self::Validation(_)
        )
    }
}

pub fn classify_identity_failure(failure: &IdentityFailure, email: &str) -> AuthError {
    match failure.code.as_str() {
        "auth/wrong-password" | "auth/invalid-credential" | "auth/invalid-password" => {
            AuthError::InvalidCredentials
        }
        "auth/user-not-found" => AuthError::UserNotFound,
        "auth/email-already-in-use" => AuthError::EmailAlreadyInUse(email.to_string()),
        _ => AuthError::Rejected(
            failure
                .message
                .trim_start_matches("Firebase: ")
                .trim()
                .to_string(),
        ),
    }
}

pub struct AuthFlow<I, A> {
    identity: I,
    api: A,
    session_ttl: Option<chrono::Duration>,
}

impl<I, A> AuthFlow<I, A>
where
    I: IdentityProvider,
    A: AccountApi,
{
    pub fn new(identity: I, api: A) -> Self {
        Self {
            identity,
            api,
            session_ttl: None,
        }
    }

    /// Sessions stored by this flow expire after `ttl`.
    pub fn with_session_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    /// Signs in and returns the path to navigate to next.
    pub async fn sign_in(
        &self,
        store: &mut AccountStore,
        email: &str,
        password: &str,
        memo: Option<ReturnTo>,
    ) -> Result<String, AuthError> {
        let email = email.trim();
        let user = self
            .identity
            .sign_in(email, password)
            .await
            .map_err(|failure| classify_identity_failure(&failure, email))?;

        if !user.email_verified {
            return match self.identity.send_email_verification(&user).await {
                Ok(()) => Err(AuthError::EmailNotVerified),
                Err(failure) => {
                    warn!(code = %failure.code, "verification email failed");
                    Err(AuthError::VerificationEmailFailed)
                }
            };
        }

        self.establish_session(store, &user.email).await?;
        info!(email = %user.email, "signed in");
        Ok(resume_path(memo))
    }

    pub async fn sign_up(
        &self,
        store: &mut AccountStore,
        form: &RegistrationForm,
        memo: Option<ReturnTo>,
    ) -> Result<String, AuthError> {
        validate_registration(form)?;
        let email = form.email.trim();

        let user = self
            .identity
            .create_account(email, &form.password)
            .await
            .map_err(|failure| classify_identity_failure(&failure, email))?;

        self.issue_token(&user.email).await?;
        let created = self
            .api
            .create_user(&NewUser {
                first_name: form.first_name.trim().to_string(),
                last_name: form.last_name.trim().to_string(),
                email: user.email.clone(),
                uid: user.uid.clone(),
            })
            .await
            .map_err(AuthError::Api)?;
        if !created.is_created() {
            return Err(AuthError::Rejected(
                "account record was not created".to_string(),
            ));
        }

        // The record carries the review status the server assigned.
        self.load_session(store, &user.email).await?;
        info!(email = %user.email, "account created");
        Ok(resume_path(memo))
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        self.identity
            .send_password_reset(email)
            .await
            .map_err(|failure| classify_identity_failure(&failure, email))
    }

    /// Clears the local session even when the API logout call fails.
    pub async fn sign_out(&self, store: &mut AccountStore) -> Result<(), AuthError> {
        let result = self.api.logout().await;
        store.sign_out();
        result.map_err(AuthError::Api)
    }

    async fn establish_session(&self, store: &mut AccountStore, email: &str) -> Result<(), AuthError> {
        self.issue_token(email).await?;
        self.load_session(store, email).await
    }

    async fn issue_token(&self, email: &str) -> Result<(), AuthError> {
        match self.api.create_jwt(email).await.map_err(AuthError::Api)? {
            Some(_) => Ok(()),
            None => Err(AuthError::TokenUnavailable),
        }
    }

    async fn load_session(&self, store: &mut AccountStore, email: &str) -> Result<(), AuthError> {
        let record = self
            .api
            .get_user(email)
            .await
            .map_err(AuthError::Api)?
            .ok_or(AuthError::AccountRecordMissing)?;

        let mut session = record.into_session();
        session.expires_at = self.session_ttl.map(|ttl| Utc::now() + ttl);
        store.sign_in(session);
        Ok(())
    }
}

/// Populates the store from the session source on startup. Later reads go
/// through the store.
pub async fn restore_session<S>(source: &S, store: &mut AccountStore) -> Result<bool>
where
    S: SessionSource + ?Sized,
{
    match source.current_session().await? {
        Some(session) => {
            store.sign_in(session);
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
