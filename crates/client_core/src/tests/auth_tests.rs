use super::*;

use std::sync::Mutex;

use anyhow::anyhow;
use shared::domain::{AccountStatus, UserId};

use crate::session_gate::{HOME_PATH, PENDING_PATH};

#[derive(Default)]
struct FakeIdentity {
    sign_in_result: Option<Result<IdentityUser, IdentityFailure>>,
    verification_fails: bool,
    verification_sent: Mutex<u32>,
    reset_requests: Mutex<Vec<String>>,
}

impl FakeIdentity {
    fn verified(email: &str) -> Self {
        Self {
            sign_in_result: Some(Ok(IdentityUser {
                uid: "uid-1".to_string(),
                email: email.to_string(),
                email_verified: true,
            })),
            ..Self::default()
        }
    }

    fn failing(code: &str) -> Self {
        Self {
            sign_in_result: Some(Err(IdentityFailure::new(code, "Firebase: nope"))),
            ..Self::default()
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in(&self, _email: &str, _password: &str) -> Result<IdentityUser, IdentityFailure> {
        self.sign_in_result
            .clone()
            .unwrap_or_else(|| Err(IdentityFailure::new("auth/internal-error", "unset")))
    }

    async fn create_account(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<IdentityUser, IdentityFailure> {
        if email == "taken@example.com" {
            return Err(IdentityFailure::new(
                "auth/email-already-in-use",
                "Firebase: Error (auth/email-already-in-use).",
            ));
        }
        Ok(IdentityUser {
            uid: "uid-new".to_string(),
            email: email.to_string(),
            email_verified: false,
        })
    }

    async fn send_email_verification(&self, _user: &IdentityUser) -> Result<(), IdentityFailure> {
        *self.verification_sent.lock().expect("lock") += 1;
        if self.verification_fails {
            Err(IdentityFailure::new("auth/too-many-requests", "slow down"))
        } else {
            Ok(())
        }
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityFailure> {
        if email == "ghost@example.com" {
            return Err(IdentityFailure::new("auth/user-not-found", "no user"));
        }
        self.reset_requests
            .lock()
            .expect("lock")
            .push(email.to_string());
        Ok(())
    }
}

struct FakeAccounts {
    token: Option<String>,
    record_status: Option<AccountStatus>,
    has_record: bool,
    logout_fails: bool,
    created: Mutex<Vec<NewUser>>,
}

impl Default for FakeAccounts {
    fn default() -> Self {
        Self {
            token: Some("jwt-1".to_string()),
            record_status: Some(AccountStatus::Active),
            has_record: true,
            logout_fails: false,
            created: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AccountApi for FakeAccounts {
    async fn create_jwt(&self, _email: &str) -> Result<Option<String>> {
        Ok(self.token.clone())
    }

    async fn get_user(&self, email: &str) -> Result<Option<UserRecord>> {
        if !self.has_record {
            return Ok(None);
        }
        Ok(Some(UserRecord {
            id: UserId::from("user-1"),
            email: email.to_string(),
            status: self.record_status.clone(),
            first_name: "Nadia".to_string(),
            last_name: "Rahman".to_string(),
            photo: None,
            phone_number: None,
            uid: Some("uid-1".to_string()),
        }))
    }

    async fn create_user(&self, user: &NewUser) -> Result<CreateUserResponse> {
        self.created.lock().expect("lock").push(user.clone());
        Ok(CreateUserResponse {
            acknowledged: true,
            inserted_id: Some(UserId::from("user-1")),
            success: true,
        })
    }

    async fn logout(&self) -> Result<()> {
        if self.logout_fails {
            Err(anyhow!("connection reset"))
        } else {
            Ok(())
        }
    }
}

struct FixedSession(Option<Session>);

#[async_trait]
impl SessionSource for FixedSession {
    async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.0.clone())
    }
}

fn registration(email: &str) -> RegistrationForm {
    RegistrationForm {
        first_name: "Nadia".to_string(),
        last_name: "Rahman".to_string(),
        email: email.to_string(),
        password: "fresh@123".to_string(),
        agree_to_terms: true,
    }
}

#[test]
fn identity_failures_map_to_customer_messages() {
    let wrong = IdentityFailure::new("auth/wrong-password", "x");
    assert!(matches!(
        classify_identity_failure(&wrong, "a@b.co"),
        AuthError::InvalidCredentials
    ));

    let taken = IdentityFailure::new("auth/email-already-in-use", "x");
    assert_eq!(
        classify_identity_failure(&taken, "a@b.co").to_string(),
        "The email address a@b.co is already registered."
    );

    let other = IdentityFailure::new("auth/network-request-failed", "Firebase: network down");
    let err = classify_identity_failure(&other, "a@b.co");
    assert_eq!(err.to_string(), "Registration failed: network down");
    assert!(!err.is_user_correctable());
}

#[tokio::test]
async fn sign_in_stores_session_and_resumes_memo() {
    let flow = AuthFlow::new(FakeIdentity::verified("nadia@example.com"), FakeAccounts::default());
    let mut store = AccountStore::new();

    let next = flow
        .sign_in(
            &mut store,
            " nadia@example.com ",
            "fresh@123",
            Some(ReturnTo::new("/dashboard/orders")),
        )
        .await
        .expect("sign in");

    assert_eq!(next, "/dashboard/orders");
    let session = store.peek_session().expect("session stored");
    assert_eq!(session.status, AccountStatus::Active);
    assert_eq!(session.expires_at, None);
}

#[tokio::test]
async fn sign_in_without_memo_goes_home() {
    let flow = AuthFlow::new(FakeIdentity::verified("nadia@example.com"), FakeAccounts::default());
    let mut store = AccountStore::new();
    let next = flow
        .sign_in(&mut store, "nadia@example.com", "fresh@123", None)
        .await
        .expect("sign in");
    assert_eq!(next, HOME_PATH);
}

#[tokio::test]
async fn unverified_email_sends_verification_and_stores_nothing() {
    let mut identity = FakeIdentity::verified("nadia@example.com");
    if let Some(Ok(user)) = identity.sign_in_result.as_mut() {
        user.email_verified = false;
    }
    let flow = AuthFlow::new(identity, FakeAccounts::default());
    let mut store = AccountStore::new();

    let err = flow
        .sign_in(&mut store, "nadia@example.com", "fresh@123", None)
        .await
        .expect_err("unverified");

    assert!(matches!(err, AuthError::EmailNotVerified));
    assert_eq!(*flow.identity.verification_sent.lock().expect("lock"), 1);
    assert!(store.peek_session().is_none());
}

#[tokio::test]
async fn failed_verification_email_is_reported() {
    let mut identity = FakeIdentity::verified("nadia@example.com");
    identity.verification_fails = true;
    if let Some(Ok(user)) = identity.sign_in_result.as_mut() {
        user.email_verified = false;
    }
    let flow = AuthFlow::new(identity, FakeAccounts::default());
    let err = flow
        .sign_in(&mut AccountStore::new(), "nadia@example.com", "x", None)
        .await
        .expect_err("verification failed");
    assert!(matches!(err, AuthError::VerificationEmailFailed));
}

#[tokio::test]
async fn wrong_password_is_user_correctable() {
    let flow = AuthFlow::new(FakeIdentity::failing("auth/wrong-password"), FakeAccounts::default());
    let err = flow
        .sign_in(&mut AccountStore::new(), "nadia@example.com", "bad", None)
        .await
        .expect_err("rejected");
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert!(err.is_user_correctable());
}

#[tokio::test]
async fn missing_token_or_record_fails_sign_in() {
    let accounts = FakeAccounts {
        token: None,
        ..FakeAccounts::default()
    };
    let flow = AuthFlow::new(FakeIdentity::verified("nadia@example.com"), accounts);
    let err = flow
        .sign_in(&mut AccountStore::new(), "nadia@example.com", "x", None)
        .await
        .expect_err("no token");
    assert!(matches!(err, AuthError::TokenUnavailable));

    let accounts = FakeAccounts {
        has_record: false,
        ..FakeAccounts::default()
    };
    let flow = AuthFlow::new(FakeIdentity::verified("nadia@example.com"), accounts);
    let mut store = AccountStore::new();
    let err = flow
        .sign_in(&mut store, "nadia@example.com", "x", None)
        .await
        .expect_err("no record");
    assert!(matches!(err, AuthError::AccountRecordMissing));
    assert!(store.peek_session().is_none());
}

#[tokio::test]
async fn session_ttl_sets_expiry() {
    let flow = AuthFlow::new(FakeIdentity::verified("nadia@example.com"), FakeAccounts::default())
        .with_session_ttl(chrono::Duration::hours(1));
    let mut store = AccountStore::new();
    flow.sign_in(&mut store, "nadia@example.com", "x", None)
        .await
        .expect("sign in");

    let expires_at = store
        .peek_session()
        .and_then(|session| session.expires_at)
        .expect("expiry set");
    assert!(expires_at > Utc::now());
    assert!(store.session(expires_at).is_none(), "expired at the boundary");
}

#[tokio::test]
async fn sign_up_creates_record_and_uses_server_status() {
    let accounts = FakeAccounts {
        record_status: Some(AccountStatus::Pending),
        ..FakeAccounts::default()
    };
    let flow = AuthFlow::new(FakeIdentity::default(), accounts);
    let mut store = AccountStore::new();

    flow.sign_up(&mut store, &registration("new@example.com"), None)
        .await
        .expect("sign up");

    let created = flow.api.created.lock().expect("lock");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].uid, "uid-new");
    assert_eq!(created[0].first_name, "Nadia");

    let session = store.peek_session().expect("session");
    assert_eq!(session.status, AccountStatus::Pending);
    assert_eq!(
        crate::session_gate::decide(Some(session), "/"),
        crate::session_gate::GateDecision::Redirect {
            destination: crate::session_gate::Destination::Pending,
            memo: None,
        }
    );
    assert_eq!(crate::session_gate::Destination::Pending.path(), PENDING_PATH);
}

#[tokio::test]
async fn sign_up_rejects_invalid_form_before_calling_provider() {
    let flow = AuthFlow::new(FakeIdentity::default(), FakeAccounts::default());
    let mut form = registration("new@example.com");
    form.password = "weak".to_string();

    let err = flow
        .sign_up(&mut AccountStore::new(), &form, None)
        .await
        .expect_err("invalid");
    assert!(matches!(err, AuthError::Validation(_)));
    assert!(flow.api.created.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn sign_up_with_taken_email() {
    let flow = AuthFlow::new(FakeIdentity::default(), FakeAccounts::default());
    let err = flow
        .sign_up(&mut AccountStore::new(), &registration("taken@example.com"), None)
        .await
        .expect_err("taken");
    assert!(matches!(err, AuthError::EmailAlreadyInUse(ref email) if email == "taken@example.com"));
}

#[tokio::test]
async fn reset_password_trims_and_classifies() {
    let flow = AuthFlow::new(FakeIdentity::default(), FakeAccounts::default());
    flow.reset_password("  nadia@example.com ")
        .await
        .expect("reset sent");
    assert_eq!(
        flow.identity.reset_requests.lock().expect("lock").as_slice(),
        ["nadia@example.com".to_string()]
    );

    let err = flow
        .reset_password("ghost@example.com")
        .await
        .expect_err("unknown user");
    assert!(matches!(err, AuthError::UserNotFound));
}

#[tokio::test]
async fn sign_out_clears_store_even_when_api_fails() {
    let accounts = FakeAccounts {
        logout_fails: true,
        ..FakeAccounts::default()
    };
    let flow = AuthFlow::new(FakeIdentity::verified("nadia@example.com"), accounts);
    let mut store = AccountStore::new();
    flow.sign_in(&mut store, "nadia@example.com", "x", None)
        .await
        .expect("sign in");

    let err = flow.sign_out(&mut store).await.expect_err("api failed");
    assert!(matches!(err, AuthError::Api(_)));
    assert!(store.peek_session().is_none());
}

#[tokio::test]
async fn restore_session_populates_store() {
    let mut store = AccountStore::new();
    assert!(!restore_session(&FixedSession(None), &mut store)
        .await
        .expect("restore"));
    assert!(store.peek_session().is_none());

    let record = UserRecord {
        id: UserId::from("user-9"),
        email: "blocked@example.com".to_string(),
        status: Some(AccountStatus::Blocked),
        first_name: String::new(),
        last_name: String::new(),
        photo: None,
        phone_number: None,
        uid: None,
    };
    let source = FixedSession(Some(record.into_session()));
    assert!(restore_session(&source, &mut store).await.expect("restore"));
    assert_eq!(
        store.peek_session().map(|session| &session.status),
        Some(&AccountStatus::Blocked)
    );
}
