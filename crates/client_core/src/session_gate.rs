//! Account-status gate for protected views.
//!
//! [`decide`] is a pure function of the cached session and the location being
//! visited; [`guard`] applies the decision through a [`Navigator`].

use shared::domain::{AccountStatus, Session};
use tracing::debug;

pub const HOME_PATH: &str = "/";
pub const SIGN_IN_PATH: &str = "/sign-in";
pub const PENDING_PATH: &str = "/pending";
pub const BLOCKED_PATH: &str = "/blocked";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    SignIn,
    Pending,
    Blocked,
}

impl Destination {
    pub fn path(self) -> &'static str {
        match self {
            Self::SignIn => SIGN_IN_PATH,
            Self::Pending => PENDING_PATH,
            Self::Blocked => BLOCKED_PATH,
        }
    }
}

/// Location to resume after a successful sign-in.
///
/// Not `Clone`: the memo is handed to the sign-in view once and consumed by
/// [`ReturnTo::into_path`] or [`resume_path`].
#[derive(Debug, PartialEq, Eq)]
pub struct ReturnTo(String);

impl ReturnTo {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    pub fn into_path(self) -> String {
        self.0
    }
}

/// Where to go once sign-in completes.
pub fn resume_path(memo: Option<ReturnTo>) -> String {
    memo.map(ReturnTo::into_path)
        .unwrap_or_else(|| HOME_PATH.to_string())
}

#[derive(Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Redirect {
        destination: Destination,
        memo: Option<ReturnTo>,
    },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

pub fn decide(session: Option<&Session>, current_location: &str) -> GateDecision {
    let Some(session) = session.filter(|session| !session.id.is_blank()) else {
        return sign_in(current_location);
    };

    match &session.status {
        AccountStatus::Pending => GateDecision::Redirect {
            destination: Destination::Pending,
            memo: None,
        },
        AccountStatus::Blocked => GateDecision::Redirect {
            destination: Destination::Blocked,
            memo: None,
        },
        AccountStatus::Active => GateDecision::Allow,
        AccountStatus::Unrecognized(raw) => {
            debug!(status = %raw, user_id = %session.id, "unrecognized account status; failing closed");
            sign_in(current_location)
        }
    }
}

fn sign_in(current_location: &str) -> GateDecision {
    let location = current_location.trim();
    // Never remember the sign-in page itself, or sign-in would loop back to it.
    let memo = (!location.is_empty() && location != SIGN_IN_PATH).then(|| ReturnTo::new(location));
    GateDecision::Redirect {
        destination: Destination::SignIn,
        memo,
    }
}

pub trait Navigator {
    fn redirect(&mut self, path: &str, memo: Option<ReturnTo>);
}

/// Evaluates the gate and performs the redirect. Returns `true` when the
/// protected view may render.
pub fn guard<N: Navigator + ?Sized>(
    session: Option<&Session>,
    current_location: &str,
    navigator: &mut N,
) -> bool {
    match decide(session, current_location) {
        GateDecision::Allow => true,
        GateDecision::Redirect { destination, memo } => {
            debug!(
                from = current_location,
                to = destination.path(),
                "gate redirect"
            );
            navigator.redirect(destination.path(), memo);
            false
        }
    }
}

#[cfg(test)]
#[path = "tests/session_gate_tests.rs"]
mod tests;
