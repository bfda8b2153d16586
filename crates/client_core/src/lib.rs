//! Client core of the storefront: the session gate that protects
//! account-only views, the debounced search coordinator behind the header and
//! dashboard search boxes, and the account, form and API plumbing they run on.

pub mod account_store;
pub mod api;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod forms;
pub mod search;
pub mod session_gate;

pub use account_store::{AccountStore, BadgeCounts};
pub use api::{OrderSearch, ProductSearch, StorefrontApi};
pub use auth::{AuthError, AuthFlow, IdentityProvider};
pub use config::{load_settings, Settings};
pub use coordinator::{ResultsPanel, SearchCoordinator, SearchHandle, SearchInput};
pub use search::{LookupError, PanelStatus, QueryMachine, SearchBackend};
pub use session_gate::{decide, guard, GateDecision, Navigator, ReturnTo};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
