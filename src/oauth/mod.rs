//! OAuth credential lifecycle: token endpoint exchange and the
//! refresh-before-expiry coordinator.

pub mod endpoints;
pub mod refresh;

pub use endpoints::{OauthExchanger, TokenExchanger, TokenGrant};
pub use refresh::RefreshCoordinator;
