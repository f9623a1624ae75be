//! Auth handlers and supporting modules.
//!
//! This module is the decision core for every inbound request: rate limiting,
//! token verification, session liveness, account lockout state, and role or
//! permission checks, in that order. Each stage short-circuits with a typed
//! [`error::AuthFailure`].
//!
//! ## Revocation model
//!
//! Bearer tokens are signed JWTs, but each carries the opaque token of a
//! database-backed session. Signature/expiry and session liveness are two
//! independent checks, so revocation works without waiting for token expiry.
//!
//! ## Lockout
//!
//! Per account: `Active → Locked(until)` once the failed-attempt counter
//! reaches the configured threshold, back to `Active` when the lock elapses.
//! A separate pre-lookup sliding window throttles attempts per raw email,
//! whether or not the account exists.

pub(crate) mod error;
pub(crate) mod login;
pub mod mailer;
pub(crate) mod password;
pub(crate) mod password_change;
pub(crate) mod principal;
pub mod rate_limit;
pub(crate) mod register;
pub(crate) mod reset;
pub mod roles;
pub(crate) mod session;
pub(crate) mod state;
pub(crate) mod storage;
pub mod token;
pub(crate) mod types;
pub(crate) mod utils;

pub use error::AuthFailure;
pub use mailer::{LogMailer, ResetMailer};
pub use principal::Principal;
pub use rate_limit::{NoopRateLimiter, RateLimitSettings, SlidingWindowLimiter};
pub use roles::{Permission, PermissionSet, Role};
pub use state::{AuthConfig, AuthState};
pub use token::TokenService;
