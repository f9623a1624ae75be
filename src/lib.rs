//! # Aula (identity, session, and abuse control)
//!
//! `aula` is the authentication authority of the Aula learning platform. It
//! decides, for every inbound request, who is making it and whether it is
//! allowed to proceed:
//!
//! - **Credentials:** server-side Argon2id password verification.
//! - **Sessions:** bearer tokens are signed JWTs, but every token carries an
//!   opaque session id that must resolve to a live database record, so tokens
//!   stay revocable before their natural expiry.
//! - **Lockout:** repeated authentication failures drive a per-account lock
//!   state machine; locked accounts are rejected before the password is even
//!   checked.
//! - **Abuse control:** tiered sliding-window rate limits keyed by IP,
//!   account, or payload fields, plus a progressive-delay throttle for
//!   friction without rejection.
//!
//! Course, category, and lesson content is owned by downstream services; this
//! crate only attaches an authenticated principal to the request context.

pub mod api;
pub mod cli;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
