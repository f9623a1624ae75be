//! Seam to the platform's mail delivery service.
//!
//! Delivery itself is owned by an external collaborator; this trait is the
//! narrow interface the auth core hands reset tokens across.

use tracing::info;

pub trait ResetMailer: Send + Sync {
    /// Hand a raw reset token off for delivery to `email`.
    fn send_reset(&self, email: &str, token: &str);
}

/// Default sender that only records the handoff. The token itself never
/// reaches the logs.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl ResetMailer for LogMailer {
    fn send_reset(&self, email: &str, _token: &str) {
        info!("reset email queued for {email}");
    }
}
