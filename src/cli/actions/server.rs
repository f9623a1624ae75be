use crate::{api, api::handlers::auth::AuthConfig, cli::actions::Action};
use anyhow::Result;

/// Handle the server action.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            token_secret,
            frontend_url,
            token_ttl_hours,
            remember_ttl_days,
            reset_ttl_minutes,
            lockout_threshold,
            lockout_minutes,
        } => {
            let auth_config = AuthConfig::new(frontend_url)
                .with_token_ttl_seconds(token_ttl_hours * 60 * 60)
                .with_remember_token_ttl_seconds(remember_ttl_days * 24 * 60 * 60)
                .with_reset_token_ttl_seconds(reset_ttl_minutes * 60)
                .with_lockout_threshold(lockout_threshold)
                .with_lockout_duration_seconds(lockout_minutes * 60);

            api::new(port, dsn, token_secret, auth_config).await?;
        }
    }

    Ok(())
}
