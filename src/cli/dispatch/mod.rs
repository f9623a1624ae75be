use crate::cli::actions::Action;
use anyhow::Result;
use secrecy::SecretString;

/// Turn parsed arguments into a typed action.
///
/// # Errors
/// Returns an error when a required argument is missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        token_secret: matches
            .get_one("token-secret")
            .map(|s: &String| SecretString::from(s.to_string()))
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --token-secret"))?,
        frontend_url: matches
            .get_one("frontend-url")
            .map(|s: &String| s.to_string())
            .unwrap_or_else(|| "http://localhost:3000".to_string()),
        token_ttl_hours: matches
            .get_one::<i64>("token-ttl-hours")
            .copied()
            .unwrap_or(168),
        remember_ttl_days: matches
            .get_one::<i64>("remember-ttl-days")
            .copied()
            .unwrap_or(30),
        reset_ttl_minutes: matches
            .get_one::<i64>("reset-ttl-minutes")
            .copied()
            .unwrap_or(60),
        lockout_threshold: matches
            .get_one::<i64>("lockout-threshold")
            .copied()
            .unwrap_or(5),
        lockout_minutes: matches
            .get_one::<i64>("lockout-minutes")
            .copied()
            .unwrap_or(30),
    })
}
