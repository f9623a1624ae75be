pub mod server;

use secrecy::SecretString;

/// Actions the CLI can dispatch to.
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        token_secret: SecretString,
        frontend_url: String,
        token_ttl_hours: i64,
        remember_ttl_days: i64,
        reset_ttl_minutes: i64,
        lockout_threshold: i64,
        lockout_minutes: i64,
    },
}
