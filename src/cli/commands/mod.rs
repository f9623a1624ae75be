use clap::{
    Arg, ColorChoice, Command,
    builder::{
        ValueParser,
        styling::{AnsiColor, Effects, Styles},
    },
};

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("aula")
        .about("Identity, session, and abuse control for the Aula learning platform")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("AULA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string, example: sqlite://aula.db")
                .default_value("sqlite://aula.db")
                .env("AULA_DSN"),
        )
        .arg(
            Arg::new("token-secret")
                .long("token-secret")
                .help("Secret used to sign bearer tokens (HS256)")
                .env("AULA_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("frontend-url")
                .long("frontend-url")
                .help("Frontend base URL, used for CORS and cookie policy")
                .default_value("http://localhost:3000")
                .env("AULA_FRONTEND_URL"),
        )
        .arg(
            Arg::new("token-ttl-hours")
                .long("token-ttl-hours")
                .help("Bearer token and session lifetime in hours")
                .default_value("168")
                .env("AULA_TOKEN_TTL_HOURS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("remember-ttl-days")
                .long("remember-ttl-days")
                .help("\"Remember me\" token and session lifetime in days")
                .default_value("30")
                .env("AULA_REMEMBER_TTL_DAYS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-ttl-minutes")
                .long("reset-ttl-minutes")
                .help("Password reset token lifetime in minutes")
                .default_value("60")
                .env("AULA_RESET_TTL_MINUTES")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("lockout-threshold")
                .long("lockout-threshold")
                .help("Failed logins before an account is locked")
                .default_value("5")
                .env("AULA_LOCKOUT_THRESHOLD")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("lockout-minutes")
                .long("lockout-minutes")
                .help("How long a locked account stays locked, in minutes")
                .default_value("30")
                .env("AULA_LOCKOUT_MINUTES")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("AULA_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
