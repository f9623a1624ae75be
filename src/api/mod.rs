use crate::api::handlers::auth::{
    AuthConfig, AuthState, LogMailer, SlidingWindowLimiter, TokenService, storage,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use secrecy::SecretString;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, debug, error, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Create the schema on a fresh database handle. Exposed for test harnesses.
///
/// # Errors
/// Returns an error when the schema cannot be applied.
pub async fn prepare_database(pool: &SqlitePool) -> Result<()> {
    storage::apply_schema(pool).await
}

/// Assemble the application: routes, middleware stack, and shared state.
///
/// # Errors
/// Returns an error when the frontend origin cannot be parsed for CORS.
pub fn app(pool: SqlitePool, auth_state: Arc<AuthState>) -> Result<Router> {
    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let (router, _openapi) = router().split_for_parts();
    let app = router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &Request<Body>| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(auth_state))
            .layer(Extension(pool)),
    );

    Ok(app)
}

/// Start the server
///
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    token_secret: SecretString,
    auth_config: AuthConfig,
) -> Result<()> {
    // Connect to database. Bounded timeouts keep a slow store failing
    // closed instead of hanging the handler pool.
    let options = SqliteConnectOptions::from_str(&dsn)
        .with_context(|| format!("Invalid database DSN: {dsn}"))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    storage::apply_schema(&pool).await?;

    let rate_limiter = Arc::new(SlidingWindowLimiter::new(auth_config.rate_limits().clone()));
    let auth_state = Arc::new(AuthState::new(
        auth_config,
        TokenService::new(&token_secret),
        rate_limiter,
        Arc::new(LogMailer),
    ));

    // Background task deletes sessions past expiry. Liveness checks already
    // reject them; this only bounds storage growth.
    let sweep_pool = pool.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match storage::sweep_expired_sessions(
                &sweep_pool,
                chrono::Utc::now().timestamp(),
            )
            .await
            {
                Ok(0) => {}
                Ok(swept) => debug!("swept {swept} expired sessions"),
                Err(err) => error!("Failed to sweep expired sessions: {err}"),
            }
        }
    });

    let app = app(pool, auth_state)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
