//! Auth state and configuration.

use super::mailer::ResetMailer;
use super::rate_limit::{RateLimitSettings, RateLimiter};
use super::token::TokenService;
use std::sync::Arc;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_REMEMBER_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_LOCKOUT_THRESHOLD: i64 = 5;
const DEFAULT_LOCKOUT_DURATION_SECONDS: i64 = 30 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    token_ttl_seconds: i64,
    remember_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    lockout_threshold: i64,
    lockout_duration_seconds: i64,
    rate_limits: RateLimitSettings,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            remember_token_ttl_seconds: DEFAULT_REMEMBER_TOKEN_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_duration_seconds: DEFAULT_LOCKOUT_DURATION_SECONDS,
            rate_limits: RateLimitSettings::default(),
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_remember_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.remember_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_lockout_threshold(mut self, threshold: i64) -> Self {
        self.lockout_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_lockout_duration_seconds(mut self, seconds: i64) -> Self {
        self.lockout_duration_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limits(mut self, rate_limits: RateLimitSettings) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    pub(crate) fn remember_token_ttl_seconds(&self) -> i64 {
        self.remember_token_ttl_seconds
    }

    pub(crate) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(crate) fn lockout_threshold(&self) -> i64 {
        self.lockout_threshold
    }

    pub(crate) fn lockout_duration_seconds(&self) -> i64 {
        self.lockout_duration_seconds
    }

    #[must_use]
    pub fn rate_limits(&self) -> &RateLimitSettings {
        &self.rate_limits
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        // Only mark cookies secure when the frontend is served over HTTPS.
        self.frontend_base_url.starts_with("https://")
    }
}

/// Shared state injected into every auth handler.
pub struct AuthState {
    config: AuthConfig,
    tokens: TokenService,
    rate_limiter: Arc<dyn RateLimiter>,
    mailer: Arc<dyn ResetMailer>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        tokens: TokenService,
        rate_limiter: Arc<dyn RateLimiter>,
        mailer: Arc<dyn ResetMailer>,
    ) -> Self {
        Self {
            config,
            tokens,
            rate_limiter,
            mailer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(crate) fn mailer(&self) -> &dyn ResetMailer {
        self.mailer.as_ref()
    }
}
