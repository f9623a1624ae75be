//! Rate limiting primitives for auth and API flows.
//!
//! Two mechanisms, both keyed by `(bucket, key)`:
//!
//! - a fixed-tier sliding window that rejects with a retry-after once a
//!   bucket's maximum is reached inside its trailing window;
//! - a progressive delay that injects growing (capped) latency once a soft
//!   threshold is exceeded, instead of rejecting.
//!
//! The window map lives behind a single mutex, so the compact-check-append
//! step is one atomic read-modify-write: two simultaneous requests on the
//! same key can never both pass a boundary count.

use super::roles::Role;
use super::utils::unix_now_millis;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Endpoint classes with independent limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateBucket {
    /// Login and registration attempts, keyed by caller IP
    Auth,
    /// Authenticated API traffic, keyed by account id
    Api,
    /// Course catalog search traffic
    Search,
    /// Content upload traffic
    Upload,
    /// Password reset requests, keyed by the target email
    PasswordReset,
    /// Pre-lookup failed-login throttle per raw email
    LoginEmail,
}

impl RateBucket {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            RateBucket::Auth => "auth",
            RateBucket::Api => "api",
            RateBucket::Search => "search",
            RateBucket::Upload => "upload",
            RateBucket::PasswordReset => "password-reset",
            RateBucket::LoginEmail => "login-email",
        }
    }
}

/// Lookup key for a window record.
///
/// Anonymous callers fall back to their IP; authenticated callers use their
/// account id; flows like password reset key on a payload field instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateKey {
    Ip(String),
    Account(Uuid),
    Email(String),
}

impl RateKey {
    fn storage_key(&self) -> String {
        match self {
            RateKey::Ip(ip) => format!("ip:{ip}"),
            RateKey::Account(id) => format!("account:{id}"),
            RateKey::Email(email) => format!("email:{email}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

pub trait RateLimiter: Send + Sync {
    /// Check and record one request for `(bucket, key)`.
    fn check(&self, bucket: RateBucket, key: &RateKey, role: Option<Role>) -> RateLimitDecision;

    /// Artificial delay to apply before processing, independent of `check`.
    fn throttle_delay(&self, bucket: RateBucket, key: &RateKey) -> Duration;
}

/// Limiter that allows everything; used in tests and as a wiring default.
#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _bucket: RateBucket, _key: &RateKey, _role: Option<Role>) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn throttle_delay(&self, _bucket: RateBucket, _key: &RateKey) -> Duration {
        Duration::ZERO
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BucketConfig {
    pub max: u32,
    pub window: Duration,
}

/// Per-bucket tiers plus progressive-delay tuning.
#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    pub auth: BucketConfig,
    pub api: BucketConfig,
    pub search: BucketConfig,
    pub upload: BucketConfig,
    pub password_reset: BucketConfig,
    pub login_email: BucketConfig,
    /// Instructors get `max * instructor_multiplier`; admins bypass entirely.
    pub instructor_multiplier: u32,
    /// Requests within a window before delays start.
    pub soft_threshold: u32,
    /// Added delay per request beyond the soft threshold.
    pub delay_step: Duration,
    /// Upper bound on the injected delay.
    pub max_delay: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            auth: BucketConfig {
                max: 5,
                window: Duration::from_secs(15 * 60),
            },
            api: BucketConfig {
                max: 100,
                window: Duration::from_secs(15 * 60),
            },
            search: BucketConfig {
                max: 30,
                window: Duration::from_secs(60),
            },
            upload: BucketConfig {
                max: 10,
                window: Duration::from_secs(60 * 60),
            },
            password_reset: BucketConfig {
                max: 3,
                window: Duration::from_secs(60 * 60),
            },
            login_email: BucketConfig {
                max: 10,
                window: Duration::from_secs(15 * 60),
            },
            instructor_multiplier: 4,
            soft_threshold: 3,
            delay_step: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RateLimitSettings {
    #[must_use]
    pub fn bucket(&self, bucket: RateBucket) -> BucketConfig {
        match bucket {
            RateBucket::Auth => self.auth,
            RateBucket::Api => self.api,
            RateBucket::Search => self.search,
            RateBucket::Upload => self.upload,
            RateBucket::PasswordReset => self.password_reset,
            RateBucket::LoginEmail => self.login_email,
        }
    }
}

/// In-memory sliding-window limiter.
///
/// Window records hold unix-millisecond timestamps; entries older than
/// `now - window` are dropped on every check, so the vector length after
/// compaction is the current count. The boundary is inclusive: an entry at
/// exactly `now - window` still counts.
pub struct SlidingWindowLimiter {
    settings: RateLimitSettings,
    windows: Mutex<HashMap<(RateBucket, String), Vec<i64>>>,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record one request at an explicit clock.
    pub fn check_at(
        &self,
        bucket: RateBucket,
        key: &RateKey,
        role: Option<Role>,
        now_ms: i64,
    ) -> RateLimitDecision {
        if role == Some(Role::Admin) {
            return RateLimitDecision::Allowed;
        }

        let config = self.settings.bucket(bucket);
        let max = if role == Some(Role::Instructor) {
            config.max.saturating_mul(self.settings.instructor_multiplier)
        } else {
            config.max
        };
        let window_ms = window_millis(config.window);
        let cutoff = now_ms - window_ms;

        let mut windows = lock_windows(&self.windows);
        let record = windows.entry((bucket, key.storage_key())).or_default();
        record.retain(|&stamp| stamp >= cutoff);

        if record.len() < max as usize {
            record.push(now_ms);
            return RateLimitDecision::Allowed;
        }

        let retry_ms = record
            .first()
            .map_or(window_ms, |&oldest| oldest + window_ms - now_ms);
        RateLimitDecision::Limited {
            retry_after: Duration::from_millis(retry_ms.max(0).unsigned_abs()),
        }
    }

    /// Compute the progressive delay at an explicit clock without recording.
    pub fn throttle_delay_at(&self, bucket: RateBucket, key: &RateKey, now_ms: i64) -> Duration {
        let config = self.settings.bucket(bucket);
        let cutoff = now_ms - window_millis(config.window);

        let windows = lock_windows(&self.windows);
        let count = windows
            .get(&(bucket, key.storage_key()))
            .map_or(0, |record| {
                record.iter().filter(|&&stamp| stamp >= cutoff).count()
            });

        let excess = (count as u32).saturating_sub(self.settings.soft_threshold);
        if excess == 0 {
            return Duration::ZERO;
        }
        self.settings
            .delay_step
            .saturating_mul(excess)
            .min(self.settings.max_delay)
    }

    /// Drop keys whose every entry has aged out of its window.
    ///
    /// Maintenance only: stale entries already age out on the next check.
    pub fn sweep_idle(&self, now_ms: i64) {
        let mut windows = lock_windows(&self.windows);
        let settings = &self.settings;
        windows.retain(|(bucket, _), record| {
            let cutoff = now_ms - window_millis(settings.bucket(*bucket).window);
            record.iter().any(|&stamp| stamp >= cutoff)
        });
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check(&self, bucket: RateBucket, key: &RateKey, role: Option<Role>) -> RateLimitDecision {
        self.check_at(bucket, key, role, unix_now_millis())
    }

    fn throttle_delay(&self, bucket: RateBucket, key: &RateKey) -> Duration {
        self.throttle_delay_at(bucket, key, unix_now_millis())
    }
}

fn window_millis(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

fn lock_windows<'a>(
    windows: &'a Mutex<HashMap<(RateBucket, String), Vec<i64>>>,
) -> std::sync::MutexGuard<'a, HashMap<(RateBucket, String), Vec<i64>>> {
    // A poisoned lock only means another thread panicked mid-check; the map
    // itself is still a valid set of timestamps.
    windows.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
