//! Database helpers for accounts, sessions, lockout, and reset state.
//!
//! All mutations of contended counters are single-statement read-modify-writes
//! (`UPDATE … RETURNING`), so two concurrent requests can never both observe
//! the pre-update state and race past a boundary.

use anyhow::{Context, Result, anyhow};
use sqlx::{Row, SqlitePool};
use tracing::Instrument;
use uuid::Uuid;

use super::roles::{PermissionSet, Role};
use super::utils::{generate_opaque_token, hash_opaque_token};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub(crate) enum RegisterOutcome {
    Created(Uuid),
    Conflict,
}

/// Outcome of an atomic reset-token consumption.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ResetOutcome {
    Consumed(Uuid),
    Invalid,
    Expired,
}

/// Account fields needed by the login flow.
#[derive(Debug, Clone)]
pub(crate) struct AccountRecord {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) password_hash: String,
    pub(crate) role: Role,
    pub(crate) permissions: PermissionSet,
    pub(crate) active: bool,
    pub(crate) failed_attempts: i64,
    pub(crate) locked_until: Option<i64>,
}

/// Lockout counter state after recording a failure.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct LockState {
    pub(crate) failed_attempts: i64,
    pub(crate) locked_until: Option<i64>,
}

/// Session joined with its owning account, as seen by the request pipeline.
///
/// Session liveness (active flag and expiry) is already enforced by the
/// lookup; account state is returned unfiltered so callers can map inactive
/// and locked accounts to distinct rejections.
#[derive(Debug)]
pub(crate) struct LiveSession {
    pub(crate) account_id: Uuid,
    pub(crate) email: String,
    pub(crate) role: Role,
    pub(crate) permissions: PermissionSet,
    pub(crate) account_active: bool,
    pub(crate) locked_until: Option<i64>,
}

/// Row shape for the admin account listing.
#[derive(Debug)]
pub(crate) struct AccountSummary {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) role: Role,
    pub(crate) active: bool,
    pub(crate) failed_attempts: i64,
    pub(crate) created_at: i64,
}

/// Create the schema if it does not exist yet.
pub(crate) async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .context("failed to apply schema")?;
    Ok(())
}

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.kind() == sqlx::error::ErrorKind::UniqueViolation
        }
        _ => false,
    }
}

fn parse_account_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid account id in store: {raw}"))
}

fn parse_role(raw: &str) -> Result<Role> {
    Role::parse(raw).ok_or_else(|| anyhow!("unknown role in store: {raw}"))
}

pub(crate) async fn insert_account(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
    role: Role,
    now: i64,
) -> Result<RegisterOutcome> {
    let id = Uuid::new_v4();
    let query = r"
        INSERT INTO accounts (id, email, password_hash, role, permissions, created_at, updated_at)
        VALUES ($1, $2, $3, $4, '[]', $5, $5)
    ";
    let result = sqlx::query(query)
        .bind(id.to_string())
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(now)
        .execute(pool)
        .instrument(query_span("INSERT", query))
        .await;

    match result {
        Ok(_) => Ok(RegisterOutcome::Created(id)),
        Err(err) if is_unique_violation(&err) => Ok(RegisterOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert account"),
    }
}

fn account_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AccountRecord> {
    let permissions: String = row.get("permissions");
    Ok(AccountRecord {
        id: parse_account_id(&row.get::<String, _>("id"))?,
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: parse_role(&row.get::<String, _>("role"))?,
        permissions: PermissionSet::from_json(&permissions)
            .context("invalid permissions in store")?,
        active: row.get("active"),
        failed_attempts: row.get("failed_attempts"),
        locked_until: row.get("locked_until"),
    })
}

pub(crate) async fn lookup_account_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<AccountRecord>> {
    let query = r"
        SELECT id, email, password_hash, role, permissions, active, failed_attempts, locked_until
        FROM accounts
        WHERE email = $1
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup account by email")?;

    row.as_ref().map(account_from_row).transpose()
}

pub(crate) async fn lookup_account_by_id(
    pool: &SqlitePool,
    account_id: Uuid,
) -> Result<Option<AccountRecord>> {
    let query = r"
        SELECT id, email, password_hash, role, permissions, active, failed_attempts, locked_until
        FROM accounts
        WHERE id = $1
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(account_id.to_string())
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup account by id")?;

    row.as_ref().map(account_from_row).transpose()
}

/// Record one failed password check and escalate to a lock when the counter
/// reaches the threshold. One atomic statement: the increment and the lock
/// decision cannot be split by a concurrent attempt.
pub(crate) async fn record_failed_login(
    pool: &SqlitePool,
    account_id: Uuid,
    threshold: i64,
    lock_seconds: i64,
    now: i64,
) -> Result<LockState> {
    // Parameters are numbered in order of first appearance: SQLite resolves
    // `$N` as named parameters with occurrence-order indexes.
    let query = r"
        UPDATE accounts
        SET failed_attempts = failed_attempts + 1,
            locked_until = CASE
                WHEN failed_attempts + 1 >= $1 THEN $2
                ELSE locked_until
            END,
            updated_at = $3
        WHERE id = $4
        RETURNING failed_attempts, locked_until
    ";
    let row = sqlx::query(query)
        .bind(threshold)
        .bind(now + lock_seconds)
        .bind(now)
        .bind(account_id.to_string())
        .fetch_one(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to record failed login")?;

    Ok(LockState {
        failed_attempts: row.get("failed_attempts"),
        locked_until: row.get("locked_until"),
    })
}

/// Reset the lockout state machine after a successful authentication.
pub(crate) async fn clear_login_failures(
    pool: &SqlitePool,
    account_id: Uuid,
    now: i64,
) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET failed_attempts = 0, locked_until = NULL, updated_at = $1
        WHERE id = $2
    ";
    sqlx::query(query)
        .bind(now)
        .bind(account_id.to_string())
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to clear login failures")?;
    Ok(())
}

pub(crate) async fn update_password_hash(
    pool: &SqlitePool,
    account_id: Uuid,
    password_hash: &str,
    now: i64,
) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET password_hash = $1, updated_at = $2
        WHERE id = $3
    ";
    sqlx::query(query)
        .bind(password_hash)
        .bind(now)
        .bind(account_id.to_string())
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to update password hash")?;
    Ok(())
}

/// Store a new reset token hash, discarding any prior unconsumed token.
/// Hash and expiry are written together so they are never half-set.
pub(crate) async fn store_reset_token(
    pool: &SqlitePool,
    account_id: Uuid,
    token_hash: &[u8],
    expires_at: i64,
    now: i64,
) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET reset_token_hash = $1, reset_expires_at = $2, updated_at = $3
        WHERE id = $4
    ";
    sqlx::query(query)
        .bind(token_hash)
        .bind(expires_at)
        .bind(now)
        .bind(account_id.to_string())
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to store reset token")?;
    Ok(())
}

/// Consume a reset token and install the new password hash in one atomic
/// statement. A second concurrent consumer matches zero rows because the
/// token columns are already cleared.
///
/// Also resets the lockout counters: a successful reset proves account
/// ownership.
pub(crate) async fn consume_reset_token(
    pool: &SqlitePool,
    token_hash: &[u8],
    new_password_hash: &str,
    now: i64,
) -> Result<ResetOutcome> {
    let query = r"
        UPDATE accounts
        SET password_hash = $1,
            reset_token_hash = NULL,
            reset_expires_at = NULL,
            failed_attempts = 0,
            locked_until = NULL,
            updated_at = $2
        WHERE reset_token_hash = $3
          AND reset_expires_at > $2
        RETURNING id
    ";
    let row = sqlx::query(query)
        .bind(new_password_hash)
        .bind(now)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to consume reset token")?;

    if let Some(row) = row {
        return Ok(ResetOutcome::Consumed(parse_account_id(
            &row.get::<String, _>("id"),
        )?));
    }

    // Zero rows: distinguish an aged token from an unknown or replayed one,
    // for logs only.
    let query = "SELECT reset_expires_at FROM accounts WHERE reset_token_hash = $1 LIMIT 1";
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to classify reset token")?;

    match row {
        Some(row) => {
            let expires_at: Option<i64> = row.get("reset_expires_at");
            if expires_at.is_some_and(|at| at <= now) {
                Ok(ResetOutcome::Expired)
            } else {
                Ok(ResetOutcome::Invalid)
            }
        }
        None => Ok(ResetOutcome::Invalid),
    }
}

/// Create a session and return the raw opaque token.
/// The store only ever sees the token's hash.
pub(crate) async fn insert_session(
    pool: &SqlitePool,
    account_id: Uuid,
    ttl_seconds: i64,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    now: i64,
) -> Result<String> {
    let query = r"
        INSERT INTO sessions (token_hash, account_id, created_at, expires_at, active, ip_address, user_agent, last_seen_at)
        VALUES ($1, $2, $3, $4, 1, $5, $6, $3)
    ";

    for _ in 0..3 {
        let token = generate_opaque_token()?;
        let token_hash = hash_opaque_token(&token);
        let result = sqlx::query(query)
            .bind(&token_hash)
            .bind(account_id.to_string())
            .bind(now)
            .bind(now + ttl_seconds)
            .bind(ip_address)
            .bind(user_agent)
            .execute(pool)
            .instrument(query_span("INSERT", query))
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Resolve a session token hash to a live session and its owning account.
///
/// Liveness means a matching record with `active = 1` and an unexpired
/// `expires_at`; an expired row is dead even when the flag is still set.
/// Runs on every authenticated request, so it is a single indexed lookup.
pub(crate) async fn lookup_live_session(
    pool: &SqlitePool,
    token_hash: &[u8],
    now: i64,
) -> Result<Option<LiveSession>> {
    let query = r"
        SELECT accounts.id AS account_id,
               accounts.email,
               accounts.role,
               accounts.permissions,
               accounts.active AS account_active,
               accounts.locked_until
        FROM sessions
        JOIN accounts ON accounts.id = sessions.account_id
        WHERE sessions.token_hash = $1
          AND sessions.active = 1
          AND sessions.expires_at > $2
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    // Record activity for audit/visibility without extending the session TTL.
    let query = "UPDATE sessions SET last_seen_at = $1 WHERE token_hash = $2";
    sqlx::query(query)
        .bind(now)
        .bind(token_hash)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to update session last_seen_at")?;

    let permissions: String = row.get("permissions");
    Ok(Some(LiveSession {
        account_id: parse_account_id(&row.get::<String, _>("account_id"))?,
        email: row.get("email"),
        role: parse_role(&row.get::<String, _>("role"))?,
        permissions: PermissionSet::from_json(&permissions)
            .context("invalid permissions in store")?,
        account_active: row.get("account_active"),
        locked_until: row.get("locked_until"),
    }))
}

/// Session liveness as a plain boolean, without touching account state.
pub(crate) async fn session_is_live(
    pool: &SqlitePool,
    token_hash: &[u8],
    now: i64,
) -> Result<bool> {
    let query = r"
        SELECT 1
        FROM sessions
        WHERE token_hash = $1
          AND active = 1
          AND expires_at > $2
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to check session liveness")?;
    Ok(row.is_some())
}

/// Deactivate one session. Idempotent: revoking an unknown or already
/// revoked token is not an error.
pub(crate) async fn revoke_session(pool: &SqlitePool, token_hash: &[u8]) -> Result<()> {
    let query = "UPDATE sessions SET active = 0 WHERE token_hash = $1";
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to revoke session")?;
    Ok(())
}

/// Deactivate all of an account's sessions, optionally sparing one — used on
/// password change so the account does not lock itself out mid-change.
pub(crate) async fn revoke_all_sessions(
    pool: &SqlitePool,
    account_id: Uuid,
    except_token_hash: Option<&[u8]>,
) -> Result<u64> {
    let result = if let Some(except) = except_token_hash {
        let query = r"
            UPDATE sessions
            SET active = 0
            WHERE account_id = $1 AND active = 1 AND token_hash != $2
        ";
        sqlx::query(query)
            .bind(account_id.to_string())
            .bind(except)
            .execute(pool)
            .instrument(query_span("UPDATE", query))
            .await
    } else {
        let query = "UPDATE sessions SET active = 0 WHERE account_id = $1 AND active = 1";
        sqlx::query(query)
            .bind(account_id.to_string())
            .execute(pool)
            .instrument(query_span("UPDATE", query))
            .await
    };

    Ok(result.context("failed to revoke account sessions")?.rows_affected())
}

/// Delete sessions past expiry to bound storage growth.
///
/// Maintenance only: an expired-but-undeleted row is already rejected by the
/// liveness check.
pub(crate) async fn sweep_expired_sessions(pool: &SqlitePool, now: i64) -> Result<u64> {
    let query = "DELETE FROM sessions WHERE expires_at <= $1";
    let result = sqlx::query(query)
        .bind(now)
        .execute(pool)
        .instrument(query_span("DELETE", query))
        .await
        .context("failed to sweep expired sessions")?;
    Ok(result.rows_affected())
}

pub(crate) async fn list_accounts(pool: &SqlitePool) -> Result<Vec<AccountSummary>> {
    let query = r"
        SELECT id, email, role, active, failed_attempts, created_at
        FROM accounts
        ORDER BY created_at, email
    ";
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await
        .context("failed to list accounts")?;

    rows.iter()
        .map(|row| {
            Ok(AccountSummary {
                id: parse_account_id(&row.get::<String, _>("id"))?,
                email: row.get("email"),
                role: parse_role(&row.get::<String, _>("role"))?,
                active: row.get("active"),
                failed_attempts: row.get("failed_attempts"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}
