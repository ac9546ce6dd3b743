use crate::cache::TtlCache;
use crate::config::GameConfig;
use crate::error::AppError;
use std::time::Duration;
use uuid::Uuid;

const IDEM_PREFIX: &str = "idem:lb";

/// Replay protection: the client's Unix-seconds timestamp must fall inside
/// the configured freshness window around `now`. Stateless; rejections never
/// reach the store.
pub fn check_freshness(
    header: Option<&str>,
    now: i64,
    cfg: &GameConfig,
) -> Result<(), AppError> {
    let raw = header
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest("Missing X-Timestamp header. Include a Unix timestamp.".into())
        })?;
    let ts: i64 = raw.parse().map_err(|_| {
        AppError::BadRequest("Invalid timestamp format. Use Unix seconds since epoch.".into())
    })?;

    let age = now - ts;
    if age > cfg.freshness_max_age_secs {
        return Err(AppError::TimestampTooOld {
            age_secs: age,
            max_age_secs: cfg.freshness_max_age_secs,
        });
    }
    if ts - now > cfg.freshness_max_future_secs {
        return Err(AppError::TimestampTooFuture {
            skew_secs: ts - now,
            max_skew_secs: cfg.freshness_max_future_secs,
        });
    }
    Ok(())
}

fn composite_key(actor: Uuid, client_key: &str) -> String {
    format!("{}:{}:{}", IDEM_PREFIX, actor, client_key)
}

/// Admits a submission attempt by atomically reserving its idempotency key.
/// A lost reservation means a prior attempt with the same key is in flight or
/// already completed; the pipeline must not run again.
pub fn admit(
    cache: &TtlCache,
    actor: Uuid,
    header: Option<&str>,
    cfg: &GameConfig,
) -> Result<String, AppError> {
    let client_key = header
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing Idempotency-Key header".into()))?;

    let key = composite_key(actor, client_key);
    let ttl = Duration::from_secs(cfg.idempotency_ttl_secs);
    if cache.set_nx(&key, "pending", ttl) {
        Ok(key)
    } else {
        Err(AppError::DuplicateSubmission)
    }
}

/// Called only after the transaction committed; refreshes the full TTL.
pub fn mark_complete(cache: &TtlCache, key: &str, cfg: &GameConfig) {
    cache.set(key, "done", Duration::from_secs(cfg.idempotency_ttl_secs));
}

/// Frees the reservation after a failed attempt so the client may retry with
/// the same key.
pub fn release(cache: &TtlCache, key: &str) {
    cache.delete(key);
}
