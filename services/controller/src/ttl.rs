//! TTL and identity policy.
//!
//! Pure functions over an Instance and the process-wide defaults.

use chrono::{DateTime, Duration, Utc};
use ephem_objects::Instance;

/// Identity used when neither the Instance nor the configuration names one.
pub const FALLBACK_IDENTITY: &str = "default";

/// Effective TTL in seconds: the Instance override when positive, else the
/// default when positive, else 0 (no expiry).
pub fn resolve_ttl_seconds(instance: &Instance, default_seconds: i64) -> i64 {
    match instance.spec.ttl_seconds {
        Some(ttl) if ttl > 0 => ttl,
        _ if default_seconds > 0 => default_seconds,
        _ => 0,
    }
}

/// Execution deadline for the worker pod; `None` when TTL is disabled.
pub fn deadline_seconds(instance: &Instance, default_seconds: i64) -> Option<i64> {
    match resolve_ttl_seconds(instance, default_seconds) {
        0 => None,
        ttl => Some(ttl),
    }
}

/// Instant the Instance expires, if it expires at all.
///
/// `None` when TTL is disabled or the store has not stamped a creation time.
pub fn expires_at(instance: &Instance, default_seconds: i64) -> Option<DateTime<Utc>> {
    let ttl = deadline_seconds(instance, default_seconds)?;
    let created = instance.created_at()?;
    created.checked_add_signed(Duration::try_seconds(ttl)?)
}

/// Execution identity: the Instance's own, else the default, else
/// [`FALLBACK_IDENTITY`].
pub fn resolve_identity<'a>(instance: &'a Instance, default_identity: &'a str) -> &'a str {
    match instance.spec.identity.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ if !default_identity.is_empty() => default_identity,
        _ => FALLBACK_IDENTITY,
    }
}
