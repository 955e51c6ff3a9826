use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::api_key::{ApiKey, ApiKeyCreated, ApiKeyInfo};

/// Redis hash: key hash -> JSON-encoded [`KeyOwner`].
const REDIS_ACTIVE_KEYS: &str = "gateway:active_keys";

/// What a valid key resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOwner {
    pub key_id: Uuid,
    pub user_id: String,
}

/// Generate a new key in the format `sk-{uuid v4}`
pub fn generate_key() -> String {
    format!("sk-{}", Uuid::new_v4())
}

/// SHA-256 hash of a plaintext key
pub fn hash_key(plain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plain.as_bytes());
    hex::encode(hasher.finalize())
}

/// Display prefix of a key, e.g. "sk-550e8400-..." -> "sk-550e8400...".
fn key_prefix(plain: &str) -> String {
    match plain.char_indices().nth(11) {
        Some((idx, _)) => format!("{}...", &plain[..idx]),
        None => plain.to_string(),
    }
}

fn encode_owner(owner: &KeyOwner) -> Result<String, AppError> {
    serde_json::to_string(owner).map_err(|e| AppError::Internal(e.to_string()))
}

/// Create a new API key for `user_id`, persist to PG + cache in Redis.
/// Returns the plaintext key (shown only once).
pub async fn create_key(
    name: &str,
    user_id: &str,
    db: &PgPool,
    redis: &mut ConnectionManager,
) -> Result<ApiKeyCreated, AppError> {
    let id = Uuid::new_v4();
    let plain = generate_key();
    let hash = hash_key(&plain);
    let prefix = key_prefix(&plain);
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO api_keys (id, name, user_id, key_hash, key_prefix, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, TRUE, $6, $6)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(user_id)
    .bind(&hash)
    .bind(&prefix)
    .bind(now)
    .execute(db)
    .await?;

    let owner = KeyOwner {
        key_id: id,
        user_id: user_id.to_string(),
    };
    let _: () = redis.hset(REDIS_ACTIVE_KEYS, &hash, encode_owner(&owner)?).await?;

    Ok(ApiKeyCreated {
        id,
        name: name.to_string(),
        user_id: user_id.to_string(),
        key: plain,
        key_prefix: prefix,
        created_at: now,
    })
}

/// What to do with the Redis entry after Postgres has answered.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CacheAction {
    Keep,
    Backfill(KeyOwner),
    Evict,
}

/// Postgres is authoritative: a cached owner without an active row is stale.
fn reconcile(
    cached: Option<KeyOwner>,
    active: Option<KeyOwner>,
) -> (Option<KeyOwner>, CacheAction) {
    match (cached, active) {
        (Some(cached), Some(active)) if cached == active => (Some(active), CacheAction::Keep),
        (_, Some(active)) => (Some(active.clone()), CacheAction::Backfill(active)),
        (Some(_), None) => (None, CacheAction::Evict),
        (None, None) => (None, CacheAction::Keep),
    }
}

/// Resolve a plaintext key. The Redis entry is checked against the active
/// row in PG on every call, so a revoked key stops working immediately even
/// if its cache entry survived.
/// Returns `None` for unknown or revoked keys.
pub async fn validate_key(
    plain: &str,
    redis: &mut ConnectionManager,
    db: &PgPool,
) -> Result<Option<KeyOwner>, AppError> {
    let hash = hash_key(plain);

    let raw: Option<String> = redis.hget(REDIS_ACTIVE_KEYS, &hash).await?;
    let cached = raw.and_then(|raw| match serde_json::from_str::<KeyOwner>(&raw) {
        Ok(owner) => Some(owner),
        Err(e) => {
            tracing::warn!("Discarding malformed cached key entry: {}", e);
            None
        }
    });

    let active = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, user_id FROM api_keys WHERE key_hash = $1 AND is_active = TRUE",
    )
    .bind(&hash)
    .fetch_optional(db)
    .await?
    .map(|(key_id, user_id)| KeyOwner { key_id, user_id });

    let (owner, action) = reconcile(cached, active);
    match action {
        CacheAction::Keep => {}
        CacheAction::Backfill(owner) => {
            let _: () = redis.hset(REDIS_ACTIVE_KEYS, &hash, encode_owner(&owner)?).await?;
        }
        CacheAction::Evict => {
            tracing::info!("Evicting cached entry for inactive key");
            let _: () = redis.hdel(REDIS_ACTIVE_KEYS, &hash).await?;
        }
    }
    Ok(owner)
}

/// List all keys (without exposing hashes or plaintext).
pub async fn list_keys(db: &PgPool) -> Result<Vec<ApiKeyInfo>, AppError> {
    let keys = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys ORDER BY created_at DESC")
        .fetch_all(db)
        .await?;

    Ok(keys.into_iter().map(ApiKeyInfo::from).collect())
}

/// Revoke a key: mark inactive + remove from Redis.
pub async fn revoke_key(
    id: Uuid,
    db: &PgPool,
    redis: &mut ConnectionManager,
) -> Result<(), AppError> {
    let existing = sqlx::query_as::<_, ApiKey>(
        "SELECT * FROM api_keys WHERE id = $1 AND is_active = TRUE",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound)?;

    sqlx::query("UPDATE api_keys SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;

    let _: () = redis.hdel(REDIS_ACTIVE_KEYS, &existing.key_hash).await?;

    Ok(())
}

/// Warm up Redis with all active keys from PG (call on startup).
pub async fn warm_up_redis(
    db: &PgPool,
    redis: &mut ConnectionManager,
) -> Result<(), AppError> {
    let rows = sqlx::query_as::<_, (String, Uuid, String)>(
        "SELECT key_hash, id, user_id FROM api_keys WHERE is_active = TRUE",
    )
    .fetch_all(db)
    .await?;

    // Clear stale data and re-populate
    let _: () = redis.del(REDIS_ACTIVE_KEYS).await?;

    if rows.is_empty() {
        tracing::info!("No active keys to warm up in Redis");
        return Ok(());
    }

    let mut entries = Vec::with_capacity(rows.len());
    for (hash, key_id, user_id) in rows {
        entries.push((hash, encode_owner(&KeyOwner { key_id, user_id })?));
    }
    let _: () = redis.hset_multiple(REDIS_ACTIVE_KEYS, &entries[..]).await?;

    tracing::info!("Warmed up Redis with {} active keys", entries.len());
    Ok(())
}
