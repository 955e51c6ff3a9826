use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    /// Owner the key acts on behalf of.
    pub user_id: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response when listing keys (never exposes hash or full key)
#[derive(Debug, Serialize)]
pub struct ApiKeyInfo {
    pub id: Uuid,
    pub name: String,
    pub user_id: String,
    pub key_prefix: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ApiKey> for ApiKeyInfo {
    fn from(k: ApiKey) -> Self {
        Self {
            id: k.id,
            name: k.name,
            user_id: k.user_id,
            key_prefix: k.key_prefix,
            is_active: k.is_active,
            created_at: k.created_at,
            updated_at: k.updated_at,
        }
    }
}

/// Response when creating a key, including the plaintext key (shown only once)
#[derive(Debug, Serialize)]
pub struct ApiKeyCreated {
    pub id: Uuid,
    pub name: String,
    pub user_id: String,
    pub key: String,
    pub key_prefix: String,
    pub created_at: DateTime<Utc>,
}
