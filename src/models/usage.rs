use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One generation call as recorded in `generation_usage`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub user_id: String,
    pub provider: String,
    pub model_used: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub latency_ms: i32,
    pub is_error: bool,
    pub created_at: DateTime<Utc>,
}

/// Paginated response wrapper for usage listing.
#[derive(Debug, Serialize)]
pub struct UsageListResponse {
    pub data: Vec<UsageRecord>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}
