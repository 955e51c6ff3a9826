use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::usage::{UsageListResponse, UsageRecord};

/// Parameters for inserting a usage row (built by the generate handlers).
#[derive(Debug, Clone)]
pub struct NewUsage {
    pub api_key_id: Option<Uuid>,
    pub user_id: String,
    pub provider: String,
    pub model_used: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub latency_ms: i32,
    pub is_error: bool,
}

pub async fn insert_usage(db: &PgPool, usage: NewUsage) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO generation_usage (
            id, api_key_id, user_id, provider, model_used,
            input_tokens, output_tokens, cost_usd, latency_ms, is_error, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(usage.api_key_id)
    .bind(&usage.user_id)
    .bind(&usage.provider)
    .bind(&usage.model_used)
    .bind(usage.input_tokens)
    .bind(usage.output_tokens)
    .bind(usage.cost_usd)
    .bind(usage.latency_ms)
    .bind(usage.is_error)
    .bind(Utc::now())
    .execute(db)
    .await?;

    Ok(())
}

/// Record usage without holding up the response.
pub fn record_usage(db: PgPool, usage: NewUsage) {
    tokio::spawn(async move {
        if let Err(e) = insert_usage(&db, usage).await {
            tracing::error!("Failed to record generation usage: {}", e);
        }
    });
}

/// Query parameters for listing usage.
#[derive(Debug, Clone)]
pub struct ListUsageParams {
    pub page: i64,
    pub per_page: i64,
    pub key_id: Option<Uuid>,
    pub model: Option<String>,
}

/// Row offset of a 1-based page; saturates instead of overflowing.
fn page_offset(page: i64, per_page: i64) -> i64 {
    page.saturating_sub(1).max(0).saturating_mul(per_page.max(0))
}

/// Builds the WHERE clause with filter placeholders numbered from `first`.
fn where_clause(params: &ListUsageParams, first: usize) -> String {
    let mut conditions: Vec<String> = vec![];
    let mut idx = first;
    if params.key_id.is_some() {
        conditions.push(format!("api_key_id = ${idx}"));
        idx += 1;
    }
    if params.model.is_some() {
        conditions.push(format!("model_used = ${idx}"));
    }

    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

/// List usage with offset-based pagination and optional filters.
pub async fn list_usage(
    db: &PgPool,
    params: ListUsageParams,
) -> Result<UsageListResponse, AppError> {
    let offset = page_offset(params.page, params.per_page);

    let count_query = format!(
        "SELECT COUNT(*) FROM generation_usage {}",
        where_clause(&params, 1)
    );
    // $1/$2 are LIMIT/OFFSET here.
    let data_query = format!(
        "SELECT * FROM generation_usage {} ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        where_clause(&params, 3)
    );

    let total: i64 = {
        let mut q = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(ref kid) = params.key_id {
            q = q.bind(kid);
        }
        if let Some(ref m) = params.model {
            q = q.bind(m);
        }
        q.fetch_one(db).await?
    };

    let records: Vec<UsageRecord> = {
        let mut q = sqlx::query_as::<_, UsageRecord>(&data_query)
            .bind(params.per_page)
            .bind(offset);
        if let Some(ref kid) = params.key_id {
            q = q.bind(kid);
        }
        if let Some(ref m) = params.model {
            q = q.bind(m);
        }
        q.fetch_all(db).await?
    };

    Ok(UsageListResponse {
        data: records,
        total,
        page: params.page,
        per_page: params.per_page,
    })
}

/// `make_interval` takes an `int4`; a wrapped value would delete everything.
fn retention_interval_days(retention_days: u32) -> Result<i32, AppError> {
    i32::try_from(retention_days).map_err(|_| {
        AppError::Internal(format!("retention of {retention_days} days is out of range"))
    })
}

/// Delete usage rows older than `retention_days` days.
/// Returns the number of rows deleted.
pub async fn cleanup_old_usage(db: &PgPool, retention_days: u32) -> Result<u64, AppError> {
    let days = retention_interval_days(retention_days)?;
    let result = sqlx::query(
        "DELETE FROM generation_usage WHERE created_at < NOW() - make_interval(days => $1)",
    )
    .bind(days)
    .execute(db)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(key_id: Option<Uuid>, model: Option<&str>) -> ListUsageParams {
        ListUsageParams {
            page: 1,
            per_page: 50,
            key_id,
            model: model.map(String::from),
        }
    }

    #[test]
    fn retention_days_never_wrap() {
        assert_eq!(retention_interval_days(30).unwrap(), 30);
        assert_eq!(retention_interval_days(i32::MAX as u32).unwrap(), i32::MAX);
        assert!(matches!(
            retention_interval_days(u32::MAX),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn page_offset_saturates() {
        assert_eq!(page_offset(1, 50), 0);
        assert_eq!(page_offset(3, 50), 100);
        assert_eq!(page_offset(0, 50), 0);
        assert_eq!(page_offset(i64::MIN, 200), 0);
        assert_eq!(page_offset(i64::MAX, 200), i64::MAX);
    }

    #[test]
    fn where_clause_numbers_placeholders_from_offset() {
        assert_eq!(where_clause(&params(None, None), 1), "");
        assert_eq!(
            where_clause(&params(None, Some("openai/gpt-4")), 3),
            "WHERE model_used = $3"
        );
        assert_eq!(
            where_clause(&params(Some(Uuid::nil()), Some("openai/gpt-4")), 1),
            "WHERE api_key_id = $1 AND model_used = $2"
        );
        assert_eq!(
            where_clause(&params(Some(Uuid::nil()), None), 3),
            "WHERE api_key_id = $3"
        );
    }
}
