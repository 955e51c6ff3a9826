mod config;
mod error;
mod gateway;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware as axum_mw, routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use config::Config;
use gateway::Gateway;
use middleware::rate_limit::{rate_limit, RateLimiter};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if missing)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!("Starting notebook LLM gateway on {}", config.listen_addr);

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations applied");

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let mut redis = redis_client.get_connection_manager().await?;
    tracing::info!("Connected to Redis");

    services::key_service::warm_up_redis(&db, &mut redis).await?;

    // One client for every upstream call; timeouts are set per request.
    let http = reqwest::Client::builder().build()?;
    let gateway = Gateway::from_config(&config, http);

    let state = Arc::new(AppState {
        db,
        redis: redis.clone(),
        config: config.clone(),
        gateway,
    });

    if config.usage_retention_days > 0 {
        let retention_db = state.db.clone();
        let retention_days = config.usage_retention_days;
        tokio::spawn(async move {
            // Run cleanup once on startup, then every hour
            loop {
                match services::usage_service::cleanup_old_usage(&retention_db, retention_days)
                    .await
                {
                    Ok(n) if n > 0 => {
                        tracing::info!(
                            "Cleaned up {} usage records older than {} days",
                            n,
                            retention_days
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Usage cleanup error: {}", e);
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            }
        });
    }

    let provider_limiter = RateLimiter::new(redis.clone(), "providers", config.rate_limit_per_minute);
    let generate_limiter =
        RateLimiter::new(redis, "generate", config.generate_rate_limit_per_minute);

    // Later route_layer calls wrap earlier ones, so auth runs before the
    // limiter and the limiter can count per user.
    let admin_routes = routes::admin::router().route_layer(axum_mw::from_fn_with_state(
        state.clone(),
        middleware::auth::admin_auth,
    ));

    let public_routes = routes::providers::router()
        .route_layer(axum_mw::from_fn_with_state(
            provider_limiter.clone(),
            rate_limit,
        ))
        .route_layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::optional_auth,
        ));

    let refresh_routes = routes::providers::protected_router()
        .route_layer(axum_mw::from_fn_with_state(provider_limiter, rate_limit))
        .route_layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let generate_routes = routes::generate::router()
        .route_layer(axum_mw::from_fn_with_state(generate_limiter, rate_limit))
        .route_layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let api_routes = Router::new()
        .merge(public_routes)
        .merge(refresh_routes)
        .merge(generate_routes);

    let app = Router::new()
        .route("/health", get(routes::health))
        .nest("/api/v1", api_routes)
        .nest("/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("Listening on {}", config.listen_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
