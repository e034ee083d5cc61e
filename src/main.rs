use axum::{
    http::HeaderValue,
    middleware as axum_mw,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod cache;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;

use cache::Cache;
use config::Config;
use middleware::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub cache: Cache,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimiter,
    pub booking_rate_limiter: RateLimiter,
}

fn build_router(state: AppState) -> Router {
    let cors = if state.config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // --- Auth routes (no auth required) ---
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    // --- Authenticated routes ---
    let booking_routes = Router::new()
        .route(
            "/",
            post(routes::bookings::create_booking).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::rate_limit::booking_rate_limit,
            )),
        )
        .route(
            "/",
            get(routes::bookings::list_bookings).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::roles::require_owner,
            )),
        )
        .route(
            "/:id/payment",
            put(routes::bookings::update_payment).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::roles::require_manager,
            )),
        )
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let stadium_routes = Router::new()
        .route(
            "/",
            post(routes::stadiums::create_stadium).get(routes::stadiums::list_stadiums),
        )
        .route(
            "/:id",
            put(routes::stadiums::update_stadium).delete(routes::stadiums::delete_stadium),
        )
        .route(
            "/status-count",
            get(routes::stadiums::status_count).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::roles::require_admin,
            )),
        )
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let stats_routes = Router::new()
        .route("/stadiums", get(routes::stats::stadium_stats))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::roles::require_owner,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let team_routes = Router::new()
        .route(
            "/",
            post(routes::teams::create_team).get(routes::teams::list_teams),
        )
        .route(
            "/:id/members",
            get(routes::teams::list_members).post(routes::teams::add_member),
        )
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // --- Compose full API ---
    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/bookings", booking_routes)
        .nest("/stadiums", stadium_routes)
        .nest("/stats", stats_routes)
        .nest("/teams", team_routes);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health::health))
        // Global middleware
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    let pool = db::create_pool(&config).await;
    db::run_migrations(&pool).await;
    let cache = Cache::new(&config).await;
    let rate_limiter =
        RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window_secs);
    let booking_rate_limiter =
        RateLimiter::new(config.rate_limit.booking_max, config.rate_limit.window_secs);

    let port = config.port;
    let state = AppState {
        db: pool,
        cache,
        config: Arc::new(config),
        rate_limiter,
        booking_rate_limiter,
    };

    let router = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    tracing::info!(%addr, "stadium booking API listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
