use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripway::{
    AppState,
    config::Config,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    routes,
    routes::chat::hub::ChatHub,
    storage::ObjectStorage,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'tripway_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client.clone());

    let http = reqwest::Client::new();
    let storage = Arc::new(ObjectStorage::new(&config, http.clone()));
    let hub = Arc::new(ChatHub::new());

    let state = AppState {
        pool,
        config: config.clone(),
        redis: redis_arc,
        storage,
        hub,
        http,
    };

    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    let public_routes = Router::new()
        // Accounts
        .route("/members/register", post(routes::member::register))
        .route("/members/login", post(routes::member::login))
        .route("/members/social-login", post(routes::member::social_login))
        .route("/members/refresh-token", post(routes::member::refresh_token))
        .route("/members/reset-password", post(routes::member::reset_password))
        // Email verification
        .route("/emails/send-verification", post(routes::email::send_verification))
        .route("/emails/verify", post(routes::email::verify))
        // Travel place discovery
        .route("/travels", get(routes::place::list))
        .route("/travels/search", get(routes::place::search))
        .route("/travels/nearby", get(routes::place::nearby))
        .route("/travels/{place_id}", get(routes::place::find_by_id));

    let protected_routes = Router::new()
        // Accounts
        .route("/members/me", get(routes::member::me))
        .route("/members/logout", post(routes::member::logout))
        .route("/members/nickname", put(routes::member::update_nickname))
        .route("/members/password", put(routes::member::change_password))
        .route("/members", delete(routes::member::deactivate))
        // Bookmarks
        .route("/bookmarks", post(routes::bookmark::create_bookmark))
        .route("/bookmarks", get(routes::bookmark::list_bookmarks))
        .route("/bookmarks/{place_id}", delete(routes::bookmark::delete_bookmark))
        // Schedules
        .route("/schedules", post(routes::schedule::create_schedule))
        .route("/schedules", get(routes::schedule::list_schedules))
        .route("/schedules/{schedule_id}", get(routes::schedule::get_schedule))
        .route("/schedules/{schedule_id}", put(routes::schedule::update_schedule))
        .route("/schedules/{schedule_id}", delete(routes::schedule::delete_schedule))
        .route("/schedules/{schedule_id}/routes", put(routes::schedule::replace_routes))
        // Attendees
        .route("/schedules/{schedule_id}/attendees", get(routes::schedule::list_attendees))
        .route("/schedules/{schedule_id}/attendees", post(routes::schedule::add_attendee))
        .route(
            "/schedules/{schedule_id}/attendees/me",
            delete(routes::schedule::leave_schedule),
        )
        .route(
            "/schedules/{schedule_id}/attendees/{member_id}/permission",
            put(routes::schedule::update_permission),
        )
        .route(
            "/schedules/{schedule_id}/attendees/{member_id}",
            delete(routes::schedule::remove_attendee),
        )
        // Chat history
        .route("/schedules/{schedule_id}/messages", get(routes::chat::get_messages))
        // Profile images
        .route("/profiles/image", post(routes::profile::upload_image))
        .route("/profiles/image", delete(routes::profile::delete_image))
        // Image uploads outgrow axum's default body limit.
        .layer(axum::extract::DefaultBodyLimit::max(
            config.max_upload_bytes + 4096,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let router = Router::new()
        .nest(
            &config.api_base_uri.clone(),
            Router::new().merge(public_routes).merge(protected_routes),
        )
        // The socket authenticates during the handshake instead of going
        // through the HTTP auth middleware.
        .route("/ws", get(routes::chat::ws_handler));

    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    let app = router.with_state(state.clone());

    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
