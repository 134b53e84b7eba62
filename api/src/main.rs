use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod broker;
mod config;
mod error;
mod extract;
mod middleware;
mod repository;
mod routes;
mod state;

use broker::postgres::{PgSessionDirectory, PgUserInputStore};
use broker::{BrokerService, BrokerSettings};
use config::ApiConfig;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Handoff API",
        version = "0.1.0",
        description = "Brokers questions from agent tools to the humans who own the session, and hands their answers back."
    ),
    paths(
        routes::health::health_check,
        routes::internal_user_input_requests::create_user_input_request,
        routes::internal_user_input_requests::get_user_input_request,
        routes::internal_user_input_requests::list_session_user_input_requests,
        routes::user_input_requests::list_pending_user_input_requests,
        routes::user_input_requests::answer_user_input_request,
    ),
    components(schemas(
        routes::health::HealthResponse,
        handoff_core::error::ApiError,
        handoff_core::user_input::UserInputStatus,
        handoff_core::user_input::UserInputRequest,
        handoff_core::user_input::CreateUserInputRequest,
        handoff_core::user_input::AnswerUserInputRequest,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
        components.add_security_scheme(
            "internal_token",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Internal-Token"))),
        );
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "handoff_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = match ApiConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    if config.internal_api_token.is_none() {
        tracing::warn!("HANDOFF_INTERNAL_API_TOKEN is not set; internal routes will refuse every call");
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let default_ttl = chrono::Duration::from_std(config.user_input_ttl)
        .unwrap_or_else(|_| BrokerSettings::default().default_ttl);
    let broker = Arc::new(BrokerService::new(
        Arc::new(PgUserInputStore::new(pool.clone())),
        Arc::new(PgSessionDirectory::new(pool.clone())),
        BrokerSettings { default_ttl },
    ));

    match config.expiry_sweep_interval {
        Some(period) => {
            tracing::info!(period_secs = period.as_secs(), "starting expiry sweeper");
            broker::sweeper::spawn_expiry_sweeper(broker.clone(), period);
        }
        None => tracing::info!("expiry sweeper disabled"),
    }

    let app_state = state::AppState {
        db: pool,
        broker,
        internal_token: auth::InternalToken::from_secret(config.internal_api_token.as_deref()),
    };

    let cors_layer = middleware::cors::build_cors_layer(&config.cors_origins);

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(
            routes::internal_user_input_requests::router()
                .layer(middleware::rate_limit::internal_layer()),
        )
        .merge(
            routes::user_input_requests::router().layer(middleware::rate_limit::public_layer()),
        )
        .layer(middleware::access_log::AccessLogLayer::new(
            app_state.db.clone(),
        ))
        .layer(auth::InjectAuthLayer::new(app_state.db.clone()))
        .layer(axum::middleware::from_fn(middleware::security_headers::apply))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .option_layer(config.require_https.then(|| {
                    axum::middleware::from_fn(middleware::https::require_https)
                }))
                .layer(cors_layer),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Handoff API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
