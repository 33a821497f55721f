//! Reading Billing server
//!
//! ## REST Endpoints
//!
//! - `GET /billing/plans` - Active plans
//! - `GET /billing/subscription` - Current plan and subscription
//! - `POST /billing/checkout` - Create checkout session
//! - `POST /billing/subscription/cancel` - Cancel at period end
//! - `POST /billing/subscription/reactivate` - Undo a pending cancel
//! - `POST /billing/portal` - Create customer portal session
//! - `GET /billing/payments` - Payment history
//! - `GET /billing/limits/:resource` - Plan-limit check
//! - `POST /billing/usage/custom-modules` - Count a custom module
//! - `POST /billing/plans/sync` - Re-import the Stripe catalog (admin)
//! - `POST /webhooks/stripe` - Stripe webhook receiver

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use chrono::Utc;
use sqlx::PgPool;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use reading_billing::adapters::http::billing::{billing_router, BillingAppState, BillingSettings};
use reading_billing::adapters::postgres::{
    PostgresPaymentHistoryRepository, PostgresPlanRepository, PostgresProfileRepository,
    PostgresSubscriptionRepository, PostgresWebhookEventRepository,
};
use reading_billing::adapters::stripe::{StripeConfig, StripePaymentGateway};
use reading_billing::config::{AppConfig, ServerConfig};

/// Webhook ledger entries older than this are purged.
const WEBHOOK_RETENTION_DAYS: i64 = 30;
const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.server)?;
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        test_mode = config.payment.is_test_mode(),
        "Starting Reading Billing"
    );

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let state = build_state(&config, pool);
    spawn_ledger_purge(state.clone());

    let app = build_router(state, &config.server);
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(server: &ServerConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&server.log_level))?;

    if server.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

fn build_state(config: &AppConfig, pool: PgPool) -> BillingAppState {
    BillingAppState {
        subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        plans: Arc::new(PostgresPlanRepository::new(pool.clone())),
        payments: Arc::new(PostgresPaymentHistoryRepository::new(pool.clone())),
        profiles: Arc::new(PostgresProfileRepository::new(pool.clone())),
        webhook_events: Arc::new(PostgresWebhookEventRepository::new(pool)),
        gateway: Arc::new(StripePaymentGateway::new(StripeConfig::from(&config.payment))),
        settings: BillingSettings::from(&config.payment),
    }
}

fn build_router(state: BillingAppState, server: &ServerConfig) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors_layer(server))
        .layer(TimeoutLayer::new(server.request_timeout()));

    billing_router().layer(middleware).with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new().allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

fn spawn_ledger_purge(state: BillingAppState) {
    tokio::spawn(async move {
        let intake = state.webhook_handler();
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let cutoff = Utc::now() - chrono::Duration::days(WEBHOOK_RETENTION_DAYS);
            if let Err(e) = intake.purge_before(cutoff).await {
                tracing::error!(error = %e, "Failed to purge webhook ledger");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
