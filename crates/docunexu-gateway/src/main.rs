use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docunexu_gateway::{
    config::{GatewayConfig, StoreBackend},
    metrics::register_metrics,
    routes,
    state::AppState,
    store::{BalanceStore, CredentialValidator, RestStore, SqliteStore, UsageLog},
    Gateway,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing master key or malformed setting stops the process here,
    // before any request is accepted.
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!("Starting docunexu-gateway on port {}", config.port);
    tracing::info!("Upstream: {}", config.upstream_base_url);
    tracing::info!(
        "Sandbox token: {}",
        if config.sandbox_token.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );

    register_metrics();

    match config.store.clone() {
        StoreBackend::Sqlite { db_path } => {
            let store = SqliteStore::open(&db_path).expect("Failed to initialize database");
            tracing::info!("Database initialized at: {}", db_path);
            serve(config, store.clone(), store.clone(), store).await
        }
        StoreBackend::Rest { base_url, service_key } => {
            let store =
                RestStore::new(&base_url, &service_key).expect("Failed to create store client");
            tracing::info!("Using hosted account store at: {}", base_url);
            serve(config, store.clone(), store.clone(), store).await
        }
    }
}

async fn serve<C, B, U>(
    config: GatewayConfig,
    credentials: C,
    balances: B,
    usage: U,
) -> std::io::Result<()>
where
    C: CredentialValidator + 'static,
    B: BalanceStore + 'static,
    U: UsageLog + 'static,
{
    let gateway = match Gateway::new(&config, credentials, balances, usage) {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!("Failed to build gateway: {e}");
            std::process::exit(1);
        }
    };

    let port = config.port;
    let allowed_origins = config.allowed_origins.clone();

    // Configure rate limiter
    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm as u64)
        .finish()
        .expect("Failed to create rate limiter config");

    let state_data = web::Data::new(AppState::new(config, gateway));

    HttpServer::new(move || {
        let cors = docunexu_gateway::cors::build_cors(&allowed_origins);

        App::new()
            .app_data(state_data.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Governor::new(&governor_conf))
            .configure(routes::configure::<C, B, U>)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
