use case_portal::{
    AppState, auth,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects and migrates the database, then
/// serves the router until the process is stopped.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load().expect("FATAL: invalid configuration");

    // RUST_LOG wins; otherwise verbose for this crate, quieter for the HTTP stack.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "case_portal=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // Self-registration only creates Writers; the first SP comes from config.
    if let Some(account) = &config.bootstrap_sp {
        match auth::ensure_bootstrap_sp(repo.as_ref(), account).await {
            Ok(Some(user)) => tracing::info!(user_id = %user.id, "bootstrap SP account created"),
            Ok(None) => tracing::debug!("bootstrap SP account already present"),
            Err(e) => panic!("FATAL: Failed to bootstrap the SP account: {}", e),
        }
    }

    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState { repo, config });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {}", e);
    }
}
