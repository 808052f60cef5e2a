use clinic_auth::configuration::get_configuration;
use clinic_auth::startup::{run, AppServices};
use clinic_auth::store::{PgStore, Repositories};
use clinic_auth::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    tracing::info!(
        host = %configuration.database.host,
        database = %configuration.database.database_name,
        "Attempting to connect to database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    let store = Arc::new(PgStore::new(pool));
    store.migrate().await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
    })?;
    tracing::info!("Database ready");

    let services = AppServices::new(&Repositories::from_shared(store), &configuration.jwt)
        .map_err(|e| {
            tracing::error!("Failed to build services: {}", e);
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
        })?;

    let address = configuration.application.address();
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, services)?.await
}
