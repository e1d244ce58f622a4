mod config;
mod handlers;
mod message;
mod models;
mod routes;
mod utils;

#[cfg(test)]
mod tests;

use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::handlers::auth_handler::AdminPolicy;
use crate::handlers::health_handler::Uptime;
use crate::utils::jwks::JwtVerifier;
use crate::utils::keycloak::KeycloakClient;
use crate::utils::s3::{ObjectStore, S3Store};

#[actix_web::main]
async fn main() -> io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
    {
        eprintln!("tracing init failed: {e}");
    }

    let config = Config::from_env().map_err(|e| {
        error!(error = %e, "invalid configuration");
        io::Error::other(e.to_string())
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to connect to the database");
            io::Error::other(e.to_string())
        })?;
    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        error!(error = %e, "failed to run migrations");
        io::Error::other(e.to_string())
    })?;
    info!("database ready");

    let store = S3Store::new(&config.storage);
    if let Err(e) = store.ensure_bucket().await {
        warn!(error = %e, bucket = %config.storage.bucket, "object storage not ready, uploads will fail");
    }
    let store: Arc<dyn ObjectStore> = Arc::new(store);

    let verifier = JwtVerifier::new(&config.keycloak);
    match verifier.refresh_keys().await {
        Ok(count) => info!(count, "loaded realm signing keys"),
        Err(e) => warn!(error = %e, "could not load realm signing keys yet"),
    }

    let pool = web::Data::new(pool);
    let store = web::Data::from(store);
    let verifier = web::Data::new(verifier);
    let keycloak = web::Data::new(KeycloakClient::new(config.keycloak.clone()));
    let admin_policy = web::Data::new(AdminPolicy::new(config.admin_emails.clone()));
    let uptime = web::Data::new(Uptime::start());
    let port = config.port;
    let config = web::Data::new(config);

    info!(port, "starting server");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allowed_origin(&config.frontend_url)
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials()
                    .max_age(3600),
            )
            .app_data(routes::json_config())
            .app_data(routes::query_config())
            .app_data(routes::path_config())
            .app_data(pool.clone())
            .app_data(store.clone())
            .app_data(verifier.clone())
            .app_data(keycloak.clone())
            .app_data(admin_policy.clone())
            .app_data(uptime.clone())
            .app_data(config.clone())
            .configure(routes::config)
            .default_service(web::to(routes::not_found))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
