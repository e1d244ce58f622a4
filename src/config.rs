use std::env;
use std::str::FromStr;

use derive_more::Display;

#[derive(Debug, Display, PartialEq, Eq)]
pub enum ConfigError {
    #[display(fmt = "{} must be set", _0)]
    Missing(&'static str),
    #[display(fmt = "{} has an invalid value: {}", _0, _1)]
    Invalid(&'static str, String),
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub frontend_url: String,
    pub keycloak: KeycloakConfig,
    pub storage: StorageConfig,
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct KeycloakConfig {
    pub url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    pub admin_client_id: String,
    pub admin_client_secret: String,
}

impl KeycloakConfig {
    /// Token issuer, also the base of every OIDC endpoint of the realm.
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.url.trim_end_matches('/'), self.realm)
    }

    pub fn certs_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer())
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub port: u16,
    pub use_ssl: bool,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

impl StorageConfig {
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.endpoint, self.port)
    }
}

impl Config {
    /// Reads `.env` (when present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let client_id = required("KEYCLOAK_CLIENT_ID")?;
        let client_secret = or("KEYCLOAK_CLIENT_SECRET", "");

        Ok(Config {
            port: parse(&get, "PORT", 5000)?,
            database_url: required("DATABASE_URL")?,
            frontend_url: or("FRONTEND_URL", "http://localhost:3000"),
            keycloak: KeycloakConfig {
                url: required("KEYCLOAK_URL")?,
                realm: required("KEYCLOAK_REALM")?,
                admin_client_id: or("KEYCLOAK_ADMIN_CLIENT", &client_id),
                admin_client_secret: or("KEYCLOAK_ADMIN_SECRET", &client_secret),
                client_id,
                client_secret,
            },
            storage: StorageConfig {
                endpoint: or("MINIO_ENDPOINT", "localhost"),
                port: parse(&get, "MINIO_PORT", 9000)?,
                use_ssl: parse(&get, "MINIO_USE_SSL", false)?,
                access_key: or("MINIO_ACCESS_KEY", "minioadmin"),
                secret_key: or("MINIO_SECRET_KEY", "minioadmin"),
                bucket: or("MINIO_BUCKET", "pemda-documents"),
                region: or("MINIO_REGION", "us-east-1"),
            },
            admin_emails: get("ADMIN_EMAILS")
                .map(|list| {
                    list.split(',')
                        .map(|email| email.trim().to_lowercase())
                        .filter(|email| !email.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw)),
        None => Ok(default),
    }
}
