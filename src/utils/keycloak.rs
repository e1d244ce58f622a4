//! Client for the realm's OpenID Connect endpoints and the Keycloak Admin REST API.

use std::time::{Duration, Instant};

use derive_more::Display;
use reqwest::{header, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::KeycloakConfig;
use crate::models::keycloak::{
    FederatedIdentity, KeycloakUser, NewKeycloakUser, PasswordCredential, RoleRepresentation,
    TokenResponse, UserInfo, UserSession, UserUpdate,
};

/// Admin tokens are renewed this long before Keycloak would expire them.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(10);

#[derive(Debug, Display)]
pub enum KeycloakError {
    #[display(fmt = "keycloak answered {}: {}", status, body)]
    Status { status: StatusCode, body: String },
    #[display(fmt = "keycloak request failed: {}", _0)]
    Transport(reqwest::Error),
    #[display(fmt = "unexpected keycloak response: {}", _0)]
    Protocol(String),
}

impl std::error::Error for KeycloakError {}

impl KeycloakError {
    pub fn status(&self) -> Option<u16> {
        match self {
            KeycloakError::Status { status, .. } => Some(status.as_u16()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for KeycloakError {
    fn from(err: reqwest::Error) -> Self {
        KeycloakError::Transport(err)
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct KeycloakClient {
    http: reqwest::Client,
    config: KeycloakConfig,
    admin_token: Mutex<Option<CachedToken>>,
}

impl KeycloakClient {
    pub fn new(config: KeycloakConfig) -> Self {
        KeycloakClient {
            http: reqwest::Client::new(),
            config,
            admin_token: Mutex::new(None),
        }
    }

    fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.config.issuer())
    }

    /// Admin API URL with every segment percent-encoded.
    fn admin_url(&self, segments: &[&str]) -> Result<Url, KeycloakError> {
        let base = format!(
            "{}/admin/realms/{}",
            self.config.url.trim_end_matches('/'),
            self.config.realm
        );
        let mut url = Url::parse(&base).map_err(|e| KeycloakError::Protocol(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| KeycloakError::Protocol(format!("{base} cannot be a base URL")))?
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response, KeycloakError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(KeycloakError::Status { status, body })
    }

    // ---- OpenID Connect ----

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse, KeycloakError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self.http.post(self.token_url()).form(&form).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Returns Keycloak's token response untouched.
    pub async fn refresh(&self, refresh_token: &str) -> Result<serde_json::Value, KeycloakError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self.http.post(self.token_url()).form(&form).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<(), KeycloakError> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        let url = format!("{}/protocol/openid-connect/logout", self.config.issuer());
        let response = self.http.post(url).form(&form).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn userinfo(&self, access_token: &str) -> Result<UserInfo, KeycloakError> {
        let url = format!("{}/protocol/openid-connect/userinfo", self.config.issuer());
        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    // ---- Admin REST API ----

    /// Client-credentials token for the admin client, cached until shortly before expiry.
    pub async fn admin_token(&self) -> Result<String, KeycloakError> {
        let mut cached = self.admin_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.admin_client_id.as_str()),
            ("client_secret", self.config.admin_client_secret.as_str()),
        ];
        let response = self.http.post(self.token_url()).form(&form).send().await?;
        let token: TokenResponse = Self::check(response).await?.json().await?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(60).max(0) as u64);
        debug!(expires_in = lifetime.as_secs(), "obtained keycloak admin token");
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });

        Ok(token.access_token)
    }

    async fn send_admin<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Response, KeycloakError> {
        let token = self.admin_token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::check(request.send().await?).await
    }

    /// Sends an admin call. A 401 drops the cached token and the call is retried once.
    async fn admin_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Response, KeycloakError> {
        match self.send_admin(method.clone(), url.clone(), body).await {
            Err(KeycloakError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED => {
                warn!(url = %url, "admin token rejected, fetching a new one");
                self.admin_token.lock().await.take();
                self.send_admin(method, url, body).await
            }
            other => other,
        }
    }

    async fn admin_get<T: DeserializeOwned>(&self, url: Url) -> Result<T, KeycloakError> {
        let response = self.admin_request::<()>(Method::GET, url, None).await?;
        Ok(response.json().await?)
    }

    pub async fn list_users(&self, search: Option<&str>, max: i64) -> Result<Vec<KeycloakUser>, KeycloakError> {
        let mut url = self.admin_url(&["users"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("max", &max.to_string());
            if let Some(search) = search.filter(|s| !s.is_empty()) {
                query.append_pair("search", search);
            }
        }
        self.admin_get(url).await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<KeycloakUser>, KeycloakError> {
        let mut url = self.admin_url(&["users"])?;
        url.query_pairs_mut()
            .append_pair("username", username)
            .append_pair("exact", "true");
        let users: Vec<KeycloakUser> = self.admin_get(url).await?;
        Ok(users.into_iter().next())
    }

    pub async fn get_user(&self, id: &str) -> Result<KeycloakUser, KeycloakError> {
        self.admin_get(self.admin_url(&["users", id])?).await
    }

    /// Creates the user and returns its id.
    pub async fn create_user(&self, user: &NewKeycloakUser) -> Result<String, KeycloakError> {
        let url = self.admin_url(&["users"])?;
        let response = self.admin_request(Method::POST, url, Some(user)).await?;

        let from_location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| location.rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(String::from);

        if let Some(id) = from_location {
            return Ok(id);
        }

        warn!(username = %user.username, "created user without Location header, searching by username");
        self.find_by_username(&user.username)
            .await?
            .map(|found| found.id)
            .ok_or_else(|| KeycloakError::Protocol("user created but could not retrieve its id".to_string()))
    }

    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<(), KeycloakError> {
        let url = self.admin_url(&["users", id])?;
        self.admin_request(Method::PUT, url, Some(update)).await?;
        Ok(())
    }

    pub async fn reset_password(&self, id: &str, password: &str) -> Result<(), KeycloakError> {
        let url = self.admin_url(&["users", id, "reset-password"])?;
        let credential = PasswordCredential::permanent(password);
        self.admin_request(Method::PUT, url, Some(&credential)).await?;
        Ok(())
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), KeycloakError> {
        let url = self.admin_url(&["users", id])?;
        self.admin_request::<()>(Method::DELETE, url, None).await?;
        Ok(())
    }

    pub async fn federated_identities(&self, id: &str) -> Result<Vec<FederatedIdentity>, KeycloakError> {
        self.admin_get(self.admin_url(&["users", id, "federated-identity"])?).await
    }

    pub async fn realm_role_mappings(&self, id: &str) -> Result<Vec<RoleRepresentation>, KeycloakError> {
        self.admin_get(self.admin_url(&["users", id, "role-mappings", "realm"])?).await
    }

    pub async fn user_sessions(&self, id: &str) -> Result<Vec<UserSession>, KeycloakError> {
        self.admin_get(self.admin_url(&["users", id, "sessions"])?).await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), KeycloakError> {
        let url = self.admin_url(&["sessions", session_id])?;
        self.admin_request::<()>(Method::DELETE, url, None).await?;
        Ok(())
    }
}
