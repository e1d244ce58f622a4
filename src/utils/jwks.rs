//! Verification of Keycloak-issued access tokens against the realm's JWKS.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use derive_more::Display;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::KeycloakConfig;
use crate::models::user::Claims;

/// Unknown `kid`s trigger at most one JWKS download per interval.
const REFETCH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Display, PartialEq, Eq)]
pub enum TokenError {
    #[display(fmt = "token expired")]
    Expired,
    #[display(fmt = "invalid token: {}", _0)]
    Invalid(String),
}

impl TokenError {
    /// Text sent to the client.
    pub fn public_message(&self) -> &'static str {
        match self {
            TokenError::Expired => "Token expired",
            TokenError::Invalid(_) => "Invalid token",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ec,
    Hmac,
}

impl KeyFamily {
    fn accepts(self, alg: Algorithm) -> bool {
        use Algorithm::*;
        match self {
            KeyFamily::Rsa => matches!(alg, RS256 | RS384 | RS512 | PS256 | PS384 | PS512),
            KeyFamily::Ec => matches!(alg, ES256 | ES384),
            KeyFamily::Hmac => matches!(alg, HS256 | HS384 | HS512),
        }
    }

    fn of(jwk: &Jwk) -> Option<KeyFamily> {
        match jwk.algorithm {
            AlgorithmParameters::RSA(_) => Some(KeyFamily::Rsa),
            AlgorithmParameters::EllipticCurve(_) => Some(KeyFamily::Ec),
            AlgorithmParameters::OctetKey(_) => Some(KeyFamily::Hmac),
            _ => None,
        }
    }
}

#[derive(Clone)]
struct VerifyingKey {
    key: DecodingKey,
    family: KeyFamily,
}

pub struct JwtVerifier {
    http: reqwest::Client,
    certs_url: String,
    issuer: String,
    keys: RwLock<HashMap<String, VerifyingKey>>,
    last_fetch: Mutex<Option<Instant>>,
}

impl JwtVerifier {
    pub fn new(config: &KeycloakConfig) -> Self {
        JwtVerifier::with_urls(config.certs_url(), config.issuer())
    }

    pub fn with_urls(certs_url: String, issuer: String) -> Self {
        JwtVerifier {
            http: reqwest::Client::new(),
            certs_url,
            issuer,
            keys: RwLock::new(HashMap::new()),
            last_fetch: Mutex::new(None),
        }
    }

    /// Registers a key directly, bypassing the JWKS endpoint.
    #[cfg(test)]
    pub async fn insert_key(&self, kid: &str, key: DecodingKey, family: KeyFamily) {
        self.keys
            .write()
            .await
            .insert(kid.to_string(), VerifyingKey { key, family });
    }

    #[cfg(test)]
    pub async fn has_key(&self, kid: &str) -> bool {
        self.keys.read().await.contains_key(kid)
    }

    /// Downloads the realm's JWKS and replaces the cached keys.
    ///
    /// Entries that cannot be turned into a decoding key (unsupported `kty`,
    /// encryption-only keys, malformed members) are skipped.
    pub async fn refresh_keys(&self) -> Result<usize, TokenError> {
        let body: serde_json::Value = self
            .http
            .get(&self.certs_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| TokenError::Invalid(format!("JWKS unavailable: {e}")))?
            .json()
            .await
            .map_err(|e| TokenError::Invalid(format!("JWKS unreadable: {e}")))?;

        let fetched = parse_jwks(&body);
        let count = fetched.len();
        *self.keys.write().await = fetched;
        info!(keys = count, url = %self.certs_url, "loaded signing keys");
        Ok(count)
    }

    async fn key_for(&self, kid: &str) -> Result<VerifyingKey, TokenError> {
        if let Some(key) = self.keys.read().await.get(kid) {
            return Ok(key.clone());
        }

        {
            let mut last_fetch = self.last_fetch.lock().await;
            let due = last_fetch.map_or(true, |at| at.elapsed() >= REFETCH_INTERVAL);
            if due {
                *last_fetch = Some(Instant::now());
                debug!(kid, "unknown key id, refetching JWKS");
                if let Err(err) = self.refresh_keys().await {
                    warn!(error = %err, "could not refresh signing keys");
                }
            }
        }

        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| TokenError::Invalid(format!("unknown key id {kid}")))
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Invalid(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| TokenError::Invalid("token header has no kid".to_string()))?;

        let key = self.key_for(&kid).await?;
        if !key.family.accepts(header.alg) {
            return Err(TokenError::Invalid(format!("{:?} not allowed for key {kid}", header.alg)));
        }

        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<Claims>(token, &key.key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}

fn parse_jwks(body: &serde_json::Value) -> HashMap<String, VerifyingKey> {
    let entries = body
        .get("keys")
        .and_then(|keys| keys.as_array())
        .cloned()
        .unwrap_or_default();

    let mut keys = HashMap::new();
    for entry in entries {
        let jwk: Jwk = match serde_json::from_value(entry) {
            Ok(jwk) => jwk,
            Err(e) => {
                debug!(error = %e, "skipping unparsable JWK");
                continue;
            }
        };
        let (Some(kid), Some(family)) = (jwk.common.key_id.clone(), KeyFamily::of(&jwk)) else {
            continue;
        };
        match DecodingKey::from_jwk(&jwk) {
            Ok(key) => {
                keys.insert(kid, VerifyingKey { key, family });
            }
            Err(e) => debug!(kid, error = %e, "skipping unusable JWK"),
        }
    }
    keys
}

#[cfg(test)]
pub mod testing {
    //! HS256 tokens for tests, accepted by a verifier prepared with [`verifier`].

    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;
    use crate::models::user::RealmAccess;

    pub const ISSUER: &str = "http://keycloak.test/realms/Jogja-SSO";
    pub const KID: &str = "test-key";
    const SECRET: &[u8] = b"test-secret";

    /// Verifier with the test key registered and an unreachable JWKS endpoint.
    pub async fn verifier() -> JwtVerifier {
        let verifier = JwtVerifier::with_urls("http://127.0.0.1:9/certs".into(), ISSUER.into());
        verifier
            .insert_key(KID, DecodingKey::from_secret(SECRET), KeyFamily::Hmac)
            .await;
        verifier
    }

    pub fn claims(sub: &str, roles: &[&str]) -> Claims {
        Claims {
            sub: sub.to_string(),
            exp: (Utc::now() + Duration::minutes(10)).timestamp() as usize,
            iss: Some(ISSUER.to_string()),
            preferred_username: Some(format!("user-{sub}")),
            email: Some(format!("{sub}@jogjaprov.go.id")),
            given_name: None,
            family_name: None,
            realm_access: Some(RealmAccess {
                roles: roles.iter().map(|r| r.to_string()).collect(),
            }),
            sid: Some(format!("session-{sub}")),
            session_state: None,
        }
    }

    pub fn sign(claims: &Claims) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(KID.to_string());
        encode(&header, claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    pub fn token(sub: &str, roles: &[&str]) -> String {
        sign(&claims(sub, roles))
    }
}
