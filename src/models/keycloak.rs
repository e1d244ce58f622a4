//! Representations exchanged with Keycloak's OIDC and Admin REST endpoints,
//! plus the shapes this API returns for them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use validator::Validate;

use super::user::display_name;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub enabled: bool,
    pub created_timestamp: Option<i64>,
}

impl From<&KeycloakUser> for UserSummary {
    fn from(user: &KeycloakUser) -> Self {
        UserSummary {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            email_verified: user.email_verified,
            first_name: user.first_name.clone().unwrap_or_default(),
            last_name: user.last_name.clone().unwrap_or_default(),
            display_name: display_name(
                user.first_name.as_deref(),
                user.last_name.as_deref(),
                &user.username,
            ),
            enabled: user.enabled,
            created_timestamp: user.created_timestamp,
        }
    }
}

/// Partial user update. Absent fields are left untouched by Keycloak.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub enabled: Option<bool>,
    pub email_verified: Option<bool>,
}

impl UserUpdate {
    pub fn trimmed(self) -> Self {
        let trim = |value: Option<String>| value.map(|v| v.trim().to_string());
        UserUpdate {
            first_name: trim(self.first_name),
            last_name: trim(self.last_name),
            email: trim(self.email),
            ..self
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == UserUpdate::default()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewKeycloakUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub enabled: bool,
    pub email_verified: bool,
    pub required_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordCredential<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: &'a str,
    pub temporary: bool,
}

impl<'a> PasswordCredential<'a> {
    pub fn permanent(value: &'a str) -> Self {
        PasswordCredential {
            kind: "password",
            value,
            temporary: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedIdentity {
    pub identity_provider: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccount {
    pub provider: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl From<&FederatedIdentity> for LinkedAccount {
    fn from(identity: &FederatedIdentity) -> Self {
        LinkedAccount {
            provider: identity.identity_provider.clone(),
            user_id: identity.user_id.clone(),
            user_name: identity.user_name.clone(),
        }
    }
}

/// Name of the provider a user signed up through; local accounts report "keycloak".
pub fn primary_identity_provider(identities: &[FederatedIdentity]) -> String {
    identities
        .first()
        .map(|identity| identity.identity_provider.clone())
        .unwrap_or_else(|| "keycloak".to_string())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub last_access: i64,
    #[serde(default)]
    pub clients: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRepresentation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_update_skips_absent_fields() {
        let update = UserUpdate {
            first_name: Some("  Ayu ".into()),
            enabled: Some(false),
            ..Default::default()
        }
        .trimmed();

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "firstName": "Ayu", "enabled": false }));
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(UserUpdate::default().is_empty());
        assert!(!UserUpdate { email: Some("a@b.c".into()), ..Default::default() }.is_empty());
    }

    #[test]
    fn update_email_must_look_like_an_address() {
        let update = |email: &str| UserUpdate { email: Some(email.into()), ..Default::default() }.trimmed();
        assert!(update(" ayu@jogjaprov.go.id ").validate().is_ok());
        assert!(update("ayu@").validate().is_err());
        assert!(update("ayu jogja@prov.id").validate().is_err());
        assert!(UserUpdate::default().validate().is_ok());
    }

    #[test]
    fn password_credential_uses_keycloak_field_names() {
        let json = serde_json::to_value(PasswordCredential::permanent("s3cret-pass")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "password", "value": "s3cret-pass", "temporary": false })
        );
    }

    #[test]
    fn primary_provider_defaults_to_keycloak() {
        assert_eq!(primary_identity_provider(&[]), "keycloak");

        let google = FederatedIdentity {
            identity_provider: "google".into(),
            user_id: Some("1".into()),
            user_name: None,
        };
        assert_eq!(primary_identity_provider(&[google]), "google");
    }

    #[test]
    fn summary_builds_display_name() {
        let user = KeycloakUser {
            id: "id-1".into(),
            username: "rina".into(),
            first_name: Some("Rina".into()),
            last_name: Some("Wati".into()),
            ..Default::default()
        };
        let summary = UserSummary::from(&user);
        assert_eq!(summary.display_name, "Rina Wati");

        let bare = KeycloakUser { id: "id-2".into(), username: "joko".into(), ..Default::default() };
        let summary = UserSummary::from(&bare);
        assert_eq!(summary.display_name, "joko");
        assert_eq!(summary.first_name, "");
    }

    #[test]
    fn session_parses_admin_api_payload() {
        let session: UserSession = serde_json::from_value(serde_json::json!({
            "id": "s1",
            "username": "rina",
            "userId": "u1",
            "ipAddress": "10.0.0.5",
            "start": 1_700_000_000_000i64,
            "lastAccess": 1_700_000_100_000i64,
            "rememberMe": false,
            "clients": { "c1": "pemda-dashboard" }
        }))
        .unwrap();
        assert_eq!(session.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(session.clients.len(), 1);
    }
}
