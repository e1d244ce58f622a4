use serde::{Deserialize, Serialize};

/// Claims carried by a Keycloak access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
    /// Session id on current Keycloak releases.
    #[serde(default)]
    pub sid: Option<String>,
    /// Session id on older Keycloak releases.
    #[serde(default)]
    pub session_state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// The authenticated caller, placed in request extensions by the bearer middleware.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub roles: Vec<String>,
    #[serde(skip)]
    pub session_id: Option<String>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            username: claims.preferred_username.unwrap_or_else(|| claims.sub.clone()),
            id: claims.sub,
            email: claims.email,
            first_name: claims.given_name,
            last_name: claims.family_name,
            roles: claims.realm_access.map(|access| access.roles).unwrap_or_default(),
            session_id: claims.sid.or(claims.session_state),
        }
    }
}

impl AuthUser {
    pub fn display_name(&self) -> String {
        display_name(
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            &self.username,
        )
    }
}

/// "First Last" when both names are present, otherwise the username.
pub fn display_name(first: Option<&str>, last: Option<&str>, username: &str) -> String {
    match (first, last) {
        (Some(first), Some(last)) if !first.is_empty() && !last.is_empty() => {
            format!("{first} {last}")
        }
        _ => username.to_string(),
    }
}
