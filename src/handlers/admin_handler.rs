use actix_web::{delete, get, post, put, web, HttpResponse};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use validator::Validate;

use crate::message::{AppError, AppSuccess, ItemKind};
use crate::models::keycloak::{
    primary_identity_provider, FederatedIdentity, KeycloakUser, LinkedAccount, NewKeycloakUser,
    UserSummary, UserUpdate,
};
use crate::models::user::AuthUser;
use crate::models::{document, note};
use crate::utils::keycloak::KeycloakClient;
use crate::utils::s3::{object_key, ObjectStore};

const MAX_LISTED_USERS: i64 = 1000;
/// Federated-identity lookups in flight at once while listing users.
const IDENTITY_LOOKUPS: usize = 8;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedUser {
    #[serde(flatten)]
    pub summary: UserSummary,
    pub identity_provider: String,
    pub linked_accounts: Vec<LinkedAccount>,
}

impl ManagedUser {
    pub fn new(user: &KeycloakUser, identities: &[FederatedIdentity]) -> Self {
        ManagedUser {
            summary: UserSummary::from(user),
            identity_provider: primary_identity_provider(identities),
            linked_accounts: identities.iter().map(LinkedAccount::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserDataStats {
    pub documents: i64,
    pub notes: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedUserDetail {
    #[serde(flatten)]
    pub user: ManagedUser,
    pub active_sessions: usize,
    pub stats: UserDataStats,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub enabled: Option<bool>,
}

impl CreateUserRequest {
    /// The user to create and the initial password.
    pub fn into_new_user(self) -> Result<(NewKeycloakUser, String), AppError> {
        let trim = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let request = CreateUserRequest {
            username: trim(self.username),
            email: trim(self.email),
            password: self.password.filter(|p| !p.is_empty()),
            first_name: trim(self.first_name),
            last_name: trim(self.last_name),
            enabled: self.enabled,
        };

        if request.username.is_some() && request.email.is_some() && request.password.is_some() {
            request.validate()?;
        }
        let CreateUserRequest {
            username: Some(username),
            email: Some(email),
            password: Some(password),
            first_name,
            last_name,
            enabled,
        } = request
        else {
            return Err(AppError::BadRequest("Username, email and password are required".into()));
        };

        let user = NewKeycloakUser {
            username,
            email,
            first_name: first_name.unwrap_or_default(),
            last_name: last_name.unwrap_or_default(),
            enabled: enabled.unwrap_or(true),
            email_verified: true,
            required_actions: vec!["CONFIGURE_TOTP".to_string()],
        };
        Ok((user, password))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(
        required(message = "New password must be at least 8 characters long"),
        length(min = 8, message = "New password must be at least 8 characters long")
    )]
    pub new_password: Option<String>,
}

async fn identities_or_empty(keycloak: &KeycloakClient, user_id: &str) -> Vec<FederatedIdentity> {
    keycloak.federated_identities(user_id).await.unwrap_or_else(|err| {
        warn!(user_id, error = %err, "could not load federated identities");
        Vec::new()
    })
}

#[get("/users")]
pub async fn list_managed_users(keycloak: web::Data<KeycloakClient>) -> Result<HttpResponse, AppError> {
    let users = keycloak.list_users(None, MAX_LISTED_USERS).await?;

    let identities: Vec<Vec<FederatedIdentity>> = stream::iter(&users)
        .map(|user| identities_or_empty(&keycloak, &user.id))
        .buffered(IDENTITY_LOOKUPS)
        .collect()
        .await;
    let managed: Vec<ManagedUser> = users
        .iter()
        .zip(identities.iter())
        .map(|(user, identities)| ManagedUser::new(user, identities))
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "total": managed.len(),
        "users": managed,
    })))
}

#[get("/users/{id}")]
pub async fn managed_user_details(
    pool: web::Data<PgPool>,
    keycloak: web::Data<KeycloakClient>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let user = keycloak.get_user(&id).await?;
    let identities = identities_or_empty(&keycloak, &id).await;
    let active_sessions = match keycloak.user_sessions(&id).await {
        Ok(sessions) => sessions.len(),
        Err(err) => {
            warn!(user_id = %id, error = %err, "could not load sessions");
            0
        }
    };

    let documents = document::count_for_user(&pool, &id).await.unwrap_or_else(|err| {
        warn!(user_id = %id, error = %err, "could not count documents");
        0
    });
    let notes = note::count_for_user(&pool, &id).await.unwrap_or_else(|err| {
        warn!(user_id = %id, error = %err, "could not count notes");
        0
    });

    Ok(HttpResponse::Ok().json(ManagedUserDetail {
        user: ManagedUser::new(&user, &identities),
        active_sessions,
        stats: UserDataStats { documents, notes },
    }))
}

#[post("/users")]
pub async fn create_managed_user(
    admin: AuthUser,
    keycloak: web::Data<KeycloakClient>,
    payload: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, AppError> {
    let (new_user, password) = payload.into_inner().into_new_user()?;

    let id = keycloak.create_user(&new_user).await?;
    if let Err(err) = keycloak.reset_password(&id, &password).await {
        warn!(user_id = %id, error = %err, "initial password rejected, removing half-created user");
        if let Err(cleanup) = keycloak.delete_user(&id).await {
            warn!(user_id = %id, error = %cleanup, "could not remove half-created user");
        }
        return Err(err.into());
    }
    info!(admin_id = %admin.id, user_id = %id, username = %new_user.username, "user created");

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": AppSuccess::Created(ItemKind::User).message(),
        "user": {
            "id": id,
            "username": new_user.username,
            "email": new_user.email,
            "firstName": new_user.first_name,
            "lastName": new_user.last_name,
            "enabled": new_user.enabled,
        }
    })))
}

#[put("/users/{id}")]
pub async fn update_managed_user(
    admin: AuthUser,
    keycloak: web::Data<KeycloakClient>,
    path: web::Path<String>,
    payload: web::Json<AdminUpdateRequest>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let body = payload.into_inner();
    let update = UserUpdate {
        first_name: body.first_name,
        last_name: body.last_name,
        email: body.email,
        enabled: body.enabled,
        email_verified: None,
    }
    .trimmed();
    update.validate()?;

    keycloak.update_user(&id, &update).await.map_err(|err| match err.status() {
        Some(409) => AppError::Conflict("Email already in use".into()),
        _ => AppError::from(err),
    })?;
    info!(admin_id = %admin.id, user_id = %id, "user updated");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": AppSuccess::Updated(ItemKind::User).message(),
        "updated": update,
    })))
}

#[put("/users/{id}/reset-password")]
pub async fn reset_managed_password(
    admin: AuthUser,
    keycloak: web::Data<KeycloakClient>,
    path: web::Path<String>,
    payload: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    payload.validate()?;
    let password = payload.new_password.as_deref().unwrap_or_default();

    keycloak.reset_password(&id, password).await?;
    info!(admin_id = %admin.id, user_id = %id, "password reset by admin");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": AppSuccess::PasswordReset.message(),
    })))
}

/// Removes the user's stored files, documents and notes, then the Keycloak account.
#[delete("/users/{id}")]
pub async fn delete_managed_user(
    admin: AuthUser,
    pool: web::Data<PgPool>,
    store: web::Data<dyn ObjectStore>,
    keycloak: web::Data<KeycloakClient>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if id == admin.id {
        return Err(AppError::BadRequest("You cannot delete your own account".into()));
    }

    let user = keycloak.get_user(&id).await?;

    for file in document::files_of_user(&pool, &id).await? {
        let Some(filename) = file.filename.as_deref() else { continue };
        let key = object_key(&id, filename);
        if let Err(err) = store.delete(&key).await {
            warn!(key = %key, error = %err, "could not delete stored object");
        }
    }
    let documents = document::delete_all_for_user(&pool, &id).await?;
    let notes = note::delete_all_for_user(&pool, &id).await?;

    keycloak.delete_user(&id).await?;
    info!(admin_id = %admin.id, user_id = %id, documents, notes, "user and data deleted");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "User and all associated data deleted successfully",
        "deletedUser": { "id": id, "username": user.username },
        "deletedData": { "documents": documents, "notes": notes },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(username: &str, email: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: Some(username.into()),
            email: Some(email.into()),
            password: Some(password.into()),
            first_name: Some("  Dewi ".into()),
            last_name: None,
            enabled: None,
        }
    }

    #[test]
    fn create_requires_core_fields() {
        let err = create(" ", "dewi@jogjaprov.go.id", "rahasia123").into_new_user().unwrap_err();
        assert_eq!(err.to_string(), "Username, email and password are required");
        let err = create("dewi", "dewi@jogjaprov.go.id", "").into_new_user().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn create_checks_password_and_email() {
        let err = create("dewi", "dewi@jogjaprov.go.id", "short").into_new_user().unwrap_err();
        assert_eq!(err.to_string(), "Password must be at least 8 characters long");
        let err = create("dewi", "not-an-email", "rahasia123").into_new_user().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "Invalid email format");
        assert!(create("dewi", " dewi@jogjaprov.go.id ", "rahasia123").into_new_user().is_ok());
    }

    #[test]
    fn reset_requires_a_long_enough_password() {
        let reset = |password: Option<&str>| ResetPasswordRequest { new_password: password.map(String::from) };
        assert!(reset(None).validate().is_err());
        assert!(reset(Some("short")).validate().is_err());
        assert!(reset(Some("rahasia123")).validate().is_ok());
    }

    #[test]
    fn created_users_must_configure_totp() {
        let request = create(" dewi ", "dewi@jogjaprov.go.id", "rahasia123");
        let (user, password) = request.into_new_user().unwrap();
        assert_eq!(user.username, "dewi");
        assert_eq!(user.first_name, "Dewi");
        assert!(user.enabled);
        assert_eq!(user.required_actions, vec!["CONFIGURE_TOTP"]);
        assert_eq!(password, "rahasia123");
    }

    #[test]
    fn managed_user_flattens_summary() {
        let user = KeycloakUser {
            id: "u-9".into(),
            username: "dewi".into(),
            ..Default::default()
        };
        let identities = vec![FederatedIdentity {
            identity_provider: "google".into(),
            user_id: Some("g-1".into()),
            user_name: Some("dewi@gmail.com".into()),
        }];
        let json = serde_json::to_value(ManagedUser::new(&user, &identities)).unwrap();
        assert_eq!(json["id"], "u-9");
        assert_eq!(json["displayName"], "dewi");
        assert_eq!(json["identityProvider"], "google");
        assert_eq!(json["linkedAccounts"][0]["provider"], "google");
    }
}
