use actix_web::{get, put, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::skip_serializing_none;
use sqlx::PgPool;
use tracing::{info, warn};
use validator::Validate;

use super::audit_entry;
use crate::message::{AppError, AppSuccess};
use crate::models::keycloak::{KeycloakUser, UserUpdate};
use crate::models::login_log::{self, LoginAction};
use crate::models::user::{display_name, AuthUser};
use crate::utils::keycloak::KeycloakClient;

#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: String,
    pub enabled: Option<bool>,
    pub created_timestamp: Option<i64>,
}

impl From<KeycloakUser> for Profile {
    fn from(user: KeycloakUser) -> Self {
        Profile {
            display_name: display_name(user.first_name.as_deref(), user.last_name.as_deref(), &user.username),
            id: user.id,
            username: user.username,
            email: user.email,
            email_verified: Some(user.email_verified),
            first_name: user.first_name,
            last_name: user.last_name,
            enabled: Some(user.enabled),
            created_timestamp: user.created_timestamp,
        }
    }
}

/// Reduced profile built from the access token alone.
impl From<&AuthUser> for Profile {
    fn from(user: &AuthUser) -> Self {
        Profile {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            email_verified: None,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            display_name: user.display_name(),
            enabled: None,
            created_timestamp: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl UpdateProfileRequest {
    pub fn into_update(self) -> Result<UserUpdate, AppError> {
        let update = UserUpdate {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            ..Default::default()
        }
        .trimmed();

        update.validate()?;
        if update.is_empty() {
            return Err(AppError::BadRequest("Nothing to update".into()));
        }
        Ok(update)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(
        required(message = "New password must be at least 8 characters long"),
        length(min = 8, message = "New password must be at least 8 characters long")
    )]
    pub new_password: Option<String>,
}

/// Falls back to the token's claims when Keycloak cannot be reached.
#[get("")]
pub async fn get_profile(
    user: AuthUser,
    keycloak: web::Data<KeycloakClient>,
) -> Result<HttpResponse, AppError> {
    let profile = match keycloak.get_user(&user.id).await {
        Ok(found) => Profile::from(found),
        Err(err) => {
            warn!(user_id = %user.id, error = %err, "serving profile from token claims");
            Profile::from(&user)
        }
    };
    Ok(HttpResponse::Ok().json(profile))
}

#[put("")]
pub async fn update_profile(
    req: HttpRequest,
    user: AuthUser,
    pool: web::Data<PgPool>,
    keycloak: web::Data<KeycloakClient>,
    payload: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, AppError> {
    let update = payload.into_inner().into_update()?;

    keycloak.update_user(&user.id, &update).await.map_err(|err| match err.status() {
        Some(409) => AppError::Conflict("Email already in use".into()),
        _ => AppError::from(err),
    })?;
    info!(user_id = %user.id, "profile updated");

    let fields: Vec<&str> = [
        ("firstName", update.first_name.is_some()),
        ("lastName", update.last_name.is_some()),
        ("email", update.email.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, changed)| changed.then_some(name))
    .collect();
    login_log::record(
        &pool,
        audit_entry(&req, &user, LoginAction::ProfileUpdate).metadata(json!({ "fields": fields })),
    )
    .await;

    if let Some(new_email) = update.email.as_deref() {
        let old_email = user.email.as_deref().unwrap_or_default();
        if !new_email.eq_ignore_ascii_case(old_email) {
            login_log::record(
                &pool,
                audit_entry(&req, &user, LoginAction::EmailChange)
                    .metadata(json!({ "oldEmail": old_email, "newEmail": new_email })),
            )
            .await;
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": AppSuccess::ProfileUpdated.message(),
        "updated": update,
    })))
}

#[put("/password")]
pub async fn change_password(
    req: HttpRequest,
    user: AuthUser,
    pool: web::Data<PgPool>,
    keycloak: web::Data<KeycloakClient>,
    payload: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, AppError> {
    payload.validate()?;
    let password = payload.new_password.as_deref().unwrap_or_default();

    keycloak.reset_password(&user.id, password).await?;
    info!(user_id = %user.id, "password changed");

    login_log::record(&pool, audit_entry(&req, &user, LoginAction::PasswordChange)).await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": AppSuccess::PasswordUpdated.message(),
    })))
}
