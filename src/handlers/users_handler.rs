use actix_web::{get, put, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::message::{AppError, AppSuccess, ItemKind};
use crate::models::keycloak::{UserSummary, UserUpdate};
use crate::models::user::AuthUser;
use crate::utils::keycloak::KeycloakClient;

const DEFAULT_MAX: i64 = 100;
const MAX_MAX: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub search: Option<String>,
    pub max: Option<i64>,
}

#[get("")]
pub async fn list_users(
    keycloak: web::Data<KeycloakClient>,
    query: web::Query<UsersQuery>,
) -> Result<HttpResponse, AppError> {
    let max = query.max.unwrap_or(DEFAULT_MAX).clamp(1, MAX_MAX);
    let users = keycloak.list_users(query.search.as_deref(), max).await?;
    let users: Vec<UserSummary> = users.iter().map(UserSummary::from).collect();

    Ok(HttpResponse::Ok().json(json!({
        "total": users.len(),
        "users": users,
    })))
}

#[get("/{id}")]
pub async fn get_user(
    keycloak: web::Data<KeycloakClient>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user = keycloak.get_user(&path).await?;
    Ok(HttpResponse::Ok().json(UserSummary::from(&user)))
}

/// Applies the update and answers with the user as Keycloak now has it.
#[put("/{id}")]
pub async fn update_user(
    admin: AuthUser,
    keycloak: web::Data<KeycloakClient>,
    path: web::Path<String>,
    payload: web::Json<UserUpdate>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let update = payload.into_inner().trimmed();
    if update.is_empty() {
        return Err(AppError::BadRequest("Nothing to update".into()));
    }
    update.validate()?;

    keycloak.update_user(&id, &update).await?;
    info!(admin_id = %admin.id, user_id = %id, "user updated");
    let refreshed = keycloak.get_user(&id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": AppSuccess::Updated(ItemKind::User).message(),
        "user": UserSummary::from(&refreshed),
    })))
}

#[get("/{id}/roles")]
pub async fn user_roles(
    keycloak: web::Data<KeycloakClient>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let roles = keycloak.realm_role_mappings(&path).await?;
    Ok(HttpResponse::Ok().json(json!({ "roles": roles })))
}
