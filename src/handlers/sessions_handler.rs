use std::collections::HashMap;

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};

use super::audit_entry;
use crate::message::{AppError, AppSuccess, ItemKind};
use crate::models::keycloak::UserSession;
use crate::models::login_log::{self, LoginAction};
use crate::models::user::AuthUser;
use crate::utils::keycloak::KeycloakClient;
use crate::utils::request::describe_location;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub ip_address: String,
    pub location: &'static str,
    pub start: Option<DateTime<Utc>>,
    pub last_access: Option<DateTime<Utc>>,
    pub clients: HashMap<String, String>,
    pub current: bool,
}

impl SessionView {
    pub fn new(session: UserSession, current_session: Option<&str>) -> Self {
        let ip_address = session.ip_address.unwrap_or_default();
        SessionView {
            location: describe_location(&ip_address),
            current: current_session == Some(session.id.as_str()),
            start: DateTime::from_timestamp_millis(session.start),
            last_access: DateTime::from_timestamp_millis(session.last_access),
            id: session.id,
            ip_address,
            clients: session.clients,
        }
    }
}

#[get("")]
pub async fn list_sessions(
    user: AuthUser,
    keycloak: web::Data<KeycloakClient>,
) -> Result<HttpResponse, AppError> {
    let sessions = keycloak.user_sessions(&user.id).await?;
    let current = user.session_id.as_deref();

    Ok(HttpResponse::Ok().json(json!({
        "sessions": sessions
            .into_iter()
            .map(|session| SessionView::new(session, current))
            .collect::<Vec<_>>(),
    })))
}

#[delete("/{session_id}")]
pub async fn terminate_session(
    req: HttpRequest,
    user: AuthUser,
    pool: web::Data<PgPool>,
    keycloak: web::Data<KeycloakClient>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session_id = path.into_inner();
    if user.session_id.as_deref() == Some(session_id.as_str()) {
        return Err(AppError::BadRequest(
            "Cannot terminate current session. Use logout instead.".into(),
        ));
    }

    let owned = keycloak
        .user_sessions(&user.id)
        .await?
        .iter()
        .any(|session| session.id == session_id);
    if !owned {
        return Err(AppError::NotFound("Session not found".into()));
    }

    keycloak.delete_session(&session_id).await?;
    info!(user_id = %user.id, session_id = %session_id, "session terminated");

    login_log::record(
        &pool,
        audit_entry(&req, &user, LoginAction::SessionTerminated)
            .metadata(json!({ "terminatedSessionId": session_id })),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "message": AppSuccess::Deleted(ItemKind::Session).message(),
    })))
}

/// Terminates every session of the caller except the one making the request.
#[post("/terminate-all")]
pub async fn terminate_other_sessions(
    req: HttpRequest,
    user: AuthUser,
    pool: web::Data<PgPool>,
    keycloak: web::Data<KeycloakClient>,
) -> Result<HttpResponse, AppError> {
    let sessions = keycloak.user_sessions(&user.id).await?;
    let current = user.session_id.as_deref();

    let mut terminated = 0;
    for session in sessions.iter().filter(|s| Some(s.id.as_str()) != current) {
        match keycloak.delete_session(&session.id).await {
            Ok(()) => terminated += 1,
            Err(err) => warn!(session_id = %session.id, error = %err, "failed to terminate session"),
        }
    }
    info!(user_id = %user.id, terminated, "other sessions terminated");

    login_log::record(
        &pool,
        audit_entry(&req, &user, LoginAction::SessionTerminated)
            .metadata(json!({ "terminatedCount": terminated })),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Terminated {terminated} session(s)"),
        "terminatedCount": terminated,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, ip: Option<&str>) -> UserSession {
        UserSession {
            id: id.into(),
            ip_address: ip.map(String::from),
            start: 1_700_000_000_000,
            last_access: 1_700_000_360_000,
            ..Default::default()
        }
    }

    #[test]
    fn marks_the_current_session() {
        let view = SessionView::new(session("s-1", Some("127.0.0.1")), Some("s-1"));
        assert!(view.current);
        assert_eq!(view.location, "Local network");

        let view = SessionView::new(session("s-2", Some("36.72.10.1")), Some("s-1"));
        assert!(!view.current);
        assert_eq!(view.location, "Unknown");
    }

    #[test]
    fn timestamps_become_rfc3339() {
        let view = SessionView::new(session("s-1", None), None);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["start"], "2023-11-14T22:13:20Z");
        assert_eq!(json["ipAddress"], "");
        assert_eq!(json["current"], false);
    }
}
