use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::handlers::admin_handler::{
    create_managed_user, delete_managed_user, list_managed_users, managed_user_details,
    reset_managed_password, update_managed_user,
};
use crate::handlers::auth_handler::{validate_admin, validate_jwt};
use crate::handlers::documents_handler::{
    delete_item, document_stats, download_document, list_documents, presigned_url, rename_item,
    upload_document,
};
use crate::handlers::folder_handler::{create_folder, folder_contents};
use crate::handlers::health_handler::health;
use crate::handlers::login_handler::{login, logout, me, refresh, verify};
use crate::handlers::logs_handler::{list_logs, log_stats};
use crate::handlers::notes_handler::{create_note, delete_note, get_note, list_notes, note_stats, update_note};
use crate::handlers::profile_handler::{change_password, get_profile, update_profile};
use crate::handlers::sessions_handler::{list_sessions, terminate_other_sessions, terminate_session};
use crate::handlers::users_handler::{get_user, list_users, update_user, user_roles};
use crate::message::AppError;

/// Notes may carry up to 50 000 characters of content.
pub const JSON_BODY_LIMIT: usize = 256 * 1024;

// Fixed segments such as `/stats` and `/folder` are registered before `/{id}`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(
            web::scope("/api/auth")
                .service(login)
                .service(verify)
                .service(refresh)
                .service(logout)
                .service(
                    web::resource("/me")
                        .wrap(HttpAuthentication::bearer(validate_jwt))
                        .route(web::get().to(me)),
                ),
        )
        .service(
            web::scope("/api/documents")
                .wrap(HttpAuthentication::bearer(validate_jwt))
                .service(upload_document)
                .service(document_stats)
                .service(create_folder)
                .service(folder_contents)
                .service(list_documents)
                .service(rename_item)
                .service(download_document)
                .service(presigned_url)
                .service(delete_item),
        )
        .service(
            web::scope("/api/notes")
                .wrap(HttpAuthentication::bearer(validate_jwt))
                .service(note_stats)
                .service(list_notes)
                .service(create_note)
                .service(get_note)
                .service(update_note)
                .service(delete_note),
        )
        .service(
            web::scope("/api/logs")
                .wrap(HttpAuthentication::bearer(validate_jwt))
                .service(log_stats)
                .service(list_logs),
        )
        .service(
            web::scope("/api/sessions")
                .wrap(HttpAuthentication::bearer(validate_jwt))
                .service(terminate_other_sessions)
                .service(list_sessions)
                .service(terminate_session),
        )
        .service(
            web::scope("/api/profile")
                .wrap(HttpAuthentication::bearer(validate_jwt))
                .service(change_password)
                .service(get_profile)
                .service(update_profile),
        )
        .service(
            web::scope("/api/admin")
                .wrap(HttpAuthentication::bearer(validate_admin))
                .service(list_managed_users)
                .service(create_managed_user)
                .service(reset_managed_password)
                .service(managed_user_details)
                .service(update_managed_user)
                .service(delete_managed_user),
        )
        .service(
            web::scope("/api/users")
                .wrap(HttpAuthentication::bearer(validate_admin))
                .service(list_users)
                .service(user_roles)
                .service(get_user)
                .service(update_user),
        );
}

/// Malformed JSON bodies answer with the same error shape as handlers.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_BODY_LIMIT)
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid request body: {err}")).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid query string: {err}")).into())
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid path parameter: {err}")).into())
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": "Endpoint not found" }))
}
