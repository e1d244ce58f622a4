pub mod admin_handler;
pub mod auth_handler;
pub mod documents_handler;
pub mod folder_handler;
pub mod health_handler;
pub mod login_handler;
pub mod logs_handler;
pub mod notes_handler;
pub mod profile_handler;
pub mod sessions_handler;
pub mod users_handler;

use actix_web::HttpRequest;

use crate::models::login_log::{LoginAction, NewLoginLog};
use crate::models::user::AuthUser;
use crate::utils::request::{client_ip, user_agent};

/// Audit entry for an action taken by the authenticated caller.
pub fn audit_entry(req: &HttpRequest, user: &AuthUser, action: LoginAction) -> NewLoginLog {
    NewLoginLog::new(&user.id, action, client_ip(req), user_agent(req)).session(user.session_id.clone())
}
