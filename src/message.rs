use std::fmt;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use derive_more::Display;
use serde::Serialize;
use tracing::error;
use validator::ValidationErrors;

use crate::utils::keycloak::KeycloakError;
use crate::utils::s3::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemKind {
    File,
    Folder,
    Note,
    User,
    Session,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::File => write!(f, "File"),
            ItemKind::Folder => write!(f, "Folder"),
            ItemKind::Note => write!(f, "Note"),
            ItemKind::User => write!(f, "User"),
            ItemKind::Session => write!(f, "Session"),
        }
    }
}

#[derive(Debug, Serialize)]
pub enum AppSuccess {
    Created(ItemKind),
    Updated(ItemKind),
    Renamed(ItemKind),
    Deleted(ItemKind),
    Uploaded,
    PasswordUpdated,
    PasswordReset,
    ProfileUpdated,
    LoggedOut,
}

impl AppSuccess {
    pub fn message(&self) -> String {
        match self {
            AppSuccess::Created(kind) => format!("{kind} created successfully"),
            AppSuccess::Updated(kind) => format!("{kind} updated successfully"),
            AppSuccess::Renamed(kind) => format!("{kind} renamed successfully"),
            AppSuccess::Deleted(kind) => format!("{kind} deleted successfully"),
            AppSuccess::Uploaded => "File uploaded successfully".to_string(),
            AppSuccess::PasswordUpdated => "Password updated successfully".to_string(),
            AppSuccess::PasswordReset => "Password reset successfully".to_string(),
            AppSuccess::ProfileUpdated => "Profile updated successfully".to_string(),
            AppSuccess::LoggedOut => "Logged out successfully".to_string(),
        }
    }
}

/// Error type returned by every handler.
///
/// The first group carries a message meant for the client. The second group
/// carries an internal cause which is logged and replaced by a generic message.
#[derive(Debug, Display)]
pub enum AppError {
    #[display(fmt = "{}", _0)]
    BadRequest(String),
    #[display(fmt = "{}", _0)]
    Validation(String),
    #[display(fmt = "{}", _0)]
    Unauthorized(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    Conflict(String),

    #[display(fmt = "database error: {}", _0)]
    Database(String),
    #[display(fmt = "object storage error: {}", _0)]
    Storage(String),
    #[display(fmt = "identity provider error: {}", _0)]
    Keycloak(String),
    #[display(fmt = "internal error: {}", _0)]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl AppError {
    fn label(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "Bad Request",
            AppError::Validation(_) => "Validation Error",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "Not Found",
            AppError::Conflict(_) => "Conflict",
            AppError::Keycloak(_) => "Bad Gateway",
            AppError::Database(_) | AppError::Storage(_) | AppError::Internal(_) => {
                "Internal Server Error"
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Storage(_) | AppError::Internal(_) => {
                "Something went wrong while handling the request".to_string()
            }
            AppError::Keycloak(_) => "Identity provider request failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Keycloak(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Storage(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(cause = %self, "request failed");
        }

        HttpResponse::build(status).json(ErrorBody {
            error: self.label(),
            message: self.public_message(),
        })
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("An item with this name already exists here".to_string())
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<KeycloakError> for AppError {
    fn from(err: KeycloakError) -> Self {
        match err.status() {
            Some(404) => AppError::NotFound("Resource not found in identity provider".to_string()),
            Some(409) => AppError::Conflict("Username or email already in use".to_string()),
            Some(403) => AppError::Forbidden("Insufficient permissions in identity provider".to_string()),
            _ => AppError::Keycloak(err.to_string()),
        }
    }
}

/// Reports the first failing field, in field-name order so the message is stable.
impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        let message = fields
            .iter()
            .flat_map(|(_, errs)| errs.iter())
            .find_map(|err| err.message.as_ref().map(|msg| msg.to_string()));

        AppError::Validation(message.unwrap_or_else(|| errors.to_string()))
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => AppError::NotFound("Stored file not found".to_string()),
            StorageError::Backend(msg) => AppError::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use actix_web::body::to_bytes;
    use validator::Validate;

    #[test]
    fn success_messages_name_the_item() {
        assert_eq!(AppSuccess::Deleted(ItemKind::Note).message(), "Note deleted successfully");
        assert_eq!(AppSuccess::Renamed(ItemKind::Folder).message(), "Folder renamed successfully");
    }

    #[test]
    fn client_errors_map_to_status_codes() {
        assert_eq!(AppError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::Keycloak("x".into()).status_code(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn internal_errors_hide_their_cause() {
        let resp = AppError::Database("password authentication failed".into()).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal Server Error");
        assert!(!json["message"].as_str().unwrap().contains("password"));
    }

    #[actix_web::test]
    async fn client_errors_expose_their_message() {
        let resp = AppError::NotFound("Note not found".into()).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Not Found");
        assert_eq!(json["message"], "Note not found");
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[derive(Validate)]
    struct Signup {
        #[validate(email(message = "Invalid email format"))]
        email: String,
        #[validate(length(min = 8, message = "Too short"))]
        password: String,
    }

    #[test]
    fn validation_errors_report_the_first_field() {
        let errors = Signup { email: "nope".into(), password: "123".into() }.validate().unwrap_err();
        let err = AppError::from(errors);
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "Invalid email format");
        assert_eq!(err.label(), "Validation Error");
    }

    #[test]
    fn missing_object_becomes_not_found() {
        let err: AppError = StorageError::NotFound("u/1.pdf".into()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
