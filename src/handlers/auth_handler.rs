use std::future::{ready, Ready};

use actix_web::dev::{Payload, ServiceRequest};
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use tracing::debug;

use crate::message::AppError;
use crate::models::user::AuthUser;
use crate::utils::jwks::JwtVerifier;

const ADMIN_ROLES: [&str; 4] = ["admin", "realm-admin", "manage-users", "super_admin"];

/// Who counts as an administrator: holders of an admin realm role, plus the
/// addresses listed in `ADMIN_EMAILS`.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    admin_emails: Vec<String>,
}

impl AdminPolicy {
    pub fn new(admin_emails: Vec<String>) -> Self {
        AdminPolicy {
            admin_emails: admin_emails.into_iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    pub fn is_admin(&self, user: &AuthUser) -> bool {
        let by_role = user
            .roles
            .iter()
            .any(|role| ADMIN_ROLES.iter().any(|admin| role.eq_ignore_ascii_case(admin)));
        let by_email = user
            .email
            .as_deref()
            .is_some_and(|email| self.admin_emails.contains(&email.to_lowercase()));
        by_role || by_email
    }
}

/// Bearer middleware for authenticated routes. Places the caller's
/// [`AuthUser`] in the request extensions.
pub async fn validate_jwt(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let Some(verifier) = req.app_data::<web::Data<JwtVerifier>>().cloned() else {
        return Err((AppError::Internal("token verifier is not configured".into()).into(), req));
    };

    match verifier.verify(credentials.token()).await {
        Ok(claims) => {
            req.extensions_mut().insert(AuthUser::from(claims));
            Ok(req)
        }
        Err(err) => {
            debug!(error = %err, path = %req.path(), "rejected bearer token");
            Err((AppError::Unauthorized(err.public_message().to_string()).into(), req))
        }
    }
}

/// Bearer middleware for admin routes: [`validate_jwt`] plus the admin check.
pub async fn validate_admin(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let req = validate_jwt(req, credentials).await?;

    let allowed = {
        let policy = req.app_data::<web::Data<AdminPolicy>>();
        let extensions = req.extensions();
        match (policy, extensions.get::<AuthUser>()) {
            (Some(policy), Some(user)) => policy.is_admin(user),
            _ => false,
        }
    };

    if allowed {
        Ok(req)
    } else {
        Err((AppError::Forbidden("Admin access required".into()).into(), req))
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("Authentication required".into())),
        )
    }
}
