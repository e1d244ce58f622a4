//! Public endpoints that drive the OpenID Connect login against Keycloak.

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::Config;
use crate::message::{AppError, AppSuccess};
use crate::models::login_log::{self, LoginAction, NewLoginLog};
use crate::models::user::AuthUser;
use crate::utils::keycloak::{KeycloakClient, KeycloakError};
use crate::utils::request::{bearer_token, client_ip, user_agent};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Rejections by the token endpoint mean bad input; anything else is Keycloak's problem.
fn token_endpoint_error(err: KeycloakError, message: &str) -> AppError {
    match err.status() {
        Some(400) | Some(401) => AppError::Unauthorized(message.to_string()),
        _ => AppError::from(err),
    }
}

#[post("/login")]
pub async fn login(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    keycloak: web::Data<KeycloakClient>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let code = payload
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::BadRequest("Authorization code required".into()))?;
    let redirect_uri = payload
        .redirect_uri
        .clone()
        .unwrap_or_else(|| format!("{}/callback", config.frontend_url.trim_end_matches('/')));

    let tokens = keycloak
        .exchange_code(code, &redirect_uri)
        .await
        .map_err(|err| token_endpoint_error(err, "Authentication failed"))?;
    let user_info = keycloak
        .userinfo(&tokens.access_token)
        .await
        .map_err(|err| token_endpoint_error(err, "Authentication failed"))?;

    let username = user_info.preferred_username.clone().unwrap_or_else(|| user_info.sub.clone());
    login_log::record(
        &pool,
        NewLoginLog::new(&user_info.sub, LoginAction::LoginSuccess, client_ip(&req), user_agent(&req))
            .metadata(json!({ "username": username })),
    )
    .await;
    info!(user_id = %user_info.sub, username = %username, "user logged in");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user": {
            "id": user_info.sub,
            "username": user_info.preferred_username,
            "email": user_info.email,
            "firstName": user_info.given_name,
            "lastName": user_info.family_name,
        },
        "tokens": {
            "accessToken": tokens.access_token,
            "refreshToken": tokens.refresh_token,
            "idToken": tokens.id_token,
        }
    })))
}

/// Asks Keycloak whether the presented access token is still good.
#[get("/verify")]
pub async fn verify(req: HttpRequest, keycloak: web::Data<KeycloakClient>) -> HttpResponse {
    let Some(token) = bearer_token(&req) else {
        return HttpResponse::Unauthorized().json(json!({ "valid": false, "error": "No token provided" }));
    };

    match keycloak.userinfo(token).await {
        Ok(user) => HttpResponse::Ok().json(json!({ "valid": true, "user": user })),
        Err(err) => {
            info!(error = %err, "token failed verification");
            HttpResponse::Unauthorized().json(json!({ "valid": false, "error": "Invalid token" }))
        }
    }
}

#[post("/refresh")]
pub async fn refresh(
    keycloak: web::Data<KeycloakClient>,
    payload: web::Json<RefreshRequest>,
) -> Result<HttpResponse, AppError> {
    let refresh_token = payload
        .refresh_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::BadRequest("Refresh token required".into()))?;

    let tokens = keycloak
        .refresh(refresh_token)
        .await
        .map_err(|err| token_endpoint_error(err, "Token refresh failed"))?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// Always answers success; the Keycloak logout is best effort.
#[post("/logout")]
pub async fn logout(
    keycloak: web::Data<KeycloakClient>,
    payload: Option<web::Json<RefreshRequest>>,
) -> HttpResponse {
    let refresh_token = payload.and_then(|body| body.into_inner().refresh_token);
    if let Some(token) = refresh_token.as_deref().filter(|t| !t.is_empty()) {
        if let Err(err) = keycloak.logout(token).await {
            warn!(error = %err, "keycloak logout failed");
        }
    }

    HttpResponse::Ok().json(json!({
        "success": true,
        "message": AppSuccess::LoggedOut.message(),
    }))
}

/// Routed as a bearer-guarded resource next to the public auth endpoints.
pub async fn me(user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "user": user }))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test::{self, TestRequest};
    use actix_web::App;

    use super::*;
    use crate::config::KeycloakConfig;

    fn unreachable_keycloak() -> KeycloakClient {
        KeycloakClient::new(KeycloakConfig {
            url: "http://127.0.0.1:9".into(),
            realm: "Jogja-SSO".into(),
            client_id: "pemda-dashboard".into(),
            client_secret: String::new(),
            admin_client_id: "pemda-dashboard".into(),
            admin_client_secret: String::new(),
        })
    }

    #[test]
    fn rejected_grants_are_unauthorized() {
        let err = KeycloakError::Status {
            status: reqwest::StatusCode::BAD_REQUEST,
            body: "invalid_grant".into(),
        };
        assert!(matches!(token_endpoint_error(err, "x"), AppError::Unauthorized(_)));

        let err = KeycloakError::Protocol("boom".into());
        assert!(matches!(token_endpoint_error(err, "x"), AppError::Keycloak(_)));
    }

    #[actix_web::test]
    async fn logout_succeeds_even_when_keycloak_is_down() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(unreachable_keycloak()))
                .service(logout),
        )
        .await;

        let req = TestRequest::post()
            .uri("/logout")
            .set_json(json!({ "refresh_token": "stale" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);

        let req = TestRequest::post().uri("/logout").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn verify_without_token_is_unauthorized() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(unreachable_keycloak()))
                .service(verify),
        )
        .await;

        let resp = test::call_service(&app, TestRequest::get().uri("/verify").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["valid"], false);
    }

    #[actix_web::test]
    async fn refresh_requires_a_token() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(unreachable_keycloak()))
                .service(refresh),
        )
        .await;

        let req = TestRequest::post().uri("/refresh").set_json(json!({})).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
