//! In-process stand-in for the Keycloak endpoints the handlers call. It keeps
//! users and sessions in memory and records every deletion it is asked for.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::{json, Value};

use super::support::keycloak_config;
use crate::config::KeycloakConfig;
use crate::utils::keycloak::KeycloakClient;

const REALM: &str = "Jogja-SSO";

#[derive(Default)]
struct KeycloakState {
    users: Mutex<Vec<Value>>,
    sessions: Mutex<HashMap<String, Vec<String>>>,
    identities: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashSet<String>>,
    deleted_users: Mutex<Vec<String>>,
    deleted_sessions: Mutex<Vec<String>>,
}

pub struct FakeKeycloak {
    url: String,
    state: web::Data<KeycloakState>,
}

impl FakeKeycloak {
    pub async fn start() -> Self {
        let state = web::Data::new(KeycloakState::default());
        let data = state.clone();
        let admin = format!("/admin/realms/{REALM}");
        let token_path = format!("/realms/{REALM}/protocol/openid-connect/token");

        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route(&token_path, web::post().to(token))
                .route(&format!("{admin}/users"), web::get().to(list_users))
                .route(&format!("{admin}/users/{{id}}"), web::get().to(get_user))
                .route(&format!("{admin}/users/{{id}}"), web::delete().to(delete_user))
                .route(&format!("{admin}/users/{{id}}/sessions"), web::get().to(user_sessions))
                .route(&format!("{admin}/users/{{id}}/federated-identity"), web::get().to(identities))
                .route(&format!("{admin}/sessions/{{id}}"), web::delete().to(delete_session))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind fake keycloak");

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        FakeKeycloak { url: format!("http://{addr}"), state }
    }

    pub fn client(&self) -> KeycloakClient {
        KeycloakClient::new(KeycloakConfig { url: self.url.clone(), ..keycloak_config() })
    }

    pub fn add_user(&self, id: &str, username: &str) {
        self.state.users.lock().unwrap().push(json!({
            "id": id,
            "username": username,
            "email": format!("{username}@jogjaprov.go.id"),
            "enabled": true,
            "emailVerified": true,
            "createdTimestamp": 1_700_000_000_000i64
        }));
    }

    pub fn add_sessions(&self, user_id: &str, session_ids: &[&str]) {
        self.state
            .sessions
            .lock()
            .unwrap()
            .insert(user_id.to_string(), session_ids.iter().map(|s| s.to_string()).collect());
    }

    pub fn link_identity(&self, user_id: &str, provider: &str) {
        self.state
            .identities
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push(json!({ "identityProvider": provider, "userId": format!("{provider}-{user_id}") }));
    }

    /// Deleting this user or session id answers 500.
    pub fn fail_deleting(&self, id: &str) {
        self.state.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn deleted_users(&self) -> Vec<String> {
        self.state.deleted_users.lock().unwrap().clone()
    }

    pub fn deleted_sessions(&self) -> Vec<String> {
        self.state.deleted_sessions.lock().unwrap().clone()
    }
}

async fn token() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "access_token": "admin-token", "expires_in": 300 }))
}

async fn list_users(state: web::Data<KeycloakState>) -> HttpResponse {
    HttpResponse::Ok().json(state.users.lock().unwrap().clone())
}

fn find_user(state: &KeycloakState, id: &str) -> Option<Value> {
    state.users.lock().unwrap().iter().find(|user| user["id"] == id).cloned()
}

async fn get_user(state: web::Data<KeycloakState>, path: web::Path<String>) -> HttpResponse {
    match find_user(&state, &path) {
        Some(user) => HttpResponse::Ok().json(user),
        None => HttpResponse::NotFound().json(json!({ "error": "User not found" })),
    }
}

async fn delete_user(state: web::Data<KeycloakState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    if state.failing.lock().unwrap().contains(&id) {
        return HttpResponse::InternalServerError().finish();
    }
    if find_user(&state, &id).is_none() {
        return HttpResponse::NotFound().finish();
    }
    state.users.lock().unwrap().retain(|user| user["id"] != id.as_str());
    state.deleted_users.lock().unwrap().push(id);
    HttpResponse::NoContent().finish()
}

async fn user_sessions(state: web::Data<KeycloakState>, path: web::Path<String>) -> HttpResponse {
    let sessions: Vec<Value> = state
        .sessions
        .lock()
        .unwrap()
        .get(path.as_str())
        .into_iter()
        .flatten()
        .map(|id| json!({ "id": id, "ipAddress": "10.0.0.7", "start": 1_700_000_000_000i64, "lastAccess": 1_700_000_360_000i64 }))
        .collect();
    HttpResponse::Ok().json(sessions)
}

async fn identities(state: web::Data<KeycloakState>, path: web::Path<String>) -> HttpResponse {
    let linked = state.identities.lock().unwrap().get(path.as_str()).cloned().unwrap_or_default();
    HttpResponse::Ok().json(linked)
}

async fn delete_session(state: web::Data<KeycloakState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    if state.failing.lock().unwrap().contains(&id) {
        return HttpResponse::InternalServerError().finish();
    }
    for sessions in state.sessions.lock().unwrap().values_mut() {
        sessions.retain(|session| *session != id);
    }
    state.deleted_sessions.lock().unwrap().push(id);
    HttpResponse::NoContent().finish()
}
