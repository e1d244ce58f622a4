use std::time::Instant;

use actix_web::{get, web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tracing::warn;

/// When the server started accepting requests.
#[derive(Debug, Clone, Copy)]
pub struct Uptime(Instant);

impl Uptime {
    pub fn start() -> Self {
        Uptime(Instant::now())
    }

    pub fn seconds(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}

#[get("/health")]
pub async fn health(pool: web::Data<PgPool>, uptime: web::Data<Uptime>) -> HttpResponse {
    let database = match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => "connected",
        Err(err) => {
            warn!(error = %err, "health check could not reach the database");
            "disconnected"
        }
    };

    HttpResponse::Ok().json(json!({
        "status": "OK",
        "timestamp": Utc::now(),
        "uptime": uptime.seconds(),
        "database": database,
    }))
}
