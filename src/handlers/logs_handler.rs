use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use crate::message::AppError;
use crate::models::login_log::{self, LogFilter};
use crate::models::pagination::{PageRequest, Pagination, DEFAULT_LIMIT};
use crate::models::user::AuthUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub action: Option<String>,
}

#[get("")]
pub async fn list_logs(
    user: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<LogsQuery>,
) -> Result<HttpResponse, AppError> {
    let filter = LogFilter::parse(
        query.from_date.as_deref(),
        query.to_date.as_deref(),
        query.action.as_deref(),
    )?;
    let page = PageRequest::new(query.page, query.limit, DEFAULT_LIMIT);
    let (logs, total) = login_log::history(&pool, &user.id, &filter, page).await?;

    Ok(HttpResponse::Ok().json(json!({
        "logs": logs,
        "pagination": Pagination::new(page, total),
    })))
}

#[get("/stats")]
pub async fn log_stats(user: AuthUser, pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(login_log::stats(&pool, &user.id).await?))
}
