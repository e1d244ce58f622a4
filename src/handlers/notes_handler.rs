use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use crate::message::{AppError, AppSuccess, ItemKind};
use crate::models::note::{self, NoteFilter, NoteInput};
use crate::models::pagination::{PageRequest, Pagination, DEFAULT_LIMIT};
use crate::models::user::AuthUser;

#[derive(Debug, Deserialize)]
pub struct NotesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub search: Option<String>,
}

fn not_found() -> AppError {
    AppError::NotFound("Note not found".into())
}

#[get("")]
pub async fn list_notes(
    user: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<NotesQuery>,
) -> Result<HttpResponse, AppError> {
    let filter = NoteFilter::new(query.category.as_deref(), query.search.as_deref())?;
    let page = PageRequest::new(query.page, query.limit, DEFAULT_LIMIT);
    let (notes, total) = note::list(&pool, &user.id, &filter, page).await?;

    Ok(HttpResponse::Ok().json(json!({
        "notes": notes,
        "pagination": Pagination::new(page, total),
    })))
}

#[get("/stats")]
pub async fn note_stats(user: AuthUser, pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(note::stats(&pool, &user.id).await?))
}

#[get("/{id}")]
pub async fn get_note(
    user: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let found = note::find(&pool, &user.id, path.into_inner())
        .await?
        .ok_or_else(not_found)?;
    Ok(HttpResponse::Ok().json(found))
}

#[post("")]
pub async fn create_note(
    user: AuthUser,
    pool: web::Data<PgPool>,
    payload: web::Json<NoteInput>,
) -> Result<HttpResponse, AppError> {
    let new_note = payload.into_inner().into_new()?;
    let created = note::create(&pool, &user.id, &new_note).await?;
    info!(user_id = %user.id, note_id = created.id, "note created");

    Ok(HttpResponse::Created().json(json!({
        "message": AppSuccess::Created(ItemKind::Note).message(),
        "note": created,
    })))
}

#[put("/{id}")]
pub async fn update_note(
    user: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i32>,
    payload: web::Json<NoteInput>,
) -> Result<HttpResponse, AppError> {
    let changes = payload.into_inner().into_changes()?;
    let updated = note::update(&pool, &user.id, path.into_inner(), &changes)
        .await?
        .ok_or_else(not_found)?;
    info!(user_id = %user.id, note_id = updated.id, "note updated");

    Ok(HttpResponse::Ok().json(json!({
        "message": AppSuccess::Updated(ItemKind::Note).message(),
        "note": updated,
    })))
}

#[delete("/{id}")]
pub async fn delete_note(
    user: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if !note::delete(&pool, &user.id, id).await? {
        return Err(not_found());
    }
    info!(user_id = %user.id, note_id = id, "note deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": AppSuccess::Deleted(ItemKind::Note).message(),
    })))
}
