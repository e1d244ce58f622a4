use std::time::Duration;

use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{delete, get, post, put, web, HttpResponse};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::message::{AppError, AppSuccess, ItemKind};
use crate::models::document::{self, DocumentListing, DocumentType, NewFile};
use crate::models::pagination::{PageRequest, Pagination, DEFAULT_LIMIT};
use crate::models::user::AuthUser;
use crate::utils::file_validation::{extension, sanitize_filename, validate_upload, MAX_UPLOAD_SIZE};
use crate::utils::format::encode_uri_component;
use crate::utils::s3::{object_key, ObjectStore};

const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_NAME_LEN: usize = 255;
const PRESIGNED_URL_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub new_name: Option<String>,
}

struct UploadedFile {
    filename: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    description: Option<String>,
    parent_folder_id: Option<String>,
}

fn multipart_error(err: actix_multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Malformed upload: {err}"))
}

async fn read_text(field: &mut actix_multipart::Field) -> Result<String, AppError> {
    let mut raw = Vec::new();
    while let Some(chunk) = field.next().await {
        raw.extend_from_slice(&chunk.map_err(multipart_error)?);
        if raw.len() > MAX_DESCRIPTION_LEN * 4 {
            return Err(AppError::Validation("Form field is too long".into()));
        }
    }
    String::from_utf8(raw).map_err(|_| AppError::BadRequest("Form fields must be UTF-8".into()))
}

/// Collects the form, refusing file bodies above the global upload limit
/// while they are still streaming in.
async fn read_upload_form(payload: &mut Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(multipart_error)?;
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition.get_filename().map(String::from);

        match (name.as_str(), filename) {
            ("file", Some(filename)) => {
                let mut bytes = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk.map_err(multipart_error)?;
                    if bytes.len() + chunk.len() > MAX_UPLOAD_SIZE {
                        return Err(AppError::BadRequest(format!(
                            "File size exceeds limit of {}MB",
                            MAX_UPLOAD_SIZE / (1024 * 1024)
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                form.file = Some(UploadedFile { filename, bytes });
            }
            ("description", _) => form.description = Some(read_text(&mut field).await?),
            ("parentFolderId", _) => form.parent_folder_id = Some(read_text(&mut field).await?),
            _ => {
                // Drain unknown fields so the stream can advance.
                while let Some(chunk) = field.next().await {
                    chunk.map_err(multipart_error)?;
                }
            }
        }
    }

    Ok(form)
}

/// `parentFolderId` as sent by form or JSON clients: empty, `null` and
/// `root` all mean the top level.
pub fn parse_parent_id(raw: Option<&str>) -> Result<Option<i32>, AppError> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") | Some("root") => Ok(None),
        Some(value) => value
            .parse::<i32>()
            .map(Some)
            .map_err(|_| AppError::BadRequest("Invalid parent folder id".into())),
    }
}

/// Fails with 404 unless `parent` is `None` or one of the caller's folders.
pub async fn ensure_parent(pool: &PgPool, user_id: &str, parent: Option<i32>) -> Result<(), AppError> {
    if let Some(parent_id) = parent {
        document::find_folder(pool, user_id, parent_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Parent folder not found".into()))?;
    }
    Ok(())
}

#[post("/upload")]
pub async fn upload_document(
    user: AuthUser,
    pool: web::Data<PgPool>,
    store: web::Data<dyn ObjectStore>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let form = read_upload_form(&mut payload).await?;
    let file = form
        .file
        .ok_or_else(|| AppError::BadRequest("No file uploaded".into()))?;
    let signature = validate_upload(&file.bytes)?;

    let description = form
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if description.as_ref().is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(AppError::Validation(format!(
            "Description cannot exceed {MAX_DESCRIPTION_LEN} characters"
        )));
    }

    let parent = parse_parent_id(form.parent_folder_id.as_deref())?;
    ensure_parent(&pool, &user.id, parent).await?;

    let original_name = sanitize_filename(&file.filename);
    if document::name_taken(&pool, &user.id, parent, DocumentType::File, &original_name, None).await? {
        return Err(AppError::Conflict(format!(
            "A file named \"{original_name}\" already exists in this folder"
        )));
    }

    let stored_name = format!("{}{}", Uuid::new_v4(), extension(&original_name).to_lowercase());
    let key = object_key(&user.id, &stored_name);
    let size = file.bytes.len() as i64;
    store.put(&key, file.bytes, signature.mime_type).await?;

    let new_file = NewFile {
        user_id: user.id.clone(),
        parent_folder_id: parent,
        original_name,
        filename: stored_name,
        mime_type: signature.mime_type.to_string(),
        size,
        file_url: store.public_url(&key),
        description,
    };

    let saved = match document::insert_file(&pool, &new_file).await {
        Ok(saved) => saved,
        Err(err) => {
            if let Err(cleanup) = store.delete(&key).await {
                warn!(key = %key, error = %cleanup, "could not remove object after failed insert");
            }
            return Err(err.into());
        }
    };

    info!(user_id = %user.id, document_id = saved.id, mime_type = signature.mime_type, size, "document uploaded");

    Ok(HttpResponse::Created().json(json!({
        "message": AppSuccess::Uploaded.message(),
        "document": {
            "id": saved.id,
            "originalName": saved.original_name,
            "size": saved.readable_size(),
            "mimeType": saved.mime_type,
            "uploadedAt": saved.uploaded_at,
            "url": saved.file_url,
        }
    })))
}

#[get("")]
pub async fn list_documents(
    user: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_LIMIT);
    let (documents, total) = document::list(&pool, &user.id, query.search.as_deref(), page).await?;

    Ok(HttpResponse::Ok().json(json!({
        "documents": documents.into_iter().map(DocumentListing::new).collect::<Vec<_>>(),
        "pagination": Pagination::new(page, total),
    })))
}

#[get("/stats")]
pub async fn document_stats(user: AuthUser, pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let stats = document::stats(&pool, &user.id).await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[put("/{id}/rename")]
pub async fn rename_item(
    user: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<i32>,
    body: web::Json<RenameRequest>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let requested = body
        .new_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::BadRequest("New name is required".into()))?;

    let item = document::find_owned(&pool, &user.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Item not found".into()))?;

    let name = match item.kind {
        DocumentType::File => sanitize_filename(requested),
        DocumentType::Folder => requested.to_string(),
    };
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!("Name cannot exceed {MAX_NAME_LEN} characters")));
    }

    let kind = item_kind(item.kind);
    if document::name_taken(&pool, &user.id, item.parent_folder_id, item.kind, &name, Some(item.id)).await? {
        return Err(AppError::Conflict(format!(
            "A {} named \"{name}\" already exists in this location",
            kind.to_string().to_lowercase()
        )));
    }

    let renamed = document::rename(&pool, &user.id, id, &name).await?;
    info!(user_id = %user.id, document_id = id, "item renamed");

    Ok(HttpResponse::Ok().json(json!({
        "message": AppSuccess::Renamed(kind).message(),
        "item": {
            "id": renamed.id,
            "name": renamed.original_name,
            "type": renamed.kind,
        }
    })))
}

#[get("/{id}/download")]
pub async fn download_document(
    user: AuthUser,
    pool: web::Data<PgPool>,
    store: web::Data<dyn ObjectStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let doc = document::find_owned(&pool, &user.id, path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".into()))?;
    if doc.is_folder() {
        return Err(AppError::BadRequest("Folders cannot be downloaded".into()));
    }
    let filename = doc
        .filename
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Stored file not found".into()))?;

    let bytes = store.get(&object_key(&user.id, filename)).await?;
    let content_type = doc.mime_type.as_deref().unwrap_or("application/octet-stream");

    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", encode_uri_component(&doc.original_name)),
        ))
        .body(bytes))
}

#[get("/{id}/url")]
pub async fn presigned_url(
    user: AuthUser,
    pool: web::Data<PgPool>,
    store: web::Data<dyn ObjectStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let doc = document::find_owned(&pool, &user.id, path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".into()))?;
    let filename = match (&doc.kind, doc.filename.as_deref()) {
        (DocumentType::File, Some(filename)) => filename,
        (DocumentType::Folder, _) => return Err(AppError::BadRequest("Folders have no download URL".into())),
        (DocumentType::File, None) => return Err(AppError::NotFound("Stored file not found".into())),
    };

    let url = store
        .presign_get(&object_key(&user.id, filename), PRESIGNED_URL_TTL)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "url": url,
        "expiresIn": PRESIGNED_URL_TTL.as_secs(),
    })))
}

/// Deletes a file, or a folder together with everything below it.
/// Objects that cannot be removed from storage are logged and left behind.
#[delete("/{id}")]
pub async fn delete_item(
    user: AuthUser,
    pool: web::Data<PgPool>,
    store: web::Data<dyn ObjectStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let item = document::find_owned(&pool, &user.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".into()))?;
    let kind = item_kind(item.kind);

    let doomed = if item.is_folder() {
        document::subtree(&pool, &user.id, id).await?
    } else {
        vec![item]
    };

    for file in doomed.iter().filter(|d| !d.is_folder()) {
        let Some(filename) = file.filename.as_deref() else { continue };
        let key = object_key(&user.id, filename);
        if let Err(err) = store.delete(&key).await {
            warn!(key = %key, error = %err, "could not delete stored object");
        }
    }

    let ids: Vec<i32> = doomed.iter().map(|d| d.id).collect();
    let deleted = document::delete_ids(&pool, &user.id, &ids).await?;
    info!(user_id = %user.id, document_id = id, deleted, "item deleted");

    Ok(HttpResponse::Ok().json(json!({
        "message": AppSuccess::Deleted(kind).message(),
        "deletedCount": deleted,
    })))
}

fn item_kind(kind: DocumentType) -> ItemKind {
    match kind {
        DocumentType::File => ItemKind::File,
        DocumentType::Folder => ItemKind::Folder,
    }
}
