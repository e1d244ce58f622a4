use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use super::documents_handler::ensure_parent;
use crate::message::{AppError, AppSuccess, ItemKind};
use crate::models::breadcrumb::Breadcrumb;
use crate::models::document::{self, DocumentListing, DocumentType};
use crate::models::pagination::{PageRequest, Pagination};
use crate::models::user::AuthUser;

const FOLDER_PAGE_LIMIT: i64 = 50;
const MAX_FOLDER_NAME_LEN: usize = 255;

/// `parentFolderId` may arrive as a number, a numeric string or null.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FolderRef {
    Id(i32),
    Text(String),
}

impl FolderRef {
    fn resolve(&self) -> Result<Option<i32>, AppError> {
        match self {
            FolderRef::Id(id) => Ok(Some(*id)),
            FolderRef::Text(text) => super::documents_handler::parse_parent_id(Some(text)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub name: Option<String>,
    pub parent_folder_id: Option<FolderRef>,
}

#[derive(Debug, Deserialize)]
pub struct FolderQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct CurrentFolder {
    id: Option<i32>,
    name: String,
}

#[post("/folder")]
pub async fn create_folder(
    user: AuthUser,
    pool: web::Data<PgPool>,
    payload: web::Json<CreateFolderRequest>,
) -> Result<HttpResponse, AppError> {
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::BadRequest("Folder name is required".into()))?;
    if name.chars().count() > MAX_FOLDER_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Folder name cannot exceed {MAX_FOLDER_NAME_LEN} characters"
        )));
    }

    let parent = match &payload.parent_folder_id {
        Some(folder) => folder.resolve()?,
        None => None,
    };

    if document::name_taken(&pool, &user.id, parent, DocumentType::Folder, name, None).await? {
        return Err(AppError::Conflict(format!(
            "A folder named \"{name}\" already exists in this location"
        )));
    }
    ensure_parent(&pool, &user.id, parent).await?;

    let folder = document::create_folder(&pool, &user.id, name, parent).await?;
    info!(user_id = %user.id, folder_id = folder.id, parent_folder_id = ?parent, "folder created");

    Ok(HttpResponse::Created().json(json!({
        "message": AppSuccess::Created(ItemKind::Folder).message(),
        "folder": {
            "id": folder.id,
            "name": folder.original_name,
            "type": folder.kind,
            "parentFolderId": folder.parent_folder_id,
            "createdAt": folder.created_at,
        }
    })))
}

/// Lists one level of the tree. `root` addresses the top level.
#[get("/folder/{folder_id}")]
pub async fn folder_contents(
    user: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<String>,
    query: web::Query<FolderQuery>,
) -> Result<HttpResponse, AppError> {
    let folder_id = match path.as_str() {
        "root" | "null" => None,
        raw => Some(
            raw.parse::<i32>()
                .map_err(|_| AppError::BadRequest("Invalid folder id".into()))?,
        ),
    };

    let (current, breadcrumbs) = match folder_id {
        Some(id) => {
            let folder = document::find_folder(&pool, &user.id, id)
                .await?
                .ok_or_else(|| AppError::NotFound("Folder not found".into()))?;
            let trail = document::breadcrumbs(&pool, &user.id, id).await?;
            (CurrentFolder { id: Some(id), name: folder.original_name }, trail)
        }
        None => (
            CurrentFolder { id: None, name: "Root".into() },
            vec![Breadcrumb::root()],
        ),
    };

    let page = PageRequest::new(query.page, query.limit, FOLDER_PAGE_LIMIT);
    let (items, total) = document::children(&pool, &user.id, folder_id, page).await?;

    Ok(HttpResponse::Ok().json(json!({
        "items": items.into_iter().map(DocumentListing::folder_item).collect::<Vec<_>>(),
        "breadcrumbs": breadcrumbs,
        "currentFolder": current,
        "pagination": Pagination::new(page, total),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_reference_accepts_numbers_and_strings() {
        let req: CreateFolderRequest =
            serde_json::from_value(json!({ "name": "Arsip", "parentFolderId": 7 })).unwrap();
        assert_eq!(req.parent_folder_id.unwrap().resolve().unwrap(), Some(7));

        let req: CreateFolderRequest =
            serde_json::from_value(json!({ "name": "Arsip", "parentFolderId": "7" })).unwrap();
        assert_eq!(req.parent_folder_id.unwrap().resolve().unwrap(), Some(7));

        let req: CreateFolderRequest =
            serde_json::from_value(json!({ "name": "Arsip", "parentFolderId": null })).unwrap();
        assert!(req.parent_folder_id.is_none());
    }
}
