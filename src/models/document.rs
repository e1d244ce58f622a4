//! Files and folders of a user's document tree.
//!
//! Every query is scoped by `user_id`, so a row owned by someone else is
//! indistinguishable from a missing one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::breadcrumb::{build_trail, Breadcrumb, MAX_DEPTH};
use super::pagination::PageRequest;
use crate::utils::format::{format_bytes, like_pattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "document_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    File,
    Folder,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i32,
    pub user_id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: DocumentType,
    pub parent_folder_id: Option<i32>,
    pub original_name: String,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub file_url: Option<String>,
    pub verified: bool,
    pub description: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn is_folder(&self) -> bool {
        self.kind == DocumentType::Folder
    }

    pub fn readable_size(&self) -> String {
        format_bytes(self.size.unwrap_or(0))
    }
}

/// A document as listed to the client, with its size spelled out.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentListing {
    #[serde(flatten)]
    pub document: Document,
    pub readable_size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_folder: Option<bool>,
}

impl DocumentListing {
    pub fn new(document: Document) -> Self {
        DocumentListing {
            readable_size: document.readable_size(),
            is_folder: None,
            document,
        }
    }

    pub fn folder_item(document: Document) -> Self {
        DocumentListing {
            is_folder: Some(document.is_folder()),
            ..DocumentListing::new(document)
        }
    }
}

#[derive(Debug)]
pub struct NewFile {
    pub user_id: String,
    pub parent_folder_id: Option<i32>,
    pub original_name: String,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub file_url: String,
    pub description: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TypeTotals {
    pub mime_type: Option<String>,
    pub count: i64,
    pub size: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStat {
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    pub count: i64,
    pub size: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    pub total: i64,
    pub total_documents: i64,
    pub total_size: String,
    pub by_type: Vec<TypeStat>,
}

impl DocumentStats {
    pub fn from_totals(rows: Vec<TypeTotals>) -> Self {
        let total: i64 = rows.iter().map(|row| row.count).sum();
        let total_size: i64 = rows.iter().map(|row| row.size).sum();
        DocumentStats {
            total,
            total_documents: total,
            total_size: format_bytes(total_size),
            by_type: rows
                .into_iter()
                .map(|row| TypeStat {
                    mime_type: row.mime_type,
                    count: row.count,
                    size: format_bytes(row.size),
                })
                .collect(),
        }
    }
}

pub async fn find_owned(pool: &PgPool, user_id: &str, id: i32) -> Result<Option<Document>, sqlx::Error> {
    sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_folder(pool: &PgPool, user_id: &str, id: i32) -> Result<Option<Document>, sqlx::Error> {
    sqlx::query_as::<_, Document>(
        "SELECT * FROM documents WHERE id = $1 AND user_id = $2 AND type = 'folder'",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Whether a sibling of the same type already uses `name`, optionally
/// ignoring the item being renamed.
pub async fn name_taken(
    pool: &PgPool,
    user_id: &str,
    parent_folder_id: Option<i32>,
    kind: DocumentType,
    name: &str,
    except_id: Option<i32>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM documents
            WHERE user_id = $1
              AND parent_folder_id IS NOT DISTINCT FROM $2
              AND type = $3
              AND original_name = $4
              AND ($5::INTEGER IS NULL OR id <> $5)
        )
        "#,
    )
    .bind(user_id)
    .bind(parent_folder_id)
    .bind(kind)
    .bind(name)
    .bind(except_id)
    .fetch_one(pool)
    .await
}

pub async fn create_folder(
    pool: &PgPool,
    user_id: &str,
    name: &str,
    parent_folder_id: Option<i32>,
) -> Result<Document, sqlx::Error> {
    sqlx::query_as::<_, Document>(
        r#"
        INSERT INTO documents (user_id, type, parent_folder_id, original_name, verified)
        VALUES ($1, 'folder', $2, $3, TRUE)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(parent_folder_id)
    .bind(name)
    .fetch_one(pool)
    .await
}

pub async fn insert_file(pool: &PgPool, file: &NewFile) -> Result<Document, sqlx::Error> {
    sqlx::query_as::<_, Document>(
        r#"
        INSERT INTO documents
            (user_id, type, parent_folder_id, original_name, filename, mime_type, size, file_url, verified, description)
        VALUES ($1, 'file', $2, $3, $4, $5, $6, $7, TRUE, $8)
        RETURNING *
        "#,
    )
    .bind(&file.user_id)
    .bind(file.parent_folder_id)
    .bind(&file.original_name)
    .bind(&file.filename)
    .bind(&file.mime_type)
    .bind(file.size)
    .bind(&file.file_url)
    .bind(&file.description)
    .fetch_one(pool)
    .await
}

/// Newest first, optionally filtered by name or description.
pub async fn list(
    pool: &PgPool,
    user_id: &str,
    search: Option<&str>,
    page: PageRequest,
) -> Result<(Vec<Document>, i64), sqlx::Error> {
    let pattern = search.map(str::trim).filter(|s| !s.is_empty()).map(like_pattern);

    let total = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM documents
        WHERE user_id = $1
          AND ($2::TEXT IS NULL OR original_name ILIKE $2 OR description ILIKE $2)
        "#,
    )
    .bind(user_id)
    .bind(&pattern)
    .fetch_one(pool)
    .await?;

    let documents = sqlx::query_as::<_, Document>(
        r#"
        SELECT * FROM documents
        WHERE user_id = $1
          AND ($2::TEXT IS NULL OR original_name ILIKE $2 OR description ILIKE $2)
        ORDER BY uploaded_at DESC, id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(&pattern)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((documents, total))
}

/// Direct children of a folder (`None` for the root), folders first, then by name.
pub async fn children(
    pool: &PgPool,
    user_id: &str,
    parent_folder_id: Option<i32>,
    page: PageRequest,
) -> Result<(Vec<Document>, i64), sqlx::Error> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM documents WHERE user_id = $1 AND parent_folder_id IS NOT DISTINCT FROM $2",
    )
    .bind(user_id)
    .bind(parent_folder_id)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, Document>(
        r#"
        SELECT * FROM documents
        WHERE user_id = $1 AND parent_folder_id IS NOT DISTINCT FROM $2
        ORDER BY (type = 'folder') DESC, original_name ASC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(parent_folder_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok((items, total))
}

/// Trail from the root down to `folder_id`, inclusive.
pub async fn breadcrumbs(pool: &PgPool, user_id: &str, folder_id: i32) -> Result<Vec<Breadcrumb>, sqlx::Error> {
    let ancestors = sqlx::query_as::<_, Breadcrumb>(
        r#"
        WITH RECURSIVE trail AS (
            SELECT id, original_name, parent_folder_id, 0 AS depth
            FROM documents
            WHERE id = $1 AND user_id = $2 AND type = 'folder'

            UNION ALL

            SELECT d.id, d.original_name, d.parent_folder_id, t.depth + 1
            FROM documents d
            JOIN trail t ON d.id = t.parent_folder_id
            WHERE d.user_id = $2 AND d.type = 'folder' AND t.depth < $3
        )
        SELECT id, original_name AS name
        FROM trail
        ORDER BY depth DESC
        "#,
    )
    .bind(folder_id)
    .bind(user_id)
    .bind(MAX_DEPTH)
    .fetch_all(pool)
    .await?;

    Ok(build_trail(ancestors))
}

pub async fn rename(pool: &PgPool, user_id: &str, id: i32, name: &str) -> Result<Document, sqlx::Error> {
    sqlx::query_as::<_, Document>(
        r#"
        UPDATE documents
        SET original_name = $3, updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(name)
    .fetch_one(pool)
    .await
}

/// The item itself plus everything nested below it, at any depth. The cascade
/// removes every descendant row, so every descendant object has to be found here.
pub async fn subtree(pool: &PgPool, user_id: &str, root_id: i32) -> Result<Vec<Document>, sqlx::Error> {
    sqlx::query_as::<_, Document>(
        r#"
        WITH RECURSIVE tree AS (
            SELECT id
            FROM documents
            WHERE id = $1 AND user_id = $2

            UNION

            SELECT d.id
            FROM documents d
            JOIN tree t ON d.parent_folder_id = t.id
            WHERE d.user_id = $2
        )
        SELECT * FROM documents WHERE id IN (SELECT id FROM tree)
        "#,
    )
    .bind(root_id)
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn delete_ids(pool: &PgPool, user_id: &str, ids: &[i32]) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE user_id = $1 AND id = ANY($2)")
        .bind(user_id)
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn stats(pool: &PgPool, user_id: &str) -> Result<DocumentStats, sqlx::Error> {
    let rows = sqlx::query_as::<_, TypeTotals>(
        r#"
        SELECT mime_type, COUNT(*) AS count, COALESCE(SUM(size), 0)::BIGINT AS size
        FROM documents
        WHERE user_id = $1 AND type = 'file'
        GROUP BY mime_type
        ORDER BY count DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(DocumentStats::from_totals(rows))
}

/// Every stored file of a user, for cleaning up objects before removal.
pub async fn files_of_user(pool: &PgPool, user_id: &str) -> Result<Vec<Document>, sqlx::Error> {
    sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE user_id = $1 AND type = 'file'")
        .bind(user_id)
        .fetch_all(pool)
        .await
}

pub async fn count_for_user(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn delete_all_for_user(pool: &PgPool, user_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn document(id: i32, kind: DocumentType, size: Option<i64>) -> Document {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        Document {
            id,
            user_id: "u-1".into(),
            kind,
            parent_folder_id: None,
            original_name: format!("item-{id}"),
            filename: None,
            mime_type: None,
            size,
            file_url: None,
            verified: true,
            description: None,
            uploaded_at: at,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn listing_flattens_document_and_adds_size() {
        let json = serde_json::to_value(DocumentListing::new(document(3, DocumentType::File, Some(1536)))).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["type"], "file");
        assert_eq!(json["originalName"], "item-3");
        assert_eq!(json["readableSize"], "1.5 KB");
        assert!(json.get("isFolder").is_none());
    }

    #[test]
    fn folder_items_are_flagged() {
        let json = serde_json::to_value(DocumentListing::folder_item(document(4, DocumentType::Folder, None))).unwrap();
        assert_eq!(json["isFolder"], true);
        assert_eq!(json["readableSize"], "0 Bytes");
        assert_eq!(json["parentFolderId"], serde_json::Value::Null);
    }

    #[test]
    fn stats_sum_over_types() {
        let stats = DocumentStats::from_totals(vec![
            TypeTotals { mime_type: Some("application/pdf".into()), count: 3, size: 3 * 1024 * 1024 },
            TypeTotals { mime_type: Some("image/png".into()), count: 1, size: 512 },
        ]);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.total_documents, 4);
        assert_eq!(stats.by_type[0].size, "3 MB");

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["byType"][1]["type"], "image/png");
        assert_eq!(json["totalSize"], "3 MB");
    }

    #[test]
    fn empty_stats() {
        let stats = DocumentStats::from_totals(vec![]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.total_size, "0 Bytes");
        assert!(stats.by_type.is_empty());
    }
}
