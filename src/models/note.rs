use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use super::pagination::PageRequest;
use crate::message::AppError;
use crate::utils::format::like_pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "note_category")]
pub enum NoteCategory {
    Personal,
    Work,
    Important,
    Ideas,
    #[default]
    Other,
}

impl NoteCategory {
    pub const ALL: [NoteCategory; 5] = [
        NoteCategory::Personal,
        NoteCategory::Work,
        NoteCategory::Important,
        NoteCategory::Ideas,
        NoteCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NoteCategory::Personal => "Personal",
            NoteCategory::Work => "Work",
            NoteCategory::Important => "Important",
            NoteCategory::Ideas => "Ideas",
            NoteCategory::Other => "Other",
        }
    }
}

impl fmt::Display for NoteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteCategory {
    type Err = AppError;

    /// Case-insensitive, so `work` and `WORK` both select `Work`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        NoteCategory::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Invalid category '{wanted}'. Allowed: Personal, Work, Important, Ideas, Other"
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: i32,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub category: NoteCategory,
    pub tags: Vec<String>,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for both creating and updating a note.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NoteInput {
    #[validate(length(max = 200, message = "Title cannot exceed 200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 50000, message = "Content cannot exceed 50000 characters"))]
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
}

#[derive(Debug, PartialEq)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub category: NoteCategory,
    pub tags: Vec<String>,
    pub is_pinned: bool,
}

/// Fields to change; `None` keeps the stored value.
#[derive(Debug, Default, PartialEq)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<NoteCategory>,
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

impl NoteInput {
    fn trimmed(self) -> Self {
        let trim = |value: Option<String>| value.map(|v| v.trim().to_string());
        NoteInput {
            title: trim(self.title),
            content: trim(self.content),
            ..self
        }
    }

    pub fn into_new(self) -> Result<NewNote, AppError> {
        let input = self.trimmed();
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        if !present(&input.title) || !present(&input.content) {
            return Err(AppError::BadRequest("Title and content are required".to_string()));
        }
        input.validate()?;

        Ok(NewNote {
            category: input.category.as_deref().map(str::parse).transpose()?.unwrap_or_default(),
            title: input.title.unwrap_or_default(),
            content: input.content.unwrap_or_default(),
            tags: clean_tags(input.tags.unwrap_or_default()),
            is_pinned: input.is_pinned.unwrap_or(false),
        })
    }

    pub fn into_changes(self) -> Result<NoteChanges, AppError> {
        let input = self.trimmed();
        if input.title.as_deref() == Some("") {
            return Err(AppError::Validation("Title cannot be empty".to_string()));
        }
        input.validate()?;

        Ok(NoteChanges {
            category: input.category.as_deref().map(str::parse).transpose()?,
            title: input.title,
            content: input.content,
            tags: input.tags.map(clean_tags),
            is_pinned: input.is_pinned,
        })
    }
}

/// List filter. `category` of `all` (or absent) disables category filtering.
#[derive(Debug, PartialEq)]
pub struct NoteFilter {
    pub category: Option<NoteCategory>,
    pub pattern: Option<String>,
}

impl NoteFilter {
    pub fn new(category: Option<&str>, search: Option<&str>) -> Result<Self, AppError> {
        let category = match category.map(str::trim) {
            None | Some("") => None,
            Some(all) if all.eq_ignore_ascii_case("all") => None,
            Some(other) => Some(other.parse()?),
        };
        let pattern = search.map(str::trim).filter(|s| !s.is_empty()).map(like_pattern);
        Ok(NoteFilter { category, pattern })
    }

    fn query<'a>(&'a self, head: &str, user_id: &'a str) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::new(head);
        builder.push(" WHERE user_id = ").push_bind(user_id);
        if let Some(category) = self.category {
            builder.push(" AND category = ").push_bind(category);
        }
        if let Some(pattern) = &self.pattern {
            builder
                .push(" AND (title ILIKE ")
                .push_bind(pattern)
                .push(" OR content ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        builder
    }
}

/// Pinned notes first, then the most recently updated.
pub async fn list(
    pool: &PgPool,
    user_id: &str,
    filter: &NoteFilter,
    page: PageRequest,
) -> Result<(Vec<Note>, i64), sqlx::Error> {
    let total = filter
        .query("SELECT COUNT(*) FROM notes", user_id)
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await?;

    let mut select = filter.query("SELECT * FROM notes", user_id);
    select
        .push(" ORDER BY is_pinned DESC, updated_at DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());
    let notes = select.build_query_as::<Note>().fetch_all(pool).await?;

    Ok((notes, total))
}

pub async fn find(pool: &PgPool, user_id: &str, id: i32) -> Result<Option<Note>, sqlx::Error> {
    sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn create(pool: &PgPool, user_id: &str, note: &NewNote) -> Result<Note, sqlx::Error> {
    sqlx::query_as::<_, Note>(
        r#"
        INSERT INTO notes (user_id, title, content, category, tags, is_pinned)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&note.title)
    .bind(&note.content)
    .bind(note.category)
    .bind(&note.tags)
    .bind(note.is_pinned)
    .fetch_one(pool)
    .await
}

/// Applies the changes and touches `updated_at`; `None` when no such note.
pub async fn update(
    pool: &PgPool,
    user_id: &str,
    id: i32,
    changes: &NoteChanges,
) -> Result<Option<Note>, sqlx::Error> {
    sqlx::query_as::<_, Note>(
        r#"
        UPDATE notes
        SET title = COALESCE($3, title),
            content = COALESCE($4, content),
            category = COALESCE($5, category),
            tags = COALESCE($6, tags),
            is_pinned = COALESCE($7, is_pinned),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&changes.title)
    .bind(&changes.content)
    .bind(changes.category)
    .bind(&changes.tags)
    .bind(changes.is_pinned)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, user_id: &str, id: i32) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM notes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteStats {
    pub total: i64,
    pub by_category: BTreeMap<String, i64>,
}

impl NoteStats {
    pub fn from_counts(counts: Vec<(NoteCategory, i64)>) -> Self {
        NoteStats {
            total: counts.iter().map(|(_, count)| count).sum(),
            by_category: counts
                .into_iter()
                .map(|(category, count)| (category.to_string(), count))
                .collect(),
        }
    }
}

pub async fn stats(pool: &PgPool, user_id: &str) -> Result<NoteStats, sqlx::Error> {
    let counts = sqlx::query_as::<_, (NoteCategory, i64)>(
        "SELECT category, COUNT(*) FROM notes WHERE user_id = $1 GROUP BY category",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(NoteStats::from_counts(counts))
}

pub async fn count_for_user(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notes WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn delete_all_for_user(pool: &PgPool, user_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM notes WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: Option<&str>, content: Option<&str>) -> NoteInput {
        NoteInput {
            title: title.map(String::from),
            content: content.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn categories_parse_case_insensitively() {
        assert_eq!("work".parse::<NoteCategory>().unwrap(), NoteCategory::Work);
        assert_eq!(" IDEAS ".parse::<NoteCategory>().unwrap(), NoteCategory::Ideas);
        assert!("Urgent".parse::<NoteCategory>().is_err());
    }

    #[test]
    fn new_note_requires_title_and_content() {
        for (title, content) in [(None, Some("x")), (Some("x"), None), (Some("   "), Some("x"))] {
            let err = input(title, content).into_new().unwrap_err();
            assert_eq!(err.to_string(), "Title and content are required");
        }
    }

    #[test]
    fn new_note_is_trimmed_and_defaulted() {
        let note = NoteInput {
            tags: Some(vec![" rapat ".into(), "".into(), "  ".into(), "anggaran".into()]),
            ..input(Some("  Notulen  "), Some(" isi "))
        }
        .into_new()
        .unwrap();

        assert_eq!(
            note,
            NewNote {
                title: "Notulen".into(),
                content: "isi".into(),
                category: NoteCategory::Other,
                tags: vec!["rapat".into(), "anggaran".into()],
                is_pinned: false,
            }
        );
    }

    #[test]
    fn overlong_fields_are_validation_errors() {
        let long_title = "t".repeat(201);
        let err = input(Some(&long_title), Some("x")).into_new().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "Title cannot exceed 200 characters");

        let padded = format!("  {}  ", "t".repeat(200));
        assert!(input(Some(&padded), Some("x")).into_new().is_ok());

        let long_content = "c".repeat(50_001);
        let err = input(Some("t"), Some(&long_content)).into_new().unwrap_err();
        assert_eq!(err.to_string(), "Content cannot exceed 50000 characters");
        let err = input(None, Some(&long_content)).into_changes().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn changes_keep_absent_fields() {
        let changes = NoteInput { is_pinned: Some(true), ..Default::default() }
            .into_changes()
            .unwrap();
        assert_eq!(changes, NoteChanges { is_pinned: Some(true), ..Default::default() });
    }

    #[test]
    fn changes_reject_blank_title() {
        let err = input(Some("  "), None).into_changes().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn filter_treats_all_as_no_category() {
        let filter = NoteFilter::new(Some("all"), Some("  ")).unwrap();
        assert_eq!(filter, NoteFilter { category: None, pattern: None });

        let filter = NoteFilter::new(Some("important"), Some("50%")).unwrap();
        assert_eq!(filter.category, Some(NoteCategory::Important));
        assert_eq!(filter.pattern.as_deref(), Some("%50\\%%"));
    }

    #[test]
    fn filter_builds_parameterised_sql() {
        let filter = NoteFilter::new(Some("Work"), Some("rapat")).unwrap();
        let builder = filter.query("SELECT COUNT(*) FROM notes", "u-1");
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM notes WHERE user_id = $1 AND category = $2 AND (title ILIKE $3 OR content ILIKE $4)"
        );
    }

    #[test]
    fn stats_group_by_category_name() {
        let stats = NoteStats::from_counts(vec![(NoteCategory::Work, 3), (NoteCategory::Ideas, 1)]);
        assert_eq!(stats.total, 4);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json, serde_json::json!({ "total": 4, "byCategory": { "Ideas": 1, "Work": 3 } }));
    }
}
