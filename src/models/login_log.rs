//! Append-only audit trail of authentication and account events.
//! Tokens and credentials are never written here.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::warn;

use super::pagination::PageRequest;
use crate::message::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "login_action", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginAction {
    LoginSuccess,
    LoginFailed,
    Logout,
    PasswordChange,
    EmailChange,
    ProfileUpdate,
    SessionTerminated,
    TokenRefresh,
}

impl LoginAction {
    pub const ALL: [LoginAction; 8] = [
        LoginAction::LoginSuccess,
        LoginAction::LoginFailed,
        LoginAction::Logout,
        LoginAction::PasswordChange,
        LoginAction::EmailChange,
        LoginAction::ProfileUpdate,
        LoginAction::SessionTerminated,
        LoginAction::TokenRefresh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LoginAction::LoginSuccess => "LOGIN_SUCCESS",
            LoginAction::LoginFailed => "LOGIN_FAILED",
            LoginAction::Logout => "LOGOUT",
            LoginAction::PasswordChange => "PASSWORD_CHANGE",
            LoginAction::EmailChange => "EMAIL_CHANGE",
            LoginAction::ProfileUpdate => "PROFILE_UPDATE",
            LoginAction::SessionTerminated => "SESSION_TERMINATED",
            LoginAction::TokenRefresh => "TOKEN_REFRESH",
        }
    }
}

impl fmt::Display for LoginAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        LoginAction::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AppError::BadRequest(format!("Unknown action '{wanted}'")))
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LoginLog {
    pub id: i64,
    pub user_id: String,
    pub action: LoginAction,
    pub ip: String,
    pub user_agent: String,
    pub session_id: Option<String>,
    pub metadata: serde_json::Value,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLoginLog {
    pub user_id: String,
    pub action: LoginAction,
    pub ip: String,
    pub user_agent: String,
    pub session_id: Option<String>,
    pub metadata: serde_json::Value,
    pub success: bool,
    pub error_message: Option<String>,
}

impl NewLoginLog {
    pub fn new(user_id: &str, action: LoginAction, ip: String, user_agent: String) -> Self {
        NewLoginLog {
            user_id: user_id.to_string(),
            action,
            ip,
            user_agent,
            session_id: None,
            metadata: serde_json::json!({}),
            success: true,
            error_message: None,
        }
    }

    pub fn session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Writes one entry. A failure is logged and otherwise ignored, so auditing
/// never breaks the request that triggered it.
pub async fn record(pool: &PgPool, entry: NewLoginLog) {
    let result = sqlx::query(
        r#"
        INSERT INTO login_logs (user_id, action, ip, user_agent, session_id, metadata, success, error_message)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&entry.user_id)
    .bind(entry.action)
    .bind(&entry.ip)
    .bind(&entry.user_agent)
    .bind(&entry.session_id)
    .bind(&entry.metadata)
    .bind(entry.success)
    .bind(&entry.error_message)
    .execute(pool)
    .await;

    if let Err(err) = result {
        warn!(user_id = %entry.user_id, action = %entry.action, error = %err, "failed to record login log");
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct LogFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub action: Option<LoginAction>,
}

impl LogFilter {
    pub fn parse<'a>(from: Option<&'a str>, to: Option<&'a str>, action: Option<&'a str>) -> Result<Self, AppError> {
        let present = |value: Option<&'a str>| value.map(str::trim).filter(|v| !v.is_empty());
        Ok(LogFilter {
            from: present(from).map(|raw| parse_bound(raw, false)).transpose()?,
            to: present(to).map(|raw| parse_bound(raw, true)).transpose()?,
            action: present(action).map(str::parse).transpose()?,
        })
    }

    fn query<'a>(&'a self, head: &str, user_id: &'a str) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::new(head);
        builder.push(" WHERE user_id = ").push_bind(user_id);
        if let Some(from) = self.from {
            builder.push(" AND timestamp >= ").push_bind(from);
        }
        if let Some(to) = self.to {
            builder.push(" AND timestamp <= ").push_bind(to);
        }
        if let Some(action) = self.action {
            builder.push(" AND action = ").push_bind(action);
        }
        builder
    }
}

/// RFC 3339 timestamps are taken as is. A bare `YYYY-MM-DD` means the start
/// of that day, or its last microsecond when it closes a range.
pub fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, AppError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date '{raw}'")))?;
    let start = date.and_time(NaiveTime::MIN).and_utc();
    Ok(if end_of_day {
        start + Duration::days(1) - Duration::microseconds(1)
    } else {
        start
    })
}

/// Newest first.
pub async fn history(
    pool: &PgPool,
    user_id: &str,
    filter: &LogFilter,
    page: PageRequest,
) -> Result<(Vec<LoginLog>, i64), sqlx::Error> {
    let total = filter
        .query("SELECT COUNT(*) FROM login_logs", user_id)
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await?;

    let mut select = filter.query("SELECT * FROM login_logs", user_id);
    select
        .push(" ORDER BY timestamp DESC, id DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());
    let logs = select.build_query_as::<LoginLog>().fetch_all(pool).await?;

    Ok((logs, total))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total: i64,
    pub recent_activity: i64,
    pub by_action: BTreeMap<String, i64>,
}

pub async fn stats(pool: &PgPool, user_id: &str) -> Result<LogStats, sqlx::Error> {
    let counts = sqlx::query_as::<_, (LoginAction, i64)>(
        "SELECT action, COUNT(*) FROM login_logs WHERE user_id = $1 GROUP BY action",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let recent_activity = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM login_logs WHERE user_id = $1 AND timestamp >= $2",
    )
    .bind(user_id)
    .bind(Utc::now() - Duration::days(7))
    .fetch_one(pool)
    .await?;

    Ok(LogStats {
        total: counts.iter().map(|(_, count)| count).sum(),
        recent_activity,
        by_action: counts
            .into_iter()
            .map(|(action, count)| (action.to_string(), count))
            .collect(),
    })
}
