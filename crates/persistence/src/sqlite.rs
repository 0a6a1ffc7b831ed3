//! SQLite-backed stores (sqlx).
//!
//! Timestamps are stored as RFC 3339 text, enums as their wire spelling.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use mine_core::{GameState, Task, TaskFields, TaskId, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

use crate::{GameStateStore, StoreError, TaskFilter, TaskStore, Versioned};

const TASK_COLUMNS: &str =
    "id, title, description, priority, category, completed, created_at, completed_at";

/// Open (creating if missing) the database at `url` and run migrations.
pub async fn init_db(url: &str) -> Result<SqlitePool, StoreError> {
    let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    // Every connection to an in-memory database sees its own empty database.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect_with(opts)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!(%url, "database ready");
    Ok(pool)
}

/// Both stores over one connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(init_db(url).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {s:?}: {e}")))
}

fn to_i64(field: &str, v: u64) -> Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::Corrupt(format!("{field} out of range: {v}")))
}

fn from_i64<T: TryFrom<i64>>(field: &str, v: i64) -> Result<T, StoreError> {
    T::try_from(v).map_err(|_| StoreError::Corrupt(format!("{field} out of range: {v}")))
}

fn task_from_row(row: &SqliteRow) -> Result<Task, StoreError> {
    let priority: String = row.try_get("priority")?;
    let category: String = row.try_get("category")?;
    let created_at: String = row.try_get("created_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    Ok(Task {
        id: TaskId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        priority: priority
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{e}")))?,
        category: category
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{e}")))?,
        completed: row.try_get("completed")?,
        created_at: parse_ts(&created_at)?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
    })
}

fn state_from_row(row: &SqliteRow) -> Result<Versioned<GameState>, StoreError> {
    let last_activity: String = row.try_get("last_activity")?;
    let value = GameState {
        user_id: UserId(row.try_get("user_id")?),
        level: from_i64("level", row.try_get("level")?)?,
        coins: from_i64("coins", row.try_get("coins")?)?,
        mining_power: from_i64("mining_power", row.try_get("mining_power")?)?,
        auto_miners: from_i64("auto_miners", row.try_get("auto_miners")?)?,
        auto_mining_rate: row.try_get("auto_mining_rate")?,
        total_todos_completed: from_i64(
            "total_todos_completed",
            row.try_get("total_todos_completed")?,
        )?,
        current_streak: from_i64("current_streak", row.try_get("current_streak")?)?,
        best_streak: from_i64("best_streak", row.try_get("best_streak")?)?,
        last_activity: parse_ts(&last_activity)?,
    };
    Ok(Versioned {
        value,
        version: from_i64("version", row.try_get("version")?)?,
    })
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1 = 1"));
        if let Some(id) = &filter.id {
            qb.push(" AND id = ").push_bind(id.0.clone());
        }
        if let Some(completed) = filter.completed {
            qb.push(" AND completed = ").push_bind(completed);
        }
        if let Some(category) = filter.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
        qb.push(" ORDER BY rowid LIMIT ")
            .push_bind(to_i64("limit", filter.limit as u64)?);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        let res = sqlx::query(&format!(
            "INSERT OR IGNORE INTO tasks ({TASK_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(task.id.as_str())
        .bind(&task.title)
        .bind(task.description.as_deref())
        .bind(task.priority.as_str())
        .bind(task.category.as_str())
        .bind(task.completed)
        .bind(ts(&task.created_at))
        .bind(task.completed_at.as_ref().map(ts))
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::Duplicate(task.id.to_string()));
        }
        debug!(task = %task.id, "task inserted");
        Ok(())
    }

    async fn update_fields(
        &self,
        id: &TaskId,
        fields: &TaskFields,
        expected_completed: Option<bool>,
    ) -> Result<u64, StoreError> {
        if fields.is_empty() {
            let filter = TaskFilter {
                completed: expected_completed,
                ..TaskFilter::by_id(id)
            };
            return Ok(TaskStore::find(self, &filter).await?.len() as u64);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE tasks SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(title) = &fields.title {
                set.push("title = ").push_bind_unseparated(title.clone());
            }
            if let Some(description) = &fields.description {
                set.push("description = ")
                    .push_bind_unseparated(description.clone());
            }
            if let Some(priority) = fields.priority {
                set.push("priority = ").push_bind_unseparated(priority.as_str());
            }
            if let Some(category) = fields.category {
                set.push("category = ").push_bind_unseparated(category.as_str());
            }
            if let Some(completed) = fields.completed {
                set.push("completed = ").push_bind_unseparated(completed);
            }
            if let Some(completed_at) = &fields.completed_at {
                set.push("completed_at = ")
                    .push_bind_unseparated(completed_at.as_ref().map(ts));
            }
        }
        qb.push(" WHERE id = ").push_bind(id.0.clone());
        if let Some(completed) = expected_completed {
            qb.push(" AND completed = ").push_bind(completed);
        }
        let res = qb.build().execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    async fn delete(&self, id: &TaskId) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl GameStateStore for SqliteStore {
    async fn find(&self, user: &UserId) -> Result<Option<Versioned<GameState>>, StoreError> {
        let row = sqlx::query("SELECT * FROM game_stats WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(state_from_row).transpose()
    }

    async fn upsert(
        &self,
        user: &UserId,
        state: &GameState,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let version = expected_version.map_or(1, |v| v + 1);
        let sql = match expected_version {
            None => {
                "INSERT OR IGNORE INTO game_stats (level, coins, mining_power, auto_miners, \
                 auto_mining_rate, total_todos_completed, current_streak, best_streak, \
                 last_activity, version, user_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            }
            Some(_) => {
                "UPDATE game_stats SET level = ?, coins = ?, mining_power = ?, auto_miners = ?, \
                 auto_mining_rate = ?, total_todos_completed = ?, current_streak = ?, \
                 best_streak = ?, last_activity = ?, version = ? \
                 WHERE user_id = ? AND version = ?"
            }
        };
        let mut query = sqlx::query(sql)
            .bind(i64::from(state.level))
            .bind(to_i64("coins", state.coins)?)
            .bind(i64::from(state.mining_power))
            .bind(i64::from(state.auto_miners))
            .bind(state.auto_mining_rate)
            .bind(to_i64("total_todos_completed", state.total_todos_completed)?)
            .bind(i64::from(state.current_streak))
            .bind(i64::from(state.best_streak))
            .bind(ts(&state.last_activity))
            .bind(to_i64("version", version)?)
            .bind(user.as_str());
        if let Some(expected) = expected_version {
            query = query.bind(to_i64("version", expected)?);
        }
        let res = query.execute(&self.pool).await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                user: user.to_string(),
                expected: expected_version,
            });
        }
        debug!(%user, version, "game state written");
        Ok(version)
    }
}
