#![deny(warnings)]

//! Persistence layer: task and game-state stores.
//!
//! Both stores are document-style: records are found by key or simple filter
//! and updated field-by-field. Game-state records carry a version number so
//! callers can do compare-and-swap writes.

use async_trait::async_trait;
use mine_core::{Category, GameState, Task, TaskFields, TaskId, UserId};
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryGameStateStore, MemoryTaskStore};
pub use sqlite::{init_db, SqliteStore};

/// Upper bound on records returned by a single task query.
pub const MAX_TASKS_PER_QUERY: usize = 1000;

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/todo-mine.db"
}

/// Store-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Duplicate(String),
    #[error("version conflict for user {user}: expected {expected:?}")]
    VersionConflict { user: String, expected: Option<u64> },
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// A record together with its store version.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Conjunctive task filter. `None` fields match anything.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskFilter {
    pub id: Option<TaskId>,
    pub completed: Option<bool>,
    pub category: Option<Category>,
    pub limit: usize,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self {
            id: None,
            completed: None,
            category: None,
            limit: MAX_TASKS_PER_QUERY,
        }
    }

    pub fn by_id(id: &TaskId) -> Self {
        Self {
            id: Some(id.clone()),
            limit: 1,
            ..Self::all()
        }
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.id.as_ref().map_or(true, |id| *id == task.id)
            && self.completed.map_or(true, |c| c == task.completed)
            && self.category.map_or(true, |c| c == task.category)
    }
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Task records, keyed by id. Queries return insertion order.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    async fn find_one(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.find(&TaskFilter::by_id(id)).await?.into_iter().next())
    }

    async fn insert(&self, task: &Task) -> Result<(), StoreError>;

    /// Set `fields` on task `id`, returning the number of records touched.
    ///
    /// With `expected_completed`, the write only happens while the stored
    /// completion flag still has that value; otherwise 0 is returned.
    async fn update_fields(
        &self,
        id: &TaskId,
        fields: &TaskFields,
        expected_completed: Option<bool>,
    ) -> Result<u64, StoreError>;

    async fn delete(&self, id: &TaskId) -> Result<u64, StoreError>;
}

/// One game-state record per user.
#[async_trait]
pub trait GameStateStore: Send + Sync {
    async fn find(&self, user: &UserId) -> Result<Option<Versioned<GameState>>, StoreError>;

    /// Write `state` for `user` and return the new version.
    ///
    /// `expected_version == None` inserts only if no record exists;
    /// `Some(v)` replaces only while the stored version is `v`. Either
    /// precondition failing yields [`StoreError::VersionConflict`].
    async fn upsert(
        &self,
        user: &UserId,
        state: &GameState,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn url_is_sqlite() {
        assert!(default_sqlite_url().starts_with("sqlite://"));
    }

    #[test]
    fn filter_matches_conjunctively() {
        let t = contract::task("read", Category::Learning);
        assert!(TaskFilter::all().matches(&t));
        assert!(TaskFilter::by_id(&t.id).completed(false).matches(&t));
        assert!(!TaskFilter::all().completed(true).matches(&t));
        assert!(!TaskFilter::all().category(Category::Work).matches(&t));
    }

    const CATEGORIES: [Category; 5] = [
        Category::Work,
        Category::Personal,
        Category::Health,
        Category::Learning,
        Category::Other,
    ];

    proptest! {
        #[test]
        fn filter_is_a_conjunction_of_its_fields(
            task_cat in 0usize..5,
            task_done in any::<bool>(),
            want_cat in proptest::option::of(0usize..5),
            want_done in proptest::option::of(any::<bool>()),
        ) {
            let mut t = contract::task("sort mail", CATEGORIES[task_cat]);
            t.completed = task_done;
            let filter = TaskFilter {
                category: want_cat.map(|i| CATEGORIES[i]),
                completed: want_done,
                ..TaskFilter::all()
            };
            let expected = want_cat.map_or(true, |i| i == task_cat)
                && want_done.map_or(true, |d| d == task_done);
            prop_assert_eq!(filter.matches(&t), expected);

            let other = TaskFilter { id: Some(TaskId::generate()), ..filter };
            prop_assert!(!other.matches(&t));
        }
    }
}
