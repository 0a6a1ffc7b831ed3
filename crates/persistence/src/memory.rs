//! In-memory stores, used for tests and the `memory` database setting.

use std::collections::HashMap;

use async_trait::async_trait;
use mine_core::{GameState, Task, TaskFields, TaskId, UserId};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{GameStateStore, StoreError, TaskFilter, TaskStore, Versioned};

/// Tasks kept in insertion order.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn find(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .iter()
            .filter(|t| filter.matches(t))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.iter().any(|t| t.id == task.id) {
            return Err(StoreError::Duplicate(task.id.to_string()));
        }
        tasks.push(task.clone());
        debug!(task = %task.id, "task inserted");
        Ok(())
    }

    async fn update_fields(
        &self,
        id: &TaskId,
        fields: &TaskFields,
        expected_completed: Option<bool>,
    ) -> Result<u64, StoreError> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.iter_mut().find(|t| t.id == *id) else {
            return Ok(0);
        };
        if expected_completed.is_some_and(|c| c != task.completed) {
            return Ok(0);
        }
        task.apply_fields(fields);
        Ok(1)
    }

    async fn delete(&self, id: &TaskId) -> Result<u64, StoreError> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|t| t.id != *id);
        Ok((before - tasks.len()) as u64)
    }
}

/// Game states keyed by user.
#[derive(Default)]
pub struct MemoryGameStateStore {
    states: RwLock<HashMap<UserId, Versioned<GameState>>>,
}

impl MemoryGameStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameStateStore for MemoryGameStateStore {
    async fn find(&self, user: &UserId) -> Result<Option<Versioned<GameState>>, StoreError> {
        Ok(self.states.read().await.get(user).cloned())
    }

    async fn upsert(
        &self,
        user: &UserId,
        state: &GameState,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut states = self.states.write().await;
        let current = states.get(user).map(|v| v.version);
        if current != expected_version {
            return Err(StoreError::VersionConflict {
                user: user.to_string(),
                expected: expected_version,
            });
        }
        let version = current.map_or(1, |v| v + 1);
        states.insert(
            user.clone(),
            Versioned {
                value: state.clone(),
                version,
            },
        );
        debug!(%user, version, "game state written");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract;

    #[tokio::test]
    async fn task_store_contract() {
        contract::task_store_roundtrip(&MemoryTaskStore::new()).await;
    }

    #[tokio::test]
    async fn game_state_store_contract() {
        contract::game_state_cas(&MemoryGameStateStore::new()).await;
    }

    #[tokio::test]
    async fn find_respects_limit() {
        let store = MemoryTaskStore::new();
        for i in 0..5 {
            store
                .insert(&contract::task(&format!("t{i}"), mine_core::Category::Other))
                .await
                .unwrap();
        }
        let filter = TaskFilter {
            limit: 3,
            ..TaskFilter::all()
        };
        assert_eq!(store.find(&filter).await.unwrap().len(), 3);
    }
}
