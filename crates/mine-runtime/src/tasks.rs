//! Task CRUD plus completion-edge detection.

use std::sync::Arc;

use mine_core::{validate_patch, Task, TaskDraft, TaskFields, TaskId, TaskPatch, UserId};
use persistence::{TaskFilter, TaskStore};
use tracing::{error, info, warn};

use crate::{Clock, GameService, ServiceError};

/// How an update moves a task's completion flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionEdge {
    /// incomplete -> complete; the only edge that pays a reward.
    Completed,
    /// complete -> incomplete; the earlier reward is kept.
    Reopened,
    Unchanged,
}

impl CompletionEdge {
    pub fn detect(previous: bool, requested: Option<bool>) -> Self {
        match (previous, requested) {
            (false, Some(true)) => CompletionEdge::Completed,
            (true, Some(false)) => CompletionEdge::Reopened,
            _ => CompletionEdge::Unchanged,
        }
    }
}

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    game: GameService,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>, game: GameService, clock: Arc<dyn Clock>) -> Self {
        Self { store, game, clock }
    }

    pub async fn list(&self) -> Result<Vec<Task>, ServiceError> {
        Ok(self.store.find(&TaskFilter::all()).await?)
    }

    pub async fn get(&self, id: &TaskId) -> Result<Task, ServiceError> {
        self.store
            .find_one(id)
            .await?
            .ok_or_else(|| ServiceError::TaskNotFound(id.clone()))
    }

    pub async fn create(&self, draft: TaskDraft) -> Result<Task, ServiceError> {
        let task = Task::from_draft(draft, TaskId::generate(), self.clock.now())?;
        self.store.insert(&task).await?;
        info!(task = %task.id, priority = task.priority.as_str(), "task created");
        Ok(task)
    }

    /// Apply `patch` to task `id`, rewarding `user` if this update completes it.
    ///
    /// The task is written before the reward. Whenever the patch names the
    /// completion flag, the write is conditional on the flag still holding
    /// the value read here, so two racing completions cannot both pay out;
    /// the loser gets `Conflict`.
    pub async fn update(
        &self,
        user: &UserId,
        id: &TaskId,
        patch: TaskPatch,
    ) -> Result<Task, ServiceError> {
        validate_patch(&patch)?;
        let existing = self.get(id).await?;
        let edge = CompletionEdge::detect(existing.completed, patch.completed);

        let mut fields = TaskFields::from(patch);
        let guard = match edge {
            CompletionEdge::Completed => {
                fields.completed_at = Some(Some(self.clock.now()));
                Some(false)
            }
            CompletionEdge::Reopened => {
                fields.completed_at = Some(None);
                Some(true)
            }
            CompletionEdge::Unchanged => {
                // A repeated flag is not rewritten, but still pinned so a
                // concurrent flip cannot leave `completed_at` out of step.
                fields.completed.take().map(|_| existing.completed)
            }
        };

        let modified = self.store.update_fields(id, &fields, guard).await?;
        if modified == 0 {
            if guard.is_some() {
                warn!(task = %id, ?edge, "completion flag changed concurrently");
                return Err(ServiceError::Conflict(format!(
                    "todo {id} was updated concurrently"
                )));
            }
            return Err(ServiceError::TaskNotFound(id.clone()));
        }

        match edge {
            CompletionEdge::Completed => {
                // Reward follows the write; the priority is the one stored before it.
                if let Err(e) = self.game.apply_completion_reward(user, existing.priority).await {
                    error!(task = %id, error = %e, "task completed but reward not applied");
                    return Err(e);
                }
            }
            CompletionEdge::Reopened => {
                info!(task = %id, "task reopened, reward kept");
            }
            CompletionEdge::Unchanged => {}
        }

        self.get(id).await
    }

    pub async fn delete(&self, id: &TaskId) -> Result<(), ServiceError> {
        if self.store.delete(id).await? == 0 {
            return Err(ServiceError::TaskNotFound(id.clone()));
        }
        info!(task = %id, "task deleted");
        Ok(())
    }
}
