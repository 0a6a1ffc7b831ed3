#![deny(warnings)]

//! Services wiring the game engine to the stores.
//!
//! Game-state writes are read-modify-write loops guarded by the record
//! version; a lost race re-reads and retries instead of overwriting.

use std::sync::Arc;

use mine_core::{TaskId, ValidationError};
use mine_econ::EngineError;
use persistence::{GameStateStore, StoreError, TaskStore};
use thiserror::Error;

pub mod clock;
pub mod game;
pub mod tasks;

pub use clock::{Clock, FixedClock, SystemClock};
pub use game::GameService;
pub use tasks::{CompletionEdge, TaskService};

/// Errors surfaced by services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Todo not found")]
    TaskNotFound(TaskId),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("conflicting update: {0}")]
    Conflict(String),
    #[error("failed to persist: {0}")]
    Store(#[from] StoreError),
}

/// Tunables for the services.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// Read-modify-write attempts before giving up with `Conflict`.
    pub max_write_attempts: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: 5,
        }
    }
}

/// Task and game services sharing one clock.
#[derive(Clone)]
pub struct Services {
    pub tasks: TaskService,
    pub game: GameService,
}

impl Services {
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        game_store: Arc<dyn GameStateStore>,
        clock: Arc<dyn Clock>,
        config: RuntimeConfig,
    ) -> Self {
        let game = GameService::new(game_store, clock.clone(), config);
        let tasks = TaskService::new(task_store, game.clone(), clock);
        Self { tasks, game }
    }
}
