#![deny(warnings)]

//! Core domain models and invariants for Todo Mine.
//!
//! This crate defines the serializable types shared by the engine, the stores
//! and the request surface, with validation helpers that guard the basic
//! invariants of tasks and game state. Field names are the wire names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Opaque unique identifier of a task.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Fresh random identifier (UUID v4 text form).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner of a game-state record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub const DEFAULT: &'static str = "default_user";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task priority; drives the completion reward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(ValidationError::UnknownPriority(other.to_string())),
        }
    }
}

/// Task category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
    Health,
    Learning,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Work => "work",
            Category::Personal => "personal",
            Category::Health => "health",
            Category::Learning => "learning",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(Category::Work),
            "personal" => Ok(Category::Personal),
            "health" => Ok(Category::Health),
            "learning" => Ok(Category::Learning),
            "other" => Ok(Category::Other),
            other => Err(ValidationError::UnknownCategory(other.to_string())),
        }
    }
}

/// A to-do item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub priority: Priority,
    pub category: Category,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    /// Set iff `completed` is true.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a new, incomplete task from a create payload.
    pub fn from_draft(draft: TaskDraft, id: TaskId, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        if draft.title.trim().is_empty() {
            return Err(ValidationError::BlankTitle);
        }
        Ok(Self {
            id,
            title: draft.title,
            description: Some(draft.description.unwrap_or_default()),
            priority: draft.priority,
            category: draft.category,
            completed: false,
            created_at: now,
            completed_at: None,
        })
    }

    /// Apply a field set as a store would: present fields overwrite.
    pub fn apply_fields(&mut self, fields: &TaskFields) {
        if let Some(title) = &fields.title {
            self.title = title.clone();
        }
        if let Some(description) = &fields.description {
            self.description = Some(description.clone());
        }
        if let Some(priority) = fields.priority {
            self.priority = priority;
        }
        if let Some(category) = fields.category {
            self.category = category;
        }
        if let Some(completed) = fields.completed {
            self.completed = completed;
        }
        if let Some(completed_at) = fields.completed_at {
            self.completed_at = completed_at;
        }
    }
}

/// Create payload for a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            priority: Priority::default(),
            category: Category::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }
}

/// Update payload for a task. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn completed(value: bool) -> Self {
        Self {
            completed: Some(value),
            ..Self::default()
        }
    }
}

/// The field set written by a store update.
///
/// Unlike [`TaskPatch`] it can also set or clear `completed_at`
/// (`Some(None)` clears it).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub completed: Option<bool>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl TaskFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<TaskPatch> for TaskFields {
    fn from(p: TaskPatch) -> Self {
        Self {
            title: p.title,
            description: p.description,
            priority: p.priority,
            category: p.category,
            completed: p.completed,
            completed_at: None,
        }
    }
}

/// Per-user game progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub user_id: UserId,
    pub level: u32,
    pub coins: u64,
    pub mining_power: u32,
    pub auto_miners: u32,
    /// Informational rate; ticks pay per miner, not per rate.
    pub auto_mining_rate: f64,
    pub total_todos_completed: u64,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_activity: DateTime<Utc>,
}

impl GameState {
    /// Fresh record with default values.
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            level: 1,
            coins: 0,
            mining_power: 1,
            auto_miners: 0,
            auto_mining_rate: 0.0,
            total_todos_completed: 0,
            current_streak: 0,
            best_streak: 0,
            last_activity: now,
        }
    }
}

/// Direct override of selected game-state fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameStatsUpdate {
    pub coins: Option<u64>,
    pub mining_power: Option<u32>,
    pub auto_miners: Option<u32>,
}

/// What an upgrade does when bought.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeEffect {
    MiningPower,
    AutoMining,
    Efficiency,
}

impl UpgradeEffect {
    pub fn as_str(self) -> &'static str {
        match self {
            UpgradeEffect::MiningPower => "mining_power",
            UpgradeEffect::AutoMining => "auto_mining",
            UpgradeEffect::Efficiency => "efficiency",
        }
    }
}

/// Static catalog entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpgradeDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub base_cost: u64,
    pub effect: UpgradeEffect,
    pub max_level: u32,
}

/// Catalog entry with level and cost computed for one game state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cost: u64,
    pub effect: UpgradeEffect,
    pub max_level: u32,
    pub current_level: u32,
}

/// Result of a successful purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub message: String,
    pub cost: u64,
    pub new_level: u32,
}

impl PurchaseReceipt {
    pub fn new(name: &str, cost: u64, new_level: u32) -> Self {
        Self {
            message: format!("Upgrade {name} purchased successfully"),
            cost,
            new_level,
        }
    }
}

/// Result of one auto-mining tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMineOutcome {
    pub coins_earned: u64,
    pub new_total: u64,
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[error("title must not be blank")]
    BlankTitle,
    #[error("completed_at must be set iff the task is completed")]
    CompletionTimestampMismatch,
    #[error("level must be >= 1")]
    LevelBelowOne,
    #[error("mining_power must be >= 1")]
    MiningPowerBelowOne,
    #[error("coins must not exceed {max}")]
    CoinsOutOfRange { max: u64 },
    #[error("auto_mining_rate must be finite and >= 0")]
    InvalidMiningRate,
    #[error("best_streak must be >= current_streak")]
    StreakBelowCurrent,
    #[error("unknown priority: {0}")]
    UnknownPriority(String),
    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

/// Validate a stored task.
pub fn validate_task(task: &Task) -> Result<(), ValidationError> {
    if task.title.trim().is_empty() {
        return Err(ValidationError::BlankTitle);
    }
    if task.completed != task.completed_at.is_some() {
        return Err(ValidationError::CompletionTimestampMismatch);
    }
    Ok(())
}

/// Validate an update payload before it touches a store.
pub fn validate_patch(patch: &TaskPatch) -> Result<(), ValidationError> {
    match &patch.title {
        Some(t) if t.trim().is_empty() => Err(ValidationError::BlankTitle),
        _ => Ok(()),
    }
}

/// Largest coin balance a stats override may set; stores keep signed 64-bit
/// integers.
pub const MAX_COINS: u64 = i64::MAX as u64;

/// Validate a stats override.
pub fn validate_stats_update(update: &GameStatsUpdate) -> Result<(), ValidationError> {
    if update.mining_power == Some(0) {
        return Err(ValidationError::MiningPowerBelowOne);
    }
    if update.coins.is_some_and(|c| c > MAX_COINS) {
        return Err(ValidationError::CoinsOutOfRange { max: MAX_COINS });
    }
    Ok(())
}

/// Validate a game-state record.
pub fn validate_game_state(state: &GameState) -> Result<(), ValidationError> {
    if state.level == 0 {
        return Err(ValidationError::LevelBelowOne);
    }
    if state.mining_power == 0 {
        return Err(ValidationError::MiningPowerBelowOne);
    }
    if !state.auto_mining_rate.is_finite() || state.auto_mining_rate < 0.0 {
        return Err(ValidationError::InvalidMiningRate);
    }
    if state.best_streak < state.current_streak {
        return Err(ValidationError::StreakBelowCurrent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn game_state_uses_wire_field_names() {
        let state = GameState::new(UserId::default(), t0());
        let v = serde_json::to_value(&state).unwrap();
        for key in [
            "user_id",
            "level",
            "coins",
            "mining_power",
            "auto_miners",
            "auto_mining_rate",
            "total_todos_completed",
            "current_streak",
            "best_streak",
            "last_activity",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(v["user_id"], "default_user");
        assert_eq!(v["mining_power"], 1);
    }

    #[test]
    fn draft_defaults_and_enum_spelling() {
        let draft: TaskDraft = serde_json::from_str(r#"{"title":"Water plants"}"#).unwrap();
        assert_eq!(draft.priority, Priority::Medium);
        assert_eq!(draft.category, Category::Other);

        let task = Task::from_draft(draft, TaskId("t1".into()), t0()).unwrap();
        assert_eq!(task.description.as_deref(), Some(""));
        assert!(!task.completed);
        validate_task(&task).unwrap();

        let v = serde_json::to_value(&task).unwrap();
        assert_eq!(v["priority"], "medium");
        assert_eq!(v["category"], "other");
        assert!(v["completed_at"].is_null());
    }

    #[test]
    fn blank_title_rejected() {
        let err = Task::from_draft(TaskDraft::new("   "), TaskId::generate(), t0()).unwrap_err();
        assert_eq!(err, ValidationError::BlankTitle);
        let patch = TaskPatch {
            title: Some(String::new()),
            ..TaskPatch::default()
        };
        assert!(validate_patch(&patch).is_err());
    }

    #[test]
    fn apply_fields_can_clear_completion_timestamp() {
        let mut task = Task::from_draft(TaskDraft::new("x"), TaskId::generate(), t0()).unwrap();
        task.apply_fields(&TaskFields {
            completed: Some(true),
            completed_at: Some(Some(t0())),
            ..TaskFields::default()
        });
        validate_task(&task).unwrap();
        task.apply_fields(&TaskFields {
            completed: Some(false),
            completed_at: Some(None),
            ..TaskFields::default()
        });
        assert!(task.completed_at.is_none());
        validate_task(&task).unwrap();
    }

    #[test]
    fn parse_priority_and_category() {
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("health".parse::<Category>().unwrap(), Category::Health);
        assert!("urgent".parse::<Priority>().is_err());
        for p in Priority::ALL {
            assert_eq!(p.as_str().parse::<Priority>().unwrap(), p);
        }
    }

    #[test]
    fn receipt_message() {
        let r = PurchaseReceipt::new("Better Pickaxe", 100, 1);
        assert_eq!(r.message, "Upgrade Better Pickaxe purchased successfully");
    }

    #[test]
    fn stats_update_rejects_zero_power() {
        let u = GameStatsUpdate {
            mining_power: Some(0),
            ..GameStatsUpdate::default()
        };
        assert_eq!(validate_stats_update(&u), Err(ValidationError::MiningPowerBelowOne));
    }

    #[test]
    fn stats_update_caps_coins_at_signed_range() {
        let at_max = GameStatsUpdate {
            coins: Some(MAX_COINS),
            ..GameStatsUpdate::default()
        };
        assert!(validate_stats_update(&at_max).is_ok());
        let over = GameStatsUpdate {
            coins: Some(MAX_COINS + 1),
            ..GameStatsUpdate::default()
        };
        assert_eq!(
            validate_stats_update(&over),
            Err(ValidationError::CoinsOutOfRange { max: MAX_COINS })
        );
    }

    proptest! {
        #[test]
        fn streak_invariant_checked(current in 0u32..1000, best in 0u32..1000) {
            let mut s = GameState::new(UserId::default(), t0());
            s.current_streak = current;
            s.best_streak = best;
            prop_assert_eq!(validate_game_state(&s).is_ok(), best >= current);
        }

        #[test]
        fn rate_must_be_non_negative(rate in -100.0f64..100.0) {
            let mut s = GameState::new(UserId::default(), t0());
            s.auto_mining_rate = rate;
            prop_assert_eq!(validate_game_state(&s).is_ok(), rate >= 0.0);
        }
    }
}
