//! Game state engine: derived values and validated state transitions.
//!
//! Transitions take the current state by reference and return a new one, so a
//! failed transition can never leave a half-applied state behind.

use chrono::{DateTime, Utc};
use mine_core::{
    validate_stats_update, GameState, GameStatsUpdate, Priority, PurchaseReceipt,
    UpgradeDefinition, UpgradeEffect, UpgradeView, ValidationError,
};
use thiserror::Error;
use tracing::debug;

use crate::coin_reward;

/// Experience granted per completed task when deriving the level.
const EXP_PER_COMPLETION: u64 = 10;
/// Coins paid per auto-miner per tick.
const COINS_PER_MINER_TICK: u64 = 1;
/// Rate contributed by each auto-miner.
const RATE_PER_MINER: f64 = 1.0;
const EFFICIENCY_MULTIPLIER: f64 = 1.5;

/// Errors produced by engine transitions.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum EngineError {
    #[error("Upgrade not found")]
    UpgradeNotFound(String),
    #[error("Upgrade already at max level")]
    MaxLevelReached { upgrade_id: String, max_level: u32 },
    #[error("Not enough coins")]
    InsufficientFunds { cost: u64, coins: u64 },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Level reached with `total_exp` experience: `max(1, floor(exp / 100) + 1)`.
pub fn compute_level(total_exp: u64) -> u32 {
    let level = total_exp / 100 + 1;
    u32::try_from(level).unwrap_or(u32::MAX).max(1)
}

/// Number of times an upgrade with this effect has been bought.
///
/// Efficiency purchases are not tracked anywhere in the state, so their level
/// always reads as 0 and the upgrade never becomes more expensive.
pub fn current_upgrade_level(state: &GameState, effect: UpgradeEffect) -> u32 {
    match effect {
        UpgradeEffect::MiningPower => state.mining_power.saturating_sub(1),
        UpgradeEffect::AutoMining => state.auto_miners,
        UpgradeEffect::Efficiency => 0,
    }
}

/// `base_cost * 2^current_level`, saturating at `u64::MAX`.
pub fn upgrade_cost(base_cost: u64, current_level: u32) -> u64 {
    2u64.checked_pow(current_level)
        .and_then(|m| base_cost.checked_mul(m))
        .unwrap_or(u64::MAX)
}

/// Pay out the reward for one task completion.
///
/// Must be called once per incomplete -> complete transition; the engine
/// cannot tell a repeat from a new completion.
pub fn apply_completion_reward(state: &GameState, priority: Priority, now: DateTime<Utc>) -> GameState {
    let earned = coin_reward(priority).saturating_mul(u64::from(state.mining_power));
    let mut next = state.clone();
    next.coins = state.coins.saturating_add(earned);
    next.total_todos_completed = state.total_todos_completed.saturating_add(1);
    next.level = compute_level(next.total_todos_completed.saturating_mul(EXP_PER_COMPLETION));
    next.current_streak = state.current_streak.saturating_add(1);
    next.best_streak = state.best_streak.max(next.current_streak);
    next.last_activity = now;
    debug!(
        user = %state.user_id,
        priority = priority.as_str(),
        earned,
        coins = next.coins,
        level = next.level,
        "completion reward"
    );
    next
}

/// Buy one level of `upgrade_id` from `catalog`.
///
/// Checks run in order: unknown id, max level, funds. On any error the input
/// state is untouched.
pub fn purchase_upgrade(
    state: &GameState,
    catalog: &[UpgradeDefinition],
    upgrade_id: &str,
    now: DateTime<Utc>,
) -> Result<(GameState, PurchaseReceipt), EngineError> {
    let def = catalog
        .iter()
        .find(|u| u.id == upgrade_id)
        .ok_or_else(|| EngineError::UpgradeNotFound(upgrade_id.to_string()))?;

    let current_level = current_upgrade_level(state, def.effect);
    if current_level >= def.max_level {
        return Err(EngineError::MaxLevelReached {
            upgrade_id: def.id.to_string(),
            max_level: def.max_level,
        });
    }

    let cost = upgrade_cost(def.base_cost, current_level);
    if state.coins < cost {
        return Err(EngineError::InsufficientFunds {
            cost,
            coins: state.coins,
        });
    }

    let mut next = state.clone();
    next.coins = state.coins - cost;
    match def.effect {
        UpgradeEffect::MiningPower => {
            next.mining_power = state.mining_power.saturating_add(1);
        }
        UpgradeEffect::AutoMining => {
            next.auto_miners = state.auto_miners.saturating_add(1);
            next.auto_mining_rate = f64::from(next.auto_miners) * RATE_PER_MINER;
        }
        UpgradeEffect::Efficiency => {
            next.auto_mining_rate = state.auto_mining_rate * EFFICIENCY_MULTIPLIER;
        }
    }
    next.last_activity = now;

    let new_level = current_level + 1;
    debug!(user = %state.user_id, upgrade = def.id, cost, new_level, "upgrade purchased");
    Ok((next, PurchaseReceipt::new(def.name, cost, new_level)))
}

/// One auto-mining tick: each miner yields a fixed amount, regardless of the
/// time since the last tick. Without miners the state comes back unchanged.
pub fn process_auto_mine(state: &GameState, now: DateTime<Utc>) -> (GameState, u64) {
    if state.auto_miners == 0 {
        return (state.clone(), 0);
    }
    let earned = u64::from(state.auto_miners) * COINS_PER_MINER_TICK;
    let mut next = state.clone();
    next.coins = state.coins.saturating_add(earned);
    next.last_activity = now;
    (next, earned)
}

/// Catalog entries with level and cost for `state`, in catalog order.
pub fn list_upgrade_views(state: &GameState, catalog: &[UpgradeDefinition]) -> Vec<UpgradeView> {
    catalog
        .iter()
        .map(|def| {
            let current_level = current_upgrade_level(state, def.effect);
            UpgradeView {
                id: def.id.to_string(),
                name: def.name.to_string(),
                description: def.description.to_string(),
                cost: upgrade_cost(def.base_cost, current_level),
                effect: def.effect,
                max_level: def.max_level,
                current_level,
            }
        })
        .collect()
}

/// Overwrite coins, mining power or miner count directly.
///
/// The auto-mining rate is left as is, even when the miner count changes.
pub fn apply_stats_update(
    state: &GameState,
    update: &GameStatsUpdate,
    now: DateTime<Utc>,
) -> Result<GameState, EngineError> {
    validate_stats_update(update)?;
    let mut next = state.clone();
    if let Some(coins) = update.coins {
        next.coins = coins;
    }
    if let Some(power) = update.mining_power {
        next.mining_power = power;
    }
    if let Some(miners) = update.auto_miners {
        next.auto_miners = miners;
    }
    next.last_activity = now;
    Ok(next)
}
