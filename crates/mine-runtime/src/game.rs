//! Game-state service: loads, transforms and writes back one user's record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mine_core::{
    AutoMineOutcome, GameState, GameStatsUpdate, Priority, PurchaseReceipt, UpgradeView, UserId,
};
use mine_econ::{catalog, find_upgrade, EngineError};
use persistence::{GameStateStore, StoreError, Versioned};
use tracing::{debug, info, warn};

use crate::{Clock, RuntimeConfig, ServiceError};

#[derive(Clone)]
pub struct GameService {
    store: Arc<dyn GameStateStore>,
    clock: Arc<dyn Clock>,
    config: RuntimeConfig,
}

impl GameService {
    pub fn new(store: Arc<dyn GameStateStore>, clock: Arc<dyn Clock>, config: RuntimeConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Current state, created with defaults on first access.
    pub async fn stats(&self, user: &UserId) -> Result<GameState, ServiceError> {
        Ok(self.load_or_create(user).await?.value)
    }

    pub async fn upgrades(&self, user: &UserId) -> Result<Vec<UpgradeView>, ServiceError> {
        let state = self.stats(user).await?;
        Ok(mine_econ::list_upgrade_views(&state, catalog()))
    }

    pub async fn update_stats(
        &self,
        user: &UserId,
        update: &GameStatsUpdate,
    ) -> Result<GameState, ServiceError> {
        let (state, ()) = self
            .modify(user, "update_stats", |s, now| {
                Ok((mine_econ::apply_stats_update(s, update, now)?, ()))
            })
            .await?;
        Ok(state)
    }

    /// Pay out one completion. Callers guarantee one call per transition.
    pub async fn apply_completion_reward(
        &self,
        user: &UserId,
        priority: Priority,
    ) -> Result<GameState, ServiceError> {
        let (state, ()) = self
            .modify(user, "completion_reward", |s, now| {
                Ok((mine_econ::apply_completion_reward(s, priority, now), ()))
            })
            .await?;
        info!(
            %user,
            priority = priority.as_str(),
            coins = state.coins,
            level = state.level,
            streak = state.current_streak,
            "completion rewarded"
        );
        Ok(state)
    }

    pub async fn purchase_upgrade(
        &self,
        user: &UserId,
        upgrade_id: &str,
    ) -> Result<PurchaseReceipt, ServiceError> {
        if find_upgrade(upgrade_id).is_none() {
            return Err(EngineError::UpgradeNotFound(upgrade_id.to_string()).into());
        }
        let (state, receipt) = self
            .modify(user, "purchase_upgrade", |s, now| {
                Ok(mine_econ::purchase_upgrade(s, catalog(), upgrade_id, now)?)
            })
            .await?;
        info!(
            %user,
            upgrade = upgrade_id,
            cost = receipt.cost,
            new_level = receipt.new_level,
            coins = state.coins,
            "upgrade purchased"
        );
        Ok(receipt)
    }

    /// One auto-mining tick.
    pub async fn auto_mine(&self, user: &UserId) -> Result<AutoMineOutcome, ServiceError> {
        let (state, coins_earned) = self
            .modify(user, "auto_mine", |s, now| Ok(mine_econ::process_auto_mine(s, now)))
            .await?;
        debug!(%user, coins_earned, coins = state.coins, "auto-mine tick");
        Ok(AutoMineOutcome {
            coins_earned,
            new_total: state.coins,
        })
    }

    async fn load_or_create(&self, user: &UserId) -> Result<Versioned<GameState>, ServiceError> {
        if let Some(found) = self.store.find(user).await? {
            return Ok(found);
        }
        let fresh = GameState::new(user.clone(), self.clock.now());
        match self.store.upsert(user, &fresh, None).await {
            Ok(version) => {
                info!(%user, "game state created");
                Ok(Versioned {
                    value: fresh,
                    version,
                })
            }
            // Someone else created it first; use theirs.
            Err(StoreError::VersionConflict { .. }) => self
                .store
                .find(user)
                .await?
                .ok_or_else(|| ServiceError::Conflict(format!("game state for {user} vanished"))),
            Err(e) => Err(e.into()),
        }
    }

    /// Read-modify-write with compare-and-swap on the record version.
    ///
    /// `f` may run several times and must not have side effects. When it
    /// returns the state unchanged nothing is written.
    async fn modify<T, F>(&self, user: &UserId, op: &str, f: F) -> Result<(GameState, T), ServiceError>
    where
        F: Fn(&GameState, DateTime<Utc>) -> Result<(GameState, T), ServiceError> + Send + Sync,
        T: Send,
    {
        let attempts = self.config.max_write_attempts.max(1);
        for attempt in 1..=attempts {
            let current = self.load_or_create(user).await?;
            let (next, out) = f(&current.value, self.clock.now())?;
            if next == current.value {
                return Ok((next, out));
            }
            match self.store.upsert(user, &next, Some(current.version)).await {
                Ok(_) => return Ok((next, out)),
                Err(StoreError::VersionConflict { .. }) => {
                    warn!(%user, op, attempt, "game state changed concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ServiceError::Conflict(format!(
            "{op} for {user} lost {attempts} write races"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedClock;
    use chrono::{Duration, TimeZone};
    use persistence::MemoryGameStateStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn service(attempts: u32) -> (GameService, Arc<MemoryGameStateStore>, Arc<FixedClock>) {
        let store = Arc::new(MemoryGameStateStore::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let svc = GameService::new(
            store.clone(),
            clock.clone(),
            RuntimeConfig {
                max_write_attempts: attempts,
            },
        );
        (svc, store, clock)
    }

    #[tokio::test]
    async fn first_read_creates_defaults_once() {
        let (svc, store, clock) = service(5);
        let user = UserId::default();
        let s1 = svc.stats(&user).await.unwrap();
        assert_eq!(s1, GameState::new(user.clone(), t0()));
        clock.advance(Duration::hours(1));
        let s2 = svc.stats(&user).await.unwrap();
        assert_eq!(s2.last_activity, t0());
        assert_eq!(store.find(&user).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let (svc, _, _) = service(5);
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        svc.apply_completion_reward(&alice, Priority::High).await.unwrap();
        assert_eq!(svc.stats(&alice).await.unwrap().coins, 50);
        assert_eq!(svc.stats(&bob).await.unwrap().coins, 0);
    }

    #[tokio::test]
    async fn purchase_persists_and_reprices() {
        let (svc, _, _) = service(5);
        let user = UserId::default();
        svc.update_stats(
            &user,
            &GameStatsUpdate {
                coins: Some(100),
                ..GameStatsUpdate::default()
            },
        )
        .await
        .unwrap();

        let receipt = svc.purchase_upgrade(&user, "mining_power").await.unwrap();
        assert_eq!(receipt.cost, 100);
        assert_eq!(receipt.new_level, 1);

        let state = svc.stats(&user).await.unwrap();
        assert_eq!(state.coins, 0);
        assert_eq!(state.mining_power, 2);
        let views = svc.upgrades(&user).await.unwrap();
        assert_eq!((views[0].current_level, views[0].cost), (1, 200));

        let err = svc.purchase_upgrade(&user, "mining_power").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Engine(EngineError::InsufficientFunds { cost: 200, coins: 0 })
        ));
    }

    #[tokio::test]
    async fn unknown_upgrade_does_not_create_state() {
        let (svc, store, _) = service(5);
        let user = UserId::default();
        let err = svc.purchase_upgrade(&user, "jackhammer").await.unwrap_err();
        assert!(matches!(err, ServiceError::Engine(EngineError::UpgradeNotFound(_))));
        assert!(store.find(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn max_level_leaves_coins_alone() {
        let (svc, _, _) = service(5);
        let user = UserId::default();
        svc.update_stats(
            &user,
            &GameStatsUpdate {
                coins: Some(1_000_000),
                mining_power: Some(11),
                auto_miners: None,
            },
        )
        .await
        .unwrap();
        let err = svc.purchase_upgrade(&user, "mining_power").await.unwrap_err();
        assert!(matches!(err, ServiceError::Engine(EngineError::MaxLevelReached { .. })));
        assert_eq!(svc.stats(&user).await.unwrap().coins, 1_000_000);
    }

    #[tokio::test]
    async fn idle_tick_writes_nothing() {
        let (svc, store, clock) = service(5);
        let user = UserId::default();
        svc.stats(&user).await.unwrap();
        clock.advance(Duration::minutes(1));
        let out = svc.auto_mine(&user).await.unwrap();
        assert_eq!(out, AutoMineOutcome { coins_earned: 0, new_total: 0 });
        let stored = store.find(&user).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.value.last_activity, t0());
    }

    #[tokio::test]
    async fn tick_pays_per_miner() {
        let (svc, _, _) = service(5);
        let user = UserId::default();
        svc.update_stats(
            &user,
            &GameStatsUpdate {
                coins: Some(10),
                auto_miners: Some(3),
                ..GameStatsUpdate::default()
            },
        )
        .await
        .unwrap();
        let out = svc.auto_mine(&user).await.unwrap();
        assert_eq!(out, AutoMineOutcome { coins_earned: 3, new_total: 13 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rewards_are_not_lost() {
        let (svc, _, _) = service(1_000);
        let user = UserId::default();
        let handles: Vec<_> = (0..25)
            .map(|_| {
                let svc = svc.clone();
                let user = user.clone();
                tokio::spawn(async move {
                    svc.apply_completion_reward(&user, Priority::Medium).await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let state = svc.stats(&user).await.unwrap();
        assert_eq!(state.total_todos_completed, 25);
        assert_eq!(state.coins, 25 * 25);
        assert_eq!(state.best_streak, 25);
    }
}
