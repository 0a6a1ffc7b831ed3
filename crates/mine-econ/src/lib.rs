#![deny(warnings)]

//! Game economy for Todo Mine: reward table, upgrade catalog and the
//! state-transition engine.
//!
//! Everything here is pure. Callers pass the current time in, so the same
//! inputs always produce the same state.

pub mod engine;

pub use engine::{
    apply_completion_reward, apply_stats_update, compute_level, current_upgrade_level,
    list_upgrade_views, process_auto_mine, purchase_upgrade, upgrade_cost, EngineError,
};

use mine_core::{Priority, UpgradeDefinition, UpgradeEffect};

/// Coins earned for completing a task of the given priority, before the
/// mining-power multiplier.
pub fn coin_reward(priority: Priority) -> u64 {
    match priority {
        Priority::Low => 10,
        Priority::Medium => 25,
        Priority::High => 50,
    }
}

/// Experience points for completing a task of the given priority.
pub fn exp_reward(priority: Priority) -> u64 {
    match priority {
        Priority::Low => 5,
        Priority::Medium => 15,
        Priority::High => 30,
    }
}

static CATALOG: [UpgradeDefinition; 3] = [
    UpgradeDefinition {
        id: "mining_power",
        name: "Better Pickaxe",
        description: "Increases coins per todo completion",
        base_cost: 100,
        effect: UpgradeEffect::MiningPower,
        max_level: 10,
    },
    UpgradeDefinition {
        id: "auto_miner_1",
        name: "Basic Auto Miner",
        description: "Automatically generates 1 coin per minute",
        base_cost: 500,
        effect: UpgradeEffect::AutoMining,
        max_level: 5,
    },
    UpgradeDefinition {
        id: "efficiency",
        name: "Mining Efficiency",
        description: "Increases auto mining rate by 50%",
        base_cost: 1000,
        effect: UpgradeEffect::Efficiency,
        max_level: 5,
    },
];

/// The purchasable upgrades, in display order.
///
/// Order is significant: callers that pick e.g. the cheapest upgrade break
/// ties in favour of the first entry.
pub fn catalog() -> &'static [UpgradeDefinition] {
    &CATALOG
}

/// Look up an upgrade by id.
pub fn find_upgrade(id: &str) -> Option<&'static UpgradeDefinition> {
    CATALOG.iter().find(|u| u.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_table_is_fixed() {
        assert_eq!(
            Priority::ALL.map(|p| (coin_reward(p), exp_reward(p))),
            [(10, 5), (25, 15), (50, 30)]
        );
    }

    #[test]
    fn rewards_grow_with_priority() {
        assert!(coin_reward(Priority::Low) < coin_reward(Priority::Medium));
        assert!(coin_reward(Priority::Medium) < coin_reward(Priority::High));
        assert!(exp_reward(Priority::Low) < exp_reward(Priority::High));
    }

    #[test]
    fn catalog_order_and_lookup() {
        let ids: Vec<_> = catalog().iter().map(|u| u.id).collect();
        assert_eq!(ids, ["mining_power", "auto_miner_1", "efficiency"]);
        let miner = find_upgrade("auto_miner_1").unwrap();
        assert_eq!(miner.base_cost, 500);
        assert_eq!(miner.effect, UpgradeEffect::AutoMining);
        assert!(find_upgrade("laser_drill").is_none());
    }
}
