//! Stake lifecycle and state-commitment tests.

use monsoon_persistence::{MemKvStore, PersistenceError, PersistenceManager};
use monsoon_types::{
    param_names, Actor, ActorCategory, Address, ParamValue, PublicKey, HEIGHT_NOT_USED,
};

fn addr(seed: u8) -> Address {
    Address([seed; 20])
}

fn test_actor(seed: u8, stake: &str) -> Actor {
    Actor {
        address: addr(seed),
        public_key: PublicKey([seed; 32]),
        staked_amount: stake.to_string(),
        chains: vec!["0001".to_string()],
        service_url: format!("https://node{seed}.example"),
        paused_height: HEIGHT_NOT_USED,
        unstaking_height: HEIGHT_NOT_USED,
        output_address: addr(seed.wrapping_add(100)),
        height_inserted: 0,
        height_updated: 0,
    }
}

fn manager() -> PersistenceManager {
    PersistenceManager::new(Box::new(MemKvStore::new()))
}

#[test]
fn stake_then_pause_then_unstake_then_delete() {
    let mut manager = manager();

    // Stake X at height 0.
    let mut ctx = manager.context(0).unwrap();
    ctx.insert_actor(ActorCategory::App, test_actor(1, "1000"));
    ctx.update_state_hash();
    ctx.commit().unwrap();

    // At height 1: pause at height 0, then unstake everything paused
    // strictly before height 1.
    let mut ctx = manager.context(1).unwrap();
    ctx.set_param(
        param_names::max_pause_blocks(ActorCategory::App),
        ParamValue::Int(0),
    );
    ctx.set_param(
        param_names::unstaking_blocks(ActorCategory::App),
        ParamValue::Int(5),
    );
    ctx.set_actor_pause_height(ActorCategory::App, &addr(1), 0)
        .unwrap();
    assert_eq!(ctx.get_pause_height(ActorCategory::App, &addr(1)).unwrap(), 0);

    // Paused at 0 is not "before 0", so nothing happens.
    ctx.unstake_actors_paused_before(ActorCategory::App, 0)
        .unwrap();
    let actor = ctx.get_actor(ActorCategory::App, &addr(1)).unwrap();
    assert_eq!(actor.unstaking_height, HEIGHT_NOT_USED);

    // Before 1 catches it: unstaking_height = context height + unstaking blocks.
    ctx.unstake_actors_paused_before(ActorCategory::App, 1)
        .unwrap();
    let actor = ctx.get_actor(ActorCategory::App, &addr(1)).unwrap();
    assert_eq!(actor.unstaking_height, 1 + 5);
    ctx.update_state_hash();
    ctx.commit().unwrap();

    // At the unstaking height the actor is deleted and its stake credited
    // to the category pool.
    let mut ctx = manager.context(6).unwrap();
    ctx.unstake_actors_that_are_ready().unwrap();
    assert!(ctx.get_actor(ActorCategory::App, &addr(1)).is_none());
    assert_eq!(
        ctx.get_pool_amount(ActorCategory::App.stake_pool()),
        "1000"
    );
    ctx.update_state_hash();
    ctx.commit().unwrap();
}

#[test]
fn unstake_is_not_ready_before_unstaking_height() {
    let mut manager = manager();

    let mut ctx = manager.context(0).unwrap();
    ctx.set_param(
        param_names::unstaking_blocks(ActorCategory::Validator),
        ParamValue::Int(10),
    );
    ctx.insert_actor(ActorCategory::Validator, test_actor(2, "500"));
    ctx.commit().unwrap();

    let mut ctx = manager.context(1).unwrap();
    ctx.set_actor_pause_height(ActorCategory::Validator, &addr(2), 0)
        .unwrap();
    ctx.unstake_actors_paused_before(ActorCategory::Validator, 1)
        .unwrap();
    // unstaking_height = 1 + 10 = 11; at height 1 the actor must survive.
    ctx.unstake_actors_that_are_ready().unwrap();
    assert!(ctx.get_actor(ActorCategory::Validator, &addr(2)).is_some());
    ctx.commit().unwrap();
}

#[test]
fn stake_amount_get_and_set() {
    let mut manager = manager();

    let mut ctx = manager.context(0).unwrap();
    ctx.insert_actor(ActorCategory::ServiceNode, test_actor(3, "777"));
    assert_eq!(
        ctx.get_actor_stake(ActorCategory::ServiceNode, &addr(3)).unwrap(),
        "777"
    );

    ctx.set_actor_stake(ActorCategory::ServiceNode, &addr(3), "778".to_string())
        .unwrap();
    assert_eq!(
        ctx.get_actor_stake(ActorCategory::ServiceNode, &addr(3)).unwrap(),
        "778"
    );

    // Unknown actors surface typed errors.
    assert!(matches!(
        ctx.get_actor_stake(ActorCategory::ServiceNode, &addr(9)),
        Err(PersistenceError::UnknownActor { .. })
    ));
    ctx.release();
}

#[test]
fn actors_are_invisible_before_their_insertion_height() {
    let mut manager = manager();

    let mut ctx = manager.context(0).unwrap();
    ctx.insert_actor(ActorCategory::Fisherman, test_actor(4, "1"));
    ctx.insert_actor(ActorCategory::Fisherman, test_actor(5, "1"));
    ctx.commit().unwrap();

    // Two more at height 3.
    let mut ctx = manager.context(3).unwrap();
    ctx.insert_actor(ActorCategory::Fisherman, test_actor(6, "1"));
    ctx.insert_actor(ActorCategory::Fisherman, test_actor(7, "1"));
    ctx.commit().unwrap();

    // A context at height 5 sees all four; the rows updated at height 3 are
    // exactly the two late arrivals.
    let ctx = manager.context(5).unwrap();
    assert_eq!(ctx.get_all_actors(ActorCategory::Fisherman).len(), 4);
    let updated = ctx.get_actors_updated_at(ActorCategory::Fisherman, 3);
    assert_eq!(updated.len(), 2);
    assert!(updated.iter().all(|a| a.height_inserted == 3));
    ctx.release();
}

#[test]
fn updates_do_not_change_visible_actor_count() {
    let mut manager = manager();

    let mut ctx = manager.context(0).unwrap();
    for seed in 1..=3 {
        ctx.insert_actor(ActorCategory::App, test_actor(seed, "100"));
    }
    ctx.commit().unwrap();

    for height in 1..=3u64 {
        let mut ctx = manager.context(height).unwrap();
        ctx.set_actor_stake(ActorCategory::App, &addr(1), format!("{}", 100 + height))
            .unwrap();
        ctx.commit().unwrap();
        let ctx = manager.context(height + 10).unwrap();
        assert_eq!(ctx.get_all_actors(ActorCategory::App).len(), 3);
        ctx.release();
    }
}

#[test]
fn state_root_is_update_order_independent() {
    let build = |reverse: bool| {
        let mut manager = manager();
        let mut ctx = manager.context(0).unwrap();
        let mut seeds: Vec<u8> = (1..=9).collect();
        if reverse {
            seeds.reverse();
        }
        for seed in seeds {
            ctx.insert_actor(ActorCategory::Validator, test_actor(seed, "50"));
            ctx.set_pool_amount(format!("pool{seed}"), format!("{seed}"));
        }
        ctx.update_state_hash()
    };

    assert_eq!(build(false), build(true));
}

#[test]
fn update_state_hash_is_idempotent() {
    let mut manager = manager();
    let mut ctx = manager.context(0).unwrap();
    ctx.insert_actor(ActorCategory::App, test_actor(1, "10"));
    ctx.set_param("max_block_bytes", ParamValue::Int(1024));

    let first = ctx.update_state_hash();
    let second = ctx.update_state_hash();
    assert_eq!(first, second);

    // A write after hashing changes the root on the next invocation.
    ctx.set_param("max_block_bytes", ParamValue::Int(2048));
    assert_ne!(ctx.update_state_hash(), first);
}

#[test]
fn committed_root_matches_last_update_state_hash() {
    let mut manager = manager();
    let mut ctx = manager.context(0).unwrap();
    ctx.insert_actor(ActorCategory::App, test_actor(1, "10"));
    let root = ctx.update_state_hash();
    assert_eq!(ctx.commit().unwrap(), root);
    assert_eq!(manager.state_root(), root);
    assert_eq!(manager.latest_height(), Some(0));
}

#[test]
fn commit_detects_writes_after_hashing() {
    let mut manager = manager();
    let mut ctx = manager.context(0).unwrap();
    ctx.insert_actor(ActorCategory::App, test_actor(1, "10"));
    ctx.update_state_hash();

    // Writing after the root was sealed is an invariant breach at commit.
    ctx.set_param("max_block_bytes", ParamValue::Int(1));
    assert!(matches!(
        ctx.commit(),
        Err(PersistenceError::RootMismatch { .. })
    ));
}

#[test]
fn release_drops_uncommitted_writes() {
    let mut manager = manager();
    let mut ctx = manager.context(0).unwrap();
    ctx.insert_actor(ActorCategory::App, test_actor(1, "10"));
    ctx.release();

    let ctx = manager.context(1).unwrap();
    assert!(ctx.get_actor(ActorCategory::App, &addr(1)).is_none());
    assert_eq!(manager.latest_height(), None);
}

#[test]
fn context_height_may_not_regress() {
    let mut manager = manager();
    let ctx = manager.context(5).unwrap();
    ctx.commit().unwrap();

    assert!(matches!(
        manager.context(5),
        Err(PersistenceError::HeightRegression { .. })
    ));
    assert!(manager.context(6).is_ok());
}
