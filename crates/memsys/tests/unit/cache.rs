use memsys_core::cache::{BlockState, Cache};
use memsys_core::config::ReplacementPolicy;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

fn cache(sets: usize, ways: usize, policy: ReplacementPolicy) -> Cache {
    Cache::new("test", sets, ways, 64, policy, 42).unwrap_or_else(|e| panic!("{e}"))
}

#[rstest]
#[case(0, 2, 64)]
#[case(6, 2, 64)]
#[case(4, 0, 64)]
#[case(4, 5, 64)]
#[case(4, 2, 0)]
#[case(4, 2, 96)]
fn geometry_must_be_powers_of_two(#[case] sets: usize, #[case] ways: usize, #[case] block_size: u64) {
    assert!(Cache::new("bad", sets, ways, block_size, ReplacementPolicy::Lru, 1).is_err());
}

#[test]
fn lru_victim_is_least_recently_accessed() {
    let mut c = cache(1, 4, ReplacementPolicy::Lru);
    for way in 0..4 {
        c.set_block(0, way, 0x1000 * (way as u64 + 1), BlockState::Shared);
        c.access_block(0, way);
    }
    assert_eq!(c.way_order(0), Some(vec![3, 2, 1, 0]));

    c.access_block(0, 0);
    assert_eq!(c.replace_block(0), 1);
    // The victim is promoted so a second replacement picks another way.
    assert_eq!(c.way_order(0), Some(vec![1, 0, 3, 2]));
    assert_eq!(c.replace_block(0), 2);
}

#[test]
fn fifo_ignores_hits_on_resident_blocks() {
    let mut c = cache(1, 4, ReplacementPolicy::Fifo);
    for way in 0..4 {
        c.set_block(0, way, 0x1000 * (way as u64 + 1), BlockState::Exclusive);
    }
    assert_eq!(c.way_order(0), Some(vec![3, 2, 1, 0]));

    c.access_block(0, 0);
    c.access_block(0, 1);
    assert_eq!(c.way_order(0), Some(vec![3, 2, 1, 0]));
    assert_eq!(c.replace_block(0), 0);
}

#[test]
fn fifo_promotes_on_new_tag_only() {
    let mut c = cache(1, 2, ReplacementPolicy::Fifo);
    c.set_block(0, 0, 0x40, BlockState::Shared);
    c.set_block(0, 1, 0x80, BlockState::Shared);
    assert_eq!(c.way_order(0), Some(vec![1, 0]));

    // Same tag, new state: order unchanged.
    c.set_block(0, 0, 0x40, BlockState::Modified);
    assert_eq!(c.way_order(0), Some(vec![1, 0]));

    c.set_block(0, 0, 0xC0, BlockState::Shared);
    assert_eq!(c.way_order(0), Some(vec![0, 1]));
}

#[test]
fn random_policy_is_seeded() {
    let mut a = cache(2, 8, ReplacementPolicy::Random);
    let mut b = cache(2, 8, ReplacementPolicy::Random);
    let va: Vec<usize> = (0..32).map(|_| a.replace_block(1)).collect();
    let vb: Vec<usize> = (0..32).map(|_| b.replace_block(1)).collect();
    assert_eq!(va, vb);
    assert!(va.iter().all(|&way| way < 8));
    assert_eq!(a.way_order(1), None);
}

#[test]
fn lookup_needs_a_valid_tag_match() {
    let mut c = cache(4, 2, ReplacementPolicy::Lru);
    let (set, tag, _) = c.decode_address(0x2345);
    c.set_block(set, 1, tag, BlockState::Owned);
    assert_eq!(c.find_block(0x2340), Some((set, 1, BlockState::Owned)));
    assert_eq!(c.find_block(0x237F), Some((set, 1, BlockState::Owned)));
    assert_eq!(c.find_block(0x2380), None);

    c.set_state(set, 1, BlockState::Invalid);
    assert_eq!(c.find_block(0x2340), None);
}

#[test]
fn block_state_predicates() {
    assert!(!BlockState::Invalid.is_valid());
    for state in [
        BlockState::NonCoherent,
        BlockState::Modified,
        BlockState::Owned,
        BlockState::Exclusive,
        BlockState::Shared,
    ] {
        assert!(state.is_valid());
    }
    assert!(BlockState::Modified.is_dirty());
    assert!(BlockState::Owned.is_dirty());
    assert!(BlockState::NonCoherent.is_dirty());
    assert!(!BlockState::Exclusive.is_dirty());
    assert!(!BlockState::Shared.is_dirty());
    assert_eq!(BlockState::NonCoherent.letter(), 'N');
}

proptest! {
    #[test]
    fn decode_splits_address(addr in any::<u64>(), log_sets in 0u32..8, log_ways in 0u32..4, log_bs in 2u32..10) {
        let sets = 1usize << log_sets;
        let bs = 1u64 << log_bs;
        let c = Cache::new("p", sets, 1 << log_ways, bs, ReplacementPolicy::Lru, 1)
            .unwrap_or_else(|e| panic!("{e}"));
        let (set, tag, offset) = c.decode_address(addr);
        prop_assert_eq!(tag + offset, addr);
        prop_assert_eq!(tag % bs, 0);
        prop_assert!(offset < bs);
        prop_assert_eq!(set as u64, (addr / bs) % sets as u64);
    }
}
