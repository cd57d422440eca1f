//! Property tests for the capability cache's LRU bound.

use proptest::prelude::*;

use crate::scenarios::cache_eviction_round;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().expect("fuzz runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn cache_never_exceeds_max_entries(count in 0usize..500, max_entries in 1usize..200) {
        let result = runtime().block_on(cache_eviction_round(count, max_entries));
        prop_assert_eq!(result, crate::invariants::CacheInvariantResult::Valid);
    }
}
