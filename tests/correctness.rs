//! Correctness and invariant tests for topflow
//!
//! These tests verify the HeavyKeeper contract end to end: sizing, estimates,
//! the ranked view, merge and decay semantics, and the byte encoding. They
//! complement the unit tests in each module by focusing on properties that
//! must always hold.
//!
//! Run with: cargo test --test correctness

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use topflow::frequency::{HashGrid, HeavyKeeper};
use topflow::traits::{ConfigError, DecodeError, FrequencySketch, HeavyHitters, MergeError, Sketch};

fn is_sorted_desc(top: &[(Vec<u8>, u64)]) -> bool {
    top.windows(2).all(|w| w[0].1 >= w[1].1)
}

// ============================================================================
// Construction
// ============================================================================

mod construction {
    use super::*;

    #[test]
    fn sizing_follows_accuracy_parameters() {
        for (epsilon, delta, depth, width) in [
            (0.001, 0.01, 5, 2719),
            (0.01, 0.01, 5, 272),
            (0.1, 0.5, 1, 28),
            (0.5, 0.001, 7, 6),
        ] {
            let hk = HeavyKeeper::new(10, epsilon, delta).unwrap();
            assert_eq!(
                (hk.depth(), hk.width()),
                (depth, width),
                "epsilon={}, delta={}",
                epsilon,
                delta
            );
            assert_eq!(hk.stats().memory_bits, (depth * width * 64) as u64);
        }
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let cases: [(usize, f64, f64, &str); 6] = [
            (0, 0.01, 0.01, "k"),
            (5, 0.0, 0.01, "epsilon"),
            (5, 1.5, 0.01, "epsilon"),
            (5, 0.01, 0.0, "delta"),
            (5, 0.01, 1.0, "delta"),
            (5, 0.01, f64::NAN, "delta"),
        ];

        for (k, epsilon, delta, expected) in cases {
            match HeavyKeeper::new(k, epsilon, delta) {
                Err(ConfigError::InvalidParameter { param, .. }) => assert_eq!(param, expected),
                Ok(_) => panic!("k={}, epsilon={}, delta={} accepted", k, epsilon, delta),
            }
        }
    }

    #[test]
    fn new_sketch_is_empty() {
        let hk = HeavyKeeper::new(10, 0.01, 0.01).unwrap();
        assert!(hk.is_empty());
        assert_eq!(hk.count(), 0);
        assert!(hk.top_k().is_empty());
        assert_eq!(hk.decay_base(), 1.08);
    }
}

// ============================================================================
// Update and estimate
// ============================================================================

mod update_estimate {
    use super::*;

    #[test]
    fn repeating_pattern_scenario() {
        let mut hk = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
        for i in 0..100 {
            hk.update(format!("item_{}", i % 10).as_bytes());
        }

        assert!(hk.estimate(b"item_5") >= 8);
        let top = hk.top_k();
        assert!(top.len() <= 10);
        assert!(is_sorted_desc(&top));
    }

    #[test]
    fn isolated_keys_are_exact() {
        let mut hk = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
        hk.add(b"apple", 100);
        hk.add(b"banana", 50);
        hk.add(b"cherry", 1);

        assert_eq!(hk.estimate(b"apple"), 100);
        assert_eq!(hk.estimate(b"banana"), 50);
        assert_eq!(hk.estimate_frequency(b"cherry"), 1);
    }

    #[test]
    fn unseen_items_estimate_zero() {
        let hk = HeavyKeeper::new(10, 0.01, 0.01).unwrap();
        assert_eq!(hk.estimate(b"never_added"), 0);
    }

    #[test]
    fn total_updates_counts_calls() {
        let mut hk = HeavyKeeper::new(10, 0.01, 0.01).unwrap();
        hk.add(b"a", 10);
        hk.update(b"b");
        hk.update_batch(["c", "d", "e"]);

        assert_eq!(hk.stats().total_updates, 5);
    }

    #[test]
    fn batch_is_equivalent_to_loop() {
        let keys: Vec<Vec<u8>> = (0..2000u32).map(|i| (i % 97).to_le_bytes().to_vec()).collect();

        let mut batched = HeavyKeeper::with_seed(8, 0.05, 0.1, 5).unwrap();
        let mut looped = HeavyKeeper::with_seed(8, 0.05, 0.1, 5).unwrap();

        batched.update_batch(&keys);
        for key in &keys {
            looped.add(key, 1);
        }

        assert_eq!(batched.to_bytes(), looped.to_bytes());
        assert_eq!(batched.top_k(), looped.top_k());
    }

    #[test]
    fn clear_resets_completely() {
        let mut hk = HeavyKeeper::new(10, 0.01, 0.01).unwrap();
        hk.add(b"item", 100);

        hk.clear();

        assert_eq!(hk.estimate(b"item"), 0);
        assert_eq!(hk.total_updates(), 0);
        assert!(hk.is_empty());
        assert_eq!(hk.to_bytes(), HeavyKeeper::new(10, 0.01, 0.01).unwrap().to_bytes());
    }
}

// ============================================================================
// Top-K view
// ============================================================================

mod top_k {
    use super::*;

    #[test]
    fn elephants_beat_mice() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut hk = HeavyKeeper::new(5, 0.01, 0.01).unwrap();

        for _ in 0..20_000 {
            let key = if rng.gen_bool(0.3) {
                format!("elephant_{}", rng.gen_range(0..5))
            } else {
                format!("mouse_{}", rng.gen_range(0..5000))
            };
            hk.update(key.as_bytes());
        }

        let top = hk.top_k();
        assert_eq!(top.len(), 5);
        assert!(is_sorted_desc(&top));
        for (key, _) in &top {
            assert!(
                key.starts_with(b"elephant_"),
                "mouse {:?} in top-k",
                String::from_utf8_lossy(key)
            );
        }
    }

    #[test]
    fn never_exceeds_k() {
        let mut hk = HeavyKeeper::new(3, 0.01, 0.01).unwrap();
        for i in 0..1000 {
            hk.add(format!("k{}", i).as_bytes(), 1 + i % 7);
            assert!(hk.top_k().len() <= 3);
        }
    }

    #[test]
    fn heavy_hitters_filters_by_estimate() {
        let mut hk = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
        hk.add(b"a", 300);
        hk.add(b"b", 200);
        hk.add(b"c", 10);

        let hitters: Vec<Vec<u8>> = hk.heavy_hitters(100).into_iter().map(|(k, _)| k).collect();
        assert_eq!(hitters, vec![b"a".to_vec(), b"b".to_vec()]);
        assert!(hk.contains(b"c"));
    }

    #[test]
    fn equal_estimates_list_most_recent_first() {
        let mut hk = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
        hk.add(b"first", 4);
        hk.add(b"second", 4);

        let keys: Vec<Vec<u8>> = hk.top_k().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"second".to_vec(), b"first".to_vec()]);
    }
}

// ============================================================================
// Merge
// ============================================================================

mod merge {
    use super::*;

    #[test]
    fn shared_key_counts_add_up() {
        let mut a = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
        let mut b = HeavyKeeper::new(10, 0.001, 0.01).unwrap();

        for _ in 0..50 {
            a.update(b"item");
        }
        for _ in 0..30 {
            b.update(b"item");
        }

        a.merge(&b).unwrap();
        assert!(a.estimate(b"item") >= 70);
        assert_eq!(a.stats().total_updates, 80);
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let mut a = HeavyKeeper::new(10, 0.01, 0.01).unwrap();
        for i in 0..500 {
            a.update(format!("x{}", i % 31).as_bytes());
        }
        let stats = a.stats();
        let top = a.top_k();

        a.merge(&HeavyKeeper::new(10, 0.01, 0.01).unwrap()).unwrap();

        assert_eq!(a.stats(), stats);
        assert_eq!(a.top_k(), top);
    }

    #[test]
    fn merge_into_empty_adopts_other() {
        let mut a = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
        let mut b = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
        b.add(b"x", 12);
        b.add(b"y", 3);

        a.merge(&b).unwrap();

        assert_eq!(a.top_k(), b.top_k());
        assert_eq!(a.estimate(b"x"), 12);
        assert_eq!(a.stats(), b.stats());
    }

    #[test]
    fn incompatible_configuration_fails_both_ways() {
        let mut a = HeavyKeeper::new(10, 0.01, 0.01).unwrap();
        let mut b = HeavyKeeper::new(11, 0.01, 0.01).unwrap();
        a.update(b"x");
        b.update(b"y");
        let before = a.to_bytes();

        assert!(matches!(a.merge(&b), Err(MergeError::IncompatibleConfig { .. })));
        assert!(matches!(b.merge(&a), Err(MergeError::IncompatibleConfig { .. })));
        assert_eq!(a.to_bytes(), before);
    }

    #[test]
    fn rebuild_keeps_heaviest_merged_keys() {
        let mut a = HeavyKeeper::new(2, 0.001, 0.01).unwrap();
        let mut b = HeavyKeeper::new(2, 0.001, 0.01).unwrap();
        a.add(b"a1", 100);
        a.add(b"a2", 90);
        b.add(b"b1", 95);
        b.add(b"b2", 10);

        a.merge(&b).unwrap();

        assert_eq!(
            a.top_k(),
            vec![(b"a1".to_vec(), 100), (b"b1".to_vec(), 95)]
        );
    }

    #[test]
    fn key_overwritten_by_heavier_rival_leaves_view() {
        // One row of four cells, so keys are easy to pit against each other
        let mut a = HeavyKeeper::with_seed(2, 0.9, 0.5, 1).unwrap();
        let mut b = HeavyKeeper::with_seed(2, 0.9, 0.5, 1).unwrap();
        let grid = HashGrid::new(a.depth(), a.width());

        let mine = grid.locate(b"a0", 0);
        let rival = (0..)
            .map(|i| format!("b{}", i))
            .find(|key| {
                let probe = grid.locate(key.as_bytes(), 0);
                probe.column == mine.column && probe.fingerprint != mine.fingerprint
            })
            .unwrap();

        a.add(b"a0", 10);
        b.add(rival.as_bytes(), 50);
        a.merge(&b).unwrap();

        assert_eq!(a.estimate(b"a0"), 0);
        assert_eq!(a.top_k(), vec![(rival.into_bytes(), 50)]);
    }

    #[test]
    fn merged_view_matches_merged_grid() {
        for seed in 0..50u64 {
            let mut a = HeavyKeeper::with_seed(6, 0.5, 0.1, seed).unwrap();
            let mut b = HeavyKeeper::with_seed(6, 0.5, 0.1, seed + 1000).unwrap();
            for i in 0..300u64 {
                a.add(format!("k{}", (i * 3 + seed) % 17).as_bytes(), 1 + i % 6);
                b.add(format!("k{}", (i * 5 + seed) % 23).as_bytes(), 1 + i % 4);
            }

            a.merge(&b).unwrap();

            for (key, tracked) in a.top_k() {
                assert_eq!(
                    tracked,
                    a.estimate(&key),
                    "seed {}: {:?} tracked above its merged estimate",
                    seed,
                    String::from_utf8_lossy(&key)
                );
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// For disjoint key sets, merge direction does not change the keys
        /// reported or their estimates.
        #[test]
        fn commutative_for_disjoint_keys(
            left in prop::collection::vec(1u64..200, 1..6),
            right in prop::collection::vec(1u64..200, 1..6),
        ) {
            let build = |prefix: &str, counts: &[u64]| {
                let mut hk = HeavyKeeper::new(10, 0.0001, 0.01).unwrap();
                for (i, &count) in counts.iter().enumerate() {
                    hk.add(format!("{}{}", prefix, i).as_bytes(), count);
                }
                hk
            };
            let a = build("left_", &left);
            let b = build("right_", &right);

            let mut ab = a.clone();
            ab.merge(&b).unwrap();
            let mut ba = b.clone();
            ba.merge(&a).unwrap();

            let keys = |hk: &HeavyKeeper| -> HashSet<Vec<u8>> {
                hk.top_k().into_iter().map(|(k, _)| k).collect()
            };
            prop_assert_eq!(keys(&ab), keys(&ba));

            for key in keys(&ab) {
                prop_assert_eq!(ab.estimate(&key), ba.estimate(&key));
            }
            let tracked = |hk: &HeavyKeeper| -> HashMap<Vec<u8>, u64> {
                hk.top_k().into_iter().collect()
            };
            prop_assert_eq!(tracked(&ab), tracked(&ba));
        }
    }
}

// ============================================================================
// Decay
// ============================================================================

mod decay {
    use super::*;

    #[test]
    fn estimates_never_increase() {
        let mut hk = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
        for i in 0..400u64 {
            hk.add(format!("d{}", i % 9).as_bytes(), 1 + i % 6);
        }

        for _ in 0..20 {
            let before: Vec<(Vec<u8>, u64)> = hk
                .top_k()
                .into_iter()
                .map(|(k, _)| {
                    let e = hk.estimate(&k);
                    (k, e)
                })
                .collect();

            hk.decay();

            for (key, estimate) in before {
                assert!(hk.estimate(&key) <= estimate);
            }
        }
    }

    #[test]
    fn estimates_never_increase_under_collisions() {
        // Width 4: rows are shared, so keys hold some rows and lose others
        for seed in 0..100u64 {
            let mut hk = HeavyKeeper::with_seed(8, 0.9, 0.01, seed).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..400 {
                let key = format!("k{}", rng.gen_range(0..20));
                hk.add(key.as_bytes(), rng.gen_range(1..10));
            }

            let keys: Vec<String> = (0..20).map(|i| format!("k{}", i)).collect();
            for _ in 0..6 {
                let before: Vec<u64> = keys.iter().map(|k| hk.estimate(k.as_bytes())).collect();
                hk.decay();
                for (key, estimate) in keys.iter().zip(before) {
                    assert!(
                        hk.estimate(key.as_bytes()) <= estimate,
                        "seed {}: {} rose above {}",
                        seed,
                        key,
                        estimate
                    );
                }
            }
        }
    }

    #[test]
    fn repeated_decay_drains_everything() {
        let mut hk = HeavyKeeper::new(10, 0.01, 0.01).unwrap();
        hk.add(b"a", 1000);
        hk.add(b"b", 5);

        // 1000 * (1/1.08)^n < 1 once n > ln(1000)/ln(1.08) ≈ 89.8
        for _ in 0..100 {
            hk.decay();
        }

        assert_eq!(hk.estimate(b"a"), 0);
        assert!(hk.top_k().is_empty());
        // decay does not forget how many updates were seen
        assert_eq!(hk.total_updates(), 2);
    }

    #[test]
    fn tracker_matches_grid_after_decay() {
        let mut hk = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
        hk.add(b"a", 500);
        hk.add(b"b", 37);

        hk.decay();
        hk.decay();

        for (key, tracked) in hk.top_k() {
            assert_eq!(hk.estimate(&key), tracked);
        }
    }
}

// ============================================================================
// Serialization
// ============================================================================

mod serialization {
    use super::*;

    #[test]
    fn identical_runs_produce_identical_bytes() {
        let run = |seed| {
            let mut hk = HeavyKeeper::with_seed(6, 0.05, 0.05, seed).unwrap();
            let mut rng = StdRng::seed_from_u64(99);
            for _ in 0..5000 {
                let key: u16 = rng.gen_range(0..300);
                hk.add(&key.to_be_bytes(), rng.gen_range(1..4));
            }
            hk.to_bytes()
        };

        assert_eq!(run(1), run(1));
    }

    #[test]
    fn round_trip_preserves_everything() {
        let mut hk = HeavyKeeper::new(7, 0.02, 0.02).unwrap();
        for i in 0..3000u32 {
            hk.add(&(i % 250).to_le_bytes(), 1 + (i % 5) as u64);
        }

        let restored = HeavyKeeper::from_bytes(&hk.to_bytes()).unwrap();

        assert_eq!(restored.stats(), hk.stats());
        assert_eq!(restored.top_k(), hk.top_k());
        for i in 0..250u32 {
            assert_eq!(restored.estimate(&i.to_le_bytes()), hk.estimate(&i.to_le_bytes()));
        }
        assert_eq!(restored.k(), hk.k());
        assert_eq!(restored.epsilon(), hk.epsilon());
        assert_eq!(restored.delta(), hk.delta());
    }

    #[test]
    fn restored_sketch_keeps_working() {
        let mut hk = HeavyKeeper::new(5, 0.01, 0.01).unwrap();
        hk.add(b"a", 10);

        let mut restored = HeavyKeeper::from_bytes(&hk.to_bytes()).unwrap();
        restored.add(b"a", 5);
        restored.merge(&hk).unwrap();

        assert_eq!(restored.estimate(b"a"), 25);
    }

    #[test]
    fn truncated_input_rejected() {
        let mut hk = HeavyKeeper::new(5, 0.1, 0.1).unwrap();
        hk.add(b"key", 3);
        let bytes = hk.to_bytes();

        for cut in 1..bytes.len() {
            assert!(HeavyKeeper::from_bytes(&bytes[..bytes.len() - cut]).is_err());
        }
    }

    #[test]
    fn header_inconsistent_with_parameters_rejected() {
        let mut bytes = HeavyKeeper::new(5, 0.1, 0.1).unwrap().to_bytes();
        // claim a different delta with the same dimensions
        bytes[20..28].copy_from_slice(&0.0001f64.to_le_bytes());

        assert!(matches!(
            HeavyKeeper::from_bytes(&bytes),
            Err(DecodeError::InvalidHeader(_))
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_json_round_trip() {
        let mut hk = HeavyKeeper::new(5, 0.05, 0.05).unwrap();
        for i in 0..100u32 {
            hk.update(&(i % 11).to_le_bytes());
        }

        let json = serde_json::to_string(&hk).unwrap();
        let restored: HeavyKeeper = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.to_bytes(), hk.to_bytes());
    }
}

// ============================================================================
// Accuracy
// ============================================================================

mod accuracy {
    use super::*;

    /// Over many random mixes, estimates stay within `epsilon * N` of the
    /// true count for at least a `1 - delta` fraction of keys.
    #[test]
    fn error_within_epsilon_bound() {
        let epsilon = 0.01;
        let delta = 0.05;
        let trials = 20;
        let mut checked = 0usize;
        let mut within = 0usize;

        for trial in 0..trials {
            let mut rng = StdRng::seed_from_u64(1000 + trial);
            let mut hk = HeavyKeeper::with_seed(20, epsilon, delta, trial).unwrap();
            let mut truth: HashMap<u32, u64> = HashMap::new();
            let n = 20_000u64;

            let heavy = rng.gen_range(5..20u32);
            for _ in 0..n {
                let key = if rng.gen_bool(0.4) {
                    rng.gen_range(0..heavy)
                } else {
                    rng.gen_range(heavy..10_000)
                };
                *truth.entry(key).or_insert(0) += 1;
                hk.update(&key.to_le_bytes());
            }

            let bound = (epsilon * n as f64) as u64;
            for (key, actual) in &truth {
                checked += 1;
                if hk.estimate(&key.to_le_bytes()).abs_diff(*actual) <= bound {
                    within += 1;
                }
            }
        }

        let rate = within as f64 / checked as f64;
        assert!(
            rate >= 1.0 - delta,
            "only {:.4} of estimates within epsilon bound",
            rate
        );
    }

    #[test]
    fn heavy_keys_are_found() {
        let mut rng = StdRng::seed_from_u64(31337);
        let mut hk = HeavyKeeper::new(10, 0.005, 0.01).unwrap();

        for _ in 0..100_000 {
            let key = if rng.gen_bool(0.5) {
                rng.gen_range(0..10u32)
            } else {
                rng.gen_range(10..50_000u32)
            };
            hk.update(&key.to_le_bytes());
        }

        let found = hk
            .top_k()
            .iter()
            .filter(|(k, _)| u32::from_le_bytes([k[0], k[1], k[2], k[3]]) < 10)
            .count();
        assert_eq!(found, 10);
    }
}
