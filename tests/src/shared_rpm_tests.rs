//! Tear-free hand-off of the RPM value between contexts

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use esc_core::SharedRpm;
use proptest::prelude::*;

/// Both halves carry the same counter, so a torn read shows up as a mismatch
fn patterned(k: u32) -> u32 {
    let k = k & 0xFFFF;
    (k << 16) | k
}

fn is_whole(value: u32) -> bool {
    value >> 16 == value & 0xFFFF
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reader_never_sees_mixed_value() {
    static RPM: SharedRpm = SharedRpm::new();
    static DONE: AtomicBool = AtomicBool::new(false);

    let writer = tokio::task::spawn_blocking(|| {
        for k in 0..200_000u32 {
            RPM.store(Some(patterned(k)));
        }
        DONE.store(true, Ordering::Release);
    });

    let reader = tokio::task::spawn_blocking(|| {
        let mut reads = 0u64;
        while !DONE.load(Ordering::Acquire) {
            if let Some(value) = RPM.load() {
                assert!(is_whole(value), "torn read {:#010x}", value);
            }
            reads += 1;
        }
        reads
    });

    writer.await.unwrap();
    let reads = reader.await.unwrap();
    assert!(reads > 0);
    assert_eq!(RPM.load(), Some(patterned(199_999)));
}

#[tokio::test]
async fn test_unknown_reported_as_zero() {
    let rpm = Arc::new(SharedRpm::new());
    let handle = {
        let rpm = rpm.clone();
        tokio::spawn(async move {
            rpm.store(Some(4200));
            rpm.store(None);
        })
    };
    handle.await.unwrap();

    assert_eq!(rpm.load(), None);
    assert_eq!(rpm.load_or_zero(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_reads_are_always_written_values(seeds in prop::collection::vec(0u32..0x1_0000, 1..64)) {
        let rpm = Arc::new(SharedRpm::new());
        let values: Vec<Option<u32>> = seeds
            .iter()
            .map(|&s| if s % 17 == 0 { None } else { Some(patterned(s)) })
            .collect();

        let writer = {
            let rpm = rpm.clone();
            let values = values.clone();
            std::thread::spawn(move || {
                for v in values {
                    rpm.store(v);
                    std::thread::yield_now();
                }
            })
        };

        let mut observed = Vec::new();
        while !writer.is_finished() {
            observed.push(rpm.load());
        }
        writer.join().unwrap();

        for value in observed.into_iter().flatten() {
            prop_assert!(is_whole(value));
            prop_assert!(values.contains(&Some(value)));
        }
        prop_assert_eq!(rpm.load(), *values.last().unwrap());
    }
}
