use libpubsub::time::{Backoff, BackoffConfig, MIN_DELAY_MS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_random_schedules_are_monotonic_and_capped() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..500 {
        let config = BackoffConfig {
            initial_ms: rng.gen_range(0..5_000),
            max_ms: rng.gen_range(1..120_000),
            multiplier: rng.gen_range(0..8),
        };
        let mut backoff = Backoff::new(config);

        let delays: Vec<u32> = (0..rng.gen_range(1..40)).map(|_| backoff.next_delay()).collect();
        assert!(
            delays.windows(2).all(|pair| pair[0] <= pair[1]),
            "{:?}: {:?}",
            config,
            delays
        );
        assert!(delays.iter().all(|&delay| delay <= config.max_ms.max(MIN_DELAY_MS)));
        assert_eq!(
            delays[0],
            config.initial_ms.min(config.max_ms).max(MIN_DELAY_MS)
        );
    }
}

#[test]
fn test_schedule_reaches_cap() {
    let mut backoff = Backoff::new(BackoffConfig {
        initial_ms: 1,
        max_ms: 60_000,
        multiplier: 2,
    });
    let last = (0..32).map(|_| backoff.next_delay()).last();
    assert_eq!(last, Some(60_000));
    assert_eq!(backoff.config().max_ms, 60_000);
}
