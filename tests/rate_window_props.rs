use channel_commenter::commenter::{RateLimitConfig, RateLimiter};
use proptest::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Admit,
    Rollback,
    Advance(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Admit),
        1 => Just(Op::Rollback),
        2 => (1u64..=7_200).prop_map(Op::Advance),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn admitted_comments_never_exceed_window_ceilings(
        max_per_hour in 1usize..4,
        extra_per_day in 0usize..4,
        ops in prop::collection::vec(op(), 1..16),
    ) {
        let max_per_day = max_per_hour + extra_per_day;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()?;

        runtime.block_on(async {
            let mut limiter = RateLimiter::new(RateLimitConfig {
                max_per_hour,
                max_per_day,
                initial_delay: Duration::from_secs(1),
                cooldown: Duration::from_secs(600),
            });

            for op in ops {
                match op {
                    Op::Admit => {
                        limiter.admit().await;
                        prop_assert!(limiter.hour_len() <= max_per_hour);
                        prop_assert!(limiter.day_len() <= max_per_day);
                        prop_assert!(limiter.hour_len() >= 1);
                    }
                    Op::Rollback => {
                        let before = limiter.day_len();
                        limiter.rollback();
                        prop_assert_eq!(limiter.day_len(), before.saturating_sub(1));
                    }
                    Op::Advance(secs) => {
                        tokio::time::advance(Duration::from_secs(secs)).await;
                    }
                }
            }
            Ok(())
        })?;
    }
}
