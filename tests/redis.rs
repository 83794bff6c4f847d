//! End-to-end scenarios against a live Redis.
//!
//! These tests need a reachable Redis (default `127.0.0.1:6379`, override
//! with `REDIS_ADDR` / `REDIS_PASSWORD`) and real wall-clock time, so they
//! are ignored by default:
//!
//! ```sh
//! cargo test --test redis -- --ignored --test-threads=1
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use keylimit::config::RedisConfig;
use keylimit::error::Error;
use keylimit::limiter::{Decision, Kind, RedisLimiter, Rule};

fn config() -> RedisConfig {
    let address = std::env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
    let mut cfg = RedisConfig::new(address);
    if let Ok(password) = std::env::var("REDIS_PASSWORD") {
        cfg.password = password;
    }
    cfg
}

async fn limiter(kind: Kind) -> Arc<RedisLimiter> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Arc::new(
        RedisLimiter::connect(kind, &config())
            .await
            .expect("redis should be reachable"),
    )
}

/// Run `count` concurrent `get`s and tally (admitted, reached) outcomes.
/// Any other error fails the test.
async fn burst(limiter: &Arc<RedisLimiter>, key: &'static str, count: usize) -> (usize, usize) {
    let mut handles = Vec::with_capacity(count);
    for _ in 0..count {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move { limiter.get(key).await }));
    }

    let mut admitted = 0;
    let mut reached = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(Decision { reached: true, .. }) => reached += 1,
            Ok(_) => admitted += 1,
            Err(e) => panic!("unexpected error during burst: {e}"),
        }
    }
    (admitted, reached)
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Redis"]
async fn fixed_window_lifecycle() {
    let limiter = limiter(Kind::FixedWindow).await;
    let key = "keylimit:test:fixed";

    limiter
        .add(key, Rule::window(10, Duration::from_secs(2)))
        .await
        .unwrap();

    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: 9 });

    // Past the boundary the epoch restarts, so the count starts over.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: 9 });

    limiter
        .set(key, Rule::window(15, Duration::from_secs(4)))
        .await
        .unwrap();
    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: 14 });

    let (admitted, reached) = burst(&limiter, key, 18).await;
    assert_eq!(admitted, 14);
    assert_eq!(reached, 4);

    limiter.del(key).await.unwrap();
    assert!(matches!(limiter.get(key).await, Err(Error::ItemNotExist)));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Redis"]
async fn slide_window_lifecycle() {
    let limiter = limiter(Kind::SlideWindow).await;
    let key = "keylimit:test:slide";

    limiter
        .add(key, Rule::window(10, Duration::from_secs(2)))
        .await
        .unwrap();

    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: 9 });

    // One window rolls out; the single previous admission is weighted down
    // to below one, so the full quota is available again.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: 9 });

    limiter
        .set(key, Rule::window(15, Duration::from_secs(4)))
        .await
        .unwrap();
    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: 14 });

    let (admitted, reached) = burst(&limiter, key, 18).await;
    assert_eq!(admitted, 14);
    assert_eq!(reached, 4);

    limiter.del(key).await.unwrap();
    assert!(matches!(limiter.get(key).await, Err(Error::ItemNotExist)));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Redis"]
async fn slide_window_roll_keeps_previous_contribution() {
    let limiter = limiter(Kind::SlideWindow).await;
    let key = "keylimit:test:slide-roll";

    limiter
        .add(key, Rule::window(15, Duration::from_secs(4)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(limiter.get(key).await.unwrap().left, 14);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(limiter.get(key).await.unwrap().left, 13);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(limiter.get(key).await.unwrap().left, 12);

    // Into the next window: the three previous admissions still count at
    // three quarters weight, so `left` holds at 12 instead of resetting.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(limiter.get(key).await.unwrap().left, 12);

    limiter.del(key).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Redis"]
async fn token_bucket_starts_empty_and_refills() {
    let limiter = limiter(Kind::TokenBucket).await;
    let key = "keylimit:test:token";

    limiter
        .add(key, Rule::bucket(4, Duration::from_secs(4), 20))
        .await
        .unwrap();

    // One token per second: after one second the single refilled token is
    // consumed, and the next call finds the bucket empty again.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: 0 });
    assert!(limiter.get(key).await.unwrap().reached);

    tokio::time::sleep(Duration::from_secs(4)).await;
    let (admitted, reached) = burst(&limiter, key, 14).await;
    assert_eq!(admitted, 4);
    assert_eq!(reached, 10);

    limiter
        .set(key, Rule::bucket(4, Duration::from_secs(2), 20))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: 7 });

    limiter
        .set(key, Rule::bucket(4, Duration::from_secs(4), 20))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: 0 });

    // Long idle saturates the bucket at its capacity, not beyond.
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(limiter.get(key).await.unwrap().left, 19);
    assert_eq!(limiter.get(key).await.unwrap().left, 18);

    limiter.del(key).await.unwrap();
    assert!(matches!(limiter.get(key).await, Err(Error::ItemNotExist)));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Redis"]
async fn leaky_bucket_paces_callers() {
    let limiter = limiter(Kind::LeakyBucket).await;
    let key = "keylimit:test:leaky";

    limiter
        .add(key, Rule::bucket(4, Duration::from_secs(4), 20))
        .await
        .unwrap();

    // Four departures per four seconds: the second call waits out the one
    // second emit interval before returning.
    let started = Instant::now();
    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: -1 });
    let d = limiter.get(key).await.unwrap();
    assert_eq!(d, Decision { reached: false, left: -1 });
    let elapsed = started.elapsed().as_millis();
    assert!(
        (800..=1400).contains(&elapsed),
        "two paced calls took {elapsed}ms, expected about 1000ms"
    );

    let (admitted, reached) = burst(&limiter, key, 14).await;
    assert_eq!(admitted, 14);
    assert_eq!(reached, 0);

    limiter
        .set(key, Rule::bucket(4, Duration::from_secs(8), 20))
        .await
        .unwrap();

    let started = Instant::now();
    limiter.get(key).await.unwrap();
    limiter.get(key).await.unwrap();
    let elapsed = started.elapsed().as_millis();
    assert!(
        (1700..=2500).contains(&elapsed),
        "two paced calls took {elapsed}ms, expected about 2000ms"
    );

    // Sleeping between calls only shortens the second wait: total time to
    // the second departure stays one emit interval.
    limiter
        .set(key, Rule::bucket(4, Duration::from_secs(8), 20))
        .await
        .unwrap();
    let started = Instant::now();
    limiter.get(key).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    limiter.get(key).await.unwrap();
    let elapsed = started.elapsed().as_millis();
    assert!(
        (1800..=2400).contains(&elapsed),
        "paced call after sleep took {elapsed}ms total, expected about 2000ms"
    );

    limiter.del(key).await.unwrap();
    assert!(matches!(limiter.get(key).await, Err(Error::ItemNotExist)));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Redis"]
async fn leaky_bucket_overflow_rejects_beyond_capacity() {
    let limiter = limiter(Kind::LeakyBucket).await;
    let key = "keylimit:test:leaky-overflow";

    // Twenty departures per two seconds, room for twenty in the queue.
    limiter
        .add(key, Rule::bucket(20, Duration::from_secs(2), 20))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..22 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move { limiter.get(key).await }));
    }

    let mut admitted = 0;
    let mut overflowed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(d) => {
                assert_eq!(d, Decision { reached: false, left: -1 });
                admitted += 1;
            }
            Err(Error::ReqOverFlow) => overflowed += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(admitted, 20);
    assert_eq!(overflowed, 2);

    limiter.del(key).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Redis"]
async fn set_is_del_then_add() {
    let limiter = limiter(Kind::FixedWindow).await;
    let key = "keylimit:test:set-equiv";

    limiter
        .add(key, Rule::window(5, Duration::from_secs(2)))
        .await
        .unwrap();
    limiter.get(key).await.unwrap();
    limiter.get(key).await.unwrap();

    // Replacing the rule resets the counter exactly like del followed by add.
    limiter
        .set(key, Rule::window(5, Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(limiter.get(key).await.unwrap().left, 4);

    limiter.del(key).await.unwrap();
    limiter
        .add(key, Rule::window(5, Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(limiter.get(key).await.unwrap().left, 4);

    limiter.del(key).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running Redis"]
async fn del_is_idempotent() {
    let limiter = limiter(Kind::TokenBucket).await;
    let key = "keylimit:test:del-idem";

    limiter.del(key).await.unwrap();
    limiter
        .add(key, Rule::bucket(4, Duration::from_secs(4), 20))
        .await
        .unwrap();
    limiter.del(key).await.unwrap();
    limiter.del(key).await.unwrap();
    assert!(matches!(limiter.get(key).await, Err(Error::ItemNotExist)));
}
