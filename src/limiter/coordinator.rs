//! Client coordinator: one limiter per algorithm, one script per round trip.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::RedisConfig;
use crate::error::{Error, Result};
use crate::script::{self, Op, ScriptBank, ScriptSet};

use super::backend::Limit;
use super::rule::{Decision, Kind, Rule};

/// A distributed limiter backed by Redis.
///
/// The coordinator holds no rule state: every call supplies the current
/// wall-clock time, executes one preloaded script by hash, and decodes the
/// sentinel reply. All read-modify-write sequences live inside the scripts,
/// which the Redis script executor runs without interleaving, so concurrent
/// callers on any number of processes observe one coherent counter per key.
///
/// The coordinator is thread-safe and re-entrant; each call borrows one
/// pooled connection for exactly one round trip. The leaky bucket is the
/// exception: its `get` issues a capacity check plus the enqueue, then sleeps
/// the server-computed wait with no connection held.
pub struct RedisLimiter {
    kind: Kind,
    pool: Pool,
    bank: Arc<ScriptBank>,
    clock: Arc<dyn Clock>,
    op_timeout: Duration,
}

impl RedisLimiter {
    /// Connect to Redis and upload this algorithm's scripts.
    ///
    /// Fails with `LoadScript` when Redis is unreachable or rejects an
    /// upload; a limiter with a partial script table must not operate.
    pub async fn connect(kind: Kind, config: &RedisConfig) -> Result<Self> {
        Self::connect_with_clock(kind, config, Arc::new(SystemClock)).await
    }

    /// `connect` with an explicit time source.
    pub async fn connect_with_clock(
        kind: Kind,
        config: &RedisConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let pool = config.create_pool()?;
        let bank = Arc::new(ScriptBank::new(scripts_for(kind)));

        let mut conn = pool
            .get()
            .await
            .map_err(|e| Error::LoadScript(format!("cannot reach redis: {e}")))?;
        bank.ensure_loaded(&mut conn).await?;
        drop(conn);

        debug!(kind = ?kind, "limiter scripts loaded");

        Ok(Self {
            kind,
            pool,
            bank,
            clock,
            op_timeout: config.op_timeout(),
        })
    }

    /// The algorithm this limiter enforces.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Create or overwrite the rule stored at `key`.
    pub async fn add(&self, key: &str, rule: Rule) -> Result<()> {
        self.put(Op::Add, key, rule).await
    }

    /// Replace the rule stored at `key`, resetting its counters.
    pub async fn set(&self, key: &str, rule: Rule) -> Result<()> {
        self.put(Op::Set, key, rule).await
    }

    /// Remove the rule stored at `key`. Removing a missing rule succeeds.
    pub async fn del(&self, key: &str) -> Result<()> {
        self.invoke(Op::Del, key, &[]).await?;
        trace!(key, "rule removed");
        Ok(())
    }

    /// Consume one admission from `key`'s rule.
    ///
    /// For the window and token algorithms this is a single round trip whose
    /// reply is the remaining quota or a sentinel. For the leaky bucket the
    /// reply is a wait duration and the call sleeps it out, making the
    /// caller's elapsed time track the configured drain rate.
    pub async fn get(&self, key: &str) -> Result<Decision> {
        match self.kind {
            Kind::LeakyBucket => self.get_paced(key).await,
            _ => {
                let now = self.clock.now_micros() as i64;
                let code = self.invoke(Op::Get, key, &[now]).await?;
                let decision = decode_quota(code)?;
                if decision.reached {
                    debug!(key, "limit reached");
                } else {
                    trace!(key, left = decision.left, "admitted");
                }
                Ok(decision)
            }
        }
    }

    async fn get_paced(&self, key: &str) -> Result<Decision> {
        decode_chk(self.invoke(Op::Chk, key, &[]).await?)?;

        let now = self.clock.now_micros() as i64;
        let wait_us = decode_wait(self.invoke(Op::Get, key, &[now]).await?)?;

        if wait_us > 0 {
            trace!(key, wait_us, "pacing request");
            tokio::time::sleep(Duration::from_micros(wait_us)).await;
        }
        Ok(Decision {
            reached: false,
            left: -1,
        })
    }

    async fn put(&self, op: Op, key: &str, rule: Rule) -> Result<()> {
        rule.validate(self.kind)?;
        let now = self.clock.now_micros() as i64;
        self.invoke(op, key, &rule.script_args(now)).await?;
        trace!(key, rule = ?rule, "rule stored");
        Ok(())
    }

    /// One `EVALSHA` round trip on a pooled connection, bounded by the
    /// configured read + write budget. The connection is released before the
    /// caller does anything else, in particular before the pacer sleeps.
    async fn invoke(&self, op: Op, key: &str, args: &[i64]) -> Result<i64> {
        let script = self.bank.script(op)?;

        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(script.hash()).arg(1).arg(key);
        for arg in args {
            cmd.arg(*arg);
        }

        let mut conn = self.pool.get().await?;
        let reply: i64 = tokio::time::timeout(self.op_timeout, cmd.query_async(&mut conn))
            .await
            .map_err(|_| Error::Timeout(self.op_timeout))??;
        Ok(reply)
    }
}

impl std::fmt::Debug for RedisLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLimiter")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Limit for RedisLimiter {
    async fn add(&self, key: &str, rule: Rule) -> Result<()> {
        RedisLimiter::add(self, key, rule).await
    }

    async fn get(&self, key: &str) -> Result<Decision> {
        RedisLimiter::get(self, key).await
    }

    async fn set(&self, key: &str, rule: Rule) -> Result<()> {
        RedisLimiter::set(self, key, rule).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        RedisLimiter::del(self, key).await
    }
}

fn scripts_for(kind: Kind) -> ScriptSet {
    match kind {
        Kind::FixedWindow => script::fixed_window::scripts(),
        Kind::SlideWindow => script::sliding_window::scripts(),
        Kind::TokenBucket => script::token_bucket::scripts(),
        Kind::LeakyBucket => script::leaky_bucket::scripts(),
    }
}

/// Decode the shared quota sentinels of the fixed, sliding, and token
/// scripts: -2 no rule, -1 reached, n >= 0 remaining.
fn decode_quota(code: i64) -> Result<Decision> {
    match code {
        -2 => Err(Error::ItemNotExist),
        -1 => Ok(Decision {
            reached: true,
            left: 0,
        }),
        n if n >= 0 => Ok(Decision {
            reached: false,
            left: n,
        }),
        other => Err(Error::Unknown(format!("unexpected script reply {other}"))),
    }
}

/// Decode the leaky-bucket capacity check: -2 no rule, -1 full, 0 room.
fn decode_chk(code: i64) -> Result<()> {
    match code {
        -2 => Err(Error::ItemNotExist),
        -1 => Err(Error::ReqOverFlow),
        0 => Ok(()),
        other => Err(Error::Unknown(format!("unexpected check reply {other}"))),
    }
}

/// Decode the leaky-bucket enqueue reply into microseconds to sleep.
///
/// The queue can fill between the capacity check and the enqueue, so -1 can
/// still surface here.
fn decode_wait(code: i64) -> Result<u64> {
    match code {
        -2 => Err(Error::ItemNotExist),
        -1 => Err(Error::ReqOverFlow),
        n if n >= 0 => Ok(n as u64),
        other => Err(Error::Unknown(format!("unexpected wait reply {other}"))),
    }
}
