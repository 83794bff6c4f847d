//! Limiter kinds, rule parameters, and the per-call decision.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The rate-limiting algorithm a limiter enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Per-epoch counter, reset at window boundaries.
    FixedWindow,
    /// Two-window time-weighted estimator.
    SlideWindow,
    /// Continuously refilling token reservoir with capped capacity.
    TokenBucket,
    /// Fixed-rate drain queue with caller-side pacing.
    LeakyBucket,
}

impl Kind {
    /// Bucket algorithms take a capacity; window algorithms must not.
    pub fn requires_capacity(&self) -> bool {
        matches!(self, Kind::TokenBucket | Kind::LeakyBucket)
    }
}

/// Parameters of one limiting rule.
///
/// The shape must match the limiter's kind: window algorithms take a limit
/// and a period, bucket algorithms additionally take a capacity. A mismatch
/// fails the call instead of silently ignoring or defaulting the extra
/// argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// At most `limit` admissions per `period`.
    Window { limit: i64, period: Duration },
    /// `rate` tokens (or departures) per `period`, holding at most
    /// `capacity` tokens (or queued requests).
    Bucket {
        rate: i64,
        period: Duration,
        capacity: i64,
    },
}

impl Rule {
    /// Rule for the window algorithms.
    pub fn window(limit: i64, period: Duration) -> Self {
        Rule::Window { limit, period }
    }

    /// Rule for the bucket algorithms.
    pub fn bucket(rate: i64, period: Duration, capacity: i64) -> Self {
        Rule::Bucket {
            rate,
            period,
            capacity,
        }
    }

    /// Check this rule against the limiter's kind and value ranges.
    ///
    /// A kind/shape mismatch is `Unknown` (the caller passed the wrong
    /// arity); non-positive values are `InputParam` (a zero rate or period
    /// would divide by zero inside the bucket scripts).
    pub(crate) fn validate(&self, kind: Kind) -> Result<()> {
        match (self, kind.requires_capacity()) {
            (Rule::Window { .. }, true) => {
                return Err(Error::Unknown(format!(
                    "{kind:?} requires a capacity; use Rule::bucket"
                )))
            }
            (Rule::Bucket { .. }, false) => {
                return Err(Error::Unknown(format!(
                    "{kind:?} takes no capacity; use Rule::window"
                )))
            }
            _ => {}
        }

        let (count, period, capacity) = match *self {
            Rule::Window { limit, period } => (limit, period, None),
            Rule::Bucket {
                rate,
                period,
                capacity,
            } => (rate, period, Some(capacity)),
        };

        if count <= 0 {
            return Err(Error::InputParam(format!("limit must be positive, got {count}")));
        }
        if period.is_zero() {
            return Err(Error::InputParam("period must be positive".into()));
        }
        if let Some(cap) = capacity {
            if cap <= 0 {
                return Err(Error::InputParam(format!(
                    "capacity must be positive, got {cap}"
                )));
            }
        }
        Ok(())
    }

    /// Script arguments in wire order: limit, period in µs, now in µs, and
    /// the capacity for bucket rules.
    pub(crate) fn script_args(&self, now_us: i64) -> Vec<i64> {
        match *self {
            Rule::Window { limit, period } => {
                vec![limit, period.as_micros() as i64, now_us]
            }
            Rule::Bucket {
                rate,
                period,
                capacity,
            } => vec![rate, period.as_micros() as i64, now_us, capacity],
        }
    }
}

/// Outcome of one `get` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// True when this call would exceed the limit.
    pub reached: bool,
    /// Remaining admissions in the current accounting period. The leaky
    /// bucket reports -1: it has no remaining-count notion, only pacing.
    pub left: i64,
}
