//! Limiter trait for abstracting over algorithm coordinators.

use async_trait::async_trait;

use crate::error::Result;

use super::rule::{Decision, Rule};

/// The surface application code consumes.
///
/// All four algorithm coordinators expose the same four operations; this
/// trait lets callers hold any of them behind one object, e.g.
/// `Arc<dyn Limit>` shared across request handlers.
#[async_trait]
pub trait Limit: Send + Sync {
    /// Create or overwrite the rule stored at `key`.
    async fn add(&self, key: &str, rule: Rule) -> Result<()>;

    /// Consume one admission from `key`'s rule and report the outcome.
    async fn get(&self, key: &str) -> Result<Decision>;

    /// Replace the rule stored at `key`, resetting its counters.
    async fn set(&self, key: &str, rule: Rule) -> Result<()>;

    /// Remove the rule stored at `key`. Removing a missing rule succeeds.
    async fn del(&self, key: &str) -> Result<()>;
}
