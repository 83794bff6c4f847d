//! Script bank: Lua sources, content hashes, and upload bookkeeping.
//!
//! Every limiter operation is one server-side Lua script executed by `EVALSHA`.
//! The bank holds each algorithm's `(source, sha1)` table, uploads missing
//! scripts once at initialization, and tracks the uploaded hashes in a
//! process-wide set. Redis caches scripts server-side, so connections created
//! by the pool after init can invoke them by hash without reloading.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{Error, Result};

pub(crate) mod fixed_window;
pub(crate) mod leaky_bucket;
pub(crate) mod sliding_window;
pub(crate) mod token_bucket;

/// Removing a rule is identical for every algorithm.
const DEL: &str = r#"
redis.call('DEL', KEYS[1])
return 0
"#;

/// One operation a limiter can ask its scripts to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Get,
    Set,
    Del,
    Chk,
}

/// A single Lua script with its precomputed content hash.
#[derive(Debug, Clone)]
pub struct LuaScript {
    name: &'static str,
    source: &'static str,
    hash: String,
}

impl LuaScript {
    pub(crate) fn new(name: &'static str, source: &'static str) -> Self {
        let hash = redis::Script::new(source).get_hash().to_string();
        Self { name, source, hash }
    }

    /// Qualified name, e.g. `fixed_window.get`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Lowercase hex sha1 of the source, as Redis computes it.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// The scripts implementing one algorithm.
///
/// `chk` exists only for the leaky bucket, which pre-checks queue occupancy
/// before enqueuing.
#[derive(Debug, Clone)]
pub struct ScriptSet {
    pub add: LuaScript,
    pub get: LuaScript,
    pub set: LuaScript,
    pub del: LuaScript,
    pub chk: Option<LuaScript>,
}

impl ScriptSet {
    fn iter(&self) -> impl Iterator<Item = &LuaScript> {
        [&self.add, &self.get, &self.set, &self.del]
            .into_iter()
            .chain(self.chk.as_ref())
    }
}

/// Holds one algorithm's scripts plus the set of hashes already uploaded.
///
/// The bank is append-only after construction and safe to share across
/// concurrent callers; `loaded` is the only mutable state and is read-mostly
/// after init.
pub struct ScriptBank {
    set: ScriptSet,
    loaded: RwLock<HashSet<String>>,
}

impl ScriptBank {
    pub fn new(set: ScriptSet) -> Self {
        Self {
            set,
            loaded: RwLock::new(HashSet::new()),
        }
    }

    /// Look up the script for an operation.
    ///
    /// Asking for `Chk` on an algorithm without a check script is an arity
    /// bug in the coordinator, reported as `Unknown`.
    pub fn script(&self, op: Op) -> Result<&LuaScript> {
        match op {
            Op::Add => Ok(&self.set.add),
            Op::Get => Ok(&self.set.get),
            Op::Set => Ok(&self.set.set),
            Op::Del => Ok(&self.set.del),
            Op::Chk => self
                .set
                .chk
                .as_ref()
                .ok_or_else(|| Error::Unknown("algorithm has no check script".into())),
        }
    }

    /// Upload any script Redis does not already cache.
    ///
    /// Checks `SCRIPT EXISTS` per hash and issues `SCRIPT LOAD` for the
    /// missing ones. Any failure aborts initialization; the limiter cannot
    /// operate with a partial script table. Retrying is the caller's call.
    pub async fn ensure_loaded<C>(&self, conn: &mut C) -> Result<()>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        for script in self.set.iter() {
            if self.loaded.read().contains(script.hash()) {
                trace!(script = script.name(), "script already uploaded");
                continue;
            }

            let exists: Vec<i64> = redis::cmd("SCRIPT")
                .arg("EXISTS")
                .arg(script.hash())
                .query_async(conn)
                .await
                .map_err(|e| Error::LoadScript(format!("{}: {e}", script.name())))?;

            if exists.first() != Some(&1) {
                let uploaded: String = redis::cmd("SCRIPT")
                    .arg("LOAD")
                    .arg(script.source())
                    .query_async(conn)
                    .await
                    .map_err(|e| Error::LoadScript(format!("{}: {e}", script.name())))?;

                if !uploaded.eq_ignore_ascii_case(script.hash()) {
                    return Err(Error::LoadScript(format!(
                        "{}: server hash {uploaded} does not match {}",
                        script.name(),
                        script.hash()
                    )));
                }
                debug!(script = script.name(), hash = script.hash(), "script uploaded");
            }

            self.loaded.write().insert(script.hash().to_string());
        }

        Ok(())
    }
}
