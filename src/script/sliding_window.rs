//! Sliding-window estimator scripts.
//!
//! State is one hash per key: `limit`, `window` (µs), `start` (current epoch
//! start, µs), `cur`, `prev`. The current rate is estimated by weighting the
//! previous full window by the fraction of it still inside the sliding span:
//! `prev * (1 - elapsed/window) + cur`. An estimate at or above the limit
//! denies; the weighted contribution truncates toward zero when reporting
//! the remaining quota.

use super::{LuaScript, ScriptSet, DEL};

/// KEYS[1] key, ARGV: limit, window_us, now_us. Overwrites existing state.
const ADD: &str = r#"
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
redis.call('DEL', KEYS[1])
redis.call('HMSET', KEYS[1], 'limit', limit, 'window', window, 'start', now, 'cur', 0, 'prev', 0)
redis.call('PEXPIRE', KEYS[1], math.ceil(window * 2 / 1000))
return 0
"#;

/// KEYS[1] key, ARGV: now_us. Returns -2 absent, -1 reached, else remaining.
///
/// Rolls at most once: a gap of two windows or more means both counts are
/// stale and the epoch restarts at `now`, so after a single roll `now` always
/// falls inside the current window.
const GET: &str = r#"
local state = redis.pcall('HMGET', KEYS[1], 'limit', 'window', 'start', 'cur', 'prev')
if state.err or not state[1] then
  return -2
end
local limit = tonumber(state[1])
local window = tonumber(state[2])
local start = tonumber(state[3])
local cur = tonumber(state[4])
local prev = tonumber(state[5])
if not (limit and window and start and cur and prev) then
  return -2
end
local now = tonumber(ARGV[1])
local delta = now - start
if delta >= 2 * window then
  start = now
  cur = 0
  prev = 0
elseif delta >= window then
  prev = cur
  cur = 0
  start = start + window
end
local weight = 1 - (now - start) / window
if weight < 0 then
  weight = 0
elseif weight > 1 then
  weight = 1
end
local est = prev * weight + cur
local left = -1
if est < limit then
  cur = cur + 1
  left = limit - math.floor(est) - 1
end
redis.call('HMSET', KEYS[1], 'start', start, 'cur', cur, 'prev', prev)
redis.call('PEXPIRE', KEYS[1], math.ceil(window * 2 / 1000))
return left
"#;

pub(crate) fn scripts() -> ScriptSet {
    ScriptSet {
        add: LuaScript::new("sliding_window.add", ADD),
        get: LuaScript::new("sliding_window.get", GET),
        set: LuaScript::new("sliding_window.set", ADD),
        del: LuaScript::new("sliding_window.del", DEL),
        chk: None,
    }
}
