//! Fixed-window counter scripts.
//!
//! State is one hash per key: `limit`, `window` (µs), `start` (epoch start,
//! µs), `count`. The window resets lazily: the first request observed past
//! the boundary restarts the epoch at its own timestamp. `count` may
//! transiently exceed `limit`; the admit decision is `count <= limit`.

use super::{LuaScript, ScriptSet, DEL};

/// KEYS[1] key, ARGV: limit, window_us, now_us. Overwrites existing state.
const ADD: &str = r#"
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
redis.call('DEL', KEYS[1])
redis.call('HMSET', KEYS[1], 'limit', limit, 'window', window, 'start', now, 'count', 0)
redis.call('PEXPIRE', KEYS[1], math.ceil(window * 2 / 1000))
return 0
"#;

/// KEYS[1] key, ARGV: now_us. Returns -2 absent, -1 reached, else remaining.
const GET: &str = r#"
local state = redis.pcall('HMGET', KEYS[1], 'limit', 'window', 'start', 'count')
if state.err or not state[1] then
  return -2
end
local limit = tonumber(state[1])
local window = tonumber(state[2])
local start = tonumber(state[3])
local count = tonumber(state[4])
if not (limit and window and start and count) then
  return -2
end
local now = tonumber(ARGV[1])
if now - start >= window then
  start = now
  count = 0
end
count = count + 1
redis.call('HMSET', KEYS[1], 'start', start, 'count', count)
redis.call('PEXPIRE', KEYS[1], math.ceil(window * 2 / 1000))
if count > limit then
  return -1
end
return limit - count
"#;

pub(crate) fn scripts() -> ScriptSet {
    ScriptSet {
        add: LuaScript::new("fixed_window.add", ADD),
        get: LuaScript::new("fixed_window.get", GET),
        set: LuaScript::new("fixed_window.set", ADD),
        del: LuaScript::new("fixed_window.del", DEL),
        chk: None,
    }
}
