//! Token-bucket scripts.
//!
//! State is one hash per key: `rate` (tokens per `window`), `window` (µs),
//! `cap`, `tokens`, `last` (last refill, µs). Refill is lazy: each `GET`
//! credits `floor(elapsed * rate / window)` whole tokens and advances `last`
//! by exactly the time those tokens took to accrue, so fractional accrual is
//! never lost to truncation. The bucket starts empty on `ADD`; the first
//! `GET` right after an `ADD` reports the limit as reached until one refill
//! interval has passed. Callers wanting a warm bucket should `SET` and wait.

use super::{LuaScript, ScriptSet, DEL};

/// KEYS[1] key, ARGV: rate, window_us, now_us, capacity. Overwrites.
const ADD: &str = r#"
local rate = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local cap = tonumber(ARGV[4])
redis.call('DEL', KEYS[1])
redis.call('HMSET', KEYS[1], 'rate', rate, 'window', window, 'cap', cap, 'tokens', 0, 'last', now)
redis.call('PEXPIRE', KEYS[1], math.ceil((cap * window * 2 / rate + window) / 1000))
return 0
"#;

/// KEYS[1] key, ARGV: now_us. Returns -2 absent, -1 empty, else tokens left.
const GET: &str = r#"
local state = redis.pcall('HMGET', KEYS[1], 'rate', 'window', 'cap', 'tokens', 'last')
if state.err or not state[1] then
  return -2
end
local rate = tonumber(state[1])
local window = tonumber(state[2])
local cap = tonumber(state[3])
local tokens = tonumber(state[4])
local last = tonumber(state[5])
if not (rate and window and cap and tokens and last) then
  return -2
end
local now = tonumber(ARGV[1])
if now > last then
  local accrued = math.floor((now - last) * rate / window)
  if accrued > 0 then
    tokens = tokens + accrued
    if tokens >= cap then
      tokens = cap
      last = now
    else
      last = last + math.floor(accrued * window / rate)
    end
  end
end
local left = -1
if tokens > 0 then
  tokens = tokens - 1
  left = tokens
end
redis.call('HMSET', KEYS[1], 'tokens', tokens, 'last', last)
redis.call('PEXPIRE', KEYS[1], math.ceil((cap * window * 2 / rate + window) / 1000))
return left
"#;

pub(crate) fn scripts() -> ScriptSet {
    ScriptSet {
        add: LuaScript::new("token_bucket.add", ADD),
        get: LuaScript::new("token_bucket.get", GET),
        set: LuaScript::new("token_bucket.set", ADD),
        del: LuaScript::new("token_bucket.del", DEL),
        chk: None,
    }
}
