//! Leaky-bucket scripts.
//!
//! State is one hash per key: `rate` (departures per `window`), `window`
//! (µs), `cap`, `queued`, `next` (next departure slot, µs). Requests depart
//! one emit interval apart; a request arriving before its slot receives the
//! wait in microseconds and the client pacer sleeps it out. `queued` counts
//! the occupancy of the current busy period: an immediate departure means the
//! queue has drained and resets it to 1, so a fresh key with capacity C
//! admits exactly C back-to-back requests before overflowing.
//!
//! The CHK script lets the coordinator reject overflows without enqueuing.
//! CHK and GET are separate round trips, so GET re-checks occupancy itself.

use super::{LuaScript, ScriptSet, DEL};

/// KEYS[1] key, ARGV: rate, window_us, now_us, capacity. Overwrites.
const ADD: &str = r#"
local rate = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local cap = tonumber(ARGV[4])
redis.call('DEL', KEYS[1])
redis.call('HMSET', KEYS[1], 'rate', rate, 'window', window, 'cap', cap, 'queued', 0, 'next', now)
redis.call('PEXPIRE', KEYS[1], math.ceil((cap * window * 2 / rate + window) / 1000))
return 0
"#;

/// KEYS[1] key, no ARGV. Returns -2 absent, -1 full, 0 room.
const CHK: &str = r#"
local state = redis.pcall('HMGET', KEYS[1], 'cap', 'queued')
if state.err or not state[1] then
  return -2
end
local cap = tonumber(state[1])
local queued = tonumber(state[2])
if not (cap and queued) then
  return -2
end
if queued >= cap then
  return -1
end
return 0
"#;

/// KEYS[1] key, ARGV: now_us. Returns -2 absent, -1 full, 0 depart now,
/// else wait in microseconds.
const GET: &str = r#"
local state = redis.pcall('HMGET', KEYS[1], 'rate', 'window', 'cap', 'queued', 'next')
if state.err or not state[1] then
  return -2
end
local rate = tonumber(state[1])
local window = tonumber(state[2])
local cap = tonumber(state[3])
local queued = tonumber(state[4])
local nxt = tonumber(state[5])
if not (rate and window and cap and queued and nxt) then
  return -2
end
local now = tonumber(ARGV[1])
local interval = math.floor(window / rate)
local reply
if now >= nxt then
  nxt = now + interval
  queued = 1
  reply = 0
else
  if queued >= cap then
    return -1
  end
  reply = nxt - now
  nxt = nxt + interval
  queued = queued + 1
end
redis.call('HMSET', KEYS[1], 'queued', queued, 'next', nxt)
redis.call('PEXPIRE', KEYS[1], math.ceil((cap * window * 2 / rate + window) / 1000))
return reply
"#;

pub(crate) fn scripts() -> ScriptSet {
    ScriptSet {
        add: LuaScript::new("leaky_bucket.add", ADD),
        get: LuaScript::new("leaky_bucket.get", GET),
        set: LuaScript::new("leaky_bucket.set", ADD),
        del: LuaScript::new("leaky_bucket.del", DEL),
        chk: Some(LuaScript::new("leaky_bucket.chk", CHK)),
    }
}
