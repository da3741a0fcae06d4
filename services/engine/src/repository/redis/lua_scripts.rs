//! Redis Lua scripts for atomic operations
//!
//! Conditional writes happen server-side so that two racing callers can
//! never both observe the precondition as satisfied.

/// Conditional bet status transition.
///
/// Keys: [bet_key, claiming_index]
/// Args: [bet_id, from_status, to_status, claiming_score_ms, field, value, ...]
///
/// Returns: 1 if the transition applied, 0 if the stored status did not
/// match `from_status`.
///
/// The claiming index is maintained in the same script: entering
/// `claiming` adds the bet scored by lock time, leaving it removes it.
pub const TRANSITION_SCRIPT: &str = r#"
local bet_key = KEYS[1]
local claiming = KEYS[2]
local bet_id = ARGV[1]
local from = ARGV[2]
local to = ARGV[3]
local claiming_score = ARGV[4]

local current = redis.call('HGET', bet_key, 'status')
if current ~= from then
  return 0
end

redis.call('HSET', bet_key, 'status', to)
for i = 5, #ARGV, 2 do
  redis.call('HSET', bet_key, ARGV[i], ARGV[i + 1])
end

if to == 'claiming' then
  redis.call('ZADD', claiming, tonumber(claiming_score), bet_id)
elseif from == 'claiming' then
  redis.call('ZREM', claiming, bet_id)
end

return 1
"#;

/// Conditional ticket consumption.
///
/// Keys: [ticket_key]
/// Args: [round_id]
///
/// Returns: 1 if the ticket was consumed by this call, 0 if it was
/// already used (or does not exist).
pub const CONSUME_TICKET_SCRIPT: &str = r#"
local ticket_key = KEYS[1]

local used = redis.call('HGET', ticket_key, 'used')
if used ~= 'false' then
  return 0
end

redis.call('HSET', ticket_key, 'used', 'true', 'consumed_by_round', ARGV[1])
return 1
"#;

/// Conditional ticket release, the inverse of consumption.
///
/// Keys: [ticket_key]
/// Args: [round_id]
///
/// Returns: 1 if the ticket was handed back, 0 if it is not currently
/// held by the given round.
pub const RELEASE_TICKET_SCRIPT: &str = r#"
local ticket_key = KEYS[1]

local used = redis.call('HGET', ticket_key, 'used')
local holder = redis.call('HGET', ticket_key, 'consumed_by_round')
if used ~= 'true' or holder ~= ARGV[1] then
  return 0
end

redis.call('HSET', ticket_key, 'used', 'false', 'consumed_by_round', '')
return 1
"#;
