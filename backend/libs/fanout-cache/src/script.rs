//! Server-side interpreter for [`GuardedBatch`](crate::GuardedBatch).
//!
//! One static script handles every batch shape, so the script is loaded once
//! and invoked by SHA. Redis runs it without interleaving other commands.
//! The marker is checked before any op and written after the last one, so a
//! batch that errors half-way leaves no marker behind and a redelivery can
//! run it again.
//!
//! Redis does not roll back writes made before a script error. A first pass
//! therefore checks every key against the type its op needs and rejects the
//! batch with `WRONGTYPE` before anything is written, which matches the
//! all-or-nothing behaviour of the in-memory store.

pub const FANOUT_SCRIPT: &str = r#"
local ttl = tonumber(ARGV[1])
local marker_ttl = tonumber(ARGV[2])

if marker_ttl > 0 and redis.call('EXISTS', KEYS[1]) == 1 then
  return -1
end

local kinds = {
  hincr = 'hash', hinit = 'hash',
  zadd = 'zset', zincr = 'zset', zrem = 'zset',
  lpush = 'list', lrem = 'list',
}
local planned = {}
for i = 3, #ARGV, 4 do
  local op = ARGV[i]
  local key = KEYS[tonumber(ARGV[i + 1])]
  local current = planned[key]
  if current == nil then
    current = redis.call('TYPE', key)['ok']
  end
  if op == 'del' then
    planned[key] = 'none'
  else
    local want = kinds[op]
    if want == nil then
      return redis.error_reply('unknown fanout op ' .. tostring(op))
    end
    if current ~= 'none' and current ~= want then
      return redis.error_reply('WRONGTYPE fanout op ' .. op .. ' against ' .. current .. ' key ' .. key)
    end
    if op == 'hinit' or op == 'lpush' then
      planned[key] = want
    else
      planned[key] = current
    end
  end
end

local applied = 0
for i = 3, #ARGV, 4 do
  local op = ARGV[i]
  local key = KEYS[tonumber(ARGV[i + 1])]
  local a = ARGV[i + 2]
  local b = ARGV[i + 3]

  if op == 'hincr' then
    if redis.call('EXISTS', key) == 1 then
      local delta = tonumber(b)
      if delta < 0 then
        local current = tonumber(redis.call('HGET', key, a) or '0')
        if current > 0 then
          redis.call('HINCRBY', key, a, math.max(delta, -current))
          redis.call('EXPIRE', key, ttl)
          applied = applied + 1
        end
      else
        redis.call('HINCRBY', key, a, delta)
        redis.call('EXPIRE', key, ttl)
        applied = applied + 1
      end
    end
  elseif op == 'hinit' then
    redis.call('HSETNX', key, a, b)
    redis.call('EXPIRE', key, ttl)
    applied = applied + 1
  elseif op == 'zadd' then
    if redis.call('EXISTS', key) == 1 then
      redis.call('ZADD', key, b, a)
      redis.call('EXPIRE', key, ttl)
      applied = applied + 1
    end
  elseif op == 'zincr' then
    local score = redis.call('ZSCORE', key, a)
    if score then
      score = tonumber(score)
      local delta = tonumber(b)
      if delta < 0 then
        if score > 0 then
          redis.call('ZINCRBY', key, math.max(delta, -score), a)
          redis.call('EXPIRE', key, ttl)
          applied = applied + 1
        end
      else
        redis.call('ZINCRBY', key, delta, a)
        redis.call('EXPIRE', key, ttl)
        applied = applied + 1
      end
    end
  elseif op == 'zrem' then
    applied = applied + redis.call('ZREM', key, a)
  elseif op == 'lpush' then
    redis.call('LPUSH', key, a)
    redis.call('LTRIM', key, 0, tonumber(b) - 1)
    redis.call('EXPIRE', key, ttl)
    applied = applied + 1
  elseif op == 'lrem' then
    applied = applied + redis.call('LREM', key, 0, a)
  elseif op == 'del' then
    applied = applied + redis.call('DEL', key)
  else
    return redis.error_reply('unknown fanout op ' .. tostring(op))
  end
end

if marker_ttl > 0 then
  redis.call('SET', KEYS[1], '1', 'EX', marker_ttl)
end

return applied
"#;
