//! Interaction score store backed by Redis sorted sets.
//!
//! Key schema:
//! - `interaction:{user_id}` → ZSET member `{other_id}`, score in `[0, cap]`
//! - `dlq_replayed:{event_id}` → "1" (TTL) - a dead-letter SCORE_UP already applied
//!
//! Both mirrored entries are always written by `INCREMENT_SCRIPT`, never by a
//! client-side read followed by a write.
use std::collections::HashMap;

use deadpool_redis::redis::{self, AsyncCommands};
use uuid::Uuid;

use crate::{
    api::error,
    configs::RedisCache,
    constants::{INTERACTION_KEY_PREFIX, REPLAY_MARKER_PREFIX},
    modules::interaction::{model::PairScore, repository::ScoreStore},
};

// KEYS[1], KEYS[2]: the two users' sorted sets. KEYS[3], optional: replay marker.
// ARGV: member for KEYS[1], member for KEYS[2], delta, cap, marker ttl.
const INCREMENT_SCRIPT_SRC: &str = r#"
if KEYS[3] and redis.call('EXISTS', KEYS[3]) == 1 then
  return false
end
local delta = tonumber(ARGV[3])
local cap = tonumber(ARGV[4])
local function bump(key, member)
  local current = tonumber(redis.call('ZSCORE', key, member) or '0')
  if current >= cap then
    return tostring(current)
  end
  local updated = math.min(current + delta, cap)
  redis.call('ZADD', key, updated, member)
  return tostring(updated)
end
local forward = bump(KEYS[1], ARGV[1])
local backward = bump(KEYS[2], ARGV[2])
-- marker is set last: a failed bump leaves the event replayable
if KEYS[3] then
  redis.call('SET', KEYS[3], '1', 'EX', ARGV[5])
end
return { forward, backward }
"#;

lazy_static::lazy_static! {
    static ref INCREMENT_SCRIPT: redis::Script = redis::Script::new(INCREMENT_SCRIPT_SRC);
}

pub fn interaction_key(user_id: &Uuid) -> String {
    format!("{INTERACTION_KEY_PREFIX}{user_id}")
}

fn replay_marker_key(event_id: &Uuid) -> String {
    format!("{REPLAY_MARKER_PREFIX}{event_id}")
}

fn pair_score(scores: Vec<f64>) -> Result<PairScore, error::SystemError> {
    match scores.as_slice() {
        [forward, backward] => Ok(PairScore { forward: *forward, backward: *backward }),
        other => Err(error::SystemError::cache_unavailable(format!(
            "increment script returned {} values",
            other.len()
        ))),
    }
}

#[derive(Clone)]
pub struct ScoreStoreRedis {
    cache: RedisCache,
}

impl ScoreStoreRedis {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }

    fn invocation(
        user_a: &Uuid,
        user_b: &Uuid,
        delta: f64,
        cap: f64,
    ) -> redis::ScriptInvocation<'static> {
        let mut invocation = INCREMENT_SCRIPT.prepare_invoke();
        invocation
            .key(interaction_key(user_a))
            .key(interaction_key(user_b))
            .arg(user_b.to_string())
            .arg(user_a.to_string())
            .arg(delta)
            .arg(cap);
        invocation
    }
}

#[async_trait::async_trait]
impl ScoreStore for ScoreStoreRedis {
    async fn increment_score(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
        delta: f64,
        cap: f64,
    ) -> Result<PairScore, error::SystemError> {
        let mut conn = self.cache.conn().await?;
        let mut invocation = Self::invocation(user_a, user_b, delta, cap);
        invocation.arg(0);
        let scores: Vec<f64> = invocation.invoke_async(&mut *conn).await?;
        pair_score(scores)
    }

    async fn increment_score_once(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
        delta: f64,
        cap: f64,
        event_id: &Uuid,
        marker_ttl_secs: u64,
    ) -> Result<Option<PairScore>, error::SystemError> {
        let mut conn = self.cache.conn().await?;
        let mut invocation = Self::invocation(user_a, user_b, delta, cap);
        invocation.key(replay_marker_key(event_id)).arg(marker_ttl_secs.max(1));
        let scores: Option<Vec<f64>> = invocation.invoke_async(&mut *conn).await?;
        scores.map(pair_score).transpose()
    }

    async fn batch_get_scores(
        &self,
        user_id: &Uuid,
        candidate_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, f64>, error::SystemError> {
        if candidate_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let key = interaction_key(user_id);
        let lookup = async {
            let mut conn = self.cache.conn().await?;
            let mut pipe = redis::pipe();
            for candidate in candidate_ids {
                pipe.zscore(&key, candidate.to_string());
            }
            let scores: Vec<Option<f64>> = pipe.query_async(&mut *conn).await?;
            Ok::<_, error::SystemError>(scores)
        };
        let scores = lookup.await.map_err(|e| error::SystemError::ReadFailure(Box::new(e)))?;

        Ok(candidate_ids
            .iter()
            .zip(scores)
            .filter_map(|(candidate, score)| score.map(|s| (*candidate, s)))
            .collect())
    }

    async fn score(&self, user_a: &Uuid, user_b: &Uuid) -> Result<Option<f64>, error::SystemError> {
        let mut conn = self.cache.conn().await?;
        let score: Option<f64> = conn.zscore(interaction_key(user_a), user_b.to_string()).await?;
        Ok(score)
    }

    async fn delete_all_for_withdrawing_user(
        &self,
        affected_user_ids: &[Uuid],
        withdrawing_user_id: &Uuid,
    ) -> Result<(), error::SystemError> {
        let mut conn = self.cache.conn().await?;
        let member = withdrawing_user_id.to_string();

        let mut pipe = redis::pipe();
        pipe.del(interaction_key(withdrawing_user_id)).ignore();
        for affected in affected_user_ids {
            pipe.zrem(interaction_key(affected), &member).ignore();
        }
        pipe.query_async::<()>(&mut *conn).await?;

        Ok(())
    }

    async fn increment_pairs(
        &self,
        rows: &[(Uuid, Uuid)],
        delta: f64,
        cap: f64,
    ) -> Result<(), error::SystemError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = self.cache.conn().await?;
        let hash = INCREMENT_SCRIPT.get_hash();

        // SCRIPT LOAD runs first in the same round trip, so EVALSHA cannot miss
        let mut pipe = redis::pipe();
        pipe.cmd("SCRIPT").arg("LOAD").arg(INCREMENT_SCRIPT_SRC).ignore();
        for (member_id, target_id) in rows {
            pipe.cmd("EVALSHA")
                .arg(hash)
                .arg(2)
                .arg(interaction_key(member_id))
                .arg(interaction_key(target_id))
                .arg(target_id.to_string())
                .arg(member_id.to_string())
                .arg(delta)
                .arg(cap)
                .arg(0)
                .ignore();
        }
        pipe.query_async::<()>(&mut *conn).await?;

        Ok(())
    }

    async fn wipe(&self, batch_size: usize) -> Result<usize, error::SystemError> {
        self.cache.wipe_prefix(INTERACTION_KEY_PREFIX, batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{fresh_id, live_redis};

    async fn forget(store: &ScoreStoreRedis, users: &[Uuid]) {
        for user in users {
            store.delete_all_for_withdrawing_user(users, user).await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_script_increments_stop_at_cap_on_both_keys() {
        let Some(cache) = live_redis() else { return };
        let store = ScoreStoreRedis::new(cache);

        for (events, expected) in [(7usize, 3.5), (40, 10.0)] {
            let (a, b) = (fresh_id(), fresh_id());
            let handles: Vec<_> = (0..events)
                .map(|i| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        if i % 2 == 0 {
                            store.increment_score(&a, &b, 0.5, 10.0).await
                        } else {
                            store.increment_score(&b, &a, 0.5, 10.0).await
                        }
                    })
                })
                .collect();
            for handle in handles {
                let score = handle.await.unwrap().unwrap();
                assert!(score.forward <= 10.0 && score.backward <= 10.0);
            }

            assert_eq!(store.score(&a, &b).await.unwrap(), Some(expected));
            assert_eq!(store.score(&b, &a).await.unwrap(), Some(expected));
            forget(&store, &[a, b]).await;
        }
    }

    #[tokio::test]
    async fn replayed_event_is_applied_once() {
        let Some(cache) = live_redis() else { return };
        let store = ScoreStoreRedis::new(cache.clone());
        let (a, b, event_id) = (fresh_id(), fresh_id(), fresh_id());

        let first = store.increment_score_once(&a, &b, 1.5, 10.0, &event_id, 60).await.unwrap();
        assert_eq!(first, Some(PairScore { forward: 1.5, backward: 1.5 }));
        let again = store.increment_score_once(&a, &b, 1.5, 10.0, &event_id, 60).await.unwrap();
        assert_eq!(again, None);
        assert_eq!(store.score(&b, &a).await.unwrap(), Some(1.5));

        forget(&store, &[a, b]).await;
        let mut conn = cache.conn().await.unwrap();
        let _: () = conn.del(replay_marker_key(&event_id)).await.unwrap();
    }

    #[tokio::test]
    async fn failed_bump_leaves_the_event_replayable() {
        let Some(cache) = live_redis() else { return };
        let store = ScoreStoreRedis::new(cache.clone());
        let (a, b, event_id) = (fresh_id(), fresh_id(), fresh_id());

        // a plain string under the sorted-set key makes ZSCORE fail with WRONGTYPE
        let mut conn = cache.conn().await.unwrap();
        let _: () = conn.set(interaction_key(&b), "not a zset").await.unwrap();
        assert!(store.increment_score_once(&a, &b, 0.5, 10.0, &event_id, 60).await.is_err());
        let marked: bool = conn.exists(replay_marker_key(&event_id)).await.unwrap();
        assert!(!marked);

        let _: () = conn.del(interaction_key(&b)).await.unwrap();
        let applied = store.increment_score_once(&a, &b, 0.5, 10.0, &event_id, 60).await.unwrap();
        assert!(applied.is_some());

        forget(&store, &[a, b]).await;
        let _: () = conn.del(replay_marker_key(&event_id)).await.unwrap();
    }

    #[tokio::test]
    async fn pipelined_rows_match_live_increments() {
        let Some(cache) = live_redis() else { return };
        let store = ScoreStoreRedis::new(cache);
        let (a, b, c) = (fresh_id(), fresh_id(), fresh_id());

        let mut rows = vec![(a, b); 25];
        rows.extend([(c, a); 3]);
        store.increment_pairs(&rows, 0.5, 10.0).await.unwrap();

        let scores = store.batch_get_scores(&a, &[b, c, fresh_id()]).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[&b], 10.0);
        assert_eq!(scores[&c], 1.5);
        assert_eq!(store.score(&b, &a).await.unwrap(), Some(10.0));

        forget(&store, &[a, b, c]).await;
        assert_eq!(store.score(&a, &b).await.unwrap(), None);
    }
}
