//! In-memory stand-ins for Redis, the dead-letter table and the relational
//! sources. Each scripted increment runs under one lock, which gives the same
//! indivisibility the Lua script has on the server.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::api::error::SystemError;
use crate::configs::RedisCache;
use crate::modules::{
    friendship::repository::FriendshipStore,
    interaction::{
        model::{PairScore, capped_increment},
        repository::ScoreStore,
    },
    rebuild::{model::InteractionSource, repository::RebuildSource},
    recovery::{
        repository::FriendEventDlqRepository,
        schema::{FriendEventDlqEntity, NewFriendEvent},
    },
};

pub fn uid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

/// Unique per call, so tests against a shared server never touch each other's keys.
pub fn fresh_id() -> Uuid {
    Uuid::new_v7(uuid::Timestamp::now(uuid::NoContext))
}

/// Pool against `REDIS_URL`. `None` when it is unset; callers return early.
pub fn live_redis() -> Option<RedisCache> {
    let url = std::env::var("REDIS_URL").ok()?;
    Some(RedisCache::from_url(&url, 8).expect("REDIS_URL must be a valid redis url"))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheState {
    pub friends: BTreeMap<Uuid, BTreeSet<Uuid>>,
    pub scores: BTreeMap<Uuid, BTreeMap<Uuid, f64>>,
    pub replay_markers: BTreeSet<Uuid>,
}

impl CacheState {
    fn bump(&mut self, owner: Uuid, member: Uuid, delta: f64, cap: f64) -> f64 {
        let entry = self.scores.entry(owner).or_default();
        let next = capped_increment(entry.get(&member).copied(), delta, cap);
        entry.insert(member, next);
        next
    }

    fn bump_pair(&mut self, a: Uuid, b: Uuid, delta: f64, cap: f64) -> PairScore {
        PairScore { forward: self.bump(a, b, delta, cap), backward: self.bump(b, a, delta, cap) }
    }

    fn srem(&mut self, owner: Uuid, member: &Uuid) {
        // redis drops a set once its last member is removed
        if let Some(set) = self.friends.get_mut(&owner) {
            set.remove(member);
            if set.is_empty() {
                self.friends.remove(&owner);
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<CacheState>,
    unavailable: AtomicBool,
    fail_countdown: Mutex<Option<usize>>,
}

impl MemoryCache {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The `n`th write command from now fails once (1 = the next one).
    pub fn fail_nth_write(&self, n: usize) {
        *self.fail_countdown.lock().unwrap() = Some(n);
    }

    pub fn snapshot(&self) -> CacheState {
        self.state.lock().unwrap().clone()
    }

    fn read_gate(&self) -> Result<(), SystemError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SystemError::cache_unavailable("connection refused"));
        }
        Ok(())
    }

    fn write_gate(&self) -> Result<(), SystemError> {
        self.read_gate()?;
        let mut countdown = self.fail_countdown.lock().unwrap();
        if let Some(n) = countdown.as_mut() {
            *n -= 1;
            if *n == 0 {
                *countdown = None;
                return Err(SystemError::cache_unavailable("injected write failure"));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FriendshipStore for MemoryCache {
    async fn add_friend(&self, user_a: &Uuid, user_b: &Uuid) -> Result<(), SystemError> {
        self.write_gate().map_err(|e| SystemError::partial_mirror(*user_a, *user_b, e))?;
        self.state.lock().unwrap().friends.entry(*user_a).or_default().insert(*user_b);
        self.write_gate().map_err(|e| SystemError::partial_mirror(*user_b, *user_a, e))?;
        self.state.lock().unwrap().friends.entry(*user_b).or_default().insert(*user_a);
        Ok(())
    }

    async fn remove_friend(&self, user_a: &Uuid, user_b: &Uuid) -> Result<(), SystemError> {
        self.write_gate().map_err(|e| SystemError::partial_mirror(*user_a, *user_b, e))?;
        self.state.lock().unwrap().srem(*user_a, user_b);
        self.write_gate().map_err(|e| SystemError::partial_mirror(*user_b, *user_a, e))?;
        self.state.lock().unwrap().srem(*user_b, user_a);
        Ok(())
    }

    async fn remove_all_for_withdrawing_user(
        &self,
        affected_user_ids: &[Uuid],
        withdrawing_user_id: &Uuid,
    ) -> Result<(), SystemError> {
        self.write_gate()?;
        let mut state = self.state.lock().unwrap();
        state.friends.remove(withdrawing_user_id);
        for affected in affected_user_ids {
            state.srem(*affected, withdrawing_user_id);
        }
        Ok(())
    }

    async fn friends_of(&self, user_id: &Uuid) -> Result<HashSet<Uuid>, SystemError> {
        self.read_gate()?;
        let state = self.state.lock().unwrap();
        Ok(state.friends.get(user_id).map(|s| s.iter().copied().collect()).unwrap_or_default())
    }

    async fn is_friend(&self, user_a: &Uuid, user_b: &Uuid) -> Result<bool, SystemError> {
        self.read_gate()?;
        let state = self.state.lock().unwrap();
        Ok(state.friends.get(user_a).is_some_and(|s| s.contains(user_b)))
    }

    async fn insert_pairs(&self, pairs: &[(Uuid, Uuid)]) -> Result<(), SystemError> {
        self.write_gate()?;
        let mut state = self.state.lock().unwrap();
        for (a, b) in pairs {
            state.friends.entry(*a).or_default().insert(*b);
            state.friends.entry(*b).or_default().insert(*a);
        }
        Ok(())
    }

    async fn wipe(&self, _batch_size: usize) -> Result<usize, SystemError> {
        self.write_gate()?;
        let mut state = self.state.lock().unwrap();
        let removed = state.friends.len();
        state.friends.clear();
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl ScoreStore for MemoryCache {
    async fn increment_score(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
        delta: f64,
        cap: f64,
    ) -> Result<PairScore, SystemError> {
        self.write_gate()?;
        Ok(self.state.lock().unwrap().bump_pair(*user_a, *user_b, delta, cap))
    }

    async fn increment_score_once(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
        delta: f64,
        cap: f64,
        event_id: &Uuid,
        _marker_ttl_secs: u64,
    ) -> Result<Option<PairScore>, SystemError> {
        self.write_gate()?;
        let mut state = self.state.lock().unwrap();
        if !state.replay_markers.insert(*event_id) {
            return Ok(None);
        }
        Ok(Some(state.bump_pair(*user_a, *user_b, delta, cap)))
    }

    async fn batch_get_scores(
        &self,
        user_id: &Uuid,
        candidate_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, f64>, SystemError> {
        self.read_gate().map_err(|e| SystemError::ReadFailure(Box::new(e)))?;
        let state = self.state.lock().unwrap();
        let Some(entries) = state.scores.get(user_id) else {
            return Ok(HashMap::new());
        };
        Ok(candidate_ids
            .iter()
            .filter_map(|c| entries.get(c).map(|score| (*c, *score)))
            .collect())
    }

    async fn score(&self, user_a: &Uuid, user_b: &Uuid) -> Result<Option<f64>, SystemError> {
        self.read_gate()?;
        let state = self.state.lock().unwrap();
        Ok(state.scores.get(user_a).and_then(|entries| entries.get(user_b)).copied())
    }

    async fn delete_all_for_withdrawing_user(
        &self,
        affected_user_ids: &[Uuid],
        withdrawing_user_id: &Uuid,
    ) -> Result<(), SystemError> {
        self.write_gate()?;
        let mut state = self.state.lock().unwrap();
        state.scores.remove(withdrawing_user_id);
        for affected in affected_user_ids {
            if let Some(entries) = state.scores.get_mut(affected) {
                entries.remove(withdrawing_user_id);
                if entries.is_empty() {
                    state.scores.remove(affected);
                }
            }
        }
        Ok(())
    }

    async fn increment_pairs(
        &self,
        rows: &[(Uuid, Uuid)],
        delta: f64,
        cap: f64,
    ) -> Result<(), SystemError> {
        self.write_gate()?;
        let mut state = self.state.lock().unwrap();
        for (member_id, target_id) in rows {
            state.bump_pair(*member_id, *target_id, delta, cap);
        }
        Ok(())
    }

    async fn wipe(&self, _batch_size: usize) -> Result<usize, SystemError> {
        self.write_gate()?;
        let mut state = self.state.lock().unwrap();
        let removed = state.scores.len();
        state.scores.clear();
        Ok(removed)
    }
}

#[derive(Default)]
pub struct MemoryDlq {
    events: Mutex<Vec<FriendEventDlqEntity>>,
    unavailable: AtomicBool,
    fail_next_delete: AtomicBool,
    drain: Arc<tokio::sync::Mutex<()>>,
}

impl MemoryDlq {
    pub fn pending(&self) -> Vec<FriendEventDlqEntity> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_next_delete(&self) {
        self.fail_next_delete.store(true, Ordering::SeqCst);
    }

    fn gate(&self) -> Result<(), SystemError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SystemError::DatabaseError("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FriendEventDlqRepository for MemoryDlq {
    type Lease = OwnedMutexGuard<()>;

    async fn enqueue(&self, event: &NewFriendEvent) -> Result<Uuid, SystemError> {
        self.gate()?;
        let id = Uuid::new_v7(uuid::Timestamp::now(uuid::NoContext));
        self.events.lock().unwrap().push(FriendEventDlqEntity {
            id,
            event_type: event.event_type,
            member_id: event.member_id,
            target_id: event.target_id,
            score_delta: event.score_delta,
            attempts: 0,
            last_error: None,
            enqueued_at: Utc::now(),
        });
        Ok(id)
    }

    async fn find_pending(&self, limit: i64) -> Result<Vec<FriendEventDlqEntity>, SystemError> {
        self.gate()?;
        Ok(self.events.lock().unwrap().iter().take(limit.max(0) as usize).cloned().collect())
    }

    async fn count_pending(&self) -> Result<i64, SystemError> {
        self.gate()?;
        Ok(self.events.lock().unwrap().len() as i64)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), SystemError> {
        self.gate()?;
        if self.fail_next_delete.swap(false, Ordering::SeqCst) {
            return Err(SystemError::DatabaseError("delete timed out".into()));
        }
        self.events.lock().unwrap().retain(|e| e.id != *id);
        Ok(())
    }

    async fn mark_failed(&self, id: &Uuid, reason: &str) -> Result<(), SystemError> {
        self.gate()?;
        let mut events = self.events.lock().unwrap();
        if let Some(event) = events.iter_mut().find(|e| e.id == *id) {
            event.attempts += 1;
            event.last_error = Some(reason.to_string());
        }
        Ok(())
    }

    async fn delete_enqueued_before(&self, cutoff: DateTime<Utc>) -> Result<u64, SystemError> {
        self.gate()?;
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| e.enqueued_at > cutoff);
        Ok((before - events.len()) as u64)
    }

    async fn try_lease(&self) -> Result<Option<Self::Lease>, SystemError> {
        self.gate()?;
        Ok(self.drain.clone().try_lock_owned().ok())
    }

    async fn lease(&self) -> Result<Self::Lease, SystemError> {
        self.gate()?;
        Ok(self.drain.clone().lock_owned().await)
    }
}

#[derive(Default)]
pub struct MemorySource {
    pub friend_edges: Vec<(Uuid, Uuid)>,
    pub interactions: HashMap<InteractionSource, Vec<(Uuid, Uuid)>>,
    failing: Mutex<Option<InteractionSource>>,
}

impl MemorySource {
    pub fn push(&mut self, source: InteractionSource, member: Uuid, target: Uuid, times: usize) {
        let rows = self.interactions.entry(source).or_default();
        rows.extend(std::iter::repeat((member, target)).take(times));
    }

    pub fn fail_interactions(&self, source: InteractionSource) {
        *self.failing.lock().unwrap() = Some(source);
    }
}

fn page(rows: &[(Uuid, Uuid)], offset: i64, limit: i64) -> Vec<(Uuid, Uuid)> {
    rows.iter().skip(offset as usize).take(limit as usize).copied().collect()
}

#[async_trait::async_trait]
impl RebuildSource for MemorySource {
    async fn friend_edges(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<(Uuid, Uuid)>, SystemError> {
        Ok(page(&self.friend_edges, offset, limit))
    }

    async fn interactions(
        &self,
        source: InteractionSource,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<(Uuid, Uuid)>, SystemError> {
        if *self.failing.lock().unwrap() == Some(source) {
            return Err(SystemError::DatabaseError("relation does not respond".into()));
        }
        Ok(self
            .interactions
            .get(&source)
            .map(|rows| page(rows, offset, limit))
            .unwrap_or_default())
    }
}
