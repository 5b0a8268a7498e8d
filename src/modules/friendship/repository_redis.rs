use std::collections::HashSet;

use deadpool_redis::redis::{self, AsyncCommands};
use uuid::Uuid;

use crate::{
    api::error,
    configs::RedisCache,
    constants::FRIEND_KEY_PREFIX,
    modules::friendship::repository::FriendshipStore,
};

pub fn friend_key(user_id: &Uuid) -> String {
    format!("{FRIEND_KEY_PREFIX}{user_id}")
}

#[derive(Clone)]
pub struct FriendshipStoreRedis {
    cache: RedisCache,
}

impl FriendshipStoreRedis {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }

    async fn sadd(&self, owner: &Uuid, member: &Uuid) -> Result<(), error::SystemError> {
        let mut conn = self.cache.conn().await?;
        conn.sadd::<_, _, ()>(friend_key(owner), member.to_string()).await?;
        Ok(())
    }

    async fn srem(&self, owner: &Uuid, member: &Uuid) -> Result<(), error::SystemError> {
        let mut conn = self.cache.conn().await?;
        conn.srem::<_, _, ()>(friend_key(owner), member.to_string()).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl FriendshipStore for FriendshipStoreRedis {
    async fn add_friend(&self, user_a: &Uuid, user_b: &Uuid) -> Result<(), error::SystemError> {
        self.sadd(user_a, user_b)
            .await
            .map_err(|e| error::SystemError::partial_mirror(*user_a, *user_b, e))?;
        self.sadd(user_b, user_a)
            .await
            .map_err(|e| error::SystemError::partial_mirror(*user_b, *user_a, e))?;
        Ok(())
    }

    async fn remove_friend(&self, user_a: &Uuid, user_b: &Uuid) -> Result<(), error::SystemError> {
        self.srem(user_a, user_b)
            .await
            .map_err(|e| error::SystemError::partial_mirror(*user_a, *user_b, e))?;
        self.srem(user_b, user_a)
            .await
            .map_err(|e| error::SystemError::partial_mirror(*user_b, *user_a, e))?;
        Ok(())
    }

    async fn remove_all_for_withdrawing_user(
        &self,
        affected_user_ids: &[Uuid],
        withdrawing_user_id: &Uuid,
    ) -> Result<(), error::SystemError> {
        let mut conn = self.cache.conn().await?;
        let member = withdrawing_user_id.to_string();

        let mut pipe = redis::pipe();
        pipe.del(friend_key(withdrawing_user_id)).ignore();
        for affected in affected_user_ids {
            pipe.srem(friend_key(affected), &member).ignore();
        }
        pipe.query_async::<()>(&mut *conn).await?;

        Ok(())
    }

    async fn friends_of(&self, user_id: &Uuid) -> Result<HashSet<Uuid>, error::SystemError> {
        let mut conn = self.cache.conn().await?;
        let members: Vec<String> = conn.smembers(friend_key(user_id)).await?;

        Ok(members
            .iter()
            .filter_map(|m| match Uuid::parse_str(m) {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(
                        user_id = %user_id,
                        member = %m,
                        "ignoring malformed friend member"
                    );
                    None
                }
            })
            .collect())
    }

    async fn is_friend(&self, user_a: &Uuid, user_b: &Uuid) -> Result<bool, error::SystemError> {
        let mut conn = self.cache.conn().await?;
        let exists: bool = conn.sismember(friend_key(user_a), user_b.to_string()).await?;
        Ok(exists)
    }

    async fn insert_pairs(&self, pairs: &[(Uuid, Uuid)]) -> Result<(), error::SystemError> {
        if pairs.is_empty() {
            return Ok(());
        }

        let mut conn = self.cache.conn().await?;
        let mut pipe = redis::pipe();
        for (member_id, friend_id) in pairs {
            pipe.sadd(friend_key(member_id), friend_id.to_string()).ignore();
            pipe.sadd(friend_key(friend_id), member_id.to_string()).ignore();
        }
        pipe.query_async::<()>(&mut *conn).await?;

        Ok(())
    }

    async fn wipe(&self, batch_size: usize) -> Result<usize, error::SystemError> {
        self.cache.wipe_prefix(FRIEND_KEY_PREFIX, batch_size).await
    }
}
