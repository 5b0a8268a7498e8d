use uuid::Uuid;

use crate::{
    api::error,
    modules::rebuild::{model::InteractionSource, repository::RebuildSource},
};

#[derive(Clone)]
pub struct RebuildSourcePg {
    pool: sqlx::PgPool,
}

impl RebuildSourcePg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

fn interaction_query(source: InteractionSource) -> &'static str {
    match source {
        InteractionSource::PostLike => {
            r#"
            SELECT pl.user_id, p.author_id
            FROM post_likes pl
            JOIN posts p ON p.id = pl.post_id
            WHERE pl.user_id <> p.author_id
            ORDER BY pl.id
            LIMIT $1 OFFSET $2
            "#
        }
        InteractionSource::Comment => {
            r#"
            SELECT c.author_id, p.author_id
            FROM comments c
            JOIN posts p ON p.id = c.post_id
            WHERE c.author_id <> p.author_id
              AND c.deleted_at IS NULL
            ORDER BY c.id
            LIMIT $1 OFFSET $2
            "#
        }
        InteractionSource::CommentLike => {
            r#"
            SELECT cl.user_id, c.author_id
            FROM comment_likes cl
            JOIN comments c ON c.id = cl.comment_id
            WHERE cl.user_id <> c.author_id
            ORDER BY cl.id
            LIMIT $1 OFFSET $2
            "#
        }
    }
}

#[async_trait::async_trait]
impl RebuildSource for RebuildSourcePg {
    async fn friend_edges(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<(Uuid, Uuid)>, error::SystemError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT user_a, user_b
            FROM friends
            WHERE deleted_at IS NULL
            ORDER BY user_a, user_b
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn interactions(
        &self,
        source: InteractionSource,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<(Uuid, Uuid)>, error::SystemError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(interaction_query(source))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}
