use super::{CommentStore, RepoError, RepoResult};
use crate::domain::models::{
    AgreeTarget, Comment, CommentDraft, CommentStatistic, HotCommentRow, NewDraft, RemovedComment,
    RemovedSubComment, ReviewBacklogEntry, SubComment, UserCommentStatistic, Violation,
    DRAFT_PENDING, DRAFT_SENT, STATUS_PASSED, STATUS_REVIEWING,
};
use event_schema::CommentKind;
use resilience::{with_timeout_result, Boundary};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const COMMENT_COLUMNS: &str =
    "id, uuid, creation_id, creation_type, creation_author, content, status, created_at";
const SUB_COMMENT_COLUMNS: &str = "id, uuid, creation_id, creation_type, creation_author, root_id, root_uuid, parent_id, reply_uuid, content, status, created_at";

/// PostgreSQL-backed comment store
#[derive(Clone)]
pub struct PgCommentStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgCommentStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> RepoResult<T>
    where
        F: Future<Output = RepoResult<T>>,
    {
        with_timeout_result(Boundary::Store, self.timeout, fut).await
    }

    async fn lock_comment(tx: &mut Transaction<'_, Postgres>, id: i64) -> RepoResult<Comment> {
        sqlx::query_as::<_, Comment>(&format!(
            "SELECT {} FROM comment WHERE id = $1 FOR UPDATE",
            COMMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("comment {}", id)))
    }

    async fn lock_sub_comment(tx: &mut Transaction<'_, Postgres>, id: i64) -> RepoResult<SubComment> {
        sqlx::query_as::<_, SubComment>(&format!(
            "SELECT {} FROM sub_comment WHERE id = $1 FOR UPDATE",
            SUB_COMMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("sub_comment {}", id)))
    }

    async fn send_draft(tx: &mut Transaction<'_, Postgres>, draft_id: i64) -> RepoResult<()> {
        let sent = sqlx::query("UPDATE comment_draft SET status = $3 WHERE id = $1 AND status = $2")
            .bind(draft_id)
            .bind(DRAFT_PENDING)
            .bind(DRAFT_SENT)
            .execute(&mut **tx)
            .await?;
        if sent.rows_affected() == 0 {
            return Err(RepoError::DraftNotPending(draft_id));
        }
        Ok(())
    }

    /// Drops statistic and agree rows. Returns the agree totals that were
    /// on the deleted statistic rows, keyed by comment id.
    async fn delete_relations(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[i64],
    ) -> RepoResult<HashMap<i64, i64>> {
        let agrees: Vec<(i64, i64)> = sqlx::query_as(
            "DELETE FROM comment_statistic WHERE comment_id = ANY($1) RETURNING comment_id, agree",
        )
        .bind(ids)
        .fetch_all(&mut **tx)
        .await?;
        sqlx::query("DELETE FROM comment_agree WHERE comment_id = ANY($1)")
            .bind(ids)
            .execute(&mut **tx)
            .await?;
        Ok(agrees.into_iter().collect())
    }
}

#[async_trait::async_trait]
impl CommentStore for PgCommentStore {
    async fn insert_draft(&self, draft: NewDraft) -> RepoResult<i64> {
        self.bounded(async {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO comment_draft
                    (uuid, kind, creation_id, creation_type, root_id, parent_id, reply_uuid, content, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id
                "#,
            )
            .bind(&draft.uuid)
            .bind(draft.kind.code())
            .bind(draft.creation_id)
            .bind(draft.creation_type)
            .bind(draft.root_id)
            .bind(draft.parent_id)
            .bind(&draft.reply_uuid)
            .bind(&draft.content)
            .bind(DRAFT_PENDING)
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        })
        .await
    }

    async fn last_pending_draft(&self, uuid: String, kind: CommentKind) -> RepoResult<CommentDraft> {
        self.bounded(async {
            sqlx::query_as::<_, CommentDraft>(
                r#"
                SELECT id, uuid, kind, creation_id, creation_type, root_id, parent_id,
                       reply_uuid, content, status, created_at
                FROM comment_draft
                WHERE uuid = $1 AND kind = $2 AND status = $3
                ORDER BY id DESC
                LIMIT 1
                "#,
            )
            .bind(&uuid)
            .bind(kind.code())
            .bind(DRAFT_PENDING)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("pending {} draft of {}", kind.as_str(), uuid)))
        })
        .await
    }

    async fn create_comment(&self, draft: CommentDraft, creation_author: String) -> RepoResult<Comment> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            Self::send_draft(&mut tx, draft.id).await?;

            let comment = sqlx::query_as::<_, Comment>(&format!(
                r#"
                INSERT INTO comment (uuid, creation_id, creation_type, creation_author, content, status)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {}
                "#,
                COMMENT_COLUMNS
            ))
            .bind(&draft.uuid)
            .bind(draft.creation_id)
            .bind(draft.creation_type)
            .bind(&creation_author)
            .bind(&draft.content)
            .bind(STATUS_REVIEWING)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM comment_draft WHERE id = $1")
                .bind(draft.id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            debug!(comment_id = comment.id, draft_id = draft.id, "Comment created from draft");
            Ok(comment)
        })
        .await
    }

    async fn create_sub_comment(&self, draft: CommentDraft, root: Comment) -> RepoResult<SubComment> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            Self::send_draft(&mut tx, draft.id).await?;

            let reply = sqlx::query_as::<_, SubComment>(&format!(
                r#"
                INSERT INTO sub_comment
                    (uuid, creation_id, creation_type, creation_author, root_id, root_uuid,
                     parent_id, reply_uuid, content, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING {}
                "#,
                SUB_COMMENT_COLUMNS
            ))
            .bind(&draft.uuid)
            .bind(root.creation_id)
            .bind(root.creation_type)
            .bind(&root.creation_author)
            .bind(root.id)
            .bind(&root.uuid)
            .bind(draft.parent_id)
            .bind(&draft.reply_uuid)
            .bind(&draft.content)
            .bind(STATUS_REVIEWING)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM comment_draft WHERE id = $1")
                .bind(draft.id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            debug!(sub_comment_id = reply.id, root_id = root.id, "Sub-comment created from draft");
            Ok(reply)
        })
        .await
    }

    async fn get_comment(&self, id: i64) -> RepoResult<Comment> {
        self.bounded(async {
            sqlx::query_as::<_, Comment>(&format!("SELECT {} FROM comment WHERE id = $1", COMMENT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| RepoError::NotFound(format!("comment {}", id)))
        })
        .await
    }

    async fn get_sub_comment(&self, id: i64) -> RepoResult<SubComment> {
        self.bounded(async {
            sqlx::query_as::<_, SubComment>(&format!(
                "SELECT {} FROM sub_comment WHERE id = $1",
                SUB_COMMENT_COLUMNS
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("sub_comment {}", id)))
        })
        .await
    }

    async fn mark_comment_passed(&self, id: i64) -> RepoResult<Comment> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let comment = sqlx::query_as::<_, Comment>(&format!(
                "UPDATE comment SET status = $2 WHERE id = $1 RETURNING {}",
                COMMENT_COLUMNS
            ))
            .bind(id)
            .bind(STATUS_PASSED)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("comment {}", id)))?;

            sqlx::query("INSERT INTO comment_statistic (comment_id) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(comment)
        })
        .await
    }

    async fn mark_sub_comment_passed(&self, id: i64) -> RepoResult<SubComment> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let mut reply = Self::lock_sub_comment(&mut tx, id).await?;

            if reply.status == STATUS_REVIEWING {
                sqlx::query("UPDATE sub_comment SET status = $2 WHERE id = $1")
                    .bind(id)
                    .bind(STATUS_PASSED)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    r#"
                    INSERT INTO comment_statistic (comment_id, comment) VALUES ($1, 1)
                    ON CONFLICT (comment_id) DO UPDATE SET comment = comment_statistic.comment + 1
                    "#,
                )
                .bind(reply.root_id)
                .execute(&mut *tx)
                .await?;
                reply.status = STATUS_PASSED;
            }

            sqlx::query("INSERT INTO comment_statistic (comment_id) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(reply)
        })
        .await
    }

    async fn reject(&self, violation: Violation) -> RepoResult<bool> {
        self.bounded(async {
            let table = match violation.kind {
                CommentKind::Comment => "comment",
                CommentKind::SubComment => "sub_comment",
            };

            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO comment_violation (uuid, comment_id, kind, job_id, label, result)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&violation.uuid)
            .bind(violation.comment_id)
            .bind(violation.kind.code())
            .bind(&violation.job_id)
            .bind(&violation.label)
            .bind(&violation.result)
            .execute(&mut *tx)
            .await?;

            let deleted = sqlx::query(&format!(
                "DELETE FROM {} WHERE id = $1 AND status = $2",
                table
            ))
            .bind(violation.comment_id)
            .bind(STATUS_REVIEWING)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(deleted.rows_affected() > 0)
        })
        .await
    }

    async fn remove_comment(&self, uuid: String, id: i64) -> RepoResult<RemovedComment> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let comment = Self::lock_comment(&mut tx, id).await?;
            if comment.uuid != uuid {
                return Err(RepoError::NotOwner {
                    uuid,
                    entity: format!("comment {}", id),
                });
            }

            let replies = sqlx::query_as::<_, SubComment>(&format!(
                "DELETE FROM sub_comment WHERE root_id = $1 RETURNING {}",
                SUB_COMMENT_COLUMNS
            ))
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

            let mut ids: Vec<i64> = replies.iter().map(|r| r.id).collect();
            ids.push(id);
            let agrees = Self::delete_relations(&mut tx, &ids).await?;

            sqlx::query("DELETE FROM comment WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(RemovedComment {
                comment,
                replies,
                agrees,
            })
        })
        .await
    }

    async fn remove_sub_comment(&self, uuid: String, id: i64) -> RepoResult<RemovedSubComment> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let reply = Self::lock_sub_comment(&mut tx, id).await?;
            if reply.uuid != uuid {
                return Err(RepoError::NotOwner {
                    uuid,
                    entity: format!("sub_comment {}", id),
                });
            }

            sqlx::query("DELETE FROM sub_comment WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let agree = Self::delete_relations(&mut tx, &[id])
                .await?
                .remove(&id)
                .unwrap_or(0);

            if reply.is_passed() {
                sqlx::query(
                    "UPDATE comment_statistic SET comment = GREATEST(comment - 1, 0) WHERE comment_id = $1",
                )
                .bind(reply.root_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(RemovedSubComment { reply, agree })
        })
        .await
    }

    async fn agree_target(&self, id: i64) -> RepoResult<AgreeTarget> {
        self.bounded(async {
            sqlx::query_as::<_, AgreeTarget>(
                r#"
                SELECT id AS comment_id, uuid AS author, creation_id, creation_type, NULL::BIGINT AS root_id
                FROM comment WHERE id = $1 AND status = $2
                UNION ALL
                SELECT id, uuid, creation_id, creation_type, root_id
                FROM sub_comment WHERE id = $1 AND status = $2
                LIMIT 1
                "#,
            )
            .bind(id)
            .bind(STATUS_PASSED)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("comment {}", id)))
        })
        .await
    }

    async fn set_agree(&self, uuid: String, comment_id: i64) -> RepoResult<bool> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let inserted = sqlx::query(
                "INSERT INTO comment_agree (comment_id, uuid) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(comment_id)
            .bind(&uuid)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;

            if inserted {
                sqlx::query(
                    r#"
                    INSERT INTO comment_statistic (comment_id, agree) VALUES ($1, 1)
                    ON CONFLICT (comment_id) DO UPDATE SET agree = comment_statistic.agree + 1
                    "#,
                )
                .bind(comment_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(inserted)
        })
        .await
    }

    async fn cancel_agree(&self, uuid: String, comment_id: i64) -> RepoResult<bool> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let deleted = sqlx::query("DELETE FROM comment_agree WHERE comment_id = $1 AND uuid = $2")
                .bind(comment_id)
                .bind(&uuid)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                > 0;

            if deleted {
                sqlx::query(
                    "UPDATE comment_statistic SET agree = GREATEST(agree - 1, 0) WHERE comment_id = $1",
                )
                .bind(comment_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(deleted)
        })
        .await
    }

    async fn list_comments(
        &self,
        creation_id: i64,
        creation_type: i16,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<Comment>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, Comment>(&format!(
                r#"
                SELECT {}
                FROM comment
                WHERE creation_id = $1 AND creation_type = $2 AND status = $3
                ORDER BY id DESC
                LIMIT $4 OFFSET $5
                "#,
                COMMENT_COLUMNS
            ))
            .bind(creation_id)
            .bind(creation_type)
            .bind(STATUS_PASSED)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn list_hot_comments(
        &self,
        creation_id: i64,
        creation_type: i16,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<HotCommentRow>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, HotCommentRow>(
                r#"
                SELECT c.id, c.uuid, COALESCE(s.agree, 0) AS agree
                FROM comment c
                LEFT JOIN comment_statistic s ON s.comment_id = c.id
                WHERE c.creation_id = $1 AND c.creation_type = $2 AND c.status = $3
                ORDER BY agree DESC, c.id DESC
                LIMIT $4 OFFSET $5
                "#,
            )
            .bind(creation_id)
            .bind(creation_type)
            .bind(STATUS_PASSED)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn list_sub_comments(&self, root_id: i64, offset: i64, limit: i64) -> RepoResult<Vec<SubComment>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, SubComment>(&format!(
                r#"
                SELECT {}
                FROM sub_comment
                WHERE root_id = $1 AND status = $2
                ORDER BY id DESC
                LIMIT $3 OFFSET $4
                "#,
                SUB_COMMENT_COLUMNS
            ))
            .bind(root_id)
            .bind(STATUS_PASSED)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn list_user_replies(&self, uuid: String, offset: i64, limit: i64) -> RepoResult<Vec<SubComment>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, SubComment>(&format!(
                r#"
                SELECT {}
                FROM sub_comment
                WHERE uuid = $1 AND status = $2
                ORDER BY id DESC
                LIMIT $3 OFFSET $4
                "#,
                SUB_COMMENT_COLUMNS
            ))
            .bind(&uuid)
            .bind(STATUS_PASSED)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn list_user_replied(&self, uuid: String, offset: i64, limit: i64) -> RepoResult<Vec<SubComment>> {
        self.bounded(async {
            // Mirrors the fan-out: the root author always sees the reply, the
            // addressed user only when the replier is not the root author.
            let rows = sqlx::query_as::<_, SubComment>(&format!(
                r#"
                SELECT {}
                FROM sub_comment
                WHERE status = $2
                  AND (root_uuid = $1 OR (reply_uuid = $1 AND uuid <> root_uuid))
                ORDER BY id DESC
                LIMIT $3 OFFSET $4
                "#,
                SUB_COMMENT_COLUMNS
            ))
            .bind(&uuid)
            .bind(STATUS_PASSED)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn comment_statistics(&self, ids: Vec<i64>) -> RepoResult<Vec<CommentStatistic>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, CommentStatistic>(
                "SELECT comment_id, agree, comment FROM comment_statistic WHERE comment_id = ANY($1)",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn user_statistic(&self, uuid: String) -> RepoResult<UserCommentStatistic> {
        self.bounded(async {
            let row = sqlx::query_as::<_, UserCommentStatistic>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM comment WHERE creation_author = $1 AND status = $2)
                  + (SELECT COUNT(*) FROM sub_comment WHERE creation_author = $1 AND status = $2)
                        AS comment,
                    COALESCE((
                        SELECT SUM(s.agree)
                        FROM comment_statistic s
                        WHERE s.comment_id IN (
                            SELECT id FROM comment WHERE uuid = $1
                            UNION ALL
                            SELECT id FROM sub_comment WHERE uuid = $1
                        )
                    ), 0)::BIGINT AS agree
                "#,
            )
            .bind(&uuid)
            .bind(STATUS_PASSED)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        })
        .await
    }

    async fn review_backlog(&self, older_than_secs: i64, limit: i64) -> RepoResult<Vec<ReviewBacklogEntry>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, ReviewBacklogEntry>(
                r#"
                SELECT id, kind, uuid, parent_id, content FROM (
                    SELECT id, 1::SMALLINT AS kind, uuid, creation_id AS parent_id, content, created_at
                    FROM comment
                    WHERE status = $1 AND created_at < NOW() - make_interval(secs => $2)
                    UNION ALL
                    SELECT id, 2::SMALLINT AS kind, uuid, root_id AS parent_id, content, created_at
                    FROM sub_comment
                    WHERE status = $1 AND created_at < NOW() - make_interval(secs => $2)
                ) backlog
                ORDER BY created_at
                LIMIT $3
                "#,
            )
            .bind(STATUS_REVIEWING)
            .bind(older_than_secs as f64)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }
}
