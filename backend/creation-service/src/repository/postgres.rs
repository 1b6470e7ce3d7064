use super::{CreationStore, RepoError, RepoResult};
use crate::domain::models::{
    CollectRow, Creation, CreationDraft, CreationStatistic, CreationViolation, NewCreationDraft,
    RemovedCreation, ReviewBacklogEntry, ScoredCreationRow, UserCreationStatistic, DRAFT_PENDING,
    DRAFT_SENT, STATUS_PASSED, STATUS_REVIEWING,
};
use event_schema::CreationKind;
use resilience::{with_timeout_result, Boundary};
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const CREATION_COLUMNS: &str = "id, uuid, kind, title, content, status, created_at, updated_at";
const STATISTIC_COLUMNS: &str = "creation_id, kind, agree, collect, view, comment";

#[derive(Clone)]
pub struct PgCreationStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgCreationStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> RepoResult<T>
    where
        F: Future<Output = RepoResult<T>>,
    {
        with_timeout_result(Boundary::Store, self.timeout, fut).await
    }

    async fn lock_creation(tx: &mut Transaction<'_, Postgres>, id: i64) -> RepoResult<Creation> {
        sqlx::query_as::<_, Creation>(&format!(
            "SELECT {} FROM creation WHERE id = $1 FOR UPDATE",
            CREATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("creation {}", id)))
    }

    /// Bump one statistic column. Callers only pass fixed column names.
    async fn bump(
        tx: &mut Transaction<'_, Postgres>,
        creation_id: i64,
        column: &str,
        delta: i64,
    ) -> RepoResult<()> {
        sqlx::query(&format!(
            "UPDATE creation_statistic SET {col} = GREATEST({col} + $2, 0) WHERE creation_id = $1",
            col = column
        ))
        .bind(creation_id)
        .bind(delta)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CreationStore for PgCreationStore {
    async fn insert_draft(&self, draft: NewCreationDraft) -> RepoResult<i64> {
        self.bounded(async {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO creation_draft (uuid, kind, title, content, status)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(&draft.uuid)
            .bind(draft.kind.code())
            .bind(&draft.title)
            .bind(&draft.content)
            .bind(DRAFT_PENDING)
            .fetch_one(&self.pool)
            .await?;
            Ok(id)
        })
        .await
    }

    async fn last_pending_draft(&self, uuid: String, kind: CreationKind) -> RepoResult<CreationDraft> {
        self.bounded(async {
            sqlx::query_as::<_, CreationDraft>(
                r#"
                SELECT id, uuid, kind, title, content, status, created_at
                FROM creation_draft
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
            .ok_or_else(|| RepoError::NotFound(format!("pending {} draft of {}", kind, uuid)))
        })
        .await
    }

    async fn create_creation(&self, draft: CreationDraft) -> RepoResult<Creation> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let sent = sqlx::query("UPDATE creation_draft SET status = $3 WHERE id = $1 AND status = $2")
                .bind(draft.id)
                .bind(DRAFT_PENDING)
                .bind(DRAFT_SENT)
                .execute(&mut *tx)
                .await?;
            if sent.rows_affected() == 0 {
                return Err(RepoError::DraftNotPending(draft.id));
            }

            let creation = sqlx::query_as::<_, Creation>(&format!(
                r#"
                INSERT INTO creation (uuid, kind, title, content, status)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {}
                "#,
                CREATION_COLUMNS
            ))
            .bind(&draft.uuid)
            .bind(draft.kind)
            .bind(&draft.title)
            .bind(&draft.content)
            .bind(STATUS_REVIEWING)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM creation_draft WHERE id = $1")
                .bind(draft.id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            debug!(creation_id = creation.id, draft_id = draft.id, "Creation created from draft");
            Ok(creation)
        })
        .await
    }

    async fn get_creation(&self, id: i64) -> RepoResult<Creation> {
        self.bounded(async {
            sqlx::query_as::<_, Creation>(&format!("SELECT {} FROM creation WHERE id = $1", CREATION_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| RepoError::NotFound(format!("creation {}", id)))
        })
        .await
    }

    async fn edit_creation(
        &self,
        uuid: String,
        id: i64,
        title: String,
        content: String,
    ) -> RepoResult<Creation> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let current = Self::lock_creation(&mut tx, id).await?;
            if current.uuid != uuid {
                return Err(RepoError::NotOwner {
                    uuid,
                    entity: format!("creation {}", id),
                });
            }

            let creation = sqlx::query_as::<_, Creation>(&format!(
                "UPDATE creation SET title = $2, content = $3, updated_at = NOW() WHERE id = $1 RETURNING {}",
                CREATION_COLUMNS
            ))
            .bind(id)
            .bind(&title)
            .bind(&content)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(creation)
        })
        .await
    }

    async fn mark_passed(&self, id: i64) -> RepoResult<Creation> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let creation = sqlx::query_as::<_, Creation>(&format!(
                "UPDATE creation SET status = $2 WHERE id = $1 RETURNING {}",
                CREATION_COLUMNS
            ))
            .bind(id)
            .bind(STATUS_PASSED)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("creation {}", id)))?;

            sqlx::query(
                "INSERT INTO creation_statistic (creation_id, kind) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(creation.kind)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(creation)
        })
        .await
    }

    async fn reject(&self, violation: CreationViolation) -> RepoResult<bool> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO creation_violation (uuid, creation_id, kind, job_id, label, result)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&violation.uuid)
            .bind(violation.creation_id)
            .bind(violation.kind.code())
            .bind(&violation.job_id)
            .bind(&violation.label)
            .bind(&violation.result)
            .execute(&mut *tx)
            .await?;

            let deleted = sqlx::query("DELETE FROM creation WHERE id = $1 AND status = $2")
                .bind(violation.creation_id)
                .bind(STATUS_REVIEWING)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(deleted.rows_affected() > 0)
        })
        .await
    }

    async fn remove_creation(&self, uuid: String, id: i64) -> RepoResult<RemovedCreation> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let creation = Self::lock_creation(&mut tx, id).await?;
            if creation.uuid != uuid {
                return Err(RepoError::NotOwner {
                    uuid,
                    entity: format!("creation {}", id),
                });
            }

            let collectors: Vec<String> =
                sqlx::query_scalar("DELETE FROM creation_collect WHERE creation_id = $1 RETURNING uuid")
                    .bind(id)
                    .fetch_all(&mut *tx)
                    .await?;
            sqlx::query("DELETE FROM creation_agree WHERE creation_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let statistic = sqlx::query_as::<_, CreationStatistic>(&format!(
                "DELETE FROM creation_statistic WHERE creation_id = $1 RETURNING {}",
                STATISTIC_COLUMNS
            ))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM creation WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(RemovedCreation {
                creation,
                statistic,
                collectors,
            })
        })
        .await
    }

    async fn set_agree(&self, uuid: String, creation_id: i64) -> RepoResult<bool> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let inserted = sqlx::query(
                "INSERT INTO creation_agree (creation_id, uuid) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(creation_id)
            .bind(&uuid)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;
            if inserted {
                Self::bump(&mut tx, creation_id, "agree", 1).await?;
            }
            tx.commit().await?;
            Ok(inserted)
        })
        .await
    }

    async fn cancel_agree(&self, uuid: String, creation_id: i64) -> RepoResult<bool> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let deleted = sqlx::query("DELETE FROM creation_agree WHERE creation_id = $1 AND uuid = $2")
                .bind(creation_id)
                .bind(&uuid)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                > 0;
            if deleted {
                Self::bump(&mut tx, creation_id, "agree", -1).await?;
            }
            tx.commit().await?;
            Ok(deleted)
        })
        .await
    }

    async fn set_collect(&self, uuid: String, creation: Creation) -> RepoResult<bool> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let inserted = sqlx::query(
                r#"
                INSERT INTO creation_collect (creation_id, uuid, kind) VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(creation.id)
            .bind(&uuid)
            .bind(creation.kind)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;
            if inserted {
                Self::bump(&mut tx, creation.id, "collect", 1).await?;
            }
            tx.commit().await?;
            Ok(inserted)
        })
        .await
    }

    async fn cancel_collect(&self, uuid: String, creation_id: i64) -> RepoResult<bool> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let deleted = sqlx::query("DELETE FROM creation_collect WHERE creation_id = $1 AND uuid = $2")
                .bind(creation_id)
                .bind(&uuid)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                > 0;
            if deleted {
                Self::bump(&mut tx, creation_id, "collect", -1).await?;
            }
            tx.commit().await?;
            Ok(deleted)
        })
        .await
    }

    async fn add_view(&self, creation_id: i64) -> RepoResult<()> {
        self.bounded(async {
            sqlx::query("UPDATE creation_statistic SET view = view + 1 WHERE creation_id = $1")
                .bind(creation_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn adjust_comment_count(&self, creation_id: i64, delta: i64, key: String) -> RepoResult<bool> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let fresh = sqlx::query(
                r#"
                INSERT INTO creation_comment_count_log (idempotency_key, creation_id, delta)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&key)
            .bind(creation_id)
            .bind(delta)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;
            if fresh {
                Self::bump(&mut tx, creation_id, "comment", delta).await?;
            }
            tx.commit().await?;
            Ok(fresh)
        })
        .await
    }

    async fn list_creations(&self, kind: CreationKind, offset: i64, limit: i64) -> RepoResult<Vec<Creation>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, Creation>(&format!(
                r#"
                SELECT {}
                FROM creation
                WHERE kind = $1 AND status = $2
                ORDER BY id DESC
                LIMIT $3 OFFSET $4
                "#,
                CREATION_COLUMNS
            ))
            .bind(kind.code())
            .bind(STATUS_PASSED)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn list_hot_creations(
        &self,
        kind: CreationKind,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<ScoredCreationRow>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, ScoredCreationRow>(
                r#"
                SELECT c.id, c.uuid, c.kind, COALESCE(s.agree, 0) AS score
                FROM creation c
                LEFT JOIN creation_statistic s ON s.creation_id = c.id
                WHERE c.kind = $1 AND c.status = $2
                ORDER BY score DESC, c.id DESC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(kind.code())
            .bind(STATUS_PASSED)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn list_user_creations(
        &self,
        uuid: String,
        kind: CreationKind,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<Creation>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, Creation>(&format!(
                r#"
                SELECT {}
                FROM creation
                WHERE uuid = $1 AND kind = $2 AND status = $3
                ORDER BY id DESC
                LIMIT $4 OFFSET $5
                "#,
                CREATION_COLUMNS
            ))
            .bind(&uuid)
            .bind(kind.code())
            .bind(STATUS_PASSED)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn list_collects(&self, uuid: String, offset: i64, limit: i64) -> RepoResult<Vec<CollectRow>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, CollectRow>(
                r#"
                SELECT cc.creation_id, c.uuid AS author, cc.kind, cc.created_at
                FROM creation_collect cc
                JOIN creation c ON c.id = cc.creation_id
                WHERE cc.uuid = $1
                ORDER BY cc.created_at DESC, cc.creation_id DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(&uuid)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn leaderboard(&self, offset: i64, limit: i64) -> RepoResult<Vec<ScoredCreationRow>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, ScoredCreationRow>(
                r#"
                SELECT c.id, c.uuid, c.kind, (s.agree + s.collect + s.comment) AS score
                FROM creation_statistic s
                JOIN creation c ON c.id = s.creation_id
                WHERE c.status = $1
                ORDER BY score DESC, c.id DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(STATUS_PASSED)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn creation_statistics(&self, kind: CreationKind, ids: Vec<i64>) -> RepoResult<Vec<CreationStatistic>> {
        self.bounded(async {
            let rows = sqlx::query_as::<_, CreationStatistic>(&format!(
                "SELECT {} FROM creation_statistic WHERE kind = $1 AND creation_id = ANY($2)",
                STATISTIC_COLUMNS
            ))
            .bind(kind.code())
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn user_statistic(&self, uuid: String) -> RepoResult<UserCreationStatistic> {
        self.bounded(async {
            let row = sqlx::query_as::<_, UserCreationStatistic>(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE c.kind = 1) AS article,
                    COUNT(*) FILTER (WHERE c.kind = 2) AS "column",
                    COUNT(*) FILTER (WHERE c.kind = 3) AS talk,
                    COALESCE(SUM(s.agree), 0)::BIGINT AS agree,
                    COALESCE(SUM(s.collect), 0)::BIGINT AS collect
                FROM creation c
                LEFT JOIN creation_statistic s ON s.creation_id = c.id
                WHERE c.uuid = $1 AND c.status = $2
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
                SELECT id, kind, uuid, title, content
                FROM creation
                WHERE status = $1 AND created_at < NOW() - make_interval(secs => $2)
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
