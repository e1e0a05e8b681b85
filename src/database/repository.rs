use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{
    ListQuery, ListSort, NewPrBubble, PrBubble, PrBubblePatch, PrBubbleRow, PrPage, PrStatus, TrackEvent,
};

/// CHECK constraint keeping `end_date >= start_date`.
const WINDOW_CONSTRAINT: &str = "pr_bubbles_window";

/// Record store for PR bubbles.
///
/// Every method is a single statement against the backing store, so
/// concurrent writers never overwrite each other's columns.
#[async_trait]
pub trait PrBubbleRepository: Send + Sync {
    async fn create(&self, new: NewPrBubble) -> Result<PrBubble, DatabaseError>;

    async fn get(&self, id: Uuid) -> Result<PrBubble, DatabaseError>;

    async fn list(&self, query: &ListQuery) -> Result<PrPage, DatabaseError>;

    /// Write only the columns present in `patch`. Counters are never written
    /// here. A result that ends before it starts is `InvalidWindow`.
    async fn update(&self, id: Uuid, patch: PrBubblePatch) -> Result<PrBubble, DatabaseError>;

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Copy content into a new draft with fresh identity, timestamps and counters.
    async fn duplicate(&self, id: Uuid) -> Result<PrBubble, DatabaseError>;

    /// Bubbles with status=active whose window contains `now`, highest
    /// priority first (null lowest), then latest start, then id.
    async fn active(&self, now: DateTime<Utc>, limit: Option<u32>) -> Result<Vec<PrBubble>, DatabaseError>;

    /// Atomically bump one counter.
    async fn track(&self, id: Uuid, event: TrackEvent) -> Result<(), DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}

const COLUMNS: &str = "id, title, description, image_url, link_url, tag_type, tag_text, tag_color, \
     start_date, end_date, priority, status, utm_campaign, view_count, click_count, created_at, updated_at";

pub struct PgPrBubbleRepository {
    pool: PgPool,
}

impl PgPrBubbleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn order_clause(sort: ListSort) -> &'static str {
        match sort {
            ListSort::CreatedAt => "ORDER BY created_at DESC, id ASC",
            ListSort::Priority => "ORDER BY priority DESC NULLS LAST, created_at DESC, id ASC",
        }
    }
}

fn into_bubbles(rows: Vec<PrBubbleRow>) -> Result<Vec<PrBubble>, DatabaseError> {
    rows.into_iter().map(PrBubble::try_from).collect()
}

#[async_trait]
impl PrBubbleRepository for PgPrBubbleRepository {
    async fn create(&self, new: NewPrBubble) -> Result<PrBubble, DatabaseError> {
        let sql = format!(
            "INSERT INTO pr_bubbles (id, title, description, image_url, link_url, tag_type, tag_text, \
             tag_color, start_date, end_date, priority, status, utm_campaign) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {}",
            COLUMNS
        );

        let row = sqlx::query_as::<_, PrBubbleRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.image_url)
            .bind(&new.link_url)
            .bind(new.tag_type.as_str())
            .bind(&new.tag_text)
            .bind(&new.tag_color)
            .bind(new.start_date)
            .bind(new.end_date)
            .bind(new.priority)
            .bind(new.status.as_str())
            .bind(&new.utm_campaign)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn get(&self, id: Uuid) -> Result<PrBubble, DatabaseError> {
        let sql = format!("SELECT {} FROM pr_bubbles WHERE id = $1", COLUMNS);

        sqlx::query_as::<_, PrBubbleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DatabaseError::NotFound(id))?
            .try_into()
    }

    async fn list(&self, query: &ListQuery) -> Result<PrPage, DatabaseError> {
        let status = query.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pr_bubbles WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "SELECT {} FROM pr_bubbles WHERE ($1::text IS NULL OR status = $1) {} LIMIT $2 OFFSET $3",
            COLUMNS,
            Self::order_clause(query.sort)
        );

        let rows = sqlx::query_as::<_, PrBubbleRow>(&sql)
            .bind(status)
            .bind(i64::from(query.limit))
            .bind(query.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(PrPage {
            items: into_bubbles(rows)?,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn update(&self, id: Uuid, patch: PrBubblePatch) -> Result<PrBubble, DatabaseError> {
        // Absent fields keep the stored value. The nullable columns carry an
        // explicit flag so that `null` can clear them.
        let sql = format!(
            "UPDATE pr_bubbles SET \
             title = COALESCE($2, title), \
             description = COALESCE($3, description), \
             image_url = COALESCE($4, image_url), \
             link_url = COALESCE($5, link_url), \
             tag_type = COALESCE($6, tag_type), \
             tag_text = COALESCE($7, tag_text), \
             tag_color = COALESCE($8, tag_color), \
             start_date = COALESCE($9, start_date), \
             end_date = COALESCE($10, end_date), \
             priority = CASE WHEN $11 THEN $12 ELSE priority END, \
             status = COALESCE($13, status), \
             utm_campaign = CASE WHEN $14 THEN $15 ELSE utm_campaign END, \
             updated_at = now() \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        );

        let result = sqlx::query_as::<_, PrBubbleRow>(&sql)
            .bind(id)
            .bind(&patch.title)
            .bind(&patch.description)
            .bind(&patch.image_url)
            .bind(&patch.link_url)
            .bind(patch.tag_type.map(|t| t.as_str()))
            .bind(&patch.tag_text)
            .bind(&patch.tag_color)
            .bind(patch.start_date)
            .bind(patch.end_date)
            .bind(patch.priority.is_some())
            .bind(patch.priority.flatten())
            .bind(patch.status.map(|s| s.as_str()))
            .bind(patch.utm_campaign.is_some())
            .bind(patch.utm_campaign.as_ref().and_then(|c| c.as_deref()))
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(row) => row.ok_or(DatabaseError::NotFound(id))?.try_into(),
            Err(sqlx::Error::Database(db)) if db.constraint() == Some(WINDOW_CONSTRAINT) => {
                Err(DatabaseError::InvalidWindow(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM pr_bubbles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        Ok(())
    }

    async fn duplicate(&self, id: Uuid) -> Result<PrBubble, DatabaseError> {
        let sql = format!(
            "INSERT INTO pr_bubbles (id, title, description, image_url, link_url, tag_type, tag_text, \
             tag_color, start_date, end_date, priority, status, utm_campaign) \
             SELECT $2, title, description, image_url, link_url, tag_type, tag_text, \
             tag_color, start_date, end_date, priority, $3, utm_campaign \
             FROM pr_bubbles WHERE id = $1 \
             RETURNING {}",
            COLUMNS
        );

        sqlx::query_as::<_, PrBubbleRow>(&sql)
            .bind(id)
            .bind(Uuid::new_v4())
            .bind(PrStatus::Draft.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DatabaseError::NotFound(id))?
            .try_into()
    }

    async fn active(&self, now: DateTime<Utc>, limit: Option<u32>) -> Result<Vec<PrBubble>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM pr_bubbles \
             WHERE status = $1 AND start_date <= $2 AND end_date >= $2 \
             ORDER BY priority DESC NULLS LAST, start_date DESC, id ASC \
             LIMIT $3",
            COLUMNS
        );

        // LIMIT NULL means no limit in PostgreSQL
        let rows = sqlx::query_as::<_, PrBubbleRow>(&sql)
            .bind(PrStatus::Active.as_str())
            .bind(now)
            .bind(limit.map(i64::from))
            .fetch_all(&self.pool)
            .await?;

        into_bubbles(rows)
    }

    async fn track(&self, id: Uuid, event: TrackEvent) -> Result<(), DatabaseError> {
        // Row-level increment; concurrent callers serialize on the row lock.
        let column = event.column();
        let sql = format!(
            "UPDATE pr_bubbles SET {col} = {col} + 1, updated_at = now() WHERE id = $1",
            col = column
        );

        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
