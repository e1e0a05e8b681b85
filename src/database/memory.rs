use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{
    ListQuery, ListSort, NewPrBubble, PrBubble, PrBubblePatch, PrPage, PrStatus, TrackEvent,
};
use crate::database::repository::PrBubbleRepository;

/// Process-local record store with the same ordering and atomicity
/// guarantees as the PostgreSQL repository. Backs the router test suites.
#[derive(Default)]
pub struct MemoryPrBubbleRepository {
    rows: RwLock<HashMap<Uuid, PrBubble>>,
}

impl MemoryPrBubbleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn materialize(id: Uuid, new: NewPrBubble, now: DateTime<Utc>) -> PrBubble {
        PrBubble {
            id,
            title: new.title,
            description: new.description,
            image_url: new.image_url,
            link_url: new.link_url,
            tag_type: new.tag_type,
            tag_text: new.tag_text,
            tag_color: new.tag_color,
            start_date: new.start_date,
            end_date: new.end_date,
            priority: new.priority,
            status: new.status,
            utm_campaign: new.utm_campaign,
            view_count: 0,
            click_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// `priority DESC NULLS LAST`
fn priority_desc(a: Option<i32>, b: Option<i32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn list_order(sort: ListSort, a: &PrBubble, b: &PrBubble) -> Ordering {
    let by_created = b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id));
    match sort {
        ListSort::CreatedAt => by_created,
        ListSort::Priority => priority_desc(a.priority, b.priority).then(by_created),
    }
}

#[async_trait]
impl PrBubbleRepository for MemoryPrBubbleRepository {
    async fn create(&self, new: NewPrBubble) -> Result<PrBubble, DatabaseError> {
        let pr = Self::materialize(Uuid::new_v4(), new, Utc::now());
        self.rows.write().await.insert(pr.id, pr.clone());
        Ok(pr)
    }

    async fn get(&self, id: Uuid) -> Result<PrBubble, DatabaseError> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DatabaseError::NotFound(id))
    }

    async fn list(&self, query: &ListQuery) -> Result<PrPage, DatabaseError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<PrBubble> = rows
            .values()
            .filter(|pr| query.status.map_or(true, |status| pr.status == status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| list_order(query.sort, a, b));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .collect();

        Ok(PrPage {
            items,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn update(&self, id: Uuid, patch: PrBubblePatch) -> Result<PrBubble, DatabaseError> {
        // Merge and write under one lock, like the single UPDATE statement.
        let mut rows = self.rows.write().await;
        let existing = rows.get_mut(&id).ok_or(DatabaseError::NotFound(id))?;

        let content = patch.apply(existing.content());
        if content.end_date < content.start_date {
            return Err(DatabaseError::InvalidWindow(id));
        }

        let updated = PrBubble {
            view_count: existing.view_count,
            click_count: existing.click_count,
            created_at: existing.created_at,
            ..Self::materialize(id, content, Utc::now())
        };
        *existing = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(DatabaseError::NotFound(id))
    }

    async fn duplicate(&self, id: Uuid) -> Result<PrBubble, DatabaseError> {
        let mut rows = self.rows.write().await;
        let source = rows.get(&id).ok_or(DatabaseError::NotFound(id))?;

        let mut content = source.content();
        content.status = PrStatus::Draft;
        let copy = Self::materialize(Uuid::new_v4(), content, Utc::now());
        rows.insert(copy.id, copy.clone());
        Ok(copy)
    }

    async fn active(&self, now: DateTime<Utc>, limit: Option<u32>) -> Result<Vec<PrBubble>, DatabaseError> {
        let rows = self.rows.read().await;
        let mut live: Vec<PrBubble> = rows.values().filter(|pr| pr.is_live_at(now)).cloned().collect();
        live.sort_by(|a, b| {
            priority_desc(a.priority, b.priority)
                .then(b.start_date.cmp(&a.start_date))
                .then(a.id.cmp(&b.id))
        });
        if let Some(limit) = limit {
            live.truncate(limit as usize);
        }
        Ok(live)
    }

    async fn track(&self, id: Uuid, event: TrackEvent) -> Result<(), DatabaseError> {
        // Holding the write lock across read-increment-write mirrors the row lock.
        let mut rows = self.rows.write().await;
        let pr = rows.get_mut(&id).ok_or(DatabaseError::NotFound(id))?;
        match event {
            TrackEvent::View => pr.view_count += 1,
            TrackEvent::Click => pr.click_count += 1,
        }
        pr.updated_at = Utc::now();
        Ok(())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::TagType;
    use chrono::Duration;
    use std::sync::Arc;

    fn content(title: &str, status: PrStatus, priority: Option<i32>, start_offset_days: i64) -> NewPrBubble {
        let now = Utc::now();
        NewPrBubble {
            title: title.to_string(),
            description: "desc".to_string(),
            image_url: "https://cdn.example.com/a.png".to_string(),
            link_url: "https://shop.example.com".to_string(),
            tag_type: TagType::Gizmart,
            tag_text: "GIZMART".to_string(),
            tag_color: "#FF1BE8".to_string(),
            start_date: now + Duration::days(start_offset_days),
            end_date: now + Duration::days(start_offset_days + 10),
            priority,
            status,
            utm_campaign: None,
        }
    }

    #[tokio::test]
    async fn active_orders_by_priority_then_start() {
        let repo = MemoryPrBubbleRepository::new();
        let low = repo.create(content("low", PrStatus::Active, Some(1), -1)).await.unwrap();
        let none = repo.create(content("none", PrStatus::Active, None, -1)).await.unwrap();
        let high = repo.create(content("high", PrStatus::Active, Some(9), -2)).await.unwrap();
        let high_later = repo.create(content("high-later", PrStatus::Active, Some(9), -1)).await.unwrap();
        repo.create(content("draft", PrStatus::Draft, Some(100), -1)).await.unwrap();
        repo.create(content("future", PrStatus::Active, Some(100), 5)).await.unwrap();

        let active = repo.active(Utc::now(), None).await.unwrap();
        let ids: Vec<Uuid> = active.iter().map(|pr| pr.id).collect();
        assert_eq!(ids, vec![high_later.id, high.id, low.id, none.id]);

        let limited = repo.active(Utc::now(), Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let repo = MemoryPrBubbleRepository::new();
        for i in 0..5 {
            repo.create(content(&format!("draft {}", i), PrStatus::Draft, None, 0)).await.unwrap();
        }
        repo.create(content("active", PrStatus::Active, None, 0)).await.unwrap();

        let query = ListQuery { status: Some(PrStatus::Draft), sort: ListSort::CreatedAt, page: 2, limit: 2 };
        let page = repo.list(&query).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|pr| pr.status == PrStatus::Draft));

        let query = ListQuery { status: None, sort: ListSort::CreatedAt, page: 4, limit: 2 };
        let page = repo.list(&query).await.unwrap();
        assert_eq!(page.total, 6);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn concurrent_tracking_loses_no_updates() {
        let repo = Arc::new(MemoryPrBubbleRepository::new());
        let pr = repo.create(content("t", PrStatus::Active, None, -1)).await.unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { repo.track(pr.id, TrackEvent::View).await })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let after = repo.get(pr.id).await.unwrap();
        assert_eq!(after.view_count, 50);
        assert_eq!(after.click_count, 0);
    }

    #[tokio::test]
    async fn update_preserves_counters() {
        let repo = MemoryPrBubbleRepository::new();
        let pr = repo.create(content("t", PrStatus::Active, Some(4), -1)).await.unwrap();
        repo.track(pr.id, TrackEvent::Click).await.unwrap();

        let patch = PrBubblePatch {
            title: Some("changed".to_string()),
            priority: Some(None),
            ..Default::default()
        };
        let updated = repo.update(pr.id, patch).await.unwrap();
        assert_eq!(updated.click_count, 1);
        assert_eq!(updated.created_at, pr.created_at);
        assert_eq!(updated.title, "changed");
        assert_eq!(updated.priority, None);
        assert_eq!(updated.description, pr.description);
    }

    #[tokio::test]
    async fn update_refuses_window_ending_before_start() {
        let repo = MemoryPrBubbleRepository::new();
        let pr = repo.create(content("t", PrStatus::Active, None, -1)).await.unwrap();

        let patch = PrBubblePatch {
            title: Some("ignored".to_string()),
            end_date: Some(pr.start_date - Duration::hours(1)),
            ..Default::default()
        };
        let err = repo.update(pr.id, patch).await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidWindow(id) if id == pr.id));
        assert_eq!(repo.get(pr.id).await.unwrap().title, "t");
    }

    #[tokio::test]
    async fn concurrent_patches_to_different_fields_both_land() {
        let repo = Arc::new(MemoryPrBubbleRepository::new());
        let pr = repo.create(content("t", PrStatus::Active, None, -1)).await.unwrap();

        let title = PrBubblePatch {
            title: Some("new title".to_string()),
            ..Default::default()
        };
        let description = PrBubblePatch {
            description: Some("new description".to_string()),
            ..Default::default()
        };
        let (a, b) = tokio::join!(repo.update(pr.id, title), repo.update(pr.id, description));
        a.unwrap();
        b.unwrap();

        let after = repo.get(pr.id).await.unwrap();
        assert_eq!(after.title, "new title");
        assert_eq!(after.description, "new description");
    }
}
