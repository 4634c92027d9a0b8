//! Campaign storage contract and the in-memory store backed by DashMap.
//!
//! Production: back the trait with a transactional store whose `save` is a
//! conditional `UPDATE ... WHERE id = ? AND status = ?`.

use std::collections::HashMap;

use async_trait::async_trait;
use campaign_core::{CampaignError, CampaignResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::record::{CampaignRecord, CampaignStatus};

/// Query predicate over campaign records. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignFilter {
    pub status: Option<CampaignStatus>,
    /// Case-insensitive substring match on the name.
    pub name: Option<String>,
    pub has_external_id: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub min_budget: Option<Decimal>,
    pub max_budget: Option<Decimal>,
    /// Scan by `(created_at, id)` ascending instead of newest first.
    #[serde(default)]
    pub oldest_first: bool,
    /// Keyset cursor: only records whose `(created_at, id)` sorts after it.
    pub after: Option<(DateTime<Utc>, Uuid)>,
    pub limit: Option<usize>,
}

impl CampaignFilter {
    pub fn with_status(status: CampaignStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Campaigns provisioned remotely and still waiting for confirmation,
    /// oldest first, resuming after `after`.
    pub fn awaiting_confirmation(limit: usize, after: Option<(DateTime<Utc>, Uuid)>) -> Self {
        Self {
            status: Some(CampaignStatus::Processing),
            has_external_id: Some(true),
            oldest_first: true,
            after,
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &CampaignRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !record.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(has_external_id) = self.has_external_id {
            if record.has_external_id() != has_external_id {
                return false;
            }
        }
        if self.created_after.is_some_and(|after| record.created_at < after) {
            return false;
        }
        if self.created_before.is_some_and(|before| record.created_at > before) {
            return false;
        }
        if self.min_budget.is_some_and(|min| record.budget < min) {
            return false;
        }
        if self.max_budget.is_some_and(|max| record.budget > max) {
            return false;
        }
        if self
            .after
            .is_some_and(|cursor| (record.created_at, record.id) <= cursor)
        {
            return false;
        }
        true
    }
}

/// Keyed campaign store shared by every worker.
///
/// Only single-record conditional writes are exposed; nothing in the engine
/// needs a multi-record transaction.
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> CampaignResult<CampaignRecord>;

    /// Matching records, newest first unless `filter.oldest_first`, truncated
    /// to `filter.limit`.
    async fn find(&self, filter: &CampaignFilter) -> CampaignResult<Vec<CampaignRecord>>;

    async fn insert(&self, record: CampaignRecord) -> CampaignResult<()>;

    /// Replaces the stored record only if its status is still `expected`.
    async fn save(&self, record: &CampaignRecord, expected: CampaignStatus) -> CampaignResult<()>;

    async fn delete(&self, id: Uuid) -> CampaignResult<CampaignRecord>;

    /// Record counts keyed by status.
    async fn count_by_status(&self) -> CampaignResult<HashMap<CampaignStatus, usize>>;
}

/// Thread-safe in-memory campaign store.
#[derive(Default)]
pub struct InMemoryCampaignRepository {
    campaigns: DashMap<Uuid, CampaignRecord>,
}

impl InMemoryCampaignRepository {
    pub fn new() -> Self {
        info!("Campaign repository initialized (in-memory)");
        Self {
            campaigns: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }
}

#[async_trait]
impl CampaignRepository for InMemoryCampaignRepository {
    async fn get(&self, id: Uuid) -> CampaignResult<CampaignRecord> {
        self.campaigns
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(CampaignError::NotFound(id))
    }

    async fn find(&self, filter: &CampaignFilter) -> CampaignResult<Vec<CampaignRecord>> {
        let mut campaigns: Vec<CampaignRecord> = self
            .campaigns
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        if filter.oldest_first {
            campaigns.sort_by_key(|c| (c.created_at, c.id));
        } else {
            campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        if let Some(limit) = filter.limit {
            campaigns.truncate(limit);
        }
        Ok(campaigns)
    }

    async fn insert(&self, record: CampaignRecord) -> CampaignResult<()> {
        if self.campaigns.contains_key(&record.id) {
            return Err(CampaignError::Storage(format!(
                "campaign {} already exists",
                record.id
            )));
        }
        self.campaigns.insert(record.id, record);
        Ok(())
    }

    async fn save(&self, record: &CampaignRecord, expected: CampaignStatus) -> CampaignResult<()> {
        let mut entry = self
            .campaigns
            .get_mut(&record.id)
            .ok_or(CampaignError::NotFound(record.id))?;
        let stored = entry.value_mut();
        if stored.status != expected {
            debug!(
                campaign_id = %record.id,
                expected = %expected,
                actual = %stored.status,
                "conditional save rejected"
            );
            return Err(CampaignError::Conflict {
                id: record.id,
                expected: expected.to_string(),
            });
        }
        *stored = record.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CampaignResult<CampaignRecord> {
        self.campaigns
            .remove(&id)
            .map(|(_, record)| record)
            .ok_or(CampaignError::NotFound(id))
    }

    async fn count_by_status(&self) -> CampaignResult<HashMap<CampaignStatus, usize>> {
        let mut counts = HashMap::new();
        for entry in self.campaigns.iter() {
            *counts.entry(entry.value().status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NewCampaign;
    use rust_decimal_macros::dec;

    fn record(name: &str, budget: Decimal) -> CampaignRecord {
        CampaignRecord::new(
            NewCampaign::new(name, budget, vec!["kw".to_string()])
                .validate()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let repo = InMemoryCampaignRepository::new();
        let campaign = record("Spring", dec!(10));
        let id = campaign.id;

        repo.insert(campaign.clone()).await.unwrap();
        assert!(repo.insert(campaign).await.is_err());
        assert_eq!(repo.get(id).await.unwrap().name, "Spring");

        repo.delete(id).await.unwrap();
        assert!(matches!(repo.get(id).await, Err(CampaignError::NotFound(_))));
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_conditional_save() {
        let repo = InMemoryCampaignRepository::new();
        let mut campaign = record("Spring", dec!(10));
        repo.insert(campaign.clone()).await.unwrap();

        campaign.mark_processing("AMZ-10001").unwrap();
        repo.save(&campaign, CampaignStatus::Pending).await.unwrap();

        // A stale writer that still believes the record is pending loses.
        let mut stale = campaign.clone();
        stale.status = CampaignStatus::Pending;
        stale.external_id = None;
        let result = repo.save(&stale, CampaignStatus::Pending).await;
        assert!(matches!(result, Err(CampaignError::Conflict { .. })));

        let stored = repo.get(campaign.id).await.unwrap();
        assert_eq!(stored.status, CampaignStatus::Processing);
        assert_eq!(stored.external_id.as_deref(), Some("AMZ-10001"));
    }

    #[tokio::test]
    async fn test_find_with_filter() {
        let repo = InMemoryCampaignRepository::new();
        let mut provisioned = record("Holiday Boots", dec!(500));
        provisioned.mark_processing("AMZ-20002").unwrap();
        repo.insert(provisioned).await.unwrap();
        repo.insert(record("Holiday Hats", dec!(20))).await.unwrap();
        repo.insert(record("Winter Coats", dec!(80))).await.unwrap();

        let found = repo
            .find(&CampaignFilter::awaiting_confirmation(10, None))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Holiday Boots");

        let filter = CampaignFilter {
            name: Some("holiday".to_string()),
            max_budget: Some(dec!(100)),
            ..CampaignFilter::default()
        };
        let found = repo.find(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Holiday Hats");

        let filter = CampaignFilter {
            limit: Some(2),
            ..CampaignFilter::default()
        };
        assert_eq!(repo.find(&filter).await.unwrap().len(), 2);

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.get(&CampaignStatus::Pending), Some(&2));
        assert_eq!(counts.get(&CampaignStatus::Processing), Some(&1));
    }

    #[tokio::test]
    async fn test_oldest_first_keyset_scan() {
        let repo = InMemoryCampaignRepository::new();
        let mut inserted = Vec::new();
        for i in 0..4 {
            let mut campaign = record(&format!("Campaign {i}"), dec!(10));
            campaign.created_at += chrono::Duration::seconds(i);
            campaign.mark_processing(format!("AMZ-1000{i}")).unwrap();
            repo.insert(campaign.clone()).await.unwrap();
            inserted.push(campaign);
        }

        let first = repo
            .find(&CampaignFilter::awaiting_confirmation(3, None))
            .await
            .unwrap();
        let names: Vec<_> = first.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Campaign 0", "Campaign 1", "Campaign 2"]);

        let last = first.last().map(|c| (c.created_at, c.id));
        let rest = repo
            .find(&CampaignFilter::awaiting_confirmation(3, last))
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, inserted[3].id);
    }
}
