//! End-to-end flow through the dispatcher against the simulated platform.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use campaign_core::AppConfig;
    use campaign_engine::{
        CampaignFilter, CampaignRepository, CampaignStatus, InMemoryCampaignRepository,
        NewCampaign, SimulatedAdService, SyncEngine, SyncOutcome, MAX_RETRIES,
    };
    use rust_decimal_macros::dec;

    fn config(error_rate: f64) -> AppConfig {
        let mut config = AppConfig::default();
        config.ads.error_rate = error_rate;
        config.ads.min_latency_ms = 0;
        config.ads.max_latency_ms = 0;
        config.ads.seed = Some(7);
        config.sweep.enabled = false;
        config
    }

    fn start(config: &AppConfig) -> (Arc<InMemoryCampaignRepository>, SyncEngine) {
        let repo = Arc::new(InMemoryCampaignRepository::new());
        let ads = Arc::new(SimulatedAdService::new(config.ads.clone()));
        let engine = SyncEngine::start(config, repo.clone(), ads);
        (repo, engine)
    }

    fn campaign(i: usize) -> NewCampaign {
        NewCampaign::with_keyword_list(format!("Campaign {i}"), dec!(12.50), "shoes, boots")
    }

    #[tokio::test(start_paused = true)]
    async fn test_campaigns_reach_active_on_reliable_platform() {
        let config = config(0.0);
        let (repo, engine) = start(&config);
        let service = engine.service();

        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(service.create_campaign(campaign(i)).await.unwrap().id);
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        let processing = repo
            .find(&CampaignFilter::with_status(CampaignStatus::Processing))
            .await
            .unwrap();
        assert_eq!(processing.len(), 10);

        // Each poll reports live with some probability; keep sweeping.
        let sweep = engine.sweep();
        for _ in 0..50 {
            if sweep.sweep_once().await.total == 0 {
                break;
            }
        }

        let mut external_ids = Vec::new();
        for id in &ids {
            let record = service.get_campaign(*id).await.unwrap();
            assert!(record.is_synced(), "campaign {id} not synced");
            assert!(record.synced_at.is_some());
            record.check_invariants().unwrap();
            external_ids.push(record.external_id.unwrap());
        }
        external_ids.sort();
        external_ids.dedup();
        assert_eq!(external_ids.len(), 10);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.by_status[&CampaignStatus::Active], 10);

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_platform_exhausts_operator_retries() {
        let config = config(1.0);
        let (repo, engine) = start(&config);
        let service = engine.service();

        let id = service.create_campaign(campaign(1)).await.unwrap().id;
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;

        for expected in 1..MAX_RETRIES {
            let record = repo.get(id).await.unwrap();
            assert_eq!(record.status, CampaignStatus::Failed);
            assert_eq!(record.retry_count, expected);
            assert!(record.external_id.is_none());

            service.retry_campaign(id).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }

        let record = repo.get(id).await.unwrap();
        assert_eq!(record.status, CampaignStatus::Failed);
        assert_eq!(record.retry_count, MAX_RETRIES);
        assert!(!record.can_retry());
        assert!(service.retry_campaign(id).await.is_err());

        // Redelivery of a stale job is refused without touching the record.
        let stale = engine.orchestrator().synchronize(id).await;
        assert!(stale.is_err());
        assert_eq!(repo.get(id).await.unwrap(), record);

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_synchronize_is_idempotent_end_to_end() {
        let config = config(0.0);
        let (repo, engine) = start(&config);
        let orchestrator = engine.orchestrator();

        let record = engine
            .service()
            .create_campaign(campaign(3))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        let provisioned = repo.get(record.id).await.unwrap();

        for _ in 0..3 {
            let outcome = orchestrator.synchronize(record.id).await.unwrap();
            assert_eq!(outcome, SyncOutcome::AlreadyProvisioned);
        }
        assert_eq!(repo.get(record.id).await.unwrap(), provisioned);

        engine.shutdown().await;
    }
}
