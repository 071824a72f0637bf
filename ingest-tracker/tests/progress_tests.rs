//! Progress aggregation scenarios against a real ledger

mod helpers;

use helpers::*;
use ingest_tracker::db::{datasets, tiers};
use ingest_tracker::models::{
    ContentTier, DatasetId, DatasetStatus, FileType, HarvestParameters, MetadataTier, PortalLink,
    Step, TierContext, WorkflowKind,
};
use ingest_tracker::services::aggregator::{
    PLACEHOLDER_ALL_FAILED, PLACEHOLDER_COUNTING, PLACEHOLDER_EMPTY, PLACEHOLDER_IN_PROGRESS,
};
use ingest_tracker::services::resolve_steps;
use ingest_tracker::TrackerError;

#[tokio::test]
async fn unknown_dataset_is_not_found() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let result = aggregator(&pool).get_progress(DatasetId(404)).await;
    assert!(matches!(result, Err(TrackerError::DatasetNotFound(DatasetId(404)))));
}

#[tokio::test]
async fn counting_in_progress_before_harvest_finishes() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let id = seed_dataset(&pool, "counting").await.unwrap().dataset_id;
    succeed_through(&pool, id, 0..3, &[Step::HarvestFile]).await.unwrap();

    let snapshot = aggregator(&pool).get_progress(id).await.unwrap();

    assert_eq!(snapshot.status, DatasetStatus::InProgress);
    assert_eq!(snapshot.total_expected, None);
    assert_eq!(
        snapshot.portal_link,
        PortalLink::Placeholder(PLACEHOLDER_COUNTING.to_string())
    );
    assert_eq!(snapshot.step(Step::HarvestFile).unwrap().success, 3);
}

#[tokio::test]
async fn empty_dataset() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let id = seed_dataset(&pool, "empty").await.unwrap().dataset_id;
    datasets::finish_harvest(&pool, id, 0, false).await.unwrap();

    let snapshot = aggregator(&pool).get_progress(id).await.unwrap();

    assert_eq!(snapshot.status, DatasetStatus::Empty);
    assert_eq!(snapshot.total_processed, 0);
    assert_eq!(snapshot.portal_link, PortalLink::Placeholder(PLACEHOLDER_EMPTY.to_string()));
    assert!(snapshot.progress_by_step.iter().all(|p| p.total == 0));
}

#[tokio::test]
async fn all_records_fail_validation() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let id = seed_dataset(&pool, "broken").await.unwrap().dataset_id;
    datasets::finish_harvest(&pool, id, 5, false).await.unwrap();

    for record in 0..5 {
        succeed(&pool, id, record, Step::HarvestFile).await.unwrap();
        fail(&pool, id, record, Step::ValidateExternal, "not EDM").await.unwrap();
    }

    let snapshot = aggregator(&pool).get_progress(id).await.unwrap();

    assert_eq!(snapshot.status, DatasetStatus::AllFailed);
    assert_eq!(snapshot.total_processed, 5);
    assert_eq!(
        snapshot.portal_link,
        PortalLink::Placeholder(PLACEHOLDER_ALL_FAILED.to_string())
    );

    let validation = snapshot.step(Step::ValidateExternal).unwrap();
    assert_eq!(validation.fail, 5);
    assert_eq!(validation.errors.len(), 1);
    assert_eq!(validation.errors[0].message, "not EDM");
    assert_eq!(validation.errors[0].count, 5);
    assert_eq!(snapshot.step(Step::Index).unwrap().total, 0);
}

#[tokio::test]
async fn partial_pipeline_then_completion() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let dataset = seed_dataset(&pool, "partial").await.unwrap();
    let id = dataset.dataset_id;
    datasets::finish_harvest(&pool, id, 10, false).await.unwrap();

    succeed_through(&pool, id, 0..10, &[Step::HarvestFile]).await.unwrap();
    succeed_through(&pool, id, 0..7, &[Step::ValidateExternal]).await.unwrap();
    for record in 7..10 {
        fail(&pool, id, record, Step::ValidateExternal, "schema violation").await.unwrap();
    }

    let snapshot = aggregator(&pool).get_progress(id).await.unwrap();
    assert_eq!(snapshot.status, DatasetStatus::InProgress);
    assert_eq!(snapshot.total_processed, 3);
    assert_eq!(
        snapshot.portal_link,
        PortalLink::Placeholder(PLACEHOLDER_IN_PROGRESS.to_string())
    );

    let harvest = snapshot.step(Step::HarvestFile).unwrap();
    assert_eq!((harvest.total, harvest.success, harvest.fail), (10, 10, 0));
    let validation = snapshot.step(Step::ValidateExternal).unwrap();
    assert_eq!((validation.total, validation.success, validation.fail), (10, 7, 3));
    assert_eq!(validation.errors[0].record_ids, vec!["rec-0007", "rec-0008", "rec-0009"]);

    // The seven survivors run through the rest of the pipeline
    let steps = resolve_steps(dataset.workflow_kind, &dataset.config());
    let remaining: Vec<Step> = steps
        .iter()
        .copied()
        .skip_while(|s| *s != Step::Transform)
        .collect();
    succeed_through(&pool, id, 0..7, &remaining).await.unwrap();

    let snapshot = aggregator(&pool).get_progress(id).await.unwrap();
    assert_eq!(snapshot.status, DatasetStatus::Completed);
    assert_eq!(snapshot.total_processed, 10);
    assert_eq!(snapshot.step(Step::Index).unwrap().success, 7);
}

#[tokio::test]
async fn completion_detected_exactly_at_expected_count() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let dataset = seed_dataset(&pool, "exact").await.unwrap();
    let id = dataset.dataset_id;
    let steps = resolve_steps(dataset.workflow_kind, &dataset.config());
    datasets::finish_harvest(&pool, id, 4, false).await.unwrap();

    succeed_through(&pool, id, 0..3, &steps).await.unwrap();
    let snapshot = aggregator(&pool).get_progress(id).await.unwrap();
    assert_eq!(snapshot.status, DatasetStatus::InProgress);
    assert_eq!(snapshot.total_processed, 3);
    assert!(snapshot.portal_link.url().is_none());

    succeed_through(&pool, id, 3..4, &steps).await.unwrap();
    let snapshot = aggregator(&pool).get_progress(id).await.unwrap();
    assert_eq!(snapshot.status, DatasetStatus::Completed);
    assert_eq!(
        snapshot.portal_link.url(),
        Some(format!("{}{}_exact*", PORTAL_PREFIX, id).as_str())
    );
}

#[tokio::test]
async fn step_list_follows_stored_transform_flag() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let plain = seed_dataset(&pool, "plain").await.unwrap();
    let custom = datasets::create_dataset(
        &pool,
        &new_file_dataset("custom", Some("<xsl:stylesheet/>")),
    )
    .await
    .unwrap();

    let plain_snapshot = aggregator(&pool).get_progress(plain.dataset_id).await.unwrap();
    let custom_snapshot = aggregator(&pool).get_progress(custom.dataset_id).await.unwrap();

    assert!(plain_snapshot.step(Step::TransformToEdmExternal).is_none());
    assert_eq!(
        custom_snapshot.progress_by_step[1].step,
        Step::TransformToEdmExternal
    );
    assert!(custom_snapshot.dataset_info.transformed_to_edm_external);
    assert_eq!(custom_snapshot.dataset_info.harvesting_parameters.protocol, "FILE");
    assert_eq!(plain_snapshot.progress_by_step.len(), 8);
    assert_eq!(custom_snapshot.progress_by_step.len(), 9);
}

#[tokio::test]
async fn tier_zero_info_in_snapshot() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let id = seed_dataset(&pool, "tiered").await.unwrap().dataset_id;

    for n in 0..3 {
        let context = TierContext {
            content_tier: if n == 0 { ContentTier::T0 } else { ContentTier::T2 },
            metadata_tier: MetadataTier::T0,
        };
        tiers::record_tier_context(&pool, id, &format!("rec-{}", n), context)
            .await
            .unwrap();
    }

    let snapshot = aggregator(&pool).get_progress(id).await.unwrap();
    assert_eq!(snapshot.tier_zero_info.content_tier.total_num_of_records, 1);
    assert_eq!(snapshot.tier_zero_info.content_tier.samples, vec!["rec-0"]);
    assert_eq!(snapshot.tier_zero_info.metadata_tier.total_num_of_records, 3);
}

#[tokio::test]
async fn counts_never_decrease_under_concurrent_writers() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let dataset = seed_dataset(&pool, "busy").await.unwrap();
    let id = dataset.dataset_id;
    let steps = resolve_steps(dataset.workflow_kind, &dataset.config());
    datasets::finish_harvest(&pool, id, 40, false).await.unwrap();

    let mut writers = Vec::new();
    for worker in 0..4 {
        let pool = pool.clone();
        let steps = steps.clone();
        writers.push(tokio::spawn(async move {
            let records = worker * 10..worker * 10 + 10;
            succeed_through(&pool, id, records, &steps).await.unwrap();
        }));
    }

    let reader = aggregator(&pool);
    let mut last_processed = 0;
    let mut last_per_step = vec![0u64; steps.len()];
    loop {
        let snapshot = reader.get_progress(id).await.unwrap();
        assert!(snapshot.total_processed >= last_processed);
        for (i, progress) in snapshot.progress_by_step.iter().enumerate() {
            assert!(progress.success >= last_per_step[i], "{} went backwards", progress.step);
            last_per_step[i] = progress.success;
        }
        last_processed = snapshot.total_processed;

        if writers.iter().all(|w| w.is_finished()) {
            break;
        }
        tokio::task::yield_now().await;
    }

    for writer in writers {
        writer.await.unwrap();
    }
    let snapshot = reader.get_progress(id).await.unwrap();
    assert_eq!(snapshot.status, DatasetStatus::Completed);
    assert_eq!(snapshot.total_processed, 40);
}

#[tokio::test]
async fn validation_only_http_dataset_reports_its_harvest_step() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let mut request = new_file_dataset("validate_http", None);
    request.workflow_kind = Some(WorkflowKind::ValidationOnly);
    request.harvest_parameters = HarvestParameters::Http {
        url: "https://provider.test/records.zip".to_string(),
        file_type: FileType::Zip,
    };
    let dataset = datasets::create_dataset(&pool, &request).await.unwrap();
    let id = dataset.dataset_id;

    let steps = resolve_steps(dataset.workflow_kind, &dataset.config());
    assert_eq!(steps.first(), Some(&Step::HarvestHttp));
    assert_eq!(steps.last(), Some(&Step::ValidateInternal));

    datasets::finish_harvest(&pool, id, 2, false).await.unwrap();
    succeed_through(&pool, id, 0..2, &steps).await.unwrap();

    let snapshot = aggregator(&pool).get_progress(id).await.unwrap();
    assert_eq!(snapshot.step(Step::HarvestHttp).unwrap().success, 2);
    assert!(snapshot.step(Step::HarvestFile).is_none());
    assert_eq!(snapshot.total_processed, 2);
    assert_eq!(snapshot.status, DatasetStatus::Completed);
}
