//! Run control: the lock marker and the execution budget.

use std::sync::Arc;
use std::time::Duration;

use bundler::{BundleError, BundlerConfig, BundlerScheduler, VirtualRouter, LOCK_KEY};
use integration_tests::fixtures::{at, raw_event};
use integration_tests::setup::{test_config, TestContext};
use rum_storage::{ObjectStore, PutOptions};
use tokio_util::sync::CancellationToken;

const URL: &str = "https://www.example.com/";

#[tokio::test]
async fn test_held_lock_conflicts_before_listing() {
    let ctx = TestContext::new();
    ctx.logs
        .inner()
        .put(LOCK_KEY, Default::default(), PutOptions::default())
        .await
        .unwrap();
    ctx.upload_raw("a.log", &[raw_event("s1", URL, at(2024, 1, 15, 10, 0), "top")])
        .await;

    let err = ctx.driver().run().await.unwrap_err();

    assert!(matches!(err, BundleError::Conflict(_)));
    assert_eq!(ctx.logs.list_calls(), 0);
    assert!(ctx.bundles.writes().is_empty());
    assert!(ctx.logs.inner().contains("raw/a.log"));
    // The other run's marker is left alone.
    assert!(ctx.logs.inner().contains(LOCK_KEY));
}

#[tokio::test]
async fn test_concurrent_runs_one_conflicts() {
    let ctx = TestContext::new();
    ctx.logs.set_list_delay(Duration::from_millis(100));
    ctx.upload_raw("a.log", &[raw_event("s1", URL, at(2024, 1, 15, 10, 0), "top")])
        .await;

    let first = ctx.driver();
    let second = ctx.driver();
    let (a, b) = tokio::join!(first.run(), second.run());

    let conflicts = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(BundleError::Conflict(_))))
        .count();
    assert_eq!(conflicts, 1);
    assert!(a.is_ok() || b.is_ok());
    assert!(!ctx.logs.inner().contains(LOCK_KEY));
}

#[tokio::test]
async fn test_lock_released_after_run() {
    let ctx = TestContext::new();
    ctx.driver().run().await.unwrap();
    assert!(!ctx.logs.inner().contains(LOCK_KEY));

    // A second run can take the lock again.
    ctx.driver().run().await.unwrap();
}

#[tokio::test]
async fn test_budget_stops_after_flushing_first_iteration() {
    let ctx = TestContext::new();
    ctx.logs.set_list_delay(Duration::from_millis(200));
    ctx.upload_raw("a.log", &[raw_event("s1", URL, at(2024, 1, 15, 10, 0), "top")])
        .await;
    ctx.upload_raw("b.log", &[raw_event("s2", URL, at(2024, 1, 15, 11, 0), "top")])
        .await;

    let config = BundlerConfig {
        batch_limit: 1,
        max_execution_ms: 300,
        ..test_config()
    };
    let driver = ctx
        .driver_with(config)
        .with_virtual_router(VirtualRouter::empty());

    let err = driver.run().await.unwrap_err();

    match err {
        BundleError::BudgetExceeded {
            iterations,
            limit_ms,
            ..
        } => {
            assert_eq!(iterations, 1);
            assert_eq!(limit_ms, 300);
        }
        other => panic!("expected BudgetExceeded, got {other}"),
    }

    // First iteration is durable, second never started.
    assert!(ctx
        .bundle_group("www.example.com/2024/1/15/10.json")
        .await
        .is_some());
    assert!(ctx.logs.inner().contains("processed/a.log"));
    assert!(ctx.logs.inner().contains("raw/b.log"));
    assert!(!ctx.logs.inner().contains(LOCK_KEY));
}

#[tokio::test]
async fn test_truncated_listing_drains_in_iterations() {
    let ctx = TestContext::new();
    for i in 0..5 {
        ctx.upload_raw(
            &format!("{i}.log"),
            &[raw_event(&format!("s{i}"), URL, at(2024, 1, 15, 10, i), "top")],
        )
        .await;
    }

    let config = BundlerConfig {
        batch_limit: 2,
        ..test_config()
    };
    let report = ctx
        .driver_with(config)
        .with_virtual_router(VirtualRouter::empty())
        .run()
        .await
        .unwrap();

    assert_eq!(report.files_processed, 5);
    assert!(report.iterations >= 3);
    assert!(ctx.logs.inner().keys().iter().all(|k| !k.starts_with("raw/")));

    let group = ctx
        .bundle_group("www.example.com/2024/1/15/10.json")
        .await
        .unwrap();
    assert_eq!(group.bundles.len(), 5);
}

#[tokio::test]
async fn test_unreadable_file_does_not_hide_later_files() {
    let ctx = TestContext::new();
    ctx.logs.fail_reads_of("raw/a.log");
    ctx.upload_raw("a.log", &[raw_event("s1", URL, at(2024, 1, 15, 10, 0), "top")])
        .await;
    ctx.upload_raw("b.log", &[raw_event("s2", URL, at(2024, 1, 15, 10, 5), "top")])
        .await;

    let config = BundlerConfig {
        batch_limit: 1,
        ..test_config()
    };
    let driver = ctx
        .driver_with(config)
        .with_virtual_router(VirtualRouter::empty());

    let report = driver.run().await.unwrap();
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.files_processed, 1);
    assert!(ctx.logs.inner().contains("raw/a.log"));
    assert!(ctx.logs.inner().contains("processed/b.log"));

    // The stuck file stays first in the listing but never blocks new ones.
    ctx.upload_raw("c.log", &[raw_event("s3", URL, at(2024, 1, 15, 10, 9), "top")])
        .await;
    let report = driver.run().await.unwrap();
    assert_eq!(report.files_processed, 1);
    assert!(ctx.logs.inner().contains("processed/c.log"));
    assert!(ctx.logs.inner().contains("raw/a.log"));
}

#[tokio::test]
async fn test_shutdown_lets_the_current_run_finish() {
    let ctx = TestContext::new();
    ctx.logs.set_list_delay(Duration::from_millis(200));
    ctx.upload_raw("a.log", &[raw_event("s1", URL, at(2024, 1, 15, 10, 0), "top")])
        .await;

    let scheduler = Arc::new(
        BundlerScheduler::new(Arc::new(ctx.driver())).with_interval(Duration::from_secs(3600)),
    );
    let shutdown = CancellationToken::new();
    let handle = scheduler.start(shutdown.clone());

    // Wait until the first run holds the lock and is listing.
    while ctx.logs.list_calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(ctx.logs.inner().contains(LOCK_KEY));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    assert!(!ctx.logs.inner().contains(LOCK_KEY));
    assert!(ctx.logs.inner().contains("processed/a.log"));
}
