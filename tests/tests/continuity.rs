//! Session continuity across hour and day boundaries.
//!
//! A session's events always land in the bundle group of the hour the
//! session was first seen, even when later events arrive in a later hour,
//! after midnight, or in a later run.

use integration_tests::fixtures::{at, lcp_event, raw_event};
use bundler::{BundlerConfig, VirtualRouter};
use integration_tests::setup::{test_config, TestContext};
use rum_storage::ObjectStore;

const URL: &str = "https://www.example.com/products";

#[tokio::test]
async fn test_hour_boundary_in_one_run() {
    let ctx = TestContext::new();
    ctx.upload_raw(
        "a.log",
        &[
            raw_event("s1", URL, at(2024, 1, 15, 10, 30), "top"),
            raw_event("s1", URL, at(2024, 1, 15, 11, 10), "click"),
        ],
    )
    .await;

    let report = ctx.driver().run().await.unwrap();
    assert_eq!(report.events, 2);

    let group = ctx
        .bundle_group("www.example.com/2024/1/15/10.json")
        .await
        .expect("group for hour 10");
    let bundle = &group.bundles["s1--/products"];
    assert_eq!(bundle.events.len(), 2);
    assert_eq!(bundle.events[0].checkpoint, "top");
    assert_eq!(bundle.events[1].checkpoint, "click");
    assert_eq!(bundle.user_agent, "desktop:windows");

    assert!(ctx
        .bundle_group("www.example.com/2024/1/15/11.json")
        .await
        .is_none());

    let manifest = ctx
        .manifest("www.example.com/2024/1/15/.manifest.json")
        .await
        .unwrap();
    assert_eq!(manifest.sessions["s1--/products"].hour, 10);
}

#[tokio::test]
async fn test_hour_boundary_across_runs() {
    let ctx = TestContext::new();
    let driver = ctx.driver();

    ctx.upload_raw("a.log", &[raw_event("s1", URL, at(2024, 1, 15, 10, 30), "top")])
        .await;
    driver.run().await.unwrap();

    ctx.upload_raw(
        "b.log",
        &[lcp_event("s1", URL, at(2024, 1, 15, 11, 5), 2500.0)],
    )
    .await;
    driver.run().await.unwrap();

    let group = ctx
        .bundle_group("www.example.com/2024/1/15/10.json")
        .await
        .unwrap();
    let bundle = &group.bundles["s1--/products"];
    assert_eq!(bundle.events.len(), 2);
    assert_eq!(bundle.events[1].checkpoint, "cwv-lcp");
    assert_eq!(bundle.events[1].value, Some(serde_json::json!(2500)));
    assert_eq!(bundle.events[1].time_delta, 65 * 60 * 1000);
}

#[tokio::test]
async fn test_day_boundary_uses_previous_manifest() {
    let ctx = TestContext::new();
    let driver = ctx.driver();

    ctx.upload_raw("a.log", &[raw_event("s1", URL, at(2024, 1, 15, 23, 50), "top")])
        .await;
    driver.run().await.unwrap();

    ctx.upload_raw("b.log", &[raw_event("s1", URL, at(2024, 1, 16, 0, 10), "click")])
        .await;
    driver.run().await.unwrap();

    let group = ctx
        .bundle_group("www.example.com/2024/1/15/23.json")
        .await
        .unwrap();
    assert_eq!(group.bundles["s1--/products"].events.len(), 2);

    assert!(ctx
        .bundle_group("www.example.com/2024/1/16/0.json")
        .await
        .is_none());
    assert!(ctx
        .manifest("www.example.com/2024/1/16/.manifest.json")
        .await
        .is_none());
}

#[tokio::test]
async fn test_day_boundary_in_one_run() {
    let ctx = TestContext::new();
    ctx.upload_raw(
        "a.log",
        &[
            raw_event("s1", URL, at(2024, 1, 16, 0, 10), "click"),
            raw_event("s1", URL, at(2024, 1, 15, 23, 50), "top"),
        ],
    )
    .await;

    ctx.driver().run().await.unwrap();

    let group = ctx
        .bundle_group("www.example.com/2024/1/15/23.json")
        .await
        .unwrap();
    assert_eq!(group.bundles["s1--/products"].events.len(), 2);
    assert!(ctx
        .bundle_group("www.example.com/2024/1/16/0.json")
        .await
        .is_none());
}

#[tokio::test]
async fn test_distinct_paths_are_distinct_sessions() {
    let ctx = TestContext::new();
    ctx.upload_raw(
        "a.log",
        &[
            raw_event("s1", "https://www.example.com/a", at(2024, 1, 15, 10, 0), "top"),
            raw_event("s1", "https://www.example.com/b", at(2024, 1, 15, 10, 1), "top"),
            raw_event("s2", "https://www.example.com/a", at(2024, 1, 15, 10, 2), "top"),
        ],
    )
    .await;

    ctx.driver().run().await.unwrap();

    let group = ctx
        .bundle_group("www.example.com/2024/1/15/10.json")
        .await
        .unwrap();
    let mut keys: Vec<_> = group.bundles.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["s1--/a", "s1--/b", "s2--/a"]);
}

#[tokio::test]
async fn test_bad_lines_do_not_fail_the_file() {
    let ctx = TestContext::new();
    let mut body = integration_tests::fixtures::ndjson(&[raw_event(
        "s1",
        URL,
        at(2024, 1, 15, 10, 30),
        "top",
    )])
    .to_vec();
    body.extend_from_slice(b"{truncated\n");
    ctx.logs
        .inner()
        .put("raw/mixed.log", body.into(), Default::default())
        .await
        .unwrap();

    let report = ctx.driver().run().await.unwrap();
    assert_eq!(report.parse_failures, 1);
    assert_eq!(report.events, 1);
    assert_eq!(report.files_processed, 1);
    assert!(ctx.logs.inner().contains("processed/mixed.log"));
}

#[tokio::test]
async fn test_hour_boundary_with_tiny_cache() {
    let ctx = TestContext::new();
    ctx.upload_raw(
        "a.log",
        &[
            raw_event("s1", URL, at(2024, 1, 15, 11, 20), "top"),
            raw_event("s1", URL, at(2024, 1, 15, 12, 10), "click"),
        ],
    )
    .await;

    // Every load fills the cache, so each insert purges.
    let config = BundlerConfig {
        cache_capacity: 1,
        ..test_config()
    };
    ctx.driver_with(config)
        .with_virtual_router(VirtualRouter::empty())
        .run()
        .await
        .unwrap();

    let group = ctx
        .bundle_group("www.example.com/2024/1/15/11.json")
        .await
        .unwrap();
    assert_eq!(group.bundles["s1--/products"].events.len(), 2);
    assert!(ctx
        .bundle_group("www.example.com/2024/1/15/12.json")
        .await
        .is_none());

    let manifest = ctx
        .manifest("www.example.com/2024/1/15/.manifest.json")
        .await
        .unwrap();
    assert_eq!(manifest.sessions["s1--/products"].hour, 11);
}
