//! Flush is a fan-out: one failed write does not stop the others.

use integration_tests::fixtures::{at, raw_event};
use integration_tests::setup::TestContext;

const URL: &str = "https://www.example.com/";

#[tokio::test]
async fn test_failed_group_write_does_not_block_others() {
    let ctx = TestContext::new();
    ctx.bundles.fail_writes_to("/10.json");
    ctx.upload_raw(
        "a.log",
        &[
            raw_event("s1", URL, at(2024, 1, 15, 10, 0), "top"),
            raw_event("s2", URL, at(2024, 1, 15, 11, 0), "top"),
        ],
    )
    .await;

    let report = ctx.driver().run().await.unwrap();

    assert_eq!(report.write_failures, 1);
    assert_eq!(report.groups_written, 1);
    assert_eq!(report.manifests_written, 1);
    assert!(ctx
        .bundle_group("www.example.com/2024/1/15/11.json")
        .await
        .is_some());
    assert!(ctx
        .bundle_group("www.example.com/2024/1/15/10.json")
        .await
        .is_none());

    // The failed write was retried before giving up.
    let attempts = ctx
        .bundles
        .writes()
        .iter()
        .filter(|k| k.ends_with("/10.json"))
        .count();
    assert_eq!(attempts, 3);

    // Raw files are archived regardless.
    assert!(ctx.logs.inner().contains("processed/a.log"));
}

#[tokio::test]
async fn test_all_writes_failing_still_completes_run() {
    let ctx = TestContext::new();
    ctx.bundles.set_should_fail(true);
    ctx.upload_raw("a.log", &[raw_event("s1", URL, at(2024, 1, 15, 10, 0), "top")])
        .await;

    let report = ctx.driver().run().await.unwrap();

    assert_eq!(report.write_failures, 2);
    assert_eq!(report.groups_written, 0);
    assert!(ctx.bundles.inner().is_empty());
}
