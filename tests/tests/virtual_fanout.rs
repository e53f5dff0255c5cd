//! Virtual domain fan-out through a full run.

use integration_tests::fixtures::{at, raw_event};
use integration_tests::setup::{test_config, TestContext};

#[tokio::test]
async fn test_collapse_and_relabel_copies() {
    let ctx = TestContext::new();
    ctx.upload_raw(
        "a.log",
        &[
            raw_event(
                "s1",
                "https://main--shop--acme.aem.live/cart",
                at(2024, 1, 15, 10, 0),
                "click",
            ),
            raw_event(
                "s2",
                "chrome-extension://abcdefgh/popup.html",
                at(2024, 1, 15, 10, 5),
                "click",
            ),
        ],
    )
    .await;

    let report = ctx.driver_with(test_config()).run().await.unwrap();
    assert_eq!(report.events, 2);
    assert_eq!(report.virtual_events, 2);

    // Primary partitions are untouched by virtual routing.
    let primary = ctx
        .bundle_group("main--shop--acme.aem.live/2024/1/15/10.json")
        .await
        .unwrap();
    let bundle = &primary.bundles["s1--/cart"];
    assert!(bundle.domain.is_none());

    // Collapsed copy, keyed with the source hostname.
    let collapsed = ctx
        .bundle_group("acme.aem.live/2024/1/15/10.json")
        .await
        .unwrap();
    let copy = &collapsed.bundles["s1--main--shop--acme.aem.live--/cart"];
    assert_eq!(copy.domain.as_deref(), Some("main--shop--acme.aem.live"));
    assert_eq!(copy.host_type.as_deref(), Some("aem-live"));
    assert_eq!(copy.events.len(), 1);

    let extensions = ctx
        .bundle_group("extensions/2024/1/15/10.json")
        .await
        .unwrap();
    let copy = &extensions.bundles["s2--abcdefgh--/popup.html"];
    assert_eq!(copy.domain.as_deref(), Some("abcdefgh"));
    assert_eq!(copy.weight, 1);

    assert!(ctx
        .manifest("extensions/2024/1/15/.manifest.json")
        .await
        .is_some());
}

#[tokio::test]
async fn test_sampled_copies_carry_scaled_weight() {
    let ctx = TestContext::new();
    let events: Vec<_> = (0..500)
        .map(|i| {
            raw_event(
                &format!("id{i}"),
                "https://www.example.com/",
                at(2024, 1, 15, 10, 0),
                "top",
            )
        })
        .collect();
    ctx.upload_raw("a.log", &events).await;

    let report = ctx.driver_with(test_config()).run().await.unwrap();
    assert_eq!(report.events, 500);
    assert!(report.virtual_events > 0 && report.virtual_events < 150);

    let all = ctx.bundle_group("all/2024/1/15/10.json").await.unwrap();
    assert_eq!(all.bundles.len(), report.virtual_events);
    assert!(all.bundles.values().all(|b| b.weight == 10));
}
