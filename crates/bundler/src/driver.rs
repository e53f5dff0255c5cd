//! Batch driver: one bundling run over the raw log bucket.
//!
//! A run:
//! 1. Takes the lock marker in the logs bucket, or fails with `Conflict`
//! 2. Lists up to `batch_limit` files under `raw/`, after the last key the
//!    previous iteration listed
//! 3. Fetches and decodes them with bounded concurrency
//! 4. Routes events into primary and virtual partitions; domains run in
//!    parallel, the hourly partitions of one domain in time order
//! 5. Writes every dirty bundle group and manifest
//! 6. Moves the files to `processed/`
//! 7. Repeats from 2 while the listing was truncated and the budget allows
//!
//! Files that could not be read or archived stay under `raw/` for the next
//! run; the cursor keeps them from hiding the files listed after them.
//!
//! The lock is removed however the run ends.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use rum_core::{Aggregate, AggregateData, BundleGroupData, Manifest, ManifestData};
use rum_storage::{PutOptions, StorageError, Stores};
use serde::Serialize;
use telemetry::metrics;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::batch::{PartitionBatch, SplitEvents};
use crate::budget::ExecutionBudget;
use crate::config::BundlerConfig;
use crate::context::BundleContext;
use crate::decode::{decode_file, DecodedFile};
use crate::error::{BundleError, Result};
use crate::queue::run_bounded;
use crate::router::{needs_lookback, SessionRouter, TouchedGroups};
use crate::virtual_domains::VirtualRouter;

/// Lock marker at the root of the logs bucket.
pub const LOCK_KEY: &str = ".lock";
pub const RAW_PREFIX: &str = "raw/";
pub const PROCESSED_PREFIX: &str = "processed/";

/// Counters of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub run_id: String,
    pub iterations: u32,
    pub files_processed: usize,
    pub files_failed: usize,
    pub lines: usize,
    pub parse_failures: usize,
    pub rejected_events: usize,
    pub events: usize,
    pub virtual_events: usize,
    pub route_failures: usize,
    pub groups_written: usize,
    pub manifests_written: usize,
    pub write_failures: usize,
    pub elapsed_ms: u64,
}

impl BatchReport {
    fn new(run_id: String) -> Self {
        Self {
            run_id,
            ..Default::default()
        }
    }

    pub fn log_summary(&self) {
        info!(
            run_id = %self.run_id,
            iterations = self.iterations,
            files = self.files_processed,
            files_failed = self.files_failed,
            lines = self.lines,
            parse_failures = self.parse_failures,
            rejected = self.rejected_events,
            events = self.events,
            virtual_events = self.virtual_events,
            route_failures = self.route_failures,
            groups_written = self.groups_written,
            manifests_written = self.manifests_written,
            write_failures = self.write_failures,
            elapsed_ms = self.elapsed_ms,
            "Bundling run summary"
        );
    }
}

/// Aggregates touched during one iteration.
#[derive(Default)]
struct Touched {
    groups: TouchedGroups,
    manifests: HashMap<String, Arc<Manifest>>,
}

struct PartitionOutcome {
    groups: TouchedGroups,
    manifests: Vec<Arc<Manifest>>,
    failures: usize,
}

/// Result of writing one aggregate.
struct Write {
    kind: &'static str,
    ok: bool,
}

/// Drives bundling runs against a logs bucket and a bundles bucket.
pub struct BatchDriver {
    stores: Stores,
    config: BundlerConfig,
    virtual_router: VirtualRouter,
    session_router: SessionRouter,
}

impl BatchDriver {
    pub fn new(stores: Stores, config: BundlerConfig) -> Result<Self> {
        let virtual_router =
            VirtualRouter::from_config(&config.virtual_domains, config.sample_seed)?;
        Ok(Self {
            stores,
            config,
            virtual_router,
            session_router: SessionRouter::default(),
        })
    }

    pub fn with_virtual_router(mut self, router: VirtualRouter) -> Self {
        self.virtual_router = router;
        self
    }

    pub fn config(&self) -> &BundlerConfig {
        &self.config
    }

    /// Runs until the raw prefix is drained or the budget runs out.
    ///
    /// Returns `Conflict` without touching anything if another run holds
    /// the lock, and `BudgetExceeded` when it stops early. In the latter
    /// case every completed iteration has been flushed and archived.
    pub async fn run(&self) -> Result<BatchReport> {
        let run_id = Uuid::new_v4().to_string();
        metrics().runs_started.inc();

        self.acquire_lock(&run_id).await?;
        info!(
            run_id = %run_id,
            logs = self.stores.logs.name(),
            bundles = self.stores.bundles.name(),
            batch_limit = self.config.batch_limit,
            concurrency = self.config.concurrency,
            "Bundling run started"
        );

        let started = Instant::now();
        let mut report = BatchReport::new(run_id);
        let outcome = self.run_locked(&mut report).await;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        self.release_lock().await;

        match &outcome {
            Ok(()) => {}
            Err(e) if e.is_budget_exceeded() => {
                metrics().runs_over_budget.inc();
                warn!(run_id = %report.run_id, error = %e, "Bundling run stopped early");
            }
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "Bundling run failed");
            }
        }
        report.log_summary();

        outcome.map(|()| report)
    }

    async fn acquire_lock(&self, run_id: &str) -> Result<()> {
        let options = PutOptions::default()
            .with_metadata("run-id", run_id)
            .with_metadata("acquired-at", Utc::now().to_rfc3339());

        if self
            .stores
            .logs
            .put_if_absent(LOCK_KEY, Bytes::new(), options)
            .await?
        {
            debug!(run_id, "Lock acquired");
            return Ok(());
        }

        metrics().runs_conflicted.inc();
        match self.stores.logs.head(LOCK_KEY).await {
            Ok(Some(head)) => warn!(
                holder = head.metadata.get("run-id").map(String::as_str).unwrap_or("unknown"),
                since = head.metadata.get("acquired-at").map(String::as_str).unwrap_or("unknown"),
                "Another bundling run holds the lock"
            ),
            _ => warn!("Another bundling run holds the lock"),
        }
        Err(BundleError::Conflict(LOCK_KEY.to_string()))
    }

    async fn release_lock(&self) {
        if let Err(e) = self.stores.logs.remove(LOCK_KEY).await {
            // A leftover marker blocks later runs until removed by hand.
            error!(error = %e, key = LOCK_KEY, "Failed to release lock");
        }
    }

    async fn run_locked(&self, report: &mut BatchReport) -> Result<()> {
        let ctx = BundleContext::new(self.stores.bundles.clone(), self.config.cache());
        let mut budget = ExecutionBudget::start(self.config.max_execution());
        let mut cursor = None;

        loop {
            budget.ensure_next()?;

            let started = Instant::now();
            let more = self.iteration(&ctx, &mut cursor, report).await?;
            let took = started.elapsed();

            budget.record(took);
            report.iterations = budget.iterations();
            metrics().iteration_latency_ms.observe(took.as_millis() as u64);
            let (manifests, groups) = ctx.cached();
            metrics().cached_aggregates.set((manifests + groups) as u64);
            debug!(
                iteration = report.iterations,
                took_ms = took.as_millis() as u64,
                more,
                "Iteration finished"
            );

            if !more {
                return Ok(());
            }
        }
    }

    /// One list-process-flush-archive pass. Returns whether more raw files
    /// are waiting.
    async fn iteration(
        &self,
        ctx: &BundleContext,
        cursor: &mut Option<String>,
        report: &mut BatchReport,
    ) -> Result<bool> {
        let listing = self
            .stores
            .logs
            .list_after(RAW_PREFIX, cursor.as_deref(), self.config.batch_limit)
            .await?;
        let more = listing.is_truncated;

        let Some(last) = listing.objects.last() else {
            debug!("No raw files to bundle");
            return Ok(false);
        };
        *cursor = Some(last.key.clone());

        let keys: Vec<String> = listing
            .objects
            .into_iter()
            .map(|object| object.key)
            .filter(|key| !key.ends_with('/'))
            .collect();
        if keys.is_empty() {
            return Ok(more);
        }
        metrics().files_listed.inc_by(keys.len() as u64);

        let mut decoded = Vec::with_capacity(keys.len());
        let fetches = run_bounded(keys, self.config.concurrency, |key| self.fetch(key).boxed());
        for fetched in fetches.await {
            match fetched {
                Ok(Some(file)) => decoded.push(file),
                Ok(None) => {}
                Err(_) => report.files_failed += 1,
            }
        }
        if decoded.is_empty() {
            warn!(more, "No listed raw file could be read");
            return Ok(more);
        }

        let mut archive = Vec::with_capacity(decoded.len());
        let mut events = Vec::new();
        for file in decoded {
            report.lines += file.lines;
            report.parse_failures += file.failures;
            events.extend(file.events);
            archive.push(file.key);
        }

        let split = SplitEvents::build(events, &self.virtual_router);
        report.rejected_events += split.rejected;
        report.events += split.primary.event_count();
        report.virtual_events += split.virtual_copies.event_count();
        metrics().events_rejected.inc_by(split.rejected as u64);
        metrics()
            .virtual_events
            .inc_by(split.virtual_copies.event_count() as u64);

        let batches: Vec<PartitionBatch> = split
            .primary
            .into_batches()
            .into_iter()
            .chain(split.virtual_copies.into_batches())
            .collect();
        let touched = self.process(ctx, batches, report).await;

        self.flush(touched, report).await;
        self.archive(archive, report).await;

        Ok(more)
    }

    async fn fetch(&self, key: String) -> std::result::Result<Option<DecodedFile>, StorageError> {
        match self.stores.logs.get(&key).await {
            Ok(Some(body)) => Ok(Some(decode_file(&key, &body))),
            Ok(None) => {
                debug!(file = %key, "Raw file vanished before read");
                Ok(None)
            }
            Err(e) => {
                warn!(file = %key, error = %e, "Failed to read raw file, leaving it for a later run");
                metrics().files_failed.inc();
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        ctx: &BundleContext,
        batches: Vec<PartitionBatch>,
        report: &mut BatchReport,
    ) -> Touched {
        let outcomes = run_bounded(by_domain(batches), self.config.concurrency, |batches| {
            self.process_domain(ctx, batches).boxed()
        })
        .await;

        let mut touched = Touched::default();
        for outcome in outcomes.into_iter().flatten() {
            report.route_failures += outcome.failures;
            touched.groups.extend(outcome.groups);
            for manifest in outcome.manifests {
                touched
                    .manifests
                    .insert(manifest.key().day_key(), manifest);
            }
        }
        touched
    }

    /// Partitions of one domain, oldest first. A session seen in two hours
    /// of the same batch is thereby recorded under the earlier one.
    async fn process_domain(
        &self,
        ctx: &BundleContext,
        batches: Vec<PartitionBatch>,
    ) -> Vec<PartitionOutcome> {
        let mut outcomes = Vec::with_capacity(batches.len());
        for batch in batches {
            outcomes.push(self.process_partition(ctx, batch).await);
        }
        outcomes
    }

    async fn process_partition(&self, ctx: &BundleContext, batch: PartitionBatch) -> PartitionOutcome {
        let manifest = match ctx.manifest(&batch.key).await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(partition = %batch.key, error = %e, "Failed to load manifest, skipping partition");
                let failures = batch.event_count();
                metrics().route_failures.inc_by(failures as u64);
                return PartitionOutcome {
                    groups: TouchedGroups::new(),
                    manifests: Vec::new(),
                    failures,
                };
            }
        };

        let yesterday = match batch.key.previous_day() {
            Some(previous) if needs_lookback(&batch.key) => match ctx.manifest(&previous).await {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!(
                        partition = %batch.key,
                        error = %e,
                        "Failed to load previous day's manifest, routing without lookback"
                    );
                    None
                }
            },
            _ => None,
        };

        let routed = self
            .session_router
            .route(ctx, &batch.key, &batch.sessions, &manifest, yesterday.as_deref())
            .await;

        PartitionOutcome {
            groups: routed.groups,
            manifests: vec![manifest],
            failures: routed.failures,
        }
    }

    /// Writes every dirty aggregate. Failures are logged and counted; the
    /// aggregate stays dirty and the others are still written.
    async fn flush(&self, touched: Touched, report: &mut BatchReport) {
        let started = Instant::now();

        let mut writes: Vec<BoxFuture<'_, Write>> = Vec::new();
        for group in touched.groups.into_values().filter(|g| g.is_dirty()) {
            writes.push(self.write(group).boxed());
        }
        for manifest in touched.manifests.into_values().filter(|m| m.is_dirty()) {
            writes.push(self.write(manifest).boxed());
        }
        if writes.is_empty() {
            return;
        }

        for write in run_bounded(writes, self.config.concurrency, |write| write).await {
            match (write.ok, write.kind) {
                (true, kind) if kind == ManifestData::KIND => report.manifests_written += 1,
                (true, _) => report.groups_written += 1,
                (false, _) => report.write_failures += 1,
            }
        }

        metrics()
            .flush_latency_ms
            .observe(started.elapsed().as_millis() as u64);
        debug!(
            groups = report.groups_written,
            manifests = report.manifests_written,
            failures = report.write_failures,
            "Flushed aggregates"
        );
    }

    async fn write<T: AggregateData>(&self, aggregate: Arc<Aggregate<T>>) -> Write {
        let path = aggregate.storage_path();
        let failed = Write {
            kind: T::KIND,
            ok: false,
        };

        let body = match aggregate.to_vec() {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to serialize aggregate");
                metrics().write_failures.inc();
                return failed;
            }
        };

        let mut last_error = None;
        for attempt in 0..=self.config.write_retries {
            if attempt > 0 {
                let backoff = self.config.write_backoff() * attempt;
                warn!(
                    path = %path,
                    attempt,
                    backoff_ms = %backoff.as_millis(),
                    "Retrying aggregate write"
                );
                tokio::time::sleep(backoff).await;
            }

            match self
                .stores
                .bundles
                .put(&path, body.clone(), PutOptions::json())
                .await
            {
                Ok(()) => {
                    aggregate.mark_clean();
                    if T::KIND == BundleGroupData::KIND {
                        metrics().bundle_groups_written.inc();
                    } else {
                        metrics().manifests_written.inc();
                    }
                    return Write {
                        kind: T::KIND,
                        ok: true,
                    };
                }
                Err(e) => last_error = Some(e),
            }
        }

        metrics().write_failures.inc();
        if let Some(e) = last_error {
            error!(path = %path, error = %e, "Failed to write aggregate");
        }
        failed
    }

    /// Moves fully read files from `raw/` to `processed/`.
    async fn archive(&self, keys: Vec<String>, report: &mut BatchReport) {
        let moved = run_bounded(keys, self.config.concurrency, |key| {
            async move {
                let target = processed_key(&key);
                let result = self.stores.logs.move_object(&key, &target).await;
                (key, result)
            }
            .boxed()
        })
        .await;

        for (key, result) in moved {
            match result {
                Ok(()) => {
                    report.files_processed += 1;
                    metrics().files_processed.inc();
                }
                Err(e) => {
                    warn!(file = %key, error = %e, "Failed to archive raw file");
                    report.files_failed += 1;
                    metrics().files_failed.inc();
                }
            }
        }
    }
}

/// Splits batches into per-domain runs in chronological order.
fn by_domain(mut batches: Vec<PartitionBatch>) -> Vec<Vec<PartitionBatch>> {
    batches.sort_by(|a, b| a.key.cmp(&b.key));

    let mut domains: Vec<Vec<PartitionBatch>> = Vec::new();
    for batch in batches {
        match domains.last_mut() {
            Some(run) if run[0].key.domain == batch.key.domain => run.push(batch),
            _ => domains.push(vec![batch]),
        }
    }
    domains
}

fn processed_key(key: &str) -> String {
    format!(
        "{PROCESSED_PREFIX}{}",
        key.strip_prefix(RAW_PREFIX).unwrap_or(key)
    )
}
