//! Periodic rule refresh.
//!
//! The refresher pulls the rule payload from its [`RuleSource`], skips payloads it has
//! already applied, compiles the rest and swaps the result into the [`RuleStore`].
//! A failed pull or a malformed payload leaves the rules in force untouched.

use crate::config::Config;
use crate::metrics::{FilterMetrics, PullOutcome};
use crate::rules::errors::{RefreshError, RuleCompileError};
use crate::rules::payload::FilterPayload;
use crate::rules::source::RuleSource;
use crate::rules::store::{RuleOrigin, RuleSet, RuleStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const MIN_PULL_INTERVAL: Duration = Duration::from_secs(1);
pub const PULL_DUMP_FILE: &str = ".pull";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Idle,
    Pulling,
    Compiling,
    Swapping,
}

#[derive(Debug, Clone)]
pub struct RefresherConfig {
    pub interval: Duration,
    /// Appended to the source URL on every pull.
    pub query: String,
    pub honor_pull_interval: bool,
    pub dump_dir: Option<PathBuf>,
}

impl RefresherConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        RefresherConfig {
            interval: clamp_interval(Duration::from_secs(config.pull_interval_secs)),
            query: config.pull_query.clone(),
            honor_pull_interval: config.honor_pull_interval,
            dump_dir: config.data_dir.clone(),
        }
    }
}

#[must_use]
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_PULL_INTERVAL)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileErrorInfo {
    pub category: String,
    pub rule: String,
    pub error: String,
}

impl From<&RuleCompileError> for CompileErrorInfo {
    fn from(err: &RuleCompileError) -> Self {
        CompileErrorInfo {
            category: err.category.clone(),
            rule: err.raw.clone(),
            error: err.source.to_string(),
        }
    }
}

/// Bookkeeping about pulls, readable while the refresher runs.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub state: RefreshState,
    pub rule_source: RuleOrigin,
    pub pull_count: u64,
    pub pull_failed: u64,
    pub pull_interval_ms: u64,
    pub pull_cost_ms: f64,
    pub pull_cost_avg_ms: f64,
    pub pull_cost_max_ms: f64,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    /// Rules of the last applied payload that failed to compile.
    pub compile_errors: Vec<CompileErrorInfo>,
}

impl RefreshStatus {
    fn new(origin: RuleOrigin, interval: Duration) -> Self {
        RefreshStatus {
            state: RefreshState::Idle,
            rule_source: origin,
            pull_count: 0,
            pull_failed: 0,
            pull_interval_ms: duration_ms(interval),
            pull_cost_ms: 0.0,
            pull_cost_avg_ms: 0.0,
            pull_cost_max_ms: 0.0,
            last_update: None,
            last_error: None,
            last_error_time: None,
            compile_errors: Vec::new(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_cost(&mut self, cost: Duration) {
        let ms = cost.as_secs_f64() * 1000.0;
        self.pull_count += 1;
        self.pull_cost_ms += ms;
        self.pull_cost_avg_ms = self.pull_cost_ms / self.pull_count as f64;
        self.pull_cost_max_ms = self.pull_cost_max_ms.max(ms);
    }
}

/// What a single refresh did.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Applied {
        categories: usize,
        errors: Vec<RuleCompileError>,
        pull_interval: Option<Duration>,
    },
    Unchanged,
}

pub struct RuleRefresher {
    source: Arc<dyn RuleSource>,
    store: Arc<RuleStore>,
    metrics: FilterMetrics,
    config: RefresherConfig,
    status: Arc<Mutex<RefreshStatus>>,
    period: Duration,
    last_digest: Option<String>,
    cancel_token: CancellationToken,
}

impl RuleRefresher {
    #[must_use]
    pub fn new(
        source: Arc<dyn RuleSource>,
        store: Arc<RuleStore>,
        metrics: FilterMetrics,
        config: RefresherConfig,
    ) -> Self {
        let period = config.interval;
        let status = RefreshStatus::new(source.origin(), period);
        RuleRefresher {
            source,
            store,
            metrics,
            config,
            status: Arc::new(Mutex::new(status)),
            period,
            last_digest: None,
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    #[must_use]
    pub fn status_handle(&self) -> Arc<Mutex<RefreshStatus>> {
        Arc::clone(&self.status)
    }

    #[must_use]
    pub fn status(&self) -> RefreshStatus {
        self.status.lock().expect("lock poisoned").clone()
    }

    /// Pulls eagerly, then on every tick until cancelled.
    pub async fn run(mut self) {
        if self.start_cancellable().await {
            self.poll().await;
        }
    }

    /// [`RuleRefresher::start`], abandoned as soon as the refresher is cancelled.
    /// Returns `false` when cancelled.
    pub async fn start_cancellable(&mut self) -> bool {
        let cancel_token = self.cancel_token.clone();
        tokio::select! {
            () = self.start() => true,
            () = cancel_token.cancelled() => {
                debug!("RULES | cancelled during initial pull");
                false
            }
        }
    }

    /// The eager pull done before any tick. A pull interval hint from it sets the first period.
    pub async fn start(&mut self) {
        let outcome = self.refresh().await;
        if let Some(next) = self.next_interval(outcome.as_ref()) {
            self.set_interval(next);
        }
    }

    /// Pulls on every tick until cancelled. A static source is never pulled again.
    pub async fn poll(mut self) {
        let cancel_token = self.cancel_token.clone();
        if self.source.is_static() {
            debug!("RULES | static rule source, no further pulls");
            cancel_token.cancelled().await;
            return;
        }

        let mut period = self.period;
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = tokio::select! {
                        outcome = self.refresh() => outcome,
                        () = cancel_token.cancelled() => break,
                    };
                    if let Some(next) = self.next_interval(outcome.as_ref()) {
                        if next != period {
                            info!("RULES | pull interval changed from {period:?} to {next:?}");
                            period = next;
                            self.set_interval(period);
                            ticker = interval_at(tokio::time::Instant::now() + period, period);
                            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        }
                    }
                }
                () = cancel_token.cancelled() => break,
            }
        }
        debug!("RULES | refresher stopped");
    }

    /// Runs one pull-compile-swap cycle and records its outcome.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome, RefreshError> {
        let started = Instant::now();
        let result = self.try_refresh().await;
        let latency = started.elapsed();

        let outcome = match &result {
            Ok(RefreshOutcome::Applied { .. }) => PullOutcome::Ok,
            Ok(RefreshOutcome::Unchanged) => PullOutcome::Unchanged,
            Err(_) => PullOutcome::Error,
        };
        self.metrics.record_pull(outcome, latency);

        let mut status = self.status.lock().expect("lock poisoned");
        status.state = RefreshState::Idle;
        status.record_cost(latency);
        if let Err(e) = &result {
            error!("RULES | rule refresh failed, keeping current rules: {e}");
            status.pull_failed += 1;
            status.last_error = Some(e.to_string());
            status.last_error_time = Some(Utc::now());
        }
        drop(status);

        result
    }

    async fn try_refresh(&mut self) -> Result<RefreshOutcome, RefreshError> {
        self.set_state(RefreshState::Pulling);
        let bytes = self.source.pull(&self.config.query).await?;

        if let Some(dir) = &self.config.dump_dir {
            let path = dir.join(PULL_DUMP_FILE);
            if let Err(e) = tokio::fs::write(&path, &bytes).await {
                warn!("RULES | failed to dump rule payload to {}: {e}", path.display());
            }
        }

        let digest = hex::encode(Sha256::digest(&bytes));
        if self.last_digest.as_deref() == Some(digest.as_str()) {
            debug!("RULES | rule payload unchanged");
            return Ok(RefreshOutcome::Unchanged);
        }

        self.set_state(RefreshState::Compiling);
        let payload = FilterPayload::decode(&bytes)?;
        let (rules, errors) = RuleSet::build(&payload.filters, self.source.origin());
        for e in &errors {
            warn!("RULES | {e}");
            self.metrics.record_compile_error(&e.category);
        }

        self.set_state(RefreshState::Swapping);
        let categories = rules.len();
        let installed: Vec<String> = rules
            .categories()
            .filter_map(|category| rules.get(category))
            .map(|entry| entry.raw.clone())
            .collect();
        self.store.replace(rules);
        self.metrics.retain_rules(installed.iter().map(String::as_str));
        self.last_digest = Some(digest);

        let now = Utc::now();
        self.metrics.record_update(now.timestamp());
        {
            let mut status = self.status.lock().expect("lock poisoned");
            status.last_update = Some(now);
            status.compile_errors = errors.iter().map(CompileErrorInfo::from).collect();
        }
        info!(
            "RULES | applied {} rules for {categories} categories",
            self.source.origin().as_str()
        );

        Ok(RefreshOutcome::Applied {
            categories,
            errors,
            pull_interval: payload.pull_interval,
        })
    }

    fn next_interval(&self, outcome: Result<&RefreshOutcome, &RefreshError>) -> Option<Duration> {
        if !self.config.honor_pull_interval {
            return None;
        }
        match outcome {
            Ok(RefreshOutcome::Applied {
                pull_interval: Some(hint),
                ..
            }) => Some(clamp_interval(*hint)),
            _ => None,
        }
    }

    fn set_state(&self, state: RefreshState) {
        self.status.lock().expect("lock poisoned").state = state;
    }

    fn set_interval(&mut self, interval: Duration) {
        self.period = interval;
        self.status.lock().expect("lock poisoned").pull_interval_ms = duration_ms(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::aggregator::Aggregator;
    use crate::metrics::constants;
    use crate::rules::errors::PullError;
    use crate::rules::source::LocalSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves scripted responses in order, repeating the last one.
    struct ScriptedSource {
        responses: Vec<Result<&'static str, u16>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<&'static str, u16>>) -> Self {
            ScriptedSource {
                responses,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RuleSource for ScriptedSource {
        fn origin(&self) -> RuleOrigin {
            RuleOrigin::Remote
        }

        async fn pull(&self, _query: &str) -> Result<Vec<u8>, PullError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = call.min(self.responses.len() - 1);
            match self.responses[idx] {
                Ok(body) => Ok(body.as_bytes().to_vec()),
                Err(status) => Err(PullError::Status {
                    status,
                    body: String::new(),
                }),
            }
        }
    }

    /// Never answers.
    struct HangingSource;

    #[async_trait]
    impl RuleSource for HangingSource {
        fn origin(&self) -> RuleOrigin {
            RuleOrigin::Remote
        }

        async fn pull(&self, _query: &str) -> Result<Vec<u8>, PullError> {
            std::future::pending().await
        }
    }

    fn metrics() -> FilterMetrics {
        FilterMetrics::new(Arc::new(Mutex::new(
            Aggregator::<{ constants::CONTEXTS }>::new().expect("failed to create aggregator"),
        )))
    }

    fn refresher_config() -> RefresherConfig {
        RefresherConfig {
            interval: Duration::from_secs(30),
            query: "filters=true".to_string(),
            honor_pull_interval: true,
            dump_dir: None,
        }
    }

    fn refresher(source: Arc<dyn RuleSource>) -> (RuleRefresher, Arc<RuleStore>, FilterMetrics) {
        let store = Arc::new(RuleStore::new());
        let metrics = metrics();
        let refresher = RuleRefresher::new(
            source,
            Arc::clone(&store),
            metrics.clone(),
            refresher_config(),
        );
        (refresher, store, metrics)
    }

    #[tokio::test]
    async fn test_refresh_applies_rules() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(
            r#"{"filters":{"metric":["{ a = 1 }","{ b = }"]},"pull_interval":"5s"}"#,
        )]));
        let (mut refresher, store, metrics) = refresher(source);

        let outcome = refresher.refresh().await.expect("refresh");
        match outcome {
            RefreshOutcome::Applied {
                categories,
                errors,
                pull_interval,
            } => {
                assert_eq!(categories, 1);
                assert_eq!(errors.len(), 1);
                assert_eq!(pull_interval, Some(Duration::from_secs(5)));
            }
            RefreshOutcome::Unchanged => panic!("expected rules to be applied"),
        }
        assert_eq!(
            store.snapshot().get("metric").map(|r| r.origin),
            Some(RuleOrigin::Remote)
        );

        let status = refresher.status();
        assert_eq!(status.pull_count, 1);
        assert_eq!(status.pull_failed, 0);
        assert_eq!(status.state, RefreshState::Idle);
        assert!(status.last_update.is_some());
        assert_eq!(status.compile_errors.len(), 1);
        assert_eq!(status.compile_errors[0].rule, "{ b = }");

        assert_eq!(
            metrics.value(constants::PULL_ATTEMPTS_METRIC, &[("outcome", "ok")]),
            Some(1.0)
        );
        assert_eq!(
            metrics.value(constants::RULE_COMPILE_ERRORS_METRIC, &[("category", "metric")]),
            Some(1.0)
        );
    }

    #[tokio::test]
    async fn test_identical_payload_is_unchanged() {
        let body = r#"{"filters":{"metric":["{ a = 1 }"]}}"#;
        let source = Arc::new(ScriptedSource::new(vec![Ok(body), Ok(body)]));
        let (mut refresher, store, metrics) = refresher(source);

        refresher.refresh().await.expect("first refresh");
        let first = store.snapshot();
        let outcome = refresher.refresh().await.expect("second refresh");
        assert_eq!(outcome, RefreshOutcome::Unchanged);
        assert!(Arc::ptr_eq(&first, &store.snapshot()));

        assert_eq!(
            metrics.value(constants::PULL_ATTEMPTS_METRIC, &[("outcome", "unchanged")]),
            Some(1.0)
        );
        assert_eq!(metrics.value(constants::RULE_UPDATES_METRIC, &[]), Some(1.0));
    }

    #[tokio::test]
    async fn test_failures_keep_current_rules() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(r#"{"filters":{"metric":["{ a = 1 }"]}}"#),
            Err(500),
            Ok("{not json"),
        ]));
        let (mut refresher, store, _) = refresher(source);

        refresher.refresh().await.expect("first refresh");
        let applied = store.snapshot();

        assert!(matches!(
            refresher.refresh().await,
            Err(RefreshError::Pull(PullError::Status { status: 500, .. }))
        ));
        assert!(matches!(
            refresher.refresh().await,
            Err(RefreshError::Payload(_))
        ));
        assert!(Arc::ptr_eq(&applied, &store.snapshot()));

        let status = refresher.status();
        assert_eq!(status.pull_count, 3);
        assert_eq!(status.pull_failed, 2);
        assert!(status.last_error.is_some());
        assert!(status.last_error_time.is_some());
    }

    #[tokio::test]
    async fn test_pull_interval_hint() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(
            r#"{"filters":{},"pull_interval":"100ms"}"#,
        )]));
        let (mut refresher, _, _) = refresher(source);
        let outcome = refresher.refresh().await;
        assert_eq!(
            refresher.next_interval(outcome.as_ref()),
            Some(MIN_PULL_INTERVAL)
        );

        refresher.config.honor_pull_interval = false;
        assert_eq!(refresher.next_interval(outcome.as_ref()), None);
    }

    #[tokio::test]
    async fn test_start_adopts_pull_interval_hint() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(
            r#"{"filters":{},"pull_interval":10000000000}"#,
        )]));
        let (mut refresher, _, _) = refresher(source);
        refresher.start().await;
        assert_eq!(refresher.period, Duration::from_secs(10));
        assert_eq!(refresher.status().pull_interval_ms, 10_000);
    }

    #[tokio::test]
    async fn test_payload_is_dumped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let body = r#"{"filters":{"object":["{ class = 'k8s' }"]}}"#;
        let source = Arc::new(ScriptedSource::new(vec![Ok(body)]));
        let store = Arc::new(RuleStore::new());
        let mut refresher = RuleRefresher::new(
            source,
            store,
            metrics(),
            RefresherConfig {
                dump_dir: Some(dir.path().to_path_buf()),
                ..refresher_config()
            },
        );
        refresher.refresh().await.expect("refresh");
        let dumped = std::fs::read_to_string(dir.path().join(PULL_DUMP_FILE)).expect("dump file");
        assert_eq!(dumped, body);
    }

    #[tokio::test]
    async fn test_run_static_source_until_cancelled() {
        let mut filters = std::collections::HashMap::new();
        filters.insert("metric".to_string(), vec!["{ a = 1 }".to_string()]);
        let source = Arc::new(LocalSource::new(&filters));
        let (refresher, store, _) = refresher(source);
        let cancel_token = refresher.cancel_token();
        let status = refresher.status_handle();

        let handle = tokio::spawn(refresher.run());
        for _ in 0..100 {
            if store.snapshot().get("metric").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            store.snapshot().get("metric").map(|r| r.origin),
            Some(RuleOrigin::Local)
        );

        cancel_token.cancel();
        handle.await.expect("refresher task");
        assert_eq!(status.lock().expect("lock poisoned").pull_count, 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_initial_pull() {
        let (mut refresher, store, _) = refresher(Arc::new(HangingSource));
        let cancel_token = refresher.cancel_token();

        let handle = tokio::spawn(async move { refresher.start_cancellable().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_token.cancel();

        let started = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("initial pull not cancelled")
            .expect("refresher task");
        assert!(!started);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_pulls_on_interval() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(r#"{"filters":{}}"#)]));
        let (refresher, _, _) = refresher(Arc::clone(&source) as Arc<dyn RuleSource>);
        let cancel_token = refresher.cancel_token();
        let handle = tokio::spawn(refresher.run());

        tokio::time::sleep(Duration::from_secs(95)).await;
        cancel_token.cancel();
        handle.await.expect("refresher task");
        // eager pull plus ticks at 30s, 60s and 90s
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }
}
