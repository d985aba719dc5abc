//! Sequential batch lookup with per-item classification.
//!
//! One CPF is looked up at a time. Before each lookup a progress update
//! `(current, total)` is published; after each item (except the last) the
//! workflow pauses for the configured delay to stay under the Work API rate
//! limit. A failing CPF becomes an ERROR record and never aborts the batch.

use crate::config::Config;
use crate::cpf::Cpf;
use crate::errors::AppError;
use crate::lookup::CpfLookup;
use crate::models::{Classification, LookupRecord, RawUpstreamRecord};
use async_trait::async_trait;
use failsafe::backoff;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Receives `(current, total)` before each lookup is issued, and each
/// record as soon as it is produced.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, current: usize, total: usize);

    fn on_record(&self, _record: &LookupRecord) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_progress(&self, current: usize, total: usize) {
        self(current, total)
    }
}

/// Observer that ignores every update.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _current: usize, _total: usize) {}
}

/// Source of the waits between items and between retries.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Waits on the tokio timer.
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Tuning knobs for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Wait between consecutive items.
    pub item_delay: Duration,
    /// Upper bound for a single lookup call.
    pub lookup_timeout: Duration,
    /// Extra attempts for a failed lookup; 0 disables retrying.
    pub max_retries: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            item_delay: Duration::from_millis(500),
            lookup_timeout: Duration::from_secs(30),
            max_retries: 0,
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            item_delay: config.batch_item_delay,
            lookup_timeout: config.lookup_timeout,
            max_retries: config.lookup_max_retries,
        }
    }
}

/// Result of a batch run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// One record per processed CPF, in input order.
    pub records: Vec<LookupRecord>,
    /// True when the run stopped early because of cancellation.
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn count(&self, classification: Classification) -> usize {
        self.records
            .iter()
            .filter(|r| r.classificacao == classification)
            .count()
    }
}

/// Looks up a list of CPFs one at a time and classifies each result.
#[derive(Clone)]
pub struct BatchLookupWorkflow {
    lookup: Arc<dyn CpfLookup>,
    pacer: Arc<dyn Pacer>,
    options: BatchOptions,
}

impl BatchLookupWorkflow {
    pub fn new(lookup: Arc<dyn CpfLookup>, options: BatchOptions) -> Self {
        Self {
            lookup,
            pacer: Arc::new(TokioPacer),
            options,
        }
    }

    /// Replaces the timer used for item and retry delays.
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Normalizes raw input and keeps only 11-digit candidates, in order.
    ///
    /// Check digits are not verified here; see [`crate::cpf::is_valid`].
    pub fn prepare<I, S>(raw_identifiers: I) -> Vec<Cpf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw_identifiers
            .into_iter()
            .filter_map(|raw| Cpf::from_lookup_input(raw.as_ref()))
            .collect()
    }

    /// Runs the whole batch; returns one record per CPF that passed filtering.
    pub async fn run<I, S>(
        &self,
        raw_identifiers: I,
        progress: &dyn ProgressObserver,
    ) -> Vec<LookupRecord>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cpfs = Self::prepare(raw_identifiers);
        self.run_prepared(cpfs, progress, &CancellationToken::new())
            .await
            .records
    }

    /// Runs a prepared batch, checking `cancel` before each item.
    ///
    /// On cancellation the records produced so far are returned.
    pub async fn run_prepared(
        &self,
        cpfs: Vec<Cpf>,
        progress: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let batch_id = Uuid::new_v4();
        let total = cpfs.len();
        let mut records = Vec::with_capacity(total);
        let mut cancelled = false;

        tracing::info!("Batch {} started: {} CPF(s)", batch_id, total);

        for (idx, cpf) in cpfs.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    "Batch {} cancelled after {}/{} CPF(s)",
                    batch_id,
                    idx,
                    total
                );
                cancelled = true;
                break;
            }

            progress.on_progress(idx + 1, total);
            tracing::debug!("[{}/{}] Looking up CPF: {}", idx + 1, total, cpf);

            let record = self.lookup_one(cpf, cancel).await;
            progress.on_record(&record);
            records.push(record);

            if idx + 1 < total {
                tokio::select! {
                    _ = self.pacer.pause(self.options.item_delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        let outcome = BatchOutcome { records, cancelled };
        tracing::info!(
            "Batch {} finished: {} processed, {} GOOD, {} BAD, {} ERROR",
            batch_id,
            outcome.records.len(),
            outcome.count(Classification::Good),
            outcome.count(Classification::Bad),
            outcome.count(Classification::Error)
        );

        outcome
    }

    /// Looks up one CPF and maps the answer, turning any failure into an ERROR record.
    ///
    /// Cancelling `cancel` cuts a retry backoff short; the last error is kept.
    pub async fn lookup_one(&self, cpf: &Cpf, cancel: &CancellationToken) -> LookupRecord {
        match self.fetch_with_retry(cpf, cancel).await {
            Ok(raw) => LookupRecord::from_upstream(cpf, &raw),
            Err(e) => {
                tracing::warn!("Lookup failed for CPF {}: {}", cpf, e);
                LookupRecord::failed(cpf, &e)
            }
        }
    }

    /// Single lookup bounded by the configured timeout.
    pub async fn fetch(&self, cpf: &Cpf) -> Result<RawUpstreamRecord, AppError> {
        match tokio::time::timeout(self.options.lookup_timeout, self.lookup.lookup(cpf)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "Lookup for CPF {} timed out after {:?}",
                cpf, self.options.lookup_timeout
            ))),
        }
    }

    async fn fetch_with_retry(
        &self,
        cpf: &Cpf,
        cancel: &CancellationToken,
    ) -> Result<RawUpstreamRecord, AppError> {
        let mut delays = backoff::exponential(Duration::from_secs(1), Duration::from_secs(10));
        let mut attempt = 0;

        loop {
            match self.fetch(cpf).await {
                Ok(raw) => return Ok(raw),
                Err(e) if attempt < self.options.max_retries && e.is_retryable() => {
                    attempt += 1;
                    let delay = delays.next().unwrap_or(Duration::from_secs(10));
                    tracing::warn!(
                        "Lookup attempt {} for CPF {} failed ({}), retrying in {:?}",
                        attempt,
                        cpf,
                        e,
                        delay
                    );
                    let cancelled = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => true,
                        _ = self.pacer.pause(delay) => false,
                    };
                    if cancelled {
                        tracing::info!("Retry for CPF {} abandoned: batch cancelled", cpf);
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DadosEconomicos, RawUpstreamRecord};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fake lookup answering from a table; unknown CPFs fail with a 500.
    struct TableLookup {
        incomes: HashMap<String, String>,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl TableLookup {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                incomes: entries
                    .iter()
                    .map(|(cpf, renda)| (cpf.to_string(), renda.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CpfLookup for TableLookup {
        async fn lookup(&self, cpf: &Cpf) -> Result<RawUpstreamRecord, AppError> {
            self.calls
                .lock()
                .unwrap()
                .push((cpf.to_string(), Instant::now()));
            match self.incomes.get(cpf.as_str()) {
                Some(renda) => Ok(RawUpstreamRecord {
                    dados_economicos: Some(DadosEconomicos {
                        renda: Some(renda.clone()),
                        score: None,
                    }),
                    ..Default::default()
                }),
                None => Err(AppError::ExternalApiError(
                    "Work API returned status 500".to_string(),
                )),
            }
        }
    }

    fn workflow(lookup: Arc<TableLookup>, options: BatchOptions) -> BatchLookupWorkflow {
        BatchLookupWorkflow::new(lookup, options)
    }

    #[test]
    fn test_prepare_filters_by_length_only() {
        let cpfs = BatchLookupWorkflow::prepare(["111.444.777-35", "123", "00000000000", ""]);
        let cpfs: Vec<&str> = cpfs.iter().map(Cpf::as_str).collect();
        // Repeated digits pass: the batch path does not run check digits
        assert_eq!(cpfs, vec!["11144477735", "00000000000"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_in_middle_keeps_order() {
        let lookup = Arc::new(TableLookup::new(&[
            ("11111111111", "5000,00"),
            ("33333333333", "1000,00"),
        ]));
        let wf = workflow(lookup.clone(), BatchOptions::default());

        let records = wf
            .run(["11111111111", "22222222222", "33333333333"], &NoProgress)
            .await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].cpf, "11111111111");
        assert_eq!(records[0].classificacao, Classification::Good);
        assert_eq!(records[1].cpf, "22222222222");
        assert_eq!(records[1].classificacao, Classification::Error);
        assert!(records[1].error.is_some());
        assert_eq!(records[2].classificacao, Classification::Bad);
        assert_eq!(lookup.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_emitted_before_each_lookup() {
        let lookup = Arc::new(TableLookup::new(&[("11111111111", "1"), ("22222222222", "2")]));
        let wf = workflow(lookup.clone(), BatchOptions::default());
        let seen = Mutex::new(Vec::new());
        let observer = |current: usize, total: usize| {
            let calls_so_far = lookup.calls().len();
            seen.lock().unwrap().push((current, total, calls_so_far));
        };

        wf.run(["11111111111", "bad", "22222222222"], &observer).await;

        assert_eq!(*seen.lock().unwrap(), vec![(1, 2, 0), (2, 2, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_are_spaced_by_delay() {
        let lookup = Arc::new(TableLookup::new(&[
            ("11111111111", "1"),
            ("22222222222", "2"),
            ("33333333333", "3"),
        ]));
        let wf = workflow(lookup.clone(), BatchOptions::default());

        wf.run(["11111111111", "22222222222", "33333333333"], &NoProgress)
            .await;

        let calls = lookup.calls();
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_trailing_wait_after_last_item() {
        let lookup = Arc::new(TableLookup::new(&[("11111111111", "1")]));
        let wf = workflow(lookup, BatchOptions::default());

        let start = Instant::now();
        wf.run(["11111111111"], &NoProgress).await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_before_next_item() {
        let lookup = Arc::new(TableLookup::new(&[
            ("11111111111", "1"),
            ("22222222222", "2"),
            ("33333333333", "3"),
        ]));
        let wf = workflow(lookup.clone(), BatchOptions::default());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let observer = move |current: usize, _total: usize| {
            if current == 2 {
                token.cancel();
            }
        };

        let cpfs = BatchLookupWorkflow::prepare(["11111111111", "22222222222", "33333333333"]);
        let outcome = wf.run_prepared(cpfs, &observer, &cancel).await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(lookup.calls().len(), 2);
    }

    struct SlowLookup;

    #[async_trait]
    impl CpfLookup for SlowLookup {
        async fn lookup(&self, _cpf: &Cpf) -> Result<RawUpstreamRecord, AppError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(RawUpstreamRecord::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_error_record() {
        let wf = BatchLookupWorkflow::new(
            Arc::new(SlowLookup),
            BatchOptions {
                lookup_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        );

        let records = wf.run(["11144477735"], &NoProgress).await;

        assert_eq!(records[0].classificacao, Classification::Error);
        assert_eq!(records[0].nome, "Erro na requisição");
        assert!(records[0].error.as_deref().unwrap().contains("timed out"));
    }

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyLookup {
        failures: usize,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl CpfLookup for FlakyLookup {
        async fn lookup(&self, _cpf: &Cpf) -> Result<RawUpstreamRecord, AppError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.failures {
                Err(AppError::UpstreamUnreachable("connection refused".to_string()))
            } else {
                Ok(RawUpstreamRecord::default())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_by_default() {
        let lookup = Arc::new(FlakyLookup {
            failures: 1,
            calls: Mutex::new(0),
        });
        let wf = BatchLookupWorkflow::new(lookup.clone(), BatchOptions::default());

        let records = wf.run(["11144477735"], &NoProgress).await;

        assert_eq!(records[0].classificacao, Classification::Error);
        assert_eq!(*lookup.calls.lock().unwrap(), 1);
    }

    /// Records every requested pause and returns at once.
    #[derive(Default)]
    struct RecordingPacer {
        pauses: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Pacer for RecordingPacer {
        async fn pause(&self, delay: Duration) {
            self.pauses.lock().unwrap().push(delay);
        }
    }

    #[tokio::test]
    async fn test_pacer_sees_backoff_then_item_delay() {
        let lookup = Arc::new(FlakyLookup {
            failures: 2,
            calls: Mutex::new(0),
        });
        let pacer = Arc::new(RecordingPacer::default());
        let wf = BatchLookupWorkflow::new(
            lookup.clone(),
            BatchOptions {
                max_retries: 2,
                ..Default::default()
            },
        )
        .with_pacer(pacer.clone());

        let records = wf.run(["11144477735", "52998224725"], &NoProgress).await;

        assert_eq!(records.len(), 2);
        assert_eq!(*lookup.calls.lock().unwrap(), 4);
        assert_eq!(
            *pacer.pauses.lock().unwrap(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_millis(500)
            ]
        );
    }

    /// Never finishes a pause.
    struct StalledPacer;

    #[async_trait]
    impl Pacer for StalledPacer {
        async fn pause(&self, _delay: Duration) {
            std::future::pending::<()>().await;
        }
    }

    /// Always fails with a retryable error and cancels the batch on the first call.
    struct CancellingLookup {
        cancel: CancellationToken,
    }

    #[async_trait]
    impl CpfLookup for CancellingLookup {
        async fn lookup(&self, _cpf: &Cpf) -> Result<RawUpstreamRecord, AppError> {
            self.cancel.cancel();
            Err(AppError::UpstreamUnreachable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_retry_backoff() {
        let cancel = CancellationToken::new();
        let wf = BatchLookupWorkflow::new(
            Arc::new(CancellingLookup {
                cancel: cancel.clone(),
            }),
            BatchOptions {
                max_retries: 3,
                ..Default::default()
            },
        )
        .with_pacer(Arc::new(StalledPacer));

        let cpfs = BatchLookupWorkflow::prepare(["11144477735", "52998224725"]);
        let outcome = wf.run_prepared(cpfs, &NoProgress, &cancel).await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].classificacao, Classification::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_reach_observer_as_produced() {
        struct Collect {
            seen: Mutex<Vec<String>>,
        }

        impl ProgressObserver for Collect {
            fn on_progress(&self, current: usize, _total: usize) {
                assert_eq!(self.seen.lock().unwrap().len(), current - 1);
            }

            fn on_record(&self, record: &LookupRecord) {
                self.seen.lock().unwrap().push(record.cpf.clone());
            }
        }

        let lookup = Arc::new(TableLookup::new(&[("11111111111", "1")]));
        let wf = workflow(lookup, BatchOptions::default());
        let observer = Collect {
            seen: Mutex::new(Vec::new()),
        };

        wf.run(["11111111111", "22222222222"], &observer).await;

        assert_eq!(
            *observer.seen.lock().unwrap(),
            vec!["11111111111".to_string(), "22222222222".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_retry_recovers() {
        let lookup = Arc::new(FlakyLookup {
            failures: 2,
            calls: Mutex::new(0),
        });
        let wf = BatchLookupWorkflow::new(
            lookup.clone(),
            BatchOptions {
                max_retries: 2,
                ..Default::default()
            },
        );

        let records = wf.run(["11144477735"], &NoProgress).await;

        assert_eq!(records[0].classificacao, Classification::Bad);
        assert_eq!(*lookup.calls.lock().unwrap(), 3);
    }
}
