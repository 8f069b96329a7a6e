use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use firstprompt_common::{GenerationError, Result};
use firstprompt_config::PipelineConfig;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

type ItemResult = std::result::Result<Vec<String>, GenerationError>;

/// Tuning for one orchestrated batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of generation calls in flight.
    pub concurrency: usize,
    /// Attempts per item, including the first. Only retryable errors are retried.
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `retry_backoff * n`.
    pub retry_backoff: Duration,
    /// Emit a progress line every this many completions (0 disables).
    pub progress_every: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for BatchOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            max_attempts: config.max_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            progress_every: config.progress_every,
        }
    }
}

/// A failure recorded against the index of the input that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub index: usize,
    pub error: String,
}

/// Result of a finished batch. `results[i]` always belongs to `inputs[i]`;
/// failed items hold an empty vector.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<Vec<String>>,
    pub failures: Vec<ItemFailure>,
    pub callback_errors: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of items whose generation call succeeded.
    pub fn succeeded(&self) -> usize {
        self.results.len() - self.failures.len()
    }

    pub fn is_failed(&self, index: usize) -> bool {
        self.failures.iter().any(|f| f.index == index)
    }
}

/// Runs a fallible generation function over many inputs with a fixed-width
/// pool of tokio tasks.
///
/// No single failure aborts the batch: errors and panics resolve their slot
/// to an empty result and are reported in [`BatchOutcome::failures`].
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    options: BatchOptions,
}

impl BatchOrchestrator {
    pub fn new(mut options: BatchOptions) -> Self {
        options.concurrency = options.concurrency.max(1);
        options.max_attempts = options.max_attempts.max(1);
        Self { options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Apply `generate` to every input and call `on_complete(index, items)`
    /// once per index as soon as that index resolves.
    ///
    /// Callbacks run on the driving task, one at a time, in completion order.
    /// A failed item still gets its callback, with an empty slice. A callback
    /// error is recorded in [`BatchOutcome::callback_errors`] and the batch
    /// carries on.
    pub async fn run<I, F, Fut, C>(
        &self,
        inputs: Vec<I>,
        generate: F,
        mut on_complete: C,
    ) -> BatchOutcome
    where
        I: Clone + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ItemResult> + Send + 'static,
        C: FnMut(usize, &[String]) -> Result<()>,
    {
        let total = inputs.len();
        let generate = Arc::new(generate);
        let mut slots: Vec<Option<Vec<String>>> = vec![None; total];
        let mut failures = Vec::new();
        let mut callback_errors = Vec::new();

        let mut pending = inputs.into_iter().enumerate();
        let mut running: JoinSet<(usize, ItemResult)> = JoinSet::new();
        let mut task_index = HashMap::new();
        let mut completed = 0usize;

        info!(
            "starting batch of {total} items (concurrency={}, max_attempts={})",
            self.options.concurrency, self.options.max_attempts
        );

        loop {
            while running.len() < self.options.concurrency {
                let Some((index, input)) = pending.next() else {
                    break;
                };
                let generate = Arc::clone(&generate);
                let options = self.options.clone();
                let handle = running.spawn(async move {
                    let result = generate_with_retry(index, input, generate.as_ref(), &options).await;
                    (index, result)
                });
                task_index.insert(handle.id(), index);
            }

            let Some(joined) = running.join_next_with_id().await else {
                break;
            };

            let (index, result) = match joined {
                Ok((id, (index, result))) => {
                    task_index.remove(&id);
                    (index, result)
                }
                Err(err) => match task_index.remove(&err.id()) {
                    Some(index) => (index, Err(GenerationError::Unexpected(describe(&err)))),
                    None => {
                        error!("finished task {} has no batch index: {err}", err.id());
                        continue;
                    }
                },
            };

            let items = match result {
                Ok(items) => {
                    debug!(index, items = items.len(), "item completed");
                    items
                }
                Err(err) => {
                    error!(index, "generation failed: {err}");
                    failures.push(ItemFailure {
                        index,
                        error: err.to_string(),
                    });
                    Vec::new()
                }
            };

            if let Err(err) = on_complete(index, &items) {
                error!(index, "completion callback failed: {err}");
                callback_errors.push(ItemFailure {
                    index,
                    error: err.to_string(),
                });
            }
            slots[index] = Some(items);

            completed += 1;
            let every = self.options.progress_every;
            if every > 0 && (completed % every == 0 || completed == total) {
                info!(
                    "progress: {completed}/{total} items done ({} failed)",
                    failures.len()
                );
            }
        }

        failures.sort_by_key(|f| f.index);
        callback_errors.sort_by_key(|f| f.index);
        info!(
            "batch finished: {} succeeded, {} failed",
            total - failures.len(),
            failures.len()
        );

        BatchOutcome {
            results: slots.into_iter().map(Option::unwrap_or_default).collect(),
            failures,
            callback_errors,
        }
    }
}

async fn generate_with_retry<I, F, Fut>(
    index: usize,
    input: I,
    generate: &F,
    options: &BatchOptions,
) -> ItemResult
where
    I: Clone,
    F: Fn(I) -> Fut,
    Fut: Future<Output = ItemResult>,
{
    let mut attempt = 1;
    loop {
        match generate(input.clone()).await {
            Ok(items) => return Ok(items),
            Err(err) if err.is_retryable() && attempt < options.max_attempts => {
                let delay = options.retry_backoff * attempt;
                warn!(index, attempt, "retrying in {delay:?} after: {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn describe(err: &JoinError) -> String {
    if err.is_cancelled() {
        return "generation task was cancelled".to_string();
    }
    format!("generation task panicked: {err}")
}
