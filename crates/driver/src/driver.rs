//! Driving a pipeline against a [`DataSource`].
//!
//! Each call to [`PipelineDriver::next_page`] runs pipeline turns until one
//! yields items or the pipeline completes. Every request of a turn is fetched
//! concurrently, bounded by [`DriverConfig::max_concurrent_fetches`], and each
//! answer is fed back through `provide_data` as it arrives.
//!
//! A failed fetch is not lost. The pipeline never re-issues a request it has
//! handed out, so the driver keeps the failed request and fetches it first on
//! the next call. Retrying a retryable error is therefore just calling
//! `next_page` again.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pipeline::{DataRequest, QueryPipeline};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};

use crate::errors::DriverError;
use crate::source::DataSource;

/// Driver settings.
///
/// | Field | Default |
/// |-------|---------|
/// | `max_page_size` | `100` |
/// | `max_concurrent_fetches` | unset: every request of a turn at once |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Upper bound on items returned by one `next_page` call.
    pub max_page_size: usize,
    /// Upper bound on fetches in flight at the same time.
    pub max_concurrent_fetches: Option<NonZeroUsize>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_page_size: 100,
            max_concurrent_fetches: None,
        }
    }
}

/// Runs a [`QueryPipeline`] to completion against a [`DataSource`].
pub struct PipelineDriver {
    pipeline: Arc<dyn QueryPipeline>,
    source: Arc<dyn DataSource>,
    config: DriverConfig,
    // Requests whose fetch failed; the pipeline still counts them as outstanding.
    pending: Mutex<Vec<DataRequest>>,
}

impl PipelineDriver {
    pub fn new(
        pipeline: Arc<dyn QueryPipeline>,
        source: Arc<dyn DataSource>,
        config: DriverConfig,
    ) -> Self {
        Self {
            pipeline,
            source,
            config,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// The pipeline being driven.
    pub fn pipeline(&self) -> &Arc<dyn QueryPipeline> {
        &self.pipeline
    }

    /// Returns the next non-empty page of items, or `None` once the pipeline
    /// is complete.
    ///
    /// # Errors
    ///
    /// - [`DriverError::Pipeline`] if the pipeline rejects a turn or a payload.
    /// - [`DriverError::Source`] or [`DriverError::Task`] if a fetch fails.
    ///   When the same turn drained items, those items are returned instead and
    ///   the failure is only logged; the next call fetches the request again and
    ///   reports an error only if that attempt fails too.
    /// - [`DriverError::Stalled`] if the pipeline waits on requests this driver
    ///   does not hold.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        err,
        fields(max_page_size = self.config.max_page_size)
    )]
    pub async fn next_page(&self) -> Result<Option<Vec<Vec<u8>>>, DriverError> {
        let retry = std::mem::take(&mut *self.lock_pending());
        if !retry.is_empty() {
            tracing::debug!(requests = retry.len(), "re-fetching failed requests");
            self.fetch_all(retry).await?;
        }

        loop {
            let turn = self.pipeline.next_batch(self.config.max_page_size)?;
            if turn.is_completed {
                tracing::debug!("pipeline drained");
                return Ok(None);
            }

            let issued = !turn.requests.is_empty();
            let fetched = if issued {
                self.fetch_all(turn.requests).await
            } else {
                Ok(())
            };

            if !turn.items.is_empty() {
                if let Err(err) = fetched {
                    tracing::warn!(error = %err, "fetch failed, delivering drained items first");
                }
                return Ok(Some(turn.items));
            }
            fetched?;

            if !issued {
                return Err(DriverError::Stalled);
            }
        }
    }

    /// Drains the pipeline, returning every item in delivery order.
    pub async fn collect_all(&self) -> Result<Vec<Vec<u8>>, DriverError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }

    async fn fetch_all(&self, requests: Vec<DataRequest>) -> Result<(), DriverError> {
        let limit = self
            .config
            .max_concurrent_fetches
            .map_or(requests.len(), NonZeroUsize::get)
            .max(1);
        let permits = Arc::new(Semaphore::new(limit));
        tracing::debug!(requests = requests.len(), limit, "fetching");

        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<task::Id, DataRequest> = HashMap::with_capacity(requests.len());
        for request in requests {
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            let spawned = request.clone();
            let handle = tasks.spawn(async move {
                // The semaphore is never closed, so acquiring cannot fail.
                let _permit = permits.acquire_owned().await;
                let result = source.fetch(&spawned).await;
                (spawned, result)
            });
            in_flight.insert(handle.id(), request);
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((request, Ok(page))) => self
                    .pipeline
                    .provide_data(
                        request.partition_id.as_str(),
                        &page.data,
                        page.continuation.as_deref(),
                    )
                    .map_err(DriverError::from),
                Ok((request, Err(err))) => {
                    tracing::warn!(partition_id = %request.partition_id, error = %err, "fetch failed");
                    self.lock_pending().push(request);
                    Err(DriverError::from(err))
                }
                Err(err) => {
                    // A panicked or cancelled fetch never answered its request.
                    if let Some(request) = in_flight.remove(&err.id()) {
                        tracing::warn!(partition_id = %request.partition_id, error = %err, "fetch task failed");
                        self.lock_pending().push(request);
                    }
                    Err(DriverError::Task {
                        message: err.to_string(),
                    })
                }
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<DataRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
