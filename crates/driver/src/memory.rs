//! A [`DataSource`] serving fixed pages from memory.
//!
//! Each partition holds an ordered list of pages. The continuation returned
//! with page `n` is `"page:<n+1>"`; the last page carries none. A partition
//! with no pages answers its first request with an empty body.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use pipeline::DataRequest;
use serde_json::Value;

use crate::errors::SourceError;
use crate::source::{DataSource, FetchedPage};

const PAGE_PREFIX: &str = "page:";

#[derive(Debug, Default)]
pub struct InMemorySource {
    partitions: HashMap<String, Vec<Vec<u8>>>,
    failures: Mutex<HashMap<String, usize>>,
    received: Mutex<Vec<DataRequest>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a partition whose pages are JSON arrays of `pages[n]`.
    pub fn with_partition(self, partition_id: impl Into<String>, pages: Vec<Vec<Value>>) -> Self {
        let bodies = pages
            .into_iter()
            .map(|page| Value::Array(page).to_string().into_bytes())
            .collect();
        self.with_raw_pages(partition_id, bodies)
    }

    /// Adds a partition whose pages are served byte for byte.
    pub fn with_raw_pages(mut self, partition_id: impl Into<String>, bodies: Vec<Vec<u8>>) -> Self {
        self.partitions.insert(partition_id.into(), bodies);
        self
    }

    /// Makes the next `times` fetches from `partition_id` fail with a retryable error.
    pub fn fail_next(&self, partition_id: impl Into<String>, times: usize) {
        lock(&self.failures).insert(partition_id.into(), times);
    }

    /// Every request received so far, in arrival order.
    pub fn received(&self) -> Vec<DataRequest> {
        lock(&self.received).clone()
    }

    fn take_failure(&self, partition_id: &str) -> bool {
        let mut failures = lock(&self.failures);
        match failures.get_mut(partition_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn page_index(request: &DataRequest) -> Result<usize, SourceError> {
    let Some(token) = &request.continuation else {
        return Ok(0);
    };
    token
        .as_str()
        .strip_prefix(PAGE_PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| {
            SourceError::fatal(
                request.partition_id.as_str(),
                format!("unrecognised continuation {token}"),
            )
        })
}

#[async_trait]
impl DataSource for InMemorySource {
    async fn fetch(&self, request: &DataRequest) -> Result<FetchedPage, SourceError> {
        lock(&self.received).push(request.clone());
        let partition_id = request.partition_id.as_str();

        if self.take_failure(partition_id) {
            return Err(SourceError::retryable(partition_id, "injected failure"));
        }

        let pages = self
            .partitions
            .get(partition_id)
            .ok_or_else(|| SourceError::fatal(partition_id, "no such partition"))?;
        let index = page_index(request)?;

        match pages.get(index) {
            Some(body) => Ok(FetchedPage {
                data: body.clone(),
                continuation: (index + 1 < pages.len()).then(|| format!("{PAGE_PREFIX}{}", index + 1)),
            }),
            None if index == 0 => Ok(FetchedPage::default()),
            None => Err(SourceError::fatal(
                partition_id,
                format!("page {index} does not exist"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use pipeline::{ContinuationToken, PartitionKeyRangeId};
    use serde_json::json;

    use super::*;

    fn request(partition: &str, continuation: Option<&str>) -> DataRequest {
        DataRequest {
            partition_id: PartitionKeyRangeId::new(partition).unwrap(),
            continuation: continuation.and_then(ContinuationToken::new),
        }
    }

    #[tokio::test]
    async fn pages_are_chained_by_continuation() {
        let source = InMemorySource::new()
            .with_partition("0", vec![vec![json!({"id": 1})], vec![json!({"id": 2})]]);

        let first = source.fetch(&request("0", None)).await.unwrap();
        assert_eq!(first.data, br#"[{"id":1}]"#.to_vec());
        assert_eq!(first.continuation.as_deref(), Some("page:1"));

        let second = source.fetch(&request("0", Some("page:1"))).await.unwrap();
        assert_eq!(second.data, br#"[{"id":2}]"#.to_vec());
        assert_eq!(second.continuation, None);

        assert_eq!(source.received().len(), 2);
    }

    #[tokio::test]
    async fn empty_partition_answers_with_an_empty_body() {
        let source = InMemorySource::new().with_partition("0", Vec::new());
        assert_eq!(
            source.fetch(&request("0", None)).await.unwrap(),
            FetchedPage::default()
        );
    }

    #[tokio::test]
    async fn injected_failures_are_retryable_and_run_out() {
        let source = InMemorySource::new().with_partition("0", vec![vec![json!(1)]]);
        source.fail_next("0", 1);

        let err = source.fetch(&request("0", None)).await.unwrap_err();
        assert!(err.retry.is_retryable());
        assert!(source.fetch(&request("0", None)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_partition_and_foreign_tokens_are_fatal() {
        let source = InMemorySource::new().with_partition("0", vec![vec![json!(1)]]);
        assert!(!source.fetch(&request("9", None)).await.unwrap_err().retry.is_retryable());
        assert!(!source
            .fetch(&request("0", Some("etag-17")))
            .await
            .unwrap_err()
            .retry
            .is_retryable());
    }
}
